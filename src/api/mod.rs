//! The `api` module is the HTTP surface of the relay.
//!
//! It is a stateless translation layer: each handler makes one gateway
//! call and maps the typed result onto a status code and JSON body.
//!
//! | Method | Path        | Success                                   |
//! |--------|-------------|-------------------------------------------|
//! | GET    | `/`         | 200 `{"message": "Backend API is running"}` |
//! | POST   | `/messages` | 201 `{"success": true, "message": ...}`   |
//! | GET    | `/messages` | 200 `{"messages": [RelayMessage]}`        |

pub mod error;
pub mod handlers;
pub mod routes;

pub use error::ApiError;
pub use routes::{AppState, router};
