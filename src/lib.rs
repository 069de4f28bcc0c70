//! # relayq
//!
//! `relayq` is a small HTTP relay in front of a durable RabbitMQ queue.
//! Clients POST text messages, which are stamped and published persistently
//! to the `messages` queue, and GET them back one at a time.
//!
//! ## Core Modules
//!
//! - `api`: The axum router, request handlers and the JSON error contract.
//! - `broker`: The broker abstraction and its AMQP implementation.
//! - `config`: Loads settings from defaults, a config file and the environment.
//! - `connection`: Keeps one broker connection alive, reconnecting after a fixed delay.
//! - `gateway`: Publishes and fetches relay messages on the current channel.
//! - `server`: Wires everything together and handles graceful shutdown.
//! - `utils`: Process errors and logging setup.

pub mod api;
pub mod broker;
pub mod config;
pub mod connection;
pub mod gateway;
pub mod server;
pub mod utils;

#[cfg(test)]
mod testing;
