//! Load generation and admin tooling for a place-style pixel canvas server.

pub mod admin;
pub mod auth;
pub mod config;
pub mod constants;
pub mod controller;
pub mod envelope;
pub mod error;
pub mod generators;
pub mod identity;
pub mod message;
pub mod payload;
pub mod protocol;
pub mod session;
pub mod socket;
pub mod state;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::{EncodingMode, LoadArgs, SimulationConfig};
pub use controller::{SimulationController, SimulationReport};
pub use error::{ClientError, Result};
pub use identity::UserIdentity;
