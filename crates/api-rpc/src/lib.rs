//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 job control surface for the Fabrica
//! Generation Engine.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
