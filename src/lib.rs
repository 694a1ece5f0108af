#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod close;
pub mod config;
pub mod connection;
pub mod error;
pub mod log;
pub mod validate;

pub use config::ConnectionConfig;
pub use connection::{ConnectionManager, ConnectionState, Status};
pub use log::{Direction, LogEntry, MessageLog};

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;
