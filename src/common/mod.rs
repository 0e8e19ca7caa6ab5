//! Common utilities shared between client and worker

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};
