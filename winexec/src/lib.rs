#[macro_use]
extern crate serde;
#[macro_use]
extern crate tracing;

// Used by the binary.
use seahorse as _;

#[cfg(not(windows))]
use humantime as _;

pub mod command;
pub mod config;
pub mod log;
