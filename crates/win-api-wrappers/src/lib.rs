extern crate tracing;

pub mod scope_guard;

#[cfg(target_os = "windows")]
#[path = ""]
mod lib_win {
    mod error;

    pub mod console;
    pub mod handle;
    pub mod job;
    pub mod memory;
    pub mod pipe;
    pub mod process;
    pub mod security;
    pub mod thread;
    pub mod utils;

    #[rustfmt::skip]
    pub use windows as raw;
    #[rustfmt::skip]
    pub use error::Error;
}

#[cfg(target_os = "windows")]
#[rustfmt::skip]
pub use lib_win::*;
