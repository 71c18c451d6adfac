//! Synchronous process execution on Windows.
//!
//! [`run`] launches a command with redirected standard streams, captures its whole output
//! and returns once the process (and, on request, all of its descendants) has exited.
//! The building blocks ([`PipeSet`], [`StartupConfig`], [`launch`], [`JobTracker`],
//! [`wait_process`]) are exposed for callers needing finer control.

#[macro_use]
extern crate tracing;

mod encoding;
mod error;
mod options;

pub use encoding::OutputEncoding;
pub use error::{ExecError, Stream};
pub use options::{ExecOptions, ExecutionResult, WindowStyle};

#[cfg(target_os = "windows")]
#[path = ""]
mod lib_win {
    pub mod exec;
    pub mod launch;
    pub mod pipes;
    pub mod startup;
    pub mod tracker;
}

#[cfg(target_os = "windows")]
#[rustfmt::skip]
pub use lib_win::{
    exec::{run, wait_process},
    launch::{launch, LaunchRequest},
    pipes::{ChildPipes, ParentPipes, PipeSet},
    startup::{PreparedStartup, StartupConfig},
    tracker::JobTracker,
};
