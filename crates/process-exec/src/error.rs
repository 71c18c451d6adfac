use std::{fmt, io};

use thiserror::Error;

/// The standard stream a pipe I/O failure relates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdin => write!(f, "STDIN"),
            Stream::Stdout => write!(f, "STDOUT"),
            Stream::Stderr => write!(f, "STDERR"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    /// A pipe, job object, completion port or environment block could not be created or configured.
    #[error("{operation} failed ({}, Win32ErrorCode {code} - {code:#010X})", os_message(.code))]
    ResourceCreation { operation: &'static str, code: u32 },
    /// The process creation call itself failed.
    #[error("{operation} failed ({}, Win32ErrorCode {code} - {code:#010X})", os_message(.code))]
    Launch { operation: &'static str, code: u32 },
    #[error("unsupported output encoding `{name}`")]
    Encoding { name: String },
    /// A handle could not be prepared for another process.
    #[error("{operation} failed ({}, Win32ErrorCode {code} - {code:#010X})", os_message(.code))]
    HandleSetup { operation: &'static str, code: u32 },
    #[error("{stream} pipe I/O failed")]
    Io {
        stream: Stream,
        #[source]
        source: io::Error,
    },
    /// Waiting for the process or reading its exit code failed.
    #[error("{operation} failed ({}, Win32ErrorCode {code} - {code:#010X})", os_message(.code))]
    Wait { operation: &'static str, code: u32 },
}

impl ExecError {
    /// The platform error code carried by this error, if any.
    pub fn native_code(&self) -> Option<u32> {
        match self {
            ExecError::ResourceCreation { code, .. }
            | ExecError::Launch { code, .. }
            | ExecError::HandleSetup { code, .. }
            | ExecError::Wait { code, .. } => Some(*code),
            ExecError::Io { source, .. } => source.raw_os_error().map(|code| u32::from_ne_bytes(code.to_ne_bytes())),
            ExecError::Encoding { .. } => None,
        }
    }
}

#[cfg(windows)]
impl ExecError {
    pub(crate) fn resource_creation(operation: &'static str) -> impl FnOnce(win_api_wrappers::Error) -> Self {
        move |error| ExecError::ResourceCreation {
            operation,
            code: error.win32_code(),
        }
    }

    pub(crate) fn launch(operation: &'static str) -> impl FnOnce(win_api_wrappers::Error) -> Self {
        move |error| ExecError::Launch {
            operation,
            code: error.win32_code(),
        }
    }

    pub(crate) fn handle_setup(operation: &'static str) -> impl FnOnce(win_api_wrappers::Error) -> Self {
        move |error| ExecError::HandleSetup {
            operation,
            code: error.win32_code(),
        }
    }

    pub(crate) fn wait(operation: &'static str) -> impl FnOnce(win_api_wrappers::Error) -> Self {
        move |error| ExecError::Wait {
            operation,
            code: error.win32_code(),
        }
    }
}

fn os_message(code: &u32) -> String {
    let error = io::Error::from_raw_os_error(i32::from_ne_bytes(code.to_ne_bytes()));

    // Drop the " (os error N)" suffix, the code is already part of the message.
    let message = error.to_string();
    match message.rfind(" (os error ") {
        Some(idx) => message[..idx].to_owned(),
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_operation_and_code() {
        let error = ExecError::Launch {
            operation: "CreateProcessW",
            code: 2,
        };

        let message = error.to_string();

        assert!(message.starts_with("CreateProcessW failed ("), "{message}");
        assert!(message.ends_with(", Win32ErrorCode 2 - 0x00000002)"), "{message}");
        assert!(!message.contains("os error"), "{message}");
    }

    #[test]
    fn native_code() {
        let error = ExecError::ResourceCreation {
            operation: "STDOUT pipe setup",
            code: 5,
        };
        assert_eq!(error.native_code(), Some(5));

        let error = ExecError::Encoding { name: "nope".to_owned() };
        assert_eq!(error.native_code(), None);

        let error = ExecError::Io {
            stream: Stream::Stdin,
            source: io::Error::from_raw_os_error(232),
        };
        assert_eq!(error.native_code(), Some(232));
    }
}
