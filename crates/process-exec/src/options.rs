use std::collections::HashMap;

use camino::Utf8PathBuf;

/// Inputs of a synchronous execution.
///
/// Blank `application_name` and `current_directory` values mean "use the default",
/// exactly like `None`. An absent or empty `environment` inherits the caller's environment.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub application_name: Option<String>,
    pub command_line: String,
    pub current_directory: Option<Utf8PathBuf>,
    pub environment: Option<HashMap<String, String>>,
    pub stdin: Option<Vec<u8>>,
    /// Name of the encoding used to decode the captured output. UTF-8 when absent or blank.
    pub output_encoding: Option<String>,
    /// Also wait for every process spawned by the child, transitively.
    pub wait_for_descendants: bool,
    /// Launch the child as if created by this process instead of the caller.
    pub parent_process_id: Option<u32>,
}

impl ExecOptions {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Raw value returned by the process.
    pub exit_code: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStyle {
    Normal,
    Hidden,
    Minimized,
    Maximized,
}

impl WindowStyle {
    /// The matching `SW_*` show command.
    pub fn show_command(self) -> u16 {
        match self {
            WindowStyle::Hidden => 0,
            WindowStyle::Normal => 1,
            WindowStyle::Maximized => 3,
            WindowStyle::Minimized => 6,
        }
    }
}
