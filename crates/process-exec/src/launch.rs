use std::ffi::OsStr;

use camino::Utf8Path;
use win_api_wrappers::process::{EnvironmentBlock, ProcessInformation, create_process};
use win_api_wrappers::raw::Win32::System::Threading::{
    CREATE_SUSPENDED, CREATE_UNICODE_ENVIRONMENT, EXTENDED_STARTUPINFO_PRESENT, PROCESS_CREATION_FLAGS,
};
use win_api_wrappers::security::attributes::SecurityAttributes;

use crate::error::ExecError;
use crate::startup::StartupConfig;

/// Everything needed to create a process.
#[derive(Debug, Default)]
pub struct LaunchRequest<'a> {
    /// Blank values mean "resolve from the command line".
    pub application_name: Option<&'a str>,
    pub command_line: &'a str,
    /// Blank values mean "inherit the caller's directory".
    pub current_directory: Option<&'a Utf8Path>,
    /// `None` inherits the caller's environment.
    pub environment: Option<&'a EnvironmentBlock>,
    pub process_attributes: Option<&'a SecurityAttributes>,
    pub thread_attributes: Option<&'a SecurityAttributes>,
    pub inherit_handles: bool,
    /// Extra flags. The process is always created suspended, with a Unicode environment and extended startup info.
    pub creation_flags: PROCESS_CREATION_FLAGS,
    pub startup: StartupConfig<'a>,
}

/// Creates the process with its primary thread suspended.
///
/// The caller owns the returned handles and is responsible for resuming the thread.
pub fn launch(request: &LaunchRequest<'_>) -> Result<ProcessInformation, ExecError> {
    let application_name = request
        .application_name
        .filter(|name| !name.trim().is_empty())
        .map(OsStr::new);

    let current_directory = request
        .current_directory
        .filter(|dir| !dir.as_str().trim().is_empty())
        .map(Utf8Path::as_std_path);

    let creation_flags =
        request.creation_flags | CREATE_SUSPENDED | CREATE_UNICODE_ENVIRONMENT | EXTENDED_STARTUPINFO_PRESENT;

    // Keeps the attribute list and the duplicated handles alive across the creation call.
    let mut startup = request.startup.prepare()?;

    let launched = create_process(
        application_name,
        request.command_line,
        request.process_attributes,
        request.thread_attributes,
        request.inherit_handles,
        creation_flags,
        request.environment,
        current_directory,
        &mut startup.info,
    )
    .map_err(ExecError::launch("CreateProcessW"))?;

    debug!(
        pid = launched.process_id,
        tid = launched.thread_id,
        "Launched process suspended"
    );

    Ok(launched)
}
