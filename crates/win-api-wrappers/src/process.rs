use std::collections::HashMap;
use std::ffi::{OsStr, c_void};
use std::fmt::Debug;
use std::path::Path;

use windows::Win32::Foundation::{E_INVALIDARG, HANDLE, WAIT_EVENT, WAIT_FAILED};
use windows::Win32::System::Threading::{
    CREATE_UNICODE_ENVIRONMENT, CreateProcessW, EXTENDED_STARTUPINFO_PRESENT, GetCurrentProcess, GetExitCodeProcess,
    INFINITE, LPPROC_THREAD_ATTRIBUTE_LIST, OpenProcess, PROCESS_ACCESS_RIGHTS, PROCESS_CREATION_FLAGS,
    PROCESS_INFORMATION, STARTUPINFOEXW, STARTUPINFOW, STARTUPINFOW_FLAGS, TerminateProcess, WaitForSingleObject,
};

use crate::Error;
use crate::handle::Handle;
use crate::security::attributes::SecurityAttributes;
use crate::thread::Thread;
use crate::utils::{WideString, u32size_of};

#[derive(Debug)]
pub struct Process {
    // Handle is closed with RAII wrapper.
    pub handle: Handle,
}

impl From<Handle> for Process {
    fn from(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Process {
    pub fn get_by_pid(pid: u32, desired_access: PROCESS_ACCESS_RIGHTS) -> Result<Self, Error> {
        // SAFETY: FFI call with no outstanding precondition.
        let handle = unsafe { OpenProcess(desired_access, false, pid) }?;

        // SAFETY: The handle is owned by us, we opened the process above.
        let handle = unsafe { Handle::new_owned(handle)? };

        Ok(Self { handle })
    }

    pub fn current_process() -> Self {
        // SAFETY: `GetCurrentProcess()` has no preconditions and always returns
        // a valid pseudo handle.
        let handle = unsafe { GetCurrentProcess() };

        // SAFETY: The handle returned by `GetCurrentProcess` is a pseudo handle.
        let handle = unsafe { Handle::new_pseudo_handle(handle) };

        Self { handle }
    }

    pub fn wait(&self, timeout_ms: Option<u32>) -> Result<WAIT_EVENT, Error> {
        // SAFETY: No preconditions.
        let status = unsafe { WaitForSingleObject(self.handle.raw(), timeout_ms.unwrap_or(INFINITE)) };

        match status {
            WAIT_FAILED => Err(Error::last_error()),
            w => Ok(w),
        }
    }

    pub fn exit_code(&self) -> Result<u32, Error> {
        let mut exit_code = 0u32;

        // SAFETY: No preconditions.
        unsafe { GetExitCodeProcess(self.handle.raw(), &mut exit_code) }?;

        Ok(exit_code)
    }

    pub fn terminate(&self, exit_code: u32) -> Result<(), Error> {
        // SAFETY: No preconditions.
        unsafe { TerminateProcess(self.handle.raw(), exit_code) }?;

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct StartupInfo {
    pub desktop: WideString,
    pub title: WideString,
    pub flags: STARTUPINFOW_FLAGS,
    pub show_window: u16,
    pub std_input: HANDLE,
    pub std_output: HANDLE,
    pub std_error: HANDLE,
    pub attribute_list: Option<LPPROC_THREAD_ATTRIBUTE_LIST>,
}

impl StartupInfo {
    /// Builds the native structure.
    ///
    /// The returned value borrows the strings of `self` through raw pointers: `self` must outlive it.
    pub fn as_raw(&mut self, extended: bool) -> STARTUPINFOEXW {
        STARTUPINFOEXW {
            StartupInfo: STARTUPINFOW {
                cb: if extended || self.attribute_list.is_some() {
                    u32size_of::<STARTUPINFOEXW>()
                } else {
                    u32size_of::<STARTUPINFOW>()
                },
                lpDesktop: self.desktop.as_pwstr(),
                lpTitle: self.title.as_pwstr(),
                dwFlags: self.flags,
                wShowWindow: self.show_window,
                hStdInput: self.std_input,
                hStdOutput: self.std_output,
                hStdError: self.std_error,
                ..Default::default()
            },
            lpAttributeList: self.attribute_list.unwrap_or_default(),
        }
    }
}

#[derive(Debug)]
pub struct ProcessInformation {
    pub process: Process,
    pub thread: Thread,
    pub process_id: u32,
    pub thread_id: u32,
}

/// A Unicode environment block: `KEY=VALUE\0` entries followed by a final `\0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentBlock(Vec<u16>);

impl EnvironmentBlock {
    /// Serializes `environment`, sorted by key without regard to case.
    ///
    /// Returns `None` for an empty map, meaning the child inherits the caller's environment.
    pub fn new(environment: &HashMap<String, String>) -> Result<Option<Self>, Error> {
        if environment.is_empty() {
            return Ok(None);
        }

        let mut entries = environment.iter().collect::<Vec<_>>();
        entries.sort_by_cached_key(|(key, _)| (key.to_uppercase(), *key));

        let mut serialized = Vec::new();

        for (key, value) in entries {
            // A leading '=' is legal, as in the hidden per-drive variables (`=C:`).
            if key.is_empty() || key.chars().skip(1).any(|c| c == '=') || key.contains('\0') || value.contains('\0') {
                return Err(Error::from_hresult(E_INVALIDARG));
            }

            serialized.extend(key.encode_utf16());
            serialized.push(u16::from(b'='));
            serialized.extend(value.encode_utf16());
            serialized.push(0);
        }

        serialized.push(0);

        Ok(Some(Self(serialized)))
    }

    pub fn as_wide(&self) -> &[u16] {
        &self.0
    }

    pub fn as_ptr(&self) -> *const c_void {
        self.0.as_ptr().cast()
    }
}

// Goal is to wrap `CreateProcessW`, which has a lot of arguments.
#[expect(clippy::too_many_arguments)]
pub fn create_process(
    application_name: Option<&OsStr>,
    command_line: &str,
    process_attributes: Option<&SecurityAttributes>,
    thread_attributes: Option<&SecurityAttributes>,
    inherit_handles: bool,
    creation_flags: PROCESS_CREATION_FLAGS,
    environment: Option<&EnvironmentBlock>,
    current_directory: Option<&Path>,
    startup_info: &mut StartupInfo,
) -> Result<ProcessInformation, Error> {
    let application_name = application_name.map(WideString::from).unwrap_or_default();
    let current_directory = current_directory.map(WideString::from).unwrap_or_default();

    // `CreateProcessW` may modify the command line buffer in place.
    let mut command_line = WideString::from(command_line);

    let mut creation_flags = creation_flags | CREATE_UNICODE_ENVIRONMENT;
    if startup_info.attribute_list.is_some() {
        creation_flags |= EXTENDED_STARTUPINFO_PRESENT;
    }

    let raw_startup_info = startup_info.as_raw(creation_flags.contains(EXTENDED_STARTUPINFO_PRESENT));

    let mut raw_process_information = PROCESS_INFORMATION::default();

    // SAFETY: All string pointers are NUL terminated and outlive the call. `raw_startup_info` borrows
    // `startup_info` which is alive for the duration of the call, and its size field matches the flags.
    unsafe {
        CreateProcessW(
            application_name.as_pcwstr(),
            Some(command_line.as_pwstr()),
            process_attributes.map(|x| x.as_ptr()),
            thread_attributes.map(|x| x.as_ptr()),
            inherit_handles,
            creation_flags,
            environment.map(EnvironmentBlock::as_ptr),
            current_directory.as_pcwstr(),
            &raw_startup_info.StartupInfo,
            &mut raw_process_information,
        )
    }?;

    // SAFETY: The handle is owned by us, we opened the resource above.
    let process = unsafe { Handle::new_owned(raw_process_information.hProcess).map(Process::from)? };

    // SAFETY: The handle is owned by us, we opened the resource above.
    let thread = unsafe { Handle::new_owned(raw_process_information.hThread).map(Thread::from)? };

    Ok(ProcessInformation {
        process,
        thread,
        process_id: raw_process_information.dwProcessId,
        thread_id: raw_process_information.dwThreadId,
    })
}
