use std::ffi::c_void;
use std::ptr;

use windows::Win32::Foundation::INVALID_HANDLE_VALUE;
use windows::Win32::System::IO::{CreateIoCompletionPort, GetQueuedCompletionStatus, OVERLAPPED};
use windows::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, JOBOBJECT_ASSOCIATE_COMPLETION_PORT,
    JobObjectAssociateCompletionPortInformation, SetInformationJobObject,
};
use windows::Win32::System::Threading::INFINITE;
use windows::core::PCWSTR;

use crate::Error;
use crate::handle::Handle;
use crate::process::Process;
use crate::utils::u32size_of;

/// Posted to the completion port of a job when its last active process exits.
pub const JOB_OBJECT_MSG_ACTIVE_PROCESS_ZERO: u32 = 4;

/// Posted to the completion port of a job when a process is added to it.
pub const JOB_OBJECT_MSG_NEW_PROCESS: u32 = 6;

/// Posted to the completion port of a job when one of its processes exits.
pub const JOB_OBJECT_MSG_EXIT_PROCESS: u32 = 7;

#[derive(Debug)]
pub struct Job {
    pub handle: Handle,
}

impl Job {
    pub fn new_unnamed() -> Result<Self, Error> {
        // SAFETY: No preconditions. Creates an unnamed job object with default security.
        let handle = unsafe { CreateJobObjectW(None, PCWSTR::null()) }?;

        // SAFETY: We created the resource above and are thus owning it.
        let handle = unsafe { Handle::new_owned(handle)? };

        Ok(Self { handle })
    }

    /// Routes the notifications of this job to `port`, tagged with `key`.
    pub fn associate_completion_port(&self, port: &CompletionPort, key: usize) -> Result<(), Error> {
        let information = JOBOBJECT_ASSOCIATE_COMPLETION_PORT {
            CompletionKey: key as *mut c_void,
            CompletionPort: port.handle.raw(),
        };

        // SAFETY: `information` is a properly initialized structure of the size we pass.
        unsafe {
            SetInformationJobObject(
                self.handle.raw(),
                JobObjectAssociateCompletionPortInformation,
                ptr::from_ref(&information).cast::<c_void>(),
                u32size_of::<JOBOBJECT_ASSOCIATE_COMPLETION_PORT>(),
            )
        }?;

        Ok(())
    }

    /// The handle value, usable as a completion key unique to this job.
    pub fn completion_key(&self) -> usize {
        self.handle.raw().0 as usize
    }

    /// Assigns `process` to the job. Processes it creates afterwards join the job as well.
    pub fn assign_process(&self, process: &Process) -> Result<(), Error> {
        // SAFETY: Both handles are valid by construction.
        unsafe { AssignProcessToJobObject(self.handle.raw(), process.handle.raw()) }?;

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionStatus {
    /// For job notifications, the message identifier (`JOB_OBJECT_MSG_*`).
    pub code: u32,
    pub key: usize,
    /// For job notifications, the process id the message relates to, when any.
    pub value: usize,
}

/// An I/O completion port not associated with any file.
#[derive(Debug)]
pub struct CompletionPort {
    pub handle: Handle,
}

impl CompletionPort {
    pub fn new(concurrent_threads: u32) -> Result<Self, Error> {
        // SAFETY: No preconditions. Passing `INVALID_HANDLE_VALUE` creates a standalone port.
        let handle = unsafe { CreateIoCompletionPort(INVALID_HANDLE_VALUE, None, 0, concurrent_threads) }?;

        // SAFETY: We created the resource above and are thus owning it.
        let handle = unsafe { Handle::new_owned(handle)? };

        Ok(Self { handle })
    }

    /// Blocks until a completion packet is available, or until `timeout_ms` elapses.
    pub fn dequeue(&self, timeout_ms: Option<u32>) -> Result<CompletionStatus, Error> {
        let mut code = 0u32;
        let mut key = 0usize;
        let mut overlapped: *mut OVERLAPPED = ptr::null_mut();

        // SAFETY: All out parameters point to valid locals.
        unsafe {
            GetQueuedCompletionStatus(
                self.handle.raw(),
                &mut code,
                &mut key,
                &mut overlapped,
                timeout_ms.unwrap_or(INFINITE),
            )
        }?;

        Ok(CompletionStatus {
            code,
            key,
            value: overlapped as usize,
        })
    }
}
