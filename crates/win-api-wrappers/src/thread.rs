use std::ffi::c_void;
use std::fmt::Debug;

use windows::Win32::Foundation::{E_INVALIDARG, E_UNEXPECTED, ERROR_INSUFFICIENT_BUFFER, HANDLE};
use windows::Win32::System::Threading::{
    DeleteProcThreadAttributeList, InitializeProcThreadAttributeList, LPPROC_THREAD_ATTRIBUTE_LIST,
    PROC_THREAD_ATTRIBUTE_HANDLE_LIST, PROC_THREAD_ATTRIBUTE_PARENT_PROCESS, ResumeThread, UpdateProcThreadAttribute,
};

use crate::Error;
use crate::handle::Handle;
use crate::process::Process;

#[derive(Debug)]
pub struct Thread {
    pub handle: Handle,
}

impl From<Handle> for Thread {
    fn from(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Thread {
    /// Decrements the suspend count, returning the previous one.
    pub fn resume(&self) -> Result<u32, Error> {
        // SAFETY: No preconditions.
        let previous_count = unsafe { ResumeThread(self.handle.raw()) };

        if previous_count == u32::MAX {
            Err(Error::last_error())
        } else {
            Ok(previous_count)
        }
    }
}

/// An initialized `PROC_THREAD_ATTRIBUTE_LIST`, owning the values its attributes point to.
#[derive(Debug)]
pub struct ThreadAttributeList {
    // usize elements keep the opaque list pointer-aligned.
    buffer: Vec<usize>,
    // Boxed so the address of the handle stays stable until the list is deleted.
    parent_process: Option<Box<Process>>,
    handle_list: Option<Box<[HANDLE]>>,
}

impl ThreadAttributeList {
    pub fn with_count(count: u32) -> Result<ThreadAttributeList, Error> {
        // The output has a variable size.
        // Therefore, we must call InitializeProcThreadAttributeList once with a zero-size, and check for the ERROR_INSUFFICIENT_BUFFER status.
        // At this point, we call InitializeProcThreadAttributeList again with a buffer of the correct size.

        let mut required_size = 0;

        // SAFETY: No preconditions.
        let res = unsafe { InitializeProcThreadAttributeList(None, count, None, &mut required_size) };

        match res {
            Err(err) if err.code() == ERROR_INSUFFICIENT_BUFFER.to_hresult() => {}
            Err(err) => return Err(err.into()),
            Ok(()) => return Err(Error::from_hresult(E_UNEXPECTED)),
        }

        let mut allocated_length = required_size;
        let mut buffer = vec![0usize; required_size.div_ceil(size_of::<usize>())];

        // SAFETY: `lpAttributeList` points to a buffer of at least `allocated_length` bytes.
        unsafe {
            InitializeProcThreadAttributeList(
                Some(LPPROC_THREAD_ATTRIBUTE_LIST(buffer.as_mut_ptr().cast())),
                count,
                None,
                &mut allocated_length,
            )?;
        };

        debug_assert_eq!(allocated_length, required_size);

        Ok(ThreadAttributeList {
            buffer,
            parent_process: None,
            handle_list: None,
        })
    }

    pub fn raw(&mut self) -> LPPROC_THREAD_ATTRIBUTE_LIST {
        LPPROC_THREAD_ATTRIBUTE_LIST(self.buffer.as_mut_ptr().cast())
    }

    /// Registers `process` as the parent of the process created with this list.
    ///
    /// The handle must have been opened with `PROCESS_CREATE_PROCESS` access.
    pub fn set_parent_process(&mut self, process: Process) -> Result<(), Error> {
        let process = Box::new(process);
        let value: *const HANDLE = process.handle.raw_as_ref();

        // SAFETY: The list was initialized in `with_count`. The value is heap-allocated and kept
        // alive in `self` until the list is deleted.
        unsafe {
            UpdateProcThreadAttribute(
                self.raw(),
                0,
                PROC_THREAD_ATTRIBUTE_PARENT_PROCESS as usize,
                Some(value.cast::<c_void>()),
                size_of::<HANDLE>(),
                None,
                None,
            )
        }?;

        self.parent_process = Some(process);

        Ok(())
    }

    pub fn parent_process(&self) -> Option<&Process> {
        self.parent_process.as_deref()
    }

    /// Restricts inheritance to `handles`, which must all be inheritable and distinct.
    ///
    /// With a parent process set, the values are taken from the handle table of that parent.
    pub fn set_handle_list(&mut self, handles: Vec<HANDLE>) -> Result<(), Error> {
        if handles.is_empty() {
            return Err(Error::from_hresult(E_INVALIDARG));
        }

        let handles = handles.into_boxed_slice();

        // SAFETY: The list was initialized in `with_count`. The slice is heap-allocated and kept
        // alive in `self` until the list is deleted.
        unsafe {
            UpdateProcThreadAttribute(
                self.raw(),
                0,
                PROC_THREAD_ATTRIBUTE_HANDLE_LIST as usize,
                Some(handles.as_ptr().cast::<c_void>()),
                size_of::<HANDLE>() * handles.len(),
                None,
                None,
            )
        }?;

        self.handle_list = Some(handles);

        Ok(())
    }

    pub fn handle_list(&self) -> &[HANDLE] {
        self.handle_list.as_deref().unwrap_or_default()
    }
}

impl Drop for ThreadAttributeList {
    fn drop(&mut self) {
        // SAFETY: List must be initialized with `InitializeProcThreadAttributeList`, which is done in `ThreadAttributeList::with_count`.
        unsafe { DeleteProcThreadAttributeList(self.raw()) };
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use windows::Win32::System::Threading::{GetCurrentProcessId, PROCESS_CREATE_PROCESS};

    use super::*;
    use crate::pipe::Pipe;

    #[test]
    fn parent_process_attribute() {
        // SAFETY: No preconditions.
        let pid = unsafe { GetCurrentProcessId() };
        let parent = Process::get_by_pid(pid, PROCESS_CREATE_PROCESS).unwrap();
        let parent_raw = parent.handle.raw();

        let mut list = ThreadAttributeList::with_count(1).unwrap();
        list.set_parent_process(parent).unwrap();

        assert_eq!(list.parent_process().unwrap().handle.raw(), parent_raw);
        assert!(!list.raw().0.is_null());
    }

    #[test]
    fn both_attributes_fit_in_one_list() {
        // SAFETY: No preconditions.
        let pid = unsafe { GetCurrentProcessId() };
        let parent = Process::get_by_pid(pid, PROCESS_CREATE_PROCESS).unwrap();

        let (rx, tx) = Pipe::new_anonymous(None, 0).unwrap();
        rx.handle.set_inheritable(true).unwrap();
        tx.handle.set_inheritable(true).unwrap();

        let mut list = ThreadAttributeList::with_count(2).unwrap();
        list.set_parent_process(parent).unwrap();
        list.set_handle_list(vec![rx.handle.raw(), tx.handle.raw()]).unwrap();

        assert_eq!(list.handle_list(), [rx.handle.raw(), tx.handle.raw()]);
        assert!(list.parent_process().is_some());
    }

    #[test]
    fn empty_handle_list_is_rejected() {
        let mut list = ThreadAttributeList::with_count(1).unwrap();

        assert!(list.set_handle_list(Vec::new()).is_err());
        assert!(list.handle_list().is_empty());
    }
}
