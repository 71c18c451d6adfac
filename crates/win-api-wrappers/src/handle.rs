use std::fmt::Debug;
use std::ptr;

use windows::Win32::Foundation::{
    CloseHandle, DUPLICATE_CLOSE_SOURCE, DUPLICATE_SAME_ACCESS, DuplicateHandle, E_HANDLE, HANDLE, HANDLE_FLAG_INHERIT,
    HANDLE_FLAGS, SetHandleInformation,
};
use windows::Win32::System::Threading::GetCurrentProcess;

use crate::Error;
use crate::process::Process;

/// A wrapper around a Windows [`HANDLE`].
///
/// An owned handle is closed exactly once, when the wrapper is dropped.
#[derive(Debug)]
pub struct Handle {
    raw: HANDLE,
    owned: bool,
}

// SAFETY: A `HANDLE` is, by definition, thread safe.
unsafe impl Send for Handle {}

// SAFETY: A `HANDLE` is simply an integer, no dereferencing is done.
unsafe impl Sync for Handle {}

/// The `Drop` implementation is assuming we constructed the `Handle` object in
/// a sane way to call `CloseHandle`, but there is no way for us to verify that
/// the handle is actually owned outside of the callsite. Conceptually, calling
/// `Handle::new_owned(handle)` or `Handle::new(handle, true)` is like calling the
/// unsafe function `CloseHandle` and thus must inherit its safety preconditions.
impl Handle {
    /// Wraps a Windows [`HANDLE`].
    ///
    /// # Safety
    ///
    /// When `owned` is `true`:
    ///
    /// - `handle` is a valid handle to an open object.
    /// - `handle` is not a pseudohandle.
    /// - The caller is actually responsible for closing the `HANDLE` when the value goes out of scope.
    ///
    /// When `owned` is `false`: no outstanding precondition.
    pub unsafe fn new(handle: HANDLE, owned: bool) -> Result<Self, Error> {
        if handle.is_invalid() || handle.0.is_null() {
            return Err(Error::from_hresult(E_HANDLE));
        }

        Ok(Self { raw: handle, owned })
    }

    /// Wraps an owned Windows [`HANDLE`].
    ///
    /// # Safety
    ///
    /// - `handle` is a valid handle to an open object.
    /// - `handle` is not a pseudohandle.
    /// - The caller is actually responsible for closing the `HANDLE` when the value goes out of scope.
    pub unsafe fn new_owned(handle: HANDLE) -> Result<Self, Error> {
        // SAFETY: Same preconditions as the called function.
        unsafe { Self::new(handle, true) }
    }

    /// Wraps a pseudo Windows [`HANDLE`].
    ///
    /// # Safety
    ///
    /// - The caller should ensure that `handle` is a pseudo handle, as its validity is not checked.
    pub unsafe fn new_pseudo_handle(handle: HANDLE) -> Self {
        Self {
            raw: handle,
            owned: false,
        }
    }
}

impl Handle {
    /// Wraps a borrowed Windows [`HANDLE`].
    ///
    /// Always use this when knowing statically that the handle is never owned.
    pub fn new_borrowed(handle: HANDLE) -> Result<Self, Error> {
        // SAFETY: It’s safe to wrap a non-owning Handle as we’ll not call `CloseHandle` on it.
        unsafe { Self::new(handle, false) }
    }

    pub fn raw(&self) -> HANDLE {
        self.raw
    }

    pub fn raw_as_ref(&self) -> &HANDLE {
        &self.raw
    }

    pub fn try_clone(&self) -> Result<Self, Error> {
        // SAFETY: No preconditions. Always a valid handle.
        let current_process = unsafe { GetCurrentProcess() };

        let mut duplicated = HANDLE::default();

        // SAFETY: `current_process` is valid. No preconditions. Returned handle is closed with its RAII wrapper.
        unsafe {
            DuplicateHandle(
                current_process,
                self.raw(),
                current_process,
                &mut duplicated,
                0,
                false,
                DUPLICATE_SAME_ACCESS,
            )?;
        }

        // SAFETY: The duplicated handle is owned by us.
        let handle = unsafe { Self::new_owned(duplicated)? };

        Ok(handle)
    }

    /// Controls whether child processes created with handle inheritance receive a copy of this handle.
    pub fn set_inheritable(&self, inheritable: bool) -> Result<(), Error> {
        let flags = if inheritable { HANDLE_FLAG_INHERIT } else { HANDLE_FLAGS(0) };

        // SAFETY: `self.raw` is a valid handle by construction.
        unsafe { SetHandleInformation(self.raw, HANDLE_FLAG_INHERIT.0, flags) }?;

        Ok(())
    }

    /// Duplicates this handle into the handle table of `target_process`, with the same access rights.
    ///
    /// The returned [`RemoteHandle`] closes the duplicate through `target_process` when dropped.
    pub fn duplicate_into(&self, target_process: &Process, inherit: bool) -> Result<RemoteHandle, Error> {
        // SAFETY: No preconditions. Always a valid handle.
        let current_process = unsafe { GetCurrentProcess() };

        let owner = target_process.handle.try_clone()?;
        let mut duplicated = HANDLE::default();

        // SAFETY: Both process handles are valid. The duplicate lives in the target process and
        // is released by `RemoteHandle`.
        unsafe {
            DuplicateHandle(
                current_process,
                self.raw(),
                owner.raw(),
                &mut duplicated,
                0,
                inherit,
                DUPLICATE_SAME_ACCESS,
            )?;
        }

        Ok(RemoteHandle {
            raw: duplicated,
            owner,
        })
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.owned {
            // SAFETY: `self.raw` is a valid handle to an open object by construction.
            //    It’s also safe to close it ourselves when `self.owned` is true per contract.
            let _ = unsafe { CloseHandle(self.raw) };
        }
    }
}

/// A handle value that is only meaningful inside the handle table of another process.
///
/// Dropping it first closes the slot in the owning process (`DUPLICATE_CLOSE_SOURCE`),
/// then releases our own handle to that process.
#[derive(Debug)]
pub struct RemoteHandle {
    // INVARIANT: `raw` is an open handle in the handle table of the process referred to by `owner`.
    raw: HANDLE,
    owner: Handle,
}

// SAFETY: The remote value is never dereferenced locally.
unsafe impl Send for RemoteHandle {}

// SAFETY: Same as above.
unsafe impl Sync for RemoteHandle {}

impl RemoteHandle {
    /// The handle value, as seen by the owning process.
    pub fn raw(&self) -> HANDLE {
        self.raw
    }
}

impl Drop for RemoteHandle {
    fn drop(&mut self) {
        // SAFETY: Per invariant, `raw` is open in the process referred to by `owner`.
        // With a null target and `DUPLICATE_CLOSE_SOURCE`, the source slot is only closed.
        let _ = unsafe {
            DuplicateHandle(
                self.owner.raw(),
                self.raw,
                HANDLE::default(),
                ptr::null_mut(),
                0,
                false,
                DUPLICATE_CLOSE_SOURCE,
            )
        };

        // `owner` is dropped right after, closing our handle to the owning process.
    }
}
