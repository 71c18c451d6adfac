use std::ptr;

use windows::Win32::Security;

use crate::utils::u32size_of;

#[derive(Debug, Default)]
pub struct SecurityAttributesInit {
    pub inherit_handle: bool,
}

impl SecurityAttributesInit {
    pub fn init(self) -> SecurityAttributes {
        let ptr = Box::into_raw(Box::new(Security::SECURITY_ATTRIBUTES {
            nLength: u32size_of::<Security::SECURITY_ATTRIBUTES>(),
            // Default security descriptor of the caller's access token.
            lpSecurityDescriptor: ptr::null_mut(),
            bInheritHandle: self.inherit_handle.into(),
        }));

        SecurityAttributes { ptr }
    }
}

#[derive(Debug)]
pub struct SecurityAttributes {
    // INVARIANT: A pointer allocated using Box::new.
    ptr: *mut Security::SECURITY_ATTRIBUTES,
}

impl SecurityAttributes {
    pub fn as_ptr(&self) -> *const Security::SECURITY_ATTRIBUTES {
        self.ptr.cast_const()
    }

    pub fn inherit_handle(&self) -> bool {
        // SAFETY: Per invariant, `ptr` is a valid boxed value for the lifetime of `self`.
        unsafe { (*self.ptr).bInheritHandle.as_bool() }
    }
}

impl Drop for SecurityAttributes {
    fn drop(&mut self) {
        // SAFETY: Per invariants, ptr is a ptr allocated using Box::new, and the Rust global allocator.
        let _ = unsafe { Box::from_raw(self.ptr) };
    }
}
