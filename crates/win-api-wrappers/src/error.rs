use std::fmt::Debug;

use thiserror::Error;
use windows::Win32::Foundation::{E_POINTER, WIN32_ERROR};
use windows::core::HRESULT;

/// HRESULT facility used when a Win32 error code is wrapped into an HRESULT.
const FACILITY_WIN32: i32 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Win32(#[from] windows::core::Error),
    #[error("null pointer: {0}")]
    NullPointer(&'static str),
}

impl Error {
    pub fn code(&self) -> i32 {
        match self {
            Error::Win32(err) => err.code().0,
            Error::NullPointer(_) => E_POINTER.0,
        }
    }

    /// Returns the raw Win32 error code when the HRESULT wraps one.
    ///
    /// Other HRESULT values are returned as their bit pattern.
    pub fn win32_code(&self) -> u32 {
        let code = self.code();

        if (code >> 16) & 0x1FFF == FACILITY_WIN32 {
            u32::from_ne_bytes(code.to_ne_bytes()) & 0xFFFF
        } else {
            u32::from_ne_bytes(code.to_ne_bytes())
        }
    }

    // FIXME: This function may be confusing. It may be best to mimick the windows crate.
    pub fn last_error() -> Self {
        Self::Win32(windows::core::Error::from_win32())
    }

    pub fn from_hresult(hresult: HRESULT) -> Self {
        Self::Win32(windows::core::Error::from_hresult(hresult))
    }

    pub fn from_win32(win32_error: WIN32_ERROR) -> Self {
        Self::from_hresult(HRESULT::from_win32(win32_error.0))
    }
}
