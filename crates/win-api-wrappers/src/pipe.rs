use std::io::{self, Read, Write};

use windows::Win32::Foundation::{ERROR_BROKEN_PIPE, ERROR_NO_DATA, HANDLE};
use windows::Win32::Storage::FileSystem::{FlushFileBuffers, ReadFile, WriteFile};
use windows::Win32::System::Pipes::CreatePipe;

use crate::Error;
use crate::handle::Handle;
use crate::security::attributes::SecurityAttributes;

/// One end of an anonymous pipe.
#[derive(Debug)]
pub struct Pipe {
    pub handle: Handle,
}

impl Pipe {
    /// Creates an anonymous pipe. Returns (rx, tx)
    ///
    /// Both ends follow `security_attributes` for inheritance. A `size` of zero selects the system default buffer size.
    pub fn new_anonymous(security_attributes: Option<&SecurityAttributes>, size: u32) -> Result<(Self, Self), Error> {
        let (mut rx, mut tx) = (HANDLE::default(), HANDLE::default());

        // SAFETY: FFI call with no outstanding preconditions.
        unsafe { CreatePipe(&mut rx, &mut tx, security_attributes.map(|x| x.as_ptr()), size) }?;

        // SAFETY: We created the resource above and are thus owning it.
        let rx = unsafe { Handle::new_owned(rx)? };

        // SAFETY: We created the resource above and are thus owning it.
        let tx = unsafe { Handle::new_owned(tx)? };

        Ok((Self { handle: rx }, Self { handle: tx }))
    }
}

/// Returns true when the other end of the pipe is gone.
pub fn is_disconnected(error: &io::Error) -> bool {
    let code = error.raw_os_error().and_then(|code| u32::try_from(code).ok());

    code == Some(ERROR_BROKEN_PIPE.0) || code == Some(ERROR_NO_DATA.0)
}

fn to_io_error(error: windows::core::Error) -> io::Error {
    let code = Error::from(error).win32_code();
    io::Error::from_raw_os_error(i32::from_ne_bytes(code.to_ne_bytes()))
}

impl Read for Pipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut read_bytes = 0;

        // SAFETY: FFI call with no outstanding preconditions.
        let result = unsafe { ReadFile(self.handle.raw(), Some(buf), Some(&mut read_bytes), None) };

        match result {
            Ok(()) => Ok(read_bytes as usize),
            // The write end was closed by every holder: this is how an anonymous pipe signals EOF.
            Err(error) if error.code() == ERROR_BROKEN_PIPE.to_hresult() => Ok(0),
            Err(error) => Err(to_io_error(error)),
        }
    }
}

impl Write for Pipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut written_bytes = 0;

        // SAFETY: FFI call with no outstanding preconditions.
        unsafe { WriteFile(self.handle.raw(), Some(buf), Some(&mut written_bytes), None) }.map_err(to_io_error)?;

        Ok(written_bytes as usize)
    }

    fn flush(&mut self) -> io::Result<()> {
        // SAFETY: FFI call with no outstanding preconditions.
        unsafe { FlushFileBuffers(self.handle.raw()) }.map_err(to_io_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn read_after_writer_closed_is_eof() {
        let (mut rx, mut tx) = Pipe::new_anonymous(None, 0).unwrap();

        tx.write_all(b"hello").unwrap();
        drop(tx);

        let mut out = Vec::new();
        rx.read_to_end(&mut out).unwrap();

        assert_eq!(out, b"hello");
    }

    #[test]
    fn write_after_reader_closed_is_disconnected() {
        let (rx, mut tx) = Pipe::new_anonymous(None, 0).unwrap();
        drop(rx);

        let error = tx.write_all(b"hello").unwrap_err();

        assert!(is_disconnected(&error));
    }
}
