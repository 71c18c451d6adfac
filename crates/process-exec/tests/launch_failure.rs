//! Kept in its own test binary: other tests running concurrently would skew the handle count.

#![cfg(windows)]
#![allow(clippy::unwrap_used)]

use process_exec::{ExecError, ExecOptions, run};
use win_api_wrappers::raw::Win32::System::Threading::{GetCurrentProcess, GetProcessHandleCount};

fn handle_count() -> u32 {
    let mut count = 0;

    // SAFETY: The pseudo handle of the current process is always valid, and `count` outlives the call.
    unsafe { GetProcessHandleCount(GetCurrentProcess(), &mut count) }.unwrap();

    count
}

fn launch_missing_executable() -> ExecError {
    let mut options = ExecOptions::new(r"C:\does\not\exist\nothing.exe --flag");
    options.stdin = Some(b"ignored".to_vec());
    options.wait_for_descendants = true;

    run(&options).unwrap_err()
}

#[test]
fn failed_launch_releases_every_handle() {
    // Lets one-time initialization settle before measuring.
    launch_missing_executable();

    let before = handle_count();

    for _ in 0..16 {
        let error = launch_missing_executable();

        let ExecError::Launch { operation, code } = &error else {
            panic!("unexpected error: {error:?}");
        };

        assert_eq!(*operation, "CreateProcessW");
        // ERROR_FILE_NOT_FOUND or ERROR_PATH_NOT_FOUND
        assert!(matches!(code, 2 | 3), "{error}");
        assert!(error.to_string().starts_with("CreateProcessW failed ("), "{error}");
    }

    assert_eq!(handle_count(), before);
}
