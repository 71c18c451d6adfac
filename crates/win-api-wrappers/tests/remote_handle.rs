//! Kept in its own test binary: other tests running concurrently would skew the handle count.

#![cfg(windows)]
#![allow(clippy::unwrap_used)]

use win_api_wrappers::handle::Handle;
use win_api_wrappers::process::Process;
use win_api_wrappers::raw::Win32::Foundation::GetHandleInformation;
use win_api_wrappers::raw::Win32::System::Threading::{CreateEventW, GetCurrentProcess, GetProcessHandleCount};
use win_api_wrappers::raw::core::PCWSTR;

fn handle_count() -> u32 {
    let mut count = 0;

    // SAFETY: The pseudo handle of the current process is always valid, and `count` outlives the call.
    unsafe { GetProcessHandleCount(GetCurrentProcess(), &mut count) }.unwrap();

    count
}

fn is_open(handle: &Handle) -> bool {
    let mut flags = 0u32;

    // SAFETY: Querying a stale value only fails, nothing is dereferenced.
    unsafe { GetHandleInformation(handle.raw(), &mut flags) }.is_ok()
}

#[test]
fn dropping_remote_handle_releases_both_slots() {
    // SAFETY: FFI call with no outstanding precondition.
    let event = unsafe { CreateEventW(None, true, false, PCWSTR::null()) }.unwrap();
    // SAFETY: We created the resource above and are thus owning it.
    let event = unsafe { Handle::new_owned(event) }.unwrap();

    let target = Process::current_process();

    let before = handle_count();

    let remote = event.duplicate_into(&target, true).unwrap();
    let remote_view = Handle::new_borrowed(remote.raw()).unwrap();

    // The duplicated slot, plus our own handle to the owning process.
    assert_eq!(handle_count(), before + 2);
    assert!(is_open(&remote_view));

    drop(remote);

    assert_eq!(handle_count(), before);
    assert!(!is_open(&remote_view));
    assert!(is_open(&event));
}
