use tracing::{debug, warn};
use windows::Win32::System::Console::{AllocConsole, FreeConsole, GetConsoleWindow, SetConsoleCP, SetConsoleOutputCP};

use crate::scope_guard::ScopeGuard;

const CP_UTF8: u32 = 65001;

/// Frees the console on drop, if it was allocated.
pub type ConsoleGuard = ScopeGuard<bool, fn(bool)>;

pub fn is_console_attached() -> bool {
    // SAFETY: No preconditions.
    let window = unsafe { GetConsoleWindow() };

    !window.0.is_null()
}

/// Ensures the current process has a console while the returned guard is alive.
///
/// When none is attached, a new one is allocated with UTF-8 input and output code pages.
/// This is best effort: failures are logged and the guard is then a no-op.
pub fn allocate_console_if_detached() -> ConsoleGuard {
    let allocated = !is_console_attached() && allocate_utf8_console();

    ScopeGuard::new(allocated, free_console as fn(bool))
}

fn allocate_utf8_console() -> bool {
    // SAFETY: No preconditions.
    if let Err(error) = unsafe { AllocConsole() } {
        warn!(%error, "Failed to allocate a console");
        return false;
    }

    // SAFETY: No preconditions.
    if let Err(error) = unsafe { SetConsoleCP(CP_UTF8) } {
        warn!(%error, "Failed to set the console input code page");
    }

    // SAFETY: No preconditions.
    if let Err(error) = unsafe { SetConsoleOutputCP(CP_UTF8) } {
        warn!(%error, "Failed to set the console output code page");
    }

    debug!("Allocated a UTF-8 console");

    true
}

fn free_console(allocated: bool) {
    if allocated {
        // SAFETY: No preconditions. We allocated the console ourselves.
        let _ = unsafe { FreeConsole() };
    }
}
