use std::io::{Read, Write};
use std::thread;

use win_api_wrappers::console::allocate_console_if_detached;
use win_api_wrappers::pipe::{Pipe, is_disconnected};
use win_api_wrappers::process::{EnvironmentBlock, Process, ProcessInformation};
use win_api_wrappers::scope_guard::ScopeGuard;

use crate::encoding::OutputEncoding;
use crate::error::{ExecError, Stream};
use crate::launch::{LaunchRequest, launch};
use crate::options::{ExecOptions, ExecutionResult};
use crate::pipes::{ParentPipes, PipeSet};
use crate::startup::StartupConfig;
use crate::tracker::JobTracker;

/// Exit code given to a child terminated because its setup could not be completed.
const SETUP_FAILURE_EXIT_CODE: u32 = 1;

/// Runs a command to completion and captures its output.
///
/// Blocks until the process exits and, when `wait_for_descendants` is set, until every
/// process it spawned has exited too.
pub fn run(options: &ExecOptions) -> Result<ExecutionResult, ExecError> {
    let encoding = OutputEncoding::from_label(options.output_encoding.as_deref())?;

    let environment = match &options.environment {
        Some(environment) => {
            EnvironmentBlock::new(environment).map_err(ExecError::resource_creation("environment block"))?
        }
        None => None,
    };

    let pipes = PipeSet::new()?;
    let tracker = JobTracker::new(options.wait_for_descendants)?;

    let request = LaunchRequest {
        application_name: options.application_name.as_deref(),
        command_line: &options.command_line,
        current_directory: options.current_directory.as_deref(),
        environment: environment.as_ref(),
        inherit_handles: true,
        startup: StartupConfig {
            std_input: Some(&pipes.child.stdin.handle),
            std_output: Some(&pipes.child.stdout.handle),
            std_error: Some(&pipes.child.stderr.handle),
            parent_process_id: options.parent_process_id,
            ..Default::default()
        },
        ..Default::default()
    };

    let launched = {
        let _console = allocate_console_if_detached();
        launch(&request)?
    };

    wait_process(launched, pipes, tracker, options.stdin.as_deref(), encoding)
}

/// Drives a process returned by [`launch`] to completion.
///
/// The process is attached to `tracker` and resumed. Its output is then drained from `pipes`
/// while `stdin` is written, after which its exit code is collected. A required `tracker`
/// also makes this wait until every descendant has exited.
pub fn wait_process(
    launched: ProcessInformation,
    pipes: PipeSet,
    mut tracker: JobTracker,
    stdin: Option<&[u8]>,
    encoding: OutputEncoding,
) -> Result<ExecutionResult, ExecError> {
    let ProcessInformation {
        process,
        thread,
        process_id,
        ..
    } = launched;

    // A suspended child is left behind if setup fails, terminate it.
    let suspended = ScopeGuard::new(&process, |process: &Process| {
        let _ = process.terminate(SETUP_FAILURE_EXIT_CODE);
    });

    tracker.assign(&process)?;
    thread.resume().map_err(ExecError::launch("ResumeThread"))?;

    suspended.defuse();
    drop(thread);

    debug!(pid = process_id, "Resumed process");

    // Only the child must hold the write ends now, for EOF to be observed.
    let (parent, child) = pipes.split();
    drop(child);

    let (stdout, stderr) = exchange(parent, stdin, encoding)?;

    process
        .wait(None)
        .map_err(ExecError::wait("WaitForSingleObject"))?;

    let exit_code = process.exit_code().map_err(ExecError::wait("GetExitCodeProcess"))?;

    debug!(pid = process_id, exit_code, "Process exited");

    if tracker.waits_for_descendants() {
        tracker.wait_for_zero_active();
    }

    info!(pid = process_id, exit_code, "Command completed");

    Ok(ExecutionResult {
        stdout,
        stderr,
        exit_code,
    })
}

/// Drains stdout and stderr on their own threads while stdin is written from the calling one.
fn exchange(parent: ParentPipes, stdin: Option<&[u8]>, encoding: OutputEncoding) -> Result<(String, String), ExecError> {
    let ParentPipes {
        stdin: stdin_pipe,
        stdout,
        stderr,
    } = parent;

    thread::scope(|scope| {
        let stdout = scope.spawn(move || drain(stdout, Stream::Stdout, encoding));
        let stderr = scope.spawn(move || drain(stderr, Stream::Stderr, encoding));

        // Always consumes the pipe, so the child sees EOF even without a payload.
        let written = feed(stdin_pipe, stdin.unwrap_or_default());

        let stdout = stdout.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        let stderr = stderr.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic));

        written?;

        debug!("Standard streams drained");

        Ok((stdout?, stderr?))
    })
}

fn drain(mut pipe: Pipe, stream: Stream, encoding: OutputEncoding) -> Result<String, ExecError> {
    let mut bytes = Vec::new();

    pipe.read_to_end(&mut bytes)
        .map_err(|source| ExecError::Io { stream, source })?;

    Ok(encoding.decode(&bytes))
}

fn feed(mut pipe: Pipe, payload: &[u8]) -> Result<(), ExecError> {
    if payload.is_empty() {
        return Ok(());
    }

    match pipe.write_all(payload) {
        Ok(()) => Ok(()),
        // The child exited or closed its input before reading everything.
        Err(error) if is_disconnected(&error) => {
            debug!(%error, "Child stopped reading its standard input");
            Ok(())
        }
        Err(source) => Err(ExecError::Io {
            stream: Stream::Stdin,
            source,
        }),
    }
}
