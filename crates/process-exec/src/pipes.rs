use win_api_wrappers::pipe::Pipe;
use win_api_wrappers::security::attributes::SecurityAttributesInit;

use crate::error::ExecError;

/// The ends kept by the launching process.
#[derive(Debug)]
pub struct ParentPipes {
    pub stdin: Pipe,
    pub stdout: Pipe,
    pub stderr: Pipe,
}

/// The inheritable ends handed to the child.
#[derive(Debug)]
pub struct ChildPipes {
    pub stdin: Pipe,
    pub stdout: Pipe,
    pub stderr: Pipe,
}

/// The three standard stream pipes of a child process.
///
/// Only the child ends are inheritable. They must be closed in the parent once the child
/// is launched, otherwise reading the parent ends never reaches end of file.
#[derive(Debug)]
pub struct PipeSet {
    pub parent: ParentPipes,
    pub child: ChildPipes,
}

impl PipeSet {
    pub fn new() -> Result<Self, ExecError> {
        let (stdout_read, stdout_write) = new_inheritable_pipe("STDOUT pipe setup", ParentEnd::Read)?;
        let (stderr_read, stderr_write) = new_inheritable_pipe("STDERR pipe setup", ParentEnd::Read)?;
        let (stdin_read, stdin_write) = new_inheritable_pipe("STDIN pipe setup", ParentEnd::Write)?;

        debug!("Created standard stream pipes");

        Ok(Self {
            parent: ParentPipes {
                stdin: stdin_write,
                stdout: stdout_read,
                stderr: stderr_read,
            },
            child: ChildPipes {
                stdin: stdin_read,
                stdout: stdout_write,
                stderr: stderr_write,
            },
        })
    }

    pub fn split(self) -> (ParentPipes, ChildPipes) {
        (self.parent, self.child)
    }
}

enum ParentEnd {
    Read,
    Write,
}

/// Returns (rx, tx), with the end designated by `parent_end` made non-inheritable.
fn new_inheritable_pipe(operation: &'static str, parent_end: ParentEnd) -> Result<(Pipe, Pipe), ExecError> {
    let security_attributes = SecurityAttributesInit { inherit_handle: true }.init();

    let (rx, tx) = Pipe::new_anonymous(Some(&security_attributes), 0).map_err(ExecError::resource_creation(operation))?;

    let kept = match parent_end {
        ParentEnd::Read => &rx,
        ParentEnd::Write => &tx,
    };

    kept.handle
        .set_inheritable(false)
        .map_err(ExecError::resource_creation(operation))?;

    Ok((rx, tx))
}
