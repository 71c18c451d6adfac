use win_api_wrappers::job::{
    CompletionPort, JOB_OBJECT_MSG_ACTIVE_PROCESS_ZERO, JOB_OBJECT_MSG_EXIT_PROCESS, JOB_OBJECT_MSG_NEW_PROCESS, Job,
};
use win_api_wrappers::process::Process;

use crate::error::ExecError;

/// A job object wired to a completion port, used to learn when a whole process tree is gone.
#[derive(Debug)]
pub enum JobTracker {
    Active {
        job: Job,
        port: CompletionPort,
        /// Failures are fatal instead of disabling the tracker, and descendants are waited for.
        required: bool,
    },
    Disabled,
}

impl JobTracker {
    /// Creates the job and its completion port.
    ///
    /// When not `required`, any failure yields [`JobTracker::Disabled`]: nested jobs are not
    /// available on every system, and tracking is then simply skipped.
    pub fn new(required: bool) -> Result<Self, ExecError> {
        match Self::try_new(required) {
            Ok(tracker) => Ok(tracker),
            Err(error) if required => Err(error),
            Err(error) => {
                warn!(%error, "Job tracking unavailable");
                Ok(JobTracker::Disabled)
            }
        }
    }

    fn try_new(required: bool) -> Result<Self, ExecError> {
        let job = Job::new_unnamed().map_err(ExecError::resource_creation("CreateJobObjectW"))?;

        let port = CompletionPort::new(1).map_err(ExecError::resource_creation("CreateIoCompletionPort"))?;

        job.associate_completion_port(&port, job.completion_key())
            .map_err(ExecError::resource_creation(
                "SetInformationJobObject(JobObjectAssociateCompletionPortInformation)",
            ))?;

        Ok(JobTracker::Active { job, port, required })
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobTracker::Active { .. })
    }

    /// Whether [`wait_process`](crate::wait_process) waits for every descendant of the process.
    ///
    /// Only a required tracker waits: a disabled one could not tell when the tree is gone.
    pub fn waits_for_descendants(&self) -> bool {
        matches!(self, JobTracker::Active { required: true, .. })
    }

    /// Adds `process` to the job. Must be called before the process is resumed, so every descendant is tracked.
    pub fn assign(&mut self, process: &Process) -> Result<(), ExecError> {
        let JobTracker::Active { job, required, .. } = self else {
            return Ok(());
        };
        let required = *required;

        match job.assign_process(process) {
            Ok(()) => Ok(()),
            Err(error) if required => Err(ExecError::resource_creation("AssignProcessToJobObject")(error)),
            Err(error) => {
                warn!(%error, "Failed to assign process to job, tracking disabled");
                *self = JobTracker::Disabled;
                Ok(())
            }
        }
    }

    /// Blocks until the job reports that no process is active anymore.
    ///
    /// Returns immediately when disabled. A failure to dequeue from the port ends the wait early.
    pub fn wait_for_zero_active(&self) {
        let JobTracker::Active { job, port, .. } = self else {
            return;
        };

        let key = job.completion_key();

        loop {
            let status = match port.dequeue(None) {
                Ok(status) => status,
                Err(error) => {
                    warn!(%error, "Failed to wait on the job completion port");
                    return;
                }
            };

            if status.key != key {
                continue;
            }

            match status.code {
                JOB_OBJECT_MSG_ACTIVE_PROCESS_ZERO => {
                    debug!("No active process left in job");
                    return;
                }
                JOB_OBJECT_MSG_NEW_PROCESS => trace!(pid = status.value, "Process joined job"),
                JOB_OBJECT_MSG_EXIT_PROCESS => trace!(pid = status.value, "Process in job exited"),
                code => trace!(code, "Job notification"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use win_api_wrappers::raw::Win32::System::Threading::{GetCurrentProcessId, PROCESS_QUERY_LIMITED_INFORMATION};

    use super::*;

    /// A handle to the current process lacking the rights needed to join a job.
    fn unassignable_process() -> Process {
        // SAFETY: No preconditions.
        let pid = unsafe { GetCurrentProcessId() };

        Process::get_by_pid(pid, PROCESS_QUERY_LIMITED_INFORMATION).unwrap()
    }

    #[test]
    fn required_tracker_is_active() {
        let tracker = JobTracker::new(true).unwrap();
        assert!(tracker.is_active());
        assert!(tracker.waits_for_descendants());
    }

    #[test]
    fn optional_tracker_does_not_wait() {
        let tracker = JobTracker::new(false).unwrap();
        assert!(!tracker.waits_for_descendants());
    }

    #[test]
    fn failed_assignment_disables_optional_tracker() {
        let mut tracker = JobTracker::new(false).unwrap();
        assert!(tracker.is_active());

        tracker.assign(&unassignable_process()).unwrap();

        assert!(!tracker.is_active());
    }

    #[test]
    fn failed_assignment_is_fatal_for_required_tracker() {
        let mut tracker = JobTracker::new(true).unwrap();

        let error = tracker.assign(&unassignable_process()).unwrap_err();

        let ExecError::ResourceCreation { operation, code } = &error else {
            panic!("unexpected error: {error:?}");
        };
        assert_eq!(*operation, "AssignProcessToJobObject");
        // ERROR_ACCESS_DENIED
        assert_eq!(*code, 5, "{error}");
        assert!(tracker.is_active());
    }

    #[test]
    fn disabled_tracker_does_nothing() {
        let mut tracker = JobTracker::Disabled;

        tracker.assign(&Process::current_process()).unwrap();
        tracker.wait_for_zero_active();

        assert!(!tracker.is_active());
        assert!(!tracker.waits_for_descendants());
    }
}
