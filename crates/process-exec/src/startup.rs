use win_api_wrappers::handle::{Handle, RemoteHandle};
use win_api_wrappers::process::{Process, StartupInfo};
use win_api_wrappers::raw::Win32::Foundation::HANDLE;
use win_api_wrappers::raw::Win32::System::Threading::{
    PROCESS_CREATE_PROCESS, PROCESS_DUP_HANDLE, STARTF_USESHOWWINDOW, STARTF_USESTDHANDLES,
};
use win_api_wrappers::thread::ThreadAttributeList;
use win_api_wrappers::utils::WideString;

use crate::error::ExecError;
use crate::options::WindowStyle;

/// How the child is started: console, window and standard streams.
#[derive(Debug, Default)]
pub struct StartupConfig<'a> {
    /// Blank values are ignored.
    pub desktop: Option<&'a str>,
    /// Blank values are ignored.
    pub title: Option<&'a str>,
    pub window_style: Option<WindowStyle>,
    pub std_input: Option<&'a Handle>,
    pub std_output: Option<&'a Handle>,
    pub std_error: Option<&'a Handle>,
    /// Spoofed parent: the child is created as if `CreateProcess` was called from that process.
    pub parent_process_id: Option<u32>,
}

/// A [`StartupInfo`] along with every resource it points to.
///
/// Must be kept alive until the process creation call returns.
#[derive(Debug)]
pub struct PreparedStartup {
    pub info: StartupInfo,
    attributes: Option<ThreadAttributeList>,
    // Closed in the parent process once the child inherited them.
    remote_handles: Vec<RemoteHandle>,
}

impl PreparedStartup {
    pub fn parent_process(&self) -> Option<&Process> {
        self.attributes.as_ref().and_then(ThreadAttributeList::parent_process)
    }

    /// The only handles the child may inherit.
    pub fn inherited_handles(&self) -> &[HANDLE] {
        self.attributes
            .as_ref()
            .map(ThreadAttributeList::handle_list)
            .unwrap_or_default()
    }

    pub fn remote_handle_count(&self) -> usize {
        self.remote_handles.len()
    }
}

impl StartupConfig<'_> {
    pub fn prepare(&self) -> Result<PreparedStartup, ExecError> {
        let mut info = StartupInfo::default();

        if let Some(desktop) = non_blank(self.desktop) {
            info.desktop = WideString::from(desktop);
        }

        if let Some(title) = non_blank(self.title) {
            info.title = WideString::from(title);
        }

        if let Some(style) = self.window_style {
            info.flags |= STARTF_USESHOWWINDOW;
            info.show_window = style.show_command();
        }

        let parent = self
            .parent_process_id
            .map(|pid| {
                Process::get_by_pid(pid, PROCESS_CREATE_PROCESS | PROCESS_DUP_HANDLE)
                    .map_err(ExecError::handle_setup("OpenProcess(ParentProcessId)"))
            })
            .transpose()?;

        let mut remote_handles = Vec::new();

        let streams = [
            (self.std_input, "duplicate STDIN handle into parent process"),
            (self.std_output, "duplicate STDOUT handle into parent process"),
            (self.std_error, "duplicate STDERR handle into parent process"),
        ];

        if streams.iter().any(|(handle, _)| handle.is_some()) {
            info.flags |= STARTF_USESTDHANDLES;
        }

        let mut raw_handles = [HANDLE::default(); 3];

        for ((handle, operation), raw) in streams.into_iter().zip(raw_handles.iter_mut()) {
            let Some(handle) = handle else {
                continue;
            };

            *raw = match &parent {
                // Inheritance happens from the parent's handle table.
                Some(parent) => {
                    let remote = handle
                        .duplicate_into(parent, true)
                        .map_err(ExecError::handle_setup(operation))?;
                    let raw = remote.raw();
                    remote_handles.push(remote);
                    raw
                }
                None => handle.raw(),
            };
        }

        [info.std_input, info.std_output, info.std_error] = raw_handles;

        let mut inherited: Vec<HANDLE> = Vec::with_capacity(raw_handles.len());

        for raw in raw_handles {
            if !raw.is_invalid() && !inherited.contains(&raw) {
                inherited.push(raw);
            }
        }

        let attribute_count = u32::from(parent.is_some()) + u32::from(!inherited.is_empty());

        let attributes = if attribute_count > 0 {
            let mut attributes = ThreadAttributeList::with_count(attribute_count)
                .map_err(ExecError::resource_creation("InitializeProcThreadAttributeList"))?;

            if let Some(parent) = parent {
                attributes
                    .set_parent_process(parent)
                    .map_err(ExecError::handle_setup("UpdateProcThreadAttribute(ParentProcess)"))?;

                debug!(parent_process_id = self.parent_process_id, "Spoofing parent process");
            }

            // Other inheritable handles of this process must not leak into the child.
            if !inherited.is_empty() {
                attributes
                    .set_handle_list(inherited)
                    .map_err(ExecError::handle_setup("UpdateProcThreadAttribute(HandleList)"))?;
            }

            info.attribute_list = Some(attributes.raw());

            Some(attributes)
        } else {
            None
        };

        Ok(PreparedStartup {
            info,
            attributes,
            remote_handles,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use win_api_wrappers::raw::Win32::System::Threading::{GetCurrentProcessId, STARTUPINFOW_FLAGS};

    use super::*;
    use crate::pipes::PipeSet;

    #[test]
    fn default_config_sets_nothing() {
        let prepared = StartupConfig::default().prepare().unwrap();

        assert_eq!(prepared.info.flags, STARTUPINFOW_FLAGS(0));
        assert!(prepared.info.desktop.0.is_none());
        assert!(prepared.info.title.0.is_none());
        assert!(prepared.info.attribute_list.is_none());
        assert!(prepared.parent_process().is_none());
    }

    #[test]
    fn blank_strings_are_ignored() {
        let config = StartupConfig {
            desktop: Some(" "),
            title: Some(""),
            ..Default::default()
        };

        let prepared = config.prepare().unwrap();

        assert!(prepared.info.desktop.0.is_none());
        assert!(prepared.info.title.0.is_none());
    }

    #[test]
    fn window_style_sets_show_window() {
        let config = StartupConfig {
            window_style: Some(WindowStyle::Hidden),
            ..Default::default()
        };

        let prepared = config.prepare().unwrap();

        assert!(prepared.info.flags.contains(STARTF_USESHOWWINDOW));
        assert_eq!(prepared.info.show_window, 0);
    }

    #[test]
    fn any_std_handle_enables_redirection() {
        let pipes = PipeSet::new().unwrap();

        let config = StartupConfig {
            std_output: Some(&pipes.child.stdout.handle),
            ..Default::default()
        };

        let prepared = config.prepare().unwrap();

        assert!(prepared.info.flags.contains(STARTF_USESTDHANDLES));
        assert_eq!(prepared.info.std_output, pipes.child.stdout.handle.raw());
        assert!(prepared.info.std_input.0.is_null());
        assert_eq!(prepared.remote_handle_count(), 0);
    }

    #[test]
    fn inheritance_is_restricted_to_std_handles() {
        let pipes = PipeSet::new().unwrap();
        let unrelated = PipeSet::new().unwrap();

        let config = StartupConfig {
            std_input: Some(&pipes.child.stdin.handle),
            std_output: Some(&pipes.child.stdout.handle),
            std_error: Some(&pipes.child.stderr.handle),
            ..Default::default()
        };

        let prepared = config.prepare().unwrap();

        assert!(prepared.info.attribute_list.is_some());
        assert!(prepared.parent_process().is_none());
        assert_eq!(
            prepared.inherited_handles(),
            [
                pipes.child.stdin.handle.raw(),
                pipes.child.stdout.handle.raw(),
                pipes.child.stderr.handle.raw(),
            ]
        );
        assert!(!prepared.inherited_handles().contains(&unrelated.child.stdout.handle.raw()));
    }

    #[test]
    fn spoofed_parent_duplicates_std_handles() {
        let pipes = PipeSet::new().unwrap();

        // SAFETY: No preconditions.
        let pid = unsafe { GetCurrentProcessId() };

        let config = StartupConfig {
            std_input: Some(&pipes.child.stdin.handle),
            std_output: Some(&pipes.child.stdout.handle),
            std_error: Some(&pipes.child.stderr.handle),
            parent_process_id: Some(pid),
            ..Default::default()
        };

        let prepared = config.prepare().unwrap();

        assert_eq!(prepared.remote_handle_count(), 3);
        assert!(prepared.info.attribute_list.is_some());
        assert!(prepared.parent_process().is_some());
        assert_ne!(prepared.info.std_output, pipes.child.stdout.handle.raw());
        assert_eq!(
            prepared.inherited_handles(),
            [prepared.info.std_input, prepared.info.std_output, prepared.info.std_error]
        );
    }

    #[test]
    fn unknown_parent_is_a_handle_setup_error() {
        let config = StartupConfig {
            // Process ids are multiples of 4.
            parent_process_id: Some(0xFFFF_FFFD),
            ..Default::default()
        };

        let error = config.prepare().unwrap_err();

        assert!(matches!(error, ExecError::HandleSetup { .. }), "{error:?}");
    }
}
