use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;

use anyhow::Context as _;
use camino::{Utf8Path, Utf8PathBuf};
use tap::prelude::*;

use crate::config::Conf;

/// Exit code of the runner when the command ran but returned a non-zero code.
const NON_ZERO_RC_EXIT_CODE: i32 = 2;
const FAILURE_EXIT_CODE: i32 = 1;

/// A command to run, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub args: Vec<String>,
    /// Quote each argument instead of joining them verbatim.
    pub argv: bool,
    pub chdir: Option<Utf8PathBuf>,
    pub stdin: Option<String>,
    pub output_encoding: Option<String>,
    pub wait_children: bool,
    /// JSON file holding an object of environment variables.
    pub env_file: Option<Utf8PathBuf>,
    /// Skip the command when this path, or any path matching this pattern, exists.
    pub creates: Option<Utf8PathBuf>,
    /// Skip the command when this path, or any path matching this pattern, does not exist.
    pub removes: Option<Utf8PathBuf>,
}

/// The JSON document printed once the runner is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Report {
    Completed(Completed),
    Skipped(Skipped),
    Failed(Failed),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completed {
    pub cmd: String,
    pub rc: u32,
    pub stdout: String,
    pub stderr: String,
    pub start: String,
    pub end: String,
    pub delta: String,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub skipped: bool,
    pub changed: bool,
    pub msg: String,
    pub cmd: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failed {
    pub failed: bool,
    pub msg: String,
}

impl Report {
    pub fn skipped(cmd: String, msg: String) -> Self {
        Report::Skipped(Skipped {
            skipped: true,
            changed: false,
            msg,
            cmd,
        })
    }

    pub fn failed(error: &anyhow::Error) -> Self {
        Report::Failed(Failed {
            failed: true,
            msg: format!("{error:#}"),
        })
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Report::Completed(Completed { rc: 0, .. }) | Report::Skipped(_) => 0,
            Report::Completed(_) => NON_ZERO_RC_EXIT_CODE,
            Report::Failed(_) => FAILURE_EXIT_CODE,
        }
    }
}

impl Invocation {
    /// Returns why the command should not run, if it should not.
    ///
    /// `creates` and `removes` accept wildcards (`*`, `?`, `[...]`), matched without regard to case.
    pub fn skip_reason(&self) -> anyhow::Result<Option<String>> {
        if let Some(creates) = &self.creates {
            let path = self.resolve(creates);
            if path_matches(&path).context("invalid creates option")? {
                return Ok(Some(format!("{path} exists, matching creates option")));
            }
        }

        if let Some(removes) = &self.removes {
            let path = self.resolve(removes);
            if !path_matches(&path).context("invalid removes option")? {
                return Ok(Some(format!("{path} does not exist, matching removes option")));
            }
        }

        Ok(None)
    }

    /// Relative paths are relative to the working directory of the command.
    fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        match &self.chdir {
            Some(chdir) if path.is_relative() => chdir.join(path),
            _ => path.to_owned(),
        }
    }

    pub fn output_encoding(&self, conf: &Conf) -> Option<String> {
        self.output_encoding
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| conf.output_encoding.clone())
    }

    pub fn environment(&self) -> anyhow::Result<Option<HashMap<String, String>>> {
        self.env_file.as_deref().map(load_environment).transpose()
    }
}

/// Whether `pattern` names an existing path, or matches at least one.
fn path_matches(pattern: &Utf8Path) -> anyhow::Result<bool> {
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..glob::MatchOptions::new()
    };

    let mut paths = glob::glob_with(pattern.as_str(), options).with_context(|| format!("bad pattern `{pattern}`"))?;

    Ok(paths.any(|entry| entry.is_ok()))
}

fn load_environment(path: &Utf8Path) -> anyhow::Result<HashMap<String, String>> {
    File::open(path)
        .with_context(|| format!("couldn't open environment file at {path}"))?
        .pipe(BufReader::new)
        .pipe(serde_json::from_reader)
        .with_context(|| format!("environment file at {path} is not a JSON object of strings"))
}

#[cfg(windows)]
mod win {
    use std::time::SystemTime;

    use process_exec::{ExecOptions, run};
    use win_api_wrappers::utils::CommandLine;

    use super::*;

    impl Invocation {
        pub fn command_line(&self) -> String {
            if self.argv {
                CommandLine::new(self.args.clone()).to_command_line()
            } else {
                self.args.join(" ")
            }
        }
    }

    /// Runs the command unless a `creates`/`removes` condition says otherwise.
    pub fn execute(invocation: &Invocation, conf: &Conf) -> Report {
        try_execute(invocation, conf).unwrap_or_else(|error| {
            error!(error = format!("{error:#}"), "Command failed");
            Report::failed(&error)
        })
    }

    fn try_execute(invocation: &Invocation, conf: &Conf) -> anyhow::Result<Report> {
        let cmd = invocation.command_line();

        if cmd.trim().is_empty() {
            anyhow::bail!("no command line given");
        }

        if let Some(msg) = invocation.skip_reason()? {
            info!(%cmd, %msg, "Command skipped");
            return Ok(Report::skipped(cmd, msg));
        }

        let options = ExecOptions {
            command_line: cmd.clone(),
            current_directory: invocation.chdir.clone(),
            environment: invocation.environment()?,
            stdin: invocation.stdin.clone().map(String::into_bytes),
            output_encoding: invocation.output_encoding(conf),
            wait_for_descendants: invocation.wait_children || conf.wait_for_descendants,
            ..ExecOptions::default()
        };

        debug!(?options, "Running command");

        let start = SystemTime::now();
        let result = run(&options).with_context(|| format!("failed to run `{cmd}`"))?;
        let end = SystemTime::now();

        let delta = end.duration_since(start).unwrap_or_default();

        Ok(Report::Completed(Completed {
            cmd,
            rc: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
            start: humantime::format_rfc3339_micros(start).to_string(),
            end: humantime::format_rfc3339_micros(end).to_string(),
            delta: humantime::format_duration(delta).to_string(),
            changed: true,
        }))
    }
}

#[cfg(windows)]
pub use win::execute;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use rstest::rstest;

    use super::*;

    fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    #[test]
    fn runs_without_conditions() {
        assert_eq!(Invocation::default().skip_reason().unwrap(), None);
    }

    #[test]
    fn creates_skips_when_present() {
        let (_dir, path) = temp_dir();
        std::fs::write(path.join("done"), b"").unwrap();

        let invocation = Invocation {
            chdir: Some(path.clone()),
            creates: Some(Utf8PathBuf::from("done")),
            ..Default::default()
        };

        let reason = invocation.skip_reason().unwrap().unwrap();
        assert!(reason.ends_with("exists, matching creates option"), "{reason}");

        let invocation = Invocation {
            creates: Some(path.join("not-done")),
            ..Default::default()
        };

        assert_eq!(invocation.skip_reason().unwrap(), None);
    }

    #[test]
    fn removes_skips_when_absent() {
        let (_dir, path) = temp_dir();

        let invocation = Invocation {
            removes: Some(path.join("gone")),
            ..Default::default()
        };

        let reason = invocation.skip_reason().unwrap().unwrap();
        assert!(reason.ends_with("does not exist, matching removes option"), "{reason}");

        std::fs::write(path.join("gone"), b"").unwrap();
        assert_eq!(invocation.skip_reason().unwrap(), None);
    }

    #[rstest]
    #[case("*.done", true)]
    #[case("SETUP.?ONE", true)]
    #[case("setup.[dx]one", true)]
    #[case("*.log", false)]
    fn creates_accepts_patterns(#[case] pattern: &str, #[case] skipped: bool) {
        let (_dir, path) = temp_dir();
        std::fs::write(path.join("setup.done"), b"").unwrap();

        let invocation = Invocation {
            chdir: Some(path.clone()),
            creates: Some(Utf8PathBuf::from(pattern)),
            ..Default::default()
        };

        assert_eq!(invocation.skip_reason().unwrap().is_some(), skipped);
    }

    #[test]
    fn removes_accepts_patterns() {
        let (_dir, path) = temp_dir();

        let invocation = Invocation {
            removes: Some(path.join("*.tmp")),
            ..Default::default()
        };

        assert!(invocation.skip_reason().unwrap().is_some());

        std::fs::write(path.join("leftover.tmp"), b"").unwrap();
        assert_eq!(invocation.skip_reason().unwrap(), None);
    }

    #[test]
    fn malformed_pattern_is_an_error() {
        let invocation = Invocation {
            creates: Some(Utf8PathBuf::from("setup.[done")),
            ..Default::default()
        };

        assert!(invocation.skip_reason().is_err());
    }

    #[rstest]
    #[case(Some("utf-16"), Some("cp437"), Some("utf-16"))]
    #[case(Some("  "), Some("cp437"), Some("cp437"))]
    #[case(None, Some("cp437"), Some("cp437"))]
    #[case(None, None, None)]
    fn output_encoding_precedence(
        #[case] flag: Option<&str>,
        #[case] configured: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        let invocation = Invocation {
            output_encoding: flag.map(str::to_owned),
            ..Default::default()
        };
        let conf = Conf {
            output_encoding: configured.map(str::to_owned),
            ..Default::default()
        };

        assert_eq!(invocation.output_encoding(&conf).as_deref(), expected);
    }

    #[test]
    fn environment_file() {
        let (_dir, path) = temp_dir();
        let env_file = path.join("env.json");
        std::fs::write(&env_file, br#"{"FOO":"bar","EMPTY":""}"#).unwrap();

        let invocation = Invocation {
            env_file: Some(env_file),
            ..Default::default()
        };

        let environment = invocation.environment().unwrap().unwrap();
        assert_eq!(environment.len(), 2);
        assert_eq!(environment["FOO"], "bar");
    }

    #[rstest]
    #[case(br#"["FOO"]"#.as_slice())]
    #[case(br#"{"FOO":1}"#.as_slice())]
    fn invalid_environment_file(#[case] contents: &[u8]) {
        let (_dir, path) = temp_dir();
        let env_file = path.join("env.json");
        std::fs::write(&env_file, contents).unwrap();

        let invocation = Invocation {
            env_file: Some(env_file),
            ..Default::default()
        };

        assert!(invocation.environment().is_err());
    }

    #[test]
    fn skipped_document() {
        let report = Report::skipped("cmd /c exit 1".to_owned(), "C:\\done exists".to_owned());

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "skipped": true,
                "changed": false,
                "msg": "C:\\done exists",
                "cmd": "cmd /c exit 1",
            })
        );
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn failed_document() {
        let error = anyhow::anyhow!("CreateProcessW failed").context("failed to run `nothing.exe`");
        let report = Report::failed(&error);

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "failed": true,
                "msg": "failed to run `nothing.exe`: CreateProcessW failed",
            })
        );
        assert_eq!(report.exit_code(), 1);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 2)]
    #[case(u32::MAX, 2)]
    fn completed_exit_code(#[case] rc: u32, #[case] expected: i32) {
        let report = Report::Completed(Completed {
            cmd: "cmd".to_owned(),
            rc,
            stdout: String::new(),
            stderr: String::new(),
            start: String::new(),
            end: String::new(),
            delta: String::new(),
            changed: true,
        });

        assert_eq!(report.exit_code(), expected);
    }
}
