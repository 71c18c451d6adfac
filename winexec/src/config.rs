use std::fs::File;
use std::io::BufReader;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use tap::prelude::*;

/// Environment variable holding the configuration file path when `--config` is not given.
pub const CONFIG_PATH_ENV: &str = "WINEXEC_CONFIG";

#[derive(Debug, Clone, Default)]
pub struct Conf {
    pub verbosity_profile: dto::VerbosityProfile,
    pub output_encoding: Option<String>,
    pub wait_for_descendants: bool,
    pub debug: dto::DebugConf,
}

impl Conf {
    pub fn from_conf_file(conf_file: &dto::ConfFile) -> anyhow::Result<Self> {
        if let Some(directives) = conf_file.debug.as_ref().and_then(|debug| debug.log_directives.as_deref()) {
            crate::log::parse_directives(directives).context("invalid __debug__.LogDirectives")?;
        }

        let output_encoding = conf_file
            .output_encoding
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned);

        Ok(Conf {
            verbosity_profile: conf_file.verbosity_profile.unwrap_or_default(),
            output_encoding,
            wait_for_descendants: conf_file.wait_for_descendants.unwrap_or(false),
            debug: conf_file.debug.clone().unwrap_or_default(),
        })
    }

    /// Loads the configuration from `path`, or from the file named by [`CONFIG_PATH_ENV`].
    ///
    /// Without a configuration file, or when the file does not exist, defaults are used.
    pub fn load(path: Option<&Utf8Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_owned()),
            None => std::env::var(CONFIG_PATH_ENV).ok().map(Utf8PathBuf::from),
        };

        let conf_file = match path {
            Some(path) => load_conf_file(&path)
                .context("failed to load configuration")?
                .unwrap_or_else(dto::ConfFile::generate_new),
            None => dto::ConfFile::generate_new(),
        };

        Conf::from_conf_file(&conf_file).context("invalid configuration file")
    }
}

fn load_conf_file(conf_path: &Utf8Path) -> anyhow::Result<Option<dto::ConfFile>> {
    match File::open(conf_path) {
        Ok(file) => BufReader::new(file)
            .pipe(serde_json::from_reader)
            .map(Some)
            .with_context(|| format!("invalid config file at {conf_path}")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow::anyhow!(e).context(format!("couldn't open config file at {conf_path}"))),
    }
}

pub mod dto {
    /// Mirror of the JSON configuration file.
    ///
    /// Every key is optional. Unknown keys are kept as is.
    #[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct ConfFile {
        /// Verbosity profile
        #[serde(skip_serializing_if = "Option::is_none")]
        pub verbosity_profile: Option<VerbosityProfile>,

        /// Encoding used to decode the command output when none is given on the command line
        #[serde(skip_serializing_if = "Option::is_none")]
        pub output_encoding: Option<String>,

        /// Wait for the processes spawned by the command by default
        #[serde(skip_serializing_if = "Option::is_none")]
        pub wait_for_descendants: Option<bool>,

        /// (Unstable) Unsafe debug options for developers
        #[serde(rename = "__debug__", skip_serializing_if = "Option::is_none")]
        pub debug: Option<DebugConf>,

        /// Other unofficial options.
        #[serde(flatten)]
        pub rest: serde_json::Map<String, serde_json::Value>,
    }

    impl ConfFile {
        pub fn generate_new() -> Self {
            Self {
                verbosity_profile: None,
                output_encoding: None,
                wait_for_descendants: None,
                debug: None,
                rest: serde_json::Map::new(),
            }
        }
    }

    /// Verbosity profile (pre-defined tracing directives)
    #[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize, Default)]
    pub enum VerbosityProfile {
        /// Only warnings and errors, the command output must stay readable
        #[default]
        Default,
        /// Recommended profile for developers
        Debug,
        /// Show all traces
        All,
        /// Only show errors
        Quiet,
    }

    impl VerbosityProfile {
        pub fn to_log_filter(self) -> &'static str {
            match self {
                VerbosityProfile::Default => "warn",
                VerbosityProfile::Debug => "info,winexec=debug,process_exec=debug,win_api_wrappers=debug",
                VerbosityProfile::All => "trace",
                VerbosityProfile::Quiet => "error",
            }
        }
    }

    /// Unsafe debug options that should only ever be used at development stage
    ///
    /// These options might change or get removed without further notice.
    #[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct DebugConf {
        /// Directives string in the same form as the RUST_LOG environment variable
        #[serde(skip_serializing_if = "Option::is_none")]
        pub log_directives: Option<String>,
    }

    /// Manual Default trait implementation just to make sure default values are deliberates
    #[allow(clippy::derivable_impls)]
    impl Default for DebugConf {
        fn default() -> Self {
            Self { log_directives: None }
        }
    }
}
