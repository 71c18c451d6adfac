use anyhow::Context as _;
use camino::Utf8PathBuf;
use seahorse::{App, Context, Flag, FlagType};
use winexec::command::{Invocation, Report};
use winexec::config::{CONFIG_PATH_ENV, Conf};
use winexec::log::init_log;

fn main() {
    let app = App::new(env!("CARGO_PKG_NAME"))
        .description(env!("CARGO_PKG_DESCRIPTION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .usage(generate_usage())
        .action(run_action)
        .flag(Flag::new("chdir", FlagType::String).description("Run the command from this directory"))
        .flag(Flag::new("stdin", FlagType::String).description("Text written to the standard input of the command"))
        .flag(
            Flag::new("output-encoding", FlagType::String)
                .description("Encoding of the command output [default = utf-8]"),
        )
        .flag(
            Flag::new("wait-children", FlagType::Bool)
                .description("Also wait for every process spawned by the command"),
        )
        .flag(
            Flag::new("env-file", FlagType::String)
                .description("JSON file with an object of environment variables replacing the inherited ones"),
        )
        .flag(
            Flag::new("creates", FlagType::String)
                .description("Skip the command when this path exists (wildcards allowed)"),
        )
        .flag(
            Flag::new("removes", FlagType::String)
                .description("Skip the command when this path does not exist (wildcards allowed)"),
        )
        .flag(Flag::new("config", FlagType::String).description("Path to the JSON configuration file"))
        .flag(Flag::new("argv", FlagType::Bool).description("Quote each argument instead of joining them verbatim"));

    app.run(std::env::args().collect());
}

fn generate_usage() -> String {
    format!(
        "{command} [flags] <COMMAND LINE...>\n\
        \n\
        \tExample: list a directory\n\
        \n\
        \t  {command} --chdir C:\\Windows cmd.exe /c dir\n\
        \n\
        \tExample: run once\n\
        \n\
        \t  {command} --creates C:\\setup.done --argv powershell.exe -Command \"Install-Thing; ni C:\\setup.done\"\n\
        \n\
        The outcome is printed on stdout as a JSON document, logs go to stderr.\n\
        Configuration is read from --config or the {env} environment variable.",
        command = env!("CARGO_PKG_NAME"),
        env = CONFIG_PATH_ENV,
    )
}

fn run_action(c: &Context) {
    let report = run(c).unwrap_or_else(|error| Report::failed(&error));
    exit(&report)
}

fn run(c: &Context) -> anyhow::Result<Report> {
    let config_path = c.string_flag("config").ok().map(Utf8PathBuf::from);
    let conf = Conf::load(config_path.as_deref()).context("failed to initialize configuration")?;

    init_log(&conf).context("failed to initialize logging")?;

    let invocation = Invocation {
        args: c.args.clone(),
        argv: c.bool_flag("argv"),
        chdir: c.string_flag("chdir").ok().map(Utf8PathBuf::from),
        stdin: c.string_flag("stdin").ok(),
        output_encoding: c.string_flag("output-encoding").ok(),
        wait_children: c.bool_flag("wait-children"),
        env_file: c.string_flag("env-file").ok().map(Utf8PathBuf::from),
        creates: c.string_flag("creates").ok().map(Utf8PathBuf::from),
        removes: c.string_flag("removes").ok().map(Utf8PathBuf::from),
    };

    execute(&invocation, &conf)
}

#[cfg(windows)]
fn execute(invocation: &Invocation, conf: &Conf) -> anyhow::Result<Report> {
    Ok(winexec::command::execute(invocation, conf))
}

#[cfg(not(windows))]
fn execute(_: &Invocation, _: &Conf) -> anyhow::Result<Report> {
    anyhow::bail!("{} only runs on Windows", env!("CARGO_PKG_NAME"))
}

#[allow(clippy::print_stdout, clippy::print_stderr)] // The report is the output of this program.
fn exit(report: &Report) -> ! {
    match serde_json::to_string(report) {
        Ok(json) => {
            println!("{json}");
            std::process::exit(report.exit_code())
        }
        Err(e) => {
            eprintln!("{e:?}");
            std::process::exit(1);
        }
    }
}
