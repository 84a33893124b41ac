use std::ffi::OsString;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod completion;
mod flows;
mod plugin;
mod render;

use cli::{Cli, Commands};
use leapp_core::{env_flag, process_env, SystemRunner, ENV_DEBUG, ENV_VERBOSE};
use leapp_userspace::builtin_registry;
use render::TerminalRenderer;

const PLUGIN_PROGRAM: &str = "rhel-upgrade";

fn main() -> Result<()> {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    init_tracing(&cli);
    run_cli(cli)
}

fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter().collect::<Vec<_>>();
    let invoked_as_plugin = args
        .first()
        .and_then(|program| Path::new(program).file_name())
        .is_some_and(|name| name == PLUGIN_PROGRAM);
    if invoked_as_plugin {
        args[0] = OsString::from("leapp");
        args.insert(1, OsString::from(PLUGIN_PROGRAM));
    }
    args
}

fn default_log_filter(debug: bool, verbose: bool) -> &'static str {
    if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    }
}

fn init_tracing(cli: &Cli) {
    let env = process_env();
    let debug = cli.global.debug || env_flag(&env, ENV_DEBUG);
    let verbose = cli.global.verbose || env_flag(&env, ENV_VERBOSE);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(debug, verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Preupgrade => {
            let config = flows::load_configuration(&cli.global)?;
            let registry = builtin_registry()?;
            let renderer = TerminalRenderer::current();
            let report = flows::run_preupgrade(&config, &SystemRunner, &registry, &renderer)?;
            renderer.print_lines(&report.lines(renderer.style()));
            report.into_result()
        }
        Commands::Upgrade { resume } => {
            let registry = builtin_registry()?;
            let renderer = TerminalRenderer::current();
            let report = if resume {
                let store = flows::open_store(&cli.global)?;
                flows::resume_upgrade(&store, &SystemRunner, &registry, &renderer)?
            } else {
                let config = flows::load_configuration(&cli.global)?;
                flows::start_upgrade(&config, &SystemRunner, &registry, &renderer)?
            };
            renderer.print_lines(&report.lines(renderer.style()));
            report.into_result()
        }
        Commands::Status { json } => {
            let store = flows::open_store(&cli.global)?;
            let status = flows::collect_status(&store)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status.to_json())?);
            } else {
                let renderer = TerminalRenderer::current();
                renderer.print_lines(&status.lines(renderer.style()));
            }
            Ok(())
        }
        Commands::RhelUpgrade { action, data_file } => {
            plugin::run_rhel_upgrade(&SystemRunner, action.into(), &data_file)
        }
        Commands::Completions { shell } => {
            let mut stdout = std::io::stdout();
            completion::write_completions_script(shell, &mut stdout)
        }
    }
}

#[cfg(test)]
mod tests;
