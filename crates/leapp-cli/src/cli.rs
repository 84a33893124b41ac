use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use leapp_core::{OsVersion, DEFAULT_CONFIG_PATH};
use leapp_dnfplugin::PluginCommand;

#[derive(Parser, Debug)]
#[command(name = "leapp")]
#[command(about = "In-place upgrade of RHEL to the next major release", long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) global: GlobalArgs,
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct GlobalArgs {
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub(crate) config: PathBuf,
    #[arg(long, global = true)]
    pub(crate) debug: bool,
    #[arg(long, global = true)]
    pub(crate) verbose: bool,
    #[arg(long, global = true)]
    pub(crate) target: Option<OsVersion>,
    #[arg(long = "enablerepo", global = true, value_name = "REPOID")]
    pub(crate) enable_repos: Vec<String>,
    #[arg(long, global = true)]
    pub(crate) no_rhsm: bool,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    Preupgrade,
    Upgrade {
        #[arg(long)]
        resume: bool,
    },
    Status {
        #[arg(long)]
        json: bool,
    },
    #[command(name = "rhel-upgrade")]
    RhelUpgrade {
        #[arg(value_enum)]
        action: PluginAction,
        data_file: PathBuf,
    },
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum PluginAction {
    Check,
    Download,
    Upgrade,
}

impl From<PluginAction> for PluginCommand {
    fn from(value: PluginAction) -> Self {
        match value {
            PluginAction::Check => PluginCommand::Check,
            PluginAction::Download => PluginCommand::Download,
            PluginAction::Upgrade => PluginCommand::Upgrade,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum CliCompletionShell {
    Bash,
    Zsh,
    Fish,
    Powershell,
}

impl From<CliCompletionShell> for Shell {
    fn from(value: CliCompletionShell) -> Self {
        match value {
            CliCompletionShell::Bash => Shell::Bash,
            CliCompletionShell::Zsh => Shell::Zsh,
            CliCompletionShell::Fish => Shell::Fish,
            CliCompletionShell::Powershell => Shell::PowerShell,
        }
    }
}
