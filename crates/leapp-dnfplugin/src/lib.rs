mod base;
mod options;
mod plugin;
mod repos;

pub use base::{DnfBase, DnfCli, ResolvedTransaction};
pub use options::DnfOptions;
pub use plugin::{run_plugin, BatchReport, PluginCommand, PluginRun, TransactionOutcome};
pub use repos::{apply_repo_allowlist, apply_rhui_mirrorlists, enable_repos, RepoState};
