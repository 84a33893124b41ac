use std::fmt;
use std::str::FromStr;

use leapp_core::{DnfPluginData, IpuError, IpuResult};

use crate::{apply_repo_allowlist, apply_rhui_mirrorlists, enable_repos, DnfBase, DnfOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginCommand {
    Check,
    Download,
    Upgrade,
}

impl PluginCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Download => "download",
            Self::Upgrade => "upgrade",
        }
    }
}

impl fmt::Display for PluginCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginCommand {
    type Err = IpuError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "check" => Ok(Self::Check),
            "download" => Ok(Self::Download),
            "upgrade" => Ok(Self::Upgrade),
            other => Err(IpuError::Config(format!(
                "unsupported rhel-upgrade command '{other}' (expected check, download or upgrade)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    ResolvedOnly,
    Downloaded,
    Applied,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub unmatched_remove: Vec<String>,
    pub unmatched_install: Vec<String>,
    pub unmatched_upgrade: Vec<String>,
    pub local_rpms: usize,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.unmatched_remove.is_empty()
            && self.unmatched_install.is_empty()
            && self.unmatched_upgrade.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRun {
    pub outcome: TransactionOutcome,
    pub report: BatchReport,
    pub unknown_repos: Vec<String>,
}

pub fn run_plugin(
    base: &mut dyn DnfBase,
    command: PluginCommand,
    data: &DnfPluginData,
) -> IpuResult<PluginRun> {
    tracing::info!(command = %command, "running rhel-upgrade transaction");
    let options = DnfOptions::for_command(command, &data.dnf_conf);
    base.configure(&options)?;

    let mut repos = base.repos()?;
    let unknown_repos = if data.dnf_conf.disable_repos {
        apply_repo_allowlist(&mut repos, &data.dnf_conf.enable_repos)
    } else {
        enable_repos(&mut repos, &data.dnf_conf.enable_repos);
        Vec::new()
    };
    if !unknown_repos.is_empty() {
        tracing::warn!(
            repos = %unknown_repos.join(", "),
            "requested repositories are not defined"
        );
    }
    apply_rhui_mirrorlists(&mut repos, &data.rhui);
    base.set_repos(repos);

    for module_stream in &data.pkgs_info.modules_to_enable {
        base.enable_module(module_stream)?;
    }

    let mut report = BatchReport::default();
    for rpm in &data.pkgs_info.local_rpms {
        base.add_local_rpm(rpm)?;
        report.local_rpms += 1;
    }

    report.unmatched_remove = apply_batch(&data.pkgs_info.to_remove, |spec| base.remove(spec))?;
    warn_unmatched("remove", &report.unmatched_remove);
    report.unmatched_install =
        apply_batch(&data.pkgs_info.to_install, |spec| base.install(spec))?;
    warn_unmatched("install", &report.unmatched_install);
    report.unmatched_upgrade =
        apply_batch(&data.pkgs_info.to_upgrade, |spec| base.upgrade(spec))?;
    warn_unmatched("upgrade", &report.unmatched_upgrade);

    let transaction = base.resolve().inspect_err(|err| {
        tracing::error!(command = %command, error = %err, "transaction check failed");
    })?;
    tracing::debug!(entries = transaction.summary.len(), "transaction resolved");

    let outcome = match command {
        PluginCommand::Check => TransactionOutcome::ResolvedOnly,
        PluginCommand::Download => {
            base.download(&transaction)?;
            TransactionOutcome::Downloaded
        }
        PluginCommand::Upgrade => {
            base.run_transaction(&transaction)?;
            TransactionOutcome::Applied
        }
    };

    Ok(PluginRun {
        outcome,
        report,
        unknown_repos,
    })
}

fn apply_batch<F>(specs: &[String], mut apply: F) -> IpuResult<Vec<String>>
where
    F: FnMut(&str) -> IpuResult<bool>,
{
    let mut unmatched = Vec::new();
    for spec in specs {
        if !apply(spec)? {
            unmatched.push(spec.clone());
        }
    }
    Ok(unmatched)
}

fn warn_unmatched(operation: &str, unmatched: &[String]) {
    if unmatched.is_empty() {
        return;
    }
    tracing::warn!(
        operation,
        packages = %unmatched.join(", "),
        "unable to match package specs; continuing with the rest of the transaction"
    );
}
