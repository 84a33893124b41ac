use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use leapp_core::{
    argv, run, run_checked, with_retry, Architecture, AwsInfo, CallOptions, CommandRunner,
    FilteredRpmTransactionTasks, IpuError, IpuResult, Model, RetryPolicy, RhsmInfo, RhuiInfo,
    TargetRepositories, XfsPresence,
};
use leapp_workflow::{Actor, ActorContext, Phase};

pub struct XfsInfoScanner {
    mounts_path: PathBuf,
}

impl XfsInfoScanner {
    pub fn new() -> Self {
        Self::with_mounts_file("/proc/mounts")
    }

    pub fn with_mounts_file(path: impl Into<PathBuf>) -> Self {
        Self {
            mounts_path: path.into(),
        }
    }

    fn xfs_mountpoints(&self) -> IpuResult<Vec<String>> {
        let raw = fs::read_to_string(&self.mounts_path).map_err(|err| {
            IpuError::io(format!("failed to read {}", self.mounts_path.display()), err)
        })?;
        let mut mountpoints = raw
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let _device = fields.next()?;
                let mountpoint = fields.next()?;
                (fields.next()? == "xfs").then(|| mountpoint.to_string())
            })
            .collect::<Vec<_>>();
        mountpoints.sort();
        mountpoints.dedup();
        Ok(mountpoints)
    }
}

impl Default for XfsInfoScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for XfsInfoScanner {
    fn name(&self) -> &str {
        "xfs_info_scanner"
    }

    fn phase(&self) -> Phase {
        Phase::FactsCollection
    }

    fn produces(&self) -> Vec<&'static str> {
        vec![XfsPresence::NAME]
    }

    fn run(&self, ctx: &mut ActorContext<'_, '_>) -> IpuResult<()> {
        let mountpoints = self.xfs_mountpoints()?;
        let mut without_ftype = Vec::new();
        for mountpoint in &mountpoints {
            let output = run(
                ctx.runner,
                &argv(["xfs_info", mountpoint.as_str()]),
                &CallOptions::unchecked(),
            )?;
            if !output.success() {
                tracing::warn!(mountpoint = %mountpoint, stderr = %output.stderr.trim(), "xfs_info failed; skipping");
                continue;
            }
            if output.stdout.contains("ftype=0") {
                without_ftype.push(mountpoint.clone());
            }
        }

        ctx.produce(&XfsPresence {
            present: !mountpoints.is_empty(),
            without_ftype: !without_ftype.is_empty(),
            mountpoints_without_ftype: without_ftype,
        })
    }
}

pub struct RhsmScanner {
    retry: RetryPolicy,
}

impl RhsmScanner {
    pub fn new() -> Self {
        Self::with_retry_policy(RetryPolicy::default())
    }

    pub fn with_retry_policy(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    fn query(&self, runner: &dyn CommandRunner, args: &[&str]) -> IpuResult<String> {
        let command = argv(std::iter::once("subscription-manager").chain(args.iter().copied()));
        with_retry(self.retry, |_| run_checked(runner, &command)).map(|output| output.stdout)
    }
}

impl Default for RhsmScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for RhsmScanner {
    fn name(&self) -> &str {
        "rhsm_scanner"
    }

    fn phase(&self) -> Phase {
        Phase::FactsCollection
    }

    fn produces(&self) -> Vec<&'static str> {
        vec![RhsmInfo::NAME]
    }

    fn run(&self, ctx: &mut ActorContext<'_, '_>) -> IpuResult<()> {
        if ctx.config.flags.skip_rhsm {
            tracing::info!("RHSM is disabled; skipping subscription scan");
            return Ok(());
        }

        let release = self.query(ctx.runner, &["release"])?;
        let repos = self.query(ctx.runner, &["repos", "--list-enabled"])?;
        let consumed = self.query(ctx.runner, &["list", "--consumed"])?;

        ctx.produce(&RhsmInfo {
            release: parse_release(&release),
            enabled_repos: labelled_values(&repos, "Repo ID:"),
            attached_skus: labelled_values(&consumed, "SKU:"),
            is_container: false,
        })
    }
}

const AWS_RHUI_CLIENTS: [&str; 2] = ["rh-amazon-rhui-client", "rh-amazon-rhui-client-sap-bundle"];
const AWS_REGION_URL: &str = "http://169.254.169.254/latest/meta-data/placement/region";

pub struct RhuiScanner;

impl RhuiScanner {
    fn aws_region(runner: &dyn CommandRunner) -> IpuResult<Option<String>> {
        let output = run(
            runner,
            &argv(["curl", "--silent", "--fail", "--max-time", "5", AWS_REGION_URL]),
            &CallOptions::unchecked(),
        )?;
        let region = output.stdout.trim();
        if !output.success() || region.is_empty() {
            tracing::warn!(stderr = %output.stderr.trim(), "cannot determine the AWS region");
            return Ok(None);
        }
        Ok(Some(region.to_string()))
    }
}

impl Actor for RhuiScanner {
    fn name(&self) -> &str {
        "rhui_scanner"
    }

    fn phase(&self) -> Phase {
        Phase::FactsCollection
    }

    fn produces(&self) -> Vec<&'static str> {
        vec![RhuiInfo::NAME]
    }

    fn run(&self, ctx: &mut ActorContext<'_, '_>) -> IpuResult<()> {
        let mut on_aws = false;
        for client in AWS_RHUI_CLIENTS {
            let output = run(ctx.runner, &argv(["rpm", "-q", client]), &CallOptions::unchecked())?;
            if output.success() {
                tracing::info!(client, "AWS RHUI client installed");
                on_aws = true;
                break;
            }
        }
        let region = if on_aws {
            Self::aws_region(ctx.runner)?
        } else {
            None
        };
        ctx.produce(&RhuiInfo {
            aws: AwsInfo { on_aws, region },
        })
    }
}

fn parse_release(output: &str) -> Option<String> {
    labelled_values(output, "Release:").into_iter().next()
}

fn labelled_values(output: &str, label: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix(label))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct TargetRepositoriesCollector;

impl Actor for TargetRepositoriesCollector {
    fn name(&self) -> &str {
        "target_repositories_collector"
    }

    fn phase(&self) -> Phase {
        Phase::FactsCollection
    }

    fn consumes(&self) -> Vec<&'static str> {
        vec![RhsmInfo::NAME]
    }

    fn produces(&self) -> Vec<&'static str> {
        vec![TargetRepositories::NAME]
    }

    fn run(&self, ctx: &mut ActorContext<'_, '_>) -> IpuResult<()> {
        let config = ctx.config;
        let mut rhel_repos = BTreeSet::new();
        for info in ctx.consume::<RhsmInfo>()? {
            for repo in &info.enabled_repos {
                let mapped = map_repoid(
                    repo,
                    config.source_version.major,
                    config.target_version.major,
                    config.architecture,
                );
                if mapped.is_empty() {
                    tracing::debug!(repo = %repo, "no target mapping for source repository");
                }
                rhel_repos.extend(mapped);
            }
        }

        ctx.produce(&TargetRepositories {
            rhel_repos: rhel_repos.into_iter().collect(),
            custom_repos: config.enable_repos.clone(),
        })
    }
}

pub fn map_repoid(repo: &str, source: u32, target: u32, arch: Architecture) -> Vec<String> {
    let arch = arch.as_str();
    if repo == format!("rhel-{source}-server-rpms") {
        return vec![
            format!("rhel-{target}-for-{arch}-baseos-rpms"),
            format!("rhel-{target}-for-{arch}-appstream-rpms"),
        ];
    }
    if repo == format!("rhel-{source}-server-optional-rpms") {
        return vec![format!("codeready-builder-for-rhel-{target}-{arch}-rpms")];
    }
    if repo == format!("codeready-builder-for-rhel-{source}-{arch}-rpms") {
        return vec![format!("codeready-builder-for-rhel-{target}-{arch}-rpms")];
    }
    let prefix = format!("rhel-{source}-for-{arch}-");
    match repo.strip_prefix(&prefix) {
        Some(channel) if channel.ends_with("-rpms") => {
            vec![format!("rhel-{target}-for-{arch}-{channel}")]
        }
        _ => Vec::new(),
    }
}

pub struct RpmTransactionTasksCollector {
    transaction_dir: PathBuf,
}

impl RpmTransactionTasksCollector {
    pub fn new() -> Self {
        Self::with_transaction_dir("/etc/leapp/transaction")
    }

    pub fn with_transaction_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            transaction_dir: dir.into(),
        }
    }

    fn read_list(&self, name: &str) -> IpuResult<Vec<String>> {
        let path = self.transaction_dir.join(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(IpuError::io(format!("failed to read {}", path.display()), err));
            }
        };
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect())
    }
}

impl Default for RpmTransactionTasksCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for RpmTransactionTasksCollector {
    fn name(&self) -> &str {
        "rpm_transaction_tasks_collector"
    }

    fn phase(&self) -> Phase {
        Phase::FactsCollection
    }

    fn produces(&self) -> Vec<&'static str> {
        vec![FilteredRpmTransactionTasks::NAME]
    }

    fn run(&self, ctx: &mut ActorContext<'_, '_>) -> IpuResult<()> {
        let to_install = self.read_list("to_install")?;
        let to_keep = self.read_list("to_keep")?;
        let to_remove = self
            .read_list("to_remove")?
            .into_iter()
            .filter(|name| !to_keep.contains(name))
            .collect::<Vec<_>>();

        let installed = run_checked(
            ctx.runner,
            &argv(["rpm", "-qa", "--queryformat", "%{NAME}\\n"]),
        )?;
        let removed = to_remove.iter().map(String::as_str).collect::<BTreeSet<_>>();
        let to_upgrade = installed
            .stdout
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != "gpg-pubkey")
            .filter(|name| !removed.contains(name))
            .map(str::to_string)
            .collect::<BTreeSet<_>>();
        ctx.produce(&FilteredRpmTransactionTasks {
            local_rpms: Vec::new(),
            to_install,
            to_remove,
            to_upgrade: to_upgrade.into_iter().collect(),
            modules_to_enable: Vec::new(),
        })
    }
}
