use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use leapp_core::{
    argv, with_retry, CallOptions, CommandRunner, Configuration, IpuError, IpuResult, Model,
    RequiredTargetUserspacePackages, RetryPolicy, RhsmInfo, TargetRepositories,
    TargetUserSpaceInfo, UsedTargetRepositories, XfsPresence,
};
use leapp_mount::{
    create_source_overlay, overlay_disk_size, remove_dir_if_exists, IsolatedActions, Mount,
    NotIsolatedActions, NspawnActions, OverlayStrategy, ScratchLayout, SourceOverlay,
};
use leapp_workflow::{Actor, ActorContext, Phase};

use crate::certs::{product_cert_path, SwitchedCertificate};
use crate::repos::{check_target_repoids, gather_target_repoids};

pub const PLUGIN_INSTALL_PATH: &str = "/usr/libexec/leapp/rhel-upgrade";

const HOST_CONFIG_DIRS: [&str; 3] = ["pki", "rhsm", "yum.repos.d"];
const REINSTALL_HINT: &str = "Please reinstall the leapp-repository package";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    pub root: PathBuf,
    pub dnf_cache: PathBuf,
    pub custom_repo_file: PathBuf,
    pub plugin_binary: Option<PathBuf>,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            dnf_cache: PathBuf::from("/var/cache/dnf"),
            custom_repo_file: PathBuf::from("/etc/leapp/files/leapp_upgrade_repositories.repo"),
            plugin_binary: None,
        }
    }
}

impl HostPaths {
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            dnf_cache: root.join("var/cache/dnf"),
            custom_repo_file: root.join("etc/leapp/files/leapp_upgrade_repositories.repo"),
            plugin_binary: None,
            root,
        }
    }

    fn etc(&self, name: &str) -> PathBuf {
        self.root.join("etc").join(name)
    }
}

pub(crate) fn ensure_dir(dir: &Path) -> IpuResult<()> {
    fs::create_dir_all(dir).map_err(|err| {
        IpuError::stop_with_hint(
            format!("Cannot create directory {}: {err}", dir.display()),
            format!("Please ensure that {} is empty and modifiable.", dir.display()),
        )
    })
}

pub(crate) fn mount_source_overlay<'r>(
    runner: &'r dyn CommandRunner,
    config: &Configuration,
    host: &HostPaths,
    xfs: &[XfsPresence],
) -> IpuResult<(ScratchLayout, SourceOverlay<'r>)> {
    let layout = ScratchLayout::new(&config.paths.scratch_dir);
    let strategy = OverlayStrategy::from_facts(xfs);
    let size = overlay_disk_size(config.overlay_size_hint.as_deref());
    let mut overlay = create_source_overlay(runner, &layout, &host.root, strategy, size)?;

    let cache_target = layout.dnf_cache_target();
    ensure_dir(&host.dnf_cache)?;
    ensure_dir(&cache_target)?;
    overlay.push(Mount::bind(&host.dnf_cache, &cache_target))?;
    Ok((layout, overlay))
}

pub struct TargetUserspaceCreator {
    host: HostPaths,
    retry: RetryPolicy,
}

impl TargetUserspaceCreator {
    pub fn new() -> Self {
        Self::with_host_paths(HostPaths::default())
    }

    pub fn with_host_paths(host: HostPaths) -> Self {
        Self {
            host,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn install_target_packages(
        &self,
        context: &NspawnActions<'_>,
        config: &Configuration,
        cert: Option<&Path>,
        repoids: &[String],
        packages: &[String],
        userspace: &Path,
    ) -> IpuResult<()> {
        let _switched = match cert {
            Some(cert) => Some(SwitchedCertificate::install(context, cert)?),
            None => None,
        };
        if cert.is_some() {
            with_retry(self.retry, |_| {
                context.call(
                    &argv(["subscription-manager", "refresh"]),
                    &CallOptions::checked(),
                )
            })?;
        }

        if self.host.custom_repo_file.is_file() {
            let repos_dir = context.makedirs("/etc/yum.repos.d")?;
            let destination = repos_dir.join("leapp_upgrade_repositories.repo");
            fs::copy(&self.host.custom_repo_file, &destination).map_err(|err| {
                IpuError::io(
                    format!("failed to copy {}", self.host.custom_repo_file.display()),
                    err,
                )
            })?;
        }
        check_target_repoids(context, repoids)?;

        let target = config.target_version;
        let installroot = target.installroot_name();
        context.remove_tree(&installroot)?;
        ensure_dir(&context.full_path(&installroot))?;

        let mut command = argv([
            "dnf".to_string(),
            "install".to_string(),
            "-y".to_string(),
            "--nogpgcheck".to_string(),
            format!("--setopt=module_platform_id={}", target.platform_id()),
            "--setopt=keepcache=1".to_string(),
            format!("--releasever={target}"),
            format!("--installroot={installroot}"),
            "--disablerepo=*".to_string(),
        ]);
        command.extend(repoids.iter().map(|id| format!("--enablerepo={id}")));
        command.extend(packages.iter().cloned());
        tracing::info!(packages = packages.len(), repos = %repoids.join(", "), "installing target userspace packages");
        context.call(&command, &CallOptions::checked().with_env("LANG", "C"))?;

        remove_dir_if_exists(userspace).map_err(|err| {
            IpuError::stop_with_hint(
                format!("Cannot remove stale target userspace: {err}"),
                format!("Please ensure that {} is empty and modifiable.", userspace.display()),
            )
        })?;
        if let Some(parent) = userspace.parent() {
            ensure_dir(parent)?;
        }
        context.copytree_to(&installroot, userspace)
    }

    fn copy_host_config(&self, runner: &dyn CommandRunner, userspace: &Path) -> IpuResult<()> {
        let target = NotIsolatedActions::new(runner, userspace);
        for name in HOST_CONFIG_DIRS {
            let host_dir = self.host.etc(name);
            if !host_dir.is_dir() {
                tracing::warn!(dir = %host_dir.display(), "host directory missing; not copied into target userspace");
                continue;
            }
            target.copytree_from(&host_dir, &format!("/etc/{name}"))?;
        }
        Ok(())
    }

    fn install_plugin(&self, config: &Configuration, userspace: &Path) -> IpuResult<PathBuf> {
        let source = match self
            .host
            .plugin_binary
            .clone()
            .or_else(|| config.paths.dnf_plugin_path.clone())
        {
            Some(path) => path,
            None => std::env::current_exe().map_err(|err| {
                IpuError::stop_with_hint(
                    format!("Cannot locate the DNF plugin executable: {err}"),
                    REINSTALL_HINT,
                )
            })?,
        };

        let destination = userspace.join(PLUGIN_INSTALL_PATH.trim_start_matches('/'));
        let install = || -> std::io::Result<()> {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, &destination)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&destination, fs::Permissions::from_mode(0o755))?;
            }
            Ok(())
        };
        install().map_err(|err| {
            IpuError::stop_with_hint(
                format!(
                    "Cannot install the DNF plugin from {} into the target userspace: {err}",
                    source.display()
                ),
                REINSTALL_HINT,
            )
        })?;
        Ok(destination)
    }
}

impl Default for TargetUserspaceCreator {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for TargetUserspaceCreator {
    fn name(&self) -> &str {
        "target_userspace_creator"
    }

    fn phase(&self) -> Phase {
        Phase::Download
    }

    fn consumes(&self) -> Vec<&'static str> {
        vec![
            RequiredTargetUserspacePackages::NAME,
            RhsmInfo::NAME,
            TargetRepositories::NAME,
            XfsPresence::NAME,
        ]
    }

    fn produces(&self) -> Vec<&'static str> {
        vec![UsedTargetRepositories::NAME, TargetUserSpaceInfo::NAME]
    }

    fn run(&self, ctx: &mut ActorContext<'_, '_>) -> IpuResult<()> {
        let config = ctx.config;
        let packages = required_packages(&ctx.consume::<RequiredTargetUserspacePackages>()?);

        let rhsm_enabled = !config.flags.skip_rhsm;
        if rhsm_enabled && ctx.consume::<RhsmInfo>()?.is_empty() {
            tracing::warn!("no subscription information collected; target userspace not created");
            return Ok(());
        }
        let cert = if rhsm_enabled {
            Some(product_cert_path(config)?)
        } else {
            None
        };

        let repoids = gather_target_repoids(&ctx.consume::<TargetRepositories>()?, &config.enable_repos);
        let xfs = ctx.consume::<XfsPresence>()?;
        let userspace = config.target_userspace_dir();

        let (layout, overlay) = mount_source_overlay(ctx.runner, config, &self.host, &xfs)?;
        let context = NspawnActions::new(ctx.runner, overlay.target());
        self.install_target_packages(
            &context,
            config,
            cert.as_deref(),
            &repoids,
            &packages,
            &userspace,
        )?;
        overlay.release();

        self.copy_host_config(ctx.runner, &userspace)?;
        let plugin = self.install_plugin(config, &userspace)?;
        tracing::info!(
            userspace = %userspace.display(),
            plugin = %plugin.display(),
            "target userspace ready"
        );

        ctx.produce(&UsedTargetRepositories { repos: repoids })?;
        ctx.produce(&TargetUserSpaceInfo {
            path: userspace,
            scratch: layout.scratch_dir().to_path_buf(),
            mounts: layout.mounts_dir(),
        })
    }
}

pub fn required_packages(requests: &[RequiredTargetUserspacePackages]) -> Vec<String> {
    requests
        .iter()
        .flat_map(|request| request.packages.iter().cloned())
        .chain(std::iter::once("dnf".to_string()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
