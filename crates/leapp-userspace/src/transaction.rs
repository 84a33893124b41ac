use std::collections::BTreeSet;

use leapp_core::{
    argv, build_plugin_data, write_plugin_data, CallOptions, Configuration,
    FilteredRpmTransactionTasks, IpuError, IpuResult, Model, PluginDataOptions, RhuiInfo,
    TargetUserSpaceInfo, UsedTargetRepositories, XfsPresence,
};
use leapp_mount::{IsolatedActions, NspawnActions, ScratchLayout};
use leapp_workflow::{Actor, ActorContext, Phase};

use crate::builder::{mount_source_overlay, HostPaths, PLUGIN_INSTALL_PATH};

pub const SOURCE_INSTALLROOT: &str = "/installroot";

struct TransactionInputs {
    userspace: TargetUserSpaceInfo,
    tasks: FilteredRpmTransactionTasks,
    repoids: Vec<String>,
    rhui: RhuiInfo,
}

fn collect_inputs(ctx: &ActorContext<'_, '_>) -> IpuResult<TransactionInputs> {
    let mut userspaces = ctx.consume::<TargetUserSpaceInfo>()?;
    let userspace = match userspaces.len() {
        0 => {
            return Err(IpuError::stop(
                "Cannot run the upgrade transaction: the target userspace was not prepared",
            ))
        }
        1 => userspaces.remove(0),
        count => {
            return Err(IpuError::stop(format!(
                "Expected a single target userspace, found {count}"
            )))
        }
    };

    let tasks = merge_tasks(ctx.consume::<FilteredRpmTransactionTasks>()?);
    let repoids = ctx
        .consume::<UsedTargetRepositories>()?
        .into_iter()
        .flat_map(|used| used.repos)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let rhui = ctx.consume::<RhuiInfo>()?;
    if rhui.len() > 1 {
        tracing::warn!(count = rhui.len(), "multiple RHUI facts found, using the first one");
    }
    Ok(TransactionInputs {
        userspace,
        tasks,
        repoids,
        rhui: rhui.into_iter().next().unwrap_or_default(),
    })
}

pub fn merge_tasks(tasks: Vec<FilteredRpmTransactionTasks>) -> FilteredRpmTransactionTasks {
    tasks
        .into_iter()
        .fold(FilteredRpmTransactionTasks::default(), |mut merged, next| {
            merged.local_rpms.extend(next.local_rpms);
            merged.to_install.extend(next.to_install);
            merged.to_remove.extend(next.to_remove);
            merged.to_upgrade.extend(next.to_upgrade);
            merged.modules_to_enable.extend(next.modules_to_enable);
            merged
        })
}

fn plugin_options(config: &Configuration, rhui: &RhuiInfo, test_flag: bool) -> PluginDataOptions {
    PluginDataOptions {
        debugsolver: config.flags.debug,
        test_flag,
        installroot: Some(SOURCE_INSTALLROOT.to_string()),
        gpgcheck: true,
        rhui: rhui.clone(),
    }
}

fn plugin_command(plugin: &str, command: &str, data_path: &std::path::Path) -> Vec<String> {
    argv([
        plugin.to_string(),
        command.to_string(),
        data_path.display().to_string(),
    ])
}

pub struct DnfPackageDownload {
    host: HostPaths,
}

impl DnfPackageDownload {
    pub fn new() -> Self {
        Self::with_host_paths(HostPaths::default())
    }

    pub fn with_host_paths(host: HostPaths) -> Self {
        Self { host }
    }
}

impl Default for DnfPackageDownload {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for DnfPackageDownload {
    fn name(&self) -> &str {
        "dnf_package_download"
    }

    fn phase(&self) -> Phase {
        Phase::Download
    }

    fn consumes(&self) -> Vec<&'static str> {
        vec![
            TargetUserSpaceInfo::NAME,
            UsedTargetRepositories::NAME,
            FilteredRpmTransactionTasks::NAME,
            RhuiInfo::NAME,
            XfsPresence::NAME,
        ]
    }

    fn run(&self, ctx: &mut ActorContext<'_, '_>) -> IpuResult<()> {
        let config = ctx.config;
        let inputs = collect_inputs(ctx)?;
        let data = build_plugin_data(
            &config.target_version,
            &inputs.tasks,
            &inputs.repoids,
            &plugin_options(config, &inputs.rhui, true),
        );

        let xfs = ctx.consume::<XfsPresence>()?;
        let (layout, overlay) = mount_source_overlay(ctx.runner, config, &self.host, &xfs)?;
        let data_path = write_plugin_data(&layout.plugin_data_path(), &data)?;
        let scratch = layout.scratch_dir().display().to_string();
        let context = NspawnActions::new(ctx.runner, &inputs.userspace.path)
            .with_bind(overlay.target(), SOURCE_INSTALLROOT)
            .with_bind(layout.scratch_dir(), scratch);

        for command in ["check", "download"] {
            tracing::info!(command, "running rhel-upgrade in the target userspace");
            context.call(
                &plugin_command(PLUGIN_INSTALL_PATH, command, &data_path),
                &CallOptions::checked().with_env("LANG", "C"),
            )?;
        }
        overlay.release();
        Ok(())
    }
}

pub struct DnfUpgradeTransaction {
    host: HostPaths,
}

impl DnfUpgradeTransaction {
    pub fn new() -> Self {
        Self::with_host_paths(HostPaths::default())
    }

    pub fn with_host_paths(host: HostPaths) -> Self {
        Self { host }
    }
}

impl Default for DnfUpgradeTransaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for DnfUpgradeTransaction {
    fn name(&self) -> &str {
        "dnf_upgrade_transaction"
    }

    fn phase(&self) -> Phase {
        Phase::RPMUpgrade
    }

    fn consumes(&self) -> Vec<&'static str> {
        vec![
            TargetUserSpaceInfo::NAME,
            UsedTargetRepositories::NAME,
            FilteredRpmTransactionTasks::NAME,
            RhuiInfo::NAME,
        ]
    }

    fn run(&self, ctx: &mut ActorContext<'_, '_>) -> IpuResult<()> {
        let config = ctx.config;
        let inputs = collect_inputs(ctx)?;
        let data = build_plugin_data(
            &config.target_version,
            &inputs.tasks,
            &inputs.repoids,
            &plugin_options(config, &inputs.rhui, false),
        );

        let layout = ScratchLayout::new(&inputs.userspace.scratch);
        let data_path = write_plugin_data(&layout.plugin_data_path(), &data)?;
        let scratch = layout.scratch_dir().display().to_string();
        let cache = format!("{SOURCE_INSTALLROOT}/var/cache/dnf");
        let context = NspawnActions::new(ctx.runner, &inputs.userspace.path)
            .with_bind(&self.host.root, SOURCE_INSTALLROOT)
            .with_bind(&self.host.dnf_cache, cache)
            .with_bind(layout.scratch_dir(), scratch);

        tracing::info!("running rhel-upgrade upgrade in the target userspace");
        context.call(
            &plugin_command(PLUGIN_INSTALL_PATH, "upgrade", &data_path),
            &CallOptions::checked().with_env("LANG", "C"),
        )?;
        tracing::info!("upgrade transaction applied");
        Ok(())
    }
}
