use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{FilteredRpmTransactionTasks, IpuError, IpuResult, OsVersion};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgsInfo {
    pub local_rpms: Vec<String>,
    pub to_install: Vec<String>,
    pub to_remove: Vec<String>,
    pub to_upgrade: Vec<String>,
    pub modules_to_enable: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnfConf {
    pub allow_erasing: bool,
    pub best: bool,
    pub debugsolver: bool,
    pub disable_repos: bool,
    pub enable_repos: Vec<String>,
    pub gpgcheck: bool,
    pub platform_id: String,
    pub releasever: String,
    pub installroot: Option<String>,
    pub test_flag: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsInfo {
    pub on_aws: bool,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RhuiInfo {
    pub aws: AwsInfo,
}

impl crate::Model for RhuiInfo {
    const NAME: &'static str = "RhuiInfo";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnfPluginData {
    pub pkgs_info: PkgsInfo,
    pub dnf_conf: DnfConf,
    pub rhui: RhuiInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginDataOptions {
    pub debugsolver: bool,
    pub test_flag: bool,
    pub installroot: Option<String>,
    pub gpgcheck: bool,
    pub rhui: RhuiInfo,
}

pub fn build_plugin_data(
    target_version: &OsVersion,
    tasks: &FilteredRpmTransactionTasks,
    target_repoids: &[String],
    options: &PluginDataOptions,
) -> DnfPluginData {
    let mut enable_repos = target_repoids.to_vec();
    enable_repos.sort();
    enable_repos.dedup();

    DnfPluginData {
        pkgs_info: PkgsInfo {
            local_rpms: sorted(&tasks.local_rpms),
            to_install: sorted(&tasks.to_install),
            to_remove: sorted(&tasks.to_remove),
            to_upgrade: sorted(&tasks.to_upgrade),
            modules_to_enable: sorted(&tasks.modules_to_enable),
        },
        dnf_conf: DnfConf {
            allow_erasing: true,
            best: true,
            debugsolver: options.debugsolver,
            disable_repos: true,
            enable_repos,
            gpgcheck: options.gpgcheck,
            platform_id: target_version.platform_id(),
            releasever: target_version.to_string(),
            installroot: options.installroot.clone(),
            test_flag: options.test_flag,
        },
        rhui: options.rhui.clone(),
    }
}

fn sorted(values: &[String]) -> Vec<String> {
    let mut values = values.to_vec();
    values.sort();
    values.dedup();
    values
}

impl DnfPluginData {
    pub fn to_json(&self) -> IpuResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> IpuResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

pub fn write_plugin_data(path: &Path, data: &DnfPluginData) -> IpuResult<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            IpuError::io(format!("failed to create {}", parent.display()), err)
        })?;
    }
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(IpuError::io(
                format!("failed to remove stale plugin data: {}", path.display()),
                err,
            ));
        }
    }

    let payload = data.to_json()?;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| {
            IpuError::io(format!("failed to create plugin data: {}", path.display()), err)
        })?;
    file.write_all(payload.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|err| {
            IpuError::io(format!("failed to write plugin data: {}", path.display()), err)
        })?;

    let mut permissions = file
        .metadata()
        .map_err(|err| IpuError::io(format!("failed to stat {}", path.display()), err))?
        .permissions();
    permissions.set_readonly(true);
    fs::set_permissions(path, permissions).map_err(|err| {
        IpuError::io(
            format!("failed to mark plugin data read-only: {}", path.display()),
            err,
        )
    })?;
    Ok(path.to_path_buf())
}

pub fn read_plugin_data(path: &Path) -> IpuResult<DnfPluginData> {
    let raw = fs::read_to_string(path)
        .map_err(|err| IpuError::io(format!("failed to read plugin data: {}", path.display()), err))?;
    DnfPluginData::from_json(&raw)
}
