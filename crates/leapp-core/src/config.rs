use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{Architecture, IpuError, IpuResult, OsReleaseFacts, OsVersion};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/leapp/leapp.toml";
pub const DEFAULT_LIB_DIR: &str = "/var/lib/leapp";
pub const DEFAULT_PRODUCT_CERTS_DIR: &str = "/etc/leapp/files/prod-certs";

pub const ENV_OVERLAY_SIZE: &str = "LEAPP_OVL_SIZE";
pub const ENV_NO_RHSM: &str = "LEAPP_NO_RHSM";
pub const ENV_DEVEL_SKIP_RHSM: &str = "LEAPP_DEVEL_SKIP_RHSM";
pub const ENV_DEBUG: &str = "LEAPP_DEBUG";
pub const ENV_VERBOSE: &str = "LEAPP_VERBOSE";
pub const ENV_EXPERIMENTAL: &str = "LEAPP_EXPERIMENTAL";
pub const ENV_TARGET_RELEASE: &str = "LEAPP_DEVEL_TARGET_RELEASE";

const DEFAULT_UPGRADE_PATHS: &[(&str, &str)] = &[("7.9", "8.10"), ("8.10", "9.6")];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub lib_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub store_root: Option<PathBuf>,
    pub product_certs_dir: Option<PathBuf>,
    pub dnf_plugin_path: Option<PathBuf>,
    pub target_version: Option<String>,
    pub enable_repos: Vec<String>,
    pub experimental: Vec<String>,
}

impl ConfigFile {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse leapp configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read configuration: {}", path.display()));
            }
        };
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to load configuration: {}", path.display()))
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.lib_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LIB_DIR))
    }

    pub fn store_root(&self) -> PathBuf {
        self.store_root
            .clone()
            .unwrap_or_else(|| self.lib_dir().join("store"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub target_version: Option<OsVersion>,
    pub enable_repos: Vec<String>,
    pub no_rhsm: bool,
    pub debug: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfig {
    pub lib_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub store_root: PathBuf,
    pub product_certs_dir: PathBuf,
    pub dnf_plugin_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFlags {
    pub debug: bool,
    pub verbose: bool,
    pub skip_rhsm: bool,
    pub experimental: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub source_version: OsVersion,
    pub target_version: OsVersion,
    pub architecture: Architecture,
    pub os_variant: String,
    pub paths: PathConfig,
    pub flags: RuntimeFlags,
    pub overlay_size_hint: Option<String>,
    pub enable_repos: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Configuration {
    pub fn from_sources(
        file: &ConfigFile,
        env: &BTreeMap<String, String>,
        os_release: &OsReleaseFacts,
        architecture: Architecture,
        overrides: &ConfigOverrides,
    ) -> IpuResult<Self> {
        let source_version: OsVersion = os_release.version_id.parse()?;
        let target_version = match overrides.target_version {
            Some(version) => version,
            None => match env
                .get(ENV_TARGET_RELEASE)
                .or(file.target_version.as_ref())
            {
                Some(raw) => raw.parse()?,
                None => default_target_version(source_version)?,
            },
        };
        if target_version.major <= source_version.major {
            return Err(IpuError::Config(format!(
                "target version {target_version} is not a major upgrade of {source_version}"
            )));
        }

        let lib_dir = file.lib_dir();
        let paths = PathConfig {
            scratch_dir: file
                .scratch_dir
                .clone()
                .unwrap_or_else(|| lib_dir.join("scratch")),
            store_root: file.store_root(),
            product_certs_dir: file
                .product_certs_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PRODUCT_CERTS_DIR)),
            dnf_plugin_path: file.dnf_plugin_path.clone(),
            lib_dir,
        };

        let mut experimental = file.experimental.clone();
        if let Some(raw) = env.get(ENV_EXPERIMENTAL) {
            experimental.extend(
                raw.split(',')
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string),
            );
        }
        experimental.sort();
        experimental.dedup();

        let flags = RuntimeFlags {
            debug: overrides.debug || env_flag(env, ENV_DEBUG),
            verbose: overrides.verbose || env_flag(env, ENV_VERBOSE),
            skip_rhsm: overrides.no_rhsm
                || env_flag(env, ENV_NO_RHSM)
                || env_flag(env, ENV_DEVEL_SKIP_RHSM),
            experimental,
        };

        let mut enable_repos = file.enable_repos.clone();
        enable_repos.extend(overrides.enable_repos.iter().cloned());
        enable_repos.sort();
        enable_repos.dedup();

        Ok(Self {
            source_version,
            target_version,
            architecture,
            os_variant: os_release.variant_id.clone(),
            paths,
            flags,
            overlay_size_hint: env.get(ENV_OVERLAY_SIZE).cloned(),
            enable_repos,
            env: env
                .iter()
                .filter(|(key, _)| key.starts_with("LEAPP_"))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        })
    }

    pub fn target_userspace_dir(&self) -> PathBuf {
        self.paths
            .lib_dir
            .join(self.target_version.userspace_dir_name())
    }
}

pub fn process_env() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

pub fn env_flag(env: &BTreeMap<String, String>, key: &str) -> bool {
    env.get(key).is_some_and(|value| value.trim() == "1")
}

fn default_target_version(source: OsVersion) -> IpuResult<OsVersion> {
    let source_raw = source.to_string();
    DEFAULT_UPGRADE_PATHS
        .iter()
        .find(|(from, _)| *from == source_raw)
        .map(|(_, to)| to.parse())
        .transpose()?
        .ok_or_else(|| {
            IpuError::Config(format!(
                "no default upgrade path from {source}; pass an explicit target version"
            ))
        })
}

pub fn parse_os_release(raw: &str) -> OsReleaseFacts {
    let mut facts = OsReleaseFacts::default();
    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'').to_string();
        match key.trim() {
            "ID" => facts.id = value,
            "VERSION_ID" => facts.version_id = value,
            "VARIANT_ID" => facts.variant_id = value,
            _ => {}
        }
    }
    facts
}

pub fn read_os_release(path: &Path) -> Result<OsReleaseFacts> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read os-release: {}", path.display()))?;
    Ok(parse_os_release(&raw))
}
