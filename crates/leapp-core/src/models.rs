use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub trait Model: Serialize + DeserializeOwned {
    const NAME: &'static str;
}

macro_rules! model {
    ($ty:ident) => {
        impl Model for $ty {
            const NAME: &'static str = stringify!($ty);
        }
    };
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUserSpaceInfo {
    pub path: PathBuf,
    pub scratch: PathBuf,
    pub mounts: PathBuf,
}
model!(TargetUserSpaceInfo);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XfsPresence {
    pub present: bool,
    pub without_ftype: bool,
    #[serde(default)]
    pub mountpoints_without_ftype: Vec<String>,
}
model!(XfsPresence);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredTargetUserspacePackages {
    pub packages: Vec<String>,
}
model!(RequiredTargetUserspacePackages);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RhsmInfo {
    pub release: Option<String>,
    #[serde(default)]
    pub enabled_repos: Vec<String>,
    #[serde(default)]
    pub attached_skus: Vec<String>,
    #[serde(default)]
    pub is_container: bool,
}
model!(RhsmInfo);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRepositories {
    #[serde(default)]
    pub rhel_repos: Vec<String>,
    #[serde(default)]
    pub custom_repos: Vec<String>,
}
model!(TargetRepositories);

impl TargetRepositories {
    pub fn repoids(&self) -> impl Iterator<Item = &str> {
        self.rhel_repos
            .iter()
            .chain(self.custom_repos.iter())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedTargetRepositories {
    pub repos: Vec<String>,
}
model!(UsedTargetRepositories);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredRpmTransactionTasks {
    #[serde(default)]
    pub local_rpms: Vec<String>,
    #[serde(default)]
    pub to_install: Vec<String>,
    #[serde(default)]
    pub to_remove: Vec<String>,
    #[serde(default)]
    pub to_upgrade: Vec<String>,
    #[serde(default)]
    pub modules_to_enable: Vec<String>,
}
model!(FilteredRpmTransactionTasks);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsReleaseFacts {
    pub id: String,
    pub version_id: String,
    #[serde(default)]
    pub variant_id: String,
}
model!(OsReleaseFacts);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub summary: String,
    pub severity: Severity,
    #[serde(default)]
    pub inhibitor: bool,
}
model!(Report);
