use std::collections::BTreeSet;

use leapp_core::{RepoDefinition, RhuiInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoState {
    pub id: String,
    pub enabled: bool,
    pub mirrorlist: Option<String>,
    pub mirrorlist_overridden: bool,
}

impl From<RepoDefinition> for RepoState {
    fn from(value: RepoDefinition) -> Self {
        Self {
            id: value.id,
            enabled: value.enabled,
            mirrorlist: value.mirrorlist,
            mirrorlist_overridden: false,
        }
    }
}

// Mirrorlists of these repos carry a region placeholder that cannot be
// resolved offline in the initramfs.
const AWS_RHUI_MIRRORLISTS: &[(&str, &str)] = &[
    (
        "rhel-8-baseos-rhui-rpms",
        "https://rhui3.{region}.aws.ce.redhat.com/pulp/mirror/content/dist/rhel8/rhui/$releasever/$basearch/baseos/os",
    ),
    (
        "rhel-8-appstream-rhui-rpms",
        "https://rhui3.{region}.aws.ce.redhat.com/pulp/mirror/content/dist/rhel8/rhui/$releasever/$basearch/appstream/os",
    ),
    (
        "rhui-client-config-server-8",
        "https://rhui3.{region}.aws.ce.redhat.com/pulp/mirror/protected/rhui-client-config/rhel/8/$basearch/os",
    ),
];

pub fn apply_repo_allowlist(repos: &mut [RepoState], enable_repos: &[String]) -> Vec<String> {
    let allowed = enable_repos
        .iter()
        .map(String::as_str)
        .collect::<BTreeSet<_>>();
    for repo in repos.iter_mut() {
        repo.enabled = allowed.contains(repo.id.as_str());
    }

    let known = repos
        .iter()
        .map(|repo| repo.id.as_str())
        .collect::<BTreeSet<_>>();
    allowed
        .into_iter()
        .filter(|id| !known.contains(id))
        .map(str::to_string)
        .collect()
}

pub fn enable_repos(repos: &mut [RepoState], enable_repos: &[String]) {
    for repo in repos.iter_mut() {
        if enable_repos.iter().any(|id| id == &repo.id) {
            repo.enabled = true;
        }
    }
}

pub fn apply_rhui_mirrorlists(repos: &mut [RepoState], rhui: &RhuiInfo) {
    if !rhui.aws.on_aws {
        return;
    }
    let Some(region) = rhui.aws.region.as_deref() else {
        tracing::warn!("running on AWS but no region is known; RHUI mirrorlists left untouched");
        return;
    };

    for repo in repos.iter_mut() {
        let Some((_, template)) = AWS_RHUI_MIRRORLISTS
            .iter()
            .find(|(id, _)| *id == repo.id)
        else {
            continue;
        };
        let mirrorlist = template.replace("{region}", region);
        tracing::debug!(repo = %repo.id, mirrorlist = %mirrorlist, "overriding RHUI mirrorlist");
        repo.mirrorlist = Some(mirrorlist);
        repo.mirrorlist_overridden = true;
    }
}
