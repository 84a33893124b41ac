use std::collections::BTreeSet;

use leapp_core::{read_repo_dir, IpuError, IpuResult, TargetRepositories};
use leapp_mount::IsolatedActions;

pub fn gather_target_repoids(targets: &[TargetRepositories], enable_repos: &[String]) -> Vec<String> {
    targets
        .iter()
        .flat_map(|target| target.repoids())
        .map(str::to_string)
        .chain(enable_repos.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn check_target_repoids(context: &dyn IsolatedActions, repoids: &[String]) -> IpuResult<()> {
    if repoids.is_empty() {
        return Err(IpuError::stop_with_hint(
            "No target repositories are available for the upgrade",
            "Enable the target repositories with --enablerepo or provide a custom repository file",
        ));
    }

    let defined = read_repo_dir(&context.full_path("/etc/yum.repos.d"))?
        .into_iter()
        .map(|repo| repo.id)
        .collect::<BTreeSet<_>>();
    let missing = repoids
        .iter()
        .filter(|id| !defined.contains(*id))
        .cloned()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(IpuError::stop_with_hint(
            format!(
                "Some required target repositories are not defined: {}",
                missing.join(", ")
            ),
            "Ensure the target repositories are configured and reachable",
        ));
    }
    Ok(())
}
