mod builder;
mod certs;
mod facts;
mod repos;
mod transaction;

use leapp_workflow::ActorRegistry;

pub use builder::{required_packages, HostPaths, TargetUserspaceCreator, PLUGIN_INSTALL_PATH};
pub use certs::{product_cert_id, product_cert_path, SwitchedCertificate};
pub use facts::{
    map_repoid, RhsmScanner, RhuiScanner, RpmTransactionTasksCollector,
    TargetRepositoriesCollector, XfsInfoScanner,
};
pub use repos::{check_target_repoids, gather_target_repoids};
pub use transaction::{merge_tasks, DnfPackageDownload, DnfUpgradeTransaction, SOURCE_INSTALLROOT};

pub fn builtin_registry() -> anyhow::Result<ActorRegistry> {
    ActorRegistry::new()
        .with(XfsInfoScanner::new())?
        .with(RhsmScanner::new())?
        .with(RhuiScanner)?
        .with(TargetRepositoriesCollector)?
        .with(RpmTransactionTasksCollector::new())?
        .with(TargetUserspaceCreator::new())?
        .with(DnfPackageDownload::new())?
        .with(DnfUpgradeTransaction::new())
}

#[cfg(test)]
mod tests;
