mod command;
mod config;
mod error;
mod models;
mod plugin_data;
mod repofile;
mod retry;
mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use command::{argv, run, run_checked, CallOptions, CommandOutput, CommandRunner, SystemRunner};
pub use config::{
    env_flag, parse_os_release, process_env, read_os_release, ConfigFile, ConfigOverrides,
    Configuration, PathConfig, RuntimeFlags, DEFAULT_CONFIG_PATH, DEFAULT_LIB_DIR,
    DEFAULT_PRODUCT_CERTS_DIR, ENV_DEBUG, ENV_DEVEL_SKIP_RHSM, ENV_EXPERIMENTAL, ENV_NO_RHSM,
    ENV_OVERLAY_SIZE, ENV_TARGET_RELEASE, ENV_VERBOSE,
};
pub use error::{CommandError, IpuError, IpuResult, MountError};
pub use models::{
    FilteredRpmTransactionTasks, Model, OsReleaseFacts, Report, RequiredTargetUserspacePackages,
    RhsmInfo, Severity, TargetRepositories, TargetUserSpaceInfo, UsedTargetRepositories,
    XfsPresence,
};
pub use plugin_data::{
    build_plugin_data, read_plugin_data, write_plugin_data, AwsInfo, DnfConf, DnfPluginData,
    PkgsInfo, PluginDataOptions, RhuiInfo,
};
pub use repofile::{parse_repo_file, read_repo_dir, RepoDefinition};
pub use retry::{with_retry, RetryPolicy};
pub use version::{Architecture, OsVersion};
