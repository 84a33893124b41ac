use leapp_core::DnfConf;

use crate::PluginCommand;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnfOptions {
    pub releasever: String,
    pub module_platform_id: String,
    pub installroot: Option<String>,
    pub gpgcheck: bool,
    pub best: bool,
    pub debugsolver: bool,
    pub allow_erasing: bool,
    pub cacheonly: bool,
    pub download_only: bool,
    pub tsflags_test: bool,
}

impl DnfOptions {
    pub fn for_command(command: PluginCommand, conf: &DnfConf) -> Self {
        let mut options = Self {
            releasever: conf.releasever.clone(),
            module_platform_id: conf.platform_id.clone(),
            installroot: conf.installroot.clone(),
            gpgcheck: conf.gpgcheck,
            best: conf.best,
            debugsolver: conf.debugsolver,
            allow_erasing: conf.allow_erasing,
            cacheonly: false,
            download_only: false,
            tsflags_test: conf.test_flag,
        };
        match command {
            PluginCommand::Check => {}
            PluginCommand::Download => {
                options.download_only = true;
                options.tsflags_test = true;
            }
            PluginCommand::Upgrade => {
                options.cacheonly = true;
            }
        }
        options
    }
}
