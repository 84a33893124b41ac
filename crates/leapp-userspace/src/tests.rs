use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use leapp_core::testing::ScriptedRunner;
use leapp_core::{
    read_plugin_data, Architecture, AwsInfo, ConfigFile, ConfigOverrides, Configuration,
    FilteredRpmTransactionTasks, IpuError, IpuResult, OsReleaseFacts,
    RequiredTargetUserspacePackages, RetryPolicy, RhsmInfo, RhuiInfo, TargetRepositories,
    TargetUserSpaceInfo, UsedTargetRepositories, XfsPresence, ENV_NO_RHSM,
};
use leapp_mount::{NotIsolatedActions, ScratchLayout};
use leapp_workflow::{
    Actor, ActorContext, ContextStore, Message, MessageBus, Phase, UPGRADE_WORKFLOW,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::*;

struct Harness {
    root: PathBuf,
    store: ContextStore,
    context_id: Uuid,
    config: Configuration,
}

impl Harness {
    fn new(label: &str, rhsm: bool, variant: &str, enable_repos: &[&str]) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        let root = std::env::temp_dir().join(format!(
            "leapp-userspace-tests-{label}-{}-{nanos}",
            std::process::id()
        ));
        fs::create_dir_all(&root).expect("must create test root");

        let file = ConfigFile {
            lib_dir: Some(root.join("lib")),
            scratch_dir: Some(root.join("scratch")),
            store_root: Some(root.join("store")),
            product_certs_dir: Some(root.join("certs")),
            ..ConfigFile::default()
        };
        let mut env = BTreeMap::new();
        if !rhsm {
            env.insert(ENV_NO_RHSM.to_string(), "1".to_string());
        }
        let os_release = OsReleaseFacts {
            id: "rhel".to_string(),
            version_id: "8.10".to_string(),
            variant_id: variant.to_string(),
        };
        let overrides = ConfigOverrides {
            enable_repos: enable_repos.iter().map(|id| id.to_string()).collect(),
            ..ConfigOverrides::default()
        };
        let config = Configuration::from_sources(
            &file,
            &env,
            &os_release,
            Architecture::X86_64,
            &overrides,
        )
        .expect("configuration must build");

        let store = ContextStore::new(root.join("store"));
        let context = store
            .create(UPGRADE_WORKFLOW, &config)
            .expect("context must be created");
        Self {
            root,
            store,
            context_id: context.id,
            config,
        }
    }

    fn host(&self) -> HostPaths {
        let mut host = HostPaths::under(self.root.join("host"));
        let plugin = self.root.join("leapp-bin");
        fs::write(&plugin, b"#!/bin/sh\n").expect("must write plugin stand-in");
        host.plugin_binary = Some(plugin);
        fs::create_dir_all(host.root.join("etc/pki/rpm-gpg")).expect("must create pki");
        fs::write(host.root.join("etc/pki/rpm-gpg/RPM-GPG-KEY-redhat-release"), b"key")
            .expect("must write key");
        fs::create_dir_all(host.root.join("etc/yum.repos.d")).expect("must create repos dir");
        host
    }

    fn layout(&self) -> ScratchLayout {
        ScratchLayout::new(&self.config.paths.scratch_dir)
    }

    fn run_actor<F>(
        &self,
        runner: &ScriptedRunner,
        actor: &dyn Actor,
        seed: F,
    ) -> (IpuResult<()>, Vec<Message>)
    where
        F: FnOnce(&mut MessageBus<'_>) -> IpuResult<()>,
    {
        let mut bus = MessageBus::load(&self.store, self.context_id, &BTreeSet::new())
            .expect("bus must load");
        seed(&mut bus).expect("fixtures must be produced");

        let name = actor.name().to_string();
        let result = {
            let mut ctx = ActorContext::new(
                self.context_id,
                actor.phase(),
                &name,
                &self.config,
                runner,
                &mut bus,
            );
            actor.run(&mut ctx)
        };
        let produced = bus
            .messages()
            .iter()
            .filter(|message| message.actor == name)
            .cloned()
            .collect();
        (result, produced)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn decode<M: DeserializeOwned>(messages: &[Message], kind: &str) -> Vec<M> {
    messages
        .iter()
        .filter(|message| message.kind == kind)
        .map(|message| serde_json::from_value(message.data.clone()).expect("must decode"))
        .collect()
}

fn fixture<M: leapp_core::Model>(bus: &mut MessageBus<'_>, model: &M) -> IpuResult<()> {
    bus.produce(Phase::FactsCollection, "fixture", model)
}

fn no_xfs() -> XfsPresence {
    XfsPresence {
        present: false,
        without_ftype: false,
        mountpoints_without_ftype: Vec::new(),
    }
}

fn umount_targets(runner: &ScriptedRunner) -> Vec<String> {
    runner
        .calls_to("umount")
        .into_iter()
        .filter_map(|argv| argv.last().cloned())
        .collect()
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn write_custom_repos(host: &HostPaths, ids: &[&str]) {
    let parent = host.custom_repo_file.parent().expect("repo file parent");
    fs::create_dir_all(parent).expect("must create files dir");
    let content = ids
        .iter()
        .map(|id| format!("[{id}]\nname={id}\nbaseurl=https://cdn.example.test/{id}\nenabled=1\n"))
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(&host.custom_repo_file, content).expect("must write repo file");
}

fn nspawn_dnf_install(runner: &ScriptedRunner) -> Vec<String> {
    runner
        .calls_to("systemd-nspawn")
        .into_iter()
        .find(|argv| argv.iter().any(|arg| arg == "install"))
        .expect("dnf install must run in the container")
}

#[test]
fn creator_builds_one_userspace_from_unioned_package_requests() {
    let harness = Harness::new("creator", false, "server", &["custom-repo"]);
    let host = harness.host();
    write_custom_repos(&host, &["rhel-9-baseos", "custom-repo"]);
    let runner = ScriptedRunner::new();
    let creator = TargetUserspaceCreator::with_host_paths(host.clone());

    let (result, produced) = harness.run_actor(&runner, &creator, |bus| {
        fixture(bus, &RequiredTargetUserspacePackages {
            packages: vec!["vim-minimal".to_string(), "dnf".to_string()],
        })?;
        fixture(bus, &RequiredTargetUserspacePackages {
            packages: vec!["kernel-core".to_string(), "vim-minimal".to_string()],
        })?;
        fixture(bus, &TargetRepositories {
            rhel_repos: vec!["rhel-9-baseos".to_string()],
            custom_repos: Vec::new(),
        })?;
        fixture(bus, &no_xfs())
    });
    result.expect("creator must succeed");

    let install = nspawn_dnf_install(&runner);
    assert_eq!(
        install[install.len() - 3..].to_vec(),
        vec!["dnf", "kernel-core", "vim-minimal"]
    );
    for expected in [
        "--nogpgcheck",
        "--setopt=module_platform_id=platform:el9",
        "--setopt=keepcache=1",
        "--releasever=9.6",
        "--installroot=/el9target",
        "--disablerepo=*",
        "--enablerepo=custom-repo",
        "--enablerepo=rhel-9-baseos",
    ] {
        assert!(install.iter().any(|arg| arg == expected), "missing {expected}");
    }

    let infos = decode::<TargetUserSpaceInfo>(&produced, "TargetUserSpaceInfo");
    assert_eq!(infos.len(), 1);
    let userspace = harness.root.join("lib/el9userspace");
    assert_eq!(infos[0].path, userspace);
    assert_eq!(infos[0].scratch, harness.root.join("scratch"));
    assert_eq!(infos[0].mounts, harness.root.join("scratch/mounts"));

    let used = decode::<UsedTargetRepositories>(&produced, "UsedTargetRepositories");
    assert_eq!(used[0].repos, vec!["custom-repo", "rhel-9-baseos"]);

    assert!(userspace.join("usr/libexec/leapp/rhel-upgrade").is_file());
    assert!(userspace
        .join("etc/pki/rpm-gpg/RPM-GPG-KEY-redhat-release")
        .is_file());
    assert!(userspace.join("etc/yum.repos.d").is_dir());

    let layout = harness.layout();
    assert_eq!(
        umount_targets(&runner),
        vec![
            display(&layout.dnf_cache_target()),
            display(&layout.overlay_target()),
        ]
    );
}

#[test]
fn creator_skips_when_rhsm_is_required_but_unknown() {
    let harness = Harness::new("no-rhsm-info", true, "server", &[]);
    let runner = ScriptedRunner::new();
    let creator = TargetUserspaceCreator::with_host_paths(harness.host());

    let (result, produced) = harness.run_actor(&runner, &creator, |bus| fixture(bus, &no_xfs()));

    result.expect("missing RHSM info is not fatal");
    assert!(produced.is_empty());
    assert!(runner.calls().is_empty());
}

#[test]
fn creator_stops_on_unknown_variant() {
    let harness = Harness::new("variant", true, "workstation", &[]);
    let runner = ScriptedRunner::new();
    let creator = TargetUserspaceCreator::with_host_paths(harness.host());

    let (result, produced) = harness.run_actor(&runner, &creator, |bus| {
        fixture(bus, &RhsmInfo::default())?;
        fixture(bus, &no_xfs())
    });

    let err = result.expect_err("unknown variant must stop");
    assert!(matches!(err, IpuError::StopActorExecution { .. }));
    assert!(err.to_string().contains("certificate"));
    assert!(produced.is_empty());
    assert!(runner.calls().is_empty());
}

#[test]
fn creator_with_rhsm_switches_certificate_and_refreshes() {
    let harness = Harness::new("rhsm", true, "", &[]);
    let host = harness.host();
    write_custom_repos(&host, &["rhel-9-for-x86_64-baseos-rpms"]);
    let cert_dir = harness.root.join("certs/9");
    fs::create_dir_all(&cert_dir).expect("must create cert dir");
    fs::write(cert_dir.join("479.pem"), b"cert").expect("must write cert");
    let runner = ScriptedRunner::new();
    let creator = TargetUserspaceCreator::with_host_paths(host)
        .with_retry_policy(RetryPolicy::once());

    let (result, _) = harness.run_actor(&runner, &creator, |bus| {
        fixture(bus, &RhsmInfo {
            release: Some("8.10".to_string()),
            enabled_repos: vec!["rhel-8-for-x86_64-baseos-rpms".to_string()],
            ..RhsmInfo::default()
        })?;
        fixture(bus, &TargetRepositories {
            rhel_repos: vec!["rhel-9-for-x86_64-baseos-rpms".to_string()],
            custom_repos: Vec::new(),
        })?;
        fixture(bus, &no_xfs())
    });
    result.expect("creator must succeed");

    let refreshed = runner
        .calls_to("systemd-nspawn")
        .into_iter()
        .any(|argv| argv.ends_with(&["subscription-manager".to_string(), "refresh".to_string()]));
    assert!(refreshed);

    let product_dir = harness.layout().overlay_target().join("etc/pki/product");
    assert!(!product_dir.exists(), "target certificate must be removed afterwards");
}

#[test]
fn creator_unwinds_overlay_when_dnf_cache_bind_fails() {
    let harness = Harness::new("bind-fails", false, "server", &[]);
    let runner = ScriptedRunner::new().fail_when(
        |argv| argv.first().is_some_and(|p| p == "mount") && argv.get(1).is_some_and(|a| a == "--bind"),
        32,
        "mount: permission denied",
    );
    let creator = TargetUserspaceCreator::with_host_paths(harness.host());

    let (result, produced) = harness.run_actor(&runner, &creator, |bus| fixture(bus, &no_xfs()));

    let err = result.expect_err("bind failure must fail the actor");
    assert!(matches!(err, IpuError::Mount(_)));
    assert!(produced.is_empty());
    assert_eq!(
        umount_targets(&runner),
        vec![display(&harness.layout().overlay_target())]
    );
    assert!(runner.calls_to("systemd-nspawn").is_empty());
}

#[test]
fn creator_stops_when_target_repos_are_not_defined() {
    let harness = Harness::new("missing-repos", false, "server", &[]);
    let host = harness.host();
    write_custom_repos(&host, &["rhel-9-baseos"]);
    let runner = ScriptedRunner::new();
    let creator = TargetUserspaceCreator::with_host_paths(host);

    let (result, _) = harness.run_actor(&runner, &creator, |bus| {
        fixture(bus, &TargetRepositories {
            rhel_repos: vec!["rhel-9-baseos".to_string(), "rhel-9-appstream".to_string()],
            custom_repos: Vec::new(),
        })?;
        fixture(bus, &no_xfs())
    });

    let err = result.expect_err("missing repo must stop");
    assert!(err.to_string().contains("rhel-9-appstream"));
    assert!(!err.to_string().contains("rhel-9-baseos,"));
    assert_eq!(umount_targets(&runner).len(), 2);
}

#[test]
fn failed_dnf_install_propagates_command_error() {
    let harness = Harness::new("dnf-fails", false, "server", &["custom-repo"]);
    let host = harness.host();
    write_custom_repos(&host, &["custom-repo"]);
    let runner = ScriptedRunner::new().fail_when(
        |argv| argv.first().is_some_and(|p| p == "systemd-nspawn") && argv.iter().any(|a| a == "install"),
        1,
        "Error: Unable to find a match: nonexistent",
    );
    let creator = TargetUserspaceCreator::with_host_paths(host);

    let (result, produced) = harness.run_actor(&runner, &creator, |bus| fixture(bus, &no_xfs()));

    let err = result.expect_err("dnf failure must propagate");
    assert!(matches!(err, IpuError::Command(_)));
    assert_eq!(err.details(), Some("Error: Unable to find a match: nonexistent"));
    assert!(produced.is_empty());
}

#[test]
fn product_cert_ids_follow_architecture() {
    assert_eq!(product_cert_id(Architecture::X86_64, "server"), Some(479));
    assert_eq!(product_cert_id(Architecture::Aarch64, ""), Some(419));
    assert_eq!(product_cert_id(Architecture::Ppc64le, "Server"), Some(279));
    assert_eq!(product_cert_id(Architecture::S390x, "server"), Some(72));
    assert_eq!(product_cert_id(Architecture::X86_64, "workstation"), None);
}

#[test]
fn switched_certificate_restores_originals_on_drop() {
    let harness = Harness::new("certs", false, "server", &[]);
    let base = harness.root.join("ctx");
    let product = base.join("etc/pki/product");
    let product_default = base.join("etc/pki/product-default");
    fs::create_dir_all(&product).expect("must create product dir");
    fs::create_dir_all(&product_default).expect("must create product-default dir");
    fs::write(product.join("69.pem"), b"source").expect("must write source cert");
    let cert = harness.root.join("479.pem");
    fs::write(&cert, b"target").expect("must write target cert");

    let runner = ScriptedRunner::new();
    let context = NotIsolatedActions::new(&runner, &base);
    {
        let _switched = SwitchedCertificate::install(&context, &cert).expect("must switch");
        assert_eq!(fs::read(product.join("479.pem")).expect("target cert"), b"target");
        assert!(!product.join("69.pem").exists());
        assert!(!product_default.exists());
    }

    assert_eq!(fs::read(product.join("69.pem")).expect("source cert"), b"source");
    assert!(!product.join("479.pem").exists());
    assert!(product_default.is_dir());
}

#[test]
fn xfs_scanner_reports_mountpoints_without_ftype() {
    let harness = Harness::new("xfs", false, "server", &[]);
    let mounts = harness.root.join("mounts");
    fs::write(
        &mounts,
        "/dev/vda1 / xfs rw,relatime 0 0\n/dev/vda2 /var xfs rw 0 0\n/dev/vda3 /boot ext4 rw 0 0\nproc /proc proc rw 0 0\n",
    )
    .expect("must write mounts");
    let runner = ScriptedRunner::new()
        .stdout_when(
            |argv| argv.first().is_some_and(|p| p == "xfs_info") && argv.last().is_some_and(|a| a == "/var"),
            "naming   =version 2  bsize=4096   ascii-ci=0, ftype=0\n",
        )
        .stdout_when(
            |argv| argv.first().is_some_and(|p| p == "xfs_info"),
            "naming   =version 2  bsize=4096   ascii-ci=0, ftype=1\n",
        );

    let scanner = XfsInfoScanner::with_mounts_file(&mounts);
    let (result, produced) = harness.run_actor(&runner, &scanner, |_| Ok(()));
    result.expect("scan must succeed");

    let facts = decode::<XfsPresence>(&produced, "XfsPresence");
    assert_eq!(
        facts,
        vec![XfsPresence {
            present: true,
            without_ftype: true,
            mountpoints_without_ftype: vec!["/var".to_string()],
        }]
    );
    assert_eq!(runner.calls_to("xfs_info").len(), 2);
}

#[test]
fn rhsm_scanner_parses_subscription_manager_output() {
    let harness = Harness::new("rhsm-scan", true, "server", &[]);
    let runner = ScriptedRunner::new()
        .stdout_when(
            |argv| argv.get(1).is_some_and(|a| a == "release"),
            "Release: 8.10\n",
        )
        .stdout_when(
            |argv| argv.get(1).is_some_and(|a| a == "repos"),
            "+----------------------------------------------------------+\n    Available Repositories\n+----------------------------------------------------------+\nRepo ID:   rhel-8-for-x86_64-baseos-rpms\nRepo Name: BaseOS\n\nRepo ID:   rhel-8-for-x86_64-appstream-rpms\n",
        )
        .stdout_when(
            |argv| argv.get(1).is_some_and(|a| a == "list"),
            "Subscription Name: Red Hat Enterprise Linux\nSKU:               RH00003\n",
        );
    let scanner = RhsmScanner::with_retry_policy(RetryPolicy::once());

    let (result, produced) = harness.run_actor(&runner, &scanner, |_| Ok(()));
    result.expect("scan must succeed");

    let info = decode::<RhsmInfo>(&produced, "RhsmInfo");
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].release.as_deref(), Some("8.10"));
    assert_eq!(
        info[0].enabled_repos,
        vec![
            "rhel-8-for-x86_64-baseos-rpms",
            "rhel-8-for-x86_64-appstream-rpms"
        ]
    );
    assert_eq!(info[0].attached_skus, vec!["RH00003"]);
}

#[test]
fn rhsm_scanner_retries_then_fails() {
    let harness = Harness::new("rhsm-retry", true, "server", &[]);
    let runner = ScriptedRunner::new().fail_when(|_| true, 70, "Unable to reach the server");
    let scanner = RhsmScanner::with_retry_policy(RetryPolicy::new(3, Duration::ZERO));

    let (result, produced) = harness.run_actor(&runner, &scanner, |_| Ok(()));

    assert!(matches!(result, Err(IpuError::Command(_))));
    assert!(produced.is_empty());
    assert_eq!(runner.calls_to("subscription-manager").len(), 3);
}

#[test]
fn rhsm_scanner_is_silent_when_rhsm_is_disabled() {
    let harness = Harness::new("rhsm-off", false, "server", &[]);
    let runner = ScriptedRunner::new();

    let (result, produced) = harness.run_actor(&runner, &RhsmScanner::new(), |_| Ok(()));

    result.expect("must succeed");
    assert!(produced.is_empty());
    assert!(runner.calls().is_empty());
}

#[test]
fn source_repos_map_to_target_channels() {
    assert_eq!(
        map_repoid("rhel-7-server-rpms", 7, 8, Architecture::X86_64),
        vec![
            "rhel-8-for-x86_64-baseos-rpms",
            "rhel-8-for-x86_64-appstream-rpms"
        ]
    );
    assert_eq!(
        map_repoid("rhel-8-for-aarch64-appstream-rpms", 8, 9, Architecture::Aarch64),
        vec!["rhel-9-for-aarch64-appstream-rpms"]
    );
    assert_eq!(
        map_repoid("rhel-7-server-optional-rpms", 7, 8, Architecture::Ppc64le),
        vec!["codeready-builder-for-rhel-8-ppc64le-rpms"]
    );
    assert!(map_repoid("epel", 8, 9, Architecture::X86_64).is_empty());
}

#[test]
fn target_repositories_combine_mapped_and_custom_repos() {
    let harness = Harness::new("target-repos", true, "server", &["my-custom"]);
    let runner = ScriptedRunner::new();

    let (result, produced) = harness.run_actor(&runner, &TargetRepositoriesCollector, |bus| {
        fixture(bus, &RhsmInfo {
            enabled_repos: vec![
                "rhel-8-for-x86_64-baseos-rpms".to_string(),
                "epel".to_string(),
            ],
            ..RhsmInfo::default()
        })
    });
    result.expect("must succeed");

    let repos = decode::<TargetRepositories>(&produced, "TargetRepositories");
    assert_eq!(repos[0].rhel_repos, vec!["rhel-9-for-x86_64-baseos-rpms"]);
    assert_eq!(repos[0].custom_repos, vec!["my-custom"]);
    assert_eq!(
        gather_target_repoids(&repos, &harness.config.enable_repos),
        vec!["my-custom", "rhel-9-for-x86_64-baseos-rpms"]
    );
}

#[test]
fn transaction_tasks_follow_config_lists_and_installed_packages() {
    let harness = Harness::new("tasks", false, "server", &[]);
    let dir = harness.root.join("transaction");
    fs::create_dir_all(&dir).expect("must create transaction dir");
    fs::write(dir.join("to_install"), "# extra packages\nvim-enhanced\n").expect("write");
    fs::write(dir.join("to_remove"), "python2\nlegacy-tool\n").expect("write");
    fs::write(dir.join("to_keep"), "legacy-tool\n").expect("write");
    let runner = ScriptedRunner::new().stdout_when(
        |argv| argv.first().is_some_and(|p| p == "rpm"),
        "bash\npython2\ngpg-pubkey\nlegacy-tool\n",
    );

    let collector = RpmTransactionTasksCollector::with_transaction_dir(&dir);
    let (result, produced) = harness.run_actor(&runner, &collector, |_| Ok(()));
    result.expect("must succeed");

    let tasks = decode::<FilteredRpmTransactionTasks>(&produced, "FilteredRpmTransactionTasks");
    assert_eq!(tasks[0].to_install, vec!["vim-enhanced"]);
    assert_eq!(tasks[0].to_remove, vec!["python2"]);
    assert_eq!(tasks[0].to_upgrade, vec!["bash", "legacy-tool"]);
}

fn transaction_fixtures(bus: &mut MessageBus<'_>, userspace: &Path, scratch: &Path) -> IpuResult<()> {
    fixture(bus, &TargetUserSpaceInfo {
        path: userspace.to_path_buf(),
        scratch: scratch.to_path_buf(),
        mounts: scratch.join("mounts"),
    })?;
    fixture(bus, &UsedTargetRepositories {
        repos: vec!["rhel-9-baseos".to_string()],
    })?;
    fixture(bus, &FilteredRpmTransactionTasks {
        to_upgrade: vec!["bash".to_string()],
        ..FilteredRpmTransactionTasks::default()
    })?;
    fixture(bus, &FilteredRpmTransactionTasks {
        to_install: vec!["vim-enhanced".to_string()],
        ..FilteredRpmTransactionTasks::default()
    })
}

#[test]
fn download_runs_check_then_download_inside_userspace() {
    let harness = Harness::new("download", false, "server", &[]);
    let host = harness.host();
    let userspace = harness.root.join("lib/el9userspace");
    let scratch = harness.root.join("scratch");
    let runner = ScriptedRunner::new();
    let download = DnfPackageDownload::with_host_paths(host);

    let (result, _) = harness.run_actor(&runner, &download, |bus| {
        transaction_fixtures(bus, &userspace, &scratch)?;
        fixture(bus, &no_xfs())
    });
    result.expect("download must succeed");

    let layout = harness.layout();
    let data_path = display(&layout.plugin_data_path());
    let plugin_calls = runner
        .calls_to("systemd-nspawn")
        .into_iter()
        .filter(|argv| argv.iter().any(|arg| arg == PLUGIN_INSTALL_PATH))
        .collect::<Vec<_>>();
    assert_eq!(plugin_calls.len(), 2);
    assert_eq!(plugin_calls[0][plugin_calls[0].len() - 2..].to_vec(), vec!["check".to_string(), data_path.clone()]);
    assert_eq!(plugin_calls[1][plugin_calls[1].len() - 2..].to_vec(), vec!["download".to_string(), data_path]);
    assert!(plugin_calls[0].contains(&"-D".to_string()));
    assert!(plugin_calls[0].contains(&display(&userspace)));
    assert!(plugin_calls[0].contains(&format!(
        "--bind={}:{}",
        layout.overlay_target().display(),
        SOURCE_INSTALLROOT
    )));

    let data = read_plugin_data(&layout.plugin_data_path()).expect("plugin data must exist");
    assert_eq!(data.dnf_conf.installroot.as_deref(), Some(SOURCE_INSTALLROOT));
    assert!(data.dnf_conf.test_flag);
    assert_eq!(data.dnf_conf.enable_repos, vec!["rhel-9-baseos"]);
    assert_eq!(data.pkgs_info.to_install, vec!["vim-enhanced"]);
    assert_eq!(data.pkgs_info.to_upgrade, vec!["bash"]);
    assert_eq!(umount_targets(&runner).len(), 2);
}

#[test]
fn upgrade_runs_inside_userspace_against_bound_source_root() {
    let harness = Harness::new("upgrade", false, "server", &[]);
    let host = harness.host();
    let userspace = harness.root.join("lib/el9userspace");
    let scratch = harness.root.join("scratch");
    let runner = ScriptedRunner::new();
    let upgrade = DnfUpgradeTransaction::with_host_paths(host.clone());

    let (result, _) = harness.run_actor(&runner, &upgrade, |bus| {
        transaction_fixtures(bus, &userspace, &scratch)
    });
    result.expect("upgrade must succeed");

    let data_path = ScratchLayout::new(&scratch).plugin_data_path();
    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    let command = &calls[0];
    assert_eq!(command[0], "systemd-nspawn");
    assert!(command.contains(&"-D".to_string()));
    assert!(command.contains(&display(&userspace)));
    assert!(command.contains(&format!(
        "--bind={}:{}",
        host.root.display(),
        SOURCE_INSTALLROOT
    )));
    assert!(command.contains(&format!(
        "--bind={}:{}/var/cache/dnf",
        host.dnf_cache.display(),
        SOURCE_INSTALLROOT
    )));
    assert!(command.contains(&format!("--bind={0}:{0}", scratch.display())));
    assert_eq!(
        command[command.len() - 3..].to_vec(),
        vec![
            PLUGIN_INSTALL_PATH.to_string(),
            "upgrade".to_string(),
            display(&data_path)
        ]
    );

    let data = read_plugin_data(&data_path).expect("plugin data must exist");
    assert_eq!(data.dnf_conf.installroot.as_deref(), Some(SOURCE_INSTALLROOT));
    assert!(!data.dnf_conf.test_flag);
    assert!(!data.rhui.aws.on_aws);
}

#[test]
fn plugin_data_carries_rhui_facts() {
    let harness = Harness::new("upgrade-rhui", false, "server", &[]);
    let userspace = harness.root.join("lib/el9userspace");
    let scratch = harness.root.join("scratch");
    let runner = ScriptedRunner::new();
    let upgrade = DnfUpgradeTransaction::with_host_paths(harness.host());

    let (result, _) = harness.run_actor(&runner, &upgrade, |bus| {
        transaction_fixtures(bus, &userspace, &scratch)?;
        fixture(bus, &RhuiInfo {
            aws: AwsInfo {
                on_aws: true,
                region: Some("eu-west-1".to_string()),
            },
        })
    });
    result.expect("upgrade must succeed");

    let data = read_plugin_data(&ScratchLayout::new(&scratch).plugin_data_path())
        .expect("plugin data must exist");
    assert!(data.rhui.aws.on_aws);
    assert_eq!(data.rhui.aws.region.as_deref(), Some("eu-west-1"));
}

#[test]
fn rhui_scanner_reports_aws_client_and_region() {
    let harness = Harness::new("rhui-aws", false, "server", &[]);
    let runner = ScriptedRunner::new().stdout_when(
        |argv| argv.first().is_some_and(|p| p == "curl"),
        "us-east-1\n",
    );

    let (result, produced) = harness.run_actor(&runner, &RhuiScanner, |_| Ok(()));
    result.expect("must succeed");

    let rhui = decode::<RhuiInfo>(&produced, "RhuiInfo");
    assert_eq!(rhui.len(), 1);
    assert!(rhui[0].aws.on_aws);
    assert_eq!(rhui[0].aws.region.as_deref(), Some("us-east-1"));
    assert_eq!(
        runner.calls()[0],
        vec!["rpm", "-q", "rh-amazon-rhui-client"]
    );
}

#[test]
fn rhui_scanner_without_client_skips_region_lookup() {
    let harness = Harness::new("rhui-none", false, "server", &[]);
    let runner = ScriptedRunner::new().fail_when(
        |argv| argv.first().is_some_and(|p| p == "rpm"),
        1,
        "package is not installed",
    );

    let (result, produced) = harness.run_actor(&runner, &RhuiScanner, |_| Ok(()));
    result.expect("must succeed");

    let rhui = decode::<RhuiInfo>(&produced, "RhuiInfo");
    assert_eq!(rhui, vec![RhuiInfo::default()]);
    assert!(runner.calls_to("curl").is_empty());
    assert_eq!(runner.calls_to("rpm").len(), 2);
}

#[test]
fn transaction_requires_prepared_userspace() {
    let harness = Harness::new("no-userspace", false, "server", &[]);
    let runner = ScriptedRunner::new();

    let (result, _) = harness.run_actor(&runner, &DnfUpgradeTransaction::new(), |_| Ok(()));

    let err = result.expect_err("must stop");
    assert!(err.to_string().contains("target userspace was not prepared"));
    assert!(runner.calls().is_empty());
}

#[test]
fn builtin_registry_orders_download_phase() {
    let registry = builtin_registry().expect("registry must build");
    assert_eq!(registry.len(), 8);
    let download = registry
        .actors_for(Phase::Download)
        .expect("must order")
        .into_iter()
        .map(|actor| actor.name().to_string())
        .collect::<Vec<_>>();
    assert_eq!(download, vec!["target_userspace_creator", "dnf_package_download"]);

    let facts = registry
        .actors_for(Phase::FactsCollection)
        .expect("must order")
        .into_iter()
        .map(|actor| actor.name().to_string())
        .collect::<Vec<_>>();
    let rhsm = facts.iter().position(|name| name == "rhsm_scanner");
    let targets = facts
        .iter()
        .position(|name| name == "target_repositories_collector");
    assert!(rhsm < targets);
}
