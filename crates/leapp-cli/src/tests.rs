use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use leapp_core::testing::ScriptedRunner;
use leapp_core::{
    build_plugin_data, write_plugin_data, Architecture, ConfigFile, Configuration,
    FilteredRpmTransactionTasks, IpuError, IpuResult, Model, OsReleaseFacts, OsVersion,
    PluginDataOptions, Report, Severity,
};
use leapp_dnfplugin::{BatchReport, PluginCommand, PluginRun, TransactionOutcome};
use leapp_workflow::{Actor, ActorContext, ActorRegistry, ContextStore, Phase, WorkflowOutcome};

use super::*;
use crate::cli::{CliCompletionShell, GlobalArgs, PluginAction};
use crate::flows::{
    build_configuration, collect_status, resume_upgrade, run_preupgrade, start_upgrade,
};
use crate::plugin::{plugin_report_lines, run_rhel_upgrade};
use crate::render::{render_progress_line, render_status_line, resolve_output_style, OutputStyle};

fn os_args(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

#[test]
fn plugin_program_name_dispatches_to_rhel_upgrade() {
    let args = normalize_args(os_args(&[
        "/usr/libexec/leapp/rhel-upgrade",
        "download",
        "/var/lib/leapp/scratch/dnf-plugin-data.txt",
    ]));
    let cli = Cli::try_parse_from(args).expect("plugin invocation parses");
    match cli.command {
        Commands::RhelUpgrade { action, data_file } => {
            assert_eq!(action, PluginAction::Download);
            assert_eq!(
                data_file,
                PathBuf::from("/var/lib/leapp/scratch/dnf-plugin-data.txt")
            );
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn leapp_program_name_is_left_alone() {
    let args = normalize_args(os_args(&["/usr/bin/leapp", "preupgrade"]));
    assert_eq!(args, os_args(&["/usr/bin/leapp", "preupgrade"]));
}

#[test]
fn cli_parses_global_overrides_after_subcommand() {
    let cli = Cli::try_parse_from([
        "leapp",
        "upgrade",
        "--resume",
        "--target",
        "9.4",
        "--enablerepo",
        "custom-a",
        "--enablerepo",
        "custom-b",
        "--no-rhsm",
        "--debug",
    ])
    .expect("command parses");

    assert!(matches!(cli.command, Commands::Upgrade { resume: true }));
    assert_eq!(cli.global.target, Some(OsVersion::new(9, 4)));
    assert_eq!(cli.global.enable_repos, vec!["custom-a", "custom-b"]);
    assert!(cli.global.no_rhsm);
    assert!(cli.global.debug);
    assert!(!cli.global.verbose);
    assert_eq!(cli.global.config, PathBuf::from("/etc/leapp/leapp.toml"));
}

#[test]
fn cli_rejects_invalid_target_version() {
    let err = Cli::try_parse_from(["leapp", "preupgrade", "--target", "nine"])
        .expect_err("invalid version must fail");
    assert!(err.to_string().contains("invalid OS version"));
}

#[test]
fn cli_rejects_unknown_plugin_command() {
    let err = Cli::try_parse_from(["leapp", "rhel-upgrade", "erase", "/tmp/data.txt"])
        .expect_err("unknown action must fail");
    let rendered = err.to_string();
    assert!(rendered.contains("erase"));
    assert!(rendered.contains("possible values"));
}

#[test]
fn plugin_actions_map_onto_plugin_commands() {
    assert_eq!(PluginCommand::from(PluginAction::Check), PluginCommand::Check);
    assert_eq!(PluginCommand::from(PluginAction::Download), PluginCommand::Download);
    assert_eq!(PluginCommand::from(PluginAction::Upgrade), PluginCommand::Upgrade);
}

#[test]
fn cli_parses_completions_for_each_supported_shell() {
    let cases = vec![
        ("bash", CliCompletionShell::Bash),
        ("zsh", CliCompletionShell::Zsh),
        ("fish", CliCompletionShell::Fish),
        ("powershell", CliCompletionShell::Powershell),
    ];

    for (shell, expected) in cases {
        let cli = Cli::try_parse_from(["leapp", "completions", shell]).expect("command parses");
        match cli.command {
            Commands::Completions { shell } => assert_eq!(shell, expected),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

#[test]
fn cli_rejects_unsupported_completion_shell() {
    let err = Cli::try_parse_from(["leapp", "completions", "elvish"])
        .expect_err("unsupported shell must fail");
    assert!(err.to_string().contains("elvish"));
}

#[test]
fn completion_script_covers_subcommands() {
    let mut output = Vec::new();
    completion::write_completions_script(CliCompletionShell::Bash, &mut output)
        .expect("script must render");
    let script = String::from_utf8(output).expect("utf-8 script");
    assert!(script.contains("leapp"));
    assert!(script.contains("preupgrade"));
    assert!(script.contains("rhel-upgrade"));
}

#[test]
fn log_filter_follows_debug_and_verbose() {
    assert_eq!(default_log_filter(true, true), "debug");
    assert_eq!(default_log_filter(false, true), "info");
    assert_eq!(default_log_filter(false, false), "warn");
}

#[test]
fn resolve_output_style_follows_stdout() {
    assert_eq!(resolve_output_style(true, false), OutputStyle::Rich);
    assert_eq!(resolve_output_style(false, true), OutputStyle::Plain);
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "upgrade completed"),
        "upgrade completed"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "last attempt failed"),
        "[WARN] last attempt failed"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "fail", "upgrade inhibited"),
        "[FAIL] upgrade inhibited"
    );
}

#[test]
fn progress_line_is_suppressed_for_plain_output() {
    assert!(render_progress_line(OutputStyle::Plain, "upgrade", 3, 13, None).is_none());
    let line = render_progress_line(OutputStyle::Rich, "upgrade", 13, 13, None)
        .expect("rich output renders progress");
    assert!(line.contains("100%"));
    assert!(line.contains("13/13 phases"));
}

#[test]
fn cli_overrides_win_over_file_and_environment() {
    let global = GlobalArgs {
        target: Some(OsVersion::new(9, 4)),
        enable_repos: vec!["cli-repo".to_string()],
        no_rhsm: true,
        ..GlobalArgs::default()
    };
    let file = ConfigFile::from_toml_str(
        "target_version = \"9.2\"\nenable_repos = [\"file-repo\"]\n",
    )
    .expect("config parses");
    let env = BTreeMap::from([("LEAPP_DEVEL_TARGET_RELEASE".to_string(), "9.3".to_string())]);

    let config = build_configuration(&global, &file, &env, &rhel_810(), Architecture::X86_64)
        .expect("configuration must build");

    assert_eq!(config.target_version, OsVersion::new(9, 4));
    assert_eq!(config.enable_repos, vec!["cli-repo", "file-repo"]);
    assert!(config.flags.skip_rhsm);
}

struct Harness {
    root: PathBuf,
    config: Configuration,
}

impl Harness {
    fn new(label: &str) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        let root = std::env::temp_dir().join(format!(
            "leapp-cli-tests-{label}-{}-{nanos}",
            std::process::id()
        ));
        fs::create_dir_all(&root).expect("must create test root");
        let file = ConfigFile {
            lib_dir: Some(root.join("lib")),
            ..ConfigFile::default()
        };
        let config = build_configuration(
            &GlobalArgs::default(),
            &file,
            &BTreeMap::new(),
            &rhel_810(),
            Architecture::X86_64,
        )
        .expect("configuration must build");
        Self { root, config }
    }

    fn store(&self) -> ContextStore {
        ContextStore::new(&self.config.paths.store_root)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn rhel_810() -> OsReleaseFacts {
    OsReleaseFacts {
        id: "rhel".to_string(),
        version_id: "8.10".to_string(),
        variant_id: "server".to_string(),
    }
}

fn plain() -> TerminalRenderer {
    TerminalRenderer::from_style(OutputStyle::Plain)
}

struct StepActor {
    name: &'static str,
    phase: Phase,
    fail: bool,
}

impl Actor for StepActor {
    fn name(&self) -> &str {
        self.name
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn run(&self, _ctx: &mut ActorContext<'_, '_>) -> IpuResult<()> {
        if self.fail {
            return Err(IpuError::stop_with_hint(
                "Cannot prepare the initramfs",
                "Please check the boot partition",
            ));
        }
        Ok(())
    }
}

struct InhibitingActor;

impl Actor for InhibitingActor {
    fn name(&self) -> &str {
        "inhibiting_check"
    }

    fn phase(&self) -> Phase {
        Phase::Checks
    }

    fn produces(&self) -> Vec<&'static str> {
        vec![Report::NAME]
    }

    fn run(&self, ctx: &mut ActorContext<'_, '_>) -> IpuResult<()> {
        ctx.produce(&Report {
            title: "Unsupported filesystem".to_string(),
            summary: "Root is on an unsupported filesystem".to_string(),
            severity: Severity::High,
            inhibitor: true,
        })
    }
}

fn step(name: &'static str, phase: Phase) -> StepActor {
    StepActor {
        name,
        phase,
        fail: false,
    }
}

fn steps_registry() -> ActorRegistry {
    ActorRegistry::new()
        .with(step("facts", Phase::FactsCollection))
        .and_then(|registry| registry.with(step("download", Phase::Download)))
        .and_then(|registry| registry.with(step("rpm_upgrade", Phase::RPMUpgrade)))
        .expect("registry must build")
}

#[test]
fn preupgrade_stops_after_reports_without_claiming_the_marker() {
    let harness = Harness::new("preupgrade");
    let runner = ScriptedRunner::new();

    let report = run_preupgrade(&harness.config, &runner, &steps_registry(), &plain())
        .expect("preupgrade must run");

    assert_eq!(
        report.outcome,
        WorkflowOutcome::Stopped {
            after: Phase::Reports
        }
    );
    let store = harness.store();
    assert_eq!(store.read_active().expect("read marker"), None);
    assert_eq!(
        store.completed_phases(report.context_id).expect("phases"),
        vec![Phase::FactsCollection, Phase::Checks, Phase::Reports]
    );
    let breadcrumbs = store.read_breadcrumbs().expect("breadcrumbs");
    assert_eq!(breadcrumbs.len(), 1);
    assert_eq!(breadcrumbs[0].activity, "preupgrade");
    assert!(breadcrumbs[0].success);
    assert!(report.into_result().is_ok());
}

#[test]
fn upgrade_resumes_across_restarts_until_completed() {
    let harness = Harness::new("resume");
    let runner = ScriptedRunner::new();
    let registry = steps_registry();
    let store = harness.store();

    let first = start_upgrade(&harness.config, &runner, &registry, &plain())
        .expect("upgrade must start");
    assert_eq!(
        first.outcome,
        WorkflowOutcome::RestartRequested {
            after: Phase::InterimPreparation
        }
    );
    assert!(first
        .lines(OutputStyle::Plain)
        .iter()
        .any(|line| line.contains("leapp upgrade --resume")));

    let marker = store.read_active().expect("read").expect("marker kept");
    assert_eq!(marker.context_id, first.context_id);

    let second = resume_upgrade(&store, &runner, &registry, &plain()).expect("must resume");
    assert_eq!(second.context_id, first.context_id);
    assert_eq!(
        second.outcome,
        WorkflowOutcome::RestartRequested {
            after: Phase::Finalization
        }
    );
    let marker = store.read_active().expect("read").expect("marker kept");
    assert_eq!(marker.resume_after, Some(Phase::RPMUpgrade));

    let third = resume_upgrade(&store, &runner, &registry, &plain()).expect("must resume");
    assert_eq!(third.outcome, WorkflowOutcome::Completed);
    assert_eq!(store.read_active().expect("read"), None);
    assert_eq!(store.read_breadcrumbs().expect("breadcrumbs").len(), 3);
}

#[test]
fn failed_upgrade_keeps_marker_and_reports_hint() {
    let harness = Harness::new("failed");
    let runner = ScriptedRunner::new();
    let registry = ActorRegistry::new()
        .with(StepActor {
            name: "initramfs",
            phase: Phase::InterimPreparation,
            fail: true,
        })
        .expect("registry must build");

    let report = start_upgrade(&harness.config, &runner, &registry, &plain())
        .expect("workflow must run");

    let lines = report.lines(OutputStyle::Plain);
    assert!(lines[0].contains("actor initramfs failed in phase InterimPreparation"));
    assert!(lines
        .iter()
        .any(|line| line.contains("Hint: Please check the boot partition")));

    let store = harness.store();
    assert!(store.read_active().expect("read").is_some());
    let status = collect_status(&store).expect("status");
    let active = status.active.as_ref().expect("active upgrade");
    assert_eq!(active.next_phase(), Some(Phase::InterimPreparation));
    assert_eq!(
        active.last_failure.as_ref().map(|failure| failure.phase),
        Some(Phase::InterimPreparation)
    );
    assert!(status
        .lines(OutputStyle::Plain)
        .iter()
        .any(|line| line == "next phase: InterimPreparation"));
    assert!(!status.recent[0].success);

    let err = report.into_result().expect_err("failure must exit non-zero");
    assert_eq!(err.to_string(), "upgrade failed in phase InterimPreparation");
}

#[test]
fn inhibited_upgrade_releases_the_marker() {
    let harness = Harness::new("inhibited");
    let runner = ScriptedRunner::new();
    let registry = ActorRegistry::new()
        .with(InhibitingActor)
        .expect("registry must build");

    let report = start_upgrade(&harness.config, &runner, &registry, &plain())
        .expect("workflow must run");

    match &report.outcome {
        WorkflowOutcome::Inhibited { reports } => assert_eq!(reports.len(), 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(report
        .lines(OutputStyle::Plain)
        .iter()
        .any(|line| line == "  - Unsupported filesystem: Root is on an unsupported filesystem"));
    assert_eq!(harness.store().read_active().expect("read"), None);
}

#[test]
fn second_upgrade_is_refused_while_one_is_active() {
    let harness = Harness::new("exclusive");
    let runner = ScriptedRunner::new();
    let registry = steps_registry();
    let first = start_upgrade(&harness.config, &runner, &registry, &plain())
        .expect("upgrade must start");

    let err = start_upgrade(&harness.config, &runner, &registry, &plain())
        .expect_err("second upgrade must be refused");
    assert!(err
        .to_string()
        .contains(&format!("already in progress (context={})", first.context_id)));

    let err = run_preupgrade(&harness.config, &runner, &registry, &plain())
        .expect_err("preupgrade must be refused");
    assert!(err.to_string().contains("already in progress"));
}

#[test]
fn resume_without_active_upgrade_fails() {
    let harness = Harness::new("no-resume");
    let runner = ScriptedRunner::new();

    let err = resume_upgrade(&harness.store(), &runner, &steps_registry(), &plain())
        .expect_err("nothing to resume");
    assert_eq!(err.to_string(), "no upgrade in progress to resume");
}

#[test]
fn status_without_active_upgrade_is_idle() {
    let harness = Harness::new("status-idle");
    let status = collect_status(&harness.store()).expect("status");
    assert_eq!(status.active, None);
    assert_eq!(status.lines(OutputStyle::Plain), vec!["no upgrade in progress"]);
    assert_eq!(status.to_json()["active"], serde_json::Value::Null);
}

fn write_data_file(root: &Path) -> PathBuf {
    let installroot = root.join("installroot");
    fs::create_dir_all(installroot.join("etc/yum.repos.d")).expect("must create repos dir");
    fs::write(
        installroot.join("etc/yum.repos.d/target.repo"),
        "[rhel-9-baseos]\nname=BaseOS\nbaseurl=https://cdn.example.test/baseos\nenabled=0\n",
    )
    .expect("must write repo file");

    let tasks = FilteredRpmTransactionTasks {
        to_upgrade: vec!["bash".to_string()],
        ..FilteredRpmTransactionTasks::default()
    };
    let data = build_plugin_data(
        &OsVersion::new(9, 6),
        &tasks,
        &["rhel-9-baseos".to_string(), "missing-repo".to_string()],
        &PluginDataOptions {
            installroot: Some(installroot.display().to_string()),
            test_flag: true,
            gpgcheck: true,
            ..PluginDataOptions::default()
        },
    );
    write_plugin_data(&root.join("scratch/dnf-plugin-data.txt"), &data)
        .expect("plugin data must be written")
}

#[test]
fn rhel_upgrade_check_resolves_inside_the_installroot() {
    let harness = Harness::new("plugin-check");
    let data_file = write_data_file(&harness.root);
    let runner = ScriptedRunner::new().stdout_when(
        |argv| argv.iter().any(|arg| arg == "repoquery"),
        "bash-5.1.8-9.el9.x86_64\n",
    );

    run_rhel_upgrade(&runner, PluginCommand::Check, &data_file).expect("check must pass");

    let shell = runner
        .calls_to("dnf")
        .into_iter()
        .find(|argv| argv.iter().any(|arg| arg == "shell"))
        .expect("dnf shell must run");
    let script = harness.root.join("scratch/dnf-shell-script.txt");
    assert_eq!(shell.last(), Some(&script.display().to_string()));
    assert!(shell.iter().any(|arg| arg == "--enablerepo=rhel-9-baseos"));
    assert!(!shell.iter().any(|arg| arg == "--enablerepo=missing-repo"));
    let content = fs::read_to_string(&script).expect("script written");
    assert!(content.starts_with("upgrade bash\n"));
}

#[test]
fn rhel_upgrade_fails_when_transaction_does_not_resolve() {
    let harness = Harness::new("plugin-fail");
    let data_file = write_data_file(&harness.root);
    let runner = ScriptedRunner::new().fail_when(
        |argv| argv.iter().any(|arg| arg == "shell"),
        1,
        "Problem: package foo requires bar, but none of the providers can be installed",
    );

    let err = run_rhel_upgrade(&runner, PluginCommand::Download, &data_file)
        .expect_err("unresolved transaction must fail");
    assert_eq!(err.to_string(), "rhel-upgrade download failed");
    assert!(format!("{err:#}").contains("none of the providers"));
}

#[test]
fn rhel_upgrade_requires_a_data_file() {
    let harness = Harness::new("plugin-missing");
    let runner = ScriptedRunner::new();
    let missing = harness.root.join("nope.txt");

    let err = run_rhel_upgrade(&runner, PluginCommand::Check, &missing)
        .expect_err("missing data must fail");
    assert!(err.to_string().contains("failed to load plugin data"));
    assert!(runner.calls().is_empty());
}

#[test]
fn plugin_report_lists_unmatched_specs_and_unknown_repos() {
    let run = PluginRun {
        outcome: TransactionOutcome::Downloaded,
        report: BatchReport {
            unmatched_install: vec!["nonexistent".to_string()],
            ..BatchReport::default()
        },
        unknown_repos: vec!["missing-repo".to_string()],
    };

    assert_eq!(
        plugin_report_lines(&run, OutputStyle::Plain),
        vec![
            "ignored repositories not defined in the target userspace: missing-repo",
            "nothing matched for installation: nonexistent",
            "transaction packages downloaded",
        ]
    );
}
