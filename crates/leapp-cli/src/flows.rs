use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use leapp_core::{
    process_env, read_os_release, Architecture, CommandRunner, ConfigFile, ConfigOverrides,
    Configuration, OsReleaseFacts,
};
use leapp_workflow::{
    current_unix_timestamp, ActorRegistry, Breadcrumb, Checkpoint, ContextStore, ExecutionContext,
    Phase, PhaseState, RunOptions, Workflow, WorkflowOutcome, PREUPGRADE_WORKFLOW,
    UPGRADE_WORKFLOW,
};
use uuid::Uuid;

use crate::cli::GlobalArgs;
use crate::render::{render_status_line, OutputStyle, TerminalRenderer};

const OS_RELEASE_PATH: &str = "/etc/os-release";
const RECENT_RUNS: usize = 5;

pub(crate) fn load_configuration(global: &GlobalArgs) -> Result<Configuration> {
    let file = ConfigFile::load(&global.config)?;
    let os_release = read_os_release(Path::new(OS_RELEASE_PATH))?;
    let architecture = Architecture::host()
        .ok_or_else(|| anyhow!("unsupported architecture: {}", std::env::consts::ARCH))?;
    build_configuration(global, &file, &process_env(), &os_release, architecture)
}

pub(crate) fn open_store(global: &GlobalArgs) -> Result<ContextStore> {
    let file = ConfigFile::load(&global.config)?;
    Ok(ContextStore::new(file.store_root()))
}

pub(crate) fn build_configuration(
    global: &GlobalArgs,
    file: &ConfigFile,
    env: &BTreeMap<String, String>,
    os_release: &OsReleaseFacts,
    architecture: Architecture,
) -> Result<Configuration> {
    let overrides = ConfigOverrides {
        target_version: global.target,
        enable_repos: global.enable_repos.clone(),
        no_rhsm: global.no_rhsm,
        debug: global.debug,
        verbose: global.verbose,
    };
    Configuration::from_sources(file, env, os_release, architecture, &overrides)
        .context("failed to build upgrade configuration")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunReport {
    pub(crate) activity: &'static str,
    pub(crate) context_id: Uuid,
    pub(crate) outcome: WorkflowOutcome,
}

impl RunReport {
    pub(crate) fn lines(&self, style: OutputStyle) -> Vec<String> {
        let context = self.context_id;
        match &self.outcome {
            WorkflowOutcome::Completed => vec![render_status_line(
                style,
                "ok",
                &format!("{} completed (context={context})", self.activity),
            )],
            WorkflowOutcome::Stopped { after } => vec![render_status_line(
                style,
                "ok",
                &format!(
                    "{} finished after phase {after}; no inhibitors found (context={context})",
                    self.activity
                ),
            )],
            WorkflowOutcome::RestartRequested { after } => vec![
                render_status_line(
                    style,
                    "info",
                    &format!("phase {after} completed; reboot to continue the upgrade"),
                ),
                "after the reboot, run `leapp upgrade --resume`".to_string(),
            ],
            WorkflowOutcome::Inhibited { reports } => {
                let mut lines = vec![render_status_line(
                    style,
                    "fail",
                    &format!(
                        "{} inhibited by {} report(s) (context={context})",
                        self.activity,
                        reports.len()
                    ),
                )];
                lines.extend(
                    reports
                        .iter()
                        .map(|report| format!("  - {}: {}", report.title, report.summary)),
                );
                lines
            }
            WorkflowOutcome::Failed {
                phase,
                actor,
                error,
            } => {
                let mut lines = vec![render_status_line(
                    style,
                    "fail",
                    &format!("actor {actor} failed in phase {phase} (context={context})"),
                )];
                lines.extend(error.lines().map(|line| format!("  {line}")));
                lines
            }
        }
    }

    pub(crate) fn into_result(self) -> Result<()> {
        match self.outcome {
            WorkflowOutcome::Failed { phase, .. } => {
                bail!("{} failed in phase {phase}", self.activity)
            }
            WorkflowOutcome::Inhibited { .. } => bail!("{} inhibited", self.activity),
            _ => Ok(()),
        }
    }
}

pub(crate) fn run_preupgrade(
    config: &Configuration,
    runner: &dyn CommandRunner,
    registry: &ActorRegistry,
    renderer: &TerminalRenderer,
) -> Result<RunReport> {
    let store = ContextStore::new(&config.paths.store_root);
    if let Some(marker) = store.read_active()? {
        bail!(
            "an upgrade is already in progress (context={}); finish it with `leapp upgrade --resume`",
            marker.context_id
        );
    }

    let context = store.create(PREUPGRADE_WORKFLOW, config)?;
    renderer.print_section("preupgrade");
    let outcome = execute(
        &store,
        &context,
        runner,
        registry,
        renderer,
        RunOptions {
            stop_after: Some(Phase::Reports),
        },
        "preupgrade",
    )?;
    Ok(RunReport {
        activity: "preupgrade",
        context_id: context.id,
        outcome,
    })
}

pub(crate) fn start_upgrade(
    config: &Configuration,
    runner: &dyn CommandRunner,
    registry: &ActorRegistry,
    renderer: &TerminalRenderer,
) -> Result<RunReport> {
    let store = ContextStore::new(&config.paths.store_root);
    if let Some(marker) = store.read_active()? {
        bail!(
            "an upgrade is already in progress (context={}); run `leapp upgrade --resume`",
            marker.context_id
        );
    }
    let context = store.create(UPGRADE_WORKFLOW, config)?;
    store.set_active(context.id)?;
    run_upgrade(&store, &context, runner, registry, renderer)
}

pub(crate) fn resume_upgrade(
    store: &ContextStore,
    runner: &dyn CommandRunner,
    registry: &ActorRegistry,
    renderer: &TerminalRenderer,
) -> Result<RunReport> {
    let marker = store
        .read_active()?
        .ok_or_else(|| anyhow!("no upgrade in progress to resume"))?;
    let context = store.open(marker.context_id)?;
    if context.workflow != UPGRADE_WORKFLOW {
        bail!(
            "active context {} belongs to workflow {}, not {UPGRADE_WORKFLOW}",
            context.id,
            context.workflow
        );
    }
    tracing::info!(
        context = %context.id,
        resume_after = ?marker.resume_after,
        "resuming upgrade"
    );
    run_upgrade(store, &context, runner, registry, renderer)
}

fn run_upgrade(
    store: &ContextStore,
    context: &ExecutionContext,
    runner: &dyn CommandRunner,
    registry: &ActorRegistry,
    renderer: &TerminalRenderer,
) -> Result<RunReport> {
    renderer.print_section("upgrade");
    let outcome = execute(
        store,
        context,
        runner,
        registry,
        renderer,
        RunOptions::default(),
        "upgrade",
    )?;
    // A failed or restarting run keeps the marker so `--resume` can pick it up.
    if matches!(
        outcome,
        WorkflowOutcome::Completed | WorkflowOutcome::Inhibited { .. }
    ) {
        store.clear_active()?;
    }
    Ok(RunReport {
        activity: "upgrade",
        context_id: context.id,
        outcome,
    })
}

fn execute(
    store: &ContextStore,
    context: &ExecutionContext,
    runner: &dyn CommandRunner,
    registry: &ActorRegistry,
    renderer: &TerminalRenderer,
    options: RunOptions,
    activity: &str,
) -> Result<WorkflowOutcome> {
    let started_at_unix = current_unix_timestamp()?;
    let progress = renderer.start_progress(activity);
    let result = Workflow::new(registry, runner).run(store, context, options);
    let success = result.as_ref().is_ok_and(WorkflowOutcome::is_success);

    store.record_breadcrumb(Breadcrumb {
        activity: activity.to_string(),
        run_id: context.id,
        success,
        executed: invocation(),
        started_at_unix,
        finished_at_unix: current_unix_timestamp()?,
    })?;

    let outcome = result.with_context(|| format!("{activity} workflow aborted"))?;
    let completed = store.completed_phases(context.id)?.len() as u64;
    progress.finish(completed, Phase::ALL.len() as u64);
    Ok(outcome)
}

fn invocation() -> String {
    std::env::args().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActiveUpgrade {
    pub(crate) context_id: Uuid,
    pub(crate) workflow: String,
    pub(crate) resume_after: Option<Phase>,
    pub(crate) completed: Vec<Phase>,
    pub(crate) last_failure: Option<Checkpoint>,
}

impl ActiveUpgrade {
    pub(crate) fn next_phase(&self) -> Option<Phase> {
        Phase::ALL
            .into_iter()
            .find(|phase| !self.completed.contains(phase))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusReport {
    pub(crate) active: Option<ActiveUpgrade>,
    pub(crate) recent: Vec<Breadcrumb>,
}

pub(crate) fn collect_status(store: &ContextStore) -> Result<StatusReport> {
    let active = match store.read_active()? {
        Some(marker) => {
            let context = store.open(marker.context_id)?;
            let checkpoints = store.read_checkpoints(context.id)?;
            let last_failure = checkpoints
                .last()
                .filter(|checkpoint| checkpoint.status == PhaseState::Failed)
                .cloned();
            Some(ActiveUpgrade {
                context_id: context.id,
                workflow: context.workflow,
                resume_after: marker.resume_after,
                completed: store.completed_phases(marker.context_id)?,
                last_failure,
            })
        }
        None => None,
    };

    let mut recent = store.read_breadcrumbs()?;
    let skip = recent.len().saturating_sub(RECENT_RUNS);
    recent.drain(..skip);
    Ok(StatusReport { active, recent })
}

impl StatusReport {
    pub(crate) fn lines(&self, style: OutputStyle) -> Vec<String> {
        let mut lines = Vec::new();
        match &self.active {
            None => lines.push(render_status_line(style, "info", "no upgrade in progress")),
            Some(active) => {
                lines.push(render_status_line(
                    style,
                    "info",
                    &format!(
                        "upgrade in progress: context={} workflow={}",
                        active.context_id, active.workflow
                    ),
                ));
                let completed = active
                    .completed
                    .iter()
                    .map(|phase| phase.name())
                    .collect::<Vec<_>>();
                lines.push(format!(
                    "completed phases: {}",
                    if completed.is_empty() {
                        "none".to_string()
                    } else {
                        completed.join(", ")
                    }
                ));
                if let Some(phase) = active.resume_after {
                    lines.push(format!("resume point: after {phase}"));
                }
                if let Some(next) = active.next_phase() {
                    lines.push(format!("next phase: {next}"));
                }
                if let Some(failure) = &active.last_failure {
                    lines.push(render_status_line(
                        style,
                        "warn",
                        &format!("last attempt failed in phase {}", failure.phase),
                    ));
                }
            }
        }

        if !self.recent.is_empty() {
            lines.push("recent runs:".to_string());
            for run in &self.recent {
                lines.push(format!(
                    "  {} {} (context={} started={})",
                    run.activity,
                    if run.success { "succeeded" } else { "failed" },
                    run.run_id,
                    run.started_at_unix
                ));
            }
        }
        lines
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        let active = self.active.as_ref().map(|active| {
            serde_json::json!({
                "context_id": active.context_id,
                "workflow": active.workflow,
                "resume_after": active.resume_after,
                "completed_phases": active.completed,
                "next_phase": active.next_phase(),
                "last_failure": active.last_failure,
            })
        });
        serde_json::json!({
            "active": active,
            "recent_runs": self.recent,
        })
    }
}
