use std::collections::BTreeSet;

use anyhow::{Context, Result};
use leapp_core::{CommandRunner, IpuError, Model, Report};

use crate::{ActorContext, ActorRegistry, ContextStore, ExecutionContext, MessageBus, Phase, PhaseState};

pub const UPGRADE_WORKFLOW: &str = "IPUWorkflow";
pub const PREUPGRADE_WORKFLOW: &str = "IPUWorkflow-preupgrade";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub stop_after: Option<Phase>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Completed,
    Stopped { after: Phase },
    RestartRequested { after: Phase },
    Inhibited { reports: Vec<Report> },
    Failed {
        phase: Phase,
        actor: String,
        error: String,
    },
}

impl WorkflowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Stopped { .. } | Self::RestartRequested { .. }
        )
    }
}

pub struct Workflow<'r> {
    registry: &'r ActorRegistry,
    runner: &'r dyn CommandRunner,
}

impl<'r> Workflow<'r> {
    pub fn new(registry: &'r ActorRegistry, runner: &'r dyn CommandRunner) -> Self {
        Self { registry, runner }
    }

    pub fn run(
        &self,
        store: &ContextStore,
        context: &ExecutionContext,
        options: RunOptions,
    ) -> Result<WorkflowOutcome> {
        let completed = completed_prefix(store, context)?;
        let mut bus = MessageBus::load(store, context.id, &completed)?;

        for phase in Phase::ALL {
            if completed.contains(&phase) {
                tracing::debug!(phase = %phase, "phase already completed; skipping");
                continue;
            }

            tracing::info!(phase = %phase, "starting phase");
            let actors = self
                .registry
                .actors_for(phase)
                .with_context(|| format!("failed to schedule actors of phase {phase}"))?;

            for actor in actors {
                let name = actor.name().to_string();
                tracing::info!(phase = %phase, actor = %name, "running actor");
                let mut ctx = ActorContext::new(
                    context.id,
                    phase,
                    &name,
                    &context.configuration,
                    self.runner,
                    &mut bus,
                );

                if let Err(err) = actor.run(&mut ctx) {
                    let error = describe(&err);
                    tracing::error!(phase = %phase, actor = %name, error = %error, "actor failed");
                    store.append_checkpoint(context.id, phase, Some(name.as_str()), PhaseState::Failed)?;
                    store.append_checkpoint(context.id, phase, None, PhaseState::Failed)?;
                    return Ok(WorkflowOutcome::Failed {
                        phase,
                        actor: name,
                        error,
                    });
                }

                if phase == Phase::FactsCollection {
                    store.append_checkpoint(context.id, phase, Some(name.as_str()), PhaseState::Completed)?;
                }
            }

            store.append_checkpoint(context.id, phase, None, PhaseState::Completed)?;
            tracing::info!(phase = %phase, "phase completed");
            if phase.is_checkpoint() && context.workflow == UPGRADE_WORKFLOW {
                store.record_resume_point(context.id, phase)?;
            }

            if phase == Phase::Reports {
                let reports = bus
                    .consume::<Report>()
                    .with_context(|| format!("failed to read {} messages", Report::NAME))?;
                let inhibitors = reports
                    .into_iter()
                    .filter(|report| report.inhibitor)
                    .collect::<Vec<_>>();
                if !inhibitors.is_empty() {
                    tracing::warn!(count = inhibitors.len(), "upgrade inhibited");
                    return Ok(WorkflowOutcome::Inhibited {
                        reports: inhibitors,
                    });
                }
            }

            if options.stop_after == Some(phase) {
                return Ok(WorkflowOutcome::Stopped { after: phase });
            }
            if phase.restart_after() {
                return Ok(WorkflowOutcome::RestartRequested { after: phase });
            }
        }

        Ok(WorkflowOutcome::Completed)
    }
}

fn completed_prefix(store: &ContextStore, context: &ExecutionContext) -> Result<BTreeSet<Phase>> {
    let completed = store.completed_phases(context.id)?;
    for (expected, actual) in Phase::ALL.iter().zip(completed.iter()) {
        if expected != actual {
            anyhow::bail!(
                "checkpoints of context {} are inconsistent: {actual} completed before {expected}",
                context.id
            );
        }
    }
    Ok(completed.into_iter().collect())
}

fn describe(err: &IpuError) -> String {
    let mut message = err.to_string();
    if let Some(details) = err.details().filter(|details| !details.trim().is_empty()) {
        message.push_str(&format!("\n{}", details.trim()));
    }
    if let Some(hint) = err.hint() {
        message.push_str(&format!("\nHint: {hint}"));
    }
    message
}
