use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use leapp_core::Configuration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Phase, PhaseState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub id: Uuid,
    pub workflow: String,
    pub created_at_unix: u64,
    pub configuration: Configuration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub phase: Phase,
    // Failed runs of `phase` recorded before this message was produced.
    #[serde(default)]
    pub attempt: u32,
    pub actor: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub seq: u64,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub status: PhaseState,
    pub recorded_at_unix: u64,
}

impl Checkpoint {
    pub fn is_phase_completion(&self) -> bool {
        self.actor.is_none() && self.status == PhaseState::Completed
    }

    pub fn is_phase_failure(&self) -> bool {
        self.actor.is_none() && self.status == PhaseState::Failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMarker {
    pub context_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_after: Option<Phase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub activity: String,
    pub run_id: Uuid,
    pub success: bool,
    pub executed: String,
    pub started_at_unix: u64,
    pub finished_at_unix: u64,
}

#[derive(Debug, Clone)]
pub struct ContextStore {
    root: PathBuf,
}

impl ContextStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn context_dir(&self, id: Uuid) -> PathBuf {
        self.root.join("contexts").join(id.to_string())
    }

    fn context_path(&self, id: Uuid) -> PathBuf {
        self.context_dir(id).join("context.json")
    }

    pub fn messages_path(&self, id: Uuid) -> PathBuf {
        self.context_dir(id).join("messages.jsonl")
    }

    pub fn checkpoints_path(&self, id: Uuid) -> PathBuf {
        self.context_dir(id).join("checkpoints.jsonl")
    }

    fn active_path(&self) -> PathBuf {
        self.root.join("active")
    }

    fn breadcrumbs_path(&self) -> PathBuf {
        self.root.join("migration-results.json")
    }

    pub fn create(&self, workflow: &str, configuration: &Configuration) -> Result<ExecutionContext> {
        let context = ExecutionContext {
            id: Uuid::new_v4(),
            workflow: workflow.to_string(),
            created_at_unix: current_unix_timestamp()?,
            configuration: configuration.clone(),
        };
        let dir = self.context_dir(context.id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create context dir: {}", dir.display()))?;

        let path = self.context_path(context.id);
        let content = serde_json::to_string_pretty(&context)
            .context("failed to serialize execution context")?;
        fs::write(&path, content)
            .with_context(|| format!("failed to write execution context: {}", path.display()))?;
        tracing::debug!(context = %context.id, workflow, "created execution context");
        Ok(context)
    }

    pub fn open(&self, id: Uuid) -> Result<ExecutionContext> {
        let path = self.context_path(id);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read execution context: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing execution context: {}", path.display()))
    }

    pub fn set_active(&self, id: Uuid) -> Result<PathBuf> {
        let path = self.active_path();
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let detail = self
                    .read_active()
                    .ok()
                    .flatten()
                    .map(|marker| format!(" (context={})", marker.context_id))
                    .unwrap_or_default();
                return Err(anyhow!("an upgrade is already in progress{detail}"));
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to claim active marker: {}", path.display()));
            }
        };

        let marker = ActiveMarker {
            context_id: id,
            resume_after: None,
        };
        let content = serde_json::to_string(&marker).context("failed to serialize active marker")?;
        file.write_all(format!("{content}\n").as_bytes())
            .with_context(|| format!("failed to write active marker: {}", path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush active marker: {}", path.display()))?;
        Ok(path)
    }

    pub fn read_active(&self) -> Result<Option<ActiveMarker>> {
        let path = self.active_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read active marker: {}", path.display()));
            }
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let marker = serde_json::from_str(raw.trim())
            .with_context(|| format!("failed parsing active marker: {}", path.display()))?;
        Ok(Some(marker))
    }

    pub fn record_resume_point(&self, id: Uuid, phase: Phase) -> Result<()> {
        let path = self.active_path();
        let marker = match self.read_active()? {
            Some(marker) if marker.context_id != id => {
                return Err(anyhow!(
                    "active marker belongs to context {}, not {id}",
                    marker.context_id
                ));
            }
            _ => ActiveMarker {
                context_id: id,
                resume_after: Some(phase),
            },
        };
        let content = serde_json::to_string(&marker).context("failed to serialize active marker")?;
        fs::write(&path, format!("{content}\n"))
            .with_context(|| format!("failed to write active marker: {}", path.display()))
    }

    pub fn clear_active(&self) -> Result<()> {
        let path = self.active_path();
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to clear active marker: {}", path.display()))?;
        }
        Ok(())
    }

    pub fn append_message(&self, id: Uuid, message: &Message) -> Result<()> {
        append_json_line(&self.messages_path(id), message)
    }

    pub fn read_messages(&self, id: Uuid) -> Result<Vec<Message>> {
        read_json_lines(&self.messages_path(id))
    }

    pub fn append_checkpoint(
        &self,
        id: Uuid,
        phase: Phase,
        actor: Option<&str>,
        status: PhaseState,
    ) -> Result<Checkpoint> {
        let seq = self.read_checkpoints(id)?.len() as u64 + 1;
        let checkpoint = Checkpoint {
            seq,
            phase,
            actor: actor.map(str::to_string),
            status,
            recorded_at_unix: current_unix_timestamp()?,
        };
        append_json_line(&self.checkpoints_path(id), &checkpoint)?;
        Ok(checkpoint)
    }

    pub fn read_checkpoints(&self, id: Uuid) -> Result<Vec<Checkpoint>> {
        read_json_lines(&self.checkpoints_path(id))
    }

    pub fn completed_phases(&self, id: Uuid) -> Result<Vec<Phase>> {
        let mut phases = self
            .read_checkpoints(id)?
            .into_iter()
            .filter(Checkpoint::is_phase_completion)
            .map(|checkpoint| checkpoint.phase)
            .collect::<Vec<_>>();
        phases.sort();
        phases.dedup();
        Ok(phases)
    }

    pub fn phase_attempts(&self, id: Uuid) -> Result<BTreeMap<Phase, u32>> {
        let mut attempts = BTreeMap::new();
        for checkpoint in self.read_checkpoints(id)? {
            if checkpoint.is_phase_failure() {
                *attempts.entry(checkpoint.phase).or_insert(0) += 1;
            }
        }
        Ok(attempts)
    }

    pub fn record_breadcrumb(&self, breadcrumb: Breadcrumb) -> Result<()> {
        let mut breadcrumbs = self.read_breadcrumbs()?;
        breadcrumbs.push(breadcrumb);

        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        let path = self.breadcrumbs_path();
        let content = serde_json::to_string_pretty(&breadcrumbs)
            .context("failed to serialize migration results")?;
        fs::write(&path, content)
            .with_context(|| format!("failed to write migration results: {}", path.display()))
    }

    pub fn read_breadcrumbs(&self) -> Result<Vec<Breadcrumb>> {
        let path = self.breadcrumbs_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read migration results: {}", path.display())
                });
            }
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing migration results: {}", path.display()))
    }
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let line = serde_json::to_string(value)
        .with_context(|| format!("failed to serialize entry for {}", path.display()))?;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open journal: {}", path.display()))?;
    file.write_all(format!("{line}\n").as_bytes())
        .with_context(|| format!("failed to append journal: {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush journal: {}", path.display()))
}

fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read journal: {}", path.display()));
        }
    };

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| {
                format!("failed parsing {} line {}", path.display(), index + 1)
            })
        })
        .collect()
}

pub fn current_unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}
