use std::collections::{BTreeMap, BTreeSet};

use leapp_core::{IpuError, IpuResult, Model};
use uuid::Uuid;

use crate::{ContextStore, Message, Phase};

pub struct MessageBus<'s> {
    store: &'s ContextStore,
    context_id: Uuid,
    messages: Vec<Message>,
    attempts: BTreeMap<Phase, u32>,
    next_seq: u64,
}

impl<'s> MessageBus<'s> {
    pub fn load(
        store: &'s ContextStore,
        context_id: Uuid,
        completed: &BTreeSet<Phase>,
    ) -> anyhow::Result<Self> {
        let persisted = store.read_messages(context_id)?;
        let attempts = store.phase_attempts(context_id)?;
        let next_seq = persisted
            .iter()
            .map(|message| message.seq)
            .max()
            .unwrap_or(0)
            + 1;

        // A completed phase never runs again, so its successful run is the
        // one numbered after all of its recorded failures.
        let (messages, dropped): (Vec<_>, Vec<_>) =
            persisted.into_iter().partition(|message| {
                completed.contains(&message.phase)
                    && message.attempt == attempts.get(&message.phase).copied().unwrap_or(0)
            });
        if !dropped.is_empty() {
            tracing::debug!(
                dropped = dropped.len(),
                "ignoring messages from failed or incomplete phase runs"
            );
        }

        Ok(Self {
            store,
            context_id,
            messages,
            attempts,
            next_seq,
        })
    }

    pub fn consume<M: Model>(&self) -> IpuResult<Vec<M>> {
        self.messages
            .iter()
            .filter(|message| message.kind == M::NAME)
            .map(|message| serde_json::from_value(message.data.clone()).map_err(IpuError::from))
            .collect()
    }

    pub fn produce<M: Model>(&mut self, phase: Phase, actor: &str, model: &M) -> IpuResult<()> {
        let message = Message {
            seq: self.next_seq,
            kind: M::NAME.to_string(),
            phase,
            attempt: self.attempts.get(&phase).copied().unwrap_or(0),
            actor: actor.to_string(),
            data: serde_json::to_value(model)?,
        };
        self.store
            .append_message(self.context_id, &message)
            .map_err(|err| {
                IpuError::io(
                    format!("failed to persist {} message", M::NAME),
                    std::io::Error::other(format!("{err:#}")),
                )
            })?;
        tracing::debug!(kind = M::NAME, actor, seq = message.seq, "produced message");
        self.next_seq += 1;
        self.messages.push(message);
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}
