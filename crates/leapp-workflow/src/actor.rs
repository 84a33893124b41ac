use std::collections::BTreeMap;

use leapp_core::{CommandRunner, Configuration, IpuResult, Model};
use uuid::Uuid;

use crate::order::topo_order;
use crate::{MessageBus, Phase};

pub trait Actor {
    fn name(&self) -> &str;
    fn phase(&self) -> Phase;

    fn consumes(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn produces(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn run(&self, ctx: &mut ActorContext<'_, '_>) -> IpuResult<()>;
}

pub struct ActorContext<'a, 's> {
    pub context_id: Uuid,
    pub phase: Phase,
    pub actor: &'a str,
    pub config: &'a Configuration,
    pub runner: &'a dyn CommandRunner,
    bus: &'a mut MessageBus<'s>,
}

impl<'a, 's> ActorContext<'a, 's> {
    pub fn new(
        context_id: Uuid,
        phase: Phase,
        actor: &'a str,
        config: &'a Configuration,
        runner: &'a dyn CommandRunner,
        bus: &'a mut MessageBus<'s>,
    ) -> Self {
        Self {
            context_id,
            phase,
            actor,
            config,
            runner,
            bus,
        }
    }

    pub fn consume<M: Model>(&self) -> IpuResult<Vec<M>> {
        self.bus.consume()
    }

    pub fn produce<M: Model>(&mut self, model: &M) -> IpuResult<()> {
        self.bus.produce(self.phase, self.actor, model)
    }
}

#[derive(Default)]
pub struct ActorRegistry {
    actors: BTreeMap<Phase, Vec<Box<dyn Actor>>>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, actor: Box<dyn Actor>) -> anyhow::Result<()> {
        let name = actor.name().to_string();
        let duplicate = self
            .actors
            .values()
            .flatten()
            .any(|existing| existing.name() == name);
        if duplicate {
            anyhow::bail!("actor '{name}' is already registered");
        }
        tracing::trace!(actor = %name, phase = %actor.phase(), "registered actor");
        self.actors.entry(actor.phase()).or_default().push(actor);
        Ok(())
    }

    pub fn with(mut self, actor: impl Actor + 'static) -> anyhow::Result<Self> {
        self.register(Box::new(actor))?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.actors.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn actors_for(&self, phase: Phase) -> anyhow::Result<Vec<&dyn Actor>> {
        let Some(actors) = self.actors.get(&phase) else {
            return Ok(Vec::new());
        };
        let by_name = actors
            .iter()
            .map(|actor| (actor.name().to_string(), actor.as_ref()))
            .collect::<BTreeMap<_, _>>();
        let order = topo_order(&by_name)?;
        Ok(order
            .iter()
            .filter_map(|name| by_name.get(name).copied())
            .collect())
    }
}
