mod actor;
mod bus;
mod engine;
mod order;
mod phase;
mod store;

pub use actor::{Actor, ActorContext, ActorRegistry};
pub use bus::MessageBus;
pub use engine::{RunOptions, Workflow, WorkflowOutcome, PREUPGRADE_WORKFLOW, UPGRADE_WORKFLOW};
pub use phase::{ErrorPolicy, Phase, PhasePolicy, PhaseState, RetryScope};
pub use store::{
    current_unix_timestamp, ActiveMarker, Breadcrumb, Checkpoint, ContextStore, ExecutionContext,
    Message,
};
