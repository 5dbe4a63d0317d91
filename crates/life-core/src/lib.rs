pub mod config;
pub mod error;
pub mod moves;
pub mod oracle;
pub mod registry;
pub mod resolver;
pub mod scenario;
pub mod scheduler;
pub mod slot;
pub mod synth;
pub mod tracker;

#[cfg(test)]
mod tests;

pub use crate::config::TrackerConfig;
pub use crate::error::{LifeError, LifeResult};
pub use crate::moves::MoveTracker;
pub use crate::oracle::LastUseTable;
pub use crate::registry::{TypeInfo, TypeRegistry};
pub use crate::resolver::{LifecycleOp, LifecycleResolver, OpKind, OpRequest};
pub use crate::scenario::{Scenario, ScenarioReport};
pub use crate::scheduler::{DestroyEvent, DestroyKind, DestructionScheduler};
pub use crate::slot::{SlotDecl, SlotId, SlotStore, ValueSlot};
pub use crate::tracker::{Checkpoint, LifecycleTracker};

/// Replay a JSON scenario with the default configuration
pub fn run(code: &str) -> LifeResult<ScenarioReport> {
    Scenario::from_json(code)?.run(TrackerConfig::default())
}

/// Replay a scenario file, with an optional JSON config file
pub fn run_file(path: &std::path::Path, config: Option<&std::path::Path>) -> LifeResult<ScenarioReport> {
    let config = match config {
        Some(path) => TrackerConfig::from_file(path)?,
        None => TrackerConfig::default(),
    };
    Scenario::from_file(path)?.run(config)
}
