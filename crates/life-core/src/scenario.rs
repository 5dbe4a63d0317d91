//! JSON lifecycle scenarios
//!
//! A scenario registers a set of types and replays a sequence of lifecycle
//! events against a [`LifecycleTracker`], the way a host interpreter would
//! report them:
//!
//! ```json
//! {
//!   "types": [{ "name": "Person", "auto_derive": true,
//!               "fields": [{ "name": "name", "ty": "String" }, { "name": "age", "ty": "Int" }] }],
//!   "steps": [
//!     { "op": "declare", "name": "a", "ty": "Person" },
//!     { "op": "construct", "slot": "a", "args": ["ann", 31] },
//!     { "op": "declare", "name": "b", "ty": "Person" },
//!     { "op": "consume", "from": "a", "to": "b" }
//!   ]
//! }
//! ```
//!
//! A `consume` step without `last_use` asks a [`LastUseTable`] built from
//! the steps themselves: the move is a last use when no step that can run
//! after it names the source. The two arms of a branch are alternatives, so
//! a use in one arm never follows a use in the other.

use crate::config::TrackerConfig;
use crate::error::{LifeError, LifeResult, StateError};
use crate::oracle::{LastUseTable, UseSite};
use crate::slot::{SlotDecl, SlotId};
use crate::tracker::LifecycleTracker;
use life_val::{BindingMode, Heap, LifeStr, TypeDescriptor, Value};
use log::{debug, warn};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// A literal argument or assigned value
///
/// `null` is the null pointer; `{ "alloc": n }` allocates `n` heap cells and
/// yields a pointer to them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(LifeStr),
    Alloc { alloc: usize },
}

impl Literal {
    pub fn to_value(&self, heap: &mut Heap) -> Value {
        match self {
            Literal::Null => Value::NULL_PTR,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Alloc { alloc } => Value::from(heap.alloc(*alloc)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Declare {
        name: LifeStr,
        ty: LifeStr,
        #[serde(default)]
        mutable: bool,
        #[serde(default)]
        binding: BindingMode,
    },
    Construct {
        slot: LifeStr,
        #[serde(default)]
        args: Vec<Literal>,
    },
    /// Whole-value assignment, or a field assignment when `field` is set
    Assign {
        slot: LifeStr,
        #[serde(default)]
        field: Option<LifeStr>,
        value: Literal,
    },
    Copy {
        from: LifeStr,
        to: LifeStr,
    },
    Consume {
        from: LifeStr,
        to: LifeStr,
        #[serde(default)]
        last_use: Option<bool>,
    },
    /// Taking move leaving the type's null state behind
    Take {
        from: LifeStr,
        to: LifeStr,
    },
    Read {
        slot: LifeStr,
        #[serde(default)]
        field: Option<LifeStr>,
    },
    EnterScope,
    ExitScope,
    /// Two alternative paths, each in its own scope, joined afterwards
    Branch {
        #[serde(rename = "then", default)]
        then_steps: Vec<Step>,
        #[serde(rename = "else", default)]
        else_steps: Vec<Step>,
    },
}

impl Step {
    /// Slot names this step refers to
    fn names(&self) -> Vec<&LifeStr> {
        match self {
            Step::Declare { .. } | Step::EnterScope | Step::ExitScope | Step::Branch { .. } => {
                vec![]
            }
            Step::Construct { slot, .. } | Step::Assign { slot, .. } | Step::Read { slot, .. } => {
                vec![slot]
            }
            Step::Copy { from, to } | Step::Consume { from, to, .. } | Step::Take { from, to } => {
                vec![from, to]
            }
        }
    }

    /// Number of use sites this step occupies, nested branch steps included
    fn site_count(&self) -> usize {
        match self {
            Step::Branch {
                then_steps,
                else_steps,
            } => 1 + site_count(then_steps) + site_count(else_steps),
            _ => 1,
        }
    }
}

fn site_count(steps: &[Step]) -> usize {
    steps.iter().map(Step::site_count).sum()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub types: Vec<TypeDescriptor>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// The step a scenario stopped at
#[derive(Debug)]
pub struct StepFailure {
    /// Index of the step, counting nested branch steps in order
    pub step: usize,
    pub error: LifeError,
}

#[derive(Debug, Default)]
pub struct ScenarioReport {
    /// One line per executed step
    pub trace: Vec<String>,
    /// Every destruction, in order
    pub events: Vec<String>,
    /// Heap allocations never freed
    pub leaked: usize,
    pub failure: Option<StepFailure>,
}

impl ScenarioReport {
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

impl Scenario {
    pub fn from_file(path: &Path) -> LifeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(code: &str) -> LifeResult<Self> {
        Ok(serde_json::from_str(code)?)
    }

    /// Register the scenario's types on a fresh tracker
    pub fn load(&self, config: TrackerConfig) -> LifeResult<LifecycleTracker> {
        let mut tracker = LifecycleTracker::with_config(config);
        for desc in &self.types {
            tracker.register_type(desc.clone())?;
        }
        Ok(tracker)
    }

    /// Replay every step
    ///
    /// Registration failures are returned as errors. A failing step stops
    /// the replay; every open scope is then unwound and the failure is
    /// recorded in the report. The root scope is closed at the end either
    /// way.
    pub fn run(&self, config: TrackerConfig) -> LifeResult<ScenarioReport> {
        let tracker = self.load(config)?;
        let mut oracle = LastUseTable::new();
        mark_last_uses(&self.steps, 0, HashSet::new(), &mut oracle);

        let mut runner = Runner {
            tracker,
            oracle,
            site: 0,
            trace: Vec::new(),
        };
        let failure = runner.run_steps(&self.steps).err();
        if let Some(failure) = &failure {
            debug!("step {} failed: {}", failure.step, failure.error);
        }
        if let Err(e) = runner.tracker.unwind() {
            warn!("unwind failed: {}", e);
        }

        let Runner { tracker, trace, .. } = runner;
        Ok(ScenarioReport {
            trace,
            events: tracker.events().iter().map(|e| e.to_string()).collect(),
            leaked: tracker.leaked(),
            failure,
        })
    }
}

/// Mark every use that no later step on any path repeats
///
/// Steps are numbered in pre-order starting at `first`, branch arms after
/// their branch step. `live_out` holds the names used after `steps`. Walking
/// backwards, a name is live when some path ahead still uses it; both arms
/// of a branch start from what is live after the branch, and a declaration
/// ends the liveness of the name it shadows. Returns the names live before
/// `steps`.
fn mark_last_uses(
    steps: &[Step],
    first: UseSite,
    live_out: HashSet<LifeStr>,
    oracle: &mut LastUseTable<LifeStr>,
) -> HashSet<LifeStr> {
    let mut sites = Vec::with_capacity(steps.len());
    let mut site = first;
    for step in steps {
        sites.push(site);
        site += step.site_count();
    }

    let mut live = live_out;
    for (step, site) in steps.iter().zip(sites).rev() {
        match step {
            Step::Declare { name, .. } => {
                live.remove(name);
            }
            Step::Branch {
                then_steps,
                else_steps,
            } => {
                let else_first = site + 1 + site_count(then_steps);
                let mut live_in = mark_last_uses(then_steps, site + 1, live.clone(), oracle);
                live_in.extend(mark_last_uses(else_steps, else_first, live, oracle));
                live = live_in;
            }
            _ => {}
        }
        for name in step.names() {
            oracle.record_use(name.clone(), site);
            if !live.contains(name) {
                oracle.mark_last_use(name.clone(), site);
            }
            live.insert(name.clone());
        }
    }
    live
}

struct Runner {
    tracker: LifecycleTracker,
    oracle: LastUseTable<LifeStr>,
    site: UseSite,
    trace: Vec<String>,
}

impl Runner {
    fn run_steps(&mut self, steps: &[Step]) -> std::result::Result<(), StepFailure> {
        for step in steps {
            let site = self.site;
            self.site += 1;
            match step {
                Step::Branch {
                    then_steps,
                    else_steps,
                } => self.branch(then_steps, else_steps, site)?,
                _ => self
                    .exec(step, site)
                    .map_err(|error| StepFailure { step: site, error })?,
            }
        }
        Ok(())
    }

    /// Run both arms from the same starting state and join them
    ///
    /// A failure inside an arm is reported at the failing nested step.
    fn branch(
        &mut self,
        then_steps: &[Step],
        else_steps: &[Step],
        site: UseSite,
    ) -> std::result::Result<(), StepFailure> {
        let at = move |error| StepFailure { step: site, error };
        let before = self.tracker.checkpoint();
        self.trace.push("branch then".to_string());
        self.run_arm(then_steps, site)?;
        let then_state = self.tracker.checkpoint();
        self.tracker.restore(&before).map_err(at)?;
        self.trace.push("branch else".to_string());
        self.run_arm(else_steps, site)?;
        self.tracker.join(&then_state).map_err(at)?;
        self.trace.push("branch join".to_string());
        Ok(())
    }

    /// Run one arm of a branch in its own scope
    fn run_arm(&mut self, steps: &[Step], site: UseSite) -> std::result::Result<(), StepFailure> {
        self.tracker.enter_scope();
        if let Err(failure) = self.run_steps(steps) {
            warn!("branch step {} failed: {}", failure.step, failure.error);
            return Err(failure);
        }
        self.tracker
            .exit_scope()
            .map(|_| ())
            .map_err(|error| StepFailure { step: site, error })
    }

    fn slot(&self, name: &str) -> LifeResult<SlotId> {
        self.tracker
            .find(name)
            .ok_or_else(|| {
                StateError::UndeclaredSlot {
                    name: name.to_string(),
                }
                .into()
            })
    }

    fn exec(&mut self, step: &Step, site: UseSite) -> LifeResult<()> {
        match step {
            Step::Declare {
                name,
                ty,
                mutable,
                binding,
            } => {
                let mut decl = SlotDecl::new(name.clone(), ty.clone()).binding(*binding);
                if *mutable {
                    decl = decl.mutable();
                }
                self.tracker.declare(decl)?;
                self.trace.push(format!("declare {}: {}", name, ty));
            }
            Step::Construct { slot, args } => {
                let id = self.slot(slot)?;
                let heap = self.tracker.heap_mut();
                let args: Vec<Value> = args.iter().map(|a| a.to_value(heap)).collect();
                let shown = args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
                self.tracker.construct(id, args)?;
                self.trace
                    .push(format!("construct {}({})", slot, shown.join(", ")));
            }
            Step::Assign { slot, field, value } => {
                let id = self.slot(slot)?;
                let value = value.to_value(self.tracker.heap_mut());
                let shown = value.to_string();
                match field {
                    Some(field) => {
                        self.tracker.assign_field(id, field, value)?;
                        self.trace.push(format!("assign {}.{} = {}", slot, field, shown));
                    }
                    None => {
                        self.tracker.assign(id, value)?;
                        self.trace.push(format!("assign {} = {}", slot, shown));
                    }
                }
            }
            Step::Copy { from, to } => {
                let (src, dst) = (self.slot(from)?, self.slot(to)?);
                self.tracker.copy(src, dst)?;
                self.trace.push(format!("copy {} -> {}", from, to));
            }
            Step::Consume { from, to, last_use } => {
                let (src, dst) = (self.slot(from)?, self.slot(to)?);
                let last_use = last_use.unwrap_or_else(|| self.oracle.is_last_use(from, site));
                self.tracker.consume(src, dst, last_use)?;
                self.trace.push(format!("consume {} -> {}", from, to));
            }
            Step::Take { from, to } => {
                let (src, dst) = (self.slot(from)?, self.slot(to)?);
                self.tracker.take_default(src, dst)?;
                self.trace.push(format!("take {} -> {}", from, to));
            }
            Step::Read { slot, field } => {
                let id = self.slot(slot)?;
                let line = match field {
                    Some(field) => {
                        format!("read {}.{} = {}", slot, field, self.tracker.read_field(id, field)?)
                    }
                    None => format!("read {} = {}", slot, self.tracker.read(id)?),
                };
                self.trace.push(line);
            }
            Step::EnterScope => {
                self.tracker.enter_scope();
                self.trace.push("enter scope".to_string());
            }
            Step::ExitScope => {
                self.tracker.exit_scope()?;
                self.trace.push("exit scope".to_string());
            }
            // replayed by run_steps, which tracks the nested step indices
            Step::Branch { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_steps() {
        let scenario = Scenario::from_json(
            r#"{
                "steps": [
                    { "op": "declare", "name": "p", "ty": "Pointer", "mutable": true },
                    { "op": "construct", "slot": "p", "args": [{ "alloc": 2 }] },
                    { "op": "assign", "slot": "p", "value": null },
                    { "op": "enter_scope" },
                    { "op": "branch", "then": [{ "op": "read", "slot": "p" }] }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(scenario.steps.len(), 5);
        assert_eq!(
            scenario.steps[1],
            Step::Construct {
                slot: "p".into(),
                args: vec![Literal::Alloc { alloc: 2 }],
            }
        );
        assert!(matches!(
            &scenario.steps[2],
            Step::Assign { value: Literal::Null, field: None, .. }
        ));
        assert!(matches!(
            &scenario.steps[4],
            Step::Branch { else_steps, .. } if else_steps.is_empty()
        ));
    }

    #[test]
    fn test_unknown_op_rejected() {
        assert!(Scenario::from_json(r#"{ "steps": [{ "op": "teleport" }] }"#).is_err());
    }
}
