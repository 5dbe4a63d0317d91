//! Scope-exit destruction
//!
//! Slots are destroyed last-declared first. A value whose type has no
//! destructor is destroyed structurally: each field, last declared first,
//! recursively. A type with a destructor runs it once and then still
//! destroys every field it does not declare as unmanaged.

use crate::config::TrackerConfig;
use crate::error::{LifeError, LifeResult};
use crate::registry::TypeRegistry;
use crate::slot::{SlotId, SlotStore};
use crate::synth::DestroyPlan;
use life_val::{Heap, LifeStr, PathExt, SlotState, Value};
use log::{debug, trace, warn};
use strum_macros::{Display, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum DestroyKind {
    /// The type's own destructor ran
    Explicit,
    /// All fields were destroyed, no destructor body involved
    FieldWise,
    /// Nothing to run
    Trivial,
}

/// One destruction step, `path` is the dotted access path (`p.age`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyEvent {
    pub path: LifeStr,
    pub ty: LifeStr,
    pub kind: DestroyKind,
}

impl std::fmt::Display for DestroyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "destroy {}: {} ({})", self.path, self.ty, self.kind)
    }
}

pub struct DestructionScheduler<'a> {
    registry: &'a TypeRegistry,
    slots: &'a mut SlotStore,
    heap: &'a mut Heap,
    config: &'a TrackerConfig,
}

impl<'a> DestructionScheduler<'a> {
    pub fn new(
        registry: &'a TypeRegistry,
        slots: &'a mut SlotStore,
        heap: &'a mut Heap,
        config: &'a TrackerConfig,
    ) -> Self {
        Self {
            registry,
            slots,
            heap,
            config,
        }
    }

    /// Destroy the slots of an exiting scope, in reverse declaration order
    ///
    /// Moved and already destroyed slots are skipped. A failing destructor
    /// does not stop the remaining slots from being destroyed; the first
    /// failure is reported once every slot has been processed. `events`
    /// receives every destruction that happened, failures included.
    pub fn on_scope_exit(
        &mut self,
        slots_in_scope: &[SlotId],
        events: &mut Vec<DestroyEvent>,
    ) -> LifeResult<()> {
        let mut first_err: Option<LifeError> = None;
        for id in slots_in_scope.iter().rev() {
            if let Err(e) = self.destroy_slot(*id, events) {
                warn!("destruction of slot {} failed: {}", id, e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Destroy one slot; a no-op for moved or already destroyed slots
    ///
    /// The slot ends `Destroyed` even when a destructor fails.
    pub fn destroy_slot(&mut self, id: SlotId, events: &mut Vec<DestroyEvent>) -> LifeResult<()> {
        let slot = self.slots.get_mut(id)?;
        let state = std::mem::replace(&mut slot.state, SlotState::Destroyed);
        let path = slot.name.clone();
        let ty = slot.ty.clone();
        match state {
            SlotState::Moved => {
                // a moved-from value never reaches its destructor
                slot.state = SlotState::Moved;
                trace!("skip moved slot {}", path);
                Ok(())
            }
            SlotState::Destroyed | SlotState::Uninitialized => Ok(()),
            SlotState::Live => {
                let value = std::mem::take(&mut slot.value);
                debug!("destroy slot {} ({})", path, ty);
                self.destroy_value(&path, &ty, &value, events)
            }
            SlotState::PartiallyInitialized(init) => {
                // never fully constructed: no destructor, only the fields that hold values
                let value = std::mem::take(&mut slot.value);
                debug!("destroy partially initialized slot {} ({})", path, ty);
                let registry = self.registry;
                let info = registry.get(&ty)?;
                let mut first_err = None;
                for (fid, field) in info.desc.fields.iter().enumerate().rev() {
                    if !init.contains(&fid) {
                        continue;
                    }
                    let child = value.field(&field.name).cloned().unwrap_or_default();
                    if let Err(e) = self.destroy_value(&path.join_field(&field.name), &field.ty, &child, events) {
                        first_err.get_or_insert(e);
                    }
                }
                first_err.map_or(Ok(()), Err)
            }
        }
    }

    /// Destroy a value of type `ty` living at `path`
    ///
    /// Every part of the value is destroyed even when one of them fails;
    /// the first failure is returned afterwards.
    pub fn destroy_value(
        &mut self,
        path: &LifeStr,
        ty: &str,
        value: &Value,
        events: &mut Vec<DestroyEvent>,
    ) -> LifeResult<()> {
        let registry = self.registry;
        let info = registry.get(ty)?;
        let mut first_err: Option<LifeError> = None;
        let kind = match &info.destroy {
            DestroyPlan::Trivial => DestroyKind::Trivial,
            DestroyPlan::FieldWise => {
                for field in info.desc.fields.iter().rev() {
                    let child = value.field(&field.name).cloned().unwrap_or_default();
                    if let Err(e) = self.destroy_value(&path.join_field(&field.name), &field.ty, &child, events) {
                        first_err.get_or_insert(e);
                    }
                }
                DestroyKind::FieldWise
            }
            DestroyPlan::Explicit { body, unmanaged } => {
                if let (Some(body), Some(rec)) = (body, value.as_record()) {
                    trace!("run destructor of {} on {}", ty, path);
                    if let Err(e) = body(self.heap, rec) {
                        warn!("destructor of {} failed on {}: {}", ty, path, e);
                        first_err = Some(e.into());
                    }
                }
                self.push(events, path, ty, DestroyKind::Explicit);
                for field in info.desc.fields.iter().rev() {
                    if unmanaged.iter().any(|u| u == &field.name) {
                        continue;
                    }
                    let child = value.field(&field.name).cloned().unwrap_or_default();
                    if let Err(e) = self.destroy_value(&path.join_field(&field.name), &field.ty, &child, events) {
                        first_err.get_or_insert(e);
                    }
                }
                return first_err.map_or(Ok(()), Err);
            }
        };
        self.push(events, path, ty, kind);
        first_err.map_or(Ok(()), Err)
    }

    fn push(&self, events: &mut Vec<DestroyEvent>, path: &LifeStr, ty: &str, kind: DestroyKind) {
        trace!("destroyed {} ({}, {})", path, ty, kind);
        if self.config.record_events {
            events.push(DestroyEvent {
                path: path.clone(),
                ty: ty.into(),
                kind,
            });
        }
    }
}
