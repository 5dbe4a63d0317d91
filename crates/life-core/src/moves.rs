//! Consuming and taking moves
//!
//! Both moves transfer the source's field values to an uninitialized
//! destination without copying them. They differ in what remains:
//!
//! - a consuming move ends the source: it becomes `Moved`, every later access
//!   is a use-after-move and its destructor never runs
//! - a taking move leaves the source live, holding a null state supplied by
//!   the caller; its destructor still runs at scope exit, so the type's
//!   destructor has to tolerate the null state

use crate::config::TrackerConfig;
use crate::error::{LifeResult, StateError};
use crate::registry::TypeRegistry;
use crate::resolver::{LifecycleResolver, OpRequest};
use crate::slot::{SlotId, SlotStore, ValueSlot};
use life_val::{SlotState, Value};
use log::debug;

pub struct MoveTracker<'a> {
    registry: &'a TypeRegistry,
    slots: &'a mut SlotStore,
    config: &'a TrackerConfig,
}

impl<'a> MoveTracker<'a> {
    pub fn new(
        registry: &'a TypeRegistry,
        slots: &'a mut SlotStore,
        config: &'a TrackerConfig,
    ) -> Self {
        Self {
            registry,
            slots,
            config,
        }
    }

    /// Move `source` into `dest`, ending the source's lifetime
    ///
    /// `last_use` is the host's verdict that `source` is not used again on
    /// any control-flow path.
    pub fn apply_consuming_move(
        &mut self,
        source: SlotId,
        dest: SlotId,
        last_use: bool,
    ) -> LifeResult<()> {
        let ty = self.slots.get(source)?.ty.clone();
        LifecycleResolver::new(self.registry, self.slots).resolve(
            &ty,
            &OpRequest::ConsumingMove { source, last_use },
        )?;
        check_destination(self.slots.get(dest)?, &ty)?;

        let (src, dst) = self.slots.pair_mut(source, dest)?;
        dst.value = std::mem::take(&mut src.value);
        dst.state = SlotState::Live;
        src.state = SlotState::Moved;
        debug!("consuming move {} -> {} ({})", src.name, dst.name, ty);
        Ok(())
    }

    /// Move `source` into `dest`, leaving `null_state()` behind in `source`
    ///
    /// # Errors
    /// - `ImmutableSource` when the source binding cannot be overwritten
    /// - `NotMovable` when the type declares no taking move
    /// - `TypeMismatch` when the null state is not a value of the source type
    /// - `AliasedResource` when the null state still refers to the moved
    ///   resources or to a resource owned by another slot
    pub fn apply_taking_move<F>(&mut self, source: SlotId, dest: SlotId, null_state: F) -> LifeResult<()>
    where
        F: FnOnce() -> Value,
    {
        let src = self.slots.get(source)?;
        let ty = src.ty.clone();
        LifecycleResolver::new(self.registry, self.slots)
            .resolve(&ty, &OpRequest::TakingMove { source })?;
        if !src.is_writable() {
            return Err(StateError::ImmutableSource {
                slot: src.name.to_string(),
                span: src.span,
            }
            .into());
        }
        check_destination(self.slots.get(dest)?, &ty)?;

        let null = null_state();
        if null.type_name() != ty {
            return Err(StateError::TypeMismatch {
                expected: ty.to_string(),
                found: null.type_name().to_string(),
                span: src.span,
            }
            .into());
        }

        if self.config.check_aliasing {
            // the null state must not reach into any other live value
            self.slots.check_aliases(source, &null)?;
        }

        let (src, dst) = self.slots.pair_mut(source, dest)?;
        if self.config.check_aliasing {
            let moved = src.value.resources();
            if let Some(res) = null.resources().into_iter().find(|r| moved.contains(r)) {
                return Err(StateError::AliasedResource {
                    slot: src.name.to_string(),
                    other: dst.name.to_string(),
                    resource: res.to_string(),
                    span: src.span,
                }
                .into());
            }
        }
        dst.value = std::mem::replace(&mut src.value, null);
        dst.state = SlotState::Live;
        debug!("taking move {} -> {} ({}), source left null", src.name, dst.name, ty);
        Ok(())
    }
}

/// A move or copy can only land in an uninitialized slot of the same type
pub(crate) fn check_destination(dst: &ValueSlot, ty: &str) -> LifeResult<()> {
    if dst.ty != ty {
        return Err(StateError::TypeMismatch {
            expected: dst.ty.to_string(),
            found: ty.to_string(),
            span: dst.span,
        }
        .into());
    }
    if !matches!(dst.state, SlotState::Uninitialized) {
        return Err(StateError::DestinationOccupied {
            slot: dst.name.to_string(),
            state: dst.state.to_string(),
            span: dst.span,
        }
        .into());
    }
    Ok(())
}
