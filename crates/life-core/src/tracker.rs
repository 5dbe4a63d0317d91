//! Host-facing lifecycle tracker
//!
//! [`LifecycleTracker`] owns everything a host interpreter needs to follow
//! values through their lifecycle: the type registry, every slot ever
//! declared, the simulated heap and the stack of open scopes. Each method
//! is one lifecycle event reported by the host; the tracker checks it
//! against the current slot states and either applies it or returns the
//! diagnostic that rejects it. A rejected operation leaves every slot as it
//! was.

use crate::config::TrackerConfig;
use crate::error::{LifeError, LifeResult, ResolveError, StateError};
use crate::moves::{check_destination, MoveTracker};
use crate::registry::{TypeInfo, TypeRegistry};
use crate::resolver::{LifecycleOp, LifecycleResolver, OpRequest};
use crate::scheduler::{DestroyEvent, DestructionScheduler};
use crate::slot::{SlotDecl, SlotId, SlotStore, ValueSlot};
use crate::synth::{self, CopyPlan};
use life_val::{Heap, PathExt, Record, SlotState, TypeDescriptor, Value};
use log::{debug, trace, warn};
use std::collections::BTreeSet;

/// Snapshot of every slot's state and value, used to model branches
///
/// The heap is not part of a checkpoint: allocations made on one branch
/// stay allocated after restoring.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    slots: Vec<(SlotState, Value)>,
}

impl Checkpoint {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

pub struct LifecycleTracker {
    registry: TypeRegistry,
    slots: SlotStore,
    heap: Heap,
    /// Open scopes, outermost first; the root scope is always present
    scopes: Vec<Vec<SlotId>>,
    config: TrackerConfig,
    events: Vec<DestroyEvent>,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    pub fn with_config(config: TrackerConfig) -> Self {
        Self {
            registry: TypeRegistry::with_depth_limit(config.max_depth),
            slots: SlotStore::new(),
            heap: Heap::new(),
            scopes: vec![Vec::new()],
            config,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn register_type(&mut self, desc: TypeDescriptor) -> LifeResult<&TypeInfo> {
        self.registry.register_type(desc)
    }

    /// Ask which lifecycle operation `request` resolves to, without applying it
    pub fn resolve(&self, ty: &str, request: &OpRequest) -> LifeResult<LifecycleOp> {
        LifecycleResolver::new(&self.registry, &self.slots).resolve(ty, request)
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Destruction events recorded so far, in the order they happened
    pub fn events(&self) -> &[DestroyEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<DestroyEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn slot(&self, id: SlotId) -> LifeResult<&ValueSlot> {
        self.slots.get(id)
    }

    pub fn slots(&self) -> &SlotStore {
        &self.slots
    }

    /// Most recently declared slot named `name`
    pub fn find(&self, name: &str) -> Option<SlotId> {
        self.slots.find(name)
    }

    /// Number of open scopes, the root scope included
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    // ------------------------------------------------------------------
    // Declaration and construction
    // ------------------------------------------------------------------

    /// Declare an uninitialized slot in the innermost scope
    pub fn declare(&mut self, decl: SlotDecl) -> LifeResult<SlotId> {
        let empty = self.registry.get(&decl.ty)?.empty_value();
        let name = decl.name.clone();
        let id = self.slots.declare(decl, empty);
        match self.scopes.last_mut() {
            Some(scope) => scope.push(id),
            None => return Err(StateError::NoOpenScope.into()),
        }
        trace!("declare {} as {}", name, id);
        Ok(id)
    }

    /// Run a constructor of the slot's type on an uninitialized slot
    ///
    /// The overload is selected from the argument types. A constructor
    /// without a body assigns its arguments to the leading fields and gives
    /// every remaining field its null state. A constructor body may leave
    /// fields unset; the slot then stays partially initialized until the
    /// host assigns them.
    pub fn construct(&mut self, id: SlotId, args: Vec<Value>) -> LifeResult<()> {
        let slot = self.slots.get(id)?;
        let info = self.registry.get(&slot.ty)?;
        check_destination(slot, &slot.ty)?;
        let ctor = LifecycleResolver::new(&self.registry, &self.slots).select_constructor(
            info,
            &args,
            slot.span,
        )?;
        let ctor = &info.desc.methods.constructors[ctor];

        if info.builtin {
            let value = match args.into_iter().next() {
                Some(value) => value,
                None => synth::null_state(&self.registry, info.name())?,
            };
            self.check_aliases(id, &value)?;
            let slot = self.slots.get_mut(id)?;
            debug!("construct {} = {}", slot.name, value);
            slot.value = value;
            slot.state = SlotState::Live;
            return Ok(());
        }

        let fields = match ctor.body {
            Some(body) => body(&mut self.heap, &args)?,
            None => {
                let mut fields = life_val::Fields::new();
                let mut args = args.into_iter();
                for field in &info.desc.fields {
                    let value = match args.next() {
                        Some(arg) => arg,
                        None => synth::null_state(&self.registry, &field.ty)?,
                    };
                    fields.insert(field.name.clone(), value);
                }
                fields
            }
        };

        let mut rec = match slot.value.as_record() {
            Some(rec) => rec.clone(),
            None => Record::new(info.name().clone()),
        };
        let mut init = BTreeSet::new();
        for (name, value) in fields {
            let Some(fid) = info.desc.field_id(&name) else {
                return Err(StateError::UnknownField {
                    ty: info.name().to_string(),
                    field: name.to_string(),
                }
                .into());
            };
            let decl = &info.desc.fields[fid];
            check_value(&self.registry, &decl.ty, &value, slot.span)?;
            rec.set(name, value);
            init.insert(fid);
        }
        let value = Value::Record(rec);
        self.check_aliases(id, &value)?;

        let state = SlotState::from_initialized(init, info.field_count());
        let slot = self.slots.get_mut(id)?;
        if !state.is_live() && info.field_count() > 0 {
            warn!(
                "constructor {}{} left '{}' {}",
                info.name(),
                ctor.signature(),
                slot.name,
                state
            );
        }
        debug!("construct {} = {}", slot.name, value);
        slot.value = value;
        // a zero-field record is complete as soon as it is constructed
        slot.state = if info.field_count() == 0 {
            SlotState::Live
        } else {
            state
        };
        Ok(())
    }

    /// Assign one field of a slot
    ///
    /// On a slot under construction this initializes the field, in any order;
    /// the slot becomes live once every field is initialized. On a live slot
    /// it is a mutation, see [`write_field`](Self::write_field).
    pub fn assign_field(&mut self, id: SlotId, field: &str, value: Value) -> LifeResult<()> {
        let slot = self.slots.get(id)?;
        if slot.state.is_live() {
            return self.write_field(id, field, value);
        }
        let info = self.registry.get(&slot.ty)?;
        ensure_not_ended(slot)?;
        require_init(info, slot.span)?;
        let fid = field_id(info, field)?;
        let decl = &info.desc.fields[fid];
        check_value(&self.registry, &decl.ty, &value, slot.span)?;

        let mut candidate = slot.value.clone();
        let previous = if slot.state.is_field_init(fid) {
            candidate.field(field).cloned()
        } else {
            None
        };
        if let Some(rec) = candidate.as_record_mut() {
            rec.set(decl.name.clone(), value);
        }
        self.check_aliases(id, &candidate)?;

        let path = slot.name.join_field(field);
        let field_ty = decl.ty.clone();
        let total = info.field_count();
        let slot = self.slots.get_mut(id)?;
        let state = slot.state.with_field(fid, total).ok_or_else(|| ended(slot))?;
        slot.value = candidate;
        slot.state = state;
        trace!("init {} ({})", path, slot.state);
        match previous {
            // re-assigning a field during construction ends its old value
            Some(old) => self
                .record(|s, events| s.destroy_value(&path, &field_ty, &old, events))
                .map(|_| ()),
            None => Ok(()),
        }
    }

    /// Overwrite one field of a live slot
    ///
    /// The binding must be writable. The old field value is destroyed before
    /// the new one is stored.
    pub fn write_field(&mut self, id: SlotId, field: &str, value: Value) -> LifeResult<()> {
        let slot = self.slots.get(id)?;
        let info = self.registry.get(&slot.ty)?;
        slot.check_readable(info)?;
        if !slot.is_writable() {
            return Err(StateError::ImmutableAssignment {
                slot: slot.name.to_string(),
                span: slot.span,
            }
            .into());
        }
        let fid = field_id(info, field)?;
        let decl = &info.desc.fields[fid];
        check_value(&self.registry, &decl.ty, &value, slot.span)?;

        let mut candidate = slot.value.clone();
        let old = candidate.field(field).cloned().unwrap_or_default();
        if let Some(rec) = candidate.as_record_mut() {
            rec.set(decl.name.clone(), value);
        }
        self.check_aliases(id, &candidate)?;

        let path = slot.name.join_field(field);
        let field_ty = decl.ty.clone();
        let slot = self.slots.get_mut(id)?;
        slot.value = candidate;
        debug!("write {}", path);
        self.record(|s, events| s.destroy_value(&path, &field_ty, &old, events))
            .map(|_| ())
    }

    /// Assign a whole value to a slot
    ///
    /// An uninitialized slot is initialized; a slot under construction has
    /// its initialized fields destroyed first; a live slot must be writable
    /// and has its old value destroyed first. The value must carry exactly
    /// the declared fields, each of its declared type. A failing destructor
    /// of the old value is reported after the new value has been stored.
    pub fn assign(&mut self, id: SlotId, value: Value) -> LifeResult<()> {
        let slot = self.slots.get(id)?;
        ensure_not_ended(slot)?;
        if slot.state.is_live() && !slot.is_writable() {
            return Err(StateError::ImmutableAssignment {
                slot: slot.name.to_string(),
                span: slot.span,
            }
            .into());
        }
        let info = self.registry.get(&slot.ty)?;
        if !slot.state.is_live() {
            require_init(info, slot.span)?;
        }
        check_value(&self.registry, &slot.ty, &value, slot.span)?;
        self.check_aliases(id, &value)?;

        let destroyed = if matches!(slot.state, SlotState::Uninitialized) {
            Ok(())
        } else {
            self.record(|s, events| s.destroy_slot(id, events)).map(|_| ())
        };
        let slot = self.slots.get_mut(id)?;
        debug!("assign {} = {}", slot.name, value);
        slot.value = value;
        slot.state = SlotState::Live;
        destroyed
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn read(&self, id: SlotId) -> LifeResult<&Value> {
        let slot = self.slots.get(id)?;
        slot.check_readable(self.registry.get(&slot.ty)?)?;
        Ok(&slot.value)
    }

    /// Read one field
    ///
    /// A field of a slot still under construction may be read once it is
    /// initialized, unless `allow_partial_field_reads` is off.
    pub fn read_field(&self, id: SlotId, field: &str) -> LifeResult<&Value> {
        let slot = self.slots.get(id)?;
        let info = self.registry.get(&slot.ty)?;
        let fid = field_id(info, field)?;
        let partial_ok = self.config.allow_partial_field_reads
            && matches!(slot.state, SlotState::PartiallyInitialized(_))
            && slot.state.is_field_init(fid);
        if !partial_ok {
            slot.check_readable(info)?;
        }
        slot.value.field(field).ok_or_else(|| {
            StateError::UnknownField {
                ty: info.name().to_string(),
                field: field.to_string(),
            }
            .into()
        })
    }

    // ------------------------------------------------------------------
    // Copy and moves
    // ------------------------------------------------------------------

    /// Copy `src` into the uninitialized slot `dst`
    ///
    /// Copies are deep: each field is copied with its own type's copy plan,
    /// and explicit copy bodies run against the heap.
    pub fn copy(&mut self, src: SlotId, dst: SlotId) -> LifeResult<()> {
        let ty = self.slots.get(src)?.ty.clone();
        self.resolve(&ty, &OpRequest::Copy { source: src })?;
        check_destination(self.slots.get(dst)?, &ty)?;

        let source = self.slots.get(src)?.value.clone();
        let value = copy_value(&self.registry, &mut self.heap, &ty, &source)?;
        self.check_aliases(dst, &value)?;
        let from = self.slots.get(src)?.name.clone();
        let slot = self.slots.get_mut(dst)?;
        debug!("copy {} -> {} ({})", from, slot.name, ty);
        slot.value = value;
        slot.state = SlotState::Live;
        Ok(())
    }

    pub fn consume(&mut self, src: SlotId, dst: SlotId, last_use: bool) -> LifeResult<()> {
        MoveTracker::new(&self.registry, &mut self.slots, &self.config)
            .apply_consuming_move(src, dst, last_use)
    }

    pub fn take<F>(&mut self, src: SlotId, dst: SlotId, null_state: F) -> LifeResult<()>
    where
        F: FnOnce() -> Value,
    {
        MoveTracker::new(&self.registry, &mut self.slots, &self.config)
            .apply_taking_move(src, dst, null_state)
    }

    /// Taking move that leaves the type's default null state behind
    pub fn take_default(&mut self, src: SlotId, dst: SlotId) -> LifeResult<()> {
        let ty = self.slots.get(src)?.ty.clone();
        let null = synth::null_state(&self.registry, &ty)?;
        self.take(src, dst, move || null)
    }

    // ------------------------------------------------------------------
    // Scopes and destruction
    // ------------------------------------------------------------------

    pub fn enter_scope(&mut self) {
        self.scopes.push(Vec::new());
        trace!("enter scope {}", self.scopes.len());
    }

    /// Close the innermost scope, destroying its slots
    ///
    /// The root scope is only closed by [`unwind`](Self::unwind).
    pub fn exit_scope(&mut self) -> LifeResult<Vec<DestroyEvent>> {
        if self.scopes.len() <= 1 {
            return Err(StateError::NoOpenScope.into());
        }
        let scope = self.scopes.pop().unwrap_or_default();
        trace!("exit scope {}", self.scopes.len() + 1);
        self.on_scope_exit(&scope)
    }

    /// Destroy the given slots, last declared first
    ///
    /// Every slot is destroyed even when a destructor fails. The events of
    /// the pass are kept on the tracker either way; the first failure is
    /// returned.
    pub fn on_scope_exit(&mut self, slots_in_scope: &[SlotId]) -> LifeResult<Vec<DestroyEvent>> {
        self.record(|s, events| s.on_scope_exit(slots_in_scope, events))
    }

    pub fn destroy_slot(&mut self, id: SlotId) -> LifeResult<Vec<DestroyEvent>> {
        self.record(|s, events| s.destroy_slot(id, events))
    }

    /// Destroy every slot of every open scope, innermost scope first
    ///
    /// Used when an error aborts the host program. Destruction keeps going
    /// after a failure; the first failure is returned at the end. Afterwards
    /// only an empty root scope remains.
    pub fn unwind(&mut self) -> LifeResult<Vec<DestroyEvent>> {
        let scopes = std::mem::replace(&mut self.scopes, vec![Vec::new()]);
        debug!("unwind {} scope(s)", scopes.len());
        let mut events = Vec::new();
        let mut first_err: Option<LifeError> = None;
        for scope in scopes.iter().rev() {
            match self.on_scope_exit(scope) {
                Ok(mut evs) => events.append(&mut evs),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(events),
        }
    }

    fn scheduler(&mut self) -> DestructionScheduler<'_> {
        DestructionScheduler::new(&self.registry, &mut self.slots, &mut self.heap, &self.config)
    }

    /// Run one destruction pass and keep its events, also when it fails
    fn record<F>(&mut self, pass: F) -> LifeResult<Vec<DestroyEvent>>
    where
        F: FnOnce(&mut DestructionScheduler<'_>, &mut Vec<DestroyEvent>) -> LifeResult<()>,
    {
        let mut events = Vec::new();
        let result = pass(&mut self.scheduler(), &mut events);
        self.events.extend(events.iter().cloned());
        result.map(|()| events)
    }

    // ------------------------------------------------------------------
    // Branches
    // ------------------------------------------------------------------

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            slots: self
                .slots
                .iter()
                .map(|s| (s.state.clone(), s.value.clone()))
                .collect(),
        }
    }

    /// Put every slot that existed at `checkpoint` back into its saved state
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> LifeResult<()> {
        for (i, (state, value)) in checkpoint.slots.iter().enumerate() {
            let slot = self.slots.get_mut(SlotId(i as u32))?;
            slot.state = state.clone();
            slot.value = value.clone();
        }
        Ok(())
    }

    /// Merge the current branch with the branch saved in `other`
    ///
    /// A field stays initialized only when both branches initialized it.
    /// Values the current branch initialized but the other did not are
    /// destroyed at the join. A slot moved on one branch only is rejected
    /// with `ConditionalMove` and nothing is changed.
    pub fn join(&mut self, other: &Checkpoint) -> LifeResult<()> {
        let mut merged = Vec::with_capacity(other.len());
        for (i, (state, _)) in other.slots.iter().enumerate() {
            let slot = self.slots.get(SlotId(i as u32))?;
            let info = self.registry.get(&slot.ty)?;
            let total = info.field_count().max(1);
            match slot.state.join(state, total) {
                Some(joined) => merged.push(joined),
                None => {
                    return Err(StateError::ConditionalMove {
                        slot: slot.name.to_string(),
                    }
                    .into())
                }
            }
        }

        let mut dropped = Vec::new();
        for (i, joined) in merged.into_iter().enumerate() {
            let slot = self.slots.get_mut(SlotId(i as u32))?;
            if slot.state == joined {
                continue;
            }
            let info = self.registry.get(&slot.ty)?;
            if let Some(rec) = slot.value.as_record_mut() {
                for (fid, field) in info.desc.fields.iter().enumerate() {
                    if slot.state.is_field_init(fid) && !joined.is_field_init(fid) {
                        let old = rec.get(&field.name).cloned().unwrap_or_default();
                        rec.set(field.name.clone(), Value::Nil);
                        dropped.push((slot.name.join_field(&field.name), field.ty.clone(), old));
                    }
                }
            } else if slot.state.is_live() && !joined.is_live() {
                dropped.push((slot.name.clone(), slot.ty.clone(), std::mem::take(&mut slot.value)));
            }
            trace!("join {}: {} -> {}", slot.name, slot.state, joined);
            slot.state = joined;
        }

        self.record(|s, events| {
            let mut first_err = None;
            for (path, ty, value) in &dropped {
                if let Err(e) = s.destroy_value(path, ty, value, events) {
                    first_err.get_or_insert(e);
                }
            }
            first_err.map_or(Ok(()), Err)
        })
        .map(|_| ())
    }

    // ------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------

    fn check_aliases(&self, id: SlotId, value: &Value) -> LifeResult<()> {
        if !self.config.check_aliasing {
            return Ok(());
        }
        self.slots.check_aliases(id, value)
    }

    /// Resources still allocated on the heap
    pub fn leaked(&self) -> usize {
        self.heap.live_count()
    }
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn field_id(info: &TypeInfo, field: &str) -> LifeResult<usize> {
    info.desc.field_id(field).ok_or_else(|| {
        StateError::UnknownField {
            ty: info.name().to_string(),
            field: field.to_string(),
        }
        .into()
    })
}

fn check_type(expected: &str, value: &Value, span: Option<miette::SourceSpan>) -> LifeResult<()> {
    let found = value.type_name();
    if found != expected {
        return Err(StateError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
            span,
        }
        .into());
    }
    Ok(())
}

/// Initializing a value, whole or field by field, is running a constructor
fn require_init(info: &TypeInfo, span: Option<miette::SourceSpan>) -> LifeResult<()> {
    if info.flags().has_init {
        return Ok(());
    }
    Err(ResolveError::NoConstructor {
        ty: info.name().to_string(),
        args: "(field assignment)".to_string(),
        candidates: "none; the type has no lifecycle and cannot produce instances".to_string(),
        span,
    }
    .into())
}

/// Moved and destroyed slots accept no further writes
fn ensure_not_ended(slot: &ValueSlot) -> LifeResult<()> {
    match slot.state {
        SlotState::Moved | SlotState::Destroyed => Err(ended(slot)),
        _ => Ok(()),
    }
}

/// The error for touching a slot whose lifetime is over
fn ended(slot: &ValueSlot) -> LifeError {
    match slot.state {
        SlotState::Moved => StateError::UseAfterMove {
            slot: slot.name.to_string(),
            span: slot.span,
        }
        .into(),
        _ => StateError::UninitializedUse {
            slot: slot.name.to_string(),
            state: slot.state.to_string(),
            span: slot.span,
        }
        .into(),
    }
}

/// Check that `value` is a complete value of type `ty`
///
/// A record must carry exactly the declared fields, each holding a complete
/// value of its declared type.
fn check_value(
    registry: &TypeRegistry,
    ty: &str,
    value: &Value,
    span: Option<miette::SourceSpan>,
) -> LifeResult<()> {
    check_type(ty, value, span)?;
    let Value::Record(rec) = value else {
        return Ok(());
    };
    let info = registry.get(ty)?;
    if let Some(extra) = rec.fields.keys().find(|name| info.desc.field_id(name).is_none()) {
        return Err(StateError::UnknownField {
            ty: ty.to_string(),
            field: extra.to_string(),
        }
        .into());
    }
    for field in &info.desc.fields {
        let Some(child) = rec.get(&field.name) else {
            return Err(StateError::MissingField {
                ty: ty.to_string(),
                field: field.name.to_string(),
                span,
            }
            .into());
        };
        check_value(registry, &field.ty, child, span)?;
    }
    Ok(())
}

/// Produce a copy of `value` following the copy plan of `ty`, field by field
fn copy_value(registry: &TypeRegistry, heap: &mut Heap, ty: &str, value: &Value) -> LifeResult<Value> {
    let info = registry.get(ty)?;
    let plan = match &info.copy {
        Ok(plan) => plan,
        Err(reason) => {
            return Err(ResolveError::NotCopyable {
                ty: ty.to_string(),
                reason: reason.clone(),
                span: None,
            }
            .into())
        }
    };
    match (plan, value) {
        (CopyPlan::Bitwise, _) => Ok(value.clone()),
        (CopyPlan::Explicit(Some(body)), Value::Record(rec)) => {
            trace!("run copy of {}", ty);
            let copied = Value::Record(body(heap, rec)?);
            check_value(registry, ty, &copied, None)?;
            Ok(copied)
        }
        (CopyPlan::Synthesized | CopyPlan::Explicit(_), Value::Record(rec)) => {
            let mut out = Record::new(rec.ty.clone());
            for field in &info.desc.fields {
                let child = rec.get(&field.name).cloned().unwrap_or_default();
                out.set(field.name.clone(), copy_value(registry, heap, &field.ty, &child)?);
            }
            Ok(Value::Record(out))
        }
        _ => Ok(value.clone()),
    }
}
