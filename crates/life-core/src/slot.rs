//! Storage slots and their ownership state

use crate::error::{LifeError, LifeResult, StateError};
use crate::registry::TypeInfo;
use life_val::{BindingMode, LifeStr, ResourceId, SlotState, Value};
use miette::SourceSpan;
use std::fmt;

/// Identity of a slot, stable for the lifetime of the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declaration of a new slot, as seen by the host front end
#[derive(Debug, Clone)]
pub struct SlotDecl {
    pub name: LifeStr,
    pub ty: LifeStr,
    pub mutable: bool,
    pub binding: BindingMode,
    pub span: Option<SourceSpan>,
}

impl SlotDecl {
    pub fn new(name: impl Into<LifeStr>, ty: impl Into<LifeStr>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            mutable: false,
            binding: BindingMode::Owned,
            span: None,
        }
    }

    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    pub fn binding(mut self, binding: BindingMode) -> Self {
        self.binding = binding;
        self
    }

    pub fn span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }
}

/// One storage location (variable or field) and what it currently holds
#[derive(Debug, Clone)]
pub struct ValueSlot {
    pub id: SlotId,
    pub name: LifeStr,
    pub ty: LifeStr,
    pub mutable: bool,
    pub binding: BindingMode,
    pub state: SlotState,
    pub value: Value,
    pub span: Option<SourceSpan>,
}

impl ValueSlot {
    /// Whether the binding may be overwritten once initialized
    pub fn is_writable(&self) -> bool {
        match self.binding {
            BindingMode::Owned => self.mutable,
            BindingMode::MutBorrowed => true,
            BindingMode::Borrowed => false,
        }
    }

    /// Whether the slot currently owns (part of) a value
    pub fn holds_values(&self) -> bool {
        matches!(self.state, SlotState::Live | SlotState::PartiallyInitialized(_))
    }

    /// Check that the whole value may be read
    pub fn check_readable(&self, info: &TypeInfo) -> LifeResult<()> {
        match &self.state {
            SlotState::Live => Ok(()),
            SlotState::Moved => Err(StateError::UseAfterMove {
                slot: self.name.to_string(),
                span: self.span,
            }
            .into()),
            SlotState::PartiallyInitialized(_) => Err(StateError::PartiallyInitializedUse {
                slot: self.name.to_string(),
                missing: self.missing_fields(info),
                span: self.span,
            }
            .into()),
            state @ (SlotState::Uninitialized | SlotState::Destroyed) => {
                Err(StateError::UninitializedUse {
                    slot: self.name.to_string(),
                    state: state.to_string(),
                    span: self.span,
                }
                .into())
            }
        }
    }

    /// Comma separated names of the fields not initialized yet
    pub fn missing_fields(&self, info: &TypeInfo) -> String {
        info.desc
            .fields
            .iter()
            .enumerate()
            .filter(|(id, _)| !self.state.is_field_init(*id))
            .map(|(_, f)| format!("'{}'", f.name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Arena of every slot ever declared
#[derive(Debug, Default)]
pub struct SlotStore {
    slots: Vec<ValueSlot>,
}

impl SlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an uninitialized slot
    ///
    /// `empty` is the storage layout for the slot's type: a record with
    /// every declared field present (and unset), or `nil` for builtins.
    pub fn declare(&mut self, decl: SlotDecl, empty: Value) -> SlotId {
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(ValueSlot {
            id,
            name: decl.name,
            ty: decl.ty,
            mutable: decl.mutable,
            binding: decl.binding,
            state: SlotState::Uninitialized,
            value: empty,
            span: decl.span,
        });
        id
    }

    pub fn get(&self, id: SlotId) -> LifeResult<&ValueSlot> {
        self.slots
            .get(id.0 as usize)
            .ok_or_else(|| StateError::UnknownSlot { id: id.0 }.into())
    }

    pub fn get_mut(&mut self, id: SlotId) -> LifeResult<&mut ValueSlot> {
        self.slots
            .get_mut(id.0 as usize)
            .ok_or_else(|| StateError::UnknownSlot { id: id.0 }.into())
    }

    /// Mutable access to two distinct slots at once
    pub fn pair_mut(
        &mut self,
        a: SlotId,
        b: SlotId,
    ) -> LifeResult<(&mut ValueSlot, &mut ValueSlot)> {
        self.get(a)?;
        self.get(b)?;
        let (a, b) = (a.0 as usize, b.0 as usize);
        if a == b {
            return Err(StateError::SameSlot {
                slot: self.slots[a].name.to_string(),
            }
            .into());
        }
        if a < b {
            let (lo, hi) = self.slots.split_at_mut(b);
            Ok((&mut lo[a], &mut hi[0]))
        } else {
            let (lo, hi) = self.slots.split_at_mut(a);
            Ok((&mut hi[0], &mut lo[b]))
        }
    }

    /// Reject `value` entering slot `id` when it holds one resource twice or
    /// shares a resource with another slot that holds values
    pub fn check_aliases(&self, id: SlotId, value: &Value) -> LifeResult<()> {
        let resources = value.resources();
        if resources.is_empty() {
            return Ok(());
        }
        let slot = self.get(id)?;
        let aliased = |other: &LifeStr, res: &ResourceId| -> LifeError {
            StateError::AliasedResource {
                slot: slot.name.to_string(),
                other: other.to_string(),
                resource: res.to_string(),
                span: slot.span,
            }
            .into()
        };
        for (i, res) in resources.iter().enumerate() {
            if resources[..i].contains(res) {
                return Err(aliased(&slot.name, res));
            }
        }
        for other in self.slots.iter() {
            if other.id == id || !other.holds_values() {
                continue;
            }
            let theirs = other.value.resources();
            if let Some(res) = resources.iter().find(|r| theirs.contains(r)) {
                return Err(aliased(&other.name, res));
            }
        }
        Ok(())
    }

    /// Most recently declared slot with the given name
    pub fn find(&self, name: &str) -> Option<SlotId> {
        self.slots.iter().rev().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValueSlot> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_and_lookup() {
        let mut store = SlotStore::new();
        let a = store.declare(SlotDecl::new("a", "Int"), Value::Nil);
        let b = store.declare(SlotDecl::new("b", "Int").mutable(), Value::Nil);
        let shadow = store.declare(SlotDecl::new("a", "String"), Value::Nil);
        assert_eq!(store.len(), 3);
        assert_eq!(store.find("a"), Some(shadow));
        assert_eq!(store.find("b"), Some(b));
        assert!(store.get(b).unwrap().is_writable());
        assert!(!store.get(a).unwrap().is_writable());
        assert!(store.get(SlotId(9)).is_err());
    }

    #[test]
    fn test_pair_mut() {
        let mut store = SlotStore::new();
        let a = store.declare(SlotDecl::new("a", "Int"), Value::Nil);
        let b = store.declare(SlotDecl::new("b", "Int"), Value::Nil);
        let (sb, sa) = store.pair_mut(b, a).unwrap();
        assert_eq!(sb.name.as_str(), "b");
        assert_eq!(sa.name.as_str(), "a");
        assert!(matches!(
            store.pair_mut(a, a),
            Err(LifeError::State(StateError::SameSlot { .. }))
        ));
    }

    #[test]
    fn test_borrowed_binding_never_writable() {
        let mut store = SlotStore::new();
        let id = store.declare(
            SlotDecl::new("p", "Int")
                .mutable()
                .binding(BindingMode::Borrowed),
            Value::Nil,
        );
        assert!(!store.get(id).unwrap().is_writable());
    }

    #[test]
    fn test_alias_check_skips_ended_slots() {
        let mut store = SlotStore::new();
        let a = store.declare(SlotDecl::new("a", "Pointer"), Value::Nil);
        let b = store.declare(SlotDecl::new("b", "Pointer"), Value::Nil);
        let res = Value::from(ResourceId(1));
        store.get_mut(a).unwrap().value = res.clone();
        store.get_mut(a).unwrap().state = SlotState::Live;
        assert!(matches!(
            store.check_aliases(b, &res),
            Err(LifeError::State(StateError::AliasedResource { .. }))
        ));
        store.get_mut(a).unwrap().state = SlotState::Moved;
        assert!(store.check_aliases(b, &res).is_ok());
    }
}
