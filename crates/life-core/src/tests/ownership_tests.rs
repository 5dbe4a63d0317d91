//! Exclusive ownership, binding modes and move capabilities

use super::fixtures::*;
use crate::error::{LifeError, ResolveError, StateError};
use crate::slot::SlotDecl;
use crate::TrackerConfig;
use life_val::{BindingMode, ResourceId, Value};

#[test]
fn test_two_slots_cannot_own_one_resource() {
    let mut t = tracker_with(vec![]);
    let res = t.heap_mut().alloc(1);
    let p = t.declare(SlotDecl::new("p", "Pointer")).unwrap();
    t.construct(p, vec![res.into()]).unwrap();
    let q = t.declare(SlotDecl::new("q", "Pointer")).unwrap();
    match t.assign(q, res.into()) {
        Err(LifeError::State(StateError::AliasedResource { slot, other, .. })) => {
            assert_eq!(slot, "q");
            assert_eq!(other, "p");
        }
        other => panic!("expected AliasedResource, got {:?}", other),
    }
    assert!(t.slot(q).unwrap().state == life_val::SlotState::Uninitialized);
}

#[test]
fn test_aliasing_check_can_be_disabled() {
    let config = TrackerConfig {
        check_aliasing: false,
        ..Default::default()
    };
    let mut t = tracker_with_config(vec![], config);
    let res = t.heap_mut().alloc(1);
    let p = t.declare(SlotDecl::new("p", "Pointer")).unwrap();
    t.construct(p, vec![res.into()]).unwrap();
    let q = t.declare(SlotDecl::new("q", "Pointer")).unwrap();
    assert!(t.assign(q, res.into()).is_ok());
}

#[test]
fn test_one_value_holding_a_resource_twice() {
    let pair = life_val::TypeDescriptor::new("Pair")
        .field("a", "Pointer")
        .field("b", "Pointer")
        .constructor(&["Pointer", "Pointer"]);
    let mut t = tracker_with(vec![pair]);
    let res: ResourceId = t.heap_mut().alloc(1);
    let p = t.declare(SlotDecl::new("p", "Pair")).unwrap();
    assert!(matches!(
        t.construct(p, vec![res.into(), res.into()]),
        Err(LifeError::State(StateError::AliasedResource { .. }))
    ));
}

#[test]
fn test_pointer_moves_but_does_not_copy() {
    let mut t = tracker_with(vec![]);
    let res = t.heap_mut().alloc(1);
    let p = t.declare(SlotDecl::new("p", "Pointer").mutable()).unwrap();
    t.construct(p, vec![res.into()]).unwrap();
    let q = t.declare(SlotDecl::new("q", "Pointer")).unwrap();
    assert!(matches!(
        t.copy(p, q),
        Err(LifeError::Resolve(ResolveError::NotCopyable { .. }))
    ));
    t.take_default(p, q).unwrap();
    assert_eq!(t.read(p).unwrap(), &Value::NULL_PTR);
    assert_eq!(t.read(q).unwrap(), &Value::from(res));
}

#[test]
fn test_take_from_immutable_binding() {
    let mut t = tracker_with(vec![heap_array()]);
    let a = t.declare(SlotDecl::new("a", "HeapArray")).unwrap();
    t.construct(a, vec![1.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "HeapArray")).unwrap();
    assert!(matches!(
        t.take_default(a, b),
        Err(LifeError::State(StateError::ImmutableSource { .. }))
    ));
    assert!(t.read(a).is_ok());
}

#[test]
fn test_take_through_mutable_borrow() {
    let mut t = tracker_with(vec![heap_array()]);
    let a = t
        .declare(SlotDecl::new("a", "HeapArray").binding(BindingMode::MutBorrowed))
        .unwrap();
    t.construct(a, vec![1.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "HeapArray")).unwrap();
    t.take_default(a, b).unwrap();
    assert!(t.read_field(a, "data").unwrap().is_null_ptr());
}

#[test]
fn test_borrowed_alias_cannot_be_consumed() {
    let mut t = tracker_with(vec![heap_array()]);
    let a = t
        .declare(SlotDecl::new("a", "HeapArray").binding(BindingMode::Borrowed))
        .unwrap();
    t.construct(a, vec![1.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "HeapArray")).unwrap();
    assert!(matches!(
        t.consume(a, b, true),
        Err(LifeError::Resolve(ResolveError::LifetimeNotProvablyEnding { .. }))
    ));
}

#[test]
fn test_taking_move_requires_capability() {
    let mut t = tracker_with(vec![person()]);
    let a = t.declare(SlotDecl::new("a", "Person").mutable()).unwrap();
    t.construct(a, vec!["ann".into(), 31.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "Person")).unwrap();
    assert!(matches!(
        t.take_default(a, b),
        Err(LifeError::Resolve(ResolveError::NotMovable { .. }))
    ));
}

#[test]
fn test_move_into_other_type() {
    let mut t = tracker_with(vec![person(), point()]);
    let a = t.declare(SlotDecl::new("a", "Person")).unwrap();
    t.construct(a, vec!["ann".into(), 31.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "Point")).unwrap();
    assert!(matches!(
        t.consume(a, b, true),
        Err(LifeError::State(StateError::TypeMismatch { .. }))
    ));
    assert!(t.read(a).is_ok());
}

#[test]
fn test_moved_slot_rejects_writes() {
    let mut t = tracker_with(vec![person()]);
    let a = t.declare(SlotDecl::new("a", "Person").mutable()).unwrap();
    t.construct(a, vec!["ann".into(), 31.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "Person")).unwrap();
    t.consume(a, b, true).unwrap();
    assert!(matches!(
        t.assign_field(a, "age", 1.into()),
        Err(LifeError::State(StateError::UseAfterMove { .. }))
    ));
    let c = t.declare(SlotDecl::new("c", "Person")).unwrap();
    assert!(matches!(
        t.copy(a, c),
        Err(LifeError::State(StateError::UseAfterMove { .. }))
    ));
}

#[test]
fn test_null_state_cannot_alias_another_slot() {
    let mut t = tracker_with(vec![heap_array()]);
    let a = t.declare(SlotDecl::new("a", "HeapArray").mutable()).unwrap();
    t.construct(a, vec![1.into()]).unwrap();
    let c = t.declare(SlotDecl::new("c", "HeapArray")).unwrap();
    t.construct(c, vec![1.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "HeapArray")).unwrap();

    let c_value = t.read(c).unwrap().clone();
    match t.take(a, b, move || c_value) {
        Err(LifeError::State(StateError::AliasedResource { other, .. })) => assert_eq!(other, "c"),
        other => panic!("expected AliasedResource, got {:?}", other),
    }
    assert_ne!(t.read_field(a, "data").unwrap(), t.read_field(c, "data").unwrap());
    assert!(t.slot(b).unwrap().state == life_val::SlotState::Uninitialized);

    t.unwind().unwrap();
    assert_eq!(t.leaked(), 0);
}
