//! Construction, copy and move behavior of tracked values

use super::fixtures::*;
use crate::error::{LifeError, ResolveError, StateError};
use crate::resolver::{LifecycleOp, OpRequest};
use crate::scheduler::DestroyKind;
use crate::slot::SlotDecl;
use life_val::{Heap, HeapError, Record, TypeDescriptor, Value};
use pretty_assertions::assert_eq;

#[test]
fn test_type_without_constructor_has_no_instances() {
    let mut t = tracker_with(vec![TypeDescriptor::new("Opaque").field("x", "Int")]);
    let err = t
        .resolve("Opaque", &OpRequest::Init { args: vec![] })
        .unwrap_err();
    assert!(matches!(
        err,
        LifeError::Resolve(ResolveError::NoConstructor { .. })
    ));

    let o = t.declare(SlotDecl::new("o", "Opaque")).unwrap();
    assert!(t.construct(o, vec![]).is_err());
    assert!(matches!(
        t.assign_field(o, "x", 1.into()),
        Err(LifeError::Resolve(ResolveError::NoConstructor { .. }))
    ));
    assert!(t.slot(o).unwrap().state == life_val::SlotState::Uninitialized);
}

#[test]
fn test_auto_derived_copy() {
    let mut t = tracker_with(vec![point()]);
    let a = t.declare(SlotDecl::new("a", "Point")).unwrap();
    t.construct(a, vec![3.into(), 4.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "Point")).unwrap();
    t.copy(a, b).unwrap();

    assert_ne!(a, b);
    assert_eq!(t.read(a).unwrap(), t.read(b).unwrap());
    assert!(t.slot(a).unwrap().state.is_live());
    assert!(t.slot(b).unwrap().state.is_live());
}

#[test]
fn test_copy_into_occupied_slot() {
    let mut t = tracker_with(vec![point()]);
    let a = t.declare(SlotDecl::new("a", "Point")).unwrap();
    t.construct(a, vec![3.into(), 4.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "Point")).unwrap();
    t.construct(b, vec![0.into(), 0.into()]).unwrap();
    assert!(matches!(
        t.copy(a, b),
        Err(LifeError::State(StateError::DestinationOccupied { .. }))
    ));
}

#[test]
fn test_heap_array_copy_is_deep() {
    let mut t = tracker_with(vec![heap_array()]);
    let a = t.declare(SlotDecl::new("a", "HeapArray")).unwrap();
    t.construct(a, vec![2.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "HeapArray").mutable()).unwrap();
    t.copy(a, b).unwrap();

    let a_data = Heap::deref(t.read_field(a, "data").unwrap()).unwrap();
    let b_data = Heap::deref(t.read_field(b, "data").unwrap()).unwrap();
    assert_ne!(a_data, b_data);

    t.heap_mut().store(b_data, 0, Value::Int(99)).unwrap();
    assert_eq!(
        t.heap().cells(a_data).unwrap(),
        vec![Value::Int(0), Value::Int(0)]
    );
    assert_eq!(t.heap().load(b_data, 0).unwrap(), Value::Int(99));

    t.unwind().unwrap();
    assert_eq!(t.leaked(), 0);
}

#[test]
fn test_pointer_field_needs_explicit_copy() {
    let owner = TypeDescriptor::new("Owner")
        .field("data", "Pointer")
        .auto_derive();
    let mut t = tracker_with(vec![owner]);
    let a = t.declare(SlotDecl::new("a", "Owner")).unwrap();
    t.construct(a, vec![Value::NULL_PTR]).unwrap();
    let b = t.declare(SlotDecl::new("b", "Owner")).unwrap();
    match t.copy(a, b) {
        Err(LifeError::Resolve(ResolveError::NotCopyable { reason, .. })) => {
            assert!(reason.contains("'data'"), "{}", reason)
        }
        other => panic!("expected NotCopyable, got {:?}", other),
    }
}

#[test]
fn test_consuming_move_ends_source() {
    let mut t = tracker_with(vec![person()]);
    t.enter_scope();
    let a = t.declare(SlotDecl::new("a", "Person")).unwrap();
    t.construct(a, vec!["ann".into(), 31.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "Person")).unwrap();
    t.consume(a, b, true).unwrap();

    assert!(matches!(
        t.read(a),
        Err(LifeError::State(StateError::UseAfterMove { .. }))
    ));
    assert!(matches!(
        t.read_field(a, "name"),
        Err(LifeError::State(StateError::UseAfterMove { .. }))
    ));
    assert_eq!(t.read_field(b, "name").unwrap(), &Value::from("ann"));

    t.exit_scope().unwrap();
    assert_eq!(paths(&t), vec!["b.age", "b.name", "b"]);
    assert!(t.slot(a).unwrap().state.is_moved());
}

#[test]
fn test_consuming_move_needs_last_use() {
    let mut t = tracker_with(vec![person()]);
    let a = t.declare(SlotDecl::new("a", "Person")).unwrap();
    t.construct(a, vec!["ann".into(), 31.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "Person")).unwrap();
    assert!(matches!(
        t.consume(a, b, false),
        Err(LifeError::Resolve(ResolveError::LifetimeNotProvablyEnding { .. }))
    ));
    assert!(t.read(a).is_ok());
    assert!(t.slot(b).unwrap().state == life_val::SlotState::Uninitialized);
}

#[test]
fn test_taking_move_leaves_null_state() {
    let mut t = tracker_with(vec![heap_array()]);
    t.enter_scope();
    let a = t.declare(SlotDecl::new("a", "HeapArray").mutable()).unwrap();
    t.construct(a, vec![4.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "HeapArray")).unwrap();
    t.take_default(a, b).unwrap();

    assert_eq!(
        t.read(a).unwrap(),
        &Value::Record(
            Record::new("HeapArray")
                .with("data", Value::NULL_PTR)
                .with("size", 0)
        )
    );
    assert_eq!(t.read_field(b, "size").unwrap(), &Value::Int(4));

    let events = t.exit_scope().unwrap();
    let a_dtor = events
        .iter()
        .filter(|e| e.path == "a" && e.kind == DestroyKind::Explicit)
        .count();
    assert_eq!(a_dtor, 1);
    assert_eq!(t.leaked(), 0);
}

#[test]
fn test_careless_destructor_on_null_state() {
    let mut t = tracker_with(vec![careless_array()]);
    t.enter_scope();
    let a = t.declare(SlotDecl::new("a", "CarelessArray").mutable()).unwrap();
    t.construct(a, vec![1.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "CarelessArray")).unwrap();
    t.take_default(a, b).unwrap();
    assert!(matches!(
        t.exit_scope(),
        Err(LifeError::Heap(HeapError::NullDeref))
    ));
    // b was still destroyed
    assert_eq!(t.leaked(), 0);
}

#[test]
fn test_null_state_sharing_the_moved_resource() {
    let config = crate::TrackerConfig {
        check_aliasing: false,
        ..Default::default()
    };
    let mut t = tracker_with_config(vec![careless_array()], config);
    t.enter_scope();
    let a = t.declare(SlotDecl::new("a", "CarelessArray").mutable()).unwrap();
    t.construct(a, vec![1.into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "CarelessArray")).unwrap();
    let same = t.read(a).unwrap().clone();
    t.take(a, b, move || same).unwrap();
    assert!(matches!(
        t.exit_scope(),
        Err(LifeError::Heap(HeapError::DoubleFree(_)))
    ));
}

#[test]
fn test_fields_destroyed_in_reverse_order() {
    let mut t = tracker_with(vec![person()]);
    t.enter_scope();
    let p = t.declare(SlotDecl::new("p", "Person")).unwrap();
    t.construct(p, vec!["bob".into(), 7.into()]).unwrap();
    t.exit_scope().unwrap();
    assert_eq!(paths(&t), vec!["p.age", "p.name", "p"]);
    assert_eq!(t.events()[2].kind, DestroyKind::FieldWise);
}

#[test]
fn test_constructor_overloads() {
    let mut t = tracker_with(vec![person()]);
    let a = t.declare(SlotDecl::new("a", "Person")).unwrap();
    t.construct(a, vec![]).unwrap();
    assert_eq!(
        t.read(a).unwrap(),
        &Value::Record(Record::new("Person").with("name", "").with("age", 0))
    );

    let b = t.declare(SlotDecl::new("b", "Person")).unwrap();
    t.construct(b, vec!["bob".into()]).unwrap();
    assert_eq!(t.read_field(b, "name").unwrap(), &Value::from("bob"));
    assert_eq!(t.read_field(b, "age").unwrap(), &Value::Int(0));

    let c = t.declare(SlotDecl::new("c", "Person")).unwrap();
    assert!(matches!(
        t.construct(c, vec![Value::Int(3)]),
        Err(LifeError::Resolve(ResolveError::NoConstructor { .. }))
    ));
    assert!(matches!(
        t.resolve("Person", &OpRequest::Init { args: vec!["x".into(), 1.into()] }),
        Ok(LifecycleOp::Init { ctor: 2, .. })
    ));
}

#[test]
fn test_constructor_body_leaving_fields_unset() {
    fn half(_: &mut Heap, args: &[Value]) -> life_val::HeapResult<life_val::Fields> {
        let mut fields = life_val::Fields::new();
        fields.insert("x".into(), args[0].clone());
        Ok(fields)
    }
    let desc = TypeDescriptor::new("Half")
        .field("x", "Int")
        .field("y", "Int")
        .constructor_with(&["Int"], half);
    let mut t = tracker_with(vec![desc]);
    let h = t.declare(SlotDecl::new("h", "Half")).unwrap();
    t.construct(h, vec![1.into()]).unwrap();
    assert!(matches!(
        t.read(h),
        Err(LifeError::State(StateError::PartiallyInitializedUse { .. }))
    ));
    t.assign_field(h, "y", 2.into()).unwrap();
    assert!(t.read(h).is_ok());
}

#[test]
fn test_assign_checks_every_field() {
    let mut t = tracker_with(vec![point()]);
    let p = t.declare(SlotDecl::new("p", "Point")).unwrap();

    let wrong_type = Record::new("Point").with("x", "not an int").with("y", 1);
    assert!(matches!(
        t.assign(p, wrong_type.into()),
        Err(LifeError::State(StateError::TypeMismatch { .. }))
    ));
    let extra = Record::new("Point").with("x", 0).with("y", 1).with("z", 9);
    match t.assign(p, extra.into()) {
        Err(LifeError::State(StateError::UnknownField { field, .. })) => assert_eq!(field, "z"),
        other => panic!("expected UnknownField, got {:?}", other),
    }
    let missing = Record::new("Point").with("x", 0);
    assert!(matches!(
        t.assign(p, missing.into()),
        Err(LifeError::State(StateError::MissingField { .. }))
    ));
    assert!(t.slot(p).unwrap().state == life_val::SlotState::Uninitialized);

    t.assign(p, Record::new("Point").with("x", 0).with("y", 1).into())
        .unwrap();
    assert!(t.slot(p).unwrap().state.is_live());
}

#[test]
fn test_copy_body_result_is_checked() {
    fn sloppy_copy(_: &mut Heap, src: &Record) -> life_val::HeapResult<Record> {
        Ok(Record::new(src.ty.clone()).with("label", 7))
    }
    let tag = TypeDescriptor::new("Tag")
        .field("label", "String")
        .constructor(&["String"])
        .copy_with(sloppy_copy);
    let mut t = tracker_with(vec![tag]);
    let a = t.declare(SlotDecl::new("a", "Tag")).unwrap();
    t.construct(a, vec!["x".into()]).unwrap();
    let b = t.declare(SlotDecl::new("b", "Tag")).unwrap();
    assert!(matches!(
        t.copy(a, b),
        Err(LifeError::State(StateError::TypeMismatch { .. }))
    ));
    assert!(t.slot(b).unwrap().state == life_val::SlotState::Uninitialized);
}
