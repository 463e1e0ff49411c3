//! Edge-case tests for schema declaration: inheritance, restriction,
//! inverse inference, freezing and introspection.

use std::cell::Cell;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use typegraph::schema::{
    AttributeDescriptor, Introspector, KeyKind, PropertyFlags, Restriction, ScalarKind, Schema, ValueType,
};
use typegraph::{Error, ObjectGraph, Value};

fn string() -> ValueType {
    ValueType::Scalar(ScalarKind::String)
}

// ============================================================================
// 1. Inheritance composition and restriction
// ============================================================================

#[test]
fn test_subtype_sees_inherited_attributes_first() {
    let mut s = Schema::new();
    let person = s.declare_type("Person", None).unwrap();
    let employee = s.declare_type("Employee", Some(person)).unwrap();
    let name = s.register_attribute(person, "name", string(), PropertyFlags::NONE).unwrap();
    let manager = s.register_attribute(person, "manager", ValueType::Entity(person), PropertyFlags::NONE).unwrap();
    let salary = s.register_attribute(employee, "salary", ValueType::Scalar(ScalarKind::Int), PropertyFlags::NONE).unwrap();

    assert_eq!(&*s.registry(employee).attributes(), &[name, manager, salary]);
    assert_eq!(s.resolve(employee, "name").unwrap(), name);
    assert!(matches!(s.resolve(person, "salary"), Err(Error::NotFound(_))));
    assert!(s.is_subtype(employee, person));
    assert!(!s.is_subtype(person, employee));

    // redeclaring an inherited name needs a restriction
    assert!(matches!(
        s.register_attribute(employee, "name", string(), PropertyFlags::NONE),
        Err(Error::DuplicateAttribute { .. })
    ));
}

#[test]
fn test_restriction_narrows_type_and_shares_slot() {
    let mut s = Schema::new();
    let person = s.declare_type("Person", None).unwrap();
    let employee = s.declare_type("Employee", Some(person)).unwrap();
    let name = s.register_attribute(person, "name", string(), PropertyFlags::NONE).unwrap();
    let manager = s.register_attribute(person, "manager", ValueType::Entity(person), PropertyFlags::NONE).unwrap();
    s.freeze();

    // allowed after freeze
    let narrowed = s
        .restrict(employee, "manager", Restriction { value_type: Some(employee), flags: PropertyFlags::NONE })
        .unwrap();
    assert_eq!(s.canonical(narrowed), manager);
    assert_eq!(&*s.registry(employee).attributes(), &[name, narrowed]);
    assert_eq!(s.property(manager).restrictions(), &[narrowed]);

    let s = Arc::new(s);
    let mut g = ObjectGraph::new(s);
    let boss = g.create(employee).unwrap();
    let plain = g.create(person).unwrap();
    let worker = g.create(employee).unwrap();

    assert!(matches!(g.set(worker, manager, Value::Ref(plain)), Err(Error::TypeMismatch { .. })));
    g.set(worker, narrowed, Value::Ref(boss)).unwrap();
    assert_eq!(g.get(worker, manager).unwrap(), &Value::Ref(boss));

    // a plain person keeps the wide type
    g.set(plain, manager, Value::Ref(plain)).unwrap();
}

#[test]
fn test_restriction_rejects_widening_and_unknown_names() {
    let mut s = Schema::new();
    let person = s.declare_type("Person", None).unwrap();
    let employee = s.declare_type("Employee", Some(person)).unwrap();
    let other = s.declare_type("Robot", None).unwrap();
    s.register_attribute(person, "manager", ValueType::Entity(employee), PropertyFlags::NONE).unwrap();

    let widen = Restriction { value_type: Some(person), flags: PropertyFlags::NONE };
    assert!(matches!(s.restrict(employee, "manager", widen), Err(Error::TypeMismatch { .. })));
    let unrelated = Restriction { value_type: Some(other), flags: PropertyFlags::NONE };
    assert!(matches!(s.restrict(employee, "manager", unrelated), Err(Error::TypeMismatch { .. })));
    assert!(matches!(s.restrict(employee, "nope", Restriction::default()), Err(Error::NotFound(_))));
}

#[test]
fn test_flags_propagate_to_restrictions() {
    let mut s = Schema::new();
    let team = s.declare_type("Team", None).unwrap();
    let squad = s.declare_type("Squad", Some(team)).unwrap();
    let member = s.declare_type("Member", None).unwrap();
    s.register_attribute(team, "members", ValueType::Entity(member), PropertyFlags::COLLECTION).unwrap();
    s.register_attribute(member, "team", ValueType::Entity(team), PropertyFlags::NONE).unwrap();
    let narrowed = s.restrict(squad, "members", Restriction::default()).unwrap();

    s.mark_dependent(team, "members", None).unwrap();
    assert!(s.property(narrowed).is_dependent());
    assert_eq!(&*s.registry(squad).dependents(), &[narrowed]);
    assert_eq!(s.inverse(narrowed).map(|p| s.property(p).name.clone()), Some("team".to_string()));
}

// ============================================================================
// 2. Inverse and ownership declaration
// ============================================================================

#[test]
fn test_missing_inverse_then_unidirectional() {
    let mut s = Schema::new();
    let folder = s.declare_type("Folder", None).unwrap();
    let note = s.declare_type("Note", None).unwrap();
    let notes = s.register_attribute(folder, "notes", ValueType::Entity(note), PropertyFlags::COLLECTION).unwrap();

    let err = s.mark_dependent(folder, "notes", None).unwrap_err();
    assert!(matches!(err, Error::MissingInverse { .. }));
    assert!(!s.property(notes).is_dependent());

    s.declare_unidirectional(folder, "notes").unwrap();
    s.mark_dependent(folder, "notes", None).unwrap();
    assert!(s.property(notes).is_dependent());
    assert_eq!(s.inverse(notes), None);
    assert!(!s.owner_graph(note).requires_owner());
}

#[test]
fn test_inverse_inferred_by_type_name() {
    let mut s = Schema::new();
    let album = s.declare_type("Album", None).unwrap();
    let track = s.declare_type("Track", None).unwrap();
    s.register_attribute(album, "tracks", ValueType::Entity(track), PropertyFlags::COLLECTION).unwrap();
    // two candidates: the name decides
    s.register_attribute(track, "album", ValueType::Entity(album), PropertyFlags::NONE).unwrap();
    s.register_attribute(track, "compilation", ValueType::Entity(album), PropertyFlags::NONE).unwrap();
    let tracks = s.mark_dependent(album, "tracks", None).unwrap();
    let inverse = s.inverse(tracks).unwrap();
    assert_eq!(s.describe(inverse), "Track.album");
    assert!(s.property(inverse).is_owner());
}

#[test]
fn test_inverse_conflict_and_flag_conflict() {
    let mut s = Schema::new();
    let a = s.declare_type("A", None).unwrap();
    let b = s.declare_type("B", None).unwrap();
    s.register_attribute(a, "b", ValueType::Entity(b), PropertyFlags::NONE).unwrap();
    s.register_attribute(b, "a", ValueType::Entity(a), PropertyFlags::NONE).unwrap();
    s.register_attribute(b, "other", ValueType::Entity(a), PropertyFlags::NONE).unwrap();
    s.set_inverse(a, "b", "a").unwrap();
    // rebinding to the same partner is fine
    s.set_inverse(b, "a", "b").unwrap();
    assert!(matches!(s.set_inverse(a, "b", "other"), Err(Error::InverseConflict { .. })));

    let both = PropertyFlags::DEPENDENT | PropertyFlags::OWNER;
    assert!(matches!(
        s.register_attribute(a, "bad", ValueType::Entity(b), both),
        Err(Error::FlagConflict(_))
    ));
    assert!(matches!(s.set_inverse(a, "b", "b"), Err(Error::NotFound(_))));
}

// ============================================================================
// 3. Lifecycle: duplicates, aliases, defaults, freezing
// ============================================================================

#[test]
fn test_duplicates_aliases_and_freeze() {
    let mut s = Schema::new();
    let item = s.declare_type("Item", None).unwrap();
    let special = s.declare_type("Special", Some(item)).unwrap();
    assert!(matches!(s.declare_type("Item", None), Err(Error::DuplicateType(_))));

    let label = s.register_attribute(item, "label", string(), PropertyFlags::NONE).unwrap();
    s.register_attribute(item, "count", ValueType::Scalar(ScalarKind::Int), PropertyFlags::NONE).unwrap();
    assert!(matches!(
        s.register_attribute(item, "label", string(), PropertyFlags::NONE),
        Err(Error::DuplicateAttribute { .. })
    ));
    s.add_alias(item, "title", "label").unwrap();
    assert_eq!(s.resolve(item, "title").unwrap(), label);
    assert_eq!(s.resolve(special, "title").unwrap(), label);
    assert!(matches!(s.add_alias(item, "label", "count"), Err(Error::DuplicateAttribute { .. })));

    s.add_default(item, "count", 1i64).unwrap();
    s.add_default(special, "count", 5i64).unwrap();
    s.add_key(item, KeyKind::Primary, &["label"]).unwrap();
    s.freeze();

    assert!(matches!(s.declare_type("Late", None), Err(Error::Frozen(_))));
    assert!(matches!(s.register_attribute(item, "late", string(), PropertyFlags::NONE), Err(Error::Frozen(_))));
    assert!(matches!(s.add_mandatory(item, &["label"]), Err(Error::Frozen(_))));
    assert_eq!(s.registry(special).key(KeyKind::Primary), Some(&[label][..]));

    let mut g = ObjectGraph::new(Arc::new(s));
    let plain = g.create(item).unwrap();
    let fancy = g.create(special).unwrap();
    assert_eq!(g.get_by_name(plain, "count").unwrap(), &Value::Int(1));
    assert_eq!(g.get_by_name(fancy, "count").unwrap(), &Value::Int(5));
}

#[test]
fn test_error_classification() {
    let validation = Error::ValidationError { node: typegraph::NodeId(3), message: "x".into() };
    assert!(validation.is_recoverable());
    assert_eq!(validation.to_string(), "Validation failed for node 3: x");
    assert!(!Error::Frozen("restrict".into()).is_recoverable());
}

// ============================================================================
// 4. Introspection
// ============================================================================

struct Catalog {
    calls: Cell<usize>,
}

impl Introspector for Catalog {
    fn introspect(&self, type_name: &str) -> Vec<AttributeDescriptor> {
        self.calls.set(self.calls.get() + 1);
        match type_name {
            "Shelf" => vec![
                AttributeDescriptor::scalar("label", ScalarKind::String),
                AttributeDescriptor::entity("books", "Book").many(),
                AttributeDescriptor::scalar("weight", ScalarKind::Float).read_only(),
            ],
            "Book" => vec![AttributeDescriptor::entity("shelf", "Shelf")],
            _ => Vec::new(),
        }
    }
}

#[test]
fn test_introspection_feeds_dependency_inference() {
    let catalog = Catalog { calls: Cell::new(0) };
    let mut s = Schema::new();
    let shelf = s.declare_type("Shelf", None).unwrap();
    let book = s.declare_type("Book", None).unwrap();

    assert_eq!(s.introspect(shelf, &catalog).unwrap(), 2);
    assert_eq!(s.introspect(book, &catalog).unwrap(), 1);
    assert_eq!(s.introspect(shelf, &catalog).unwrap(), 0);
    assert_eq!(catalog.calls.get(), 2);
    assert!(matches!(s.resolve(shelf, "weight"), Err(Error::NotFound(_))));

    s.mark_dependent(shelf, "books", None).unwrap();
    let shelf_attr = s.resolve(book, "shelf").unwrap();
    assert!(s.property(shelf_attr).is_owner());
    assert!(s.owner_graph(book).requires_owner());
}
