//! Trait-wrapper tests: construction, tag probing, checked downcasts,
//! assignment, identity equality, and the ownership rules shared with the
//! plain handle.

use veld_runtime::{AsAny, Dispose, Fault, Heap, TraitCell, TraitRef, fault};

trait Entity: AsAny {
    fn describe(&self) -> String;
}

impl Entity for i64 {
    fn describe(&self) -> String {
        format!("int {self}")
    }
}

#[derive(Debug, PartialEq)]
struct Text(String);

impl Entity for Text {
    fn describe(&self) -> String {
        format!("text {t}", t = self.0)
    }
}

type EntityHeap = Heap<TraitCell<dyn Entity>>;

#[test]
fn occupied_instance_recovers_its_concrete_type() {
    let mut heap = EntityHeap::new();
    let mut value = TraitRef::from_mask(&mut heap, Box::new(42_i64));

    assert!(!value.is_empty());
    assert!(value.type_is::<i64, _>(&heap));
    assert!(!value.type_is::<Text, _>(&heap));
    assert_eq!(*value.downcast_ref::<i64, _>(&heap), 42);
    assert_eq!(value.get(&heap).describe(), "int 42");

    assert_eq!(
        fault::catch(|| value.downcast_ref::<Text, _>(&heap).0.clone()),
        Err(Fault::IncompatibleType),
    );

    value.drop_with_heap(&mut heap);
}

#[test]
fn empty_instance_probes_false_and_faults_on_access() {
    let heap = EntityHeap::new();
    let empty = TraitRef::<dyn Entity>::empty();

    assert!(empty.is_empty());
    assert!(!empty.type_is::<i64, _>(&heap));
    assert!(!empty.type_is::<Text, _>(&heap));
    assert_eq!(empty.tag(&heap), None);

    assert_eq!(
        fault::catch(|| *empty.downcast_ref::<i64, _>(&heap)),
        Err(Fault::InvalidMemory),
    );
    assert_eq!(fault::catch(|| empty.get(&heap).describe()), Err(Fault::InvalidMemory));
}

#[test]
fn tag_identity_is_exact() {
    let mut heap = EntityHeap::new();
    let mut text = TraitRef::from_mask(&mut heap, Box::new(Text(String::from("hi"))));

    let tag = text.tag(&heap).expect("occupied instance must expose its tag");
    assert!(tag.name().contains("Text"), "tag name is for diagnostics: {tag:?}");
    // Probing a structurally identical but distinct type must miss.
    assert!(!text.type_is::<String, _>(&heap));
    assert_eq!(*text.downcast_ref::<Text, _>(&heap), Text(String::from("hi")));

    text.drop_with_heap(&mut heap);
}

#[test]
fn copies_share_the_cell_and_the_count() {
    let mut heap = EntityHeap::new();
    let mut a = TraitRef::from_mask(&mut heap, Box::new(1_i64));
    let mut b = a.clone_with_heap(&heap);

    assert_eq!(a.handle().live_count(&heap), 2);
    assert_eq!(a, b, "copies of one instance are the same identity");

    b.drop_with_heap(&mut heap);
    assert_eq!(a.handle().live_count(&heap), 1);
    assert_eq!(heap.stats().live_objects, 1);
    a.drop_with_heap(&mut heap);
    assert_eq!(heap.stats().live_objects, 0);
}

#[test]
fn self_assignment_is_a_noop() {
    let mut heap = EntityHeap::new();
    let mut a = TraitRef::from_mask(&mut heap, Box::new(9_i64));
    let alias = a.clone_with_heap(&heap);

    // Both sides reference the identical cell: nothing may change.
    a.assign(&alias, &mut heap);
    assert_eq!(a.handle().live_count(&heap), 2);
    assert!(a.type_is::<i64, _>(&heap));

    let mut alias = alias;
    alias.drop_with_heap(&mut heap);
    a.drop_with_heap(&mut heap);
}

#[test]
fn assignment_releases_the_previous_occupant() {
    let mut heap = EntityHeap::new();
    let mut left = TraitRef::from_mask(&mut heap, Box::new(1_i64));
    let mut right = TraitRef::from_mask(&mut heap, Box::new(Text(String::from("x"))));
    assert_eq!(heap.stats().live_objects, 2);

    left.assign(&right, &mut heap);
    assert_eq!(heap.stats().live_objects, 1, "the old occupant must be freed");
    assert_eq!(left, right);
    assert!(left.type_is::<Text, _>(&heap));
    assert_eq!(right.handle().live_count(&heap), 2);

    // Assignment from the empty sentinel releases and empties.
    left.assign(&TraitRef::empty(), &mut heap);
    assert!(left.is_empty());
    assert_eq!(right.handle().live_count(&heap), 1);
    right.drop_with_heap(&mut heap);
}

#[test]
fn equality_is_cell_identity_not_structure() {
    let mut heap = EntityHeap::new();
    let mut a = TraitRef::from_mask(&mut heap, Box::new(5_i64));
    let mut b = TraitRef::from_mask(&mut heap, Box::new(5_i64));

    assert_ne!(a, b, "equal payloads in distinct cells are not equal");
    let alias = a.clone_with_heap(&heap);
    assert_eq!(a, alias);
    assert_eq!(TraitRef::<dyn Entity>::empty(), TraitRef::<dyn Entity>::empty());
    assert_ne!(a, TraitRef::empty());

    let mut alias = alias;
    alias.drop_with_heap(&mut heap);
    a.drop_with_heap(&mut heap);
    b.drop_with_heap(&mut heap);
}

#[test]
fn construction_from_handle_shares_ownership() {
    let mut heap = EntityHeap::new();
    let mut original = TraitRef::from_mask(&mut heap, Box::new(11_i64));
    let shared = original.downcast_handle::<i64, _>(&heap);
    assert_eq!(original.handle().live_count(&heap), 2);

    let mut rebuilt = TraitRef::from_handle(&heap, &shared);
    assert_eq!(original.handle().live_count(&heap), 3);
    assert!(rebuilt.type_is::<i64, _>(&heap));
    assert_eq!(rebuilt, original);

    let mut shared = shared;
    shared.drop_with_heap(&mut heap);
    rebuilt.drop_with_heap(&mut heap);
    original.drop_with_heap(&mut heap);
    assert_eq!(heap.stats().live_objects, 0);
}

#[test]
fn downcast_handle_checks_the_tag_first() {
    let mut heap = EntityHeap::new();
    let mut value = TraitRef::from_mask(&mut heap, Box::new(3_i64));

    assert_eq!(
        fault::catch(|| value.downcast_handle::<Text, _>(&heap).is_null()),
        Err(Fault::IncompatibleType),
    );
    assert_eq!(value.handle().live_count(&heap), 1, "a refused downcast must not leak a count");

    value.drop_with_heap(&mut heap);
}

#[test]
fn downcast_mut_edits_in_place() {
    let mut heap = EntityHeap::new();
    let mut value = TraitRef::from_mask(&mut heap, Box::new(Text(String::from("before"))));

    value.downcast_mut::<Text, _>(&mut heap).0 = String::from("after");
    assert_eq!(value.get(&heap).describe(), "text after");

    value.drop_with_heap(&mut heap);
}

struct TempResource {
    released: bool,
}

impl Dispose for TempResource {
    fn dispose(&mut self) {
        self.released = true;
    }
}

#[test]
fn dispose_mask_runs_through_the_dispatch_surface() {
    let mut heap: Heap<TraitCell<dyn Dispose>> = Heap::new();
    let mut resource = TraitRef::from_mask(&mut heap, Box::new(TempResource { released: false }));

    resource.get_mut(&mut heap).dispose();
    assert!(resource.downcast_ref::<TempResource, _>(&heap).released);

    resource.drop_with_heap(&mut heap);
}
