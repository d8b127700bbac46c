//! Binary snapshot round-trips for plain value heaps.
//!
//! A heap plus the handles rooting it serialize together; restoring must
//! preserve stored values, shared counts, and the free list so slot reuse
//! continues where it left off.

use pretty_assertions::assert_eq;
use veld_runtime::{Handle, Heap};

#[test]
fn snapshot_preserves_values_counts_and_free_slots() {
    let mut heap: Heap<i64> = Heap::new();
    let first = heap.alloc(10);
    let alias = first.clone_with_heap(&heap);
    let mut doomed = heap.alloc(20);
    let third = heap.alloc(30);
    doomed.drop_with_heap(&mut heap);

    let roots = vec![first, alias, third];
    let bytes = postcard::to_allocvec(&(&heap, &roots)).expect("snapshot serializes");
    let (mut restored, mut restored_roots): (Heap<i64>, Vec<Handle>) =
        postcard::from_bytes(&bytes).expect("snapshot deserializes");

    assert_eq!(restored.stats(), heap.stats());
    assert_eq!(*restored.get(restored_roots[0].cell()), 10);
    assert_eq!(*restored.get(restored_roots[2].cell()), 30);
    assert_eq!(restored_roots[0].live_count(&restored), 2);
    assert_eq!(restored_roots[2].live_count(&restored), 1);

    // The free slot left by the released cell must be reused on restore.
    let mut refill = restored.alloc(40);
    assert_eq!(restored.stats().total_slots, 3);
    assert_eq!(*restored.get(refill.cell()), 40);

    refill.drop_with_heap(&mut restored);
    for root in &mut restored_roots {
        root.drop_with_heap(&mut restored);
    }
    assert_eq!(restored.stats().live_objects, 0);

    // Release the originals too so the source heap drains cleanly.
    let mut roots = roots;
    for root in &mut roots {
        root.drop_with_heap(&mut heap);
    }
    assert_eq!(heap.stats().live_objects, 0);
}

#[test]
fn snapshot_of_nested_ownership_keeps_the_cascade_intact() {
    let mut heap: Heap<Vec<Handle>> = Heap::new();
    let child = heap.alloc(Vec::new());
    let parent = heap.alloc(vec![child]);

    let bytes = postcard::to_allocvec(&(&heap, &parent)).expect("snapshot serializes");
    let (mut restored, mut restored_parent): (Heap<Vec<Handle>>, Handle) =
        postcard::from_bytes(&bytes).expect("snapshot deserializes");

    assert_eq!(restored.stats().live_objects, 2);
    restored_parent.drop_with_heap(&mut restored);
    assert_eq!(
        restored.stats().live_objects,
        0,
        "restored child references must still be released by the cascade"
    );

    let mut parent = parent;
    parent.drop_with_heap(&mut heap);
    assert_eq!(heap.stats().live_objects, 0);
}
