use crate::{
    fault::{self, Fault},
    heap::{CellId, Heap, Payload},
    resource::ResourceTracker,
};

/// Owning, counted reference to a heap cell: the ownership currency of the
/// substrate.
///
/// A handle is either null or names a cell whose shared count it
/// participates in. Ownership operations go through the heap explicitly:
/// [`clone_with_heap`](Self::clone_with_heap) to copy (count increment) and
/// [`drop_with_heap`](Self::drop_with_heap) to release (count decrement,
/// free at zero).
///
/// NOTE: `Clone` is intentionally NOT derived. Direct cloning would bypass
/// reference counting and cause the cell to be freed while aliases remain.
/// Equality is identity: two handles are equal iff they name the same cell
/// (two null handles are equal).
#[derive(Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Handle {
    slot: Option<CellId>,
}

impl Handle {
    /// The null handle: no pointee, safe to release, faults on dereference.
    #[must_use]
    pub const fn null() -> Self {
        Self { slot: None }
    }

    pub(crate) fn from_cell(id: CellId) -> Self {
        Self { slot: Some(id) }
    }

    /// Returns `true` when this handle has no pointee.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.slot.is_none()
    }

    /// The dereference checkpoint: returns the cell this handle names.
    ///
    /// Raises the invalid-memory fault on a null handle. The unchecked build
    /// compiles the classified guard out; a null handle then surfaces as an
    /// ordinary panic.
    #[must_use]
    pub fn cell(&self) -> CellId {
        if cfg!(feature = "unchecked") {
            self.slot.expect("Handle::cell: null handle")
        } else {
            match self.slot {
                Some(id) => id,
                None => fault::raise(Fault::InvalidMemory),
            }
        }
    }

    /// Returns the cell this handle names, or `None` when null.
    #[must_use]
    pub fn try_cell(&self) -> Option<CellId> {
        self.slot
    }

    /// Copies this handle, incrementing the shared count.
    ///
    /// Cloning a null handle yields a null handle.
    #[must_use]
    pub fn clone_with_heap<V: Payload, R: ResourceTracker>(&self, heap: &Heap<V, R>) -> Self {
        match self.slot {
            Some(id) => {
                heap.inc_ref(id);
                Self { slot: Some(id) }
            }
            None => Self::null(),
        }
    }

    /// Releases this handle: decrements the shared count, frees the cell at
    /// zero, and leaves the handle null.
    ///
    /// Releasing an already-null handle is a no-op, so destruction paths may
    /// call this unconditionally.
    pub fn drop_with_heap<V: Payload, R: ResourceTracker>(&mut self, heap: &mut Heap<V, R>) {
        if let Some(id) = self.slot.take() {
            heap.dec_ref(id);
        }
    }

    /// Reassigns this handle to alias `src`.
    ///
    /// A no-op when both already name the same cell; otherwise the current
    /// pointee is released first, then `src` is copied. Assigning from a
    /// null handle releases and leaves this handle null.
    pub fn assign<V: Payload, R: ResourceTracker>(&mut self, src: &Self, heap: &mut Heap<V, R>) {
        if let (Some(a), Some(b)) = (self.slot, src.slot)
            && a == b
        {
            return;
        }
        self.drop_with_heap(heap);
        *self = src.clone_with_heap(heap);
    }

    /// Current shared count of the pointee, or the 0 sentinel when this
    /// handle is null, the cell is freed, or the build is uncounted.
    /// Diagnostics and tests only.
    #[must_use]
    pub fn live_count<V: Payload, R: ResourceTracker>(&self, heap: &Heap<V, R>) -> usize {
        self.slot.map_or(0, |id| heap.live_count(id))
    }
}

/// Drop implementation that panics if a non-null handle is dropped without
/// calling `drop_with_heap`. This helps catch reference counting bugs during
/// development/testing. Only enabled when the `ref-count-panic` feature is
/// active.
#[cfg(feature = "ref-count-panic")]
impl Drop for Handle {
    fn drop(&mut self) {
        if let Some(id) = self.slot {
            panic!("Handle({id:?}) dropped without calling drop_with_heap() - this is a reference counting bug");
        }
    }
}

impl Payload for Handle {
    fn release_children(&mut self, out: &mut Vec<CellId>) {
        if let Some(id) = self.slot.take() {
            out.push(id);
        }
    }
}
