use std::{cell::Cell, fmt, mem};

use crate::{
    fault::{self, Fault},
    handle::Handle,
    resource::{NoLimitTracker, ResourceError, ResourceTracker},
};

/// Index of a cell slot in a [`Heap`] arena.
///
/// Internal identity only: slot indices are reused after a cell is freed, so
/// a `CellId` must never be held across a release of the cell it names.
/// Ownership is always expressed through [`Handle`], which participates in
/// the reference count; a raw `CellId` does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CellId(usize);

impl CellId {
    #[inline]
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw slot index.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Contract between the heap and the values it stores.
///
/// Payloads that own counted references into the same heap report them
/// through [`release_children`](Self::release_children) so that freeing a
/// cell releases everything it owns; leaf payloads use the provided no-op.
/// [`estimate_size`](Self::estimate_size) feeds the resource tracker and only
/// needs to be approximately right.
pub trait Payload {
    /// Moves the `CellId`s of every counted handle owned by this value into
    /// `out`, leaving the handles null. Called exactly once, as the owning
    /// cell is freed.
    fn release_children(&mut self, out: &mut Vec<CellId>) {
        let _ = out;
    }

    /// Approximate size of this value in bytes, for resource accounting.
    fn estimate_size(&self) -> usize {
        mem::size_of_val(self)
    }
}

macro_rules! leaf_payload {
    ($($ty:ty),* $(,)?) => {
        $(impl Payload for $ty {})*
    };
}

leaf_payload!((), bool, char, i8, i16, i32, i64, i128, u8, u16, u32, u64, u128, isize, usize, f32, f64);

impl Payload for String {
    fn estimate_size(&self) -> usize {
        mem::size_of::<Self>() + self.capacity()
    }
}

impl<V: Payload> Payload for Option<V> {
    fn release_children(&mut self, out: &mut Vec<CellId>) {
        if let Some(value) = self {
            value.release_children(out);
        }
    }

    fn estimate_size(&self) -> usize {
        mem::size_of::<Self>() + self.as_ref().map_or(0, Payload::estimate_size)
    }
}

impl<V: Payload> Payload for Vec<V> {
    fn release_children(&mut self, out: &mut Vec<CellId>) {
        for value in self {
            value.release_children(out);
        }
    }

    fn estimate_size(&self) -> usize {
        mem::size_of::<Self>() + self.capacity() * mem::size_of::<V>()
    }
}

impl<V: Payload> Payload for Box<V> {
    fn release_children(&mut self, out: &mut Vec<CellId>) {
        self.as_mut().release_children(out);
    }

    fn estimate_size(&self) -> usize {
        mem::size_of::<Self>() + self.as_ref().estimate_size()
    }
}

/// One arena slot: the payload plus the shared reference count.
///
/// The count lives here, in the allocation, rather than in any handle, so
/// every handle derived from the same cell observes the same counter. It
/// uses `Cell` for interior mutability: incrementing a count must not
/// require `&mut Heap`, or aliasing reads would conflict with it. The
/// substrate is single-threaded, so no atomics are involved.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct HeapCell<V> {
    refcount: Cell<usize>,
    data: V,
}

/// Reference-counted arena that backs all heap values of a lowered program.
///
/// Uses a free list to reuse slots from freed cells, keeping memory usage
/// constant for long-running loops that repeatedly allocate and free values.
/// When a cell is freed via `dec_ref`, its slot ID is added to the free
/// list. New allocations pop from the free list when available, otherwise
/// append.
///
/// Generic over `R: ResourceTracker` to support different resource tracking
/// strategies. When `R = NoLimitTracker` (the default), all resource checks
/// compile away to no-ops.
///
/// Serialization requires `V: Serialize` and `R: Serialize`, which is why
/// trait-wrapper heaps (whose payloads are type-erased boxes) cannot be
/// snapshotted while plain value heaps can.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Heap<V, R: ResourceTracker = NoLimitTracker> {
    entries: Vec<Option<HeapCell<V>>>,
    /// IDs of freed slots available for reuse. Populated by `dec_ref`,
    /// consumed by `try_alloc`.
    free_list: Vec<CellId>,
    /// Resource tracker consulted on every allocation and free.
    tracker: R,
}

impl<V: Payload> Heap<V> {
    /// Creates an empty heap with no resource limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tracker(0, NoLimitTracker)
    }
}

impl<V: Payload> Default for Heap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Payload, R: ResourceTracker> Heap<V, R> {
    /// Creates a heap with the given slot capacity hint and resource tracker.
    #[must_use]
    pub fn with_tracker(capacity: usize, tracker: R) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            tracker,
        }
    }

    /// Allocates a new cell with reference count 1 and returns its first
    /// handle.
    ///
    /// Allocation refusal is not a recoverable condition for generated code:
    /// if the resource tracker declines, this raises the allocation-failure
    /// fault. Hosts that want an error value instead use [`Self::try_alloc`].
    ///
    /// # Example
    ///
    /// ```
    /// use veld_runtime::Heap;
    ///
    /// let mut heap: Heap<i64> = Heap::new();
    /// let mut value = heap.alloc(7);
    /// assert_eq!(value.live_count(&heap), 1);
    /// value.drop_with_heap(&mut heap);
    /// ```
    pub fn alloc(&mut self, data: V) -> Handle {
        match self.try_alloc(data) {
            Ok(handle) => handle,
            Err(_) => fault::raise(Fault::AllocationFailed),
        }
    }

    /// Allocates a new cell, returning `Err(ResourceError)` if the tracker
    /// refuses. The boundary form of [`Self::alloc`].
    pub fn try_alloc(&mut self, data: V) -> Result<Handle, ResourceError> {
        self.tracker.on_allocate(|| data.estimate_size())?;

        let new_cell = HeapCell {
            refcount: Cell::new(1),
            data,
        };
        let id = if let Some(id) = self.free_list.pop() {
            // Reuse a freed slot
            self.entries[id.index()] = Some(new_cell);
            id
        } else {
            // No free slots, append a new entry
            let id = CellId::new(self.entries.len());
            self.entries.push(Some(new_cell));
            id
        };
        Ok(Handle::from_cell(id))
    }

    /// Increments the reference count of a live cell.
    ///
    /// Uses interior mutability for the count, so only shared access to the
    /// heap is required. In the uncounted build this is a no-op.
    pub fn inc_ref(&self, id: CellId) {
        if cfg!(feature = "uncounted") {
            return;
        }
        match self.cell(id) {
            Some(cell) => cell.refcount.set(cell.refcount.get() + 1),
            None => fault::raise(Fault::InvalidMemory),
        }
    }

    /// Decrements the reference count and frees the cell (plus its counted
    /// children, recursively) once it hits zero.
    ///
    /// When a cell is freed its slot ID is added to the free list for reuse
    /// by future allocations, and the tracker is notified of the freed
    /// memory. In the uncounted build the first decrement frees immediately
    /// and decrements of already-freed slots are ignored.
    pub fn dec_ref(&mut self, id: CellId) {
        {
            let Some(cell) = self.cell(id) else {
                if cfg!(feature = "uncounted") {
                    // A stale alias releasing a cell the first owner already
                    // freed. The uncounted build has no way to tell, so the
                    // release is simply ignored.
                    return;
                }
                fault::raise(Fault::InvalidMemory);
            };
            if !cfg!(feature = "uncounted") {
                let count = cell.refcount.get();
                if count > 1 {
                    cell.refcount.set(count - 1);
                    return;
                }
            }
        }
        self.free_cell(id);
    }

    /// Frees a cell whose count reached zero and releases its children.
    fn free_cell(&mut self, id: CellId) {
        let cell = self.entries[id.index()]
            .take()
            .expect("Heap::free_cell: slot already free");
        self.free_list.push(id);
        self.tracker.on_free(|| cell.data.estimate_size());

        let mut data = cell.data;
        let mut child_ids = Vec::new();
        data.release_children(&mut child_ids);
        drop(data);
        // Recursively release children; ownership is acyclic by convention,
        // so this terminates.
        for child_id in child_ids {
            self.dec_ref(child_id);
        }
    }

    /// Returns a reference to the payload stored at `id`.
    ///
    /// Raises the invalid-memory fault if the slot is missing or freed.
    #[must_use]
    pub fn get(&self, id: CellId) -> &V {
        match self.cell(id) {
            Some(cell) => &cell.data,
            None => fault::raise(Fault::InvalidMemory),
        }
    }

    /// Returns a mutable reference to the payload stored at `id`.
    ///
    /// Raises the invalid-memory fault if the slot is missing or freed.
    /// In-place mutation of aliased cells is the caller's coordination
    /// problem; the borrow of the heap only guarantees exclusivity for the
    /// duration of this call chain.
    pub fn get_mut(&mut self, id: CellId) -> &mut V {
        match self.entries.get_mut(id.index()).and_then(Option::as_mut) {
            Some(cell) => &mut cell.data,
            None => fault::raise(Fault::InvalidMemory),
        }
    }

    /// Returns the payload at `id`, or `None` when the slot is freed.
    #[must_use]
    pub fn get_if_live(&self, id: CellId) -> Option<&V> {
        Some(&self.cell(id)?.data)
    }

    /// Mutable form of [`Self::get_if_live`].
    pub fn get_mut_if_live(&mut self, id: CellId) -> Option<&mut V> {
        Some(&mut self.entries.get_mut(id.index())?.as_mut()?.data)
    }

    /// Returns the current shared count for a cell.
    ///
    /// Reports the 0 sentinel when the slot is freed or the build is
    /// uncounted. Diagnostics and tests only; never a correctness input.
    #[must_use]
    pub fn live_count(&self, id: CellId) -> usize {
        if cfg!(feature = "uncounted") {
            return 0;
        }
        self.cell(id).map_or(0, |cell| cell.refcount.get())
    }

    /// Number of live cells.
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.len() - self.free_list.len()
    }

    /// Returns a reference to the resource tracker.
    #[must_use]
    pub fn tracker(&self) -> &R {
        &self.tracker
    }

    /// Takes a snapshot of current heap occupancy and tracker counters.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live_objects: self.size(),
            free_slots: self.free_list.len(),
            total_slots: self.entries.len(),
            tracker_allocations: self.tracker.allocation_count(),
            tracker_memory_bytes: self.tracker.current_memory_bytes(),
        }
    }

    fn cell(&self, id: CellId) -> Option<&HeapCell<V>> {
        self.entries.get(id.index())?.as_ref()
    }
}

/// Snapshot of heap occupancy at a point in time.
///
/// Used by hosts to monitor heap growth and by tests to prove allocation
/// exactness: every sequence of copies and drops must leave `live_objects`
/// at the value the ownership rules predict.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HeapStats {
    /// Total number of live cells on the heap.
    pub live_objects: usize,
    /// Number of free (recycled) slots available for reuse.
    pub free_slots: usize,
    /// Total heap capacity (live + free).
    pub total_slots: usize,
    /// Tracker live-allocation count, if using `LimitedTracker`.
    ///
    /// `None` when the heap uses `NoLimitTracker` (the default).
    pub tracker_allocations: Option<usize>,
    /// Tracker memory usage in bytes, if using `LimitedTracker`.
    pub tracker_memory_bytes: Option<usize>,
}

impl HeapStats {
    /// Computes the difference between `self` ("before") and `other`
    /// ("after").
    ///
    /// Returns a [`HeapDiff`] where positive deltas indicate growth from
    /// `self` to `other`, and negative deltas indicate shrinkage. For
    /// tracker fields, a delta is computed only when both snapshots contain
    /// `Some`.
    ///
    /// # Example
    ///
    /// ```
    /// # use veld_runtime::HeapStats;
    /// let before = HeapStats {
    ///     live_objects: 2, free_slots: 0, total_slots: 2,
    ///     tracker_allocations: None, tracker_memory_bytes: None,
    /// };
    /// let after = HeapStats {
    ///     live_objects: 5, free_slots: 1, total_slots: 6,
    ///     tracker_allocations: None, tracker_memory_bytes: None,
    /// };
    /// let diff = before.diff(&after);
    /// assert_eq!(diff.live_objects_delta, 3);
    /// ```
    #[must_use]
    pub fn diff(&self, other: &Self) -> HeapDiff {
        HeapDiff {
            live_objects_delta: isize_delta(self.live_objects, other.live_objects),
            free_slots_delta: isize_delta(self.free_slots, other.free_slots),
            total_slots_delta: isize_delta(self.total_slots, other.total_slots),
            tracker_allocations_delta: optional_isize_delta(self.tracker_allocations, other.tracker_allocations),
            tracker_memory_bytes_delta: optional_isize_delta(self.tracker_memory_bytes, other.tracker_memory_bytes),
        }
    }
}

/// Difference between two heap snapshots.
///
/// Computed via [`HeapStats::diff`]. Positive deltas mean growth, negative
/// means shrinkage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapDiff {
    /// Change in live cell count (`after - before`).
    pub live_objects_delta: isize,
    /// Change in free slot count.
    pub free_slots_delta: isize,
    /// Change in total slot count.
    pub total_slots_delta: isize,
    /// Change in tracker allocations (only if both snapshots have the value).
    pub tracker_allocations_delta: Option<isize>,
    /// Change in tracker memory bytes (only if both snapshots have the value).
    pub tracker_memory_bytes_delta: Option<isize>,
}

impl HeapDiff {
    /// Returns `true` when all deltas are zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_objects_delta == 0
            && self.free_slots_delta == 0
            && self.total_slots_delta == 0
            && self.tracker_allocations_delta.is_none_or(|d| d == 0)
            && self.tracker_memory_bytes_delta.is_none_or(|d| d == 0)
    }
}

impl fmt::Display for HeapDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "HeapDiff: no changes");
        }
        write!(
            f,
            "HeapDiff: {:+} live objects, {:+} slots",
            self.live_objects_delta, self.total_slots_delta
        )?;
        if let Some(alloc_delta) = self.tracker_allocations_delta
            && alloc_delta != 0
        {
            write!(f, "\n  Tracker allocations: {alloc_delta:+}")?;
        }
        if let Some(mem_delta) = self.tracker_memory_bytes_delta
            && mem_delta != 0
        {
            write!(f, "\n  Tracker memory: {mem_delta:+} bytes")?;
        }
        Ok(())
    }
}

/// Computes `after - before` as `isize`, handling the `usize -> isize`
/// conversion.
fn isize_delta(before: usize, after: usize) -> isize {
    (after as isize).wrapping_sub(before as isize)
}

/// Computes the delta between two optional `usize` values.
///
/// Returns `Some(delta)` only when both values are `Some`.
fn optional_isize_delta(before: Option<usize>, after: Option<usize>) -> Option<isize> {
    match (before, after) {
        (Some(b), Some(a)) => Some(isize_delta(b, a)),
        _ => None,
    }
}
