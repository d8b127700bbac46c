//! The type-erased trait wrapper: one storage slot holding "some concrete
//! type implementing capability mask `M`", with runtime type recovery.
//!
//! Lowered code cannot use native trait objects directly because trait
//! values share ownership through the counted heap and must support checked
//! downcasts back to their concrete type. [`TraitRef`] pairs an arena
//! [`Handle`] with a per-concrete-type [`TypeTag`] recorded at construction;
//! every downcast funnels through the single tag-checked choke point here
//! instead of scattering casts across call sites.

use std::{
    any::{Any, TypeId, type_name},
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use crate::{
    fault::{self, Fault},
    handle::Handle,
    heap::{Heap, Payload},
    resource::ResourceTracker,
};

/// Object-safe bridge from a capability mask to the concrete type behind it.
///
/// Every capability mask declares `AsAny` as a supertrait
/// (`trait Render: AsAny { .. }`); the blanket impl below means any
/// `'static` type qualifies automatically. Calls dispatch through the
/// vtable to the blanket impl instantiated at the *concrete* type, which is
/// what makes tag recovery and safe downcasting possible without unsafe
/// code.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// The identity tag of the concrete type, recovered through the vtable.
    fn tag(&self) -> TypeTag;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn tag(&self) -> TypeTag {
        TypeTag::of::<T>()
    }
}

/// Runtime identity token for a concrete type.
///
/// Comparison is `TypeId` identity: O(1), process-stable, never a string
/// match. The type name rides along purely for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// The tag of `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The static name of the tagged type. Diagnostics only; tag equality
    /// never consults it.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        // Identity comparison on the TypeId; the name is diagnostics only.
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Arena payload for trait storage: the erased value behind its capability
/// mask, plus the tag of the concrete type that went in.
///
/// The tag is stored once, in the cell, so a handle/tag mismatch is
/// unrepresentable: every trait instance sharing the cell reads the same
/// tag.
pub struct TraitCell<M: ?Sized> {
    mask: Box<M>,
    tag: TypeTag,
}

impl<M: ?Sized + AsAny> TraitCell<M> {
    fn new(mask: Box<M>) -> Self {
        // Deref through the box so the call dispatches through M's vtable;
        // on the box itself the blanket impl would tag `Box<M>`.
        let tag = (*mask).tag();
        Self { mask, tag }
    }

    /// Tag of the stored concrete type.
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// The dispatch surface of the stored value.
    #[must_use]
    pub fn mask(&self) -> &M {
        &*self.mask
    }
}

// Trait cells are leaves: the values stored behind a mask do not own counted
// handles of their own. Nested ownership goes through plain payload heaps.
impl<M: ?Sized> Payload for TraitCell<M> {}

impl<M: ?Sized> fmt::Debug for TraitCell<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TraitCell").field(&self.tag.name()).finish()
    }
}

/// Type-erased trait instance: either empty, or an owning share of a
/// [`TraitCell`] holding some concrete type implementing `M`.
///
/// Copying a trait instance shares ownership exactly like copying a
/// [`Handle`]; equality is identity of the underlying cell.
///
/// # Example
///
/// ```
/// use veld_runtime::{AsAny, Heap, TraitCell, TraitRef};
///
/// trait Shape: AsAny {
///     fn area(&self) -> f64;
/// }
///
/// struct Square(f64);
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.0 * self.0
///     }
/// }
///
/// let mut heap: Heap<TraitCell<dyn Shape>> = Heap::new();
/// let mut shape = TraitRef::from_mask(&mut heap, Box::new(Square(3.0)));
/// assert!(shape.type_is::<Square, _>(&heap));
/// assert_eq!(shape.get(&heap).area(), 9.0);
/// assert_eq!(shape.downcast_ref::<Square, _>(&heap).0, 3.0);
/// shape.drop_with_heap(&mut heap);
/// ```
pub struct TraitRef<M: ?Sized> {
    inner: Handle,
    mask: PhantomData<Box<M>>,
}

impl<M: ?Sized + AsAny> TraitRef<M> {
    /// The empty instance: inner handle null, no tag.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            inner: Handle::null(),
            mask: PhantomData,
        }
    }

    /// Constructs a trait instance from a concrete value.
    ///
    /// The box is the fresh allocation for the value, coerced to the mask at
    /// the call site (`TraitRef::from_mask(&mut heap, Box::new(v))`); the
    /// cell records the concrete type's tag and starts with count 1. Raises
    /// the allocation-failure fault if the tracker refuses the cell.
    pub fn from_mask<R: ResourceTracker>(heap: &mut Heap<TraitCell<M>, R>, mask: Box<M>) -> Self {
        Self {
            inner: heap.alloc(TraitCell::new(mask)),
            mask: PhantomData,
        }
    }

    /// Constructs a trait instance sharing an existing trait cell.
    ///
    /// Increments the cell's count; the tag is already in the cell. A null
    /// source yields the empty instance.
    pub fn from_handle<R: ResourceTracker>(heap: &Heap<TraitCell<M>, R>, source: &Handle) -> Self {
        Self {
            inner: source.clone_with_heap(heap),
            mask: PhantomData,
        }
    }

    /// Returns `true` iff the inner handle is null.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_null()
    }

    /// The inner handle. Shared-count diagnostics go through here.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.inner
    }

    /// Tag of the stored concrete type, or `None` when empty.
    #[must_use]
    pub fn tag<R: ResourceTracker>(&self, heap: &Heap<TraitCell<M>, R>) -> Option<TypeTag> {
        Some(heap.get(self.inner.try_cell()?).tag())
    }

    /// Returns `true` iff this instance is occupied and stores exactly the
    /// concrete type `T`.
    ///
    /// Empty instances answer `false` for every `T`. The comparison is tag
    /// identity, never structural.
    #[must_use]
    pub fn type_is<T: 'static, R: ResourceTracker>(&self, heap: &Heap<TraitCell<M>, R>) -> bool {
        match self.inner.try_cell() {
            Some(id) => heap.get(id).tag() == TypeTag::of::<T>(),
            None => false,
        }
    }

    /// The dynamic-dispatch surface of the stored value.
    ///
    /// Raises the invalid-memory fault when empty.
    #[must_use]
    pub fn get<'h, R: ResourceTracker>(&self, heap: &'h Heap<TraitCell<M>, R>) -> &'h M {
        &*heap.get(self.inner.cell()).mask
    }

    /// Mutable form of [`Self::get`].
    pub fn get_mut<'h, R: ResourceTracker>(&self, heap: &'h mut Heap<TraitCell<M>, R>) -> &'h mut M {
        &mut *heap.get_mut(self.inner.cell()).mask
    }

    /// Downcasts to a reference to the stored concrete type.
    ///
    /// Raises the invalid-memory fault when empty and the incompatible-type
    /// fault when the stored tag is not exactly `T`. This is the single
    /// checked choke point all typed recovery goes through.
    #[must_use]
    pub fn downcast_ref<'h, T: 'static, R: ResourceTracker>(&self, heap: &'h Heap<TraitCell<M>, R>) -> &'h T {
        let cell = heap.get(self.inner.cell());
        check_tag::<T, M>(cell);
        (*cell.mask)
            .as_any()
            .downcast_ref::<T>()
            .expect("TraitRef::downcast_ref: tag matched a different concrete type")
    }

    /// Mutable form of [`Self::downcast_ref`].
    pub fn downcast_mut<'h, T: 'static, R: ResourceTracker>(&self, heap: &'h mut Heap<TraitCell<M>, R>) -> &'h mut T {
        let id = self.inner.cell();
        check_tag::<T, M>(heap.get(id));
        (*heap.get_mut(id).mask)
            .as_any_mut()
            .downcast_mut::<T>()
            .expect("TraitRef::downcast_mut: tag matched a different concrete type")
    }

    /// Downcasts to a counted handle aliasing the stored value.
    ///
    /// Checks the tag like [`Self::downcast_ref`], then increments the
    /// shared count to cover the newly created alias.
    #[must_use]
    pub fn downcast_handle<T: 'static, R: ResourceTracker>(&self, heap: &Heap<TraitCell<M>, R>) -> Handle {
        check_tag::<T, M>(heap.get(self.inner.cell()));
        self.inner.clone_with_heap(heap)
    }

    /// Copies this instance, sharing ownership of the cell.
    #[must_use]
    pub fn clone_with_heap<R: ResourceTracker>(&self, heap: &Heap<TraitCell<M>, R>) -> Self {
        Self {
            inner: self.inner.clone_with_heap(heap),
            mask: PhantomData,
        }
    }

    /// Reassigns this instance to alias `src`.
    ///
    /// A no-op when both reference the identical cell; otherwise the current
    /// occupant is released first, then `src`'s cell is shared. Assigning
    /// from the empty instance releases and leaves this instance empty.
    pub fn assign<R: ResourceTracker>(&mut self, src: &Self, heap: &mut Heap<TraitCell<M>, R>) {
        self.inner.assign(&src.inner, heap);
    }

    /// Releases the occupant, leaving this instance empty. No-op when
    /// already empty.
    pub fn clear<R: ResourceTracker>(&mut self, heap: &mut Heap<TraitCell<M>, R>) {
        self.inner.drop_with_heap(heap);
    }

    /// Releases this instance. Identical to [`Self::clear`]; spelled like
    /// the handle operation for the sake of generated destruction paths.
    pub fn drop_with_heap<R: ResourceTracker>(&mut self, heap: &mut Heap<TraitCell<M>, R>) {
        self.inner.drop_with_heap(heap);
    }
}

/// The tag guard behind every downcast. Compiled out in the unchecked
/// build, where a mismatch then surfaces as an unclassified panic from the
/// `Any` downcast itself.
fn check_tag<T: 'static, M: ?Sized + AsAny>(cell: &TraitCell<M>) {
    if !cfg!(feature = "unchecked") && cell.tag() != TypeTag::of::<T>() {
        fault::raise(Fault::IncompatibleType);
    }
}

impl<M: ?Sized + AsAny> Default for TraitRef<M> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<M: ?Sized> fmt::Debug for TraitRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TraitRef").field(&self.inner).finish()
    }
}

/// Two trait instances are equal iff their underlying cells are the same
/// identity. Structural equality of payloads is explicitly not provided;
/// two empty instances are equal.
impl<M: ?Sized> PartialEq for TraitRef<M> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<M: ?Sized> Eq for TraitRef<M> {}

/// Built-in capability mask for values that release an external resource
/// deterministically. The compiler lowers `dispose` blocks against this
/// mask.
pub trait Dispose: AsAny {
    fn dispose(&mut self);
}
