#![doc = include_str!("../../../README.md")]

pub mod arith;
mod dispatch;
pub mod fault;
mod handle;
mod heap;
mod resource;
pub mod thread;
pub mod utf8;

pub use crate::{
    dispatch::{AsAny, Dispose, TraitCell, TraitRef, TypeTag},
    fault::Fault,
    handle::Handle,
    heap::{CellId, Heap, HeapDiff, HeapStats, Payload},
    resource::{LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker},
};
