//! Native-thread spawn wrapper.
//!
//! A thin pass-through to the host threading facility: [`spawn`] starts an
//! OS thread and allocates a [`ThreadCell`] in a caller-supplied heap, so
//! the returned [`Handle`] follows the same copy/drop ownership discipline
//! as every other heap value. Dropping the last handle frees the cell and
//! detaches the thread; it never joins or cancels it. The handle's lifetime
//! and the thread's execution are independent.

use std::thread::{self, JoinHandle};

use crate::{
    handle::Handle,
    heap::{Heap, Payload},
    resource::ResourceTracker,
};

/// Heap payload owning a spawned thread's join handle.
#[derive(Debug)]
pub struct ThreadCell {
    join: Option<JoinHandle<()>>,
}

impl ThreadCell {
    /// Returns `true` once the routine has returned (or after a join).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Blocks until the routine returns.
    ///
    /// Returns `false` if the routine panicked. Joining an already-joined
    /// cell returns `true` immediately.
    pub fn join(&mut self) -> bool {
        match self.join.take() {
            Some(join) => join.join().is_ok(),
            None => true,
        }
    }
}

impl Payload for ThreadCell {}

/// Spawns a detached-by-default thread running `routine` and returns the
/// counted handle to its cell.
pub fn spawn<R: ResourceTracker>(heap: &mut Heap<ThreadCell, R>, routine: impl FnOnce() + Send + 'static) -> Handle {
    let join = thread::spawn(routine);
    heap.alloc(ThreadCell { join: Some(join) })
}
