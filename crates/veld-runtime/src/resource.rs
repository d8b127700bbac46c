use std::fmt;

/// Error returned when a resource limit is exceeded during allocation.
///
/// This is the one sanctioned result-returning surface of the substrate:
/// hosts that embed a heap behind [`Heap::try_alloc`](crate::Heap::try_alloc)
/// receive this error, while generated code goes through
/// [`Heap::alloc`](crate::Heap::alloc) and gets the allocation-failure fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum number of live allocations exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum heap memory usage exceeded.
    Memory { limit: usize, used: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} > {limit}")
            }
            Self::Memory { limit, used } => {
                write!(f, "memory limit exceeded: {used} bytes > {limit} bytes")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// Trait for tracking heap resource usage.
///
/// Implementations can enforce limits on allocation count and memory usage.
/// The heap consults the tracker before every allocation and notifies it of
/// every free, so a tracker observes the exact live set.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each heap allocation.
    ///
    /// Returns `Ok(())` if the allocation should proceed, or
    /// `Err(ResourceError)` if a limit would be exceeded. `get_size` is only
    /// invoked when the tracker actually needs a size estimate, keeping the
    /// unlimited tracker free of overhead.
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError>;

    /// Called when a cell is freed.
    fn on_free(&mut self, get_size: impl FnOnce() -> usize);

    /// Returns the number of live allocations, if this tracker records them.
    ///
    /// `LimitedTracker` returns `Some(count)`; `NoLimitTracker` returns `None`.
    fn allocation_count(&self) -> Option<usize> {
        None
    }

    /// Returns the current approximate memory usage in bytes, if tracked.
    fn current_memory_bytes(&self) -> Option<usize> {
        None
    }
}

/// A tracker that imposes no limits and records nothing.
///
/// This is the default for heaps owned by generated code; every hook
/// compiles down to a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, _get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn on_free(&mut self, _get_size: impl FnOnce() -> usize) {}
}

/// Configuration for resource limits.
///
/// All limits are optional - set to `None` to disable a specific limit.
/// Use `ResourceLimits::default()` for no limits, or build custom limits
/// with the builder pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of live heap allocations allowed.
    pub max_allocations: Option<usize>,
    /// Maximum heap memory in bytes (approximate).
    pub max_memory: Option<usize>,
}

impl ResourceLimits {
    /// Creates a new `ResourceLimits` with all limits disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of live allocations.
    #[must_use]
    pub fn max_allocations(mut self, limit: usize) -> Self {
        self.max_allocations = Some(limit);
        self
    }

    /// Sets the maximum memory usage in bytes.
    #[must_use]
    pub fn max_memory(mut self, limit: usize) -> Self {
        self.max_memory = Some(limit);
        self
    }
}

/// A resource tracker that enforces configurable limits.
///
/// Tracks the live allocation count and approximate memory usage, refusing
/// allocations that would exceed a configured limit. The refusal surfaces as
/// the allocation-failure fault through `Heap::alloc`, or as a
/// [`ResourceError`] through `Heap::try_alloc`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    /// Number of live allocations (allocated minus freed).
    allocation_count: usize,
    /// Current approximate memory usage in bytes.
    current_memory: usize,
}

impl LimitedTracker {
    /// Creates a new `LimitedTracker` with the given limits.
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            allocation_count: 0,
            current_memory: 0,
        }
    }

    /// Returns the current live allocation count.
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.allocation_count
    }

    /// Returns the current approximate memory usage.
    #[must_use]
    pub fn current_memory(&self) -> usize {
        self.current_memory
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_allocations
            && self.allocation_count >= max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.allocation_count + 1,
            });
        }

        let size = get_size();
        if let Some(max) = self.limits.max_memory {
            let new_memory = self.current_memory + size;
            if new_memory > max {
                return Err(ResourceError::Memory {
                    limit: max,
                    used: new_memory,
                });
            }
        }

        self.allocation_count += 1;
        self.current_memory += size;
        Ok(())
    }

    fn on_free(&mut self, get_size: impl FnOnce() -> usize) {
        self.allocation_count = self.allocation_count.saturating_sub(1);
        self.current_memory = self.current_memory.saturating_sub(get_size());
    }

    fn allocation_count(&self) -> Option<usize> {
        Some(self.allocation_count)
    }

    fn current_memory_bytes(&self) -> Option<usize> {
        Some(self.current_memory)
    }
}
