use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::Allocation;

/// Default block length: 64 KiB.
pub const DEFAULT_ALLOCATION_LENGTH: usize = 64 * 1024;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

/// Construction options for [`Allocator`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorOptions {
    /// Length of every block in bytes.
    pub individual_allocation_length: usize,
    /// Blocks created up front and kept as spares.
    pub initial_allocation_count: usize,
    /// Whether [`Allocator::reset`] drops the spare pool back to zero target.
    pub trim_on_reset: bool,
}

impl Default for AllocatorOptions {
    fn default() -> Self {
        Self {
            individual_allocation_length: DEFAULT_ALLOCATION_LENGTH,
            initial_allocation_count: 0,
            trim_on_reset: true,
        }
    }
}

struct PoolState {
    spare: Vec<Box<[u8]>>,
    /// Blocks currently held outside the pool.
    allocated: usize,
    /// Bytes the owner intends to buffer. `None` until first set.
    target_bytes: Option<u64>,
}

impl PoolState {
    /// Spare blocks worth keeping given the target and the outstanding count.
    fn target_available(&self, block_len: usize) -> Option<usize> {
        self.target_bytes.map(|target| {
            let target_blocks = target.div_ceil(block_len as u64) as usize;
            target_blocks.saturating_sub(self.allocated)
        })
    }

    fn trim(&mut self, block_len: usize) -> usize {
        let keep = self.target_available(block_len).unwrap_or(0);
        if keep >= self.spare.len() {
            return 0;
        }
        let dropped = self.spare.len() - keep;
        self.spare.truncate(keep);
        dropped
    }
}

pub(crate) struct PoolShared {
    pub(crate) id: u64,
    block_len: usize,
    trim_on_reset: bool,
    state: Mutex<PoolState>,
}

impl PoolShared {
    /// Accept a returned block. Spares beyond the target are dropped.
    pub(crate) fn put(&self, block: Box<[u8]>) {
        let mut state = self.state.lock();
        Self::put_locked(&mut state, self.block_len, block);
    }

    fn put_locked(state: &mut PoolState, block_len: usize, block: Box<[u8]>) {
        state.allocated = state.allocated.saturating_sub(1);
        match state.target_available(block_len) {
            Some(keep) if state.spare.len() >= keep => {}
            _ => state.spare.push(block),
        }
    }
}

/// Session-wide pool of fixed-size [`Allocation`] blocks.
///
/// Cloning yields another handle to the same pool. All methods are safe to
/// call from any thread.
#[derive(Clone)]
pub struct Allocator {
    inner: Arc<PoolShared>,
}

impl Allocator {
    pub fn new(options: AllocatorOptions) -> Self {
        let block_len = options.individual_allocation_length.max(1);
        let spare = (0..options.initial_allocation_count)
            .map(|_| vec![0u8; block_len].into_boxed_slice())
            .collect();
        Self {
            inner: Arc::new(PoolShared {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                block_len,
                trim_on_reset: options.trim_on_reset,
                state: Mutex::new(PoolState {
                    spare,
                    allocated: 0,
                    target_bytes: None,
                }),
            }),
        }
    }

    /// Take a block, reusing a spare when one is available.
    ///
    /// Reused blocks keep their previous contents.
    pub fn allocate(&self) -> Allocation {
        let block = {
            let mut state = self.inner.state.lock();
            state.allocated += 1;
            state.spare.pop()
        };
        let block = block.unwrap_or_else(|| vec![0u8; self.inner.block_len].into_boxed_slice());
        Allocation {
            block: Some(block),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Return one block to the pool.
    ///
    /// # Panics
    ///
    /// Panics if `allocation` was created by a different allocator.
    pub fn release(&self, allocation: Allocation) {
        self.assert_owned(&allocation);
        drop(allocation);
    }

    /// Return a run of blocks under a single lock.
    ///
    /// # Panics
    ///
    /// Panics if any block was created by a different allocator. No block of
    /// the run is returned in that case.
    pub fn release_run(&self, allocations: Vec<Allocation>) {
        for allocation in &allocations {
            self.assert_owned(allocation);
        }
        let mut state = self.inner.state.lock();
        for mut allocation in allocations {
            if let Some(block) = allocation.block.take() {
                PoolShared::put_locked(&mut state, self.inner.block_len, block);
            }
        }
    }

    /// Bytes currently held outside the pool.
    pub fn total_bytes_allocated(&self) -> u64 {
        let allocated = self.inner.state.lock().allocated;
        allocated as u64 * self.inner.block_len as u64
    }

    pub fn individual_allocation_length(&self) -> usize {
        self.inner.block_len
    }

    /// Spare blocks ready for reuse.
    pub fn spare_count(&self) -> usize {
        self.inner.state.lock().spare.len()
    }

    /// Set the intended buffer size. Reducing it trims spares immediately.
    pub fn set_target_buffer_size(&self, bytes: u64) {
        let mut state = self.inner.state.lock();
        let reduced = state.target_bytes.is_none_or(|old| bytes < old);
        state.target_bytes = Some(bytes);
        if reduced {
            let dropped = state.trim(self.inner.block_len);
            if dropped > 0 {
                trace!(pool = self.inner.id, bytes, dropped, "target reduced, spares trimmed");
            }
        }
    }

    /// Drop spares beyond what the current target needs.
    pub fn trim(&self) {
        let mut state = self.inner.state.lock();
        let dropped = state.trim(self.inner.block_len);
        if dropped > 0 {
            trace!(pool = self.inner.id, dropped, remaining = state.spare.len(), "spares trimmed");
        }
    }

    /// Forget the buffering target. With `trim_on_reset` the target becomes
    /// zero and all spares are dropped.
    pub fn reset(&self) {
        if self.inner.trim_on_reset {
            self.set_target_buffer_size(0);
        }
    }

    fn assert_owned(&self, allocation: &Allocation) {
        assert!(
            allocation.belongs_to(&self.inner),
            "allocation from pool {} released to pool {}",
            allocation.pool.id,
            self.inner.id
        );
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new(AllocatorOptions::default())
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Allocator")
            .field("id", &self.inner.id)
            .field("block_len", &self.inner.block_len)
            .field("allocated", &state.allocated)
            .field("spare", &state.spare.len())
            .field("target_bytes", &state.target_bytes)
            .finish()
    }
}
