use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use crate::allocator::PoolShared;

/// One fixed-size block handed out by an [`Allocator`](crate::Allocator).
///
/// Returned to its pool on drop or through an explicit release.
pub struct Allocation {
    pub(crate) block: Option<Box<[u8]>>,
    pub(crate) pool: Arc<PoolShared>,
}

impl Allocation {
    /// Block length in bytes.
    pub fn len(&self) -> usize {
        self.block.as_ref().map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `self` was created by the pool behind `pool`.
    pub(crate) fn belongs_to(&self, pool: &Arc<PoolShared>) -> bool {
        Arc::ptr_eq(&self.pool, pool)
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.pool.put(block);
        }
    }
}

impl Deref for Allocation {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.block.as_deref().unwrap_or_default()
    }
}

impl DerefMut for Allocation {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.block.as_deref_mut().unwrap_or_default()
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("len", &self.len())
            .field("pool", &self.pool.id)
            .finish()
    }
}
