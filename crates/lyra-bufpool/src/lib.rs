//! Fixed-size allocation pool for sample data.
//!
//! One [`Allocator`] exists per playback session. Loaders write incoming sample
//! bytes into [`Allocation`] blocks taken from it, sample queues hold those
//! blocks until the samples are consumed or discarded, and the load control
//! reads the outstanding byte count to decide whether to keep loading.
//!
//! ## Ownership
//!
//! - **Move-only**: an `Allocation` is owned by exactly one holder at a time
//! - **RAII**: dropping an `Allocation` returns it to the pool it came from
//! - **Explicit release**: [`Allocator::release`] and [`Allocator::release_run`]
//!   return blocks eagerly; handing a block to a pool that did not create it panics
//! - **Thread-safe**: all pool state sits behind one mutex, so loader threads can
//!   allocate while the control thread releases
//!
//! ## Example
//!
//! ```
//! use lyra_bufpool::{Allocator, AllocatorOptions};
//!
//! let allocator = Allocator::new(AllocatorOptions {
//!     individual_allocation_length: 1024,
//!     ..Default::default()
//! });
//!
//! let mut block = allocator.allocate();
//! block[..5].copy_from_slice(b"hello");
//! assert_eq!(allocator.total_bytes_allocated(), 1024);
//!
//! allocator.release(block);
//! assert_eq!(allocator.total_bytes_allocated(), 0);
//! ```

#![forbid(unsafe_code)]

mod allocation;
mod allocator;

pub use allocation::Allocation;
pub use allocator::{Allocator, AllocatorOptions, DEFAULT_ALLOCATION_LENGTH};

#[cfg(test)]
mod tests;
