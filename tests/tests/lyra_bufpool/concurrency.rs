//! One pool shared by loader threads and the control thread.

use std::{sync::Barrier, thread};

use lyra_bufpool::{Allocator, AllocatorOptions};
use rstest::rstest;

#[rstest]
#[case::single_releases(false)]
#[case::run_releases(true)]
fn test_blocks_are_conserved_across_threads(#[case] as_run: bool) {
    let allocator = Allocator::new(AllocatorOptions {
        individual_allocation_length: 512,
        initial_allocation_count: 8,
        ..AllocatorOptions::default()
    });
    let workers = 4;
    let barrier = Barrier::new(workers);

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                barrier.wait();
                for round in 0..50 {
                    let blocks: Vec<_> = (0..1 + round % 7).map(|_| allocator.allocate()).collect();
                    assert!(blocks.iter().all(|block| block.len() == 512));
                    if as_run {
                        allocator.release_run(blocks);
                    } else {
                        for block in blocks {
                            allocator.release(block);
                        }
                    }
                }
            });
        }
    });

    assert_eq!(allocator.total_bytes_allocated(), 0);
    let spare = allocator.spare_count();
    assert!(spare >= 8);

    allocator.set_target_buffer_size(4 * 512);
    assert_eq!(allocator.spare_count(), 4);
    allocator.reset();
    assert_eq!(allocator.spare_count(), 0);
}
