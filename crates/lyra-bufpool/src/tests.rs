use std::{sync::Arc, thread};

use rstest::rstest;

use super::*;

fn small_pool() -> Allocator {
    Allocator::new(AllocatorOptions {
        individual_allocation_length: 1024,
        ..Default::default()
    })
}

#[test]
fn test_allocate_counts_bytes() {
    let pool = small_pool();
    let a = pool.allocate();
    let b = pool.allocate();
    assert_eq!(a.len(), 1024);
    assert_eq!(pool.total_bytes_allocated(), 2048);
    pool.release(a);
    assert_eq!(pool.total_bytes_allocated(), 1024);
    drop(b);
    assert_eq!(pool.total_bytes_allocated(), 0);
}

#[test]
fn test_released_block_is_reused() {
    let pool = small_pool();
    let mut block = pool.allocate();
    block[0] = 42;
    pool.release(block);
    assert_eq!(pool.spare_count(), 1);

    let block = pool.allocate();
    assert_eq!(block[0], 42);
    assert_eq!(pool.spare_count(), 0);
}

#[test]
fn test_initial_allocation_count_prefills_spares() {
    let pool = Allocator::new(AllocatorOptions {
        individual_allocation_length: 16,
        initial_allocation_count: 4,
        trim_on_reset: true,
    });
    assert_eq!(pool.spare_count(), 4);
    assert_eq!(pool.total_bytes_allocated(), 0);
}

#[test]
fn test_release_run_returns_all() {
    let pool = small_pool();
    let run: Vec<_> = (0..5).map(|_| pool.allocate()).collect();
    assert_eq!(pool.total_bytes_allocated(), 5 * 1024);
    pool.release_run(run);
    assert_eq!(pool.total_bytes_allocated(), 0);
    assert_eq!(pool.spare_count(), 5);
}

#[rstest]
#[case::keeps_rounded_up_target(2500, 0, 3)]
#[case::outstanding_blocks_count_against_target(2500, 2, 1)]
#[case::zero_target_drops_everything(0, 0, 0)]
#[case::target_below_outstanding(1024, 3, 0)]
fn test_trim_keeps_target_spares(
    #[case] target: u64,
    #[case] outstanding: usize,
    #[case] expected_spares: usize,
) {
    let pool = small_pool();
    let spares: Vec<_> = (0..6).map(|_| pool.allocate()).collect();
    let held: Vec<_> = (0..outstanding).map(|_| pool.allocate()).collect();
    pool.release_run(spares);
    assert_eq!(pool.spare_count(), 6);

    // Raising from unset does not trim on its own.
    pool.set_target_buffer_size(u64::MAX);
    pool.set_target_buffer_size(target);
    pool.trim();

    assert_eq!(pool.spare_count(), expected_spares);
    assert_eq!(pool.total_bytes_allocated(), outstanding as u64 * 1024);
    drop(held);
}

#[test]
fn test_raising_target_does_not_trim() {
    let pool = small_pool();
    pool.set_target_buffer_size(1024);
    let run: Vec<_> = (0..4).map(|_| pool.allocate()).collect();
    pool.set_target_buffer_size(10 * 1024);
    pool.release_run(run);
    assert_eq!(pool.spare_count(), 4);
}

#[test]
fn test_release_beyond_target_drops_block() {
    let pool = small_pool();
    pool.set_target_buffer_size(1024);
    let a = pool.allocate();
    let b = pool.allocate();
    pool.release(a);
    pool.release(b);
    assert_eq!(pool.spare_count(), 1);
}

#[rstest]
#[case::trim_on_reset(true, 0)]
#[case::keep_on_reset(false, 3)]
fn test_reset(#[case] trim_on_reset: bool, #[case] expected_spares: usize) {
    let pool = Allocator::new(AllocatorOptions {
        individual_allocation_length: 64,
        initial_allocation_count: 3,
        trim_on_reset,
    });
    pool.reset();
    assert_eq!(pool.spare_count(), expected_spares);
}

#[test]
#[should_panic(expected = "released to pool")]
fn test_foreign_release_panics() {
    let a = small_pool();
    let b = small_pool();
    let block = a.allocate();
    b.release(block);
}

#[test]
fn test_clone_shares_pool() {
    let pool = small_pool();
    let handle = pool.clone();
    let block = handle.allocate();
    assert_eq!(pool.total_bytes_allocated(), 1024);
    pool.release(block);
    assert_eq!(handle.total_bytes_allocated(), 0);
}

#[test]
fn test_concurrent_allocate_release_conserves_bytes() {
    let pool = Arc::new(small_pool());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for _ in 0..200 {
                    let run: Vec<_> = (0..3).map(|_| pool.allocate()).collect();
                    pool.release_run(run);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker thread");
    }
    assert_eq!(pool.total_bytes_allocated(), 0);
}
