#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))]
#![cfg(test)]

use arena::Arena;
use heap::{Heap, HeapOptions};

#[test]
fn allocator_lifecycle_with_interleaved_releases() {
    let mut heap = Heap::new(Arena::new()).unwrap();
    let mut live = Vec::new();
    let mut stamp = 0_u8;

    for _round in 0..4 {
        for step in 0..8_usize {
            let size = 8 + step * 24;
            stamp = stamp.wrapping_add(1);
            let payload = heap.allocate(size).unwrap().unwrap();
            heap.payload_mut(payload)[..size].fill(stamp);
            heap.check().unwrap();
            live.push((payload, size, stamp));
        }

        // Release every other allocation to churn the free list.
        let mut keep = true;
        live.retain(|&(payload, ..)| {
            keep = !keep;
            if keep {
                heap.release(payload);
            }
            !keep
        });
        heap.check().unwrap();
    }

    // Whatever survived the churn still holds its own stamp.
    for &(payload, size, stamp) in &live {
        assert!(heap.payload(payload)[..size].iter().all(|&b| b == stamp));
    }

    for (payload, ..) in live {
        heap.release(payload);
        heap.check().unwrap();
    }
}

#[test]
fn exhaustion_and_reuse_under_a_hard_limit() {
    let options = HeapOptions {
        initial_reserve: 0,
        ..HeapOptions::default()
    };
    let mut heap = Heap::with_options(Arena::with_limit(1024), options).unwrap();

    let mut live = Vec::new();
    loop {
        match heap.allocate(64) {
            Ok(Some(payload)) => {
                heap.check().unwrap();
                live.push(payload);
            }
            Ok(None) => unreachable!("a 64-byte request never yields no block"),
            Err(_) => break,
        }
    }
    let rounds = live.len();
    assert!(rounds > 0, "the limit allows at least one allocation");

    for payload in live.drain(..) {
        heap.release(payload);
    }
    heap.check().unwrap();
    assert_eq!(heap.free_blocks(), 1, "released blocks coalesced into one");

    // The reclaimed space serves the same run again without growing.
    let before = heap.managed_bytes();
    for _ in 0..rounds {
        live.push(heap.allocate(64).unwrap().unwrap());
    }
    heap.check().unwrap();
    assert_eq!(heap.managed_bytes(), before);
}

#[test]
fn resize_round_trip_preserves_content() {
    let mut heap = Heap::new(Arena::new()).unwrap();

    let payload = heap.resize(None, 32).unwrap().unwrap();
    let pattern: Vec<u8> = (0..32).collect();
    heap.payload_mut(payload)[..32].copy_from_slice(&pattern);

    let grown = heap.resize(Some(payload), 300).unwrap().unwrap();
    heap.check().unwrap();
    assert_eq!(&heap.payload(grown)[..32], pattern.as_slice());

    let shrunk = heap.resize(Some(grown), 8).unwrap().unwrap();
    heap.check().unwrap();
    assert_eq!(&heap.payload(shrunk)[..8], &pattern[..8]);

    assert_eq!(heap.resize(Some(shrunk), 0).unwrap(), None);
    heap.check().unwrap();
}
