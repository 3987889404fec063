//! Explicit free-list heap allocator with boundary tags.
//!
//! This crate manages a single contiguous, growable address range — an
//! [`arena::Region`] — and services allocate/release/resize requests against
//! it, the way a language runtime's heap allocator would. All addresses are
//! byte offsets into the region, so the allocator is entirely safe code and
//! several independent heaps can coexist in one process.
//!
//! # Algorithm
//!
//! - **Boundary tags**: every block stores a size/allocated tag word at both
//!   ends, so the heap can be walked in either direction with no external
//!   metadata.
//! - **Explicit free list**: free blocks are threaded onto a doubly-linked
//!   list through link words kept in their payload area; allocation is a
//!   **first-fit** scan of that list.
//! - **Immediate coalescing**: a released block merges with free physical
//!   neighbors on the spot, so no two adjacent free blocks ever exist.
//! - **Asymmetric splitting**: when a free block is split, large requests
//!   take its high end and small requests its low end, which keeps big
//!   allocations away from the densely recycled low addresses.
//! - **Growth on demand**: when nothing on the free list fits, the region
//!   grows by exactly the shortfall and the fresh space is folded in as one
//!   free block.
//!
//! # Memory Layout
//!
//! ```text
//! heap:   ┌─────┬──────────┬─────────┬─────────┬─────┬──────────┐
//!         │ pad │ prologue │ block   │ block   │ ... │ epilogue │
//!         └─────┴──────────┴─────────┴─────────┴─────┴──────────┘
//!
//! block:  ┌────────┬──────────────────────────────────┬────────┐
//!         │ header │ payload                          │ footer │
//!         │ size|a │ (prev_free, next_free when free) │ size|a │
//!         └────────┴──────────────────────────────────┴────────┘
//! ```
//!
//! The prologue and epilogue are zero-payload allocated sentinels, so every
//! real block has a physical neighbor on both sides and the coalescer never
//! needs a boundary case.
//!
//! # Usage
//!
//! ```
//! use arena::Arena;
//! use heap::Heap;
//!
//! let mut heap = Heap::new(Arena::new()).unwrap();
//!
//! let p = heap.allocate(64).unwrap().unwrap();
//! heap.payload_mut(p)[..11].copy_from_slice(b"hello world");
//! assert_eq!(&heap.payload(p)[..11], b"hello world");
//!
//! // Growing keeps the content, moving the payload only when it must.
//! let p = heap.resize(Some(p), 256).unwrap().unwrap();
//! assert_eq!(&heap.payload(p)[..11], b"hello world");
//!
//! heap.release(p);
//! ```
//!
//! # Concurrency
//!
//! Operations are strictly sequential. A [`Heap`] owns all of its state and
//! is `Send` when its region is; sharing one across threads requires a
//! single lock around every operation.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod check;
mod free_list;
mod heap;
mod tag;

pub use self::{
    check::CheckError,
    heap::{Heap, HeapOptions, OutOfMemory, Payload},
    tag::ALIGN,
};
