//! Heap consistency diagnostics.
//!
//! [`Heap::check`] walks every structure the allocator maintains and reports
//! the first invariant violation it finds. It exists for tests and debugging
//! sessions — the allocator itself never calls it, and a heap driven only
//! through the public API should never fail it.

use arena::Region;
use snafu::{Location, Snafu};

use crate::{
    free_list,
    heap::Heap,
    tag::{self, ALIGN, Block, MIN_BLOCK, OVERHEAD, Tag, WORD},
};

/// An invariant violation found by [`Heap::check`].
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum CheckError {
    /// The prologue sentinel's tags are damaged.
    #[snafu(display("prologue sentinel is damaged"))]
    BadPrologue {
        #[snafu(implicit)]
        location: Location,
    },
    /// A zero-size block that is not an allocated sentinel at the heap end.
    #[snafu(display("bad epilogue sentinel at offset {block}"))]
    BadEpilogue {
        block: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// A block extends past the end of the managed region.
    #[snafu(display("block at offset {block} runs past the end of the heap"))]
    BlockOutOfBounds {
        block: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// A block's size is misaligned or below the minimum.
    #[snafu(display("block at offset {block} has invalid size {size}"))]
    BadBlockSize {
        block: usize,
        size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// A block's header and footer tags disagree.
    #[snafu(display("header and footer disagree for block at offset {block}"))]
    TagMismatch {
        block: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// Two physically adjacent blocks are both free.
    #[snafu(display("adjacent free blocks at offsets {block} and {next}"))]
    UncoalescedBlocks {
        block: usize,
        next: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// A free block on the heap is missing from the free list.
    #[snafu(display("free block at offset {block} is not on the free list"))]
    NotOnFreeList {
        block: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// A free-list entry is out of bounds or marked allocated.
    #[snafu(display("free list entry at offset {block} is not a free block"))]
    BadFreeListEntry {
        block: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// A node's `prev_free` does not point at its list predecessor.
    #[snafu(display("broken back-link at free list entry {block}"))]
    BrokenBackLink {
        block: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// The list tail does not match the last node reached from the head.
    #[snafu(display("free list head/tail endpoints are inconsistent"))]
    BrokenListEnds {
        #[snafu(implicit)]
        location: Location,
    },
    /// A list traversal visited more nodes than the heap can hold.
    #[snafu(display("free list does not terminate"))]
    FreeListCycle {
        #[snafu(implicit)]
        location: Location,
    },
    /// The list length differs from the number of free blocks on the heap.
    #[snafu(display("free list has {found} entries but the heap has {expected} free blocks"))]
    ListLengthMismatch {
        expected: usize,
        found: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

impl<R: Region> Heap<R> {
    /// Verifies every heap and free-list invariant, returning the first
    /// violation found.
    ///
    /// Checks, in order: free-list structure (bounds, allocated bits,
    /// bidirectional links, termination both ways), then a full block walk
    /// from prologue to epilogue (tag symmetry, size validity, coalescing
    /// maximality, and membership: a non-sentinel block is on the free list
    /// exactly when its allocated bit is clear).
    ///
    /// This is a diagnostic: it is never run as part of an allocator
    /// operation.
    pub fn check(&self) -> Result<(), CheckError> {
        let (bytes, free) = self.parts();

        // Upper bound on how many blocks the region can hold; any list
        // traversal that exceeds it is cycling.
        let max_blocks = bytes.len() / MIN_BLOCK + 1;

        // Free-list structure first, so the block walk below can safely
        // search the list for membership.
        let mut list_len = 0_usize;
        let mut prev = None;
        let mut cursor = free.head();
        while let Some(block) = cursor {
            if list_len == max_blocks {
                return FreeListCycleSnafu.fail();
            }
            list_len += 1;
            if block.0 < WORD || block.0 + MIN_BLOCK > bytes.len() {
                return BadFreeListEntrySnafu { block: block.0 }.fail();
            }
            if tag::header(bytes, block).is_allocated() {
                return BadFreeListEntrySnafu { block: block.0 }.fail();
            }
            if free_list::prev_free(bytes, block) != prev {
                return BrokenBackLinkSnafu { block: block.0 }.fail();
            }
            prev = Some(block);
            cursor = free_list::next_free(bytes, block);
        }
        if free.tail() != prev {
            return BrokenListEndsSnafu.fail();
        }

        let mut walked_back = 0_usize;
        let mut cursor = free.tail();
        while let Some(block) = cursor {
            if walked_back == max_blocks {
                return FreeListCycleSnafu.fail();
            }
            walked_back += 1;
            cursor = free_list::prev_free(bytes, block);
        }
        if walked_back != list_len {
            return ListLengthMismatchSnafu {
                expected: list_len,
                found: walked_back,
            }
            .fail();
        }

        // Block walk: prologue, then every block up to the epilogue.
        let prologue = Block(WORD);
        let expected = Tag::new(OVERHEAD, true);
        if tag::header(bytes, prologue) != expected || tag::footer(bytes, prologue) != expected {
            return BadPrologueSnafu.fail();
        }

        let mut free_count = 0_usize;
        let mut block = tag::next_block(bytes, prologue);
        loop {
            if block.0 + WORD > bytes.len() {
                return BlockOutOfBoundsSnafu { block: block.0 }.fail();
            }
            let header = tag::header(bytes, block);
            let size = header.size();
            if size == 0 {
                // The epilogue: allocated, and flush with the region end.
                if !header.is_allocated() || block.0 + WORD != bytes.len() {
                    return BadEpilogueSnafu { block: block.0 }.fail();
                }
                break;
            }
            if !size.is_multiple_of(ALIGN) || size < MIN_BLOCK {
                return BadBlockSizeSnafu {
                    block: block.0,
                    size,
                }
                .fail();
            }
            if block.0 + size + WORD > bytes.len() {
                return BlockOutOfBoundsSnafu { block: block.0 }.fail();
            }
            if tag::footer(bytes, block) != header {
                return TagMismatchSnafu { block: block.0 }.fail();
            }
            if !header.is_allocated() {
                free_count += 1;
                if !free.iter(bytes).any(|entry| entry == block) {
                    return NotOnFreeListSnafu { block: block.0 }.fail();
                }
                let next = tag::next_block(bytes, block);
                if !tag::header(bytes, next).is_allocated() {
                    return UncoalescedBlocksSnafu {
                        block: block.0,
                        next: next.0,
                    }
                    .fail();
                }
            }
            block = tag::next_block(bytes, block);
        }

        if free_count != list_len {
            return ListLengthMismatchSnafu {
                expected: free_count,
                found: list_len,
            }
            .fail();
        }
        Ok(())
    }
}
