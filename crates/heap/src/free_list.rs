//! Explicit doubly-linked list of free blocks.
//!
//! Free blocks are threaded together through two link words overlaid on the
//! space that serves as payload while a block is allocated: `prev_free` in
//! the first payload word, `next_free` in the second. The links are only
//! meaningful while the block's allocated bit is clear; the allocator
//! rewrites them before a block is ever handed back to a client.
//!
//! The list is unordered — blocks appear wherever [`FreeList::prepend`] or
//! [`FreeList::append`] put them, independent of heap address order. Links
//! store the target block's header offset as a raw word, with 0 (the heap's
//! padding word, never a block) standing in for "none".

use crate::tag::{Block, WORD, load_word, store_word};

/// Byte offset of the `prev_free` link within a free block.
const PREV_FREE: usize = WORD;

/// Byte offset of the `next_free` link within a free block.
const NEXT_FREE: usize = 2 * WORD;

#[expect(clippy::cast_possible_truncation)]
fn encode(link: Option<Block>) -> u32 {
    link.map_or(0, |block| block.0 as u32)
}

fn decode(raw: u32) -> Option<Block> {
    (raw != 0).then(|| Block(raw as usize))
}

/// The previous free block in list order, if any.
pub(crate) fn prev_free(bytes: &[u8], block: Block) -> Option<Block> {
    decode(load_word(bytes, block.0 + PREV_FREE))
}

/// The next free block in list order, if any.
pub(crate) fn next_free(bytes: &[u8], block: Block) -> Option<Block> {
    decode(load_word(bytes, block.0 + NEXT_FREE))
}

fn set_prev_free(bytes: &mut [u8], block: Block, link: Option<Block>) {
    store_word(bytes, block.0 + PREV_FREE, encode(link));
}

fn set_next_free(bytes: &mut [u8], block: Block, link: Option<Block>) {
    store_word(bytes, block.0 + NEXT_FREE, encode(link));
}

/// Head and tail of the free-block list.
///
/// The endpoints live here; everything between them lives in the link words
/// of the free blocks themselves, so every operation takes the region bytes
/// alongside the block to work on. All three mutators are O(1) and keep the
/// doubly-linked invariant: the head has no `prev_free`, the tail has no
/// `next_free`, and following `next_free` from the head visits exactly the
/// blocks whose `prev_free` chain leads back from the tail.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
    head: Option<Block>,
    tail: Option<Block>,
}

impl FreeList {
    pub(crate) fn head(&self) -> Option<Block> {
        self.head
    }

    pub(crate) fn tail(&self) -> Option<Block> {
        self.tail
    }

    /// Inserts `block` at the front of the list.
    ///
    /// The allocator's current policy inserts at the tail everywhere, so
    /// this is the other half of the insertion API, kept for head-insertion
    /// policies and exercised by the tests.
    #[cfg_attr(not(test), expect(dead_code))]
    pub(crate) fn prepend(&mut self, bytes: &mut [u8], block: Block) {
        set_prev_free(bytes, block, None);
        set_next_free(bytes, block, self.head);
        match self.head {
            Some(head) => set_prev_free(bytes, head, Some(block)),
            None => self.tail = Some(block),
        }
        self.head = Some(block);
    }

    /// Inserts `block` at the back of the list.
    pub(crate) fn append(&mut self, bytes: &mut [u8], block: Block) {
        set_next_free(bytes, block, None);
        set_prev_free(bytes, block, self.tail);
        match self.tail {
            Some(tail) => set_next_free(bytes, tail, Some(block)),
            None => self.head = Some(block),
        }
        self.tail = Some(block);
    }

    /// Unlinks `block`, which must currently be on the list.
    pub(crate) fn remove(&mut self, bytes: &mut [u8], block: Block) {
        let prev = prev_free(bytes, block);
        let next = next_free(bytes, block);
        match prev {
            Some(prev) => set_next_free(bytes, prev, next),
            None => {
                debug_assert_eq!(self.head, Some(block));
                self.head = next;
            }
        }
        match next {
            Some(next) => set_prev_free(bytes, next, prev),
            None => {
                debug_assert_eq!(self.tail, Some(block));
                self.tail = prev;
            }
        }
    }

    /// Iterates the list front to back.
    pub(crate) fn iter<'a>(&self, bytes: &'a [u8]) -> Iter<'a> {
        Iter {
            bytes,
            next: self.head,
        }
    }
}

pub(crate) struct Iter<'a> {
    bytes: &'a [u8],
    next: Option<Block>,
}

impl Iterator for Iter<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = self.next?;
        self.next = next_free(self.bytes, block);
        Some(block)
    }
}
