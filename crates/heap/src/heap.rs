//! The allocator: fit-finding, placement, coalescing, and heap growth.

use arena::{Region, RegionFull};
use snafu::{Location, ResultExt as _, Snafu};

use crate::{
    free_list::FreeList,
    tag::{self, ALIGN, Block, MAX_HEAP, MIN_BLOCK, OVERHEAD, Tag, WORD},
};

/// The heap's first block: an allocated sentinel that is never released, so
/// no real block ever needs a physical predecessor. Offset 0 is an alignment
/// padding word, which keeps payloads on [`ALIGN`] boundaries.
const PROLOGUE: Block = Block(WORD);

/// The heap could not grow to satisfy a request.
///
/// Raised by [`Heap::new`], [`Heap::allocate`], and [`Heap::resize`]. A
/// failed growth never changes the heap: every block, tag, and free-list
/// entry is exactly as it was before the attempt.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum OutOfMemory {
    /// The backing region refused to supply more bytes.
    #[snafu(display("heap cannot grow by {requested} bytes"))]
    RegionExhausted {
        requested: usize,
        source: RegionFull,
        #[snafu(implicit)]
        location: Location,
    },
    /// Growing would push the heap past what a tag word can describe.
    #[snafu(display("heap of {len} bytes cannot grow by {requested} more"))]
    AddressSpaceExhausted {
        requested: usize,
        len: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Policy knobs for a [`Heap`]. None of them affect correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapOptions {
    /// Free bytes to reserve up front, so early allocations don't each pay
    /// for a region growth. 0 builds a heap of bare sentinels.
    pub initial_reserve: usize,
    /// Block-size boundary of the split heuristic: requests above it are
    /// placed at the high end of a split block, requests at or below it at
    /// the low end. Keeping big blocks away from the low-address end eases
    /// fragmentation pressure where small allocations cluster.
    pub large_request: usize,
}

impl Default for HeapOptions {
    fn default() -> Self {
        Self {
            initial_reserve: 2048,
            large_request: 100,
        }
    }
}

/// A payload address handed out by [`Heap::allocate`].
///
/// Addresses are byte offsets into the heap's backing region, so they stay
/// valid across region growth. An address is live from the `allocate` (or
/// `resize`) call that returned it until it is passed to [`Heap::release`]
/// or relocated by [`Heap::resize`]; using it afterwards, or fabricating an
/// address that no call returned, violates the allocator's preconditions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Payload(usize);

impl Payload {
    /// The byte offset of the payload within the managed region.
    #[must_use]
    pub fn offset(self) -> usize {
        self.0
    }
}

/// An explicit free-list heap allocator over a growable [`Region`].
///
/// The managed region is a gapless run of blocks between two allocated
/// zero-payload sentinels (prologue and epilogue). Every block carries its
/// size and allocated state in a header word and an identical footer word;
/// free blocks are additionally threaded onto a doubly-linked free list
/// through link words stored in their payload area.
///
/// Allocation is first-fit over the free list with an asymmetric split
/// policy; release coalesces with both physical neighbors immediately, so
/// the heap never holds two adjacent free blocks. When no free block fits,
/// the region grows by exactly the shortfall.
///
/// All state lives in this object — no globals — so independent heaps can
/// coexist. Operations are strictly sequential; wrap the whole heap in a
/// lock if it must ever be shared.
#[derive(Debug)]
pub struct Heap<R: Region> {
    region: R,
    free: FreeList,
    large_request: usize,
}

impl<R: Region> Heap<R> {
    /// Builds a heap over `region` with default [`HeapOptions`].
    ///
    /// # Panics
    ///
    /// Panics if `region` is not empty; the heap lays its sentinels down at
    /// offset 0 and owns the region from then on.
    pub fn new(region: R) -> Result<Self, OutOfMemory> {
        Self::with_options(region, HeapOptions::default())
    }

    /// Builds a heap over `region` with explicit policy knobs.
    ///
    /// # Panics
    ///
    /// Panics if `region` is not empty.
    pub fn with_options(region: R, options: HeapOptions) -> Result<Self, OutOfMemory> {
        assert!(region.is_empty(), "heap requires an unused region");
        let mut heap = Self {
            region,
            free: FreeList::default(),
            large_request: options.large_request,
        };

        // Bootstrap layout: padding word (left zeroed, it doubles as the
        // null free-list link), allocated prologue, allocated zero-size
        // epilogue. The epilogue has no footer; nothing sits above it.
        heap.grow_region(2 * ALIGN)?;
        let bytes = heap.region.bytes_mut();
        tag::retag(bytes, PROLOGUE, OVERHEAD, true);
        tag::write_header(bytes, Block(3 * WORD), Tag::new(0, true));

        if options.initial_reserve > 0 {
            heap.extend(options.initial_reserve.next_multiple_of(ALIGN))?;
        }
        Ok(heap)
    }

    /// Allocates `size` bytes and returns the payload address.
    ///
    /// A zero `size` returns `None` without touching the heap. The payload
    /// holds at least `size` usable bytes ([`payload_len`](Self::payload_len)
    /// reports the exact figure) and is aligned to [`ALIGN`] — the region
    /// hands out zeroed space, but reused blocks keep whatever the previous
    /// owner left behind.
    pub fn allocate(&mut self, size: usize) -> Result<Option<Payload>, OutOfMemory> {
        if size == 0 {
            return Ok(None);
        }
        self.allocate_nonzero(size).map(Some)
    }

    /// Releases a live payload address.
    ///
    /// The block is merged with any free physical neighbors and returned to
    /// the free list. Releasing an address whose block is already free is a
    /// no-op, which makes an accidental double release harmless. Addresses
    /// this heap never handed out violate the contract documented on
    /// [`Payload`] and may panic.
    pub fn release(&mut self, payload: Payload) {
        let block = Block::from_payload(payload.offset());
        if !tag::header(self.region.bytes(), block).is_allocated() {
            return;
        }
        self.coalesce(block);
    }

    /// Resizes a live allocation, in place when possible.
    ///
    /// The composite contract:
    ///
    /// - `payload` of `None` behaves as [`allocate`](Self::allocate).
    /// - `size` of 0 behaves as [`release`](Self::release) and returns
    ///   `None`.
    /// - Shrinking keeps the address; the tail is carved off and coalesced
    ///   away unless the cut would leave an unusably small sliver, in which
    ///   case the block is simply kept whole.
    /// - Growing absorbs space in place when the block borders the epilogue
    ///   (the heap is extended by the shortfall) or a large-enough free
    ///   block; otherwise the payload moves: a fresh block is allocated,
    ///   the old content copied, and the old block released.
    pub fn resize(
        &mut self,
        payload: Option<Payload>,
        size: usize,
    ) -> Result<Option<Payload>, OutOfMemory> {
        let Some(payload) = payload else {
            return self.allocate(size);
        };
        if size == 0 {
            self.release(payload);
            return Ok(None);
        }
        if size > MAX_HEAP - OVERHEAD {
            return AddressSpaceExhaustedSnafu {
                requested: size,
                len: self.region.len(),
            }
            .fail();
        }

        let block = Block::from_payload(payload.offset());
        debug_assert!(
            tag::header(self.region.bytes(), block).is_allocated(),
            "resize of a released address"
        );
        let current = tag::header(self.region.bytes(), block).size();
        let required = required_block_size(size);

        if current >= required {
            let leftover = current - required;
            if leftover >= MIN_BLOCK {
                // Shrink in place and hand the tail to the coalescer.
                let bytes = self.region.bytes_mut();
                tag::retag(bytes, block, required, true);
                let tail = tag::next_block(bytes, block);
                tag::retag(bytes, tail, leftover, false);
                self.coalesce(tail);
            }
            return Ok(Some(payload));
        }

        let next = tag::next_block(self.region.bytes(), block);
        let next_tag = tag::header(self.region.bytes(), next);

        if next_tag.size() == 0 {
            // The block borders the epilogue: extend the heap and absorb
            // the new space. The absorbed block is taken from the
            // coalescer's return value, not from the stale `next`.
            let shortfall = (required - current).max(MIN_BLOCK);
            let grown = self.extend(shortfall)?;
            debug_assert_eq!(grown.0, block.0 + current);
            let merged = current + tag::header(self.region.bytes(), grown).size();
            self.free.remove(self.region.bytes_mut(), grown);
            tag::retag(self.region.bytes_mut(), block, merged, true);
            return Ok(Some(payload));
        }

        if !next_tag.is_allocated() && current + next_tag.size() >= required {
            // Absorb the free neighbor instead of growing the heap.
            self.free.remove(self.region.bytes_mut(), next);
            let merged = current + next_tag.size();
            let leftover = merged - required;
            if leftover >= MIN_BLOCK {
                let bytes = self.region.bytes_mut();
                tag::retag(bytes, block, required, true);
                let tail = tag::next_block(bytes, block);
                tag::retag(bytes, tail, leftover, false);
                self.coalesce(tail);
            } else {
                tag::retag(self.region.bytes_mut(), block, merged, true);
            }
            return Ok(Some(payload));
        }

        // No room in place: relocate.
        let moved = self.allocate_nonzero(size)?;
        let old_len = current - OVERHEAD;
        let copy = old_len.min(size);
        let bytes = self.region.bytes_mut();
        bytes.copy_within(payload.offset()..payload.offset() + copy, moved.offset());
        self.release(payload);
        Ok(Some(moved))
    }

    /// The usable bytes behind a live payload address.
    #[must_use]
    pub fn payload(&self, payload: Payload) -> &[u8] {
        let len = self.payload_len(payload);
        &self.region.bytes()[payload.offset()..payload.offset() + len]
    }

    /// The usable bytes behind a live payload address, mutably.
    #[must_use]
    pub fn payload_mut(&mut self, payload: Payload) -> &mut [u8] {
        let len = self.payload_len(payload);
        let offset = payload.offset();
        &mut self.region.bytes_mut()[offset..offset + len]
    }

    /// Usable size of a live allocation; at least what was requested.
    #[must_use]
    pub fn payload_len(&self, payload: Payload) -> usize {
        let block = Block::from_payload(payload.offset());
        let tag = tag::header(self.region.bytes(), block);
        debug_assert!(tag.is_allocated(), "payload access to a released address");
        tag.size() - OVERHEAD
    }

    /// Total bytes currently under management, sentinels included.
    #[must_use]
    pub fn managed_bytes(&self) -> usize {
        self.region.len()
    }

    /// Number of blocks on the free list.
    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.free.iter(self.region.bytes()).count()
    }

    fn allocate_nonzero(&mut self, size: usize) -> Result<Payload, OutOfMemory> {
        if size > MAX_HEAP - OVERHEAD {
            return AddressSpaceExhaustedSnafu {
                requested: size,
                len: self.region.len(),
            }
            .fail();
        }
        let required = required_block_size(size);
        let block = match self.find_fit(required) {
            Some(block) => block,
            None => self.extend(required)?,
        };
        let block = self.place(block, required);
        Ok(Payload(block.payload()))
    }

    /// First-fit scan of the free list.
    fn find_fit(&self, size: usize) -> Option<Block> {
        let bytes = self.region.bytes();
        self.free
            .iter(bytes)
            .find(|&block| tag::header(bytes, block).size() >= size)
    }

    /// Carves an allocated block of `size` bytes out of `block`.
    ///
    /// The caller guarantees `block` is at least `size` bytes. When the
    /// leftover could host a viable free block the block is split, with the
    /// allocated piece at the high end for large requests and at the low
    /// end otherwise; a smaller leftover is kept inside the allocation.
    fn place(&mut self, block: Block, size: usize) -> Block {
        if !tag::header(self.region.bytes(), block).is_allocated() {
            self.free.remove(self.region.bytes_mut(), block);
        }
        let total = tag::header(self.region.bytes(), block).size();
        debug_assert!(total >= size, "place needs a big-enough block");
        let leftover = total - size;

        if leftover < MIN_BLOCK {
            tag::retag(self.region.bytes_mut(), block, total, true);
            return block;
        }

        if size > self.large_request {
            // Allocated piece at the high end; the front stays free.
            let bytes = self.region.bytes_mut();
            tag::retag(bytes, block, leftover, false);
            let allocated = tag::next_block(bytes, block);
            tag::retag(bytes, allocated, size, true);
            self.free.append(self.region.bytes_mut(), block);
            allocated
        } else {
            // Allocated piece at the low end; the tail becomes free.
            let bytes = self.region.bytes_mut();
            tag::retag(bytes, block, size, true);
            let remainder = tag::next_block(bytes, block);
            tag::retag(bytes, remainder, leftover, false);
            self.free.append(self.region.bytes_mut(), remainder);
            block
        }
    }

    /// Marks `block` free and merges it with free physical neighbors.
    ///
    /// Returns the merged block, registered on the free list exactly once.
    /// Both boundary tags of the final extent are rewritten on every path.
    fn coalesce(&mut self, block: Block) -> Block {
        let bytes = self.region.bytes_mut();
        let size = tag::header(bytes, block).size();
        tag::retag(bytes, block, size, false);

        let prev = tag::prev_block(bytes, block);
        let next = tag::next_block(bytes, block);
        let prev_allocated = tag::header(bytes, prev).is_allocated();
        let next_allocated = tag::header(bytes, next).is_allocated();

        match (prev_allocated, next_allocated) {
            (true, true) => {
                self.free.append(bytes, block);
                block
            }
            (true, false) => {
                let merged = size + tag::header(bytes, next).size();
                self.free.remove(bytes, next);
                tag::retag(bytes, block, merged, false);
                self.free.append(bytes, block);
                block
            }
            (false, true) => {
                // `prev` grows over this block and keeps its list position.
                let merged = tag::header(bytes, prev).size() + size;
                tag::retag(bytes, prev, merged, false);
                prev
            }
            (false, false) => {
                let merged =
                    tag::header(bytes, prev).size() + size + tag::header(bytes, next).size();
                self.free.remove(bytes, next);
                tag::retag(bytes, prev, merged, false);
                prev
            }
        }
    }

    /// Extends the managed range by `size` bytes of fresh free space.
    ///
    /// The new block's header lands on the old epilogue, a new epilogue is
    /// written after it, and the coalescer folds the block in — merging
    /// with a trailing free block when there is one. On failure the heap is
    /// untouched.
    fn extend(&mut self, size: usize) -> Result<Block, OutOfMemory> {
        debug_assert!(size >= ALIGN && size.is_multiple_of(ALIGN));
        let old_len = self.grow_region(size)?;

        let block = Block(old_len - WORD);
        let bytes = self.region.bytes_mut();
        tag::retag(bytes, block, size, false);
        let epilogue = tag::next_block(bytes, block);
        tag::write_header(bytes, epilogue, Tag::new(0, true));
        Ok(self.coalesce(block))
    }

    fn grow_region(&mut self, bytes: usize) -> Result<usize, OutOfMemory> {
        let len = self.region.len();
        if MAX_HEAP - len < bytes {
            return AddressSpaceExhaustedSnafu {
                requested: bytes,
                len,
            }
            .fail();
        }
        self.region
            .grow(bytes)
            .context(RegionExhaustedSnafu { requested: bytes })
    }

    #[cfg(test)]
    pub(crate) fn region_mut(&mut self) -> &mut R {
        &mut self.region
    }

    pub(crate) fn parts(&self) -> (&[u8], &FreeList) {
        (self.region.bytes(), &self.free)
    }
}

/// Block size needed to host `payload` bytes: payload plus tag overhead,
/// rounded up to [`ALIGN`].
fn required_block_size(payload: usize) -> usize {
    (payload + OVERHEAD).next_multiple_of(ALIGN)
}
