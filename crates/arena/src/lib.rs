//! Growable, contiguous memory regions addressed by byte offset.
//!
//! This crate provides the raw address range that an allocator manages. A
//! [`Region`] is a contiguous run of bytes that can only ever grow: new space
//! is appended at the end, and the offset of every byte that was ever handed
//! out stays valid for the lifetime of the region. Consumers address the
//! region exclusively through `usize` byte offsets, never through raw
//! pointers, so bounds are always checkable.
//!
//! [`Arena`] is the provided implementation, backed by a `Vec<u8>` with an
//! optional hard byte limit. The limit makes exhaustion reproducible: a
//! region built with [`Arena::with_limit`] refuses to grow past it and
//! reports [`RegionFull`] instead, which is how out-of-memory paths are
//! exercised in tests.
//!
//! # Examples
//!
//! ```
//! use arena::{Arena, Region as _};
//!
//! let mut region = Arena::with_limit(64);
//! let start = region.grow(16).unwrap();
//! assert_eq!(start, 0);
//! region.bytes_mut()[start] = 0xab;
//!
//! // Growth appends; earlier offsets are untouched.
//! let more = region.grow(16).unwrap();
//! assert_eq!(more, 16);
//! assert_eq!(region.bytes()[start], 0xab);
//!
//! // The limit is a hard ceiling.
//! assert!(region.grow(64).is_err());
//! ```

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

use alloc::vec::Vec;

use snafu::Snafu;

/// The region cannot supply the requested number of additional bytes.
///
/// Raised by [`Region::grow`] when growing would exceed the region's byte
/// limit. The region is left exactly as it was.
#[derive(Debug, Snafu)]
#[snafu(display(
    "region cannot grow by {requested} bytes: {len} of {limit} bytes in use"
))]
pub struct RegionFull {
    requested: usize,
    len: usize,
    limit: usize,
    #[snafu(implicit)]
    location: snafu::Location,
}

/// A contiguous, append-only run of bytes addressed by offset.
///
/// Implementations must uphold two guarantees that allocators build on:
///
/// - **Stability**: once [`grow`](Self::grow) returns an offset, every byte
///   below `len()` keeps its offset and content until overwritten through
///   [`bytes_mut`](Self::bytes_mut).
/// - **Contiguity**: the bytes added by a successful `grow` start exactly at
///   the previous end of the region, so `grow` always returns the old
///   `len()`.
pub trait Region {
    /// Current length of the region in bytes.
    fn len(&self) -> usize;

    /// Returns `true` if the region holds no bytes yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole region as a byte slice.
    fn bytes(&self) -> &[u8];

    /// The whole region as a mutable byte slice.
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Appends `bytes` zeroed bytes to the region.
    ///
    /// Returns the offset of the first new byte (the previous length). On
    /// failure the region is unchanged.
    fn grow(&mut self, bytes: usize) -> Result<usize, RegionFull>;
}

/// A [`Region`] backed by heap memory, with an optional byte limit.
#[derive(Debug, Default)]
pub struct Arena {
    bytes: Vec<u8>,
    limit: Option<usize>,
}

impl Arena {
    /// Creates an empty arena that grows without bound.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty arena that refuses to grow past `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit: Some(limit),
        }
    }

    /// The configured byte limit, if any.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl Region for Arena {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn grow(&mut self, bytes: usize) -> Result<usize, RegionFull> {
        let len = self.bytes.len();
        let new_len = len.checked_add(bytes).ok_or_else(|| {
            RegionFullSnafu {
                requested: bytes,
                len,
                limit: usize::MAX,
            }
            .build()
        })?;
        if let Some(limit) = self.limit
            && new_len > limit
        {
            return RegionFullSnafu {
                requested: bytes,
                len,
                limit,
            }
            .fail();
        }
        self.bytes.resize(new_len, 0);
        Ok(len)
    }
}
