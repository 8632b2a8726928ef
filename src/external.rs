//! Type-erased payloads whose bytes can back a block without copying.

use alloc::{boxed::Box, string::String, vec::Vec};
use core::fmt;

use crate::block::Block;

/// Bytes owned by an arbitrary object, wrapped into a block without copying.
///
/// # Safety
///
/// The slice returned by [`as_bytes`](Self::as_bytes) must stay valid and
/// unchanged for the whole lifetime of the payload, even when the payload is
/// moved: the block captures the pointer once, at construction. Heap-backed
/// containers (`Vec`, `String`, `Bytes`, `Box<[u8]>`) and `'static` slices
/// satisfy this; inline storage does not.
pub unsafe trait ExternalBytes: Send + Sync + 'static {
    /// Returns the payload bytes.
    fn as_bytes(&self) -> &[u8];

    /// Writes a one-line description of the payload for structure dumps.
    fn dump(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[external] { }")
    }

    /// Memory owned by the payload beyond its own size, for estimation.
    fn owned_memory(&self) -> usize {
        0
    }
}

unsafe impl ExternalBytes for Vec<u8> {
    fn as_bytes(&self) -> &[u8] {
        self
    }

    fn dump(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[vec] {{ capacity: {} }}", self.capacity())
    }

    fn owned_memory(&self) -> usize {
        self.capacity()
    }
}

unsafe impl ExternalBytes for Box<[u8]> {
    fn as_bytes(&self) -> &[u8] {
        self
    }

    fn dump(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[boxed] { }")
    }

    fn owned_memory(&self) -> usize {
        self.len()
    }
}

unsafe impl ExternalBytes for String {
    fn as_bytes(&self) -> &[u8] {
        str::as_bytes(self)
    }

    fn dump(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[string] {{ capacity: {} }}", self.capacity())
    }

    fn owned_memory(&self) -> usize {
        self.capacity()
    }
}

unsafe impl ExternalBytes for &'static [u8] {
    fn as_bytes(&self) -> &[u8] {
        self
    }

    fn dump(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[static] { }")
    }
}

unsafe impl ExternalBytes for &'static str {
    fn as_bytes(&self) -> &[u8] {
        str::as_bytes(self)
    }

    fn dump(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[static] { }")
    }
}

// `Bytes` is stable under moves (heap, static, or owner-backed storage).
unsafe impl ExternalBytes for bytes::Bytes {
    fn as_bytes(&self) -> &[u8] {
        self
    }

    fn dump(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[bytes] { }")
    }

    fn owned_memory(&self) -> usize {
        self.len()
    }
}

/// A view into another block, keeping the donor alive through its refcount.
///
/// Invariant: `target` is never itself backed by a `BlockSubstr`; the
/// constructor in [`Block::substr`] resolves the indirection.
pub(crate) struct BlockSubstr {
    pub(crate) target: Block,
}

unsafe impl ExternalBytes for BlockSubstr {
    fn as_bytes(&self) -> &[u8] {
        self.target.as_slice()
    }

    fn dump(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[block] {{ {:?} }}", self.target)
    }

    fn owned_memory(&self) -> usize {
        self.target.allocated_memory()
    }
}

pub(crate) static ZERO_PAGE: [u8; 4096] = [0; 4096];

/// A singleton view onto the static all-zero page.
pub(crate) struct ZeroRef;

unsafe impl ExternalBytes for ZeroRef {
    fn as_bytes(&self) -> &[u8] {
        &ZERO_PAGE
    }

    fn dump(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[zero] { }")
    }
}
