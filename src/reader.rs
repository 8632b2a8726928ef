//! Pull-based byte sources with zero-copy windows.
//!
//! A [`Reader`] exposes its buffered bytes as a borrowed window ([`chunk`])
//! that callers consume in place; [`pull`] refills it. Failures are sticky:
//! after the first error every operation returns `false` and
//! [`status`](Reader::status) reports the reason, while a clean end of data
//! leaves the reader `ok`.
//!
//! [`chunk`]: Reader::chunk
//! [`pull`]: Reader::pull

use std::vec::Vec;

use ::bytes::Bytes;

use crate::{
    bytes::block_to_bytes,
    chain::{Chain, Options},
    error::Status,
    writer::Writer,
};

pub trait Reader {
    /// Logical position of the start of the readable window.
    fn pos(&self) -> u64;

    /// `false` once the reader failed; end of data alone does not fail.
    fn ok(&self) -> bool {
        self.status().is_none()
    }

    fn status(&self) -> Option<Status>;

    /// The readable window. May be empty before the first [`pull`](Self::pull)
    /// or at end of data.
    fn chunk(&self) -> &[u8];

    /// Makes at least `min_length` bytes available in the window, refilling
    /// from the source as needed; `recommended_length` sizes readahead.
    /// Returns `false` at end of data or on failure.
    fn pull(&mut self, min_length: usize, recommended_length: usize) -> bool;

    /// Advances past `length` bytes of the window.
    fn consume(&mut self, length: usize);

    fn available(&self) -> usize {
        self.chunk().len()
    }

    fn supports_size(&self) -> bool {
        false
    }

    /// Total size of the source, when known.
    fn size(&mut self) -> Option<u64> {
        None
    }

    fn supports_rewind(&self) -> bool {
        false
    }

    fn seek(&mut self, pos: u64) -> bool {
        let _ = pos;
        false
    }

    /// Reads exactly `length` bytes into `dest`; on `false` the bytes read so
    /// far are appended and the position reflects them.
    fn read(&mut self, mut length: usize, dest: &mut Vec<u8>) -> bool {
        dest.reserve(length);
        while length > 0 {
            if self.available() == 0 && !self.pull(1, length) {
                return false;
            }
            let count = self.available().min(length);
            dest.extend_from_slice(&self.chunk()[..count]);
            self.consume(count);
            length -= count;
        }
        true
    }

    /// Reads exactly `length` bytes, appending them to `dest`. Sources backed
    /// by shared storage append without copying.
    fn read_chain(&mut self, mut length: usize, dest: &mut Chain) -> bool {
        let options = Options::new().with_size_hint(dest.len().saturating_add(length));
        while length > 0 {
            if self.available() == 0 && !self.pull(1, length) {
                return false;
            }
            let count = self.available().min(length);
            dest.append_with(&self.chunk()[..count], &options);
            self.consume(count);
            length -= count;
        }
        true
    }

    /// Reads exactly `length` bytes as [`Bytes`], or `None` at end of data or
    /// on failure (the bytes read before the shortfall are discarded).
    fn read_bytes(&mut self, length: usize) -> Option<Bytes> {
        if self.available() >= length {
            let bytes = Bytes::copy_from_slice(&self.chunk()[..length]);
            self.consume(length);
            return Some(bytes);
        }
        let mut vec = Vec::new();
        self.read(length, &mut vec).then(|| Bytes::from(vec))
    }

    /// Copies exactly `length` bytes to `dest`; `false` when either side
    /// stops short (consult both statuses, destination first).
    fn copy_to(&mut self, mut length: u64, dest: &mut dyn Writer) -> bool {
        while length > 0 {
            if self.available() == 0
                && !self.pull(1, length.min(usize::MAX as u64) as usize)
            {
                return false;
            }
            let count = (self.available() as u64).min(length) as usize;
            if !dest.write(&self.chunk()[..count]) {
                return false;
            }
            self.consume(count);
            length -= count as u64;
        }
        true
    }

    fn skip(&mut self, mut length: u64) -> bool {
        while length > 0 {
            if self.available() == 0
                && !self.pull(1, length.min(usize::MAX as u64) as usize)
            {
                return false;
            }
            let count = (self.available() as u64).min(length) as usize;
            self.consume(count);
            length -= count as u64;
        }
        true
    }
}

/// A reader over a contiguous byte slice: the whole source is one window.
pub struct SliceReader<'a> {
    src: &'a [u8],
    cursor: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(src: &'a [u8]) -> Self {
        Self { src, cursor: 0 }
    }
}

impl Reader for SliceReader<'_> {
    fn pos(&self) -> u64 {
        self.cursor as u64
    }

    fn status(&self) -> Option<Status> {
        None
    }

    fn chunk(&self) -> &[u8] {
        &self.src[self.cursor..]
    }

    fn pull(&mut self, min_length: usize, _recommended_length: usize) -> bool {
        min_length == 0 || self.available() >= min_length
    }

    fn consume(&mut self, length: usize) {
        debug_assert!(length <= self.available());
        self.cursor += length;
    }

    fn supports_size(&self) -> bool {
        true
    }

    fn size(&mut self) -> Option<u64> {
        Some(self.src.len() as u64)
    }

    fn supports_rewind(&self) -> bool {
        true
    }

    fn seek(&mut self, pos: u64) -> bool {
        if pos > self.src.len() as u64 {
            return false;
        }
        self.cursor = pos as usize;
        true
    }
}

/// A reader over a [`Chain`], sharing blocks instead of copying wherever the
/// request permits.
///
/// The window normally covers the rest of the current block; a pull spanning
/// blocks is served from an internal scratch buffer.
pub struct ChainReader<'a> {
    chain: &'a Chain,
    cursor: usize,
    scratch: Vec<u8>,
    scratch_start: usize,
}

impl<'a> ChainReader<'a> {
    pub fn new(chain: &'a Chain) -> Self {
        Self {
            chain,
            cursor: 0,
            scratch: Vec::new(),
            scratch_start: 0,
        }
    }

    fn in_scratch(&self) -> bool {
        !self.scratch.is_empty()
            && self.cursor >= self.scratch_start
            && self.cursor < self.scratch_start + self.scratch.len()
    }
}

impl Reader for ChainReader<'_> {
    fn pos(&self) -> u64 {
        self.cursor as u64
    }

    fn status(&self) -> Option<Status> {
        None
    }

    fn chunk(&self) -> &[u8] {
        if self.in_scratch() {
            return &self.scratch[self.cursor - self.scratch_start..];
        }
        if self.cursor == self.chain.len() {
            return &[];
        }
        let (iter, offset) = self.chain.position(self.cursor);
        &iter.get().unwrap_or(&[])[offset..]
    }

    fn pull(&mut self, min_length: usize, _recommended_length: usize) -> bool {
        if min_length == 0 {
            return true;
        }
        let remaining = self.chain.len() - self.cursor;
        if remaining < min_length {
            return false;
        }
        if self.available() >= min_length {
            return true;
        }
        // The request spans blocks: gather it into the scratch buffer.
        self.scratch.clear();
        self.scratch_start = self.cursor;
        let (iter, mut offset) = self.chain.position(self.cursor);
        let mut index = iter.index();
        while self.scratch.len() < min_length {
            let fragment = self.chain.fragment(index);
            let count = (fragment.len() - offset).min(min_length - self.scratch.len());
            self.scratch.extend_from_slice(&fragment[offset..offset + count]);
            offset = 0;
            index += 1;
        }
        true
    }

    fn consume(&mut self, length: usize) {
        debug_assert!(length <= self.available());
        self.cursor += length;
    }

    fn read_chain(&mut self, length: usize, dest: &mut Chain) -> bool {
        let available = self.chain.len() - self.cursor;
        let options = Options::new();
        let mut remaining = length.min(available);
        let complete = remaining == length;
        while remaining > 0 {
            let (iter, offset) = self.chain.position(self.cursor);
            let index = iter.index();
            let fragment = self.chain.fragment(index);
            let count = (fragment.len() - offset).min(remaining);
            match self.chain.fragment_block(index) {
                Some(block) => dest.append_block_substr(block, offset, count, &options),
                None => dest.append_with(&fragment[offset..offset + count], &options),
            }
            self.cursor += count;
            remaining -= count;
        }
        complete
    }

    fn read_bytes(&mut self, length: usize) -> Option<Bytes> {
        if self.chain.len() - self.cursor < length {
            self.cursor = self.chain.len();
            return None;
        }
        let (iter, offset) = self.chain.position(self.cursor);
        let index = iter.index();
        if length <= self.chain.fragment(index).len() - offset {
            let bytes = match self.chain.fragment_block(index) {
                Some(block) => block_to_bytes(block, offset, length),
                None => Bytes::copy_from_slice(
                    &self.chain.fragment(index)[offset..offset + length],
                ),
            };
            self.cursor += length;
            return Some(bytes);
        }
        let mut vec = Vec::new();
        self.read(length, &mut vec).then(|| Bytes::from(vec))
    }

    fn supports_size(&self) -> bool {
        true
    }

    fn size(&mut self) -> Option<u64> {
        Some(self.chain.len() as u64)
    }

    fn supports_rewind(&self) -> bool {
        true
    }

    fn seek(&mut self, pos: u64) -> bool {
        if pos > self.chain.len() as u64 {
            return false;
        }
        self.cursor = pos as usize;
        true
    }
}

impl bytes::Buf for ChainReader<'_> {
    fn remaining(&self) -> usize {
        self.chain.len() - self.cursor
    }

    fn chunk(&self) -> &[u8] {
        Reader::chunk(self)
    }

    fn advance(&mut self, cnt: usize) {
        assert!(cnt <= bytes::Buf::remaining(self));
        self.cursor += cnt;
    }
}
