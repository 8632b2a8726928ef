//! Push-based byte sinks mirroring the readers.
//!
//! A [`Writer`] hands out a writable window ([`writable`]) that callers fill
//! and commit with [`advance`]; [`push`] makes room. Failures are sticky, as
//! for readers.
//!
//! [`writable`]: Writer::writable
//! [`push`]: Writer::push
//! [`advance`]: Writer::advance

use std::vec::Vec;

use ::bytes::Bytes;

use crate::{
    chain::{Chain, Options},
    error::Status,
};

pub trait Writer {
    /// Logical position: bytes accepted so far.
    fn pos(&self) -> u64;

    fn ok(&self) -> bool {
        self.status().is_none()
    }

    fn status(&self) -> Option<Status>;

    /// Makes the writable window at least `min_length` bytes long. Returns
    /// `false` on failure.
    fn push(&mut self, min_length: usize) -> bool;

    /// The current writable window.
    fn writable(&mut self) -> &mut [u8];

    /// Commits `length` bytes of the window.
    fn advance(&mut self, length: usize);

    fn write(&mut self, src: &[u8]) -> bool {
        if src.is_empty() {
            return self.ok();
        }
        if !self.push(1) {
            return false;
        }
        let mut src = src;
        loop {
            let window = self.writable();
            let count = window.len().min(src.len());
            window[..count].copy_from_slice(&src[..count]);
            self.advance(count);
            src = &src[count..];
            if src.is_empty() {
                return true;
            }
            if !self.push(1) {
                return false;
            }
        }
    }

    /// Writes a chain; chain-backed sinks attach its blocks without copying.
    fn write_chain(&mut self, src: Chain) -> bool {
        for fragment in src.blocks() {
            if !self.write(fragment) {
                return false;
            }
        }
        true
    }

    fn write_bytes(&mut self, src: Bytes) -> bool {
        self.write(&src)
    }

    /// Pushes buffered contents towards the destination.
    fn flush(&mut self) -> bool;

    /// Declares the expected total of bytes still to be written; sinks may
    /// use it to size buffers. `None` withdraws an earlier hint.
    fn set_size_hint(&mut self, size: Option<u64>) {
        let _ = size;
    }
}

/// A writer accumulating into a `Vec<u8>`.
///
/// The vector's length tracks the window limit; [`into_vec`] trims it back to
/// the committed bytes.
///
/// [`into_vec`]: VecWriter::into_vec
#[derive(Default)]
pub struct VecWriter {
    dest: Vec<u8>,
    filled: usize,
}

impl VecWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.dest[..self.filled]
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.dest.truncate(self.filled);
        self.dest
    }
}

impl Writer for VecWriter {
    fn pos(&self) -> u64 {
        self.filled as u64
    }

    fn status(&self) -> Option<Status> {
        None
    }

    fn push(&mut self, min_length: usize) -> bool {
        if self.dest.len() - self.filled < min_length {
            self.dest.resize(self.filled + min_length.max(self.filled.max(64)), 0);
        }
        true
    }

    fn writable(&mut self) -> &mut [u8] {
        &mut self.dest[self.filled..]
    }

    fn advance(&mut self, length: usize) {
        debug_assert!(length <= self.dest.len() - self.filled);
        self.filled += length;
    }

    fn write(&mut self, src: &[u8]) -> bool {
        self.dest.truncate(self.filled);
        self.dest.extend_from_slice(src);
        self.filled = self.dest.len();
        true
    }

    fn flush(&mut self) -> bool {
        self.dest.truncate(self.filled);
        true
    }

    fn set_size_hint(&mut self, size: Option<u64>) {
        if let Some(size) = size {
            self.dest.reserve(size.min(isize::MAX as u64) as usize);
        }
    }
}

/// A writer appending to a [`Chain`] through its append windows; written
/// chains and large byte fragments attach as shared blocks.
pub struct ChainWriter<'a> {
    dest: &'a mut Chain,
    // Current window inside the chain's last block. The chain already counts
    // the whole window; sync() trims the unwritten tail.
    window_start: *mut u8,
    window_len: usize,
    written: usize,
    options: Options,
}

impl<'a> ChainWriter<'a> {
    pub fn new(dest: &'a mut Chain) -> Self {
        Self::with_options(dest, Options::new())
    }

    pub fn with_options(dest: &'a mut Chain, options: Options) -> Self {
        Self {
            dest,
            window_start: core::ptr::null_mut(),
            window_len: 0,
            written: 0,
            options,
        }
    }

    fn sync(&mut self) {
        let unwritten = self.window_len - self.written;
        self.window_len = 0;
        self.written = 0;
        self.window_start = core::ptr::null_mut();
        if unwritten > 0 {
            self.dest.remove_suffix_with(unwritten, &self.options);
        }
    }
}

impl Writer for ChainWriter<'_> {
    fn pos(&self) -> u64 {
        (self.dest.len() - (self.window_len - self.written)) as u64
    }

    fn status(&self) -> Option<Status> {
        None
    }

    fn push(&mut self, min_length: usize) -> bool {
        if self.window_len - self.written >= min_length.max(1) {
            return true;
        }
        self.sync();
        let buffer = self
            .dest
            .append_buffer(min_length.max(1), 0, usize::MAX, &self.options);
        self.window_start = buffer.as_mut_ptr();
        self.window_len = buffer.len();
        self.written = 0;
        true
    }

    fn writable(&mut self) -> &mut [u8] {
        if self.window_len == self.written {
            return &mut [];
        }
        // The window stays valid: the chain is only reachable through this
        // writer, and the block is extended only via sync()/append_buffer.
        unsafe {
            core::slice::from_raw_parts_mut(
                self.window_start.add(self.written),
                self.window_len - self.written,
            )
        }
    }

    fn advance(&mut self, length: usize) {
        debug_assert!(length <= self.window_len - self.written);
        self.written += length;
    }

    fn write_chain(&mut self, src: Chain) -> bool {
        self.sync();
        self.dest.append_with(src, &self.options);
        true
    }

    fn write_bytes(&mut self, src: Bytes) -> bool {
        self.sync();
        self.dest.append_with(src, &self.options);
        true
    }

    fn flush(&mut self) -> bool {
        self.sync();
        true
    }

    fn set_size_hint(&mut self, size: Option<u64>) {
        self.options = match size {
            Some(size) => {
                let total = self.pos().saturating_add(size).min(usize::MAX as u64);
                self.options.with_size_hint(total as usize)
            }
            None => Options::new()
                .with_min_block_size(self.options.min_block_size())
                .with_max_block_size(self.options.max_block_size()),
        };
    }
}

impl Drop for ChainWriter<'_> {
    fn drop(&mut self) {
        self.sync();
    }
}
