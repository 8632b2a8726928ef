//! Buffered file-backed reader and writer.
//!
//! Both annotate I/O failures with the path and position, and turn sticky
//! not-ok afterwards.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write as _},
    path::Path,
    string::{String, ToString},
    vec,
    vec::Vec,
};

use crate::{error::Status, reader::Reader, writer::Writer};

const BUFFER_SIZE: usize = 64 << 10;

pub struct FileReader {
    file: File,
    path: String,
    buf: Vec<u8>,
    start: usize,
    end: usize,
    pos: u64,
    status: Option<Status>,
}

impl FileReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Status> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|error| {
            Status::io(std::format!("opening {}", path.display()), error)
        })?;
        Ok(Self::from_file(file, path.display().to_string()))
    }

    pub fn from_file(file: File, path: String) -> Self {
        Self {
            file,
            path,
            buf: vec![0; BUFFER_SIZE],
            start: 0,
            end: 0,
            pos: 0,
            status: None,
        }
    }

    fn fail(&mut self, context: &str, error: std::io::Error) {
        if self.status.is_none() {
            self.status = Some(Status::io(
                std::format!("{context} {} at {}", self.path, self.pos),
                error,
            ));
        }
    }
}

impl Reader for FileReader {
    fn pos(&self) -> u64 {
        self.pos
    }

    fn status(&self) -> Option<Status> {
        self.status.clone()
    }

    fn chunk(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    fn pull(&mut self, min_length: usize, recommended_length: usize) -> bool {
        if min_length == 0 {
            return true;
        }
        if self.available() >= min_length {
            return true;
        }
        if self.status.is_some() {
            return false;
        }
        // Compact the window, grow the buffer if the request needs it, and
        // refill until satisfied or the file ends.
        self.buf.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
        let wanted = min_length.max(recommended_length.min(self.buf.len()));
        if wanted > self.buf.len() {
            self.buf.resize(wanted, 0);
        }
        while self.end < wanted {
            match self.file.read(&mut self.buf[self.end..]) {
                Ok(0) => break,
                Ok(count) => self.end += count,
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {}
                Err(error) => {
                    self.fail("reading", error);
                    return false;
                }
            }
            if self.end >= min_length {
                break;
            }
        }
        self.available() >= min_length
    }

    fn consume(&mut self, length: usize) {
        debug_assert!(length <= self.available());
        self.start += length;
        self.pos += length as u64;
    }

    fn supports_size(&self) -> bool {
        true
    }

    fn size(&mut self) -> Option<u64> {
        match self.file.metadata() {
            Ok(metadata) => Some(metadata.len()),
            Err(error) => {
                self.fail("sizing", error);
                None
            }
        }
    }

    fn supports_rewind(&self) -> bool {
        true
    }

    fn seek(&mut self, pos: u64) -> bool {
        if self.status.is_some() {
            return false;
        }
        // Reuse the buffered window when the target lies within it.
        let window_start = self.pos - self.start as u64;
        if pos >= window_start && pos <= window_start + self.end as u64 {
            self.start = (pos - window_start) as usize;
            self.pos = pos;
            return true;
        }
        match self.file.seek(SeekFrom::Start(pos)) {
            Ok(_) => {
                self.start = 0;
                self.end = 0;
                self.pos = pos;
                true
            }
            Err(error) => {
                self.fail("seeking", error);
                false
            }
        }
    }
}

pub struct FileWriter {
    file: File,
    path: String,
    buf: Vec<u8>,
    filled: usize,
    flushed_pos: u64,
    status: Option<Status>,
}

impl FileWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, Status> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|error| {
            Status::io(std::format!("creating {}", path.display()), error)
        })?;
        Ok(Self::from_file(file, path.display().to_string()))
    }

    pub fn from_file(file: File, path: String) -> Self {
        Self {
            file,
            path,
            buf: vec![0; BUFFER_SIZE],
            filled: 0,
            flushed_pos: 0,
            status: None,
        }
    }

    fn fail(&mut self, context: &str, error: std::io::Error) {
        if self.status.is_none() {
            let pos = self.pos();
            self.status = Some(Status::io(
                std::format!("{context} {} at {}", self.path, pos),
                error,
            ));
        }
    }

    fn flush_buffer(&mut self) -> bool {
        if self.status.is_some() {
            return false;
        }
        if self.filled == 0 {
            return true;
        }
        match self.file.write_all(&self.buf[..self.filled]) {
            Ok(()) => {
                self.flushed_pos += self.filled as u64;
                self.filled = 0;
                true
            }
            Err(error) => {
                self.fail("writing", error);
                false
            }
        }
    }
}

impl Writer for FileWriter {
    fn pos(&self) -> u64 {
        self.flushed_pos + self.filled as u64
    }

    fn status(&self) -> Option<Status> {
        self.status.clone()
    }

    fn push(&mut self, min_length: usize) -> bool {
        if self.buf.len() - self.filled >= min_length.max(1) {
            return self.status.is_none();
        }
        if !self.flush_buffer() {
            return false;
        }
        if min_length > self.buf.len() {
            self.buf.resize(min_length, 0);
        }
        true
    }

    fn writable(&mut self) -> &mut [u8] {
        &mut self.buf[self.filled..]
    }

    fn advance(&mut self, length: usize) {
        debug_assert!(length <= self.buf.len() - self.filled);
        self.filled += length;
    }

    fn write(&mut self, src: &[u8]) -> bool {
        if self.status.is_some() {
            return false;
        }
        if src.len() >= self.buf.len() {
            // Large writes bypass the buffer.
            if !self.flush_buffer() {
                return false;
            }
            return match self.file.write_all(src) {
                Ok(()) => {
                    self.flushed_pos += src.len() as u64;
                    true
                }
                Err(error) => {
                    self.fail("writing", error);
                    false
                }
            };
        }
        if self.buf.len() - self.filled < src.len() && !self.flush_buffer() {
            return false;
        }
        self.buf[self.filled..self.filled + src.len()].copy_from_slice(src);
        self.filled += src.len();
        true
    }

    fn flush(&mut self) -> bool {
        if !self.flush_buffer() {
            return false;
        }
        match self.file.flush() {
            Ok(()) => true,
            Err(error) => {
                self.fail("flushing", error);
                false
            }
        }
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        let _ = self.flush_buffer();
    }
}
