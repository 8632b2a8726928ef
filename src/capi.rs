//! C ABI for sequential record reading.
//!
//! Readers are opaque handles with an explicit lifecycle; any number may be
//! open at once. Record buffers are handed to the caller and released with
//! [`bytechain_buffer_free`].

use std::{
    boxed::Box,
    ffi::{c_char, CStr},
    ptr,
    vec::Vec,
};

use crate::{file::FileReader, records::RecordReader};

/// An open record stream. Opaque to C callers.
pub struct BytechainReader {
    records: RecordReader<FileReader>,
}

/// Opens `path` for sequential record reading. Returns null on failure, with
/// a diagnostic on standard error.
///
/// # Safety
///
/// `path` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn bytechain_reader_open(path: *const c_char) -> *mut BytechainReader {
    if path.is_null() {
        std::eprintln!("bytechain: null path");
        return ptr::null_mut();
    }
    let path = match unsafe { CStr::from_ptr(path) }.to_str() {
        Ok(path) => path,
        Err(_) => {
            std::eprintln!("bytechain: path is not valid UTF-8");
            return ptr::null_mut();
        }
    };
    match FileReader::open(path) {
        Ok(reader) => Box::into_raw(Box::new(BytechainReader {
            records: RecordReader::new(reader),
        })),
        Err(status) => {
            std::eprintln!("bytechain: {status}");
            ptr::null_mut()
        }
    }
}

/// Reads the next record, returning a buffer owned by the caller and storing
/// its length in `out_len`. Returns null at end of stream or on error, with
/// `out_len` zeroed; errors are reported on standard error.
///
/// # Safety
///
/// `reader` must come from [`bytechain_reader_open`] and not be closed;
/// `out_len` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn bytechain_reader_read(
    reader: *mut BytechainReader,
    out_len: *mut usize,
) -> *mut u8 {
    if reader.is_null() || out_len.is_null() {
        if !out_len.is_null() {
            unsafe { out_len.write(0) };
        }
        return ptr::null_mut();
    }
    unsafe { out_len.write(0) };
    let reader = unsafe { &mut *reader };
    let mut record = Vec::new();
    if !reader.records.read_record(&mut record) {
        if let Some(status) = reader.records.status() {
            std::eprintln!("bytechain: {status}");
        }
        return ptr::null_mut();
    }
    unsafe { out_len.write(record.len()) };
    Box::into_raw(record.into_boxed_slice()).cast::<u8>()
}

/// Releases a buffer returned by [`bytechain_reader_read`]. `len` must be the
/// length stored at that call.
///
/// # Safety
///
/// `ptr` must be a buffer from [`bytechain_reader_read`], released once.
#[no_mangle]
pub unsafe extern "C" fn bytechain_buffer_free(ptr: *mut u8, len: usize) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(core::ptr::slice_from_raw_parts_mut(ptr, len)) });
}

/// Closes a reader opened with [`bytechain_reader_open`].
///
/// # Safety
///
/// `reader` must come from [`bytechain_reader_open`] and not be closed twice.
#[no_mangle]
pub unsafe extern "C" fn bytechain_reader_close(reader: *mut BytechainReader) {
    if reader.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(reader) });
}
