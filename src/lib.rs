//! A segmented byte buffer with cheap concatenation, zero-copy sharing of
//! refcounted blocks, and record-oriented streamed I/O on top.
//!
//! The central type is [`Chain`]: an ordered sequence of refcounted byte
//! blocks presenting one logical byte string. Appending a byte stays
//! amortized constant, copying a chain shares its blocks, short contents
//! live inline, and externally owned memory (`Vec<u8>`, `String`,
//! `bytes::Bytes`, anything implementing [`ExternalBytes`]) is wrapped
//! without copying. The [`Reader`]/[`Writer`] facade exposes pull/push
//! buffered I/O over chains, slices, and files, and the record layer frames
//! length-prefixed records over it, including through a C ABI.
//!
//! ## Features
//!
//! The crate defines the following features:
//! - `abort-on-refcount-overflow` (default): abort on refcount overflow;
//!   when not enabled, the refcount is saturated on overflow, leaking the
//!   allocated memory, as it is done in Linux reference counting
//!   implementation.
//! - `portable-atomic`: use [`portable_atomic`] instead of
//!   [`core::sync::atomic`].
//! - `serde`: implement [`Serialize`](::serde::Serialize)/
//!   [`Deserialize`](::serde::Deserialize) for [`Chain`] as a byte string.
//! - `std` (default): the [`Status`] taxonomy, the reader/writer facade,
//!   file-backed streams, the record layer, and the C ABI.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![no_std]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod block;
mod bytes;
mod chain;
mod external;
mod refcount;
#[cfg(feature = "serde")]
mod serde;
mod utils;

#[cfg(feature = "std")]
mod capi;
#[cfg(feature = "std")]
mod copy_all;
#[cfg(feature = "std")]
mod error;
#[cfg(feature = "std")]
mod file;
#[cfg(feature = "std")]
mod reader;
#[cfg(feature = "std")]
mod records;
#[cfg(feature = "std")]
mod writer;

pub use crate::{
    block::BlockBuf,
    chain::{BlockIter, Blocks, Chain, Options, Source},
    external::ExternalBytes,
};

#[cfg(feature = "std")]
pub use crate::{
    capi::{
        bytechain_buffer_free, bytechain_reader_close, bytechain_reader_open,
        bytechain_reader_read, BytechainReader,
    },
    copy_all::copy_all,
    error::Status,
    file::{FileReader, FileWriter},
    reader::{ChainReader, Reader, SliceReader},
    records::{RecordReader, RecordWriter},
    writer::{ChainWriter, VecWriter, Writer},
};
