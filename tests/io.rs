use std::ffi::CString;

use bytechain::{
    bytechain_buffer_free, bytechain_reader_close, bytechain_reader_open, bytechain_reader_read,
    copy_all, Chain, ChainReader, ChainWriter, FileReader, FileWriter, Reader, RecordReader,
    RecordWriter, SliceReader, Status, VecWriter, Writer,
};

// pull/skip/read over a memory buffer, ending with a clean EOF
#[test]
fn slice_reader_basics() {
    let mut reader = SliceReader::new(&[0, 1, 2, 3, 4]);
    assert!(reader.pull(5, 0));
    assert!(reader.available() >= 5);
    assert!(reader.skip(3));
    let mut out = Vec::new();
    assert!(reader.read(2, &mut out));
    assert_eq!(out, [3, 4]);
    assert!(!reader.pull(1, 0));
    assert!(reader.ok());
    assert_eq!(reader.pos(), 5);
}

// chain reader serves windows per block and gathers spanning pulls
#[test]
fn chain_reader_windows() {
    let mut chain = Chain::new();
    chain.append(vec![b'a'; 1000]);
    chain.append(vec![b'b'; 1000]);
    let mut reader = ChainReader::new(&chain);
    assert_eq!(reader.size(), Some(2000));
    assert!(reader.skip(990));
    // this pull spans the block boundary
    assert!(reader.pull(20, 0));
    assert!(reader.available() >= 20);
    assert_eq!(&reader.chunk()[..20], &[&[b'a'; 10][..], &[b'b'; 10][..]].concat()[..]);
    reader.consume(20);
    assert_eq!(reader.pos(), 1010);
    assert!(reader.seek(0));
    let mut out = Vec::new();
    assert!(reader.read(2000, &mut out));
    assert_eq!(out.len(), 2000);
    assert!(!reader.pull(1, 0));
    assert!(reader.ok());
}

// reading into a chain shares the source's blocks instead of copying
#[test]
fn chain_reader_shares_blocks() {
    let chain = Chain::from(vec![b'x'; 5000]);
    let base = chain.blocks().next().unwrap().as_ptr();
    let mut reader = ChainReader::new(&chain);
    assert!(reader.skip(1000));
    let mut dest = Chain::new();
    assert!(reader.read_chain(3000, &mut dest));
    assert_eq!(dest.len(), 3000);
    assert_eq!(dest.blocks().next().unwrap().as_ptr(), unsafe {
        base.add(1000)
    });
    // and as Bytes
    assert!(reader.seek(1000));
    let bytes = reader.read_bytes(3000).unwrap();
    assert_eq!(bytes.as_ptr(), unsafe { base.add(1000) });
}

// chain writer fills windows in place and attaches written chains
#[test]
fn chain_writer_windows() {
    let mut dest = Chain::new();
    {
        let mut writer = ChainWriter::new(&mut dest);
        assert!(writer.write(b"header "));
        assert!(writer.push(5));
        let window = writer.writable();
        window[..5].copy_from_slice(b"body ");
        writer.advance(5);
        assert!(writer.write_chain(Chain::from(vec![b't'; 2000])));
        assert_eq!(writer.pos(), 7 + 5 + 2000);
        assert!(writer.flush());
    }
    assert_eq!(dest.len(), 2012);
    let flat = dest.flatten().to_vec();
    assert_eq!(&flat[..12], b"header body ");
    assert!(flat[12..].iter().all(|&b| b == b't'));
}

// an unfinished window is returned to the chain on drop
#[test]
fn chain_writer_trims_unused_window() {
    let mut dest = Chain::new();
    {
        let mut writer = ChainWriter::new(&mut dest);
        assert!(writer.push(100));
        let window = writer.writable();
        window[..3].copy_from_slice(b"abc");
        writer.advance(3);
    }
    assert_eq!(dest, "abc");
}

// copying with a budget stops at the budget with ResourceExhausted
#[test]
fn copy_all_respects_max_length() {
    let src_bytes = vec![b'c'; 200];
    let mut src = SliceReader::new(&src_bytes);
    let mut dest = VecWriter::new();
    let result = copy_all(&mut src, &mut dest, 100);
    assert!(matches!(result, Err(Status::ResourceExhausted(_))));
    assert_eq!(dest.into_vec(), vec![b'c'; 100]);
    assert_eq!(src.pos(), 100);
}

// a copy within the budget drains the source cleanly
#[test]
fn copy_all_within_budget() {
    let chain = Chain::from(vec![b'd'; 150]);
    let mut src = ChainReader::new(&chain);
    let mut dest = VecWriter::new();
    copy_all(&mut src, &mut dest, 1000).unwrap();
    assert_eq!(dest.into_vec(), vec![b'd'; 150]);
}

// records written to a chain read back in order, with a clean end of stream
#[test]
fn records_round_trip_in_memory() {
    let mut dest = Chain::new();
    {
        let mut writer = RecordWriter::new(ChainWriter::new(&mut dest));
        assert!(writer.write_record(b""));
        assert!(writer.write_record(b"one"));
        assert!(writer.write_record(&[b'r'; 300]));
        assert!(writer.write_record_chain(Chain::from(vec![b'q'; 5000])));
        assert!(writer.flush());
    }
    let mut reader = RecordReader::new(ChainReader::new(&dest));
    let mut record = Vec::new();
    assert!(reader.read_record(&mut record));
    assert_eq!(record, b"");
    assert!(reader.read_record(&mut record));
    assert_eq!(record, b"one");
    assert!(reader.read_record(&mut record));
    assert_eq!(record, vec![b'r'; 300]);
    let mut chain_record = Chain::new();
    assert!(reader.read_record_chain(&mut chain_record));
    assert_eq!(chain_record.len(), 5000);
    assert!(!reader.read_record(&mut record));
    assert!(reader.ok());
}

// a truncated record is an error, not an end of stream
#[test]
fn records_detect_truncation() {
    let mut dest = Chain::new();
    {
        let mut writer = RecordWriter::new(ChainWriter::new(&mut dest));
        assert!(writer.write_record(&[b'r'; 100]));
        assert!(writer.flush());
    }
    dest.remove_suffix(40);
    let mut reader = RecordReader::new(ChainReader::new(&dest));
    let mut record = Vec::new();
    assert!(!reader.read_record(&mut record));
    assert!(!reader.ok());
    assert!(matches!(reader.status(), Some(Status::InvalidArgument(_))));
}

// records survive a trip through the filesystem
#[test]
fn records_round_trip_through_file() {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("bytechain-io-{}", std::process::id()));
    {
        let writer = FileWriter::create(&path).unwrap();
        let mut records = RecordWriter::new(writer);
        for i in 0..100usize {
            assert!(records.write_record(format!("record {i}").as_bytes()));
        }
        assert!(records.flush());
    }
    {
        let reader = FileReader::open(&path).unwrap();
        let mut records = RecordReader::new(reader);
        let mut record = Vec::new();
        for i in 0..100usize {
            assert!(records.read_record(&mut record));
            assert_eq!(record, format!("record {i}").as_bytes());
        }
        assert!(!records.read_record(&mut record));
        assert!(records.ok());
    }
    std::fs::remove_file(&path).unwrap();
}

// file reader reports size, seeks, and annotates failures with the path
#[test]
fn file_reader_size_and_seek() {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("bytechain-seek-{}", std::process::id()));
    std::fs::write(&path, (0u8..100).collect::<Vec<u8>>()).unwrap();
    let mut reader = FileReader::open(&path).unwrap();
    assert!(reader.supports_size());
    assert_eq!(reader.size(), Some(100));
    assert!(reader.seek(42));
    let mut out = Vec::new();
    assert!(reader.read(3, &mut out));
    assert_eq!(out, [42, 43, 44]);
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(
        FileReader::open(dir.join("bytechain-definitely-missing")),
        Err(Status::Io { .. })
    ));
}

// the C entry points drive a whole open/read/free/close cycle
#[test]
fn c_api_round_trip() {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("bytechain-capi-{}", std::process::id()));
    {
        let mut records = RecordWriter::new(FileWriter::create(&path).unwrap());
        assert!(records.write_record(b"alpha"));
        assert!(records.write_record(b"beta"));
        assert!(records.flush());
    }
    let c_path = CString::new(path.to_str().unwrap()).unwrap();
    unsafe {
        let reader = bytechain_reader_open(c_path.as_ptr());
        assert!(!reader.is_null());
        // two readers may be open at once
        let second = bytechain_reader_open(c_path.as_ptr());
        assert!(!second.is_null());
        bytechain_reader_close(second);

        let mut len = 0usize;
        let buffer = bytechain_reader_read(reader, &mut len);
        assert_eq!(std::slice::from_raw_parts(buffer, len), b"alpha");
        bytechain_buffer_free(buffer, len);
        let buffer = bytechain_reader_read(reader, &mut len);
        assert_eq!(std::slice::from_raw_parts(buffer, len), b"beta");
        bytechain_buffer_free(buffer, len);
        assert!(bytechain_reader_read(reader, &mut len).is_null());
        bytechain_reader_close(reader);
    }
    std::fs::remove_file(&path).unwrap();
}
