use bytes::Bytes;
use bytechain::{BlockBuf, Chain, Options};

// round trip through string-ish conversions preserves the bytes
#[test]
fn round_trip() {
    for src in [&b""[..], b"short", &[7u8; 10_000][..]] {
        let chain = Chain::from(src);
        assert_eq!(chain.to_vec(), src);
        assert_eq!(&Bytes::from(chain.clone())[..], src);
        assert_eq!(chain.clone().into_vec(), src);
        assert_eq!(chain, *src);
    }
}

// appending chains concatenates their contents
#[test]
fn concatenation_law() {
    let parts: &[&[u8]] = &[b"", b"tiny", &[b'x'; 700], &[b'y'; 40], b"end"];
    for &a in parts {
        for &b in parts {
            let mut left = Chain::from(a);
            left.append(&Chain::from(b));
            let mut expected = a.to_vec();
            expected.extend_from_slice(b);
            assert_eq!(left.to_vec(), expected);
        }
    }
}

// removing a prefix and prepending it back restores the chain, and same for
// suffixes
#[test]
fn remove_then_restore() {
    let mut bytes = Vec::new();
    for i in 0..3000u32 {
        bytes.push((i % 256) as u8);
    }
    let original = Chain::from(bytes.clone());
    for n in [0, 1, 14, 15, 16, 511, 512, 1500, 3000] {
        let mut chain = original.clone();
        chain.remove_prefix(n);
        chain.prepend(&bytes[..n]);
        assert_eq!(chain, original);

        let mut chain = original.clone();
        chain.remove_suffix(n);
        chain.append(&bytes[bytes.len() - n..]);
        assert_eq!(chain, original);
    }
}

// appending 10 bytes 1000 times coalesces into few blocks
#[test]
fn scenario_repeated_small_appends() {
    let mut chain = Chain::new();
    for _ in 0..1000 {
        chain.append(&b"abcdefghij"[..]);
    }
    assert_eq!(chain.len(), 10_000);
    assert_eq!(chain.to_vec(), b"abcdefghij".repeat(1000));
    // no chains of tiny blocks
    assert!(chain.blocks().count() <= 1000 * 10 / 16);
    assert!(chain.blocks().count() <= 32);
}

// a copy shares storage but mutations never leak across owners
#[test]
fn scenario_copy_on_share() {
    let chain = Chain::from(&b"hello"[..]);
    let mut copy = chain.clone();
    copy.append(&b" world"[..]);
    assert_eq!(chain, "hello");
    assert_eq!(copy, "hello world");
}

// trimming both ends of a large chain keeps the original allocation
#[test]
fn scenario_trim_keeps_backing_block() {
    let mut chain = Chain::from(vec![b'a'; 5000]);
    let base = chain.blocks().next().unwrap().as_ptr();
    chain.remove_prefix(2500);
    chain.remove_suffix(1000);
    assert_eq!(chain.len(), 1500);
    let flat = chain.flatten();
    assert_eq!(flat, &[b'a'; 1500][..]);
    assert_eq!(flat.as_ptr(), unsafe { base.add(2500) });
}

// large flat fragments become external blocks, small ones are copied and
// merged
#[test]
fn scenario_bytes_fragments() {
    let mut chain = Chain::new();
    chain.append(Bytes::from(vec![b'a'; 4]));
    chain.append(Bytes::from(vec![b'b'; 8000]));
    chain.append(Bytes::from(vec![b'c'; 12]));
    assert_eq!(chain.len(), 8016);
    assert!(chain.blocks().count() <= 3);
    assert_eq!(chain.blocks().filter(|f| f.len() >= 8000).count(), 1);
    let mut expected = vec![b'a'; 4];
    expected.extend_from_slice(&[b'b'; 8000]);
    expected.extend_from_slice(&[b'c'; 12]);
    assert_eq!(chain.to_vec(), expected);

    // the large fragment is shared with the original `Bytes`, not copied
    let big = Bytes::from(vec![b'z'; 8000]);
    let big_ptr = big.as_ptr();
    let chain = Chain::from(big);
    assert_eq!(chain.blocks().next().unwrap().as_ptr(), big_ptr);
    // and converting back reuses it again
    assert_eq!(chain.into_bytes().as_ptr(), big_ptr);
}

// comparison agrees with comparison of the flattened bytes
#[test]
fn comparison_law() {
    let cases: &[&[u8]] = &[b"", b"a", b"aa", b"ab", b"b", &[b'a'; 600]];
    for &a in cases {
        for &b in cases {
            // fragment `a` to exercise multi-block comparison
            let mut chain_a = Chain::new();
            for piece in a.chunks(3) {
                chain_a.append(piece);
            }
            let chain_b = Chain::from(b);
            assert_eq!(chain_a.cmp(&chain_b), a.cmp(b));
        }
    }
}

// a buffer requested through Options with a size hint sizes blocks for the
// promised total
#[test]
fn size_hint_sizes_blocks() {
    let mut chain = Chain::new();
    let options = Options::new().with_size_hint(100_000);
    for _ in 0..10_000 {
        chain.append_with(&b"0123456789"[..], &options);
    }
    assert_eq!(chain.len(), 100_000);
    // a hinted chain needs fewer blocks than an unhinted one
    let mut unhinted = Chain::new();
    for _ in 0..10_000 {
        unhinted.append(&b"0123456789"[..]);
    }
    assert!(chain.blocks().count() <= unhinted.blocks().count());
}

// externally owned bytes are wrapped, not copied
#[test]
fn external_wrapping() {
    static PAYLOAD: [u8; 1000] = [b'e'; 1000];
    let buf = BlockBuf::from_external(&PAYLOAD[..]);
    assert_eq!(buf.len(), 1000);
    let chain = Chain::from(buf);
    assert_eq!(chain.blocks().next().unwrap().as_ptr(), PAYLOAD.as_ptr());
    assert_eq!(chain.len(), 1000);
}

// a BlockBuf grows in place and feeds the chain without copying
#[test]
fn block_buf_into_chain() {
    let options = Options::default();
    let mut buf = BlockBuf::new();
    for _ in 0..64 {
        buf.append(&[b'q'; 32], &options);
    }
    assert_eq!(buf.len(), 2048);
    let base = buf.as_slice().as_ptr();
    let chain = Chain::from(buf);
    assert_eq!(chain.blocks().next().unwrap().as_ptr(), base);
}

// zero-filled chains cost no arena allocations
#[test]
fn zeroed_chain() {
    let chain = Chain::zeroed(100_000);
    assert_eq!(chain.len(), 100_000);
    assert!(chain.to_vec().iter().all(|&b| b == 0));
}

// position lookup matches byte indexing across many blocks
#[test]
fn position_lookup() {
    let mut chain = Chain::new();
    let mut expected = Vec::new();
    for i in 0..100u8 {
        let fragment = vec![i; 61];
        expected.extend_from_slice(&fragment);
        chain.append(fragment);
    }
    for index in (0..chain.len()).step_by(37) {
        let (iter, offset) = chain.position(index);
        assert_eq!(iter.get().unwrap()[offset], expected[index]);
    }
}
