use std::{sync::Arc, thread};

use bytechain::Chain;

// chains sharing blocks may be read from many threads at once
#[test]
fn concurrent_readers() {
    let mut chain = Chain::new();
    for i in 0..50u8 {
        chain.append(vec![i; 100]);
    }
    let chain = Arc::new(chain);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let chain = Arc::clone(&chain);
        handles.push(thread::spawn(move || {
            let bytes = chain.to_vec();
            assert_eq!(bytes.len(), 5000);
            for (index, &byte) in bytes.iter().enumerate() {
                assert_eq!(byte, (index / 100) as u8);
            }
            chain.as_ref().clone()
        }));
    }
    for handle in handles {
        let clone = handle.join().unwrap();
        assert_eq!(clone, *chain);
    }
}

// clones dropped on other threads release the blocks exactly once
#[test]
fn concurrent_clone_and_drop() {
    for _ in 0..100 {
        let chain = Chain::from(vec![b'z'; 4096]);
        let clones: Vec<Chain> = (0..4).map(|_| chain.clone()).collect();
        let handles: Vec<_> = clones
            .into_iter()
            .map(|clone| {
                thread::spawn(move || {
                    assert_eq!(clone.len(), 4096);
                    drop(clone);
                })
            })
            .collect();
        drop(chain);
        for handle in handles {
            handle.join().unwrap();
        }
    }
}

// a clone taken on another thread observes the bytes written before sharing
#[test]
fn writes_happen_before_sharing() {
    for round in 0..50u32 {
        let mut chain = Chain::new();
        chain.append(round.to_le_bytes().to_vec());
        chain.append(vec![b'p'; 2000]);
        let clone = chain.clone();
        let handle = thread::spawn(move || {
            let bytes = clone.to_vec();
            assert_eq!(&bytes[..4], round.to_le_bytes());
            assert_eq!(bytes.len(), 2004);
        });
        drop(chain);
        handle.join().unwrap();
    }
}
