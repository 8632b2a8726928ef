use alloc::{string::String, vec::Vec};
use core::fmt;

use ::serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::Chain;

impl Serialize for Chain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.num_blocks() <= 1 {
            let mut fragments = self.blocks();
            return serializer.serialize_bytes(fragments.next().unwrap_or(&[]));
        }
        serializer.serialize_bytes(&self.to_vec())
    }
}

struct ChainVisitor;

impl<'de> de::Visitor<'de> for ChainVisitor {
    type Value = Chain;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a byte string")
    }

    fn visit_bytes<E: de::Error>(self, bytes: &[u8]) -> Result<Chain, E> {
        Ok(Chain::from(bytes))
    }

    fn visit_byte_buf<E: de::Error>(self, bytes: Vec<u8>) -> Result<Chain, E> {
        Ok(Chain::from(bytes))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Chain, E> {
        Ok(Chain::from(s))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Chain, E> {
        Ok(Chain::from(s))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Chain, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(Chain::from(bytes))
    }
}

impl<'de> Deserialize<'de> for Chain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Chain, D::Error> {
        deserializer.deserialize_byte_buf(ChainVisitor)
    }
}
