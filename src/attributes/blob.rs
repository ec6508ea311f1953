//! Append-only blob storage where an element's id is its byte offset
//!
//! Layout per element (little-endian):
//!   str:   u32 byte length, then UTF-8 bytes
//!   [i32]: u32 element count, then i32 values
//!
//! Serialized form: u64 blob length followed by the raw blob.

use std::io::{Read, Write};
use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::formats::le;

/// Element types that can live in a [`BlobIndex`]
pub trait BlobElement {
    type Owned;

    fn encode(&self, out: &mut Vec<u8>);

    /// Decode one element from the start of `bytes`
    fn decode(bytes: &[u8]) -> Result<Self::Owned>;
}

fn length_prefix(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < 4 {
        return Err(Error::corrupt("blob element header truncated"));
    }
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
}

impl BlobElement for str {
    type Owned = String;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.len() as u32).to_le_bytes());
        out.extend_from_slice(self.as_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<String> {
        let len = length_prefix(bytes)?;
        let payload = bytes
            .get(4..4 + len)
            .ok_or_else(|| Error::corrupt("string blob truncated"))?;
        String::from_utf8(payload.to_vec()).map_err(|e| Error::corrupt(format!("invalid UTF-8 in string blob: {e}")))
    }
}

impl BlobElement for [i32] {
    type Owned = Vec<i32>;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.len() as u32).to_le_bytes());
        for v in self {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    fn decode(bytes: &[u8]) -> Result<Vec<i32>> {
        let count = length_prefix(bytes)?;
        let payload = bytes
            .get(4..4 + count * 4)
            .ok_or_else(|| Error::corrupt("collection blob truncated"))?;
        Ok(payload
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

/// Growable byte buffer of variable-length elements
pub struct BlobIndex<T: ?Sized> {
    data: Vec<u8>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: ?Sized + BlobElement> BlobIndex<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Append an element and return its id (byte offset)
    pub fn add(&mut self, element: &T) -> Result<u32> {
        let id = u32::try_from(self.data.len())
            .map_err(|_| Error::invalid_operation("blob index exceeds 4 GiB"))?;
        element.encode(&mut self.data);
        Ok(id)
    }

    pub fn get(&self, id: u32) -> Result<T::Owned> {
        let bytes = self
            .data
            .get(id as usize..)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| Error::invalid_argument(format!("no blob element at id {id}")))?;
        T::decode(bytes)
    }

    /// Size of the blob in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Write the blob prefixed by its u64 length; returns bytes written
    pub fn write_with_size<W: Write>(&self, writer: &mut W) -> Result<u64> {
        writer.write_all(&(self.data.len() as u64).to_le_bytes())?;
        writer.write_all(&self.data)?;
        Ok(8 + self.data.len() as u64)
    }

    pub fn read_with_size<R: Read>(reader: &mut R) -> Result<Self> {
        let size = le::read_u64(reader)?;
        let data = le::read_bytes(reader, size)?;
        Ok(Self {
            data,
            _marker: PhantomData,
        })
    }
}

impl<T: ?Sized + BlobElement> Default for BlobIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for BlobIndex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobIndex").field("size", &self.data.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_ids_are_offsets() {
        let mut index: BlobIndex<str> = BlobIndex::new();
        let a = index.add("highway").unwrap();
        let b = index.add("residential").unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 4 + "highway".len() as u32);
        assert_eq!(index.get(a).unwrap(), "highway");
        assert_eq!(index.get(b).unwrap(), "residential");
    }

    #[test]
    fn test_collection_elements() {
        let mut index: BlobIndex<[i32]> = BlobIndex::new();
        let a = index.add(&[1, 2, 3, 4][..]).unwrap();
        let b = index.add(&[][..]).unwrap();
        assert_eq!(index.get(a).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(index.get(b).unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn test_unknown_id() {
        let mut index: BlobIndex<str> = BlobIndex::new();
        index.add("x").unwrap();
        assert!(matches!(index.get(100), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_size_prefixed_stream() {
        let mut index: BlobIndex<str> = BlobIndex::new();
        index.add("oneway").unwrap();
        let mut out = Vec::new();
        let written = index.write_with_size(&mut out).unwrap();
        assert_eq!(written as usize, out.len());

        let restored: BlobIndex<str> = BlobIndex::read_with_size(&mut out.as_slice()).unwrap();
        assert_eq!(restored.get(0).unwrap(), "oneway");
    }

    #[test]
    fn test_oversized_length_prefix_is_corrupt() {
        let mut data = (i64::MAX as u64).to_le_bytes().to_vec();
        data.extend_from_slice(b"abc");
        let result: Result<BlobIndex<str>> = BlobIndex::read_with_size(&mut data.as_slice());
        assert!(matches!(result, Err(Error::Corrupt(_))));
    }
}
