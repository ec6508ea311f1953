//! Interning index for attribute collections
//!
//! Each collection is stored as a sorted, flat `[k0, v0, k1, v1, ...]`
//! array of string ids. The returned id is offset by two so that `0` and `1`
//! stay free for the "no attributes" and "empty attributes" sentinels.
//!
//! Stream format (little-endian):
//!   mode:        u8  (0 = direct ids, 1 = increase-one array follows)
//!   collections: u64 size + blob
//!   strings:     u64 size + blob
//!   [mode 1]     u64 count + count x u32

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::io::{Read, Write};

use rustc_hash::FxHashMap;

use super::blob::BlobIndex;
use super::{Attribute, AttributeCollection, AttributesIndexMode};
use crate::error::{Error, Result};
use crate::formats::le;

/// Id for "no attribute collection"
pub const NULL_ATTRIBUTES: u32 = 0;
/// Id for a collection with zero attributes
pub const EMPTY_ATTRIBUTES: u32 = 1;

const PAIR_BASE: i64 = i32::MAX as i64;
const INCREASE_ONE_BLOCK: usize = 1024;

/// Key for the reverse collection index: a sorted id array compared
/// element-wise and hashed as `hash(len) ^ hash(e0) ^ hash(e1) ^ ...`.
#[derive(Debug, Clone, Eq)]
struct SortedIds(Box<[i32]>);

impl PartialEq for SortedIds {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

impl Hash for SortedIds {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut hash = self.0.len() as u64;
        for &id in self.0.iter() {
            hash ^= id as u32 as u64;
        }
        state.write_u64(hash);
    }
}

/// Deduplicating store of attribute collections
#[derive(Debug)]
pub struct AttributesIndex {
    strings: BlobIndex<str>,
    collections: BlobIndex<[i32]>,
    /// Dense id -> collection id, when `increase_one` is active
    increase_one: Option<Vec<u32>>,
    next_id: u32,
    readonly: bool,
    mode: AttributesIndexMode,
    string_reverse: Option<FxHashMap<String, i32>>,
    collection_reverse: Option<FxHashMap<SortedIds, u32>>,
}

impl AttributesIndex {
    /// Create a writable index; the all-false mode is rejected
    pub fn new(mode: AttributesIndexMode) -> Result<Self> {
        mode.validate()?;
        let string_reverse = (mode.reverse_string_index || mode.reverse_string_index_keys_only)
            .then(FxHashMap::default);
        let collection_reverse = mode.reverse_collection_index.then(FxHashMap::default);
        let increase_one = mode
            .increase_one
            .then(|| Vec::with_capacity(INCREASE_ONE_BLOCK));

        Ok(Self {
            strings: BlobIndex::new(),
            collections: BlobIndex::new(),
            increase_one,
            next_id: 0,
            readonly: false,
            mode,
            string_reverse,
            collection_reverse,
        })
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// True when strings are deduplicated on insert
    pub fn check_duplicates(&self) -> bool {
        self.string_reverse.is_some()
    }

    pub fn mode(&self) -> AttributesIndexMode {
        self.mode
    }

    /// Number of ids handed out, sentinels included.
    ///
    /// Only defined when the index keeps an increase-one array.
    pub fn count(&self) -> Result<u32> {
        match self.increase_one {
            Some(_) => Ok(self.next_id + 2),
            None => Err(Error::invalid_operation(
                "count cannot be calculated on an index without increase-one mode",
            )),
        }
    }

    /// Resolve an id into a read-only collection
    pub fn get(&self, id: u32) -> Result<Option<AttributeCollection>> {
        match id {
            NULL_ATTRIBUTES => return Ok(None),
            EMPTY_ATTRIBUTES => return Ok(Some(AttributeCollection::readonly(Vec::new()))),
            _ => {}
        }

        let collection_id = match &self.increase_one {
            Some(ids) => *ids
                .get((id - 2) as usize)
                .filter(|_| id - 2 < self.next_id)
                .ok_or_else(|| Error::invalid_argument(format!("unknown attributes id {id}")))?,
            None => id - 2,
        };

        let pairs = self.collections.get(collection_id)?;
        let mut attributes = Vec::with_capacity(pairs.len() / 2);
        for pair in pairs.chunks_exact(2) {
            attributes.push(Attribute {
                key: self.strings.get(pair[0] as u32)?,
                value: self.strings.get(pair[1] as u32)?,
            });
        }
        Ok(Some(AttributeCollection::readonly(attributes)))
    }

    /// Intern a collection and return its id.
    ///
    /// `None` maps to [`NULL_ATTRIBUTES`] and an empty collection to
    /// [`EMPTY_ATTRIBUTES`]; neither touches the index.
    pub fn add(&mut self, attributes: Option<&AttributeCollection>) -> Result<u32> {
        let attributes = match attributes {
            None => return Ok(NULL_ATTRIBUTES),
            Some(a) if a.is_empty() => return Ok(EMPTY_ATTRIBUTES),
            Some(a) => a,
        };
        if self.readonly {
            return Err(Error::invalid_operation(
                "this attributes index is read-only",
            ));
        }

        let mut sorted = BTreeSet::new();
        for attribute in attributes.iter() {
            let key = self.add_string(&attribute.key, true)? as i64;
            let value = self.add_string(&attribute.value, false)? as i64;
            sorted.insert(key + PAIR_BASE * value);
        }

        let mut flat = Vec::with_capacity(sorted.len() * 2);
        for pair in sorted {
            flat.push((pair % PAIR_BASE) as i32);
            flat.push((pair / PAIR_BASE) as i32);
        }
        self.add_collection(flat.into_boxed_slice())
    }

    fn add_string(&mut self, value: &str, is_key: bool) -> Result<i32> {
        if self.mode.dedups_string(is_key) {
            if let Some(&id) = self.string_reverse.as_ref().and_then(|r| r.get(value)) {
                return Ok(id);
            }
        }
        let id = self.strings.add(value)?;
        let id = i32::try_from(id)
            .map_err(|_| Error::invalid_operation("string index exceeds i32 id space"))?;
        if self.mode.dedups_string(is_key) {
            if let Some(reverse) = self.string_reverse.as_mut() {
                reverse.insert(value.to_string(), id);
            }
        }
        Ok(id)
    }

    fn add_collection(&mut self, collection: Box<[i32]>) -> Result<u32> {
        let key = SortedIds(collection);
        if let Some(&id) = self.collection_reverse.as_ref().and_then(|r| r.get(&key)) {
            return Ok(id + 2);
        }

        let mut id = self.collections.add(&key.0[..])?;
        if let Some(ids) = self.increase_one.as_mut() {
            ids.push(id);
            id = self.next_id;
            self.next_id += 1;
        }
        if id > u32::MAX - 2 {
            return Err(Error::invalid_operation("attributes id space exhausted"));
        }
        if let Some(reverse) = self.collection_reverse.as_mut() {
            reverse.insert(key, id);
        }
        Ok(id + 2)
    }

    /// Write the index; returns the number of bytes written
    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<u64> {
        match &self.increase_one {
            None => {
                writer.write_all(&[0u8])?;
                let mut size = self.collections.write_with_size(writer)?;
                size += self.strings.write_with_size(writer)?;
                Ok(size + 1)
            }
            Some(ids) => {
                writer.write_all(&[1u8])?;
                let mut size = self.collections.write_with_size(writer)?;
                size += self.strings.write_with_size(writer)?;
                let live = &ids[..self.next_id as usize];
                writer.write_all(&(live.len() as u64).to_le_bytes())?;
                le::write_u32_slice(writer, live)?;
                Ok(size + 1 + 8 + live.len() as u64 * 4)
            }
        }
    }

    /// Read an index written by [`serialize`](Self::serialize).
    ///
    /// The result is read-only and carries no reverse indexes.
    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self> {
        let mode_byte = le::read_u8(reader)?;
        if mode_byte > 1 {
            return Err(Error::corrupt(format!(
                "invalid attributes index mode byte: {mode_byte}"
            )));
        }
        let collections = BlobIndex::read_with_size(reader)?;
        let strings = BlobIndex::read_with_size(reader)?;

        let (increase_one, next_id) = if mode_byte == 1 {
            let count = le::read_u64(reader)?;
            let count = u32::try_from(count)
                .map_err(|_| Error::corrupt(format!("increase-one array too long: {count}")))?;
            let ids = le::read_u32_vec(reader, count as usize)?;
            (Some(ids), count)
        } else {
            (None, 0)
        };

        Ok(Self {
            strings,
            collections,
            increase_one,
            next_id,
            readonly: true,
            mode: AttributesIndexMode::NONE,
            string_reverse: None,
            collection_reverse: None,
        })
    }
}

impl Default for AttributesIndex {
    fn default() -> Self {
        Self {
            strings: BlobIndex::new(),
            collections: BlobIndex::new(),
            increase_one: None,
            next_id: 0,
            readonly: false,
            mode: AttributesIndexMode::REVERSE_ALL,
            string_reverse: Some(FxHashMap::default()),
            collection_reverse: Some(FxHashMap::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residential() -> AttributeCollection {
        AttributeCollection::from_pairs(&[("highway", "residential"), ("name", "Rue Haute")])
    }

    #[test]
    fn test_sentinels() {
        let mut index = AttributesIndex::default();
        assert_eq!(index.add(None).unwrap(), NULL_ATTRIBUTES);
        assert_eq!(index.add(Some(&AttributeCollection::new())).unwrap(), EMPTY_ATTRIBUTES);
        assert_eq!(index.get(NULL_ATTRIBUTES).unwrap(), None);
        let empty = index.get(EMPTY_ATTRIBUTES).unwrap().unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_add_get_roundtrip() {
        let mut index = AttributesIndex::default();
        let id = index.add(Some(&residential())).unwrap();
        assert!(id >= 2);
        let back = index.get(id).unwrap().unwrap();
        assert_eq!(back, residential());
        assert!(back.is_readonly());
    }

    #[test]
    fn test_reverse_collection_index_dedups() {
        let mut index = AttributesIndex::default();
        let a = index.add(Some(&residential())).unwrap();
        let reordered = AttributeCollection::from_pairs(&[("name", "Rue Haute"), ("highway", "residential")]);
        let b = index.add(Some(&reordered)).unwrap();
        assert_eq!(a, b);

        let other = AttributeCollection::from_pairs(&[("highway", "primary")]);
        assert_ne!(index.add(Some(&other)).unwrap(), a);
    }

    #[test]
    fn test_no_collection_dedup_without_reverse_index() {
        let mode = AttributesIndexMode {
            reverse_string_index: true,
            ..AttributesIndexMode::NONE
        };
        let mut index = AttributesIndex::new(mode).unwrap();
        let a = index.add(Some(&residential())).unwrap();
        let b = index.add(Some(&residential())).unwrap();
        assert_ne!(a, b);
        assert_eq!(index.get(a).unwrap(), index.get(b).unwrap());
    }

    #[test]
    fn test_count_requires_increase_one() {
        let index = AttributesIndex::default();
        assert!(matches!(index.count(), Err(Error::InvalidOperation(_))));

        let mode = AttributesIndexMode {
            increase_one: true,
            ..AttributesIndexMode::REVERSE_ALL
        };
        let mut index = AttributesIndex::new(mode).unwrap();
        assert_eq!(index.count().unwrap(), 2);
        let a = index.add(Some(&residential())).unwrap();
        let b = index.add(Some(&AttributeCollection::from_pairs(&[("highway", "primary")]))).unwrap();
        assert_eq!((a, b), (2, 3));
        assert_eq!(index.add(Some(&residential())).unwrap(), a);
        assert_eq!(index.count().unwrap(), 4);
    }

    #[test]
    fn test_none_mode_rejected() {
        assert!(matches!(
            AttributesIndex::new(AttributesIndexMode::NONE),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_serialize_direct_ids() {
        let mut index = AttributesIndex::default();
        let id = index.add(Some(&residential())).unwrap();

        let mut out = Vec::new();
        let written = index.serialize(&mut out).unwrap();
        assert_eq!(written as usize, out.len());
        assert_eq!(out[0], 0);

        let mut restored = AttributesIndex::deserialize(&mut out.as_slice()).unwrap();
        assert!(restored.is_readonly());
        assert!(!restored.check_duplicates());
        assert_eq!(restored.get(id).unwrap().unwrap(), residential());
        assert!(matches!(restored.count(), Err(Error::InvalidOperation(_))));
        assert!(matches!(
            restored.add(Some(&residential())),
            Err(Error::InvalidOperation(_))
        ));
        // sentinels keep working on read-only indexes
        assert_eq!(restored.add(None).unwrap(), NULL_ATTRIBUTES);
    }

    #[test]
    fn test_serialize_increase_one() {
        let mode = AttributesIndexMode {
            increase_one: true,
            reverse_collection_index: true,
            ..AttributesIndexMode::NONE
        };
        let mut index = AttributesIndex::new(mode).unwrap();
        let ids: Vec<u32> = ["residential", "primary", "service"]
            .iter()
            .map(|h| index.add(Some(&AttributeCollection::from_pairs(&[("highway", *h)]))).unwrap())
            .collect();

        let mut out = Vec::new();
        index.serialize(&mut out).unwrap();
        assert_eq!(out[0], 1);

        let restored = AttributesIndex::deserialize(&mut out.as_slice()).unwrap();
        assert_eq!(restored.count().unwrap(), 5);
        for (id, highway) in ids.iter().zip(["residential", "primary", "service"]) {
            assert_eq!(restored.get(*id).unwrap().unwrap().get("highway"), Some(highway));
        }
    }

    #[test]
    fn test_deserialize_rejects_bad_mode_and_truncation() {
        assert!(matches!(
            AttributesIndex::deserialize(&mut [7u8].as_slice()),
            Err(Error::Corrupt(_))
        ));
        assert!(matches!(
            AttributesIndex::deserialize(&mut [0u8, 1, 2].as_slice()),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_deserialize_rejects_oversized_blob_prefix() {
        let data = [0u8, 255, 255, 255, 255, 255, 255, 255, 127];
        assert!(matches!(
            AttributesIndex::deserialize(&mut data.as_slice()),
            Err(Error::Corrupt(_))
        ));

        let mut increase_one = vec![1u8];
        increase_one.extend_from_slice(&0u64.to_le_bytes());
        increase_one.extend_from_slice(&0u64.to_le_bytes());
        increase_one.extend_from_slice(&u64::from(u32::MAX).to_le_bytes());
        assert!(matches!(
            AttributesIndex::deserialize(&mut increase_one.as_slice()),
            Err(Error::Corrupt(_))
        ));
    }
}
