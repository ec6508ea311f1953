use crate::error::{Error, Result};

use super::enumerator::{RestrictionEnumerator, RestrictionsFor};
use super::{BLOCK_SIZE, DEFAULT_HASH_COUNT, NO_DATA};

/// Hash-indexed store of vertex restrictions
#[derive(Debug, Clone)]
pub struct RestrictionsDb {
    hash_count: usize,
    pub(super) hashes: Vec<u32>,
    pub(super) index: Vec<u32>,
    next_index: usize,
    pub(super) restrictions: Vec<u32>,
    next_restriction: usize,
    count: u64,
    has_complex: bool,
    max_len: usize,
}

impl RestrictionsDb {
    /// Create an empty db with `hash_count` buckets (at least one)
    pub fn new(hash_count: usize) -> Self {
        let hash_count = hash_count.clamp(1, i32::MAX as usize / 2);
        Self {
            hash_count,
            hashes: vec![NO_DATA; hash_count * 2],
            index: vec![NO_DATA; BLOCK_SIZE],
            next_index: 0,
            restrictions: vec![NO_DATA; BLOCK_SIZE],
            next_restriction: 0,
            count: 0,
            has_complex: false,
            max_len: 0,
        }
    }

    pub fn hash_count(&self) -> usize {
        self.hash_count
    }

    /// Number of restrictions stored
    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// True when at least one restriction spans more than one vertex
    pub fn has_complex_restrictions(&self) -> bool {
        self.has_complex
    }

    /// Length of the longest restriction, 0 when empty
    pub fn max_restriction_len(&self) -> usize {
        self.max_len
    }

    /// Add a restriction; an empty sequence is rejected without changes
    pub fn add(&mut self, vertices: &[u32]) -> Result<()> {
        if vertices.is_empty() {
            return Err(Error::invalid_argument(
                "restriction should contain one or more vertices",
            ));
        }
        let pointer = u32::try_from(self.next_restriction)
            .ok()
            .filter(|&p| p != NO_DATA)
            .ok_or_else(|| Error::invalid_operation("restriction arena is full"))?;

        let len = vertices.len();
        while self.next_restriction + len + 1 >= self.restrictions.len() {
            self.restrictions
                .resize(self.restrictions.len() + BLOCK_SIZE, NO_DATA);
        }
        let at = self.next_restriction;
        self.restrictions[at] = len as u32;
        self.restrictions[at + 1..at + 1 + len].copy_from_slice(vertices);
        self.next_restriction += len + 1;

        self.count += 1;
        if len > 1 {
            self.has_complex = true;
        }
        self.max_len = self.max_len.max(len);

        self.add_by_pointer(pointer);
        Ok(())
    }

    /// Exchange two vertex ids in every restriction that mentions either.
    ///
    /// Applying the same switch twice restores the original content.
    pub fn switch(&mut self, vertex1: u32, vertex2: u32) {
        if vertex1 == vertex2 {
            return;
        }

        let mut pointers = Vec::new();
        for vertex in [vertex1, vertex2] {
            for &pointer in self.bucket(self.hash(vertex)) {
                if !pointers.contains(&pointer) && self.record(pointer).contains(&vertex) {
                    pointers.push(pointer);
                }
            }
        }

        for pointer in pointers {
            self.remove_by_pointer(pointer);
            let at = pointer as usize;
            let len = self.restrictions[at] as usize;
            for v in &mut self.restrictions[at + 1..at + 1 + len] {
                if *v == vertex1 {
                    *v = vertex2;
                } else if *v == vertex2 {
                    *v = vertex1;
                }
            }
            self.add_by_pointer(pointer);
        }
    }

    /// Enumerator positioned on nothing; call `move_to` first
    pub fn enumerator(&self) -> RestrictionEnumerator<'_> {
        RestrictionEnumerator::new(self)
    }

    /// Every restriction that contains `vertex`, at any position
    pub fn restrictions_for(&self, vertex: u32) -> RestrictionsFor<'_> {
        RestrictionsFor::new(self, vertex)
    }

    /// All stored restrictions in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &[u32]> + '_ {
        let mut at = 0usize;
        std::iter::from_fn(move || {
            if at >= self.next_restriction {
                return None;
            }
            let len = self.restrictions[at] as usize;
            let record = &self.restrictions[at + 1..at + 1 + len];
            at += len + 1;
            Some(record)
        })
    }

    pub(super) fn hash(&self, vertex: u32) -> usize {
        ((vertex as i32) % (self.hash_count as i32)).unsigned_abs() as usize * 2
    }

    /// Pointers stored in the bucket at `hash`
    pub(super) fn bucket(&self, hash: usize) -> &[u32] {
        match self.hashes[hash] {
            NO_DATA => &[],
            bucket => {
                let bucket = bucket as usize;
                let size = self.index[bucket] as usize;
                &self.index[bucket + 1..bucket + 1 + size]
            }
        }
    }

    pub(super) fn record(&self, pointer: u32) -> &[u32] {
        let at = pointer as usize;
        let len = self.restrictions[at] as usize;
        &self.restrictions[at + 1..at + 1 + len]
    }

    fn ensure_index(&mut self, required: usize) {
        while self.index.len() < required {
            self.index.resize(self.index.len() + BLOCK_SIZE, NO_DATA);
        }
    }

    fn add_by_pointer(&mut self, pointer: u32) {
        let at = pointer as usize;
        let len = self.restrictions[at] as usize;
        for i in 0..len {
            let vertex = self.restrictions[at + 1 + i];
            self.add_pointer(vertex, pointer);
        }
    }

    fn add_pointer(&mut self, vertex: u32, pointer: u32) {
        let hash = self.hash(vertex);
        if self.hashes[hash] == NO_DATA {
            let bucket = self.next_index;
            self.ensure_index(bucket + 2);
            self.index[bucket] = 1;
            self.index[bucket + 1] = pointer;
            self.hashes[hash] = bucket as u32;
            self.next_index += 2;
            return;
        }

        let mut bucket = self.hashes[hash] as usize;
        let size = self.index[bucket] as usize;
        if self.index[bucket + 1..bucket + 1 + size].contains(&pointer) {
            return;
        }

        // capacity is the next power of two at or above size
        if size.is_power_of_two() {
            let new_space = size * 2;
            let new_bucket = self.next_index;
            self.ensure_index(new_bucket + new_space + 1);
            self.index
                .copy_within(bucket..bucket + size + 1, new_bucket);
            self.hashes[hash] = new_bucket as u32;
            self.next_index += new_space + 1;
            bucket = new_bucket;
        }

        self.index[bucket + 1 + size] = pointer;
        self.index[bucket] = (size + 1) as u32;
    }

    /// Drop `pointer` from every distinct bucket its vertices hash to
    fn remove_by_pointer(&mut self, pointer: u32) {
        let mut seen: Vec<usize> = Vec::new();
        let at = pointer as usize;
        let len = self.restrictions[at] as usize;
        for i in 0..len {
            let hash = self.hash(self.restrictions[at + 1 + i]);
            if seen.contains(&hash) {
                continue;
            }
            seen.push(hash);
            self.remove_pointer(hash, pointer);
        }
    }

    fn remove_pointer(&mut self, hash: usize, pointer: u32) {
        let bucket = match self.hashes[hash] {
            NO_DATA => return,
            b => b as usize,
        };
        let size = self.index[bucket] as usize;
        let entries = bucket + 1..bucket + 1 + size;
        let Some(pos) = self.index[entries.clone()].iter().position(|&p| p == pointer) else {
            return;
        };
        self.index.copy_within(bucket + 2 + pos..entries.end, bucket + 1 + pos);
        self.index[entries.end - 1] = NO_DATA;
        self.index[bucket] = (size - 1) as u32;
        if size == 1 {
            self.hashes[hash] = NO_DATA;
        }
    }

    /// Raw arrays for serialization: hashes, used index, used restrictions
    pub(crate) fn raw_parts(&self) -> (&[u32], &[u32], &[u32]) {
        (
            &self.hashes,
            &self.index[..self.next_index],
            &self.restrictions[..self.next_restriction],
        )
    }

    /// Rebuild a db from serialized arrays, validating every pointer
    pub(crate) fn from_raw_parts(
        hash_count: usize,
        hashes: Vec<u32>,
        mut index: Vec<u32>,
        mut restrictions: Vec<u32>,
        count: u64,
    ) -> Result<Self> {
        if hash_count == 0 || hash_count > i32::MAX as usize / 2 || hashes.len() != hash_count * 2 {
            return Err(Error::corrupt(format!(
                "restrictions: hash table of {} slots does not match hash count {hash_count}",
                hashes.len()
            )));
        }

        let mut records = 0u64;
        let mut max_len = 0usize;
        let mut has_complex = false;
        let mut at = 0usize;
        let mut starts = Vec::new();
        while at < restrictions.len() {
            let len = restrictions[at] as usize;
            if len == 0 || at + 1 + len > restrictions.len() {
                return Err(Error::corrupt(format!(
                    "restrictions: invalid record at offset {at}"
                )));
            }
            starts.push(at as u32);
            records += 1;
            max_len = max_len.max(len);
            has_complex |= len > 1;
            at += len + 1;
        }
        if records != count {
            return Err(Error::corrupt(format!(
                "restrictions: header says {count} restrictions, found {records}"
            )));
        }

        for (slot, &bucket) in hashes.iter().enumerate() {
            if bucket == NO_DATA {
                continue;
            }
            let bucket = bucket as usize;
            let size = index.get(bucket).copied().unwrap_or(0) as usize;
            if slot % 2 == 1 || size == 0 || bucket + 1 + size > index.len() {
                return Err(Error::corrupt(format!(
                    "restrictions: invalid bucket in hash slot {slot}"
                )));
            }
            if index[bucket + 1..bucket + 1 + size]
                .iter()
                .any(|p| starts.binary_search(p).is_err())
            {
                return Err(Error::corrupt(format!(
                    "restrictions: bucket in hash slot {slot} points outside the arena"
                )));
            }
        }

        let next_index = index.len();
        let next_restriction = restrictions.len();
        index.resize(next_index + BLOCK_SIZE, NO_DATA);
        restrictions.resize(next_restriction + BLOCK_SIZE, NO_DATA);

        Ok(Self {
            hash_count,
            hashes,
            index,
            next_index,
            restrictions,
            next_restriction,
            count,
            has_complex,
            max_len,
        })
    }
}

impl Default for RestrictionsDb {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(db: &RestrictionsDb, vertex: u32) -> Vec<Vec<u32>> {
        db.restrictions_for(vertex).map(|r| r.to_vec()).collect()
    }

    #[test]
    fn test_add_rejects_empty() {
        let mut db = RestrictionsDb::new(16);
        assert!(matches!(db.add(&[]), Err(Error::InvalidArgument(_))));
        assert!(db.is_empty());
        assert!(!db.has_complex_restrictions());
    }

    #[test]
    fn test_simple_and_complex_flags() {
        let mut db = RestrictionsDb::new(16);
        db.add(&[7]).unwrap();
        assert!(!db.has_complex_restrictions());
        assert_eq!(db.max_restriction_len(), 1);

        db.add(&[1, 2, 3]).unwrap();
        assert!(db.has_complex_restrictions());
        assert_eq!(db.max_restriction_len(), 3);
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn test_each_member_vertex_finds_restriction_once() {
        let mut db = RestrictionsDb::new(1024);
        db.add(&[10, 11, 12]).unwrap();
        db.add(&[12, 13]).unwrap();

        assert_eq!(collect(&db, 10), vec![vec![10, 11, 12]]);
        assert_eq!(collect(&db, 11), vec![vec![10, 11, 12]]);
        assert_eq!(collect(&db, 12), vec![vec![10, 11, 12], vec![12, 13]]);
        assert_eq!(collect(&db, 13), vec![vec![12, 13]]);
        assert!(collect(&db, 14).is_empty());
    }

    #[test]
    fn test_hash_collisions_are_filtered() {
        // 4 buckets: 1, 5 and 9 share a bucket
        let mut db = RestrictionsDb::new(4);
        db.add(&[1, 2]).unwrap();
        db.add(&[5, 6]).unwrap();
        db.add(&[9]).unwrap();

        assert_eq!(collect(&db, 5), vec![vec![5, 6]]);
        assert_eq!(collect(&db, 9), vec![vec![9]]);
        assert_eq!(db.bucket(db.hash(1)).len(), 3);
    }

    #[test]
    fn test_repeated_vertex_indexed_once() {
        let mut db = RestrictionsDb::new(16);
        db.add(&[3, 4, 3]).unwrap();
        assert_eq!(db.bucket(db.hash(3)).len(), 1);
        assert_eq!(collect(&db, 3), vec![vec![3, 4, 3]]);
    }

    #[test]
    fn test_bucket_relocation_keeps_entries() {
        let mut db = RestrictionsDb::new(1);
        for v in 0..40u32 {
            db.add(&[v, v + 100]).unwrap();
        }
        assert_eq!(db.bucket(0).len(), 40);
        for v in 0..40u32 {
            assert_eq!(collect(&db, v), vec![vec![v, v + 100]]);
        }
    }

    #[test]
    fn test_arena_grows_past_block_size() {
        let mut db = RestrictionsDb::new(64);
        for v in 0..600u32 {
            db.add(&[v, v + 1, v + 2]).unwrap();
        }
        assert_eq!(db.len(), 600);
        assert_eq!(collect(&db, 599).len(), 3);
        assert_eq!(db.iter().count(), 600);
    }

    #[test]
    fn test_switch_swaps_and_reindexes() {
        let mut db = RestrictionsDb::new(1024);
        db.add(&[1, 2, 3]).unwrap();
        db.add(&[4]).unwrap();

        db.switch(2, 4);
        assert_eq!(collect(&db, 4), vec![vec![1, 4, 3]]);
        assert_eq!(collect(&db, 2), vec![vec![2]]);
        assert_eq!(collect(&db, 1), vec![vec![1, 4, 3]]);
    }

    #[test]
    fn test_switch_is_involution() {
        let mut db = RestrictionsDb::new(8);
        db.add(&[1, 2, 3]).unwrap();
        db.add(&[3, 9]).unwrap();
        db.add(&[9]).unwrap();
        let before: Vec<Vec<u32>> = db.iter().map(|r| r.to_vec()).collect();

        db.switch(3, 9);
        assert_ne!(db.iter().map(|r| r.to_vec()).collect::<Vec<_>>(), before);
        db.switch(3, 9);
        assert_eq!(db.iter().map(|r| r.to_vec()).collect::<Vec<_>>(), before);
        for v in [1, 2, 3, 9] {
            let expected: Vec<Vec<u32>> = before.iter().filter(|r| r.contains(&v)).cloned().collect();
            let mut found = collect(&db, v);
            found.sort();
            let mut expected = expected;
            expected.sort();
            assert_eq!(found, expected);
        }
    }

    #[test]
    fn test_switch_same_vertex_is_noop() {
        let mut db = RestrictionsDb::new(8);
        db.add(&[1, 2]).unwrap();
        db.switch(1, 1);
        assert_eq!(collect(&db, 1), vec![vec![1, 2]]);
    }

    #[test]
    fn test_switch_with_colliding_hashes() {
        // 2 and 4 share a bucket with 2 buckets
        let mut db = RestrictionsDb::new(2);
        db.add(&[2, 4]).unwrap();
        db.switch(2, 4);
        assert_eq!(collect(&db, 2), vec![vec![4, 2]]);
        assert_eq!(db.bucket(db.hash(2)).len(), 1);
    }

    #[test]
    fn test_raw_parts_roundtrip() {
        let mut db = RestrictionsDb::new(32);
        db.add(&[1, 2, 3]).unwrap();
        db.add(&[5]).unwrap();
        let (hashes, index, restrictions) = db.raw_parts();

        let restored = RestrictionsDb::from_raw_parts(
            32,
            hashes.to_vec(),
            index.to_vec(),
            restrictions.to_vec(),
            2,
        )
        .unwrap();
        assert_eq!(restored.max_restriction_len(), 3);
        assert!(restored.has_complex_restrictions());
        assert_eq!(collect(&restored, 2), vec![vec![1, 2, 3]]);

        let (hashes, index, restrictions) = db.raw_parts();
        assert!(matches!(
            RestrictionsDb::from_raw_parts(32, hashes.to_vec(), index.to_vec(), restrictions.to_vec(), 3),
            Err(Error::Corrupt(_))
        ));
    }
}
