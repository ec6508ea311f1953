use super::db::RestrictionsDb;
use super::NO_DATA;

/// Cursor over the restrictions that contain one vertex.
///
/// `move_to` finds the first matching bucket entry; the following
/// `move_next` yields it and later calls scan forward. Matching is on any
/// position in the restriction.
#[derive(Debug)]
pub struct RestrictionEnumerator<'a> {
    db: &'a RestrictionsDb,
    vertex: u32,
    hash: usize,
    position: usize,
    /// Set between a successful `move_to` and the first `move_next`
    pending: bool,
    positioned: bool,
    restriction: u32,
}

impl<'a> RestrictionEnumerator<'a> {
    pub(super) fn new(db: &'a RestrictionsDb) -> Self {
        Self {
            db,
            vertex: NO_DATA,
            hash: 0,
            position: 0,
            pending: false,
            positioned: false,
            restriction: NO_DATA,
        }
    }

    fn reset(&mut self) {
        self.vertex = NO_DATA;
        self.position = 0;
        self.pending = false;
        self.positioned = false;
        self.restriction = NO_DATA;
    }

    /// Position on the restrictions containing `vertex`
    pub fn move_to(&mut self, vertex: u32) -> bool {
        self.reset();
        let hash = self.db.hash(vertex);
        let bucket = self.db.bucket(hash);
        match bucket
            .iter()
            .position(|&p| self.db.record(p).contains(&vertex))
        {
            Some(position) => {
                self.vertex = vertex;
                self.hash = hash;
                self.position = position;
                self.pending = true;
                self.positioned = true;
                true
            }
            None => false,
        }
    }

    /// Advance to the next restriction containing the vertex
    ///
    /// Returning false ends the enumeration; call `move_to` again to restart.
    ///
    /// # Panics
    ///
    /// When called without a successful `move_to`, or after the enumeration
    /// ended.
    pub fn move_next(&mut self) -> bool {
        assert!(
            self.positioned,
            "move_next called without a successful move_to"
        );
        let db = self.db;
        let bucket = db.bucket(self.hash);
        if self.pending {
            self.pending = false;
            self.restriction = bucket[self.position];
            return true;
        }

        let vertex = self.vertex;
        let next = bucket
            .iter()
            .enumerate()
            .skip(self.position + 1)
            .find(|(_, p)| db.record(**p).contains(&vertex));
        match next {
            Some((position, &pointer)) => {
                self.position = position;
                self.restriction = pointer;
                true
            }
            None => {
                self.reset();
                false
            }
        }
    }

    /// Number of vertices in the current restriction
    pub fn count(&self) -> usize {
        self.as_slice().len()
    }

    /// Vertex `i` of the current restriction
    pub fn get(&self, i: usize) -> u32 {
        let restriction = self.as_slice();
        assert!(
            i < restriction.len(),
            "vertex {i} out of range for restriction of length {}",
            restriction.len()
        );
        restriction[i]
    }

    /// The current restriction
    pub fn as_slice(&self) -> &'a [u32] {
        assert!(
            self.restriction != NO_DATA,
            "no current restriction, call move_next first"
        );
        self.db.record(self.restriction)
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.as_slice().to_vec()
    }
}

/// Iterator over every restriction containing a vertex
pub struct RestrictionsFor<'a> {
    enumerator: RestrictionEnumerator<'a>,
    active: bool,
}

impl<'a> RestrictionsFor<'a> {
    pub(super) fn new(db: &'a RestrictionsDb, vertex: u32) -> Self {
        let mut enumerator = db.enumerator();
        let active = enumerator.move_to(vertex);
        Self { enumerator, active }
    }
}

impl<'a> Iterator for RestrictionsFor<'a> {
    type Item = &'a [u32];

    fn next(&mut self) -> Option<&'a [u32]> {
        if !self.active {
            return None;
        }
        if self.enumerator.move_next() {
            Some(self.enumerator.as_slice())
        } else {
            self.active = false;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RestrictionsDb {
        let mut db = RestrictionsDb::new(128);
        db.add(&[1, 2, 3]).unwrap();
        db.add(&[3, 4]).unwrap();
        db.add(&[5]).unwrap();
        db
    }

    #[test]
    fn test_move_to_then_move_next_yields_first_match() {
        let db = sample();
        let mut enumerator = db.enumerator();
        assert!(enumerator.move_to(3));
        assert!(enumerator.move_next());
        assert_eq!(enumerator.to_vec(), vec![1, 2, 3]);
        assert_eq!(enumerator.count(), 3);
        assert_eq!(enumerator.get(2), 3);
        assert!(enumerator.move_next());
        assert_eq!(enumerator.as_slice(), &[3, 4]);
        assert!(!enumerator.move_next());
    }

    #[test]
    #[should_panic(expected = "move_next called without a successful move_to")]
    fn test_move_next_after_end_panics() {
        let db = sample();
        let mut enumerator = db.enumerator();
        assert!(enumerator.move_to(5));
        assert!(enumerator.move_next());
        assert!(!enumerator.move_next());
        enumerator.move_next();
    }

    #[test]
    fn test_move_to_after_end_restarts() {
        let db = sample();
        let mut enumerator = db.enumerator();
        assert!(enumerator.move_to(3));
        while enumerator.move_next() {}
        assert!(!enumerator.move_to(99));
        assert!(enumerator.move_to(3));
        assert!(enumerator.move_next());
        assert_eq!(enumerator.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_move_to_matches_any_position() {
        let db = sample();
        let mut enumerator = db.enumerator();
        assert!(enumerator.move_to(2));
        assert!(enumerator.move_next());
        assert_eq!(enumerator.as_slice(), &[1, 2, 3]);
        assert!(!enumerator.move_next());
    }

    #[test]
    fn test_move_to_unknown_vertex() {
        let db = sample();
        let mut enumerator = db.enumerator();
        assert!(!enumerator.move_to(99));
    }

    #[test]
    fn test_move_to_after_failure_recovers() {
        let db = sample();
        let mut enumerator = db.enumerator();
        assert!(!enumerator.move_to(99));
        assert!(enumerator.move_to(5));
        assert!(enumerator.move_next());
        assert_eq!(enumerator.as_slice(), &[5]);
    }

    #[test]
    #[should_panic(expected = "move_next called without a successful move_to")]
    fn test_move_next_without_move_to_panics() {
        let db = sample();
        let mut enumerator = db.enumerator();
        enumerator.move_next();
    }

    #[test]
    #[should_panic(expected = "no current restriction")]
    fn test_get_without_current_panics() {
        let db = sample();
        let mut enumerator = db.enumerator();
        assert!(enumerator.move_to(1));
        enumerator.get(0);
    }

    #[test]
    fn test_restrictions_for_iterator() {
        let db = sample();
        let found: Vec<&[u32]> = db.restrictions_for(3).collect();
        assert_eq!(found, vec![&[1, 2, 3][..], &[3, 4][..]]);
        assert_eq!(db.restrictions_for(42).count(), 0);
    }
}
