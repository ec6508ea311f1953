//! Attribute (tag) collections and their interned storage
//!
//! An [`AttributeCollection`] is a small key/value set attached to edges.
//! [`AttributesIndex`] interns whole collections into integer ids so the
//! network only stores a `u16`/`u32` per edge.

mod blob;
mod index;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use blob::{BlobElement, BlobIndex};
pub use index::{AttributesIndex, EMPTY_ATTRIBUTES, NULL_ATTRIBUTES};

/// A single key/value attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A set of attributes with unique keys.
///
/// Collections handed out by an [`AttributesIndex`] are read-only; every
/// mutator on them fails with [`Error::InvalidOperation`].
#[derive(Debug, Clone, Default)]
pub struct AttributeCollection {
    attributes: Vec<Attribute>,
    readonly: bool,
}

impl AttributeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mutable collection from (key, value) pairs; later keys win
    pub fn from_pairs<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> Self {
        let mut collection = Self::new();
        for (k, v) in pairs {
            collection.upsert(k.as_ref(), v.as_ref());
        }
        collection
    }

    pub(crate) fn readonly(attributes: Vec<Attribute>) -> Self {
        Self {
            attributes,
            readonly: true,
        }
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Value for `key`, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> + '_ {
        self.attributes.iter()
    }

    pub fn add_or_replace(&mut self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        self.upsert(key, value);
        Ok(())
    }

    /// Remove `key`; returns whether it was present
    pub fn remove_key(&mut self, key: &str) -> Result<bool> {
        self.check_writable()?;
        let before = self.attributes.len();
        self.attributes.retain(|a| a.key != key);
        Ok(self.attributes.len() != before)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.check_writable()?;
        self.attributes.clear();
        Ok(())
    }

    /// Mutable copy of this collection
    pub fn to_mutable(&self) -> Self {
        Self {
            attributes: self.attributes.clone(),
            readonly: false,
        }
    }

    fn upsert(&mut self, key: &str, value: &str) {
        match self.attributes.iter_mut().find(|a| a.key == key) {
            Some(existing) => existing.value = value.to_string(),
            None => self.attributes.push(Attribute::new(key, value)),
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(Error::invalid_operation(
                "this attribute collection is read-only",
            ));
        }
        Ok(())
    }
}

/// Equality ignores attribute order and the read-only flag
impl PartialEq for AttributeCollection {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|a| other.get(&a.key) == Some(a.value.as_str()))
    }
}

impl Eq for AttributeCollection {}

/// Which optional structures an [`AttributesIndex`] maintains.
///
/// Reverse indexes deduplicate during bulk loads; `increase_one` maps ids
/// to a dense 0..n range so [`AttributesIndex::count`] is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributesIndexMode {
    pub increase_one: bool,
    pub reverse_collection_index: bool,
    pub reverse_string_index: bool,
    pub reverse_string_index_keys_only: bool,
}

impl AttributesIndexMode {
    /// No optional structures; only valid for deserialized read-only indexes
    pub const NONE: Self = Self {
        increase_one: false,
        reverse_collection_index: false,
        reverse_string_index: false,
        reverse_string_index_keys_only: false,
    };

    pub const REVERSE_ALL: Self = Self {
        increase_one: false,
        reverse_collection_index: true,
        reverse_string_index: true,
        reverse_string_index_keys_only: false,
    };

    /// Dense ids plus full deduplication, used for edge profiles
    pub const INCREASE_ONE_REVERSE_ALL: Self = Self {
        increase_one: true,
        reverse_collection_index: true,
        reverse_string_index: true,
        reverse_string_index_keys_only: false,
    };

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Reject modes that cannot back a writable index
    pub fn validate(&self) -> Result<()> {
        if self.is_none() {
            return Err(Error::invalid_argument(
                "cannot create a writable attributes index without a valid operating mode",
            ));
        }
        if self.reverse_string_index && self.reverse_string_index_keys_only {
            return Err(Error::invalid_argument(
                "reverse_string_index and reverse_string_index_keys_only are mutually exclusive",
            ));
        }
        Ok(())
    }

    pub(crate) fn dedups_string(&self, is_key: bool) -> bool {
        self.reverse_string_index || (self.reverse_string_index_keys_only && is_key)
    }
}

impl Default for AttributesIndexMode {
    fn default() -> Self {
        Self::REVERSE_ALL
    }
}
