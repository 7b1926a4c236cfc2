// Keymapper Mapping Types
// Normalized per-rule keymap: source key -> ordered destination keys

use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::Key;

/// Destination keys for one source key. Most mappings target one or two keys.
pub type Destinations = SmallVec<[Key; 4]>;

/// Keymap from a source key to the ordered keys it is translated into.
///
/// Keys without an entry pass through unchanged. An entry with an empty
/// destination list suppresses the source key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keymap {
    mappings: IndexMap<Key, Destinations>,
}

impl Keymap {
    /// Create an empty (pass-through) keymap
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mapping, returning the previous destinations for `source`
    pub fn insert(
        &mut self,
        source: Key,
        destinations: impl IntoIterator<Item = Key>,
    ) -> Option<Destinations> {
        self.mappings
            .insert(source, destinations.into_iter().collect())
    }

    /// Destination keys for `source`: the mapped list, or `source` itself
    /// when the keymap has no entry for it.
    pub fn resolve<'a>(&'a self, source: &'a Key) -> &'a [Key] {
        match self.mappings.get(source) {
            Some(destinations) => destinations.as_slice(),
            None => std::slice::from_ref(source),
        }
    }

    /// Whether `source` has an explicit entry
    pub fn contains(&self, source: Key) -> bool {
        self.mappings.contains_key(&source)
    }

    /// Every key this keymap can emit (destination side), in first-seen order
    pub fn targets(&self) -> impl Iterator<Item = Key> + '_ {
        self.mappings.values().flatten().copied()
    }

    /// Iterate over mappings in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (Key, &[Key])> {
        self.mappings.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl FromIterator<(Key, Vec<Key>)> for Keymap {
    fn from_iter<T: IntoIterator<Item = (Key, Vec<Key>)>>(iter: T) -> Self {
        let mut keymap = Keymap::new();
        for (source, destinations) in iter {
            keymap.insert(source, destinations);
        }
        keymap
    }
}

impl fmt::Display for Keymap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (source, destinations)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", source, KeyList(destinations))?;
        }
        f.write_str("}")
    }
}

/// Formats a slice of keys as `[KEY_A, KEY_B]`.
pub struct KeyList<'a>(pub &'a [Key]);

impl fmt::Display for KeyList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", key)?;
        }
        f.write_str("]")
    }
}
