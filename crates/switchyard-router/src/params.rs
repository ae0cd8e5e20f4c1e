//! Path parameter extraction and storage.
//!
//! [`ParamStore`] keeps up to [`INLINE_PARAMS`] captures in a fixed inline
//! array and spills the rest into an overflow vector. Captured values are
//! written into a retained buffer, so a store that is reset and reused does
//! not allocate once it has warmed up. Each key carries its FNV-1a hash;
//! lookups compare hashes before comparing names.

use std::fmt;
use std::sync::Arc;

use percent_encoding::percent_decode_str;

/// Maximum number of parameters stored inline.
pub const INLINE_PARAMS: usize = 4;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// FNV-1a over the bytes of a parameter name.
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// A parameter name with its precomputed hash.
///
/// Keys are created once when a pattern is compiled and shared (by
/// reference count) with every store that captures them.
#[derive(Clone, PartialEq, Eq)]
pub struct ParamKey {
    name: Arc<str>,
    hash: u64,
}

impl ParamKey {
    /// Creates a key, hashing the name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            hash: fnv1a(name.as_bytes()),
            name: Arc::from(name),
        }
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the cached FNV-1a hash of the name.
    #[must_use]
    pub const fn fingerprint(&self) -> u64 {
        self.hash
    }
}

impl fmt::Debug for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParamKey").field(&self.name).finish()
    }
}

impl From<&str> for ParamKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    key: Option<Arc<str>>,
    hash: u64,
    start: usize,
    end: usize,
}

/// A saved store length, used to undo captures from an abandoned trie branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    len: usize,
    values_len: usize,
}

/// Extracted path parameters for one request.
///
/// Values are only meaningful until the next [`reset`](Self::reset); copy
/// them (for example with [`to_owned_pairs`](Self::to_owned_pairs)) to keep
/// them longer.
///
/// # Example
///
/// ```rust
/// use switchyard_router::{ParamKey, ParamStore};
///
/// let mut params = ParamStore::new();
/// params.set(&ParamKey::new("userId"), "123");
/// params.set(&ParamKey::new("action"), "view");
///
/// assert_eq!(params.get("userId"), Some("123"));
/// assert_eq!(params.get("action"), Some("view"));
/// assert_eq!(params.get("unknown"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParamStore {
    inline: [Slot; INLINE_PARAMS],
    len: usize,
    overflow: Vec<Slot>,
    values: String,
}

impl ParamStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of captured entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if entries have spilled past the inline capacity.
    #[must_use]
    pub fn spilled(&self) -> bool {
        self.len > INLINE_PARAMS
    }

    /// Returns the retained capacity of the overflow array.
    #[must_use]
    pub fn overflow_capacity(&self) -> usize {
        self.overflow.capacity()
    }

    /// Records `value` under `key`. A later set of the same key shadows earlier ones.
    pub fn set(&mut self, key: &ParamKey, value: &str) {
        self.capture(key, value, false);
    }

    /// Records a raw path slice, percent-decoding it first when asked to.
    pub fn capture(&mut self, key: &ParamKey, raw: &str, decode: bool) {
        let start = self.values.len();
        if decode && raw.contains('%') {
            self.values
                .push_str(&percent_decode_str(raw).decode_utf8_lossy());
        } else {
            self.values.push_str(raw);
        }
        let slot = Slot {
            key: Some(Arc::clone(&key.name)),
            hash: key.hash,
            start,
            end: self.values.len(),
        };
        if self.len < INLINE_PARAMS {
            self.inline[self.len] = slot;
        } else {
            self.overflow.push(slot);
        }
        self.len += 1;
    }

    /// Returns the most recently set value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let hash = fnv1a(name.as_bytes());
        match self.len {
            0 => None,
            1 => self.value_if(&self.inline[0], hash, name),
            2 => self
                .value_if(&self.inline[1], hash, name)
                .or_else(|| self.value_if(&self.inline[0], hash, name)),
            _ => (0..self.len)
                .rev()
                .find_map(|index| self.value_if(self.slot(index), hash, name)),
        }
    }

    /// Iterates over `(name, value)` pairs in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        (0..self.len).filter_map(move |index| {
            let slot = self.slot(index);
            slot.key
                .as_deref()
                .map(|name| (name, &self.values[slot.start..slot.end]))
        })
    }

    /// Copies every entry into owned strings.
    #[must_use]
    pub fn to_owned_pairs(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    /// Clears all entries, retaining inline slots, overflow and value capacity.
    pub fn reset(&mut self) {
        self.len = 0;
        self.overflow.clear();
        self.values.clear();
    }

    /// Saves the current length so later captures can be undone.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.len,
            values_len: self.values.len(),
        }
    }

    /// Drops every capture made after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        if checkpoint.len >= self.len {
            return;
        }
        self.overflow
            .truncate(checkpoint.len.saturating_sub(INLINE_PARAMS));
        self.values.truncate(checkpoint.values_len);
        self.len = checkpoint.len;
    }

    fn slot(&self, index: usize) -> &Slot {
        if index < INLINE_PARAMS {
            &self.inline[index]
        } else {
            &self.overflow[index - INLINE_PARAMS]
        }
    }

    fn value_if(&self, slot: &Slot, hash: u64, name: &str) -> Option<&str> {
        if slot.hash == hash && slot.key.as_deref() == Some(name) {
            Some(&self.values[slot.start..slot.end])
        } else {
            None
        }
    }
}
