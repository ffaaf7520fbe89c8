//! Zero-sized hash builder for the runtime's internal registries.
//!
//! Every registry in the crate (node bindings, watcher paths, pending digest
//! roots) is keyed by small copyable ids or short strings, so HashDoS
//! resistance is not a concern and a fixed-seed foldhash is used throughout.

use std::collections::HashMap;
use std::hash::BuildHasher;

use indexmap::{IndexMap, IndexSet};

pub use foldhash::fast::{FixedState, FoldHasher};

/// A zero-sized BuildHasher that uses foldhash with a fixed seed.
///
/// All instances produce identical hash values, which keeps iteration order
/// of the hashed registries deterministic between runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct FastHashBuilder;

impl BuildHasher for FastHashBuilder {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(0x517cc1b727220a95).build_hasher()
    }
}

pub(crate) type FastHashMap<K, V> = HashMap<K, V, FastHashBuilder>;
pub(crate) type FastIndexMap<K, V> = IndexMap<K, V, FastHashBuilder>;
pub(crate) type FastIndexSet<K> = IndexSet<K, FastHashBuilder>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_hash_builder_is_zero_sized() {
        assert_eq!(std::mem::size_of::<FastHashBuilder>(), 0);
    }

    #[test]
    fn registries_iterate_in_insertion_order() {
        let mut paths: FastIndexMap<String, usize> = FastIndexMap::default();
        paths.insert("user.name".into(), 1);
        paths.insert("items".into(), 2);
        paths.insert("user".into(), 3);

        let keys: Vec<_> = paths.keys().map(String::as_str).collect();
        assert_eq!(keys, ["user.name", "items", "user"]);
    }

    #[test]
    fn fast_hash_builder_is_deterministic() {
        assert_eq!(FastHashBuilder.hash_one("items"), FastHashBuilder.hash_one("items"));
    }
}
