pub mod extendible_hash_index;
pub mod key;

pub use extendible_hash_index::ExtendibleHashIndex;
pub use key::{DefaultHashFunction, FixedKey, HashFunction, KeyComparator, OrdComparator};
