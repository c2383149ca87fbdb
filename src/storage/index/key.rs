use crate::error::{BucketDBError, BucketDBResult};
use crate::storage::codec::{DecodedData, Storable};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::marker::PhantomData;

/// Three-way comparison between index keys. The hash index only consumes
/// equality, but the full ordering keeps the comparator reusable by ordered
/// indexes.
pub trait KeyComparator<K>: Send + Sync {
    fn compare(&self, lhs: &K, rhs: &K) -> Ordering;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrdComparator;

impl<K: Ord> KeyComparator<K> for OrdComparator {
    fn compare(&self, lhs: &K, rhs: &K) -> Ordering {
        lhs.cmp(rhs)
    }
}

pub trait HashFunction<K>: Send + Sync {
    fn get_hash(&self, key: &K) -> u64;
}

/// Stable SipHash over the encoded key bytes.
#[derive(Debug, Clone, Copy)]
pub struct DefaultHashFunction<K> {
    _marker: PhantomData<K>,
}

impl<K> DefaultHashFunction<K> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K> Default for DefaultHashFunction<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Storable> HashFunction<K> for DefaultHashFunction<K> {
    fn get_hash(&self, key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        hasher.write(&key.encode());
        hasher.finish()
    }
}

/// Fixed-width opaque key, the on-page shape of composite index keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedKey<const N: usize> {
    pub data: [u8; N],
}

impl<const N: usize> FixedKey<N> {
    pub fn new() -> Self {
        Self { data: [0; N] }
    }

    pub fn from_integer(value: u64) -> Self {
        let mut key = Self::new();
        let bytes = value.to_be_bytes();
        let len = N.min(bytes.len());
        key.data[..len].copy_from_slice(&bytes[bytes.len() - len..]);
        key
    }
}

impl<const N: usize> Default for FixedKey<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Storable for FixedKey<N> {
    const ENCODED_WIDTH: usize = N;

    fn encode(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    fn decode(bytes: &[u8]) -> BucketDBResult<DecodedData<Self>> {
        if bytes.len() < N {
            return Err(BucketDBError::Internal(format!(
                "bytes length {} is less than {}",
                bytes.len(),
                N
            )));
        }
        let mut data = [0u8; N];
        data.copy_from_slice(&bytes[..N]);
        Ok((Self { data }, N))
    }
}
