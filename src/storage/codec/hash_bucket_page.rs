use crate::buffer::PAGE_SIZE;
use crate::error::BucketDBResult;
use crate::storage::codec::{DecodedData, Storable};
use crate::storage::page::hash_bucket_page::{bitmap_size, bucket_array_size};
use crate::storage::page::HashBucketPage;
use std::marker::PhantomData;

/// On-page layout: `[occupied bitmap | readable bitmap | slot array]`. Every
/// slot is written regardless of its bitmap state so tombstoned entries keep
/// their bytes across a round trip.
pub struct HashBucketPageCodec<K, V>(PhantomData<(K, V)>);

impl<K, V> HashBucketPageCodec<K, V>
where
    K: Storable,
    V: Storable,
{
    pub fn encode(page: &HashBucketPage<K, V>) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(PAGE_SIZE);
        bytes.extend_from_slice(&page.occupied);
        bytes.extend_from_slice(&page.readable);
        for (key, value) in page.array.iter() {
            bytes.extend(key.encode());
            bytes.extend(value.encode());
        }
        assert!(bytes.len() <= PAGE_SIZE);
        bytes.resize(PAGE_SIZE, 0);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> BucketDBResult<DecodedData<HashBucketPage<K, V>>> {
        assert_eq!(bytes.len(), PAGE_SIZE);
        let capacity = bucket_array_size(K::ENCODED_WIDTH + V::ENCODED_WIDTH);
        let bitmap_len = bitmap_size(capacity);

        let occupied = bytes[0..bitmap_len].to_vec();
        let readable = bytes[bitmap_len..2 * bitmap_len].to_vec();

        let mut left = &bytes[2 * bitmap_len..];
        let mut array = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            let (key, offset) = K::decode(left)?;
            left = &left[offset..];
            let (value, offset) = V::decode(left)?;
            left = &left[offset..];
            array.push((key, value));
        }

        Ok((
            HashBucketPage {
                occupied,
                readable,
                array,
            },
            PAGE_SIZE,
        ))
    }
}
