use crate::buffer::{BufferPoolManager, PageId, PageRef};
use crate::error::{BucketDBError, BucketDBResult};
use crate::storage::codec::{HashBucketPageCodec, HashDirectoryPageCodec, Storable};
use crate::storage::index::key::{HashFunction, KeyComparator};
use crate::storage::page::{HashBucketPage, HashDirectoryPage, HASH_TABLE_MAX_DEPTH};
use log::debug;
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::sync::Arc;

/// Disk-backed extendible hash table: a persistent key -> value multimap.
///
/// A single directory page routes each key to a bucket page by the low
/// `global_depth` bits of its hash. Buckets split when full and merge with
/// their split image when empty, growing and shrinking the directory as local
/// depths change.
///
/// Latching is two-level. Point operations hold `table_latch` shared and
/// latch the one bucket frame they touch; structural changes (split, merge)
/// hold it exclusive. Conditions observed under the shared latch are
/// re-checked after the upgrade since another thread may have intervened.
#[derive(Debug)]
pub struct ExtendibleHashIndex<K, V, C, H> {
    pub buffer_pool: Arc<BufferPoolManager>,
    comparator: C,
    hash_fn: H,
    directory_page_id: PageId,
    table_latch: RwLock<()>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, C, H> ExtendibleHashIndex<K, V, C, H>
where
    K: Storable,
    V: Storable,
    C: KeyComparator<K>,
    H: HashFunction<K>,
{
    /// Creates a fresh index: one directory at global depth 0 pointing at one
    /// empty bucket at local depth 0.
    pub fn try_new(
        buffer_pool: Arc<BufferPoolManager>,
        comparator: C,
        hash_fn: H,
    ) -> BucketDBResult<Self> {
        let bucket_page_id = {
            let bucket_ref = buffer_pool.new_page()?;
            let mut guard = bucket_ref.write().unwrap();
            let page_id = guard.page_id;
            guard.set_data(&HashBucketPageCodec::encode(&HashBucketPage::<K, V>::new()));
            page_id
        };

        let directory_page_id = {
            let dir_ref = buffer_pool.new_page()?;
            let mut guard = dir_ref.write().unwrap();
            let page_id = guard.page_id;
            let mut directory = HashDirectoryPage::new();
            directory.set_bucket_page_id(0, bucket_page_id);
            guard.set_data(&HashDirectoryPageCodec::encode(&directory));
            page_id
        };

        Ok(Self {
            buffer_pool,
            comparator,
            hash_fn,
            directory_page_id,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    /// Reattaches to an index whose directory page already exists on disk.
    pub fn open(
        buffer_pool: Arc<BufferPoolManager>,
        comparator: C,
        hash_fn: H,
        directory_page_id: PageId,
    ) -> Self {
        Self {
            buffer_pool,
            comparator,
            hash_fn,
            directory_page_id,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        }
    }

    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    fn hash(&self, key: &K) -> u32 {
        self.hash_fn.get_hash(key) as u32
    }

    fn key_to_directory_index(&self, key: &K, directory: &HashDirectoryPage) -> u32 {
        self.hash(key) & directory.global_depth_mask()
    }

    fn key_to_page_id(&self, key: &K, directory: &HashDirectoryPage) -> PageId {
        directory.bucket_page_id(self.key_to_directory_index(key, directory))
    }

    fn fetch_directory(&self) -> BucketDBResult<(PageRef, HashDirectoryPage)> {
        let page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let directory = {
            let guard = page.read().unwrap();
            HashDirectoryPageCodec::decode(guard.data())?.0
        };
        Ok((page, directory))
    }

    /// Collects every value stored under `key`.
    pub fn get_value(&self, key: &K) -> BucketDBResult<Vec<V>> {
        let _table_guard = self.table_latch.read();
        let (_dir_ref, directory) = self.fetch_directory()?;
        let bucket_page_id = self.key_to_page_id(key, &directory);
        let bucket_ref = self.buffer_pool.fetch_page(bucket_page_id)?;

        let mut result = vec![];
        let guard = bucket_ref.read().unwrap();
        let (bucket, _) = HashBucketPageCodec::<K, V>::decode(guard.data())?;
        bucket.get_value(key, &self.comparator, &mut result);
        Ok(result)
    }

    /// Inserts a (key, value) pair. Returns false when the exact pair is
    /// already present; a full bucket triggers a split instead.
    pub fn insert(&self, key: &K, value: &V) -> BucketDBResult<bool> {
        let (inserted, bucket_full) = {
            let _table_guard = self.table_latch.read();
            let (_dir_ref, directory) = self.fetch_directory()?;
            let bucket_page_id = self.key_to_page_id(key, &directory);
            let bucket_ref = self.buffer_pool.fetch_page(bucket_page_id)?;

            let mut guard = bucket_ref.write().unwrap();
            let (mut bucket, _) = HashBucketPageCodec::<K, V>::decode(guard.data())?;
            let inserted = bucket.insert(*key, *value, &self.comparator);
            if inserted {
                guard.set_data(&HashBucketPageCodec::encode(&bucket));
            }
            (inserted, bucket.is_full())
        };

        if inserted {
            return Ok(true);
        }
        if !bucket_full {
            // exact duplicate, nothing structural to do
            return Ok(false);
        }
        self.split_insert(key, value)
    }

    /// Splits the key's bucket until the insert fits, growing the directory
    /// when the splitting bucket already uses every global bit.
    fn split_insert(&self, key: &K, value: &V) -> BucketDBResult<bool> {
        let _table_guard = self.table_latch.write();
        let dir_ref = self.buffer_pool.fetch_page(self.directory_page_id)?;

        loop {
            let mut directory = {
                let guard = dir_ref.read().unwrap();
                HashDirectoryPageCodec::decode(guard.data())?.0
            };
            let old_bucket_index = self.key_to_directory_index(key, &directory);
            let old_bucket_page_id = directory.bucket_page_id(old_bucket_index);
            let local_depth = directory.local_depth(old_bucket_index);

            let old_bucket_ref = self.buffer_pool.fetch_page(old_bucket_page_id)?;
            let mut old_guard = old_bucket_ref.write().unwrap();
            let (mut old_bucket, _) = HashBucketPageCodec::<K, V>::decode(old_guard.data())?;

            // another thread may have drained the bucket before the latch
            // upgrade, or an earlier round of this loop made room
            if !old_bucket.is_full() {
                let inserted = old_bucket.insert(*key, *value, &self.comparator);
                if inserted {
                    old_guard.set_data(&HashBucketPageCodec::encode(&old_bucket));
                }
                return Ok(inserted);
            }

            // a full bucket can still hold the exact pair; splitting would
            // not change the answer
            let mut existing = vec![];
            old_bucket.get_value(key, &self.comparator, &mut existing);
            if existing.iter().any(|v| v == value) {
                return Ok(false);
            }

            if local_depth >= HASH_TABLE_MAX_DEPTH {
                return Err(BucketDBError::Storage(format!(
                    "bucket page {} cannot split beyond max depth {}",
                    old_bucket_page_id, HASH_TABLE_MAX_DEPTH
                )));
            }

            let new_bucket_ref = self.buffer_pool.new_page()?;
            let mut new_guard = new_bucket_ref.write().unwrap();
            let new_bucket_page_id = new_guard.page_id;
            let mut new_bucket = HashBucketPage::<K, V>::new();

            let old_local_mask = directory.local_depth_mask(old_bucket_index);
            let new_local_mask = (old_local_mask << 1) | 1;
            let new_local_hash = old_bucket_index & new_local_mask;
            let dir_size = directory.size();

            // slots that keep referring to the old bucket under the widened
            // mask just gain one bit of depth
            for i in 0..dir_size {
                if (i & new_local_mask) == new_local_hash {
                    directory.incr_local_depth(i);
                }
            }
            if local_depth < directory.global_depth() {
                // directory is already wide enough: point the diverged half
                // of the old bucket's slots at the new bucket
                for i in 0..dir_size {
                    if directory.bucket_page_id(i) == old_bucket_page_id
                        && (i & new_local_mask) != new_local_hash
                    {
                        directory.set_bucket_page_id(i, new_bucket_page_id);
                        directory.incr_local_depth(i);
                    }
                }
            } else {
                // double the directory: the upper half mirrors the lower,
                // except the splitting bucket's mirror takes the new bucket
                directory.incr_global_depth();
                let new_dir_size = directory.size();
                for i in dir_size..new_dir_size {
                    let mirror_page_id = directory.bucket_page_id(i - dir_size);
                    let mirror_local_depth = directory.local_depth(i - dir_size);
                    if mirror_page_id == old_bucket_page_id {
                        directory.set_bucket_page_id(i, new_bucket_page_id);
                    } else {
                        directory.set_bucket_page_id(i, mirror_page_id);
                    }
                    directory.set_local_depth(i, mirror_local_depth as u8);
                }
            }

            // move entries whose hash routes to the new bucket
            for slot in 0..old_bucket.size() {
                if !old_bucket.is_readable(slot) {
                    continue;
                }
                let bucket_key = old_bucket.key_at(slot);
                let bucket_value = old_bucket.value_at(slot);
                if self.key_to_page_id(&bucket_key, &directory) == new_bucket_page_id {
                    old_bucket.remove_at(slot);
                    new_bucket.insert(bucket_key, bucket_value, &self.comparator);
                }
            }

            // retry into whichever side the key routes to now
            let target_page_id = self.key_to_page_id(key, &directory);
            let inserted = if target_page_id == old_bucket_page_id {
                old_bucket.insert(*key, *value, &self.comparator)
            } else {
                new_bucket.insert(*key, *value, &self.comparator)
            };

            old_guard.set_data(&HashBucketPageCodec::encode(&old_bucket));
            new_guard.set_data(&HashBucketPageCodec::encode(&new_bucket));
            dir_ref
                .write()
                .unwrap()
                .set_data(&HashDirectoryPageCodec::encode(&directory));

            if inserted {
                return Ok(true);
            }
            // every entry stayed on one side; split again under the same latch
        }
    }

    /// Removes one (key, value) pair. An emptied bucket is merged with its
    /// split image, cascading through `extra_merge` until nothing fires.
    pub fn remove(&self, key: &K, value: &V) -> BucketDBResult<bool> {
        let (removed, bucket_empty) = {
            let _table_guard = self.table_latch.read();
            let (_dir_ref, directory) = self.fetch_directory()?;
            let bucket_page_id = self.key_to_page_id(key, &directory);
            let bucket_ref = self.buffer_pool.fetch_page(bucket_page_id)?;

            let mut guard = bucket_ref.write().unwrap();
            let (mut bucket, _) = HashBucketPageCodec::<K, V>::decode(guard.data())?;
            let removed = bucket.remove(key, value, &self.comparator);
            if removed {
                guard.set_data(&HashBucketPageCodec::encode(&bucket));
            }
            (removed, bucket.is_empty())
        };

        if removed && bucket_empty {
            self.merge(key)?;
            while self.extra_merge(key)? {}
        }
        Ok(removed)
    }

    /// Folds the key's (empty) bucket into its split image.
    fn merge(&self, key: &K) -> BucketDBResult<()> {
        let _table_guard = self.table_latch.write();
        let (dir_ref, mut directory) = self.fetch_directory()?;
        let bucket_index = self.key_to_directory_index(key, &directory);
        let bucket_page_id = directory.bucket_page_id(bucket_index);
        let local_depth = directory.local_depth(bucket_index);
        if local_depth == 0 {
            return Ok(());
        }

        // the remove path only held the shared latch; a concurrent insert may
        // have refilled the bucket
        let bucket_ref = self.buffer_pool.fetch_page(bucket_page_id)?;
        let is_empty = {
            let guard = bucket_ref.read().unwrap();
            HashBucketPageCodec::<K, V>::decode(guard.data())?.0.is_empty()
        };
        drop(bucket_ref);
        if !is_empty {
            return Ok(());
        }

        let split_image_index = directory.split_image_index(bucket_index);
        if directory.local_depth(split_image_index) != local_depth {
            return Ok(());
        }
        let sibling_page_id = directory.bucket_page_id(split_image_index);
        if sibling_page_id == bucket_page_id {
            return Ok(());
        }

        let local_mask = directory.local_depth_mask(bucket_index);
        let same_mask = local_mask ^ (1 << (local_depth - 1));
        let dir_size = directory.size();

        for i in 0..dir_size {
            if (i & local_mask) == (bucket_index & local_mask) {
                directory.set_bucket_page_id(i, sibling_page_id);
            }
        }
        for i in 0..dir_size {
            if (i & same_mask) == (bucket_index & same_mask) {
                directory.decr_local_depth(i);
            }
        }
        if directory.can_shrink() {
            directory.decr_global_depth();
        }

        dir_ref
            .write()
            .unwrap()
            .set_data(&HashDirectoryPageCodec::encode(&directory));
        self.buffer_pool.delete_page(bucket_page_id)?;
        Ok(())
    }

    /// Reverse-direction merge: after `merge`, the surviving bucket's new
    /// split image may itself be an empty leftover. Folds it in and reports
    /// whether anything happened; the caller loops.
    fn extra_merge(&self, key: &K) -> BucketDBResult<bool> {
        let _table_guard = self.table_latch.write();
        let (dir_ref, mut directory) = self.fetch_directory()?;
        let bucket_index = self.key_to_directory_index(key, &directory);
        let bucket_page_id = directory.bucket_page_id(bucket_index);
        let local_depth = directory.local_depth(bucket_index);
        if local_depth == 0 {
            return Ok(false);
        }

        let sibling_index = directory.split_image_index(bucket_index);
        if directory.local_depth(sibling_index) != local_depth {
            return Ok(false);
        }
        let sibling_page_id = directory.bucket_page_id(sibling_index);
        if sibling_page_id == bucket_page_id {
            return Ok(false);
        }

        let sibling_ref = self.buffer_pool.fetch_page(sibling_page_id)?;
        let sibling_empty = {
            let guard = sibling_ref.read().unwrap();
            HashBucketPageCodec::<K, V>::decode(guard.data())?.0.is_empty()
        };
        drop(sibling_ref);
        if !sibling_empty {
            return Ok(false);
        }

        let dir_size = directory.size();
        for i in 0..dir_size {
            let page_id = directory.bucket_page_id(i);
            if page_id == sibling_page_id {
                directory.set_bucket_page_id(i, bucket_page_id);
                directory.decr_local_depth(i);
            } else if page_id == bucket_page_id {
                directory.decr_local_depth(i);
            }
        }
        if directory.can_shrink() {
            directory.decr_global_depth();
        }

        dir_ref
            .write()
            .unwrap()
            .set_data(&HashDirectoryPageCodec::encode(&directory));
        self.buffer_pool.delete_page(sibling_page_id)?;
        Ok(true)
    }

    pub fn global_depth(&self) -> BucketDBResult<u32> {
        let _table_guard = self.table_latch.read();
        let (_dir_ref, directory) = self.fetch_directory()?;
        Ok(directory.global_depth())
    }

    /// Asserts every directory invariant. Panics on violation.
    pub fn verify_integrity(&self) -> BucketDBResult<()> {
        let _table_guard = self.table_latch.read();
        let (_dir_ref, directory) = self.fetch_directory()?;
        directory.verify_integrity();
        Ok(())
    }

    /// Logs the directory layout and per-bucket occupancy.
    pub fn print_directory(&self) -> BucketDBResult<()> {
        let _table_guard = self.table_latch.read();
        let (_dir_ref, directory) = self.fetch_directory()?;
        directory.print_directory();
        for i in 0..directory.size() {
            let bucket_page_id = directory.bucket_page_id(i);
            let bucket_ref = self.buffer_pool.fetch_page(bucket_page_id)?;
            let guard = bucket_ref.read().unwrap();
            let (bucket, _) = HashBucketPageCodec::<K, V>::decode(guard.data())?;
            debug!(
                "bucket idx {:>3} | page id {:>4} | {}/{} readable",
                i,
                bucket_page_id,
                bucket.num_readable(),
                bucket.size()
            );
        }
        Ok(())
    }
}
