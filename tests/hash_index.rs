use bucketdb::buffer::BufferPoolManager;
use bucketdb::storage::disk_manager::DiskManager;
use bucketdb::storage::disk_scheduler::DiskScheduler;
use bucketdb::storage::index::key::{
    DefaultHashFunction, HashFunction, OrdComparator,
};
use bucketdb::storage::index::ExtendibleHashIndex;
use bucketdb::storage::page::{bucket_array_size, RecordId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

/// Routes a key by its own value, so tests can steer keys into buckets by
/// picking their low bits.
struct IdentityHashFunction;

impl HashFunction<i32> for IdentityHashFunction {
    fn get_hash(&self, key: &i32) -> u64 {
        *key as u64
    }
}

fn setup_buffer_pool(pool_size: usize) -> (TempDir, Arc<BufferPoolManager>) {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path().join("test.db");
    let disk_manager = Arc::new(DiskManager::try_new(temp_path).unwrap());
    let disk_scheduler = Arc::new(DiskScheduler::new(disk_manager));
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, disk_scheduler));
    (temp_dir, buffer_pool)
}

#[test]
fn first_split_grows_directory_to_depth_one() {
    let (_temp_dir, buffer_pool) = setup_buffer_pool(64);
    let index =
        ExtendibleHashIndex::try_new(buffer_pool, OrdComparator, IdentityHashFunction).unwrap();

    // every key routes to the single depth-0 bucket until it fills up
    let capacity = bucket_array_size(8) as i32;
    for i in 0..capacity {
        assert!(index.insert(&i, &i).unwrap());
    }
    assert_eq!(index.global_depth().unwrap(), 0);

    // one more insert forces the first split
    assert!(index.insert(&capacity, &capacity).unwrap());
    assert_eq!(index.global_depth().unwrap(), 1);
    index.verify_integrity().unwrap();

    for i in 0..=capacity {
        assert_eq!(index.get_value(&i).unwrap(), vec![i]);
    }
}

#[test]
fn colliding_low_bits_split_repeatedly_until_separation() {
    let (_temp_dir, buffer_pool) = setup_buffer_pool(64);
    let index =
        ExtendibleHashIndex::try_new(buffer_pool, OrdComparator, IdentityHashFunction).unwrap();

    // all keys share their low three bits, so the first three splits cannot
    // separate anything and the table must keep splitting
    let capacity = bucket_array_size(8) as i32;
    for i in 0..=capacity {
        let key = i * 8;
        assert!(index.insert(&key, &i).unwrap(), "insert {} failed", key);
    }
    assert_eq!(index.global_depth().unwrap(), 4);
    index.verify_integrity().unwrap();

    for i in 0..=capacity {
        let key = i * 8;
        assert_eq!(index.get_value(&key).unwrap(), vec![i]);
    }
}

#[test]
fn drain_and_merge_shrinks_directory() {
    let (_temp_dir, buffer_pool) = setup_buffer_pool(64);
    let index =
        ExtendibleHashIndex::try_new(buffer_pool, OrdComparator, IdentityHashFunction).unwrap();

    // even keys only: the table ends at global depth 2 with the two live
    // buckets at local depth 2 and an empty sibling at local depth 1
    let capacity = bucket_array_size(8) as i32;
    for i in 0..=capacity {
        let key = i * 2;
        assert!(index.insert(&key, &i).unwrap());
    }
    assert_eq!(index.global_depth().unwrap(), 2);
    index.verify_integrity().unwrap();

    // draining one residue class empties its bucket; the merge cascade folds
    // the directory all the way back to a single bucket
    for i in (1..=capacity).step_by(2) {
        let key = i * 2;
        assert!(index.remove(&key, &i).unwrap(), "remove {} failed", key);
    }
    assert_eq!(index.global_depth().unwrap(), 0);
    index.verify_integrity().unwrap();

    for i in (0..=capacity).step_by(2) {
        let key = i * 2;
        assert_eq!(index.get_value(&key).unwrap(), vec![i]);
    }
}

#[test]
fn multimap_and_tombstone_reuse() {
    let (_temp_dir, buffer_pool) = setup_buffer_pool(64);
    let index = ExtendibleHashIndex::try_new(
        buffer_pool,
        OrdComparator,
        DefaultHashFunction::<i32>::new(),
    )
    .unwrap();

    assert!(index.insert(&1, &10).unwrap());
    assert!(index.insert(&1, &11).unwrap());
    assert!(index.insert(&1, &12).unwrap());
    let mut values = index.get_value(&1).unwrap();
    values.sort();
    assert_eq!(values, vec![10, 11, 12]);

    // removing one value leaves the others reachable
    assert!(index.remove(&1, &11).unwrap());
    assert!(!index.remove(&1, &11).unwrap());
    let mut values = index.get_value(&1).unwrap();
    values.sort();
    assert_eq!(values, vec![10, 12]);

    assert!(index.insert(&1, &11).unwrap());
    let mut values = index.get_value(&1).unwrap();
    values.sort();
    assert_eq!(values, vec![10, 11, 12]);
}

#[test]
fn concurrent_disjoint_inserts_are_all_retrievable() {
    let (_temp_dir, buffer_pool) = setup_buffer_pool(256);
    let index = Arc::new(
        ExtendibleHashIndex::<i32, RecordId, _, _>::try_new(
            buffer_pool,
            OrdComparator,
            DefaultHashFunction::<i32>::new(),
        )
        .unwrap(),
    );

    const KEYS_PER_THREAD: i32 = 5000;
    let mut handles = vec![];
    for t in 0..2 {
        let index = index.clone();
        handles.push(thread::spawn(move || {
            let base = t * KEYS_PER_THREAD;
            for i in base..base + KEYS_PER_THREAD {
                let rid = RecordId::new(i as u32, i as u32);
                assert!(index.insert(&i, &rid).unwrap(), "insert {} failed", i);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    index.verify_integrity().unwrap();
    assert!(index.global_depth().unwrap() >= 1);

    for i in 0..2 * KEYS_PER_THREAD {
        let values = index.get_value(&i).unwrap();
        assert_eq!(values, vec![RecordId::new(i as u32, i as u32)]);
    }
}

#[test]
fn concurrent_readers_and_writers() {
    let (_temp_dir, buffer_pool) = setup_buffer_pool(256);
    let index = Arc::new(
        ExtendibleHashIndex::<i32, i32, _, _>::try_new(
            buffer_pool,
            OrdComparator,
            DefaultHashFunction::<i32>::new(),
        )
        .unwrap(),
    );

    for i in 0..1000 {
        assert!(index.insert(&i, &i).unwrap());
    }

    let mut handles = vec![];
    // writers append a disjoint key range while readers hammer the stable one
    for t in 0..2 {
        let index = index.clone();
        handles.push(thread::spawn(move || {
            let base = 1000 + t * 1000;
            for i in base..base + 1000 {
                assert!(index.insert(&i, &i).unwrap());
            }
        }));
    }
    for _ in 0..2 {
        let index = index.clone();
        handles.push(thread::spawn(move || {
            for round in 0..3 {
                for i in 0..1000 {
                    let values = index.get_value(&i).unwrap();
                    assert_eq!(values, vec![i], "round {} key {}", round, i);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    index.verify_integrity().unwrap();
    for i in 0..3000 {
        assert_eq!(index.get_value(&i).unwrap(), vec![i]);
    }
}

#[test]
fn random_churn_matches_in_memory_model() {
    let (_temp_dir, buffer_pool) = setup_buffer_pool(256);
    let index = ExtendibleHashIndex::try_new(
        buffer_pool,
        OrdComparator,
        DefaultHashFunction::<i32>::new(),
    )
    .unwrap();

    let mut model: HashSet<(i32, i32)> = HashSet::new();
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..5000 {
        let key = rng.gen_range(0..1500);
        let value = rng.gen_range(0..3);
        if rng.gen_bool(0.6) {
            let expected = model.insert((key, value));
            assert_eq!(index.insert(&key, &value).unwrap(), expected);
        } else {
            let expected = model.remove(&(key, value));
            assert_eq!(index.remove(&key, &value).unwrap(), expected);
        }
    }

    index.verify_integrity().unwrap();
    for key in 0..1500 {
        let mut expected: Vec<i32> = model
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .collect();
        expected.sort();
        let mut actual = index.get_value(&key).unwrap();
        actual.sort();
        assert_eq!(actual, expected, "key {}", key);
    }
}

#[test]
fn fixed_key_instantiation() {
    use bucketdb::storage::index::key::FixedKey;

    let (_temp_dir, buffer_pool) = setup_buffer_pool(128);
    let index = ExtendibleHashIndex::<FixedKey<16>, RecordId, _, _>::try_new(
        buffer_pool,
        OrdComparator,
        DefaultHashFunction::<FixedKey<16>>::new(),
    )
    .unwrap();

    for i in 0..500u64 {
        let key = FixedKey::<16>::from_integer(i);
        let rid = RecordId::new(i as u32, 0);
        assert!(index.insert(&key, &rid).unwrap());
    }
    index.verify_integrity().unwrap();
    for i in 0..500u64 {
        let key = FixedKey::<16>::from_integer(i);
        assert_eq!(index.get_value(&key).unwrap(), vec![RecordId::new(i as u32, 0)]);
    }
}

#[test]
fn flush_and_reopen_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path().join("test.db");

    let directory_page_id = {
        let disk_manager = Arc::new(DiskManager::try_new(&temp_path).unwrap());
        let disk_scheduler = Arc::new(DiskScheduler::new(disk_manager));
        let buffer_pool = Arc::new(BufferPoolManager::new(128, disk_scheduler));
        let index = ExtendibleHashIndex::<i32, i32, _, _>::try_new(
            buffer_pool.clone(),
            OrdComparator,
            DefaultHashFunction::<i32>::new(),
        )
        .unwrap();

        for i in 0..1000 {
            assert!(index.insert(&i, &(i * 7)).unwrap());
        }
        buffer_pool.flush_all_pages().unwrap();
        index.directory_page_id()
    };

    let disk_manager = Arc::new(DiskManager::try_new(&temp_path).unwrap());
    let disk_scheduler = Arc::new(DiskScheduler::new(disk_manager));
    let buffer_pool = Arc::new(BufferPoolManager::new(128, disk_scheduler));
    let index = ExtendibleHashIndex::<i32, i32, _, _>::open(
        buffer_pool,
        OrdComparator,
        DefaultHashFunction::<i32>::new(),
        directory_page_id,
    );

    index.verify_integrity().unwrap();
    for i in 0..1000 {
        assert_eq!(index.get_value(&i).unwrap(), vec![i * 7]);
    }
}
