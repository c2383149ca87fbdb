use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use crate::buffer::{PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::error::{BucketDBError, BucketDBResult};
use crate::storage::codec::FreelistPageCodec;
use crate::storage::page::{
    decode_meta_page, encode_meta_page, FreelistPage, MetaPage, META_PAGE_SIZE,
};

static EMPTY_PAGE: [u8; PAGE_SIZE] = [0; PAGE_SIZE];

#[derive(Debug)]
pub struct DiskManager {
    next_page_id: AtomicU32,
    // one thread at a time touches the file handle
    db_file: Mutex<File>,
    pub meta: RwLock<MetaPage>,
}

impl DiskManager {
    pub fn try_new(db_path: impl AsRef<Path>) -> BucketDBResult<Self> {
        let db_path = db_path.as_ref();
        let mut is_new_file = false;

        let (db_file, meta) = if db_path.exists() {
            let mut db_file = OpenOptions::new().read(true).write(true).open(db_path)?;
            let mut buf = vec![0; META_PAGE_SIZE];
            db_file.read_exact(&mut buf)?;
            let (meta, _) = decode_meta_page(&buf)?;
            (db_file, meta)
        } else {
            is_new_file = true;
            let mut db_file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(db_path)?;
            let meta = MetaPage::new();
            db_file.write_all(&encode_meta_page(&meta))?;
            (db_file, meta)
        };

        let db_file_len = db_file.metadata()?.len();
        if (db_file_len - META_PAGE_SIZE as u64) % PAGE_SIZE as u64 != 0 {
            return Err(BucketDBError::Internal(format!(
                "db file size not a multiple of {} + meta page size {}",
                PAGE_SIZE, META_PAGE_SIZE,
            )));
        }
        let next_page_id =
            (((db_file_len - META_PAGE_SIZE as u64) / PAGE_SIZE as u64) + 1) as PageId;
        debug!("Initialized disk_manager next_page_id: {}", next_page_id);

        let disk_manager = Self {
            next_page_id: AtomicU32::new(next_page_id),
            db_file: Mutex::new(db_file),
            meta: RwLock::new(meta),
        };

        if is_new_file {
            let freelist_page_id = disk_manager.allocate_freelist_page()?;
            disk_manager.meta.write().unwrap().freelist_page_id = freelist_page_id;
            disk_manager.write_meta_page()?;
        }

        Ok(disk_manager)
    }

    pub fn read_page(&self, page_id: PageId) -> BucketDBResult<[u8; PAGE_SIZE]> {
        if page_id == INVALID_PAGE_ID {
            return Err(BucketDBError::Storage(
                "read_page: invalid page id".to_string(),
            ));
        }
        let mut guard = self.db_file.lock().unwrap();
        guard.seek(SeekFrom::Start(
            (META_PAGE_SIZE + (page_id - 1) as usize * PAGE_SIZE) as u64,
        ))?;
        let mut page = [0u8; PAGE_SIZE];
        guard.read_exact(&mut page)?;
        Ok(page)
    }

    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> BucketDBResult<()> {
        if page_id == INVALID_PAGE_ID {
            return Err(BucketDBError::Storage(
                "write_page: invalid page id".to_string(),
            ));
        }
        if data.len() != PAGE_SIZE {
            return Err(BucketDBError::Internal(format!(
                "Page size is not {}",
                PAGE_SIZE
            )));
        }
        let mut guard = self.db_file.lock().unwrap();
        Self::write_page_internal(&mut guard, page_id, data)
    }

    /// Pops the freelist first; only a miss extends the file.
    pub fn allocate_page(&self) -> BucketDBResult<PageId> {
        if let Some(page_id) = self.freelist_pop()? {
            Ok(page_id)
        } else {
            let mut guard = self.db_file.lock().unwrap();
            let page_id = self.next_page_id.fetch_add(1, Ordering::SeqCst);
            Self::write_page_internal(&mut guard, page_id, &EMPTY_PAGE)?;
            Ok(page_id)
        }
    }

    pub fn deallocate_page(&self, page_id: PageId) -> BucketDBResult<()> {
        if page_id == INVALID_PAGE_ID {
            return Err(BucketDBError::Storage(
                "deallocate_page: invalid page id".to_string(),
            ));
        }
        // The file never shrinks; the page is zeroed and recycled through the
        // freelist instead.
        let mut guard = self.db_file.lock().unwrap();
        Self::write_page_internal(&mut guard, page_id, &EMPTY_PAGE)?;
        drop(guard);

        self.freelist_push(page_id)?;
        Ok(())
    }

    pub fn db_file_len(&self) -> BucketDBResult<u64> {
        let guard = self.db_file.lock().unwrap();
        let meta = guard.metadata()?;
        Ok(meta.len())
    }

    fn allocate_freelist_page(&self) -> BucketDBResult<PageId> {
        let page_id = self.allocate_page()?;
        let freelist_page = FreelistPage::new();
        self.write_page(page_id, &FreelistPageCodec::encode(&freelist_page))?;
        Ok(page_id)
    }

    fn freelist_push(&self, page_id: PageId) -> BucketDBResult<()> {
        let mut curr_page_id = INVALID_PAGE_ID;
        let mut next_page_id = self.meta.read().unwrap().freelist_page_id;
        loop {
            let mut freelist_page = if next_page_id == INVALID_PAGE_ID {
                // every link is full; chain a fresh one
                next_page_id = self.allocate_freelist_page()?;
                if curr_page_id != INVALID_PAGE_ID {
                    let (mut curr_freelist_page, _) =
                        FreelistPageCodec::decode(&self.read_page(curr_page_id)?)?;
                    curr_freelist_page.header.next_page_id = next_page_id;
                    self.write_page(
                        curr_page_id,
                        &FreelistPageCodec::encode(&curr_freelist_page),
                    )?;
                }
                FreelistPage::new()
            } else {
                let (freelist_page, _) = FreelistPageCodec::decode(&self.read_page(next_page_id)?)?;
                freelist_page
            };

            if freelist_page.is_full() {
                curr_page_id = next_page_id;
                next_page_id = freelist_page.header.next_page_id;
            } else {
                freelist_page.push(page_id);
                self.write_page(next_page_id, &FreelistPageCodec::encode(&freelist_page))?;
                break;
            }
        }
        Ok(())
    }

    fn freelist_pop(&self) -> BucketDBResult<Option<PageId>> {
        let mut freelist_page_id = self.meta.read().unwrap().freelist_page_id;
        loop {
            if freelist_page_id == INVALID_PAGE_ID {
                return Ok(None);
            }
            let (mut freelist_page, _) =
                FreelistPageCodec::decode(&self.read_page(freelist_page_id)?)?;
            if let Some(page_id) = freelist_page.pop() {
                self.write_page(freelist_page_id, &FreelistPageCodec::encode(&freelist_page))?;
                return Ok(Some(page_id));
            } else {
                freelist_page_id = freelist_page.header.next_page_id;
            }
        }
    }

    fn write_meta_page(&self) -> BucketDBResult<()> {
        let mut guard = self.db_file.lock().unwrap();
        guard.seek(SeekFrom::Start(0))?;
        let encoded = encode_meta_page(&self.meta.read().unwrap());
        guard.write_all(&encoded)?;
        guard.flush()?;
        Ok(())
    }

    fn write_page_internal(
        guard: &mut MutexGuard<File>,
        page_id: PageId,
        data: &[u8],
    ) -> BucketDBResult<()> {
        guard.seek(SeekFrom::Start(
            (META_PAGE_SIZE + (page_id - 1) as usize * PAGE_SIZE) as u64,
        ))?;
        guard.write_all(data)?;
        guard.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::buffer::PAGE_SIZE;
    use tempfile::TempDir;

    #[test]
    fn disk_manager_write_read_page() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = temp_dir.path().join("test.db");

        let disk_manager = super::DiskManager::try_new(temp_path).unwrap();

        // page 1 is the freelist page
        let page_id1 = disk_manager.allocate_page().unwrap();
        assert_eq!(page_id1, 2);
        let mut page1 = vec![1, 2, 3];
        page1.extend(vec![0; PAGE_SIZE - 3]);
        disk_manager.write_page(page_id1, &page1).unwrap();
        let page = disk_manager.read_page(page_id1).unwrap();
        assert_eq!(page, page1.as_slice());

        let page_id2 = disk_manager.allocate_page().unwrap();
        assert_eq!(page_id2, 3);
        let mut page2 = vec![0; PAGE_SIZE - 3];
        page2.extend(vec![4, 5, 6]);
        disk_manager.write_page(page_id2, &page2).unwrap();
        let page = disk_manager.read_page(page_id2).unwrap();
        assert_eq!(page, page2.as_slice());

        let db_file_len = disk_manager.db_file_len().unwrap();
        assert_eq!(db_file_len as usize, PAGE_SIZE * 3 + PAGE_SIZE);
    }

    #[test]
    fn disk_manager_freelist_recycles_pages() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = temp_dir.path().join("test.db");

        let disk_manager = super::DiskManager::try_new(temp_path).unwrap();

        let page_id1 = disk_manager.allocate_page().unwrap();
        let _page_id2 = disk_manager.allocate_page().unwrap();
        let _page_id3 = disk_manager.allocate_page().unwrap();

        disk_manager.deallocate_page(page_id1).unwrap();

        let page_id4 = disk_manager.allocate_page().unwrap();
        assert_eq!(page_id1, page_id4);
    }

    #[test]
    fn disk_manager_reopen_keeps_contents() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = temp_dir.path().join("test.db");

        let page_id = {
            let disk_manager = super::DiskManager::try_new(&temp_path).unwrap();
            let page_id = disk_manager.allocate_page().unwrap();
            let mut data = vec![9u8; 4];
            data.extend(vec![0; PAGE_SIZE - 4]);
            disk_manager.write_page(page_id, &data).unwrap();
            page_id
        };

        let disk_manager = super::DiskManager::try_new(&temp_path).unwrap();
        let page = disk_manager.read_page(page_id).unwrap();
        assert_eq!(&page[..4], &[9u8; 4]);

        // new allocations do not clobber existing pages
        let next = disk_manager.allocate_page().unwrap();
        assert!(next > page_id);
    }
}
