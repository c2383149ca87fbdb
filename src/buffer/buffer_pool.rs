use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLock};

use crate::buffer::page::{Page, PageId, PageRef, PAGE_SIZE};
use crate::buffer::FrameId;
use crate::config::BufferPoolConfig;
use crate::error::{BucketDBError, BucketDBResult};
use crate::storage::disk_scheduler::{DiskCommandResultReceiver, DiskScheduler};
use crate::utils::cache::lru_k::LRUKReplacer;
use crate::utils::cache::Replacer;

/// Fixed set of in-memory frames caching disk pages. Frames are handed out
/// from a free stack while one lasts, after that the LRU-K replacer picks an
/// unpinned victim and dirty victims are written back before reuse.
#[derive(Debug)]
pub struct BufferPoolManager {
    pub(crate) frames: Vec<Arc<RwLock<Page>>>,
    pub(crate) replacer: Arc<RwLock<LRUKReplacer>>,
    pub disk_scheduler: Arc<DiskScheduler>,
    pub(crate) page_table: Arc<DashMap<PageId, FrameId>>,
    pub(crate) free_frames: Arc<RwLock<Vec<FrameId>>>,
}

impl BufferPoolManager {
    pub fn new(num_pages: usize, disk_scheduler: Arc<DiskScheduler>) -> Self {
        Self::new_with_config(
            BufferPoolConfig {
                buffer_pool_size: num_pages,
                ..Default::default()
            },
            disk_scheduler,
        )
    }

    pub fn new_with_config(config: BufferPoolConfig, disk_scheduler: Arc<DiskScheduler>) -> Self {
        let num_pages = config.buffer_pool_size;
        let frames: Vec<_> = (0..num_pages)
            .map(|_| Arc::new(RwLock::new(Page::empty())))
            .collect();
        // stack ordered so frame 0 is handed out first
        let free_frames: Vec<FrameId> = (0..num_pages).rev().collect();

        Self {
            frames,
            replacer: Arc::new(RwLock::new(LRUKReplacer::with_k(
                num_pages,
                config.lru_k_k,
            ))),
            disk_scheduler,
            page_table: Arc::new(DashMap::new()),
            free_frames: Arc::new(RwLock::new(free_frames)),
        }
    }

    /// Allocates a page on disk and pins it in a frame.
    pub fn new_page(&self) -> BucketDBResult<PageRef> {
        let frame_id = self.acquire_frame()?;
        let page_id = match Self::wait_for(self.disk_scheduler.schedule_allocate()?, "allocation")
        {
            Ok(page_id) => page_id,
            Err(e) => {
                self.free_frames.write().unwrap().push(frame_id);
                return Err(e);
            }
        };
        self.install_page(frame_id, Page::new(page_id).with_pin_count(1))
    }

    /// Pins the page, reading it from disk if it is not resident.
    pub fn fetch_page(&self, page_id: PageId) -> BucketDBResult<PageRef> {
        if let Some(frame_id) = self.lookup_frame(page_id) {
            let handle = self.handle(frame_id);
            handle.read().unwrap().pin_count.fetch_add(1, Ordering::SeqCst);
            self.replacer
                .write()
                .unwrap()
                .set_evictable(frame_id, false)?;
            return Ok(handle);
        }

        let frame_id = self.acquire_frame()?;
        let bytes = match Self::wait_for(self.disk_scheduler.schedule_read(page_id)?, "read") {
            Ok(bytes) => bytes,
            Err(e) => {
                self.free_frames.write().unwrap().push(frame_id);
                return Err(e);
            }
        };
        let mut data = [0u8; PAGE_SIZE];
        let len = bytes.len().min(PAGE_SIZE);
        data[..len].copy_from_slice(&bytes[..len]);

        self.install_page(frame_id, Page::new(page_id).with_pin_count(1).with_data(data))
    }

    /// Writes the page's current contents to disk and clears its dirty bit.
    /// Returns false when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> BucketDBResult<bool> {
        let Some(frame_id) = self.lookup_frame(page_id) else {
            return Ok(false);
        };
        let data = Bytes::copy_from_slice(self.frames[frame_id].read().unwrap().data());
        Self::wait_for(self.disk_scheduler.schedule_write(page_id, data)?, "flush")?;
        self.frames[frame_id].write().unwrap().is_dirty = false;
        Ok(true)
    }

    pub fn flush_all_pages(&self) -> BucketDBResult<()> {
        let resident: Vec<PageId> = self.page_table.iter().map(|entry| *entry.key()).collect();
        for page_id in resident {
            let dirty = self
                .lookup_frame(page_id)
                .map(|frame_id| self.frames[frame_id].read().unwrap().is_dirty)
                .unwrap_or(false);
            if dirty {
                self.flush_page(page_id)?;
            }
        }
        Ok(())
    }

    /// Evicts the page from the pool (refusing while pinned) and returns its
    /// disk space to the freelist.
    pub fn delete_page(&self, page_id: PageId) -> BucketDBResult<bool> {
        if let Some(frame_id) = self.lookup_frame(page_id) {
            if self.frames[frame_id]
                .read()
                .unwrap()
                .pin_count
                .load(Ordering::SeqCst)
                > 0
            {
                return Ok(false);
            }
            self.frames[frame_id].write().unwrap().destroy();
            self.page_table.remove(&page_id);
            self.replacer.write().unwrap().remove(frame_id);
            self.free_frames.write().unwrap().push(frame_id);
        }
        Self::wait_for(
            self.disk_scheduler.schedule_deallocate(page_id)?,
            "deallocation",
        )?;
        Ok(true)
    }

    /// Claims a frame for a new resident page. Falls back to eviction when
    /// the free stack is empty; a dirty victim is written back first.
    fn acquire_frame(&self) -> BucketDBResult<FrameId> {
        if let Some(frame_id) = self.free_frames.write().unwrap().pop() {
            return Ok(frame_id);
        }

        let victim = self.replacer.write().unwrap().evict().ok_or_else(|| {
            BucketDBError::Storage("buffer pool exhausted: every frame is pinned".to_string())
        })?;

        let (victim_page_id, dirty_copy) = {
            let page = self.frames[victim].read().unwrap();
            let copy = if page.is_dirty {
                Some(Bytes::copy_from_slice(page.data()))
            } else {
                None
            };
            (page.page_id, copy)
        };
        if let Some(data) = dirty_copy {
            Self::wait_for(
                self.disk_scheduler.schedule_write(victim_page_id, data)?,
                "eviction write-back",
            )?;
        }
        self.page_table.remove(&victim_page_id);
        Ok(victim)
    }

    /// Installs `page` into the frame, registers it with the page table and
    /// replacer, and hands back the pinned handle.
    fn install_page(&self, frame_id: FrameId, page: Page) -> BucketDBResult<PageRef> {
        let page_id = page.page_id;
        self.frames[frame_id].write().unwrap().replace(page);
        self.page_table.insert(page_id, frame_id);
        {
            let mut replacer = self.replacer.write().unwrap();
            replacer.record_access(frame_id)?;
            replacer.set_evictable(frame_id, false)?;
        }
        Ok(self.handle(frame_id))
    }

    fn handle(&self, frame_id: FrameId) -> PageRef {
        PageRef {
            page: self.frames[frame_id].clone(),
            page_table: self.page_table.clone(),
            replacer: self.replacer.clone(),
        }
    }

    fn lookup_frame(&self, page_id: PageId) -> Option<FrameId> {
        self.page_table.get(&page_id).map(|entry| *entry)
    }

    fn wait_for<T>(rx: DiskCommandResultReceiver<T>, what: &str) -> BucketDBResult<T> {
        match rx.recv() {
            Ok(reply) => reply,
            Err(e) => Err(BucketDBError::Internal(format!(
                "disk scheduler dropped the {} reply: {}",
                what, e
            ))),
        }
    }
}
