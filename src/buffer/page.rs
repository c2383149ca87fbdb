use crate::buffer::FrameId;
use crate::utils::cache::lru_k::LRUKReplacer;
use crate::utils::cache::Replacer;
use dashmap::DashMap;
use log::error;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

pub type PageId = u32;
pub type AtomicPageId = AtomicU32;

pub const INVALID_PAGE_ID: PageId = 0;
pub const PAGE_SIZE: usize = 4096;

#[derive(Debug)]
pub struct Page {
    pub page_id: PageId,
    data: [u8; PAGE_SIZE],
    // pin reference count
    pub pin_count: AtomicU32,
    // whether the frame contents changed since load
    pub is_dirty: bool,
}

impl Page {
    pub fn empty() -> Self {
        Self::new(INVALID_PAGE_ID)
    }

    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            data: [0; PAGE_SIZE],
            pin_count: AtomicU32::new(0),
            is_dirty: false,
        }
    }

    pub fn with_pin_count(mut self, pin_count: u32) -> Self {
        self.pin_count = AtomicU32::new(pin_count);
        self
    }

    pub fn with_data(mut self, data: [u8; PAGE_SIZE]) -> Self {
        self.data = data;
        self
    }

    pub fn destroy(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.data = [0; PAGE_SIZE];
        self.pin_count.store(0, Ordering::SeqCst);
        self.is_dirty = false;
    }

    /// Overwrites the frame contents and marks it dirty.
    pub fn set_data(&mut self, data: &[u8]) {
        self.data[..data.len()].copy_from_slice(data);
        self.is_dirty = true;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn replace(&mut self, other: Page) {
        self.page_id = other.page_id;
        self.data = other.data;
        self.pin_count = other.pin_count;
        self.is_dirty = other.is_dirty;
    }
}

/// Pinned handle to a buffer pool frame. The frame's `RwLock` doubles as the
/// page latch; dropping the handle unpins the frame and lets the replacer
/// reclaim it once the pin count reaches zero.
#[derive(Debug)]
pub struct PageRef {
    pub page: Arc<RwLock<Page>>,
    pub(crate) page_table: Arc<DashMap<PageId, FrameId>>,
    pub(crate) replacer: Arc<RwLock<LRUKReplacer>>,
}

impl Deref for PageRef {
    type Target = Arc<RwLock<Page>>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl Drop for PageRef {
    fn drop(&mut self) {
        // release the pin first and remember whether it was the last one; the
        // frame lock is not held while talking to the replacer
        let (page_id, last_pin) = {
            let page = self.page.read().unwrap();
            let previous = page.pin_count.fetch_sub(1, Ordering::SeqCst);
            debug_assert!(previous > 0, "unpinning a page with no pins");
            (page.page_id, previous == 1)
        };
        if !last_pin {
            return;
        }

        // the frame may already have been recycled under us
        let Some(frame_id) = self.page_table.get(&page_id).map(|entry| *entry) else {
            return;
        };
        if let Err(e) = self.replacer.write().unwrap().set_evictable(frame_id, true) {
            // panicking in drop would abort; log instead
            error!("frame {} could not be made evictable: {}", frame_id, e);
        }
    }
}
