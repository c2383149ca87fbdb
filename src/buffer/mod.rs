mod buffer_pool;
mod page;

pub use buffer_pool::BufferPoolManager;
pub use page::{AtomicPageId, Page, PageId, PageRef, INVALID_PAGE_ID, PAGE_SIZE};

pub type FrameId = usize;
