use crate::buffer::{PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::error::{BucketDBError, BucketDBResult};
use crate::storage::codec::{CommonCodec, DecodedData};

pub const META_PAGE_SIZE: usize = PAGE_SIZE;

pub const BUCKETDB_MAGIC: u32 = 0xB0CD_B001;
pub const BUCKETDB_VERSION: u32 = 1;

/// First block of the database file. Everything the disk manager needs to
/// bootstrap itself lives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaPage {
    pub magic: u32,
    pub version: u32,
    pub freelist_page_id: PageId,
}

impl MetaPage {
    pub fn new() -> Self {
        Self {
            magic: BUCKETDB_MAGIC,
            version: BUCKETDB_VERSION,
            freelist_page_id: INVALID_PAGE_ID,
        }
    }
}

impl Default for MetaPage {
    fn default() -> Self {
        Self::new()
    }
}

pub fn encode_meta_page(meta: &MetaPage) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(META_PAGE_SIZE);
    bytes.extend(CommonCodec::encode_u32(meta.magic));
    bytes.extend(CommonCodec::encode_u32(meta.version));
    bytes.extend(CommonCodec::encode_u32(meta.freelist_page_id));
    bytes.resize(META_PAGE_SIZE, 0);
    bytes
}

pub fn decode_meta_page(bytes: &[u8]) -> BucketDBResult<DecodedData<MetaPage>> {
    let mut left = bytes;

    let (magic, offset) = CommonCodec::decode_u32(left)?;
    left = &left[offset..];
    if magic != BUCKETDB_MAGIC {
        return Err(BucketDBError::Storage(format!(
            "not a bucketdb file (magic {:#010x})",
            magic
        )));
    }
    let (version, offset) = CommonCodec::decode_u32(left)?;
    left = &left[offset..];
    if version != BUCKETDB_VERSION {
        return Err(BucketDBError::Storage(format!(
            "unsupported file version {}",
            version
        )));
    }
    let (freelist_page_id, _) = CommonCodec::decode_u32(left)?;

    Ok((
        MetaPage {
            magic,
            version,
            freelist_page_id,
        },
        META_PAGE_SIZE,
    ))
}
