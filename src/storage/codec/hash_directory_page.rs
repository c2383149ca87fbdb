use crate::buffer::PAGE_SIZE;
use crate::error::BucketDBResult;
use crate::storage::codec::{CommonCodec, DecodedData};
use crate::storage::page::{HashDirectoryPage, DIRECTORY_ARRAY_SIZE};

/// On-page layout: `[global_depth | local_depths | bucket_page_ids]`, arrays
/// always at their maximum size so the offsets are depth-independent.
pub struct HashDirectoryPageCodec;

impl HashDirectoryPageCodec {
    pub fn encode(page: &HashDirectoryPage) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(PAGE_SIZE);
        bytes.extend(CommonCodec::encode_u32(page.global_depth));
        bytes.extend_from_slice(&page.local_depths);
        for page_id in page.bucket_page_ids.iter() {
            bytes.extend(CommonCodec::encode_u32(*page_id));
        }
        assert!(bytes.len() <= PAGE_SIZE);
        bytes.resize(PAGE_SIZE, 0);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> BucketDBResult<DecodedData<HashDirectoryPage>> {
        assert_eq!(bytes.len(), PAGE_SIZE);
        let mut left = bytes;

        let (global_depth, offset) = CommonCodec::decode_u32(left)?;
        left = &left[offset..];

        let local_depths = left[0..DIRECTORY_ARRAY_SIZE].to_vec();
        left = &left[DIRECTORY_ARRAY_SIZE..];

        let mut bucket_page_ids = Vec::with_capacity(DIRECTORY_ARRAY_SIZE);
        for _ in 0..DIRECTORY_ARRAY_SIZE {
            let (page_id, offset) = CommonCodec::decode_u32(left)?;
            left = &left[offset..];
            bucket_page_ids.push(page_id);
        }

        Ok((
            HashDirectoryPage {
                global_depth,
                local_depths,
                bucket_page_ids,
            },
            PAGE_SIZE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_page_round_trip() {
        let mut page = HashDirectoryPage::new();
        page.incr_global_depth();
        page.set_bucket_page_id(0, 5);
        page.set_bucket_page_id(1, 9);
        page.set_local_depth(0, 1);
        page.set_local_depth(1, 1);

        let bytes = HashDirectoryPageCodec::encode(&page);
        assert_eq!(bytes.len(), PAGE_SIZE);
        let (decoded, _) = HashDirectoryPageCodec::decode(&bytes).unwrap();
        assert_eq!(decoded, page);
    }
}
