use crate::buffer::PAGE_SIZE;
use crate::error::BucketDBResult;
use crate::storage::codec::{CommonCodec, DecodedData};
use crate::storage::page::{FreelistPage, FreelistPageHeader};

pub struct FreelistPageCodec;

impl FreelistPageCodec {
    pub fn encode(page: &FreelistPage) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(PAGE_SIZE);
        bytes.extend(CommonCodec::encode_u32(page.header.next_page_id));
        bytes.extend(CommonCodec::encode_u32(page.header.current_size));
        bytes.extend(CommonCodec::encode_u32(page.header.max_size));
        for page_id in page.array.iter() {
            bytes.extend(CommonCodec::encode_u32(*page_id));
        }
        assert!(bytes.len() <= PAGE_SIZE);
        bytes.resize(PAGE_SIZE, 0);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> BucketDBResult<DecodedData<FreelistPage>> {
        assert_eq!(bytes.len(), PAGE_SIZE);
        let mut left = bytes;

        let (next_page_id, offset) = CommonCodec::decode_u32(left)?;
        left = &left[offset..];
        let (current_size, offset) = CommonCodec::decode_u32(left)?;
        left = &left[offset..];
        let (max_size, offset) = CommonCodec::decode_u32(left)?;
        left = &left[offset..];

        let mut array = Vec::with_capacity(current_size as usize);
        for _ in 0..current_size {
            let (page_id, offset) = CommonCodec::decode_u32(left)?;
            left = &left[offset..];
            array.push(page_id);
        }

        Ok((
            FreelistPage {
                header: FreelistPageHeader {
                    next_page_id,
                    current_size,
                    max_size,
                },
                array,
            },
            PAGE_SIZE,
        ))
    }
}
