use crate::error::BucketDBResult;
use crate::storage::codec::{CommonCodec, DecodedData};
use crate::storage::page::RecordId;
use std::fmt::Debug;

/// A fixed-width scalar that can live in a page slot. The width must not
/// depend on the value: tombstoned slots keep their bytes, so every slot of a
/// bucket page has the same footprint.
pub trait Storable: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    const ENCODED_WIDTH: usize;

    fn encode(&self) -> Vec<u8>;

    fn decode(bytes: &[u8]) -> BucketDBResult<DecodedData<Self>>;
}

impl Storable for i32 {
    const ENCODED_WIDTH: usize = 4;

    fn encode(&self) -> Vec<u8> {
        CommonCodec::encode_i32(*self)
    }

    fn decode(bytes: &[u8]) -> BucketDBResult<DecodedData<Self>> {
        CommonCodec::decode_i32(bytes)
    }
}

impl Storable for i64 {
    const ENCODED_WIDTH: usize = 8;

    fn encode(&self) -> Vec<u8> {
        CommonCodec::encode_i64(*self)
    }

    fn decode(bytes: &[u8]) -> BucketDBResult<DecodedData<Self>> {
        CommonCodec::decode_i64(bytes)
    }
}

impl Storable for u32 {
    const ENCODED_WIDTH: usize = 4;

    fn encode(&self) -> Vec<u8> {
        CommonCodec::encode_u32(*self)
    }

    fn decode(bytes: &[u8]) -> BucketDBResult<DecodedData<Self>> {
        CommonCodec::decode_u32(bytes)
    }
}

impl Storable for u64 {
    const ENCODED_WIDTH: usize = 8;

    fn encode(&self) -> Vec<u8> {
        CommonCodec::encode_u64(*self)
    }

    fn decode(bytes: &[u8]) -> BucketDBResult<DecodedData<Self>> {
        CommonCodec::decode_u64(bytes)
    }
}

impl Storable for RecordId {
    const ENCODED_WIDTH: usize = 8;

    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::ENCODED_WIDTH);
        bytes.extend(CommonCodec::encode_u32(self.page_id));
        bytes.extend(CommonCodec::encode_u32(self.slot_num));
        bytes
    }

    fn decode(bytes: &[u8]) -> BucketDBResult<DecodedData<Self>> {
        let (page_id, offset) = CommonCodec::decode_u32(bytes)?;
        let (slot_num, offset2) = CommonCodec::decode_u32(&bytes[offset..])?;
        Ok((RecordId::new(page_id, slot_num), offset + offset2))
    }
}
