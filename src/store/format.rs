//! Fixed-size byte layouts of every record type.
//!
//! All multi-byte integers are big-endian. Byte 0 of every record is the
//! in-use flag; a free slot (flag 0) is not decoded any further because freed
//! records may carry arbitrary leftover bytes.

use smallvec::SmallVec;

use super::record::{
    DynamicRecord, NodeLabels, NodeRecord, PropertyBlock, PropertyRecord, PropertyValue, Record,
    RelationshipRecord, TokenRecord,
};
use super::{Result, StoreError};
use crate::types::DynamicStore;

const IN_USE: u8 = 1;
const NOT_IN_USE: u8 = 0;

const LABELS_INLINE: u8 = 0;
const LABELS_DYNAMIC: u8 = 1;
const INLINE_LABEL_CAPACITY: usize = 3;

const BLOCK_BOOL: u8 = 1;
const BLOCK_INT: u8 = 2;
const BLOCK_SHORT_STRING: u8 = 3;
const BLOCK_STRING: u8 = 4;
const BLOCK_ARRAY: u8 = 5;
const BLOCK_FLOAT: u8 = 6;
const BLOCK_SIZE: usize = 13;
const SHORT_STRING_MAX: usize = 7;

/// Encoding and decoding of one record type.
pub trait RecordFormat: Send + Sync + 'static {
    /// Record type produced by this format.
    type Record: Record;

    /// Bytes per record.
    fn record_size(&self) -> usize;

    /// Record returned for ids beyond the high-water mark.
    fn absent(&self, id: u64) -> Self::Record;

    /// Decodes one record image.
    fn decode(&self, id: u64, bytes: &[u8]) -> Result<Self::Record>;

    /// Encodes `record` into `dst`, which must be exactly one record long.
    fn encode(&self, record: &Self::Record, dst: &mut [u8]) -> Result<()>;
}

/// Layout of node records.
#[derive(Clone, Copy, Debug, Default)]
pub struct NodeFormat;

/// Layout of relationship records.
#[derive(Clone, Copy, Debug, Default)]
pub struct RelationshipFormat;

/// Layout of property records.
#[derive(Clone, Copy, Debug, Default)]
pub struct PropertyFormat;

/// Layout of token records.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenFormat;

/// Layout of dynamic records; the block size depends on the store.
#[derive(Clone, Copy, Debug)]
pub struct DynamicFormat {
    data_size: usize,
}

impl DynamicFormat {
    const HEADER: usize = 12;

    /// Format used by `store`.
    pub const fn new(store: DynamicStore) -> Self {
        Self {
            data_size: store.data_size(),
        }
    }

    /// Payload capacity of one block.
    pub const fn data_size(&self) -> usize {
        self.data_size
    }
}

impl RecordFormat for NodeFormat {
    type Record = NodeRecord;

    fn record_size(&self) -> usize {
        31
    }

    fn absent(&self, id: u64) -> NodeRecord {
        NodeRecord::absent(id)
    }

    fn decode(&self, id: u64, bytes: &[u8]) -> Result<NodeRecord> {
        check_len(bytes, self.record_size())?;
        if !in_use_flag(bytes[0])? {
            return Ok(NodeRecord::absent(id));
        }
        let labels = match bytes[17] {
            LABELS_INLINE => {
                let count = bytes[18] as usize;
                if count > INLINE_LABEL_CAPACITY {
                    return Err(StoreError::Corruption("inline label count exceeds capacity"));
                }
                let labels: SmallVec<[u32; 3]> =
                    (0..count).map(|i| u32_at(bytes, 19 + i * 4)).collect();
                NodeLabels::Inline(labels)
            }
            LABELS_DYNAMIC => NodeLabels::Dynamic(u64_at(bytes, 18)),
            _ => return Err(StoreError::Corruption("unknown node label representation tag")),
        };
        Ok(NodeRecord {
            id,
            in_use: true,
            next_rel: u64_at(bytes, 1),
            next_prop: u64_at(bytes, 9),
            labels,
        })
    }

    fn encode(&self, record: &NodeRecord, dst: &mut [u8]) -> Result<()> {
        check_len(dst, self.record_size())?;
        dst.fill(0);
        if !record.in_use {
            return Ok(());
        }
        dst[0] = IN_USE;
        put_u64(dst, 1, record.next_rel);
        put_u64(dst, 9, record.next_prop);
        match &record.labels {
            NodeLabels::Inline(labels) => {
                if labels.len() > INLINE_LABEL_CAPACITY {
                    return Err(StoreError::Invalid("too many labels for inline node encoding"));
                }
                dst[17] = LABELS_INLINE;
                dst[18] = labels.len() as u8;
                for (i, label) in labels.iter().enumerate() {
                    put_u32(dst, 19 + i * 4, *label);
                }
            }
            NodeLabels::Dynamic(head) => {
                dst[17] = LABELS_DYNAMIC;
                put_u64(dst, 18, *head);
            }
        }
        Ok(())
    }
}

impl RecordFormat for RelationshipFormat {
    type Record = RelationshipRecord;

    fn record_size(&self) -> usize {
        61
    }

    fn absent(&self, id: u64) -> RelationshipRecord {
        RelationshipRecord::absent(id)
    }

    fn decode(&self, id: u64, bytes: &[u8]) -> Result<RelationshipRecord> {
        check_len(bytes, self.record_size())?;
        if !in_use_flag(bytes[0])? {
            return Ok(RelationshipRecord::absent(id));
        }
        Ok(RelationshipRecord {
            id,
            in_use: true,
            first_node: u64_at(bytes, 1),
            second_node: u64_at(bytes, 9),
            rel_type: u32_at(bytes, 17),
            first_prev: u64_at(bytes, 21),
            first_next: u64_at(bytes, 29),
            second_prev: u64_at(bytes, 37),
            second_next: u64_at(bytes, 45),
            next_prop: u64_at(bytes, 53),
        })
    }

    fn encode(&self, record: &RelationshipRecord, dst: &mut [u8]) -> Result<()> {
        check_len(dst, self.record_size())?;
        dst.fill(0);
        if !record.in_use {
            return Ok(());
        }
        dst[0] = IN_USE;
        put_u64(dst, 1, record.first_node);
        put_u64(dst, 9, record.second_node);
        put_u32(dst, 17, record.rel_type);
        put_u64(dst, 21, record.first_prev);
        put_u64(dst, 29, record.first_next);
        put_u64(dst, 37, record.second_prev);
        put_u64(dst, 45, record.second_next);
        put_u64(dst, 53, record.next_prop);
        Ok(())
    }
}

impl RecordFormat for PropertyFormat {
    type Record = PropertyRecord;

    fn record_size(&self) -> usize {
        18 + PropertyRecord::MAX_BLOCKS * BLOCK_SIZE
    }

    fn absent(&self, id: u64) -> PropertyRecord {
        PropertyRecord::absent(id)
    }

    fn decode(&self, id: u64, bytes: &[u8]) -> Result<PropertyRecord> {
        check_len(bytes, self.record_size())?;
        if !in_use_flag(bytes[0])? {
            return Ok(PropertyRecord::absent(id));
        }
        let count = bytes[17] as usize;
        if count > PropertyRecord::MAX_BLOCKS {
            return Err(StoreError::Corruption("property block count exceeds capacity"));
        }
        let mut blocks = SmallVec::new();
        for i in 0..count {
            let off = 18 + i * BLOCK_SIZE;
            blocks.push(decode_block(&bytes[off..off + BLOCK_SIZE])?);
        }
        Ok(PropertyRecord {
            id,
            in_use: true,
            prev: u64_at(bytes, 1),
            next: u64_at(bytes, 9),
            blocks,
        })
    }

    fn encode(&self, record: &PropertyRecord, dst: &mut [u8]) -> Result<()> {
        check_len(dst, self.record_size())?;
        dst.fill(0);
        if !record.in_use {
            return Ok(());
        }
        if record.blocks.len() > PropertyRecord::MAX_BLOCKS {
            return Err(StoreError::Invalid("too many property blocks for one record"));
        }
        dst[0] = IN_USE;
        put_u64(dst, 1, record.prev);
        put_u64(dst, 9, record.next);
        dst[17] = record.blocks.len() as u8;
        for (i, block) in record.blocks.iter().enumerate() {
            let off = 18 + i * BLOCK_SIZE;
            encode_block(block, &mut dst[off..off + BLOCK_SIZE])?;
        }
        Ok(())
    }
}

fn decode_block(bytes: &[u8]) -> Result<PropertyBlock> {
    let key = u32_at(bytes, 0);
    let payload = &bytes[5..13];
    let value = match bytes[4] {
        BLOCK_BOOL => match payload[0] {
            0 => PropertyValue::Bool(false),
            1 => PropertyValue::Bool(true),
            _ => return Err(StoreError::Corruption("boolean property payload out of range")),
        },
        BLOCK_INT => PropertyValue::Int(u64_at(payload, 0) as i64),
        BLOCK_FLOAT => PropertyValue::Float(f64::from_bits(u64_at(payload, 0))),
        BLOCK_SHORT_STRING => {
            let len = payload[0] as usize;
            if len > SHORT_STRING_MAX {
                return Err(StoreError::Corruption("short string length exceeds block"));
            }
            let text = std::str::from_utf8(&payload[1..1 + len])
                .map_err(|_| StoreError::Corruption("short string is not UTF-8"))?;
            PropertyValue::ShortString(text.to_owned())
        }
        BLOCK_STRING => PropertyValue::String(u64_at(payload, 0)),
        BLOCK_ARRAY => PropertyValue::Array(u64_at(payload, 0)),
        _ => return Err(StoreError::Corruption("unknown property block type")),
    };
    Ok(PropertyBlock { key, value })
}

fn encode_block(block: &PropertyBlock, dst: &mut [u8]) -> Result<()> {
    put_u32(dst, 0, block.key);
    let payload_off = 5;
    match &block.value {
        PropertyValue::Bool(value) => {
            dst[4] = BLOCK_BOOL;
            dst[payload_off] = u8::from(*value);
        }
        PropertyValue::Int(value) => {
            dst[4] = BLOCK_INT;
            put_u64(dst, payload_off, *value as u64);
        }
        PropertyValue::Float(value) => {
            dst[4] = BLOCK_FLOAT;
            put_u64(dst, payload_off, value.to_bits());
        }
        PropertyValue::ShortString(text) => {
            let bytes = text.as_bytes();
            if bytes.len() > SHORT_STRING_MAX {
                return Err(StoreError::Invalid("short string exceeds inline capacity"));
            }
            dst[4] = BLOCK_SHORT_STRING;
            dst[payload_off] = bytes.len() as u8;
            dst[payload_off + 1..payload_off + 1 + bytes.len()].copy_from_slice(bytes);
        }
        PropertyValue::String(head) => {
            dst[4] = BLOCK_STRING;
            put_u64(dst, payload_off, *head);
        }
        PropertyValue::Array(head) => {
            dst[4] = BLOCK_ARRAY;
            put_u64(dst, payload_off, *head);
        }
    }
    Ok(())
}

/// Longest string that fits inline in a property block.
pub const fn short_string_capacity() -> usize {
    SHORT_STRING_MAX
}

impl RecordFormat for TokenFormat {
    type Record = TokenRecord;

    fn record_size(&self) -> usize {
        9
    }

    fn absent(&self, id: u64) -> TokenRecord {
        TokenRecord::absent(id)
    }

    fn decode(&self, id: u64, bytes: &[u8]) -> Result<TokenRecord> {
        check_len(bytes, self.record_size())?;
        if !in_use_flag(bytes[0])? {
            return Ok(TokenRecord::absent(id));
        }
        Ok(TokenRecord::new(id, u64_at(bytes, 1)))
    }

    fn encode(&self, record: &TokenRecord, dst: &mut [u8]) -> Result<()> {
        check_len(dst, self.record_size())?;
        dst.fill(0);
        if record.in_use {
            dst[0] = IN_USE;
            put_u64(dst, 1, record.name_id);
        }
        Ok(())
    }
}

impl RecordFormat for DynamicFormat {
    type Record = DynamicRecord;

    fn record_size(&self) -> usize {
        Self::HEADER + self.data_size
    }

    fn absent(&self, id: u64) -> DynamicRecord {
        DynamicRecord::absent(id)
    }

    fn decode(&self, id: u64, bytes: &[u8]) -> Result<DynamicRecord> {
        check_len(bytes, self.record_size())?;
        if !in_use_flag(bytes[0])? {
            return Ok(DynamicRecord::absent(id));
        }
        let start = match bytes[1] {
            0 => false,
            1 => true,
            _ => return Err(StoreError::Corruption("dynamic record start flag out of range")),
        };
        let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        if length > self.data_size {
            return Err(StoreError::Corruption("dynamic record length exceeds block size"));
        }
        Ok(DynamicRecord {
            id,
            in_use: true,
            start,
            next: u64_at(bytes, 4),
            data: bytes[Self::HEADER..Self::HEADER + length].to_vec(),
        })
    }

    fn encode(&self, record: &DynamicRecord, dst: &mut [u8]) -> Result<()> {
        check_len(dst, self.record_size())?;
        dst.fill(0);
        if !record.in_use {
            return Ok(());
        }
        if record.data.len() > self.data_size {
            return Err(StoreError::Invalid("dynamic payload exceeds block size"));
        }
        dst[0] = IN_USE;
        dst[1] = u8::from(record.start);
        dst[2..4].copy_from_slice(&(record.data.len() as u16).to_be_bytes());
        put_u64(dst, 4, record.next);
        dst[Self::HEADER..Self::HEADER + record.data.len()].copy_from_slice(&record.data);
        Ok(())
    }
}

fn in_use_flag(byte: u8) -> Result<bool> {
    match byte {
        IN_USE => Ok(true),
        NOT_IN_USE => Ok(false),
        _ => Err(StoreError::Corruption("in-use flag out of range")),
    }
}

fn check_len(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() != expected {
        return Err(StoreError::Invalid("record buffer has wrong length"));
    }
    Ok(())
}

fn u64_at(bytes: &[u8], off: usize) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[off..off + 8]);
    u64::from_be_bytes(arr)
}

fn u32_at(bytes: &[u8], off: usize) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&bytes[off..off + 4]);
    u32::from_be_bytes(arr)
}

fn put_u64(dst: &mut [u8], off: usize, value: u64) {
    dst[off..off + 8].copy_from_slice(&value.to_be_bytes());
}

fn put_u32(dst: &mut [u8], off: usize, value: u32) {
    dst[off..off + 4].copy_from_slice(&value.to_be_bytes());
}
