//! Self-describing, sorted immutable block format with binary search via a
//! restart-offset array.
//!
//! Layout: concatenated entries (varint keyLen, varint valLen, key, value),
//! zero-padded up to an 8-byte boundary, a restart array (one `u32` offset
//! per entry), and a 12-byte footer (`blockSize`, `numKeys`, `restartOffset`,
//! each `u32`).

use crate::codec::{decode_u32, decode_varint, encode_u32};
use crate::comparator::{assert_valid_ordering, Comparator};
use crate::error::{Result, StorageError};
use crate::utils::num::u32_to_usize;

const FOOTER_SIZE: usize = 12;

/// Accumulates entries for one block. Entries must be added in the order the
/// caller intends to be iterated; no sort is performed.
pub struct BlockBuilder {
    buf: Vec<u8>,
    offsets: Vec<u32>,
    max_size: usize,
}

impl BlockBuilder {
    pub fn new(max_size: usize) -> Self {
        BlockBuilder { buf: Vec::new(), offsets: Vec::new(), max_size }
    }

    pub fn num_entries(&self) -> usize {
        self.offsets.len()
    }

    pub fn current_size(&self) -> usize {
        self.buf.len()
    }

    /// Appends `varint(keyLen), varint(valLen), key, val`. Returns `false`
    /// (and leaves the builder unmodified) if the destination cannot
    /// accommodate the append within `max_size`.
    pub fn add(&mut self, key: &[u8], val: &[u8]) -> bool {
        let start = self.buf.len();
        let mut entry = Vec::with_capacity(key.len() + val.len() + 10);
        crate::codec::encode_varint(&mut entry, key.len() as u64);
        crate::codec::encode_varint(&mut entry, val.len() as u64);
        entry.extend_from_slice(key);
        entry.extend_from_slice(val);
        if start + entry.len() > self.max_size {
            return false;
        }
        self.offsets.push(start as u32);
        self.buf.extend_from_slice(&entry);
        true
    }

    /// Pads to an 8-byte boundary, writes the restart array and footer, and
    /// returns a `Block` view over exactly the written region.
    pub fn finalize(mut self) -> Block {
        let pad = (8 - (self.buf.len() % 8)) % 8;
        self.buf.extend(std::iter::repeat_n(0u8, pad));
        let restart_offset = self.buf.len() as u32;
        for &off in &self.offsets {
            encode_u32(&mut self.buf, off);
        }
        let num_keys = self.offsets.len() as u32;
        let block_size = self.buf.len() as u32 + FOOTER_SIZE as u32;
        encode_u32(&mut self.buf, block_size);
        encode_u32(&mut self.buf, num_keys);
        encode_u32(&mut self.buf, restart_offset);
        Block {
            data: self.buf,
            restart_offset: restart_offset as usize,
            num_keys: num_keys as usize,
        }
    }
}

/// Read-only view over a block's backing bytes.
#[derive(Debug, Clone)]
pub struct Block {
    data: Vec<u8>,
    restart_offset: usize,
    num_keys: usize,
}

impl Block {
    pub fn num_keys(&self) -> usize {
        self.num_keys
    }

    pub fn block_size(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Reads the footer at `end_offset - FOOTER_SIZE` in `data`, then copies
    /// out the block spanning `[end_offset - blockSize, end_offset)`.
    pub fn decode(data: &[u8], end_offset: usize) -> Result<Block> {
        if end_offset < FOOTER_SIZE || end_offset > data.len() {
            return Err(StorageError::corruption("block: end offset out of range"));
        }
        let footer = &data[end_offset - FOOTER_SIZE..end_offset];
        let (block_size, rest) =
            decode_u32(footer).ok_or_else(|| StorageError::corruption("block: truncated footer"))?;
        let (num_keys, rest) =
            decode_u32(rest).ok_or_else(|| StorageError::corruption("block: truncated footer"))?;
        let (restart_offset, _) =
            decode_u32(rest).ok_or_else(|| StorageError::corruption("block: truncated footer"))?;
        let block_size = u32_to_usize(block_size);
        let restart_offset = u32_to_usize(restart_offset);
        let num_keys = u32_to_usize(num_keys);
        if restart_offset + 4 * num_keys + FOOTER_SIZE != block_size {
            return Err(StorageError::corruption("block: footer fields inconsistent"));
        }
        if block_size > end_offset {
            return Err(StorageError::corruption("block: block_size exceeds end_offset"));
        }
        let start = end_offset - block_size;
        Ok(Block { data: data[start..end_offset].to_vec(), restart_offset, num_keys })
    }

    fn restart_entry_offset(&self, idx: usize) -> Result<usize> {
        let pos = self.restart_offset + 4 * idx;
        let (off, _) = decode_u32(&self.data[pos..])
            .ok_or_else(|| StorageError::corruption("block: truncated restart entry"))?;
        Ok(u32_to_usize(off))
    }

    fn parse_entry(&self, offset: usize) -> Result<(&[u8], &[u8])> {
        let data = self.data.get(offset..).ok_or_else(|| StorageError::corruption("block: entry offset out of range"))?;
        let (key_len, rest) = decode_varint(data)?;
        let key_len = crate::utils::num::u64_to_usize(key_len)
            .ok_or_else(|| StorageError::corruption("block: key length overflows usize"))?;
        let (val_len, rest) = decode_varint(rest)?;
        let val_len = crate::utils::num::u64_to_usize(val_len)
            .ok_or_else(|| StorageError::corruption("block: value length overflows usize"))?;
        if rest.len() < key_len + val_len {
            return Err(StorageError::corruption("block: truncated entry payload"));
        }
        let (key, rest) = rest.split_at(key_len);
        let (val, _) = rest.split_at(val_len);
        Ok((key, val))
    }

    pub fn iter(&self) -> BlockIterator<'_> {
        BlockIterator { block: self, idx: -1 }
    }

    /// Resumes iteration from a previously captured, lifetime-free cursor.
    /// Lets a composing iterator (the table iterator) park cursor state
    /// between calls without holding a borrow of this block across them.
    pub fn iter_at(&self, cursor: BlockCursor) -> BlockIterator<'_> {
        BlockIterator { block: self, idx: cursor.0 }
    }
}

/// Opaque, `Copy`able snapshot of a [`BlockIterator`]'s position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCursor(i64);

impl BlockCursor {
    pub fn start() -> Self {
        BlockCursor(-1)
    }
}

/// Iterator over a block. Initially invalid (`idx == -1`), matching the
/// reference: `SeekToFirst` lands on the first entry directly, while
/// `SeekToLast` lands one past the last entry and requires a `Prev` to reach
/// valid data — the two are not symmetric in where they land, only in the
/// read-then-advance (forward) vs advance-then-read (reverse) usage pattern.
pub struct BlockIterator<'a> {
    block: &'a Block,
    idx: i64,
}

impl<'a> BlockIterator<'a> {
    pub fn cursor(&self) -> BlockCursor {
        BlockCursor(self.idx)
    }

    pub fn valid(&self) -> bool {
        self.idx >= 0 && (self.idx as usize) < self.block.num_keys
    }

    pub fn seek_to_first(&mut self) {
        self.idx = 0;
    }

    pub fn seek_to_last(&mut self) {
        self.idx = self.block.num_keys as i64;
    }

    pub fn next(&mut self) {
        self.idx += 1;
    }

    pub fn prev(&mut self) {
        self.idx -= 1;
    }

    /// Binary searches the restart array for the least index whose entry key
    /// is `>= key` under `cmp`. Leaves the iterator invalid (`idx == numKeys`)
    /// if none exists.
    pub fn seek(&mut self, key: &[u8], cmp: &dyn Comparator) -> Result<()> {
        let n = self.block.num_keys;
        let mut lo = 0usize;
        let mut hi = n;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let off = self.block.restart_entry_offset(mid)?;
            let (mid_key, _) = self.block.parse_entry(off)?;
            match assert_valid_ordering(cmp.compare(mid_key, key)) {
                std::cmp::Ordering::Less => lo = mid + 1,
                _ => hi = mid,
            }
        }
        self.idx = lo as i64;
        Ok(())
    }

    fn current_offset(&self) -> Result<usize> {
        if !self.valid() {
            return Err(StorageError::corruption("block iterator: invalid"));
        }
        self.block.restart_entry_offset(self.idx as usize)
    }

    pub fn key(&self) -> Result<&'a [u8]> {
        let off = self.current_offset()?;
        Ok(self.block.parse_entry(off)?.0)
    }

    pub fn value(&self) -> Result<&'a [u8]> {
        let off = self.current_offset()?;
        Ok(self.block.parse_entry(off)?.1)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::comparator::LexicographicComparator;
    use proptest::prelude::*;

    fn sorted_unique_keys() -> impl Strategy<Value = Vec<Vec<u8>>> {
        proptest::collection::btree_set(proptest::collection::vec(any::<u8>(), 0..16), 0..32)
            .prop_map(|set| set.into_iter().collect())
    }

    proptest! {
        #[test]
        fn round_trip_preserves_arbitrary_sorted_keys(keys in sorted_unique_keys()) {
            let mut b = BlockBuilder::new(1 << 20);
            for k in &keys {
                prop_assert!(b.add(k, k));
            }
            let block = b.finalize();
            let mut it = block.iter();
            it.seek_to_first();
            let mut got = Vec::new();
            while it.valid() {
                got.push(it.key().unwrap().to_vec());
                it.next();
            }
            prop_assert_eq!(got, keys);
        }

        #[test]
        fn seek_lands_on_least_key_geq_target(keys in sorted_unique_keys(), target in proptest::collection::vec(any::<u8>(), 0..16)) {
            let mut b = BlockBuilder::new(1 << 20);
            for k in &keys {
                prop_assert!(b.add(k, k));
            }
            let block = b.finalize();
            let cmp = LexicographicComparator;
            let mut it = block.iter();
            it.seek(&target, &cmp).unwrap();
            let expected = keys.iter().find(|k| k.as_slice() >= target.as_slice());
            match expected {
                Some(exp) => prop_assert_eq!(it.key().unwrap(), exp.as_slice()),
                None => prop_assert!(!it.valid()),
            }
        }
    }
}
