//! Two-tier block-structured file: a run of leaf blocks using differential
//! key encoding, followed by one index block mapping each leaf's last key to
//! the byte offset of that leaf's end.

use std::sync::Arc;

use crate::block::{Block, BlockBuilder};
use crate::codec::{decode_u32, encode_u32};
use crate::comparator::Comparator;
use crate::config::EngineConfig;
use crate::diffkey::{decode_differential_key, encode_differential_key, DifferentialDecodingIter};
use crate::env::{SequentialFile, WritableFile};
use crate::error::{Result, StorageError};
use crate::utils::num::{u32_to_usize, u64_to_usize};

/// Accumulates leaf and index blocks, appending finished bytes to a
/// writable file as leaves rotate.
pub struct TableBuilder {
    leaf_builder: BlockBuilder,
    index_builder: BlockBuilder,
    leaf_bytes: Vec<u8>,
    leaf_pos: usize,
    leaf_number: usize,
    num_entries: usize,
    first_key: Option<Vec<u8>>,
    prev_key: Option<Vec<u8>>,
    file: Box<dyn WritableFile>,
    entries_per_full_key: usize,
    leaf_entries_per_index_entry: usize,
}

impl TableBuilder {
    pub fn new(file: Box<dyn WritableFile>, cfg: &EngineConfig) -> Self {
        TableBuilder {
            leaf_builder: BlockBuilder::new(usize::MAX),
            index_builder: BlockBuilder::new(usize::MAX),
            leaf_bytes: Vec::new(),
            leaf_pos: 0,
            leaf_number: 0,
            num_entries: 0,
            first_key: None,
            prev_key: None,
            file,
            entries_per_full_key: cfg.entries_per_full_key,
            leaf_entries_per_index_entry: cfg.leaf_entries_per_index_entry,
        }
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// Adds one entry. `key` must be `>=` the previous key added, under
    /// whatever comparator the caller will later read the table back with;
    /// the builder itself does not sort or verify ordering.
    pub fn add(&mut self, key: &[u8], val: &[u8]) {
        self.num_entries += 1;
        loop {
            if self.leaf_number < self.leaf_entries_per_index_entry {
                if self.first_key.is_none() {
                    self.first_key = Some(key.to_vec());
                }
                let residual = self.leaf_number % self.entries_per_full_key;
                let new_key = if residual != 0 {
                    encode_differential_key(self.prev_key.as_deref().unwrap_or(&[]), key)
                } else {
                    let mut nk = Vec::with_capacity(key.len() + 1);
                    nk.push(0);
                    nk.extend_from_slice(key);
                    nk
                };
                assert!(self.leaf_builder.add(&new_key, val), "leaf block builder exceeded its capacity");
                self.prev_key = Some(key.to_vec());
                self.leaf_number += 1;
                break;
            }
            self.rotate_leaf();
        }
    }

    fn rotate_leaf(&mut self) {
        let builder = std::mem::replace(&mut self.leaf_builder, BlockBuilder::new(usize::MAX));
        let block = builder.finalize();
        let bytes = block.into_bytes();
        self.leaf_pos += bytes.len();
        self.leaf_bytes.extend_from_slice(&bytes);
        let mut idx_val = Vec::new();
        encode_u32(&mut idx_val, self.leaf_pos as u32);
        let last_key = self.prev_key.clone().expect("leaf rotated with no entries added");
        self.index_builder.add(&last_key, &idx_val);
        self.leaf_number = 0;
    }

    /// Finalizes the trailing leaf and the index block, writes leaf bytes
    /// then the index block to the file, and returns a read-only `Table`.
    pub fn finalize(mut self, cmp: Arc<dyn Comparator>) -> Result<Table> {
        self.rotate_leaf();
        let index_block = self.index_builder.finalize();
        self.file.append(&self.leaf_bytes)?;
        self.file.append(index_block.as_bytes())?;
        self.file.flush()?;
        Ok(Table { index: index_block, leaf_data: self.leaf_bytes, comparator: cmp })
    }
}

/// A read-only, finalized table.
pub struct Table {
    index: Block,
    leaf_data: Vec<u8>,
    comparator: Arc<dyn Comparator>,
}

impl Table {
    /// Reads an entire file of known size into `buffer` and decodes it. The
    /// index block occupies the tail; leaf blocks occupy the prefix.
    pub fn recover(file: &mut dyn SequentialFile, file_size: u64, cmp: Arc<dyn Comparator>) -> Result<Table> {
        let size = u64_to_usize(file_size).ok_or_else(|| StorageError::corruption("table: file size overflows usize"))?;
        let mut buffer = vec![0u8; size];
        let used = file.read(&mut buffer)?;
        if used.len() != size {
            return Err(StorageError::corruption("table: short read recovering table file"));
        }
        let index = Block::decode(&buffer, size)?;
        Ok(Table { index, leaf_data: buffer, comparator: cmp })
    }

    pub fn iter(&self) -> TableIterator<'_> {
        TableIterator {
            table: self,
            index_iter_idx: crate::block::BlockCursor::start(),
            leaf_block: None,
            leaf_cursor: crate::block::BlockCursor::start(),
            leaf_prev_key: None,
            valid: false,
        }
    }
}

fn decode_leaf_offset(value: &[u8]) -> Result<usize> {
    let (off, _) = decode_u32(value).ok_or_else(|| StorageError::corruption("table: truncated index value"))?;
    Ok(u32_to_usize(off))
}

/// Composes an index-block iterator with a differential-decoding leaf
/// iterator. The leaf block is decoded fresh each time the index cursor
/// moves to a new entry.
pub struct TableIterator<'a> {
    table: &'a Table,
    index_iter_idx: crate::block::BlockCursor,
    leaf_block: Option<Block>,
    leaf_cursor: crate::block::BlockCursor,
    leaf_prev_key: Option<Vec<u8>>,
    valid: bool,
}

impl<'a> TableIterator<'a> {
    pub fn valid(&self) -> bool {
        self.valid
    }

    fn index_iter(&self) -> crate::block::BlockIterator<'a> {
        self.table.index.iter_at(self.index_iter_idx)
    }

    fn open_leaf_at(&mut self, offset: usize, seek: LeafSeek<'_>) -> Result<()> {
        let block = Block::decode(&self.table.leaf_data, offset)?;
        let mut it = DifferentialDecodingIter::new(block.iter());
        match seek {
            LeafSeek::First => it.seek_to_first(),
            // `seek_to_last` lands one past the last entry (invalid); step
            // back once to land on the last valid entry directly, so a
            // caller doing SeekToLast-then-read gets a value immediately.
            LeafSeek::Last => {
                it.seek_to_last();
                it.prev();
            }
            LeafSeek::Key(k) => it.seek(k, self.table.comparator.as_ref())?,
        }
        let ok = it.valid();
        let (cursor, prev_key) = it.into_parts();
        self.leaf_block = Some(block);
        self.leaf_cursor = cursor;
        self.leaf_prev_key = prev_key;
        self.valid = ok;
        Ok(())
    }

    fn with_leaf<R>(&mut self, f: impl FnOnce(&mut DifferentialDecodingIter) -> R) -> Option<R> {
        let block = self.leaf_block.as_ref()?;
        let base = block.iter_at(self.leaf_cursor);
        let mut it = DifferentialDecodingIter::from_parts(base, self.leaf_prev_key.take());
        let r = f(&mut it);
        let (cursor, prev_key) = it.into_parts();
        self.leaf_cursor = cursor;
        self.leaf_prev_key = prev_key;
        Some(r)
    }

    pub fn seek_to_first(&mut self) -> Result<()> {
        self.valid = false;
        let mut idx_it = self.index_iter();
        idx_it.seek_to_first();
        self.index_iter_idx = idx_it.cursor();
        if idx_it.valid() {
            let off = decode_leaf_offset(idx_it.value()?)?;
            self.open_leaf_at(off, LeafSeek::First)?;
        }
        Ok(())
    }

    pub fn seek_to_last(&mut self) -> Result<()> {
        self.valid = false;
        let mut idx_it = self.index_iter();
        idx_it.seek_to_last();
        idx_it.prev();
        self.index_iter_idx = idx_it.cursor();
        if idx_it.valid() {
            let off = decode_leaf_offset(idx_it.value()?)?;
            self.open_leaf_at(off, LeafSeek::Last)?;
        }
        Ok(())
    }

    pub fn seek(&mut self, key: &[u8]) -> Result<()> {
        self.valid = false;
        let mut idx_it = self.index_iter();
        idx_it.seek(key, self.table.comparator.as_ref())?;
        self.index_iter_idx = idx_it.cursor();
        if idx_it.valid() {
            let off = decode_leaf_offset(idx_it.value()?)?;
            self.open_leaf_at(off, LeafSeek::Key(key))?;
        }
        Ok(())
    }

    pub fn next(&mut self) -> Result<()> {
        if !self.valid {
            panic!("table iterator: Next called while invalid");
        }
        self.with_leaf(|it| it.next()).expect("leaf block missing while valid")?;
        let still_valid = self.leaf_block.as_ref().unwrap().iter_at(self.leaf_cursor).valid();
        if !still_valid {
            self.valid = false;
            let mut idx_it = self.index_iter();
            idx_it.next();
            self.index_iter_idx = idx_it.cursor();
            if idx_it.valid() {
                let off = decode_leaf_offset(idx_it.value()?)?;
                self.open_leaf_at(off, LeafSeek::First)?;
            }
        }
        Ok(())
    }

    pub fn prev(&mut self) -> Result<()> {
        if !self.valid {
            panic!("table iterator: Prev called while invalid");
        }
        self.with_leaf(|it| it.prev());
        let still_valid = self.leaf_block.as_ref().unwrap().iter_at(self.leaf_cursor).valid();
        if !still_valid {
            self.valid = false;
            let mut idx_it = self.index_iter();
            idx_it.prev();
            self.index_iter_idx = idx_it.cursor();
            if idx_it.valid() {
                let off = decode_leaf_offset(idx_it.value()?)?;
                self.open_leaf_at(off, LeafSeek::Last)?;
            }
        }
        Ok(())
    }

    pub fn key(&mut self) -> Result<Vec<u8>> {
        if !self.valid {
            return Err(StorageError::corruption("table iterator: Key called while invalid"));
        }
        self.with_leaf(|it| it.key()).expect("leaf block missing while valid")
    }

    pub fn value(&mut self) -> Result<Vec<u8>> {
        if !self.valid {
            return Err(StorageError::corruption("table iterator: Value called while invalid"));
        }
        self.with_leaf(|it| it.value().map(<[u8]>::to_vec)).expect("leaf block missing while valid")
    }
}

enum LeafSeek<'a> {
    First,
    Last,
    Key(&'a [u8]),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::LexicographicComparator;

    struct VecWritable(Vec<u8>);
    impl WritableFile for VecWritable {
        fn append(&mut self, data: &[u8]) -> Result<()> {
            self.0.extend_from_slice(data);
            Ok(())
        }
        fn size(&self) -> u64 {
            self.0.len() as u64
        }
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn build_table(keys: &[String]) -> Table {
        let cfg = EngineConfig::default();
        let builder = TableBuilder::new(Box::new(VecWritable(Vec::new())), &cfg);
        let mut builder = builder;
        for k in keys {
            builder.add(k.as_bytes(), k.as_bytes());
        }
        builder.finalize(Arc::new(LexicographicComparator)).unwrap()
    }

    #[test]
    fn iterates_forward_and_backward_over_256_keys() {
        let keys: Vec<String> = (10000..10256).map(|n| n.to_string()).collect();
        let table = build_table(&keys);
        let mut it = table.iter();
        it.seek_to_first().unwrap();
        let mut got = Vec::new();
        while it.valid() {
            got.push(String::from_utf8(it.key().unwrap()).unwrap());
            it.next().unwrap();
        }
        assert_eq!(got, keys);

        it.seek_to_last().unwrap();
        let mut got_rev = Vec::new();
        while it.valid() {
            got_rev.push(String::from_utf8(it.key().unwrap()).unwrap());
            it.prev().unwrap();
        }
        got_rev.reverse();
        assert_eq!(got_rev, keys);
    }

    #[test]
    fn seek_lands_on_least_key_geq() {
        let keys: Vec<String> = (10000..10010).map(|n| n.to_string()).collect();
        let table = build_table(&keys);
        let mut it = table.iter();
        it.seek(b"10005").unwrap();
        assert!(it.valid());
        assert_eq!(it.key().unwrap(), b"10005");
    }
}
