//! Differential key encoding for table leaf blocks, and the iterator that
//! decodes it transparently back into full keys.

use crate::block::{BlockCursor, BlockIterator};
use crate::comparator::Comparator;
use crate::error::{Result, StorageError};

const MAX_COMMON_PREFIX: u8 = 127;

/// Encodes one leading byte (the common prefix length with `prev`, clamped
/// to 127) followed by the non-prefix suffix of `cur`. A leading byte of 0
/// is a full-key anchor: the key is self-contained.
pub fn encode_differential_key(prev: &[u8], cur: &[u8]) -> Vec<u8> {
    let short = prev.len().min(cur.len());
    let mut common = short;
    for i in 0..short {
        if prev[i] != cur[i] {
            common = i;
            break;
        }
    }
    let common = common.min(MAX_COMMON_PREFIX as usize);
    let mut ret = Vec::with_capacity(cur.len() - common + 1);
    ret.push(common as u8);
    ret.extend_from_slice(&cur[common..]);
    ret
}

/// Reconstructs a full key of length `leadingByte + len(encoded) - 1`.
pub fn decode_differential_key(prev: &[u8], encoded: &[u8]) -> Result<Vec<u8>> {
    let &common = encoded
        .first()
        .ok_or_else(|| StorageError::corruption("differential key: empty encoded key"))?;
    let common = common as usize;
    if common > prev.len() {
        return Err(StorageError::corruption("differential key: common prefix exceeds previous key length"));
    }
    let mut ret = Vec::with_capacity(common + encoded.len() - 1);
    ret.extend_from_slice(&prev[..common]);
    ret.extend_from_slice(&encoded[1..]);
    Ok(ret)
}

/// Wraps a block iterator over differentially-encoded leaf entries and
/// reconstructs full keys on demand.
pub struct DifferentialDecodingIter<'a> {
    inner: BlockIterator<'a>,
    prev_key: Option<Vec<u8>>,
}

impl<'a> DifferentialDecodingIter<'a> {
    pub fn new(inner: BlockIterator<'a>) -> Self {
        DifferentialDecodingIter { inner, prev_key: None }
    }

    /// Resumes decoding over `inner` with a caller-supplied `prevKey` hint
    /// (e.g. restored from a previous call that parked its cursor).
    pub fn from_parts(inner: BlockIterator<'a>, prev_key: Option<Vec<u8>>) -> Self {
        DifferentialDecodingIter { inner, prev_key }
    }

    /// Parks this iterator's state so it can be resumed later via
    /// [`Block::iter_at`] + [`DifferentialDecodingIter::from_parts`] without
    /// holding a borrow of the underlying block across calls.
    pub fn into_parts(self) -> (BlockCursor, Option<Vec<u8>>) {
        (self.inner.cursor(), self.prev_key)
    }

    pub fn valid(&self) -> bool {
        self.inner.valid()
    }

    pub fn seek_to_first(&mut self) {
        self.inner.seek_to_first();
        self.prev_key = None;
    }

    pub fn seek_to_last(&mut self) {
        self.inner.seek_to_last();
        self.prev_key = None;
    }

    pub fn seek(&mut self, key: &[u8], cmp: &dyn Comparator) -> Result<()> {
        self.inner.seek(key, cmp)?;
        self.prev_key = None;
        Ok(())
    }

    /// Advances to the next entry. Captures the just-read full key as the
    /// `prevKey` hint for the new current entry before moving the cursor.
    pub fn next(&mut self) -> Result<()> {
        let k = self.key()?;
        self.prev_key = Some(k);
        self.inner.next();
        Ok(())
    }

    pub fn prev(&mut self) {
        self.inner.prev();
        self.prev_key = None;
    }

    pub fn value(&self) -> Result<&'a [u8]> {
        self.inner.value()
    }

    /// Reconstructs the full key at the current position.
    pub fn key(&mut self) -> Result<Vec<u8>> {
        if let Some(pk) = &self.prev_key {
            return decode_differential_key(pk, self.inner.key()?);
        }
        // Walk backward through the underlying block iterator, counting
        // steps, until a full-key anchor (leading byte 0) is found.
        let mut steps = 0usize;
        let anchor: Vec<u8> = loop {
            let encoded = self.inner.key()?;
            if encoded.first() == Some(&0) {
                break encoded[1..].to_vec();
            }
            steps += 1;
            self.inner.prev();
            if !self.inner.valid() {
                return Err(StorageError::corruption(
                    "differential key: reached the beginning before a full-key anchor",
                ));
            }
        };
        // Re-decode forward step by step to reconstruct the original key,
        // then restore the underlying iterator to its original position.
        let mut full = anchor;
        for _ in 0..steps {
            self.inner.next();
            full = decode_differential_key(&full, self.inner.key()?)?;
        }
        Ok(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_arbitrary_pairs() {
        let cases: &[(&[u8], &[u8])] = &[
            (b"", b""),
            (b"abc", b"abd"),
            (b"hello", b"help"),
            (b"", b"x"),
            (b"samekey", b"samekey"),
            (b"short", b"alongerkeythatdiffersimmediately"),
        ];
        for (p, c) in cases {
            let encoded = encode_differential_key(p, c);
            let decoded = decode_differential_key(p, &encoded).unwrap();
            assert_eq!(&decoded, c);
        }
    }

    #[test]
    fn leading_byte_is_clamped_common_prefix() {
        let prev = vec![b'a'; 200];
        let mut cur = prev.clone();
        cur.push(b'z');
        let encoded = encode_differential_key(&prev, &cur);
        assert_eq!(encoded[0], 127);
    }

    #[test]
    fn full_key_anchor_has_zero_leading_byte() {
        let encoded = encode_differential_key(b"", b"100");
        assert_eq!(encoded[0], 0);
        assert_eq!(&encoded[1..], b"100");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn round_trip_any_byte_pair(
            prev in proptest::collection::vec(any::<u8>(), 0..64),
            cur in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let encoded = encode_differential_key(&prev, &cur);
            let decoded = decode_differential_key(&prev, &encoded).unwrap();
            prop_assert_eq!(decoded, cur);
        }
    }
}
