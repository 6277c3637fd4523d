//! Probabilistic multi-level ordered in-memory index (skiplist), backed by
//! a chunked node arena, supporting bidirectional iteration.
//!
//! Grounded on `original_source/skiplist.go` + `skiplist_node.go`. The node
//! duality (leaf vs pointer) and the `trace`/`traceBackward`/`locateLast`
//! state machines are ported as closely as safe Rust allows; see
//! [`node`] for how pointer-chasing is replaced by arena handles.

#[path = "node.rs"]
mod node;
#[path = "random.rs"]
mod random;

pub use node::NodeHandle;
pub use random::RandomGenerator;

use std::sync::Arc;

use crate::comparator::Comparator;
use node::NodeArena;

/// Outcome of a [`Skiplist::put`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    AlreadyPresent { existing_value: Vec<u8> },
}

/// An ordered in-memory map over byte-string keys, implemented as a
/// skiplist. Single-writer; readers may run concurrently with one writer
/// because forward-pointer publication uses a release-store (see
/// [`node::NodeArena::set_next`]).
pub struct Skiplist {
    levels: Vec<Option<NodeHandle>>,
    arena: NodeArena,
    gen: RandomGenerator,
    comparator: Arc<dyn Comparator>,
    num_nodes: usize,
}

impl Skiplist {
    pub fn new(comparator: Arc<dyn Comparator>, ladder: [usize; 6], pool_chunk_bytes: usize) -> Self {
        Skiplist {
            levels: vec![None; ladder.len() + 1],
            arena: NodeArena::new(pool_chunk_bytes),
            gen: RandomGenerator::new(ladder),
            comparator,
            num_nodes: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.num_nodes
    }

    pub fn is_empty(&self) -> bool {
        self.num_nodes == 0
    }

    pub fn chunks_allocated(&self) -> usize {
        self.arena.chunks_allocated()
    }

    fn cmp(&self, a: NodeHandle, key: &[u8]) -> i32 {
        let result = self.comparator.compare(self.arena.key(a), key);
        crate::comparator::assert_valid_ordering(result);
        result
    }

    /// Descends from the top level, recording per level the rightmost node
    /// with key < `key` (or, on an exact match, that node itself). Returns
    /// the per-level trace and whether an exact match was seen.
    fn trace(&self, key: &[u8]) -> (Vec<Option<NodeHandle>>, bool) {
        let num_levels = self.levels.len();
        let mut ret: Vec<Option<NodeHandle>> = vec![None; num_levels];
        let mut found = false;
        let mut prev: Option<NodeHandle> = None;
        let mut i = num_levels as i64 - 1;
        let mut cur = self.levels[i as usize];

        while i >= 0 {
            let c = match cur {
                None => {
                    i -= 1;
                    if i >= 0 {
                        cur = self.levels[i as usize];
                    }
                    continue;
                }
                Some(c) => c,
            };
            match self.cmp(c, key) {
                -1 => {
                    prev = Some(c);
                    cur = self.arena.next(c);
                    if cur.is_none() {
                        ret[i as usize] = prev;
                        i -= 1;
                        cur = prev.and_then(|p| self.arena.child(p));
                        prev = None;
                    }
                }
                0 => {
                    found = true;
                    ret[i as usize] = Some(c);
                    i -= 1;
                    cur = self.arena.child(c);
                    prev = None;
                }
                1 => {
                    ret[i as usize] = prev;
                    i -= 1;
                    if prev.is_some() {
                        cur = prev.and_then(|p| self.arena.child(p));
                        prev = None;
                    } else if i >= 0 {
                        cur = self.levels[i as usize];
                    }
                }
                other => unreachable!("comparator ordering out of range: {other}"),
            }
        }
        (ret, found)
    }

    /// Same descent as `trace`, but an exact match is treated like an
    /// overshoot rather than a hit — used to locate the predecessor of a
    /// key for reverse iteration.
    fn trace_backward(&self, key: &[u8]) -> Vec<Option<NodeHandle>> {
        let num_levels = self.levels.len();
        let mut ret: Vec<Option<NodeHandle>> = vec![None; num_levels];
        let mut prev: Option<NodeHandle> = None;
        let mut i = num_levels as i64 - 1;
        let mut cur = self.levels[i as usize];

        while i >= 0 {
            let c = match cur {
                None => {
                    i -= 1;
                    if i >= 0 {
                        cur = self.levels[i as usize];
                    }
                    continue;
                }
                Some(c) => c,
            };
            match self.cmp(c, key) {
                -1 => {
                    prev = Some(c);
                    cur = self.arena.next(c);
                    if cur.is_none() {
                        ret[i as usize] = prev;
                        i -= 1;
                        cur = prev.and_then(|p| self.arena.child(p));
                        prev = None;
                    }
                }
                0 | 1 => {
                    ret[i as usize] = prev;
                    i -= 1;
                    if prev.is_some() {
                        cur = prev.and_then(|p| self.arena.child(p));
                        prev = None;
                    } else if i >= 0 {
                        cur = self.levels[i as usize];
                    }
                }
                other => unreachable!("comparator ordering out of range: {other}"),
            }
        }
        ret
    }

    /// Descends the rightmost tails of every level to find the last
    /// (greatest-key) leaf node, if any.
    fn locate_last(&self) -> Option<NodeHandle> {
        let num_levels = self.levels.len();
        let mut ret: Vec<Option<NodeHandle>> = vec![None; num_levels];
        let mut prev: Option<NodeHandle> = None;
        let mut i = num_levels as i64 - 1;
        let mut cur = self.levels[i as usize];

        while i >= 0 {
            let c = match cur {
                None => {
                    i -= 1;
                    if i >= 0 {
                        cur = self.levels[i as usize];
                    }
                    continue;
                }
                Some(c) => c,
            };
            match self.arena.next(c) {
                Some(next) => {
                    prev = Some(c);
                    cur = Some(next);
                }
                None => {
                    ret[i as usize] = Some(c);
                    i -= 1;
                    if prev.is_some() {
                        cur = prev.and_then(|p| self.arena.child(p));
                        prev = None;
                    } else if i >= 0 {
                        cur = self.levels[i as usize];
                    }
                }
            }
        }
        ret[0]
    }

    /// Inserts `key`/`val`. If `key` is already present, the existing entry
    /// is left untouched and its current value is returned.
    pub fn put(&mut self, key: &[u8], val: &[u8]) -> PutOutcome {
        let (prev_list, found) = self.trace(key);
        if found {
            let leaf = prev_list[0].expect("trace reported a match with no level-0 node");
            return PutOutcome::AlreadyPresent { existing_value: self.arena.value(leaf).to_vec() };
        }

        let height = self.gen.next_height() + 1;
        let mut child: Option<NodeHandle> = None;
        for i in 0..height {
            let new_node = if i == 0 {
                self.arena.alloc_leaf(key.to_vec(), val.to_vec())
            } else {
                let c = child.expect("a pointer node above level 0 always has a child by construction");
                self.arena.alloc_pointer(key.to_vec(), c)
            };

            match prev_list[i] {
                Some(p) => {
                    self.arena.set_next(new_node, self.arena.next(p));
                    self.arena.set_next(p, Some(new_node));
                }
                None => {
                    self.arena.set_next(new_node, self.levels[i]);
                    self.levels[i] = Some(new_node);
                }
            }
            child = Some(new_node);
        }

        self.num_nodes += 1;
        PutOutcome::Inserted
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let (prev_list, found) = self.trace(key);
        if found {
            let leaf = prev_list[0].expect("trace reported a match with no level-0 node");
            Some(self.arena.value(leaf))
        } else {
            None
        }
    }

    pub fn iter(&self) -> SkiplistIter<'_> {
        SkiplistIter { list: self, cur: None }
    }
}

/// Bidirectional cursor over a [`Skiplist`]'s level-0 chain.
pub struct SkiplistIter<'a> {
    list: &'a Skiplist,
    cur: Option<NodeHandle>,
}

impl<'a> SkiplistIter<'a> {
    pub fn valid(&self) -> bool {
        self.cur.is_some()
    }

    pub fn seek_to_first(&mut self) {
        self.cur = self.list.levels[0];
    }

    pub fn seek_to_last(&mut self) {
        self.cur = self.list.locate_last();
    }

    /// Seeks to the least key >= `key`. If there is no predecessor at
    /// level 0 and `key` does not exactly match the first node, the
    /// cursor is left unchanged — this mirrors the reference
    /// implementation's behavior exactly (not one of the hardening fixes
    /// this crate applies elsewhere).
    pub fn seek(&mut self, key: &[u8]) {
        let (traces, matched) = self.list.trace(key);
        if matched {
            self.cur = traces[0];
        } else if let Some(pred) = traces[0] {
            self.cur = self.list.arena.next(pred);
        }
    }

    pub fn next(&mut self) {
        let c = self.cur.expect("next() called on an invalid iterator");
        self.cur = self.list.arena.next(c);
    }

    pub fn prev(&mut self) {
        let c = self.cur.expect("prev() called on an invalid iterator");
        let key = self.list.arena.key(c).to_vec();
        self.cur = self.list.trace_backward(&key)[0];
    }

    pub fn key(&self) -> &'a [u8] {
        let c = self.cur.expect("key() called on an invalid iterator");
        self.list.arena.key(c)
    }

    pub fn value(&self) -> &'a [u8] {
        let c = self.cur.expect("value() called on an invalid iterator");
        self.list.arena.value(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::LexicographicComparator;

    fn new_list() -> Skiplist {
        Skiplist::new(Arc::new(LexicographicComparator), [8, 64, 512, 4096, 32768, 262144], 1024 * 1024)
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut list = new_list();
        for (k, v) in [("hello", "1"), ("world", "2"), ("go", "3"), ("language", "4")] {
            assert_eq!(list.put(k.as_bytes(), v.as_bytes()), PutOutcome::Inserted);
        }
        assert_eq!(list.get(b"hello"), Some(b"1".as_slice()));
        assert_eq!(list.get(b"world"), Some(b"2".as_slice()));
        assert_eq!(list.get(b"go"), Some(b"3".as_slice()));
        assert_eq!(list.get(b"language"), Some(b"4".as_slice()));
        assert_eq!(list.get(b"missing"), None);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn re_put_preserves_old_value_and_signals_collision() {
        let mut list = new_list();
        assert_eq!(list.put(b"key", b"first"), PutOutcome::Inserted);
        let outcome = list.put(b"key", b"second");
        assert_eq!(outcome, PutOutcome::AlreadyPresent { existing_value: b"first".to_vec() });
        assert_eq!(list.get(b"key"), Some(b"first".as_slice()));
    }

    #[test]
    fn iterates_forward_in_comparator_order() {
        let mut list = new_list();
        for k in ["hello", "world", "go", "language"] {
            list.put(k.as_bytes(), k.as_bytes());
        }
        let mut expected = vec!["go", "hello", "language", "world"];
        expected.sort();
        let mut it = list.iter();
        it.seek_to_first();
        let mut got = Vec::new();
        while it.valid() {
            got.push(String::from_utf8(it.key().to_vec()).unwrap());
            it.next();
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn iterates_backward_in_comparator_order() {
        let mut list = new_list();
        for k in ["hello", "world", "go", "language"] {
            list.put(k.as_bytes(), k.as_bytes());
        }
        let mut expected = vec!["go", "hello", "language", "world"];
        expected.sort();
        expected.reverse();
        let mut it = list.iter();
        it.seek_to_last();
        let mut got = Vec::new();
        while it.valid() {
            got.push(String::from_utf8(it.key().to_vec()).unwrap());
            it.prev();
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn seek_lands_on_least_key_geq() {
        let mut list = new_list();
        for k in ["100", "102", "104", "106"] {
            list.put(k.as_bytes(), k.as_bytes());
        }
        let mut it = list.iter();
        it.seek(b"103");
        assert!(it.valid());
        assert_eq!(it.key(), b"104");
    }

    #[test]
    fn many_keys_build_a_tall_tower_eventually() {
        // Exercises node-arena chunk rotation with a small pool and enough
        // entries to make several distinct tower heights likely.
        let mut list: Skiplist =
            Skiplist::new(Arc::new(LexicographicComparator), [8, 64, 512, 4096, 32768, 262144], 2048);
        for i in 0..2000u32 {
            list.put(&i.to_be_bytes(), &i.to_be_bytes());
        }
        assert_eq!(list.len(), 2000);
        assert!(list.chunks_allocated() > 1);
        for i in (0..2000u32).step_by(97) {
            assert_eq!(list.get(&i.to_be_bytes()), Some(i.to_be_bytes().as_slice()));
        }
    }
}
