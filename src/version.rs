//! Version set / manifest: a persisted, incrementally-edited directory of
//! files organized into levels, with reference-counted file entries and
//! atomic manifest rotation.
//!
//! Grounded on `original_source/version.go`. Three of this module's
//! behaviors deliberately diverge from that source, each a hardening named
//! as an open question: [`Version::apply_edit`]'s level removal removes
//! exactly the matched file (not one element too many), level insertion
//! auto-extends `levels` instead of indexing out of bounds, and the
//! version log append/read path goes through the chunked WAL framer on
//! both ends (the reference writes the manifest log with a raw
//! `WritableFile.Append`, which its own `Reader` — expecting chunk framing
//! — could never actually parse back).
//!
//! The cyclic `base`/`current` version list described in the reference is
//! realized here as an arena (`Vec<VersionSlot>`) indexed by a stable
//! `usize`, with `base` fixed at index 0, rather than raw `next`/`prev`
//! pointers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::{decode_slice, decode_u32, decode_u64, encode_slice, encode_u32, encode_u64};
use crate::comparator::{assert_valid_ordering, Comparator};
use crate::config::EngineConfig;
use crate::env::Env;
use crate::error::{Result, StorageError};
use crate::wal::{WalReader, WalWriter, WalRead};

/// Metadata for one on-disk file tracked by a [`VersionSet`]. A file with
/// both `min_key` and `max_key` empty is a log file; otherwise it is a
/// table file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u32,
    pub ref_count: u32,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
}

impl FileInfo {
    pub fn is_log_file(&self) -> bool {
        self.min_key.is_empty() && self.max_key.is_empty()
    }

    /// `u32 size`, length-prefixed `minKey`, length-prefixed `maxKey`.
    /// Refcount is never persisted.
    fn encode_to(&self, buf: &mut Vec<u8>) {
        encode_u32(buf, self.size);
        encode_slice(buf, &self.min_key);
        encode_slice(buf, &self.max_key);
    }

    fn decode_from(data: &[u8]) -> Result<(FileInfo, &[u8])> {
        let (size, rest) = decode_u32(data).ok_or_else(|| StorageError::corruption("FileInfo: truncated size"))?;
        let (min_key, rest) = decode_slice(rest)?;
        let (max_key, rest) = decode_slice(rest)?;
        Ok((FileInfo { size, ref_count: 0, min_key: min_key.to_vec(), max_key: max_key.to_vec() }, rest))
    }
}

/// A file's move between levels. `-1` encodes "no level" (add-from-nowhere
/// or drop-to-nowhere).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionLevelChange {
    pub file_number: u64,
    pub origin_level: i32,
    pub new_level: i32,
}

impl VersionLevelChange {
    pub fn move_level(file_number: u64, origin_level: i32, new_level: i32) -> Self {
        VersionLevelChange { file_number, origin_level, new_level }
    }

    pub fn add_level(file_number: u64, level: i32) -> Self {
        VersionLevelChange { file_number, origin_level: -1, new_level: level }
    }

    pub fn remove_level(file_number: u64, level: i32) -> Self {
        VersionLevelChange { file_number, origin_level: level, new_level: -1 }
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        encode_u64(buf, self.file_number);
        encode_u32(buf, self.origin_level as u32);
        encode_u32(buf, self.new_level as u32);
    }

    fn decode_from(data: &[u8]) -> Result<(VersionLevelChange, &[u8])> {
        let (file_number, rest) =
            decode_u64(data).ok_or_else(|| StorageError::corruption("VersionLevelChange: truncated file#"))?;
        let (origin_level, rest) =
            decode_u32(rest).ok_or_else(|| StorageError::corruption("VersionLevelChange: truncated origin level"))?;
        let (new_level, rest) =
            decode_u32(rest).ok_or_else(|| StorageError::corruption("VersionLevelChange: truncated new level"))?;
        Ok((
            VersionLevelChange { file_number, origin_level: origin_level as i32, new_level: new_level as i32 },
            rest,
        ))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct VersionFileAdd {
    file_number: u64,
    info: FileInfo,
}

/// A differential mutation of a [`Version`], persisted to the version log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionEdit {
    adds: Vec<VersionFileAdd>,
    removes: Vec<u64>,
    level_changes: Vec<VersionLevelChange>,
    pub last_sequence: u64,
    pub next_file_number: u64,
}

impl VersionEdit {
    pub fn new() -> Self {
        VersionEdit::default()
    }

    pub fn add_file(&mut self, file_number: u64, info: FileInfo) {
        self.adds.push(VersionFileAdd { file_number, info });
    }

    pub fn remove_file(&mut self, file_number: u64) {
        self.removes.push(file_number);
    }

    pub fn add_level_change(&mut self, change: VersionLevelChange) {
        self.level_changes.push(change);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        encode_u32(&mut buf, self.adds.len() as u32);
        for add in &self.adds {
            encode_u64(&mut buf, add.file_number);
            add.info.encode_to(&mut buf);
        }
        encode_u32(&mut buf, self.removes.len() as u32);
        for &fh in &self.removes {
            encode_u64(&mut buf, fh);
        }
        encode_u32(&mut buf, self.level_changes.len() as u32);
        for change in &self.level_changes {
            change.encode_to(&mut buf);
        }
        encode_u64(&mut buf, self.last_sequence);
        encode_u64(&mut buf, self.next_file_number);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<VersionEdit> {
        let mut edit = VersionEdit::default();

        let (num_adds, mut rest) =
            decode_u32(data).ok_or_else(|| StorageError::corruption("VersionEdit: truncated add count"))?;
        for _ in 0..num_adds {
            let (file_number, r) =
                decode_u64(rest).ok_or_else(|| StorageError::corruption("VersionEdit: truncated add file#"))?;
            let (info, r) = FileInfo::decode_from(r)?;
            edit.adds.push(VersionFileAdd { file_number, info });
            rest = r;
        }

        let (num_removes, mut rest) =
            decode_u32(rest).ok_or_else(|| StorageError::corruption("VersionEdit: truncated remove count"))?;
        for _ in 0..num_removes {
            let (fh, r) =
                decode_u64(rest).ok_or_else(|| StorageError::corruption("VersionEdit: truncated remove file#"))?;
            edit.removes.push(fh);
            rest = r;
        }

        let (num_changes, mut rest) =
            decode_u32(rest).ok_or_else(|| StorageError::corruption("VersionEdit: truncated change count"))?;
        for _ in 0..num_changes {
            let (change, r) = VersionLevelChange::decode_from(rest)?;
            edit.level_changes.push(change);
            rest = r;
        }

        let (last_sequence, rest) =
            decode_u64(rest).ok_or_else(|| StorageError::corruption("VersionEdit: truncated last sequence"))?;
        let (next_file_number, _rest) =
            decode_u64(rest).ok_or_else(|| StorageError::corruption("VersionEdit: truncated next file number"))?;
        edit.last_sequence = last_sequence;
        edit.next_file_number = next_file_number;

        Ok(edit)
    }
}

/// A snapshot of the engine's file directory at a point in time.
#[derive(Clone, Debug, Default)]
pub struct Version {
    pub last_sequence: u64,
    pub log_files: Vec<u64>,
    pub levels: Vec<Vec<u64>>,
    ref_count: usize,
}

struct VersionSlot {
    version: Version,
    prev: usize,
    next: usize,
}

/// File registry + level layout, persisted as a log of edits with a
/// pointer file (manifest).
pub struct VersionSet {
    name: String,
    next_file_number: u64,
    file_map: HashMap<u64, FileInfo>,
    versions: Vec<VersionSlot>,
    base: usize,
    current: usize,
    env: Arc<dyn Env>,
    comparator: Arc<dyn Comparator>,
    cfg: EngineConfig,
    log: Option<WalWriter>,
    log_name: Option<String>,
}

/// A refcount going negative is a programmer error (double-unref of an
/// already-collected file), not a recoverable condition — panics rather
/// than saturating or wrapping.
fn decrement_ref_count(ref_count: &mut u32, file_number: u64) {
    *ref_count = ref_count.checked_sub(1).unwrap_or_else(|| panic!("file {file_number} refcount went negative"));
}

impl VersionSet {
    pub fn new(name: impl Into<String>, env: Arc<dyn Env>, comparator: Arc<dyn Comparator>, cfg: EngineConfig) -> Self {
        let base = VersionSlot { version: Version::default(), prev: 0, next: 0 };
        VersionSet {
            name: name.into(),
            next_file_number: 1,
            file_map: HashMap::new(),
            versions: vec![base],
            base: 0,
            current: 0,
            env,
            comparator,
            cfg,
            log: None,
            log_name: None,
        }
    }

    pub fn current(&self) -> &Version {
        &self.versions[self.current].version
    }

    pub fn file_info(&self, file_number: u64) -> Option<&FileInfo> {
        self.file_map.get(&file_number)
    }

    pub fn next_file_number(&self) -> u64 {
        self.next_file_number
    }

    fn add_version(&mut self, id: usize) {
        let cur = self.current;
        let cur_prev = self.versions[cur].prev;
        self.versions[id].next = cur;
        self.versions[id].prev = cur_prev;
        self.versions[cur].prev = id;
        self.versions[cur_prev].next = id;
        self.current = id;
    }

    /// Unlinks `id` from the version cycle. The base sentinel may never be
    /// removed.
    pub fn remove_version(&mut self, id: usize) {
        assert!(id != self.base, "cannot remove the base version");
        let prev = self.versions[id].prev;
        let next = self.versions[id].next;
        self.versions[prev].next = next;
        self.versions[next].prev = prev;
    }

    /// Copies `origin`, Ref'ing each of its log files in `file_map` (table
    /// files referenced from `levels` are copied without a refcount bump,
    /// matching the reference exactly).
    fn copy_version(&mut self, origin: usize) -> Version {
        let origin = &self.versions[origin].version;
        let last_sequence = origin.last_sequence;
        let log_files = origin.log_files.clone();
        let levels = origin.levels.clone();
        for &fh in &log_files {
            let fi = self.file_map.get_mut(&fh).expect("file info missing for a version's log file");
            fi.ref_count += 1;
        }
        Version { last_sequence, log_files, levels, ref_count: 0 }
    }

    fn unref(&mut self, file_number: u64) {
        let new_count = {
            let fi = self.file_map.get_mut(&file_number).expect("file info missing during unref");
            decrement_ref_count(&mut fi.ref_count, file_number);
            fi.ref_count
        };
        // Deliberately does not delete the underlying file; garbage
        // collection of orphaned table/log files is out of scope here.
        if new_count == 0 {
            self.file_map.remove(&file_number);
        }
    }

    /// Applies `edit` to `version` in place. Steps 3/4 implement the
    /// hardened (non-reference) behavior for level removal and
    /// out-of-range level indices.
    fn apply_edit(&mut self, version: &mut Version, edit: &VersionEdit) {
        version.last_sequence = edit.last_sequence;
        self.next_file_number = edit.next_file_number;

        let mut log_files_added = Vec::new();
        let mut log_files_removed = Vec::new();

        for add in &edit.adds {
            let mut info = add.info.clone();
            info.ref_count = 0;
            let is_log = info.is_log_file();
            self.file_map.insert(add.file_number, info);
            self.file_map.get_mut(&add.file_number).expect("just inserted").ref_count += 1;
            if is_log {
                log_files_added.push(add.file_number);
            }
        }

        for change in &edit.level_changes {
            if change.origin_level < 0 {
                continue;
            }
            let level_idx = change.origin_level as usize;
            if level_idx >= version.levels.len() {
                continue;
            }
            let level = &mut version.levels[level_idx];
            if let Some(pos) = level.iter().position(|&fh| fh == change.file_number) {
                level.remove(pos);
            }
        }

        for change in &edit.level_changes {
            if change.new_level < 0 {
                continue;
            }
            let level_idx = change.new_level as usize;
            if level_idx >= version.levels.len() {
                version.levels.resize(level_idx + 1, Vec::new());
            }
            let key = self
                .file_map
                .get(&change.file_number)
                .expect("file info missing for a level-change file number")
                .min_key
                .clone();
            let comparator = &self.comparator;
            let file_map = &self.file_map;
            let level = &mut version.levels[level_idx];
            let pos = level.partition_point(|&fh| {
                let fi = file_map.get(&fh).expect("file info missing for an existing level entry");
                assert_valid_ordering(comparator.compare(&fi.min_key, &key)) == std::cmp::Ordering::Less
            });
            level.insert(pos, change.file_number);
        }

        for &fh in &edit.removes {
            let is_log = self.file_map.get(&fh).expect("file info missing for a removed file number").is_log_file();
            if is_log {
                log_files_removed.push(fh);
            }
            self.unref(fh);
        }

        version.log_files.extend(log_files_added);
        version.log_files.retain(|fh| !log_files_removed.contains(fh));
    }

    /// Appends `edit` to the version log (opening one, and rotating the
    /// manifest pointer file, on the very first call), then applies it —
    /// mutating `current` in place if nothing else references it, else
    /// splicing in a fresh copy.
    pub fn log_and_apply(&mut self, edit: &mut VersionEdit) -> Result<()> {
        let first_call = self.log.is_none();
        let mut new_log_name = None;

        if self.log.is_none() {
            let file_number = edit.next_file_number;
            let name = format!("{}/version_{}.log", self.name, file_number);
            edit.next_file_number += 1;
            let file = self.env.new_writable_file(&name)?;
            self.log = Some(WalWriter::new(file, &self.cfg));
            new_log_name = Some(name);
        }

        let encoded = edit.encode();
        self.log.as_mut().expect("log just ensured present").add_record(&encoded)?;

        if self.versions[self.current].version.ref_count == 0 {
            let mut version = std::mem::take(&mut self.versions[self.current].version);
            self.apply_edit(&mut version, edit);
            self.versions[self.current].version = version;
        } else {
            let mut version = self.copy_version(self.current);
            self.apply_edit(&mut version, edit);
            let id = self.versions.len();
            self.versions.push(VersionSlot { version, prev: id, next: id });
            self.add_version(id);
        }

        if first_call {
            let log_name = new_log_name.expect("first call always opens a new log");
            self.log_name = Some(log_name.clone());
            let manifest = format!("{}/manifest", self.name);
            let future = format!("{}/manifest.future", self.name);

            let _ = self.env.delete_file(&future);
            let mut future_file = self.env.new_writable_file(&future)?;
            future_file.append(log_name.as_bytes())?;
            future_file.close()?;

            if self.env.file_exists(&manifest) {
                self.env.delete_file(&manifest)?;
            }
            self.env.rename_file(&future, &manifest)?;
            log::debug!("version set: rotated manifest to point at {log_name}");
        }

        Ok(())
    }

    /// Reads `<name>/manifest`, opens the version log it names, and
    /// replays every edit onto a copy of `current`.
    pub fn recover(&mut self) -> Result<()> {
        let manifest = format!("{}/manifest", self.name);
        if !self.env.file_exists(&manifest) {
            log::error!("version set: no manifest at {manifest}");
            return Err(StorageError::corruption("version set: manifest file not found"));
        }

        let file_size = self.env.get_file_size(&manifest)?;
        let mut file = self.env.new_sequential_file(&manifest)?;
        let mut data = vec![0u8; file_size as usize];
        let got = file.read(&mut data)?;
        if got.len() != data.len() {
            return Err(StorageError::corruption("version set: short read of manifest"));
        }
        let version_log_name =
            String::from_utf8(got.to_vec()).map_err(|_| StorageError::corruption("version set: manifest is not valid utf8"))?;

        self.recover_from_log_file(&version_log_name)
    }

    fn recover_from_log_file(&mut self, name: &str) -> Result<()> {
        let file = self.env.new_sequential_file(name)?;
        let mut reader = WalReader::new(file, &self.cfg);
        let mut version = self.copy_version(self.current);

        loop {
            match reader.read_record()? {
                WalRead::Record(record) => {
                    let edit = VersionEdit::decode(&record)?;
                    self.apply_edit(&mut version, &edit);
                }
                WalRead::Eof => {
                    let id = self.versions.len();
                    self.versions.push(VersionSlot { version, prev: id, next: id });
                    self.add_version(id);
                    self.log_name = Some(name.to_string());
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::LexicographicComparator;
    use crate::env::NativeEnv;
    use tempfile::tempdir;

    fn new_set(dir: &std::path::Path) -> VersionSet {
        VersionSet::new(
            dir.to_str().unwrap().to_string(),
            Arc::new(NativeEnv),
            Arc::new(LexicographicComparator),
            EngineConfig::default(),
        )
    }

    #[test]
    fn edit_codec_round_trips() {
        let mut edit = VersionEdit::new();
        edit.add_file(1, FileInfo { size: 100, ref_count: 0, min_key: b"a".to_vec(), max_key: b"z".to_vec() });
        edit.add_file(2, FileInfo { size: 0, ref_count: 0, min_key: Vec::new(), max_key: Vec::new() });
        edit.remove_file(2);
        edit.add_level_change(VersionLevelChange::add_level(1, 0));
        edit.add_level_change(VersionLevelChange::move_level(3, 0, 1));
        edit.last_sequence = 42;
        edit.next_file_number = 7;

        let encoded = edit.encode();
        let decoded = VersionEdit::decode(&encoded).unwrap();
        assert_eq!(decoded, edit);
    }

    #[test]
    fn apply_inserts_sorted_by_min_key_and_removes_exact_match() {
        let dir = tempdir().unwrap();
        let mut set = new_set(dir.path());

        let mut edit = VersionEdit::new();
        edit.add_file(1, FileInfo { size: 1, ref_count: 0, min_key: b"b".to_vec(), max_key: b"b".to_vec() });
        edit.add_file(2, FileInfo { size: 1, ref_count: 0, min_key: b"d".to_vec(), max_key: b"d".to_vec() });
        edit.add_file(3, FileInfo { size: 1, ref_count: 0, min_key: b"a".to_vec(), max_key: b"a".to_vec() });
        edit.add_level_change(VersionLevelChange::add_level(1, 0));
        edit.add_level_change(VersionLevelChange::add_level(2, 0));
        edit.add_level_change(VersionLevelChange::add_level(3, 0));
        edit.next_file_number = 10;
        set.log_and_apply(&mut edit).unwrap();

        assert_eq!(set.current().levels[0], vec![3, 1, 2]);

        let mut remove_edit = VersionEdit::new();
        remove_edit.add_level_change(VersionLevelChange::remove_level(1, 0));
        remove_edit.next_file_number = set.next_file_number();
        set.log_and_apply(&mut remove_edit).unwrap();

        assert_eq!(set.current().levels[0], vec![3, 2]);
    }

    #[test]
    fn apply_auto_extends_levels_past_current_height() {
        let dir = tempdir().unwrap();
        let mut set = new_set(dir.path());

        let mut edit = VersionEdit::new();
        edit.add_file(1, FileInfo { size: 1, ref_count: 0, min_key: b"k".to_vec(), max_key: b"k".to_vec() });
        edit.add_level_change(VersionLevelChange::add_level(1, 3));
        edit.next_file_number = 2;
        set.log_and_apply(&mut edit).unwrap();

        assert_eq!(set.current().levels.len(), 4);
        assert_eq!(set.current().levels[3], vec![1]);
    }

    #[test]
    fn recover_reconstructs_the_same_version() {
        let dir = tempdir().unwrap();
        {
            let mut set = new_set(dir.path());
            let mut edit = VersionEdit::new();
            edit.add_file(1, FileInfo { size: 5, ref_count: 0, min_key: b"a".to_vec(), max_key: b"c".to_vec() });
            edit.add_level_change(VersionLevelChange::add_level(1, 0));
            edit.next_file_number = 2;
            edit.last_sequence = 9;
            set.log_and_apply(&mut edit).unwrap();
        }

        let mut recovered = new_set(dir.path());
        recovered.recover().unwrap();
        assert_eq!(recovered.current().last_sequence, 9);
        assert_eq!(recovered.current().levels[0], vec![1]);
        assert_eq!(recovered.file_info(1).unwrap().min_key, b"a");
    }

    // A file's ref_count is dropped from file_map the moment unref brings it
    // to zero, so a second unref of the same file never finds a live entry
    // to decrement — it panics via the `.expect` in `unref`, not via
    // `decrement_ref_count`'s underflow branch. See
    // `decrement_ref_count_panics_on_negative_refcount` below for a test
    // that reaches that branch directly.
    #[test]
    #[should_panic(expected = "file info missing during unref")]
    fn unref_after_file_is_collected_panics_on_missing_entry() {
        let dir = tempdir().unwrap();
        let mut set = new_set(dir.path());
        let mut edit = VersionEdit::new();
        edit.add_file(1, FileInfo { size: 1, ref_count: 0, min_key: Vec::new(), max_key: Vec::new() });
        edit.next_file_number = 2;
        set.log_and_apply(&mut edit).unwrap();

        set.unref(1);
        set.unref(1);
    }

    #[test]
    #[should_panic(expected = "refcount went negative")]
    fn decrement_ref_count_panics_on_negative_refcount() {
        let mut ref_count = 0u32;
        decrement_ref_count(&mut ref_count, 1);
    }
}
