//! Write-ahead log framing: a chunked, checksummed record format with fixed
//! physical block alignment that tolerates fragmentation across block
//! boundaries.
//!
//! Each physical block is `wal_block_size` bytes (32,768 by default). A
//! logical record is carried by one or more chunks; a 7-byte chunk header
//! (CRC32 of the payload, a 1-byte type tag, a little-endian 2-byte total
//! chunk length) precedes each chunk's payload. If fewer than `HEADER_SIZE`
//! bytes remain in a physical block, they are zero-padded and skipped.

use crate::config::EngineConfig;
use crate::env::{SequentialFile, WritableFile};
use crate::error::{Result, StorageError};

const HEADER_SIZE: usize = 7;

const FULL: u8 = 1;
const FIRST: u8 = 2;
const MIDDLE: u8 = 3;
const LAST: u8 = 4;

/// Appends length-framed, checksummed, block-aligned records to a file.
pub struct WalWriter {
    file: Box<dyn WritableFile>,
    block_size: usize,
}

impl WalWriter {
    pub fn new(file: Box<dyn WritableFile>, cfg: &EngineConfig) -> Self {
        WalWriter { file, block_size: cfg.wal_block_size }
    }

    pub fn into_inner(self) -> Box<dyn WritableFile> {
        self.file
    }

    /// Frames `record` into one or more chunks, padding to the next
    /// physical block boundary whenever too little room remains for even a
    /// chunk header.
    pub fn add_record(&mut self, record: &[u8]) -> Result<()> {
        let mut remaining = record;
        let mut first = true;
        loop {
            let offset_in_block = (self.file.size() as usize) % self.block_size;
            let available = self.block_size - offset_in_block;
            if HEADER_SIZE + remaining.len() <= available {
                let tag = if first { FULL } else { LAST };
                self.emit_chunk(tag, remaining)?;
                return Ok(());
            } else if available > HEADER_SIZE {
                let take = available - HEADER_SIZE;
                let (chunk_payload, rest) = remaining.split_at(take);
                let tag = if first { FIRST } else { MIDDLE };
                self.emit_chunk(tag, chunk_payload)?;
                remaining = rest;
                first = false;
            } else {
                if !first {
                    panic!("wal writer: padding branch reached on a non-first iteration");
                }
                let pad = vec![0u8; available];
                self.file.append(&pad)?;
            }
        }
    }

    fn emit_chunk(&mut self, tag: u8, payload: &[u8]) -> Result<()> {
        let crc = crc32fast::hash(payload);
        let length = (HEADER_SIZE + payload.len()) as u16;
        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&crc.to_ne_bytes());
        header.push(tag);
        header.extend_from_slice(&length.to_le_bytes());
        self.file.append(&header)?;
        self.file.append(payload)?;
        log::debug!("wal: emitted chunk tag={tag} payload_len={}", payload.len());
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()
    }
}

/// Outcome of one `read_record` call.
#[derive(Debug, PartialEq, Eq)]
pub enum WalRead {
    Record(Vec<u8>),
    Eof,
}

/// Reads length-framed records back from a file written by [`WalWriter`].
pub struct WalReader {
    file: Box<dyn SequentialFile>,
    block_size: usize,
    off: u64,
}

impl WalReader {
    pub fn new(file: Box<dyn SequentialFile>, cfg: &EngineConfig) -> Self {
        WalReader { file, block_size: cfg.wal_block_size, off: 0 }
    }

    /// Reads the next record. Corrupted CRCs are always surfaced as
    /// `StorageError::Corruption`, regardless of chunk type or position —
    /// a deliberate hardening over a reference implementation that could,
    /// on some branches, return a payload despite a CRC mismatch.
    pub fn read_record(&mut self) -> Result<WalRead> {
        let mut scratch: Vec<u8> = Vec::new();
        let mut first_chunk = true;
        loop {
            let offset_in_block = (self.off as usize) % self.block_size;
            let available = self.block_size - offset_in_block;
            if available <= HEADER_SIZE {
                self.file.skip(available as u64)?;
                self.off += available as u64;
                continue;
            }

            let mut header_buf = [0u8; HEADER_SIZE];
            let header = self.file.read(&mut header_buf)?;
            if header.is_empty() {
                return Ok(WalRead::Eof);
            }
            if header.len() < HEADER_SIZE {
                return Err(StorageError::corruption("wal: partial chunk header"));
            }
            self.off += HEADER_SIZE as u64;

            let mut crc_bytes = [0u8; 4];
            crc_bytes.copy_from_slice(&header[0..4]);
            let crc_stored = u32::from_ne_bytes(crc_bytes);
            let tag = header[4];
            let mut len_bytes = [0u8; 2];
            len_bytes.copy_from_slice(&header[5..7]);
            let length = u16::from_le_bytes(len_bytes) as usize;

            if length < HEADER_SIZE {
                return Err(StorageError::corruption("wal: declared chunk length shorter than header"));
            }
            let payload_len = length - HEADER_SIZE;
            if payload_len > available - HEADER_SIZE {
                return Err(StorageError::corruption("wal: declared chunk length exceeds space left in block"));
            }

            let mut payload = vec![0u8; payload_len];
            let got = self.file.read(&mut payload)?;
            if got.len() != payload_len {
                return Err(StorageError::corruption("wal: truncated chunk payload"));
            }
            self.off += payload_len as u64;

            let actual_crc = crc32fast::hash(got);
            if actual_crc != crc_stored {
                log::warn!("wal: CRC mismatch at offset {}", self.off);
                return Err(StorageError::corruption("wal: payload CRC mismatch"));
            }

            match tag {
                FULL => {
                    if first_chunk {
                        return Ok(WalRead::Record(got.to_vec()));
                    }
                    return Err(StorageError::corruption("wal: FULL chunk encountered mid-record"));
                }
                FIRST | MIDDLE => {
                    scratch.extend_from_slice(got);
                    first_chunk = false;
                }
                LAST => {
                    if first_chunk {
                        return Err(StorageError::corruption("wal: LAST chunk as the first chunk of a record"));
                    }
                    scratch.extend_from_slice(got);
                    return Ok(WalRead::Record(scratch));
                }
                other => return Err(StorageError::corruption(format!("wal: unrecognized chunk type tag {other}"))),
            }
        }
    }
}
