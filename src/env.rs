//! Filesystem abstraction the core consumes. The public DB layer and any
//! compaction/GC scheduler are out of scope; only the file handles and the
//! small set of directory operations the core itself calls are specified
//! here, plus one concrete `std::fs`-backed implementation.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::Result;
use crate::utils::num::i64_to_usize;

/// A file opened for sequential, forward-only reads. Tracks its own
/// position independently of the OS file cursor.
pub trait SequentialFile {
    /// Reads into `scratch`, returning the sub-slice actually filled. An
    /// empty return with `Ok(_)` signals EOF.
    fn read<'a>(&mut self, scratch: &'a mut [u8]) -> Result<&'a [u8]>;
    fn skip(&mut self, n: u64) -> Result<()>;
}

/// A file opened for random-offset reads.
pub trait RandomAccessFile {
    fn read_at<'a>(&self, offset: u64, scratch: &'a mut [u8]) -> Result<&'a [u8]>;
}

/// A file opened for append-only writes.
pub trait WritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()>;
    fn size(&self) -> u64;
    fn flush(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// OS access the core needs beyond opening files.
pub trait Env {
    fn new_sequential_file(&self, name: &str) -> Result<Box<dyn SequentialFile>>;
    fn new_random_access_file(&self, name: &str) -> Result<Box<dyn RandomAccessFile>>;
    fn new_writable_file(&self, name: &str) -> Result<Box<dyn WritableFile>>;
    fn file_exists(&self, name: &str) -> bool;
    fn get_children(&self, dir: &str) -> Result<Vec<String>>;
    fn delete_file(&self, name: &str) -> Result<()>;
    fn create_dir(&self, dir: &str) -> Result<()>;
    fn delete_dir(&self, dir: &str) -> Result<()>;
    fn get_file_size(&self, name: &str) -> Result<u64>;
    fn rename_file(&self, src: &str, target: &str) -> Result<()>;
}

/// `std::fs`-backed concrete implementation of [`Env`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEnv;

impl Env for NativeEnv {
    fn new_sequential_file(&self, name: &str) -> Result<Box<dyn SequentialFile>> {
        let file = File::open(name)?;
        Ok(Box::new(LocalSequentialFile { file, pos: 0 }))
    }

    fn new_random_access_file(&self, name: &str) -> Result<Box<dyn RandomAccessFile>> {
        let file = File::open(name)?;
        Ok(Box::new(LocalRandomAccessFile { file }))
    }

    fn new_writable_file(&self, name: &str) -> Result<Box<dyn WritableFile>> {
        let mut file = OpenOptions::new().write(true).create(true).truncate(false).open(name)?;
        let pos = file.seek(SeekFrom::End(0))?;
        Ok(Box::new(LocalWritableFile { file, pos }))
    }

    fn file_exists(&self, name: &str) -> bool {
        Path::new(name).exists()
    }

    fn get_children(&self, dir: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(s) = entry.file_name().to_str() {
                names.push(s.to_string());
            }
        }
        Ok(names)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        fs::remove_file(name)?;
        Ok(())
    }

    fn create_dir(&self, dir: &str) -> Result<()> {
        fs::create_dir_all(dir)?;
        Ok(())
    }

    fn delete_dir(&self, dir: &str) -> Result<()> {
        fs::remove_dir_all(dir)?;
        Ok(())
    }

    fn get_file_size(&self, name: &str) -> Result<u64> {
        Ok(fs::metadata(name)?.len())
    }

    fn rename_file(&self, src: &str, target: &str) -> Result<()> {
        fs::rename(src, target)?;
        Ok(())
    }
}

struct LocalSequentialFile {
    file: File,
    pos: u64,
}

impl SequentialFile for LocalSequentialFile {
    fn read<'a>(&mut self, scratch: &'a mut [u8]) -> Result<&'a [u8]> {
        self.file.seek(SeekFrom::Start(self.pos))?;
        let mut n = 0usize;
        loop {
            match self.file.read(&mut scratch[n..]) {
                Ok(0) => break,
                Ok(k) => {
                    n += k;
                    if n == scratch.len() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.pos += n as u64;
        Ok(&scratch[..n])
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        self.pos += n;
        Ok(())
    }
}

struct LocalRandomAccessFile {
    file: File,
}

impl RandomAccessFile for LocalRandomAccessFile {
    fn read_at<'a>(&self, offset: u64, scratch: &'a mut [u8]) -> Result<&'a [u8]> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            let n = self.file.read_at(scratch, offset)?;
            Ok(&scratch[..n])
        }
        #[cfg(not(unix))]
        {
            // Portable fallback: clone semantics via duplicate seek+read.
            let mut f = self.file.try_clone()?;
            f.seek(SeekFrom::Start(offset))?;
            let n = f.read(scratch)?;
            Ok(&scratch[..n])
        }
    }
}

struct LocalWritableFile {
    file: File,
    pos: u64,
}

impl WritableFile for LocalWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.write_all_at(data, self.pos)?;
        }
        #[cfg(not(unix))]
        {
            self.file.seek(SeekFrom::Start(self.pos))?;
            self.file.write_all(data)?;
        }
        self.pos += data.len() as u64;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.pos
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()
    }
}

/// Clamps a negative-impossible size read from a file into a `usize`,
/// matching the numeric-safety idiom used throughout this crate.
pub fn checked_size_to_usize(size: i64) -> Option<usize> {
    i64_to_usize(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_sequential_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.dat");
        let name = path.to_str().unwrap();
        let env = NativeEnv;
        {
            let mut w = env.new_writable_file(name).unwrap();
            w.append(b"hello ").unwrap();
            w.append(b"world").unwrap();
            assert_eq!(w.size(), 11);
            w.flush().unwrap();
        }
        let mut r = env.new_sequential_file(name).unwrap();
        let mut scratch = vec![0u8; 11];
        let got = r.read(&mut scratch).unwrap();
        assert_eq!(got, b"hello world");
    }

    #[test]
    fn random_access_reads_at_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.dat");
        let name = path.to_str().unwrap();
        let env = NativeEnv;
        {
            let mut w = env.new_writable_file(name).unwrap();
            w.append(b"0123456789").unwrap();
        }
        let r = env.new_random_access_file(name).unwrap();
        let mut scratch = vec![0u8; 4];
        let got = r.read_at(3, &mut scratch).unwrap();
        assert_eq!(got, b"3456");
    }

    #[test]
    fn file_exists_and_delete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.dat");
        let name = path.to_str().unwrap();
        let env = NativeEnv;
        assert!(!env.file_exists(name));
        env.new_writable_file(name).unwrap();
        assert!(env.file_exists(name));
        env.delete_file(name).unwrap();
        assert!(!env.file_exists(name));
    }

    #[test]
    fn rename_file_works() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.dat");
        let dst = dir.path().join("b.dat");
        let env = NativeEnv;
        env.new_writable_file(src.to_str().unwrap()).unwrap();
        env.rename_file(src.to_str().unwrap(), dst.to_str().unwrap()).unwrap();
        assert!(!env.file_exists(src.to_str().unwrap()));
        assert!(env.file_exists(dst.to_str().unwrap()));
    }
}
