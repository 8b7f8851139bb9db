use std::fs::File;
use std::io;
use std::os::unix::fs::MetadataExt;

use nix::libc;

use crate::error::TailError;
use crate::watch::WatchId;

/// Fallback I/O chunk size when the filesystem reports no usable hint.
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// Block size hints above this are treated as bogus.
const MAX_BLOCK_SIZE: usize = 1 << 20;

/// Sentinel file name meaning "read standard input".
pub const STDIN_NAME: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Seekable; tailed via offset resolution.
    Regular,
    /// FIFO or socket; tailed via the windowing buffer.
    PipeLike,
    /// Character device; non-seekable, same path as pipes.
    Character,
    Unsupported,
}

/// Per-file bookkeeping for one tailed input.
///
/// `handle` is valid exactly while `active` is true; `size` never exceeds
/// the length observed by the last read; a record retires exactly once.
#[derive(Debug)]
pub struct FileRecord {
    /// Display identity; `-` denotes standard input.
    pub name: String,
    pub handle: Option<File>,
    /// Last observed length in bytes.
    pub size: u64,
    /// Preferred I/O chunk size, fixed after the initial stat.
    pub block_size: usize,
    pub kind: FileKind,
    pub active: bool,
    /// Subscription bound to this record for the lifetime of the follow loop.
    pub watch: Option<WatchId>,
}

impl FileRecord {
    pub fn new(name: String) -> Self {
        Self {
            name,
            handle: None,
            size: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            kind: FileKind::Unsupported,
            active: true,
            watch: None,
        }
    }

    pub fn is_stdin(&self) -> bool {
        self.name == STDIN_NAME
    }

    /// Name as shown in headers and diagnostics.
    pub fn pretty_name(&self) -> &str {
        if self.is_stdin() {
            "standard input"
        } else {
            &self.name
        }
    }

    /// Open the file and record its size, kind and block size hint.
    pub fn open(&mut self) -> Result<(), TailError> {
        let file = File::open(&self.name).map_err(TailError::from_open)?;
        let meta = file.metadata()?;

        self.kind = kind_of(meta.mode());
        if self.kind == FileKind::Unsupported {
            return Err(TailError::UnsupportedFileKind);
        }

        self.size = meta.len();
        self.block_size = block_size_hint(meta.blksize());
        self.handle = Some(file);
        Ok(())
    }

    /// Re-read the current size of the open handle.
    pub fn restat(&self) -> Result<u64, TailError> {
        let file = self.handle.as_ref().ok_or_else(|| {
            TailError::Io(io::Error::new(io::ErrorKind::NotConnected, "file is not open"))
        })?;
        Ok(file.metadata()?.len())
    }

    /// Permanently exclude this record from further I/O. Idempotent; the
    /// handle and watch subscription are released on the first call.
    pub fn retire(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.handle = None;
        self.watch = None;
    }
}

fn kind_of(mode: u32) -> FileKind {
    let fmt = mode & libc::S_IFMT;
    if fmt == libc::S_IFREG {
        FileKind::Regular
    } else if fmt == libc::S_IFIFO || fmt == libc::S_IFSOCK {
        FileKind::PipeLike
    } else if fmt == libc::S_IFCHR {
        FileKind::Character
    } else {
        FileKind::Unsupported
    }
}

fn block_size_hint(blksize: u64) -> usize {
    if blksize > 0 && blksize <= MAX_BLOCK_SIZE as u64 {
        blksize as usize
    } else {
        DEFAULT_BLOCK_SIZE
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_open_regular_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello\n").unwrap();

        let mut record = FileRecord::new(tmp.path().to_string_lossy().into_owned());
        record.open().unwrap();

        assert_eq!(record.kind, FileKind::Regular);
        assert_eq!(record.size, 6);
        assert!(record.handle.is_some());
        assert!(record.block_size > 0);
    }

    #[test]
    fn test_open_missing_file() {
        let mut record = FileRecord::new("/nonexistent/tailr-test".to_string());
        assert!(matches!(record.open(), Err(TailError::NotFound)));
    }

    #[test]
    fn test_retire_is_idempotent() {
        let mut record = FileRecord::new("x".to_string());
        assert!(record.active);
        record.retire();
        assert!(!record.active);
        assert!(record.handle.is_none());
        record.retire();
        assert!(!record.active);
    }

    #[test]
    fn test_pretty_name_stdin_sentinel() {
        let record = FileRecord::new(STDIN_NAME.to_string());
        assert_eq!(record.pretty_name(), "standard input");
    }
}
