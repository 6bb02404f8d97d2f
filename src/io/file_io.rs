use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

/// Trait for positioned reads from a dataset file.
///
/// Implementations must be safe to move across threads; callers serialize
/// access themselves (a [`SingleFileReader`](crate::format::SingleFileReader)
/// wraps its file in a mutex so one seek+read pair is never interleaved with
/// another).
pub trait ReadableFile: Send {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range extends past the end of the file or if
    /// the read fails.
    fn read_exact_at(&mut self, offset: u64, len: usize) -> io::Result<Bytes>;

    /// Read everything from `offset` to the end of the file.
    fn read_to_end_at(&mut self, offset: u64) -> io::Result<Bytes>;
}

/// Trait for sequential writes with the few random-access operations the
/// single-file writer needs: seeking (for pre-allocation and patching the
/// final next-IFD offset) and truncation (on finish).
pub trait WritableFile: Send {
    /// Append `buf` at the current position.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Move the write position to an absolute offset.
    fn seek(&mut self, offset: u64) -> io::Result<()>;

    /// Current write position.
    fn position(&mut self) -> io::Result<u64>;

    /// Cut the file down to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Flush buffered writes to the backend.
    fn flush(&mut self) -> io::Result<()>;
}

/// The capability set through which all dataset I/O flows.
///
/// Readers, writers, and the dataset opener never touch the filesystem
/// directly; everything goes through this seam so that tests can substitute
/// a failing or in-memory backend, and so alternative storage backends can
/// be plugged in without touching the format code.
pub trait FileIo: Send + Sync {
    /// Open an existing file for positioned reads.
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadableFile>>;

    /// Create (or truncate) a file for writing.
    fn open_write(&self, path: &Path) -> io::Result<Box<dyn WritableFile>>;

    /// List the entry names directly under `path`.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Whether `path` names a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Create `path` and any missing parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Join a directory path and an entry name.
    fn path_join(&self, base: &Path, name: &str) -> PathBuf {
        base.join(name)
    }
}

// =============================================================================
// Host filesystem backend
// =============================================================================

/// The default [`FileIo`] backend over the host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileIo;

impl FileIo for StdFileIo {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadableFile>> {
        let file = File::open(path)?;
        Ok(Box::new(StdFile { file }))
    }

    fn open_write(&self, path: &Path) -> io::Result<Box<dyn WritableFile>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(StdFile { file }))
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

struct StdFile {
    file: File,
}

impl ReadableFile for StdFile {
    fn read_exact_at(&mut self, offset: u64, len: usize) -> io::Result<Bytes> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn read_to_end_at(&mut self, offset: u64) -> io::Result<Bytes> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

impl WritableFile for StdFile {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

// =============================================================================
// Tests
// =============================================================================
