use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::{FileError, FileResult};
use super::{PAGE_SIZE, PageNo};

/// A single backing file addressed in whole `PAGE_SIZE` blocks.
///
/// The file length is kept an exact multiple of `PAGE_SIZE`: pages are only
/// ever written in full, and only at an existing offset or directly after the
/// last page. Any other length found on disk is reported as corruption.
#[derive(Debug)]
pub struct PagedFile {
    /// Canonical path of the file
    path: PathBuf,
    file: Mutex<File>,
}

impl PagedFile {
    /// Open a paged file, creating it (and its parent directories) if missing
    pub fn open<P: AsRef<Path>>(path: P) -> FileResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let path = path.canonicalize()?;

        // Refuse to hand out a file whose length is already broken
        Self::pages_in(&file, &path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Canonical path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the number of pages in the file
    pub fn page_count(&self) -> FileResult<usize> {
        let file = self.lock();
        Self::pages_in(&file, &self.path)
    }

    /// Read a page from the file into `buffer`
    pub fn read_page(&self, page_no: PageNo, buffer: &mut [u8]) -> FileResult<()> {
        if buffer.len() != PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: buffer.len(),
            });
        }

        let mut file = self.lock();
        let num_pages = Self::pages_in(&file, &self.path)?;
        if page_no >= num_pages {
            return Err(FileError::PageOutOfRange { page_no, num_pages });
        }

        file.seek(SeekFrom::Start((page_no * PAGE_SIZE) as u64))?;
        file.read_exact(buffer)?;
        Ok(())
    }

    /// Write a page to the file, appending when `page_no` is one past the end
    pub fn write_page(&self, page_no: PageNo, buffer: &[u8]) -> FileResult<()> {
        if buffer.len() != PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: buffer.len(),
            });
        }

        let mut file = self.lock();
        let num_pages = Self::pages_in(&file, &self.path)?;
        if page_no > num_pages {
            return Err(FileError::PageOutOfRange { page_no, num_pages });
        }

        file.seek(SeekFrom::Start((page_no * PAGE_SIZE) as u64))?;
        file.write_all(buffer)?;
        // Durability is the caller's business, see sync()
        Ok(())
    }

    /// Sync the file to disk (flush all OS buffers)
    pub fn sync(&self) -> FileResult<()> {
        let file = self.lock();
        file.sync_data()?;
        Ok(())
    }

    /// A panic elsewhere never leaves the handle half-updated, so a poisoned
    /// lock is taken over rather than propagated
    fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pages_in(file: &File, path: &Path) -> FileResult<usize> {
        let file_size = file.metadata()?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(FileError::CorruptStorage(format!(
                "{}: length {} is not a multiple of the page size {}",
                path.display(),
                file_size,
                PAGE_SIZE
            )));
        }
        Ok((file_size / PAGE_SIZE as u64) as usize)
    }
}
