//! Shared, read-only file mapping probed by the poll loop
//!
//! The target image is mapped `MAP_SHARED` and read-only, so its pages are
//! the very page-cache pages the victim process executes or reads from.
//! A hit on one of our cache lines means somebody touched the same physical
//! line since our last flush.
//!
//! The mapping never extends past end-of-file: touching a page beyond EOF in
//! a shared file mapping raises `SIGBUS`, so the effective region size is
//! `min(upper_bound, file_len)` and offset validation uses that size.

use log::info;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::domain::{Offset, RegionError};

/// Default upper bound of the mapping (64 MiB)
pub const DEFAULT_REGION_SIZE: usize = 64 * 1024 * 1024;

/// Read-only view of the target file shared with the victim via the page cache
pub struct SharedRegion {
    mmap: Mmap,
    path: PathBuf,
}

impl SharedRegion {
    /// Open `path` and map at most `upper_bound` bytes of it.
    ///
    /// # Errors
    /// - [`RegionError::OpenFailed`] if the file cannot be opened
    /// - [`RegionError::EmptyFile`] if there is nothing to map
    /// - [`RegionError::MapFailed`] if `mmap` itself fails
    pub fn open<P: AsRef<Path>>(path: P, upper_bound: usize) -> Result<Self, RegionError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|source| RegionError::OpenFailed { path: path.clone(), source })?;

        let file_len = file
            .metadata()
            .map_err(|source| RegionError::MetadataFailed { path: path.clone(), source })?
            .len();
        let len = usize::try_from(file_len).map_or(upper_bound, |n| n.min(upper_bound));
        if len == 0 {
            return Err(RegionError::EmptyFile(path));
        }

        // SAFETY: the mapping is read-only and we never hand out references
        // that outlive `self`; concurrent truncation of the target by another
        // process is outside what we can guard against.
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().len(len).map(&file) }
            .map_err(|source| RegionError::MapFailed { path: path.clone(), source })?;

        info!(
            "Mapped {} bytes of {} (file size {file_len}, upper bound {upper_bound})",
            mmap.len(),
            path.display()
        );

        Ok(Self { mmap, path })
    }

    /// Number of probe-able bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.mmap.len()
    }

    /// Check if an offset falls within the mapping
    #[must_use]
    pub fn contains(&self, offset: Offset) -> bool {
        offset.0 < self.mmap.len()
    }

    /// The mapped bytes
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    /// Path of the mapped file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Address of `offset` inside the mapping.
    ///
    /// Callers must have validated `offset` with [`SharedRegion::contains`];
    /// the poll loop does this once when the offset table is built.
    #[must_use]
    pub fn addr(&self, offset: Offset) -> *const u8 {
        debug_assert!(self.contains(offset), "offset {offset} outside region");
        self.mmap.as_ptr().wrapping_add(offset.0)
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("path", &self.path)
            .field("len", &self.mmap.len())
            .finish_non_exhaustive()
    }
}
