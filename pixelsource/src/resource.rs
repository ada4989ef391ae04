//! Ownership of the operating system resources behind a pixel data source.
//!
//! Every file handle and memory mapping acquired while binding a source
//! is registered in a [`ResourceRegistry`],
//! which hands out plain [`ResourceId`]s to the source
//! and releases everything on [`release`](ResourceRegistry::release)
//! or when dropped.
use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use tracing::debug;

/// A handle to a resource held by a [`ResourceRegistry`].
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct ResourceId(usize);

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ResourceError {
    /// Resource {id} was already released
    Released { id: ResourceId },

    #[snafu(display("Could not read {} bytes at offset {} of {}", len, offset, path.display()))]
    Read {
        path: PathBuf,
        offset: u64,
        len: usize,
        source: std::io::Error,
    },

    #[snafu(display(
        "Range of {} bytes at offset {} is past the end of {} ({} bytes)",
        len,
        offset,
        path.display(),
        size
    ))]
    OutOfBounds {
        path: PathBuf,
        offset: u64,
        len: usize,
        size: u64,
    },
}

#[derive(Debug)]
enum Resource {
    File { path: PathBuf, file: File },
    Mapping { path: PathBuf, map: Mmap },
}

impl Resource {
    fn path(&self) -> &Path {
        match self {
            Resource::File { path, .. } | Resource::Mapping { path, .. } => path,
        }
    }
}

/// The set of open files and memory mappings of one image.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: Vec<Resource>,
    released: bool,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an open file.
    pub fn register_file(&mut self, path: impl Into<PathBuf>, file: File) -> ResourceId {
        self.push(Resource::File {
            path: path.into(),
            file,
        })
    }

    /// Take ownership of a memory mapping.
    pub fn register_mapping(&mut self, path: impl Into<PathBuf>, map: Mmap) -> ResourceId {
        self.push(Resource::Mapping {
            path: path.into(),
            map,
        })
    }

    fn push(&mut self, resource: Resource) -> ResourceId {
        let id = ResourceId(self.resources.len());
        debug!("Registered resource {} for {}", id, resource.path().display());
        self.resources.push(resource);
        id
    }

    /// Fetch `len` bytes starting at `offset` of the given resource.
    ///
    /// Mapped resources are borrowed without copying,
    /// files are read into a new buffer.
    pub fn read_at(
        &self,
        id: ResourceId,
        offset: u64,
        len: usize,
    ) -> Result<Cow<'_, [u8]>, ResourceError> {
        ensure!(!self.released, ReleasedSnafu { id });
        let resource = self.resources.get(id.0).context(ReleasedSnafu { id })?;
        match resource {
            Resource::Mapping { path, map } => {
                let size = map.len() as u64;
                let end = offset.checked_add(len as u64);
                ensure!(
                    matches!(end, Some(end) if end <= size),
                    OutOfBoundsSnafu {
                        path: path.clone(),
                        offset,
                        len,
                        size,
                    }
                );
                let start = offset as usize;
                Ok(Cow::Borrowed(&map[start..start + len]))
            }
            Resource::File { path, file } => {
                let mut buf = vec![0; len];
                let mut reader = file;
                reader
                    .seek(SeekFrom::Start(offset))
                    .and_then(|_| reader.read_exact(&mut buf))
                    .context(ReadSnafu {
                        path: path.clone(),
                        offset,
                        len,
                    })?;
                Ok(Cow::Owned(buf))
            }
        }
    }

    /// The path a resource was acquired from.
    pub fn path(&self, id: ResourceId) -> Option<&Path> {
        self.resources.get(id.0).map(Resource::path)
    }

    /// Whether the resource is a memory mapping.
    pub fn is_mapping(&self, id: ResourceId) -> bool {
        matches!(self.resources.get(id.0), Some(Resource::Mapping { .. }))
    }

    /// The number of resources currently held.
    pub fn open_count(&self) -> usize {
        self.resources.len()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Close every file and unmap every region.
    ///
    /// Calling this more than once is harmless.
    /// Returns the number of resources released by this call.
    pub fn release(&mut self) -> usize {
        let count = self.resources.len();
        if !self.released && count > 0 {
            debug!("Releasing {} pixel data resources", count);
        }
        self.resources.clear();
        self.released = true;
        count
    }
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        self.release();
    }
}
