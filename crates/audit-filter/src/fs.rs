//! Seam to path resolution.
//!
//! Both the target resolver (file attributes) and the fileset matcher
//! (object identity of configured paths) look objects up through the
//! [FileSystem] trait, so tests can run against an in-memory tree.

use std::path::Path;

use nix::sys::stat::{self, SFlag};
use vigil_core::ObjectId;

/// Attributes of an existing filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    pub object: ObjectId,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
}

impl FileAttributes {
    pub fn is_device(&self) -> bool {
        let kind = SFlag::from_bits_truncate(self.mode & SFlag::S_IFMT.bits());
        kind == SFlag::S_IFCHR || kind == SFlag::S_IFBLK
    }

    pub fn rdev_major(&self) -> u64 {
        stat::major(self.rdev)
    }

    pub fn rdev_minor(&self) -> u64 {
        stat::minor(self.rdev)
    }
}

pub trait FileSystem: Send + Sync {
    /// Looks `path` up without following a trailing symlink. `None` if the
    /// path doesn't denote an existing object.
    fn lookup(&self, path: &Path) -> Option<FileAttributes>;
}

/// Resolves paths against the host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFileSystem;

impl FileSystem for HostFileSystem {
    fn lookup(&self, path: &Path) -> Option<FileAttributes> {
        match stat::lstat(path) {
            Ok(st) => Some(FileAttributes {
                object: ObjectId {
                    dev: st.st_dev,
                    ino: st.st_ino,
                },
                mode: st.st_mode,
                uid: st.st_uid,
                gid: st.st_gid,
                rdev: st.st_rdev,
            }),
            Err(err) => {
                log::trace!("lookup of {} failed: {err}", path.display());
                None
            }
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryFileSystem;

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use std::{
        collections::HashMap,
        path::{Path, PathBuf},
    };

    use nix::sys::stat::{self, SFlag};
    use vigil_core::ObjectId;

    use super::{FileAttributes, FileSystem};

    const DEV: u64 = 0x803;

    /// In-memory directory tree. Parent directories are created implicitly.
    #[derive(Debug, Default)]
    pub struct MemoryFileSystem {
        entries: HashMap<PathBuf, FileAttributes>,
        next_ino: u64,
    }

    impl MemoryFileSystem {
        pub fn new() -> Self {
            let mut fs = Self {
                entries: HashMap::new(),
                next_ino: 2,
            };
            fs.insert("/", SFlag::S_IFDIR.bits() | 0o755, 0);
            fs
        }

        pub fn dir(mut self, path: &str) -> Self {
            self.insert(path, SFlag::S_IFDIR.bits() | 0o755, 0);
            self
        }

        pub fn file(mut self, path: &str) -> Self {
            self.insert(path, SFlag::S_IFREG.bits() | 0o644, 0);
            self
        }

        pub fn device(mut self, path: &str, major: u64, minor: u64) -> Self {
            self.insert(path, SFlag::S_IFCHR.bits() | 0o600, stat::makedev(major, minor));
            self
        }

        /// Creates `path` as a hard link of the existing `existing`.
        pub fn hard_link(mut self, existing: &str, path: &str) -> Self {
            if let Some(attrs) = self.entries.get(Path::new(existing)).copied() {
                self.ensure_parents(Path::new(path));
                self.entries.insert(PathBuf::from(path), attrs);
            }
            self
        }

        pub fn owned_by(mut self, path: &str, uid: u32, gid: u32) -> Self {
            if let Some(attrs) = self.entries.get_mut(Path::new(path)) {
                attrs.uid = uid;
                attrs.gid = gid;
            }
            self
        }

        pub fn object(&self, path: &str) -> Option<ObjectId> {
            self.entries.get(Path::new(path)).map(|attrs| attrs.object)
        }

        fn insert(&mut self, path: &str, mode: u32, rdev: u64) {
            let path = Path::new(path);
            self.ensure_parents(path);
            let attrs = self.new_attributes(mode, rdev);
            self.entries.insert(path.to_path_buf(), attrs);
        }

        fn ensure_parents(&mut self, path: &Path) {
            let parents: Vec<PathBuf> = path
                .ancestors()
                .skip(1)
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .collect();
            for parent in parents.into_iter().rev() {
                if !self.entries.contains_key(&parent) {
                    let attrs = self.new_attributes(SFlag::S_IFDIR.bits() | 0o755, 0);
                    self.entries.insert(parent, attrs);
                }
            }
        }

        fn new_attributes(&mut self, mode: u32, rdev: u64) -> FileAttributes {
            let ino = self.next_ino;
            self.next_ino += 1;
            FileAttributes {
                object: ObjectId { dev: DEV, ino },
                mode,
                uid: 0,
                gid: 0,
                rdev,
            }
        }
    }

    impl FileSystem for MemoryFileSystem {
        fn lookup(&self, path: &Path) -> Option<FileAttributes> {
            self.entries.get(path).copied()
        }
    }
}
