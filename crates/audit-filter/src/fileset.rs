//! Named paths used by `PREFIX` predicates.
//!
//! Every entry caches the identity of the object its path denotes. The cache
//! is stamped with the [Fileset] generation it was filled in: bumping the
//! generation after each evaluated event invalidates all entries at once, and
//! the next match resolves them again.

use std::{
    path::Path,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use vigil_core::ObjectId;

use crate::fs::FileSystem;

#[derive(Debug, Default)]
pub struct Fileset {
    generation: AtomicU64,
}

#[derive(Debug)]
pub struct FilesetEntry {
    name: String,
    resolved: Mutex<Option<Resolved>>,
}

#[derive(Debug, Clone, Copy)]
struct Resolved {
    generation: u64,
    object: Option<ObjectId>,
}

/// Outcome of matching a candidate path against an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch {
    None,
    /// Same name, or a descendant of the entry.
    Name,
    /// Another name of the entry's object: the candidate should be reported
    /// under the entry's name.
    HardLink,
}

impl FilesetEntry {
    pub fn new(name: String) -> Self {
        Self {
            name,
            resolved: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn object(&self, generation: u64, fs: &dyn FileSystem) -> Option<ObjectId> {
        let mut resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        match *resolved {
            Some(cached) if cached.generation == generation => cached.object,
            _ => {
                let object = fs.lookup(Path::new(&self.name)).map(|attrs| attrs.object);
                log::trace!("fileset entry {} resolved to {:?}", self.name, object);
                *resolved = Some(Resolved { generation, object });
                object
            }
        }
    }

    #[cfg(test)]
    fn is_resolved(&self, generation: u64) -> bool {
        matches!(
            *self.resolved.lock().unwrap_or_else(PoisonError::into_inner),
            Some(cached) if cached.generation == generation
        )
    }
}

impl Fileset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Drop every resolved handle. Called once per evaluated event since the
    /// filesystem may have changed in the meantime.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Does `candidate` match `entry`?
    ///
    /// A candidate which was never resolved (`lookup` absent) always
    /// matches. Otherwise the candidate matches on exact name, on object
    /// identity (hard links) or when one of its ancestor directories is the
    /// entry's object.
    pub fn matches(
        &self,
        entry: &FilesetEntry,
        candidate: &str,
        candidate_object: Option<Option<ObjectId>>,
        fs: &dyn FileSystem,
    ) -> PathMatch {
        let Some(candidate_object) = candidate_object else {
            return PathMatch::Name;
        };

        let entry_object = entry.object(self.generation(), fs);

        if candidate == entry.name {
            return PathMatch::Name;
        }

        let Some(entry_object) = entry_object else {
            return PathMatch::None;
        };

        if candidate_object == Some(entry_object) {
            return PathMatch::HardLink;
        }

        let under_entry = Path::new(candidate)
            .ancestors()
            .skip(1)
            .filter(|dir| !dir.as_os_str().is_empty())
            .filter_map(|dir| fs.lookup(dir))
            .any(|attrs| attrs.object == entry_object);

        if under_entry {
            PathMatch::Name
        } else {
            PathMatch::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    fn fs() -> MemoryFileSystem {
        MemoryFileSystem::new()
            .file("/etc/passwd")
            .file("/etc/ssh/sshd_config")
            .file("/tmp/passwd")
            .hard_link("/etc/passwd", "/home/user/pw")
    }

    #[test]
    fn unresolved_candidate_matches() {
        let fs = fs();
        let fileset = Fileset::new();
        let entry = FilesetEntry::new("/etc".to_string());
        assert_eq!(fileset.matches(&entry, "/tmp/passwd", None, &fs), PathMatch::Name);
    }

    #[test]
    fn name_and_ancestor() {
        let fs = fs();
        let fileset = Fileset::new();
        let entry = FilesetEntry::new("/etc".to_string());

        let passwd = fs.object("/etc/passwd");
        assert_eq!(
            fileset.matches(&entry, "/etc", fs.object("/etc").map(Some), &fs),
            PathMatch::Name
        );
        assert_eq!(
            fileset.matches(&entry, "/etc/passwd", Some(passwd), &fs),
            PathMatch::Name
        );
        assert_eq!(
            fileset.matches(&entry, "/etc/ssh/sshd_config", Some(fs.object("/etc/ssh/sshd_config")), &fs),
            PathMatch::Name
        );
        // negative entry, the parent directory decides
        assert_eq!(
            fileset.matches(&entry, "/etc/newfile", Some(None), &fs),
            PathMatch::Name
        );
        assert_eq!(
            fileset.matches(&entry, "/tmp/passwd", Some(fs.object("/tmp/passwd")), &fs),
            PathMatch::None
        );
        // shares a string prefix, not a directory
        assert_eq!(
            fileset.matches(&entry, "/etcetera/x", Some(None), &fs),
            PathMatch::None
        );
    }

    #[test]
    fn hard_link() {
        let fs = fs();
        let fileset = Fileset::new();
        let entry = FilesetEntry::new("/etc/passwd".to_string());

        assert_eq!(
            fileset.matches(&entry, "/home/user/pw", Some(fs.object("/home/user/pw")), &fs),
            PathMatch::HardLink
        );
    }

    #[test]
    fn missing_entry_only_matches_by_name() {
        let fs = fs();
        let fileset = Fileset::new();
        let entry = FilesetEntry::new("/srv/data".to_string());

        assert_eq!(
            fileset.matches(&entry, "/srv/data", Some(None), &fs),
            PathMatch::Name
        );
        assert_eq!(
            fileset.matches(&entry, "/srv/data/file", Some(None), &fs),
            PathMatch::None
        );
    }

    #[test]
    fn invalidation() {
        let fs = fs();
        let fileset = Fileset::new();
        let entry = FilesetEntry::new("/etc".to_string());

        fileset.matches(&entry, "/etc/passwd", Some(fs.object("/etc/passwd")), &fs);
        assert!(entry.is_resolved(fileset.generation()));

        fileset.invalidate();
        assert!(!entry.is_resolved(fileset.generation()));

        fileset.matches(&entry, "/etc/passwd", Some(fs.object("/etc/passwd")), &fs);
        assert!(entry.is_resolved(fileset.generation()));
    }
}
