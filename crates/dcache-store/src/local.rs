use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use dcache_crypto::ContentHasher;
use dcache_types::{TypeId, VersionStamp};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::codec::{self, SnapshotHeader};
use crate::error::{StoreError, StoreResult};
use crate::snapshot::EntrySnapshot;

/// File extension of stored snapshots.
pub const SNAPSHOT_EXTENSION: &str = "dce";

/// Directory of entry snapshots, one file per entity type.
///
/// Files are named by the 128-bit content digest of the type's qualified
/// name, so re-inserting a type overwrites its previous snapshot. Writes go to
/// a temporary file in the same directory and are published with an atomic
/// rename; concurrent readers see either the old or the new snapshot.
///
/// Enumeration skips files that fail to decode. Inserts report failure as
/// `false`; a file locked by another process is an expected outcome and is
/// not logged.
#[derive(Clone, Debug)]
pub struct LocalSnapshotStore {
    dir: PathBuf,
}

impl LocalSnapshotStore {
    /// A store rooted at `dir`. The directory is created on first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot file for `type_id`, whether or not it exists.
    pub fn entry_path(&self, type_id: &TypeId) -> PathBuf {
        let digest = ContentHasher::type_digest(type_id);
        self.dir
            .join(format!("{}.{SNAPSHOT_EXTENSION}", digest.to_hex()))
    }

    /// Version stamps of every readable snapshot, decoding headers only.
    pub fn entry_versions(&self) -> StoreResult<impl Iterator<Item = VersionStamp>> {
        let files = self.snapshot_files()?;
        Ok(files.into_iter().filter_map(|path| match read_header_at(&path) {
            Ok(SnapshotHeader {
                type_id: Some(type_id),
                version,
            }) => Some(VersionStamp::new(type_id, version)),
            Ok(_) => {
                warn!(path = ?path, "skipping snapshot without type identity");
                None
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "skipping corrupt snapshot header");
                None
            }
        }))
    }

    /// Locally held version of `type_id`, if a readable snapshot exists.
    pub fn version_of(&self, type_id: &TypeId) -> Option<VersionStamp> {
        let path = self.entry_path(type_id);
        match read_header_at(&path) {
            Ok(header) => Some(VersionStamp::new(type_id.clone(), header.version)),
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(type_id = %type_id, error = %e, "ignoring unreadable snapshot");
                None
            }
        }
    }

    /// Every readable snapshot in the store.
    pub fn entries(&self) -> StoreResult<impl Iterator<Item = EntrySnapshot>> {
        let files = self.snapshot_files()?;
        Ok(files.into_iter().filter_map(|path| match read_snapshot_at(&path) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = ?path, error = %e, "skipping corrupt snapshot");
                None
            }
        }))
    }

    /// Readable snapshots of `types`, in the given order. Types without a
    /// stored snapshot are skipped.
    pub fn entries_for<'a>(
        &'a self,
        types: &'a [TypeId],
    ) -> impl Iterator<Item = EntrySnapshot> + 'a {
        types.iter().filter_map(move |type_id| match self.get(type_id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(type_id = %type_id, error = %e, "skipping corrupt snapshot");
                None
            }
        })
    }

    /// The stored snapshot of `type_id`, or `None` if there is none.
    pub fn get(&self, type_id: &TypeId) -> StoreResult<Option<EntrySnapshot>> {
        match read_snapshot_at(&self.entry_path(type_id)) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize `snapshot` and publish it under its type.
    pub fn insert(&self, snapshot: &mut EntrySnapshot) -> bool {
        let Some(type_id) = snapshot.type_id().cloned() else {
            warn!("cannot store a snapshot without type identity");
            return false;
        };
        let result = self.publish(&type_id, |out| snapshot.write_to(out).map(|_| ()));
        self.report(&type_id, result)
    }

    /// Publish already-serialized snapshot bytes under `stamp`'s type. The
    /// payload's header must name the same type.
    pub fn insert_stream(&self, stamp: &VersionStamp, data: &mut dyn Read) -> bool {
        let result = self.publish(&stamp.type_id, |out| {
            io::copy(data, out)?;
            Ok(())
        });
        self.report(&stamp.type_id, result)
    }

    /// Delete the snapshot of `type_id`. Returns `false` if none was stored.
    pub fn remove(&self, type_id: &TypeId) -> StoreResult<bool> {
        match fs::remove_file(self.entry_path(type_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_dir(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Snapshot files in name order.
    fn snapshot_files(&self) -> StoreResult<Vec<PathBuf>> {
        self.ensure_dir()?;
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == SNAPSHOT_EXTENSION).unwrap_or(false) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn publish<F>(&self, type_id: &TypeId, write: F) -> StoreResult<()>
    where
        F: FnOnce(&mut dyn Write) -> StoreResult<()>,
    {
        self.ensure_dir()?;
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut out = BufWriter::new(temp.as_file_mut());
            write(&mut out)?;
            out.flush()?;
        }
        temp.as_file().sync_all()?;

        let header = codec::read_header(BufReader::new(temp.reopen()?))?;
        if header.type_id.as_ref() != Some(type_id) {
            return Err(StoreError::TypeMismatch {
                expected: type_id.clone(),
                actual: header.type_id,
            });
        }

        let path = self.entry_path(type_id);
        temp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        debug!(type_id = %type_id, version = %header.version, path = ?path, "published snapshot");
        Ok(())
    }

    fn report(&self, type_id: &TypeId, result: StoreResult<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(StoreError::Io(e)) if is_lock_violation(&e) => false,
            Err(e) => {
                warn!(type_id = %type_id, error = %e, "failed to store snapshot");
                false
            }
        }
    }
}

fn read_header_at(path: &Path) -> StoreResult<SnapshotHeader> {
    codec::read_header(BufReader::new(File::open(path)?))
}

fn read_snapshot_at(path: &Path) -> StoreResult<EntrySnapshot> {
    let file = File::open(path)?;
    EntrySnapshot::read_from(BufReader::new(file)).map_err(|e| StoreError::CorruptFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

// ERROR_SHARING_VIOLATION and ERROR_LOCK_VIOLATION.
#[cfg(windows)]
fn is_lock_violation(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(32 | 33))
}

#[cfg(not(windows))]
fn is_lock_violation(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}
