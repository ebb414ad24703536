use crate::docstore::DocStore;
use crate::error::IngestError;
use crate::index::FlatIndex;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, warn};

pub const INDEX_FILE_NAME: &str = "index.faiss";
pub const DOCSTORE_FILE_NAME: &str = "docstore.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexArtifacts {
    pub dir: PathBuf,
    pub index_path: PathBuf,
    pub docstore_path: PathBuf,
}

impl IndexArtifacts {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            index_path: dir.join(INDEX_FILE_NAME),
            docstore_path: dir.join(DOCSTORE_FILE_NAME),
        }
    }
}

/// Writes the index and docstore into `output_dir` as a pair.
///
/// Both files are written and synced under temporary names first; only then are they
/// renamed into place. Any earlier failure drops the temporaries and leaves whatever pair
/// was there before untouched. If a rename fails, the previous pair is moved back.
///
/// # Panics
///
/// When the index and docstore lengths differ.
pub fn persist_pair(
    index: &FlatIndex,
    docstore: &DocStore,
    output_dir: &Path,
) -> Result<IndexArtifacts, IngestError> {
    assert_eq!(
        index.len(),
        docstore.len(),
        "index rows and docstore records must stay aligned"
    );

    fs::create_dir_all(output_dir)?;
    let artifacts = IndexArtifacts::in_dir(output_dir);

    let mut index_tmp = staging_file(output_dir, INDEX_FILE_NAME)?;
    index.write_to(BufWriter::new(index_tmp.as_file_mut()))?;
    index_tmp.as_file().sync_all()?;

    let mut docstore_tmp = staging_file(output_dir, DOCSTORE_FILE_NAME)?;
    docstore.write_json(BufWriter::new(docstore_tmp.as_file_mut()))?;
    docstore_tmp.as_file().sync_all()?;

    let index_backup = set_aside(&artifacts.index_path, INDEX_FILE_NAME)?;
    let docstore_backup = match set_aside(&artifacts.docstore_path, DOCSTORE_FILE_NAME) {
        Ok(backup) => backup,
        Err(error) => {
            restore(index_backup, &artifacts.index_path);
            return Err(error);
        }
    };

    let committed = commit(index_tmp, &artifacts.index_path)
        .and_then(|()| commit(docstore_tmp, &artifacts.docstore_path));
    if let Err(error) = committed {
        // Never leave a new index next to a stale docstore: put the previous pair back.
        if let Err(cleanup) = fs::remove_file(&artifacts.index_path) {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %artifacts.index_path.display(), %cleanup, "failed to remove orphaned index");
            }
        }
        restore(index_backup, &artifacts.index_path);
        restore(docstore_backup, &artifacts.docstore_path);
        return Err(error);
    }

    for backup in [index_backup, docstore_backup].into_iter().flatten() {
        if let Err(error) = fs::remove_file(&backup) {
            warn!(path = %backup.display(), %error, "failed to remove previous artifact");
        }
    }

    sync_dir(output_dir);
    debug!(dir = %output_dir.display(), rows = index.len(), "persisted index pair");
    Ok(artifacts)
}

fn staging_file(dir: &Path, name: &str) -> Result<NamedTempFile, IngestError> {
    Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|error| IngestError::Persist {
            path: dir.join(name),
            reason: error.to_string(),
        })
}

/// Moves an existing artifact out of the way so it can be restored if the commit fails.
fn set_aside(target: &Path, name: &str) -> Result<Option<PathBuf>, IngestError> {
    if !target.is_file() {
        return Ok(None);
    }
    let backup = target.with_file_name(format!(".{name}.prev"));
    fs::rename(target, &backup).map_err(|error| IngestError::Persist {
        path: target.to_path_buf(),
        reason: format!("cannot set previous file aside: {error}"),
    })?;
    Ok(Some(backup))
}

fn restore(backup: Option<PathBuf>, target: &Path) {
    if let Some(backup) = backup {
        if let Err(error) = fs::rename(&backup, target) {
            warn!(path = %target.display(), backup = %backup.display(), %error, "failed to restore previous artifact");
        }
    }
}

fn commit(staged: NamedTempFile, target: &Path) -> Result<(), IngestError> {
    staged
        .persist(target)
        .map(|_| ())
        .map_err(|error| IngestError::Persist {
            path: target.to_path_buf(),
            reason: error.error.to_string(),
        })
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(error) = fs::File::open(dir).and_then(|handle| handle.sync_all()) {
        debug!(dir = %dir.display(), %error, "directory sync skipped");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
