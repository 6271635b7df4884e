//! Atomic file replacement.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Sibling path used while a file is being written.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// A complete file parked at its temp path. [`Staged::commit`] renames it
/// over the target; dropping it uncommitted deletes it.
#[derive(Debug)]
pub struct Staged {
    path: PathBuf,
    tmp: PathBuf,
    committed: bool,
}

impl Staged {
    pub(crate) fn new(path: PathBuf, tmp: PathBuf) -> Self {
        Self {
            path,
            tmp,
            committed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn commit(mut self) -> Result<PathBuf> {
        fs::rename(&self.tmp, &self.path).map_err(|e| Error::io(&self.path, e))?;
        self.committed = true;
        Ok(std::mem::take(&mut self.path))
    }
}

impl Drop for Staged {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// Writes `bytes` next to `path` without touching `path` itself.
pub fn write_staged(path: &Path, bytes: &[u8]) -> Result<Staged> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let tmp = temp_path(path);
    let staged = Staged::new(path.to_path_buf(), tmp.clone());
    let mut file = fs::File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
    file.write_all(bytes).map_err(|e| Error::io(&tmp, e))?;
    file.sync_all().map_err(|e| Error::io(&tmp, e))?;
    Ok(staged)
}

/// Writes `bytes` next to `path` and renames the result over `path`, so
/// readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_staged(path, bytes)?.commit().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dropped_stage_leaves_the_target_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("site.graph.json");
        fs::write(&path, "old").unwrap();

        let staged = write_staged(&path, b"new").unwrap();
        assert!(temp_path(&path).exists());
        drop(staged);
        assert!(!temp_path(&path).exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");

        let staged = write_staged(&path, b"new").unwrap();
        assert_eq!(staged.commit().unwrap(), path);
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(!temp_path(&path).exists());
    }
}
