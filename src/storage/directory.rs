//! A filesystem backed source of item declarations
//!
//! The [`Directory`] walks a tree of YAML record files. Each file is one
//! document: a sequence of [`RawItem`] records. The path of the file relative
//! to the root, with `/` separators, is the document identifier.

use std::{
    ffi::OsStr,
    fs, io,
    path::{Component, Path, PathBuf},
};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, instrument, trace};
use walkdir::WalkDir;

use crate::domain::{ChangeSet, DocumentId, RawItem};

/// A directory of item record files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    root: PathBuf,
}

/// A record file could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryLoadError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The offending file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// The file is not a sequence of item records.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// The offending file.
        path: PathBuf,
        /// The underlying error.
        source: serde_yaml::Error,
    },

    /// The file does not live under the directory root.
    #[error("{} is not inside {}", path.display(), root.display())]
    OutsideRoot {
        /// The offending file.
        path: PathBuf,
        /// The directory root.
        root: PathBuf,
    },
}

impl Directory {
    /// Opens a directory at the given path.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The directory root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads every record file under the root.
    ///
    /// Files are parsed in parallel. Hidden files and directories are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns the error of the first file (in document order) that cannot be
    /// read or parsed.
    #[instrument(level = "debug", skip(self), fields(root = %self.root.display()))]
    pub fn scan(&self) -> Result<ChangeSet, DirectoryLoadError> {
        let paths = collect_record_paths(&self.root);
        debug!(files = paths.len(), "found record files");
        self.load(&paths)
    }

    /// Re-loads the given record files.
    ///
    /// A file that no longer exists yields an empty document, which removes it
    /// from the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if a path lies outside the root, or if an existing
    /// file cannot be read or parsed.
    #[instrument(level = "debug", skip(self))]
    pub fn rescan(&self, paths: &[PathBuf]) -> Result<ChangeSet, DirectoryLoadError> {
        let mut paths = paths.to_vec();
        paths.sort();
        self.load(&paths)
    }

    fn load(&self, paths: &[PathBuf]) -> Result<ChangeSet, DirectoryLoadError> {
        let loaded: Vec<_> = paths
            .par_iter()
            .map(|path| self.load_document(path))
            .collect();
        loaded.into_iter().collect()
    }

    /// The document identifier of a record file.
    ///
    /// # Errors
    ///
    /// Returns an error if the path lies outside the root.
    pub fn document_id(&self, path: &Path) -> Result<DocumentId, DirectoryLoadError> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| DirectoryLoadError::OutsideRoot {
                path: path.to_path_buf(),
                root: self.root.clone(),
            })?;
        let parts: Vec<_> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect();
        Ok(DocumentId::new(parts.join("/")))
    }

    fn load_document(&self, path: &Path) -> Result<(DocumentId, Vec<RawItem>), DirectoryLoadError> {
        let document = self.document_id(path)?;

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(%document, "file removed");
                return Ok((document, Vec::new()));
            }
            Err(source) => {
                return Err(DirectoryLoadError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok((document, Vec::new()));
        }

        let items: Vec<RawItem> =
            serde_yaml::from_str(&content).map_err(|source| DirectoryLoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        trace!(%document, items = items.len(), "loaded");
        Ok((document, items))
    }
}

fn is_record_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(OsStr::to_str),
        Some("yaml" | "yml")
    )
}

fn collect_record_paths(root: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_record_file(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    paths.sort();
    paths
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn setup() -> (TempDir, Directory) {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let root = tmp.path().to_path_buf();
        write(
            &root,
            "system.yaml",
            "
- id: SYS-1
  type: requirement
  level: system
  links:
    satisfies: [STK-1]
- type: rationale
",
        );
        write(
            &root,
            "nested/stakeholder.yml",
            "- { id: STK-1, type: requirement, level: stakeholder }\n",
        );
        write(&root, "empty.yaml", "\n");
        write(&root, "notes.txt", "not records");
        write(&root, ".hidden/ignored.yaml", "not: [valid");
        (tmp, Directory::new(root))
    }

    #[test]
    fn scans_every_record_file() {
        let (_tmp, directory) = setup();
        let changes = directory.scan().unwrap();

        let documents: Vec<_> = changes
            .iter()
            .map(|(document, items)| (document.as_str(), items.len()))
            .collect();
        assert_eq!(
            documents,
            [
                ("empty.yaml", 0),
                ("nested/stakeholder.yml", 1),
                ("system.yaml", 2)
            ]
        );

        let (_, system) = changes
            .iter()
            .find(|(document, _)| document.as_str() == "system.yaml")
            .unwrap();
        assert_eq!(system[0].links["satisfies"], ["STK-1"]);
        assert_eq!(system[1].id, None);
    }

    #[test]
    fn parse_errors_name_the_file() {
        let (tmp, directory) = setup();
        write(tmp.path(), "broken.yaml", "- id: [unterminated");

        let error = directory.scan().unwrap_err();
        assert!(matches!(error, DirectoryLoadError::Parse { .. }));
        assert!(error.to_string().contains("broken.yaml"));
    }

    #[test]
    fn rescan_of_a_deleted_file_removes_the_document() {
        let (tmp, directory) = setup();
        let path = tmp.path().join("system.yaml");
        fs::remove_file(&path).unwrap();

        let changes = directory.rescan(&[path]).unwrap();
        let documents: Vec<_> = changes
            .iter()
            .map(|(document, items)| (document.as_str(), items.is_empty()))
            .collect();
        assert_eq!(documents, [("system.yaml", true)]);
    }

    #[test]
    fn paths_outside_the_root_are_rejected() {
        let (_tmp, directory) = setup();
        let other = TempDir::new().unwrap();
        let path = write(other.path(), "elsewhere.yaml", "[]");

        assert!(matches!(
            directory.rescan(&[path]),
            Err(DirectoryLoadError::OutsideRoot { .. })
        ));
    }
}
