use super::documents::{file_extension, is_supported_file, TextExtractor};
use crate::error::{RagError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file stored in a session's knowledgebase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeFile {
    pub name: String,
    pub path: PathBuf,
    /// Last modification time in epoch millis.
    pub last_modified: i64,
}

impl KnowledgeFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RagError::Knowledgebase {
                file_name: path.display().to_string(),
                message: "File name is not valid UTF-8".to_string(),
            })?
            .to_string();
        let modified = fs::metadata(path)?.modified()?;

        Ok(Self {
            name,
            path: path.to_path_buf(),
            last_modified: DateTime::<Utc>::from(modified).timestamp_millis(),
        })
    }
}

/// Source of the current knowledgebase listing.
pub trait FileLister: Send + Sync {
    fn list(&self) -> Result<Vec<KnowledgeFile>>;
}

/// Lists the regular files directly inside a directory, sorted by name.
#[derive(Debug, Clone)]
pub struct DirectoryLister {
    dir: PathBuf,
}

impl DirectoryLister {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FileLister for DirectoryLister {
    fn list(&self) -> Result<Vec<KnowledgeFile>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
            if entry.file_type().is_file() {
                files.push(KnowledgeFile::from_path(entry.path())?);
            }
        }

        Ok(files)
    }
}

/// The directory of resource files backing one session.
#[derive(Debug, Clone)]
pub struct Knowledgebase {
    session_id: String,
    dir: PathBuf,
}

impl Knowledgebase {
    /// Opens (creating if needed) `<root>/<session_id>`.
    pub fn open(root: &Path, session_id: &str) -> Result<Self> {
        let dir = root.join(session_id);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            session_id: session_id.to_string(),
            dir,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lister(&self) -> DirectoryLister {
        DirectoryLister::new(&self.dir)
    }

    pub fn list_files(&self) -> Result<Vec<KnowledgeFile>> {
        self.lister().list()
    }

    pub fn file_count(&self) -> Result<usize> {
        Ok(self.list_files()?.len())
    }

    pub fn file(&self, name: &str) -> Result<Option<KnowledgeFile>> {
        let path = self.resolve(name)?;
        if path.is_file() {
            Ok(Some(KnowledgeFile::from_path(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Copies `source` into the knowledgebase under its own file name.
    ///
    /// Unsupported formats and names already present are rejected.
    pub fn import_file(&self, source: &Path) -> Result<KnowledgeFile> {
        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        if !is_supported_file(&file_name) {
            return Err(RagError::Knowledgebase {
                file_name: file_name.clone(),
                message: format!("Unsupported file format: .{}", file_extension(&file_name)),
            });
        }

        let destination = self.resolve(&file_name)?;
        if destination.exists() {
            return Err(RagError::Knowledgebase {
                file_name,
                message: "File already exists".to_string(),
            });
        }

        fs::copy(source, &destination).map_err(|e| RagError::Knowledgebase {
            file_name: file_name.clone(),
            message: format!("Failed to copy file: {}", e),
        })?;
        tracing::info!(session_id = %self.session_id, file = %file_name, "Imported resource");

        KnowledgeFile::from_path(&destination)
    }

    /// Deletes a stored file, returning whether it existed.
    pub fn delete_file(&self, name: &str) -> Result<bool> {
        let path = self.resolve(name)?;
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        tracing::info!(session_id = %self.session_id, file = %name, "Deleted resource");
        Ok(true)
    }

    pub fn read_content(&self, name: &str, extractor: &dyn TextExtractor) -> Result<String> {
        let file = self.file(name)?.ok_or_else(|| RagError::Knowledgebase {
            file_name: name.to_string(),
            message: "File not found".to_string(),
        })?;
        extractor.read(&file)
    }

    /// Deletes the whole session directory.
    pub fn remove_all(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
            tracing::info!(session_id = %self.session_id, "Removed knowledgebase folder");
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        // bare file names only, nothing that walks out of the session folder
        if name.is_empty() || Path::new(name).file_name().and_then(|n| n.to_str()) != Some(name) {
            return Err(RagError::Knowledgebase {
                file_name: name.to_string(),
                message: "Invalid file name".to_string(),
            });
        }
        Ok(self.dir.join(name))
    }
}

impl FileLister for Knowledgebase {
    fn list(&self) -> Result<Vec<KnowledgeFile>> {
        self.list_files()
    }
}
