//! Storage collaborator: where documents are opened from and saved to.
//!
//! Implementations return `Ok(None)` when the user cancels a picker; that is
//! not an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is not valid UTF-8 text")]
    NotText,

    #[error("storage does not support this operation: {0}")]
    Unsupported(String),
}

/// Opaque locator of a previously used storage location. Holding one does
/// not keep anything open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHandle(Arc<str>);

impl FileHandle {
    pub fn new(locator: impl AsRef<str>) -> Self {
        Self(Arc::from(locator.as_ref()))
    }

    pub fn locator(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerOptions {
    pub id: String,
    pub description: String,
    pub extensions: Vec<String>,
    pub content_type: String,
}

impl PickerOptions {
    pub fn problem_files() -> Self {
        Self {
            id: "problem".to_string(),
            description: "Graph problem".to_string(),
            extensions: vec![".problem".to_string()],
            content_type: "text/x-problem".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedFile {
    pub name: String,
    pub handle: FileHandle,
    pub text: String,
}

/// Result of a successful "save as". `handle` is absent when the storage
/// could write the data but cannot offer a location to write to again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub name: String,
    pub handle: Option<FileHandle>,
}

#[async_trait]
pub trait Storage: Send + Sync + 'static {
    async fn open(&self, options: &PickerOptions) -> Result<Option<OpenedFile>, StorageError>;

    async fn save(&self, handle: &FileHandle, text: &str) -> Result<(), StorageError>;

    async fn save_as(
        &self,
        text: &str,
        suggested_name: &str,
        options: &PickerOptions,
    ) -> Result<Option<SavedFile>, StorageError>;
}

/// What a picker is being asked to choose
#[derive(Debug, Clone, Copy)]
pub enum PickRequest<'a> {
    Open {
        options: &'a PickerOptions,
    },
    SaveAs {
        suggested_name: &'a str,
        options: &'a PickerOptions,
    },
}

type Picker = dyn Fn(PickRequest<'_>) -> Option<PathBuf> + Send + Sync;

/// Storage on the local filesystem. Locations are chosen by a picker
/// callback; returning `None` from it means the user cancelled.
pub struct LocalFileStorage {
    picker: Box<Picker>,
}

impl LocalFileStorage {
    pub fn new(picker: impl Fn(PickRequest<'_>) -> Option<PathBuf> + Send + Sync + 'static) -> Self {
        Self {
            picker: Box::new(picker),
        }
    }

    fn handle_for(path: &Path) -> FileHandle {
        FileHandle::new(path.to_string_lossy())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[async_trait]
impl Storage for LocalFileStorage {
    async fn open(&self, options: &PickerOptions) -> Result<Option<OpenedFile>, StorageError> {
        let Some(path) = (self.picker)(PickRequest::Open { options }) else {
            return Ok(None);
        };
        let bytes = tokio::fs::read(&path).await?;
        let text = String::from_utf8(bytes).map_err(|_| StorageError::NotText)?;
        Ok(Some(OpenedFile {
            name: file_name(&path),
            handle: Self::handle_for(&path),
            text,
        }))
    }

    async fn save(&self, handle: &FileHandle, text: &str) -> Result<(), StorageError> {
        tokio::fs::write(handle.locator(), text).await?;
        Ok(())
    }

    async fn save_as(
        &self,
        text: &str,
        suggested_name: &str,
        options: &PickerOptions,
    ) -> Result<Option<SavedFile>, StorageError> {
        let Some(path) = (self.picker)(PickRequest::SaveAs {
            suggested_name,
            options,
        }) else {
            return Ok(None);
        };
        tokio::fs::write(&path, text).await?;
        Ok(Some(SavedFile {
            name: file_name(&path),
            handle: Some(Self::handle_for(&path)),
        }))
    }
}

/// File name without its last extension.
pub fn simple_name(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(index) => &file_name[..index],
        None => file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_reads_picked_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("family.problem");
        std::fs::write(&path, "class Person.").unwrap();

        let picked = path.clone();
        let storage = LocalFileStorage::new(move |_| Some(picked.clone()));
        let opened = storage
            .open(&PickerOptions::problem_files())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(opened.name, "family.problem");
        assert_eq!(opened.text, "class Person.");
        assert_eq!(opened.handle.locator(), path.to_string_lossy());
    }

    #[tokio::test]
    async fn cancelled_picker_is_not_an_error() {
        let storage = LocalFileStorage::new(|_| None);
        let options = PickerOptions::problem_files();
        assert!(storage.open(&options).await.unwrap().is_none());
        assert!(storage
            .save_as("text", "graph.problem", &options)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn save_as_then_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().to_path_buf();
        let storage = LocalFileStorage::new(move |request| match request {
            PickRequest::SaveAs { suggested_name, .. } => Some(target.join(suggested_name)),
            PickRequest::Open { .. } => None,
        });

        let saved = storage
            .save_as("first", "graph.problem", &PickerOptions::problem_files())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.name, "graph.problem");

        let handle = saved.handle.unwrap();
        storage.save(&handle, "second").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("graph.problem")).unwrap(),
            "second"
        );
    }

    #[tokio::test]
    async fn open_rejects_binary_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.problem");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let storage = LocalFileStorage::new(move |_| Some(path.clone()));
        let err = storage
            .open(&PickerOptions::problem_files())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotText));
    }

    #[test]
    fn simple_name_strips_last_extension() {
        assert_eq!(simple_name("graph.problem"), "graph");
        assert_eq!(simple_name("archive.tar.gz"), "archive.tar");
        assert_eq!(simple_name("README"), "README");
    }
}
