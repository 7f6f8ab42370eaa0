use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use stowage_backend::{BackendConfig, BackendKind};

use crate::error::AppError;
use crate::i18n::Language;

/// The persisted outcome of a completed wizard session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub backend_type: BackendKind,
    pub backend_config: BackendConfig,
    pub repository: RepositoryState,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryState {
    /// The backup engine has not created a repository at the destination yet.
    pub initialized: bool,
    pub created_at: DateTime<Utc>,
    /// Last successful connection test, if one was run.
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub created_by: String,
    pub version: String,
    pub language: String,
}

impl ConfigDocument {
    pub fn new(
        config: BackendConfig,
        language: Language,
        last_check: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            backend_type: config.kind,
            backend_config: config,
            repository: RepositoryState {
                initialized: false,
                created_at: Utc::now(),
                last_check,
            },
            metadata: DocumentMetadata {
                created_by: "stowage".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                language: language.code().to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
}

impl DocumentStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the document next to its final location, then rename it into
    /// place so readers never see a partial file. Credentials live in the
    /// document, so it is only readable by the owner.
    pub fn save(&self, document: &ConfigDocument) -> Result<PathBuf, AppError> {
        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|error| AppError::document_save_failed("create directory", error))?;

        let content = serde_json::to_string_pretty(document)
            .map_err(|error| AppError::document_save_failed("serialize", error))?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|error| AppError::document_save_failed("create temp file", error))?;
        temp.write_all(content.as_bytes())
            .and_then(|()| temp.write_all(b"\n"))
            .map_err(|error| AppError::document_save_failed("write", error))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|error| AppError::document_save_failed("set permissions", error))?;
        }

        temp.as_file()
            .sync_all()
            .map_err(|error| AppError::document_save_failed("sync", error))?;
        temp.persist(&self.path)
            .map_err(|error| AppError::document_save_failed("rename", error.error))?;

        info!("Saved configuration to {}", self.path.display());
        Ok(self.path.clone())
    }

    pub fn load(&self) -> Result<ConfigDocument, AppError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::document_missing(&self.path));
            }
            Err(error) => return Err(AppError::document_load_failed(error)),
        };
        debug!("Loading configuration from {}", self.path.display());
        serde_json::from_str(&content).map_err(AppError::document_load_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigDocument, DocumentStore};
    use crate::error::AppError;
    use crate::i18n::Language;
    use stowage_backend::{BackendConfig, BackendKind};

    fn document() -> ConfigDocument {
        ConfigDocument::new(
            BackendConfig::new(BackendKind::CloudSync)
                .with_path("gdrive:kopia-repository")
                .with_credential("rclone_config", "/home/op/.config/rclone/rclone.conf"),
            Language::De,
            None,
        )
    }

    #[test]
    fn saved_document_loads_back() {
        let root = tempfile::tempdir().expect("temporary directory should be created");
        let store = DocumentStore::new(root.path().join("config").join("repository.json"));
        let original = document();

        let path = store.save(&original).expect("document saves");

        assert_eq!(path, store.path());
        assert_eq!(store.load().expect("document loads"), original);
    }

    #[test]
    fn document_layout_uses_expected_keys() {
        let value = serde_json::to_value(document()).expect("document serializes");

        assert_eq!(value["backend_type"], "cloud-sync");
        assert_eq!(value["backend_config"]["repository_path"], "gdrive:kopia-repository");
        assert_eq!(value["repository"]["initialized"], false);
        assert!(value["repository"]["last_check"].is_null());
        assert_eq!(value["metadata"]["created_by"], "stowage");
        assert_eq!(value["metadata"]["language"], "de");
    }

    #[cfg(unix)]
    #[test]
    fn document_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().expect("temporary directory should be created");
        let store = DocumentStore::new(root.path().join("repository.json"));

        store.save(&document()).expect("document saves");

        let mode = std::fs::metadata(store.path())
            .expect("document exists")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn overwrite_leaves_no_temp_files() {
        let root = tempfile::tempdir().expect("temporary directory should be created");
        let store = DocumentStore::new(root.path().join("repository.json"));

        store.save(&document()).expect("first save");
        store.save(&document()).expect("second save");

        let entries = std::fs::read_dir(root.path())
            .expect("directory readable")
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn missing_and_corrupt_documents_are_distinguished() {
        let root = tempfile::tempdir().expect("temporary directory should be created");
        let store = DocumentStore::new(root.path().join("repository.json"));

        assert!(matches!(store.load(), Err(AppError::DocumentMissing { .. })));

        std::fs::write(store.path(), "{\"backend_type\":").expect("corrupt file written");

        assert!(matches!(
            store.load(),
            Err(AppError::DocumentLoadFailed { .. })
        ));
    }
}
