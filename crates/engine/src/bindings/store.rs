use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use testbench_types::MappingDocument;
use tracing::debug;

use super::BindingError;

/// Storage for a mapping document, injected into whatever edits bindings.
pub trait BindingRepository: Send + Sync {
    fn load(&self) -> Result<MappingDocument, BindingError>;
    fn save(&self, document: &MappingDocument) -> Result<(), BindingError>;
}

/// Keeps the document in memory.
#[derive(Debug, Default)]
pub struct InMemoryBindingRepository {
    document: Mutex<MappingDocument>,
}

impl InMemoryBindingRepository {
    pub fn new(document: MappingDocument) -> Self {
        Self {
            document: Mutex::new(document),
        }
    }
}

impl BindingRepository for InMemoryBindingRepository {
    fn load(&self) -> Result<MappingDocument, BindingError> {
        let document = self.document.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(document.clone())
    }

    fn save(&self, document: &MappingDocument) -> Result<(), BindingError> {
        let mut stored = self.document.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *stored = document.clone();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Json,
    Yaml,
}

/// Mapping document stored on disk as pretty JSON, or YAML for `.yaml`/`.yml` files.
#[derive(Debug, Clone)]
pub struct FileBindingRepository {
    path: PathBuf,
}

impl FileBindingRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> FileFormat {
        match self.path.extension().and_then(|extension| extension.to_str()) {
            Some(extension) if extension.eq_ignore_ascii_case("yaml") || extension.eq_ignore_ascii_case("yml") => FileFormat::Yaml,
            _ => FileFormat::Json,
        }
    }

    fn io_error(&self, source: std::io::Error) -> BindingError {
        BindingError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl BindingRepository for FileBindingRepository {
    fn load(&self) -> Result<MappingDocument, BindingError> {
        let data = fs::read_to_string(&self.path).map_err(|source| self.io_error(source))?;
        match self.format() {
            FileFormat::Json => serde_json::from_str(&data).map_err(|source| BindingError::Json {
                path: self.path.clone(),
                source,
            }),
            FileFormat::Yaml => serde_yaml::from_str(&data).map_err(|source| BindingError::Yaml {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn save(&self, document: &MappingDocument) -> Result<(), BindingError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let data = match self.format() {
            FileFormat::Json => serde_json::to_string_pretty(document).map_err(|source| BindingError::Json {
                path: self.path.clone(),
                source,
            })?,
            FileFormat::Yaml => serde_yaml::to_string(document).map_err(|source| BindingError::Yaml {
                path: self.path.clone(),
                source,
            })?,
        };
        fs::write(&self.path, data).map_err(|source| self.io_error(source))?;
        debug!(path = %self.path.display(), bindings = document.bindings.len(), "saved mapping document");
        Ok(())
    }
}
