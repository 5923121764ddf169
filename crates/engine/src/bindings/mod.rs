//! Data bindings between the outputs of one step and the inputs of another.
//!
//! [`DataBindingModel`] holds the editable state of the mapping editor;
//! [`BindingRepository`] implementations load and save it as a
//! [`MappingDocument`](testbench_types::MappingDocument).

use std::path::PathBuf;

use thiserror::Error;

pub mod model;
pub mod store;

pub use model::{DataBindingModel, Selection};
pub use store::{BindingRepository, FileBindingRepository, InMemoryBindingRepository};

/// Errors raised by binding edits and repositories.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("no source output with path '{0}'")]
    UnknownSource(String),
    #[error("no target input named '{0}'")]
    UnknownTarget(String),
    #[error("no binding with id '{0}'")]
    UnknownBinding(String),
    #[error("mapping file I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("mapping file {} is not valid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("mapping file {} is not valid YAML: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
