//! Error taxonomy for the configuration resolution core (spec §7).

use std::path::PathBuf;

use thiserror::Error;

/// Every fallible operation in the core returns this type.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("config not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("could not resolve config at {0}: decoded to nil")]
    CouldNotResolveConfig(PathBuf),

    #[error("too many levels of inheritance: parent {parent} of {child} itself has an include")]
    TooManyLevelsOfInheritance { child: PathBuf, parent: PathBuf },

    #[error("dependency cycle detected: {}", .0.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(" -> "))]
    DependencyCycle(Vec<PathBuf>),

    #[error("dependency config not found: {0}")]
    DependencyConfigNotFound(PathBuf),

    #[error("dependency '{name}' at {path} has no outputs and no usable mocks")]
    TerragruntOutputTargetNoOutputs { name: String, path: PathBuf },

    #[error("failed to parse tool output for '{name}': {reason}")]
    OutputParsingError { name: String, reason: String },

    #[error("invalid merge strategy: {0}")]
    InvalidMergeStrategy(String),

    #[error("duplicated generate blocks: {}", .0.join(", "))]
    DuplicatedGenerateBlocks(Vec<String>),

    #[error("dependency directories not found: {}", .0.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    DependencyDirNotFound(Vec<PathBuf>),

    #[error("invalid source URL for source map rewrite: {0}")]
    InvalidSourceURLWithMap(String),

    #[error("'{name}' not found in any parent folder above {start}")]
    ParentFileNotFound { name: String, start: PathBuf },

    #[error("invalid parameter type: expected {expected}, got {actual}")]
    InvalidParameterType { expected: String, actual: String },

    #[error("invalid value encoding: {0}")]
    InvalidValueEncoding(String),

    #[error("remote_state block is missing required attribute 'backend'")]
    RemoteBackendMissing,

    #[error("hcl parse error in {path}: {source}")]
    HclParse {
        path: PathBuf,
        #[source]
        source: hcl::Error,
    },

    #[error("io error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// A collector for the "accumulate within a stage" propagation policy of §7:
/// later stages are only skipped once a fatal error is recorded.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<CoreError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: CoreError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result<T>(self, ok: T) -> CoreResult<T> {
        if self.errors.is_empty() {
            Ok(ok)
        } else {
            Err(CoreError::Other(
                self.errors
                    .into_iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            ))
        }
    }
}
