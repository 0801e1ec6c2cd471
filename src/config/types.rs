//! The materialized configuration data model (spec §3).
//!
//! Grounded on `so0k-oxid::config::types`, whose `WorkspaceConfig` /
//! `TerraformBlock` struct shapes this module generalizes from a
//! single-purpose Terraform-workspace record into the full unit
//! configuration of spec §3.1-3.3.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::expr::Expression;
use crate::value::DynValue;

/// One merge strategy among the four named in spec §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    NoMerge,
    #[default]
    Shallow,
    Deep,
    DeepMapOnly,
}

impl MergeStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no_merge" => Some(Self::NoMerge),
            "shallow" => Some(Self::Shallow),
            "deep" => Some(Self::Deep),
            "deep_map_only" => Some(Self::DeepMapOnly),
            _ => None,
        }
    }
}

/// spec §3.2.
#[derive(Debug, Clone, Default)]
pub struct IncludeConfig {
    pub label: String,
    pub path: Expression,
    pub expose: bool,
    pub merge_strategy: MergeStrategy,
    /// Set when the include omitted a label (deprecated bare include).
    pub is_bare: bool,
}

/// spec §3.3.
#[derive(Debug, Clone, Default)]
pub struct Dependency {
    pub name: String,
    pub config_path: Expression,
    pub enabled: bool,
    pub skip_outputs: bool,
    pub mock_outputs: Option<DynValue>,
    pub mock_allowed_commands: Vec<String>,
    pub merge_strategy_with_state: Option<MergeStrategy>,
    pub rendered_outputs: Option<DynValue>,
    pub inputs_snapshot: Option<DynValue>,
}

impl Dependency {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            ..Default::default()
        }
    }
}

/// An `extra_arguments` or `before_hook`/`after_hook`/`error_hook` block;
/// all three share the same by-name override merge rule (spec §4.5.4).
#[derive(Debug, Clone, Default)]
pub struct NamedListBlock {
    pub name: String,
    pub commands: Vec<String>,
    pub arguments: Vec<String>,
    pub execute: Vec<String>,
    pub run_on_error: bool,
    pub if_missing_command: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionBlock {
    pub source: Option<String>,
    pub include_in_copy: Vec<String>,
    pub exclude_from_copy: Vec<String>,
    pub copy_terraform_lock_file: bool,
    pub extra_arguments: Vec<NamedListBlock>,
    pub before_hooks: Vec<NamedListBlock>,
    pub after_hooks: Vec<NamedListBlock>,
    pub error_hooks: Vec<NamedListBlock>,
}

#[derive(Debug, Clone, Default)]
pub struct RemoteStateBlock {
    pub backend: Option<String>,
    pub disable_init: bool,
    pub disable_dependency_optimization: bool,
    pub generate: Option<GenerateSpec>,
    pub config: BTreeMap<String, DynValue>,
    pub encryption: BTreeMap<String, DynValue>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateSpec {
    pub path: String,
    pub if_exists: String,
}

/// spec §3.1's *Generate blocks*.
#[derive(Debug, Clone, Default)]
pub struct GenerateBlock {
    pub name: String,
    pub path: String,
    pub if_exists: String,
    pub if_disabled: String,
    pub contents: String,
    pub comment_prefix: String,
    pub disable_signature: bool,
    pub disable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureFlag {
    pub name: String,
    pub default: DynValue,
}

#[derive(Debug, Clone, Default)]
pub struct RetryBlock {
    pub label: String,
    pub retryable_errors: Vec<String>,
    pub max_attempts: u32,
    pub sleep_interval_sec: u32,
}

#[derive(Debug, Clone, Default)]
pub struct IgnoreBlock {
    pub label: String,
    pub ignorable_errors: Vec<String>,
    pub message: String,
    pub signals: BTreeMap<String, DynValue>,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorsBlock {
    pub retry: Vec<RetryBlock>,
    pub ignore: Vec<IgnoreBlock>,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogBlock {
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EngineBlock {
    pub source: String,
    pub version: Option<String>,
    pub kind: String,
    pub meta: BTreeMap<String, DynValue>,
}

impl EngineBlock {
    pub fn default_kind() -> String {
        "rpc".to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExcludeBlock {
    pub condition: Option<bool>,
    pub actions: Vec<String>,
    pub exclude_dependencies: bool,
}

/// Where a given field's value was ultimately sourced from, for
/// explain/render-json support (spec §3.1 "Field metadata").
#[derive(Debug, Clone)]
pub struct FieldOrigin {
    pub field: String,
    pub origin_file: PathBuf,
}

/// The materialized result of parsing one unit file (spec §3.1).
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    // Identity
    pub source_path: PathBuf,
    pub is_partial: bool,

    // Execution controls
    pub terraform_binary: Option<String>,
    pub terraform_version_constraint: Option<String>,
    pub terragrunt_version_constraint: Option<String>,
    pub download_dir: Option<String>,
    pub prevent_destroy: bool,
    pub skip: bool,

    // Credential hints
    pub iam_role: Option<String>,
    pub iam_assume_role_session_name: Option<String>,
    pub iam_assume_role_duration: Option<i64>,
    pub iam_web_identity_token: Option<String>,

    pub inputs: BTreeMap<String, DynValue>,
    /// Scoped: never merged across `include` (invariant 2).
    pub locals: BTreeMap<String, DynValue>,

    pub terraform: ExecutionBlock,
    pub remote_state: Option<RemoteStateBlock>,
    pub dependencies_block: Vec<Dependency>,
    pub static_dependencies: Vec<String>,
    pub generate: Vec<GenerateBlock>,
    pub feature_flags: Vec<FeatureFlag>,
    pub errors: Option<ErrorsBlock>,
    pub catalog: Option<CatalogBlock>,
    pub engine: Option<EngineBlock>,
    pub exclude: Option<ExcludeBlock>,

    pub processed_includes: BTreeMap<String, IncludeConfig>,
    pub field_origins: Vec<FieldOrigin>,
}

impl Configuration {
    pub fn new(source_path: PathBuf) -> Self {
        Self {
            source_path,
            ..Default::default()
        }
    }

    pub fn dependency_names(&self) -> Vec<&str> {
        self.dependencies_block.iter().map(|d| d.name.as_str()).collect()
    }

    /// Invariant 5: no two generate blocks share a label.
    pub fn duplicated_generate_labels(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut dups = Vec::new();
        for g in &self.generate {
            if !seen.insert(g.name.clone()) {
                dups.push(g.name.clone());
            }
        }
        dups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicated_generate_labels_detects_repeats() {
        let mut cfg = Configuration::new(PathBuf::from("/unit/terragrunt.hcl"));
        cfg.generate.push(GenerateBlock {
            name: "backend".to_string(),
            ..Default::default()
        });
        cfg.generate.push(GenerateBlock {
            name: "backend".to_string(),
            ..Default::default()
        });
        assert_eq!(cfg.duplicated_generate_labels(), vec!["backend".to_string()]);
    }

    #[test]
    fn merge_strategy_parses_known_strings() {
        assert_eq!(MergeStrategy::parse("deep"), Some(MergeStrategy::Deep));
        assert_eq!(MergeStrategy::parse("bogus"), None);
    }
}
