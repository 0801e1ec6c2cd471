//! Partial parser (C4, spec §4.4) and HCL file loading.
//!
//! Grounded on `so0k-oxid::hcl::parse_directory`'s block-dispatch loop,
//! narrowed from "parse everything" to "parse only the requested decode
//! set", per spec §4.4.

pub mod parser;

use std::path::{Path, PathBuf};

use crate::config::types::Configuration;
use crate::error::{CoreError, CoreResult};
use crate::eval::Scope;
use crate::functions::FunctionRegistry;

/// The block kinds a partial parse may decode (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Include,
    Dependency,
    Dependencies,
    Terraform,
    TerraformSource,
    RemoteState,
    FeatureFlags,
    Engine,
    TerragruntFlags,
    TerragruntVersionConstraints,
    Locals,
    Generate,
    Catalog,
    Exclude,
    Errors,
    Inputs,
}

/// A subset of [`BlockKind`] to decode; undecoded sections are left at
/// their `Default` value and never raise diagnostics (spec §4.4).
#[derive(Debug, Clone)]
pub struct DecodeSet(std::collections::HashSet<BlockKind>);

impl DecodeSet {
    pub fn only(kinds: &[BlockKind]) -> Self {
        Self(kinds.iter().copied().collect())
    }

    pub fn all() -> Self {
        Self::only(&[
            BlockKind::Include,
            BlockKind::Dependency,
            BlockKind::Dependencies,
            BlockKind::Terraform,
            BlockKind::TerraformSource,
            BlockKind::RemoteState,
            BlockKind::FeatureFlags,
            BlockKind::Engine,
            BlockKind::TerragruntFlags,
            BlockKind::TerragruntVersionConstraints,
            BlockKind::Locals,
            BlockKind::Generate,
            BlockKind::Catalog,
            BlockKind::Exclude,
            BlockKind::Errors,
            BlockKind::Inputs,
        ])
    }

    pub fn wants(&self, kind: BlockKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_full(&self) -> bool {
        self.0.len() == Self::all().0.len()
    }
}

/// Read and parse a unit file into a raw `hcl::Body`, the first half of
/// spec §4.7 stage 1 (the cache lookup wrapping this call lives in
/// `crate::orchestrator`).
pub fn parse_file(path: &Path) -> CoreResult<hcl::Body> {
    let content = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    hcl::from_str(&content).map_err(|source| CoreError::HclParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode the requested `decode_set` from `body` into a `Configuration`,
/// evaluating attribute expressions against `scope`/`functions` as they're
/// encountered. Fields outside `decode_set` are left at their defaults and
/// no diagnostic is raised for them (spec §4.4).
pub fn decode(
    body: &hcl::Body,
    decode_set: &DecodeSet,
    source_path: PathBuf,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<Configuration> {
    let mut cfg = Configuration::new(source_path);
    cfg.is_partial = !decode_set.is_full();
    parser::decode_body(body, decode_set, &mut cfg, scope, functions)?;
    Ok(cfg)
}

pub mod mtime {
    use std::path::Path;

    /// Microsecond-resolution mtime, used in the cache key of invariant 7.
    pub fn mtime_micros(path: &Path) -> Option<i64> {
        let meta = std::fs::metadata(path).ok()?;
        let modified = meta.modified().ok()?;
        let dur = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
        Some(dur.as_micros() as i64)
    }
}
