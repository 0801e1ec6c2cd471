//! Include resolver (C5, spec §4.5).
//!
//! Grounded on `so0k-oxid::hcl::merge_workspace`'s "parse each contributing
//! file, then fold it into the accumulator" shape; folding here is
//! strategy-dispatched through `crate::merge` instead of always
//! concatenating.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::types::{Configuration, IncludeConfig};
use crate::error::{CoreError, CoreResult};
use crate::hcl::DecodeSet;
use crate::merge;
use crate::strict::{self, StrictControls};

/// Recursive re-entry into the orchestrator (C7), abstracted behind a
/// trait so `crate::include` doesn't need to depend on `crate::orchestrator`
/// directly. `crate::orchestrator::Orchestrator` implements this.
#[async_trait]
pub trait ParentResolver: Send + Sync {
    async fn parse_parent(&self, path: &PathBuf, decode_set: &DecodeSet) -> CoreResult<Configuration>;
}

/// Resolve and merge every include recorded on `cfg` (normally zero or
/// one, per invariant 1), returning the merged configuration. `cfg`'s own
/// includes remain recorded in `processed_includes` for `expose` lookups.
pub async fn resolve_includes(
    cfg: Configuration,
    decode_set: &DecodeSet,
    strict: &StrictControls,
    resolver: &dyn ParentResolver,
) -> CoreResult<(Configuration, Vec<(String, Configuration)>)> {
    if cfg.processed_includes.is_empty() {
        return Ok((cfg, Vec::new()));
    }

    let mut merged = cfg.clone();
    let mut exposed = Vec::new();

    for (label, include) in &cfg.processed_includes {
        if include.is_bare {
            strict.evaluate(strict::BARE_INCLUDE, &cfg.source_path.display().to_string())?;
        }

        let parent_path = include_path(include)?;
        let parent = resolver.parse_parent(&parent_path, decode_set).await?;

        // Invariant 1: the parent itself must not have an include.
        if !parent.processed_includes.is_empty() {
            return Err(CoreError::TooManyLevelsOfInheritance {
                child: cfg.source_path.clone(),
                parent: parent_path,
            });
        }

        merged = merge::merge(&parent, &merged, include.merge_strategy);

        if include.expose {
            exposed.push((label.clone(), parent));
        }
    }

    Ok((merged, exposed))
}

fn include_path(include: &IncludeConfig) -> CoreResult<PathBuf> {
    match &include.path {
        crate::config::expr::Expression::Literal(crate::value::DynValue::String(s)) => {
            Ok(PathBuf::from(s))
        }
        _ => Err(CoreError::Other(format!(
            "include '{}' path did not resolve to a string",
            include.label
        ))),
    }
}
