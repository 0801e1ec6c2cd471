//! Merge algebra (spec §4.5): combining a parent `Configuration` and a
//! child `Configuration` under one of the four named strategies.
//!
//! Grounded on `so0k-oxid::hcl::merge_workspace`'s field-by-field,
//! extend-based merge, generalized from "always concatenate" into the
//! strategy-dispatched rules of spec §4.5.3-§4.5.4.

use std::collections::BTreeMap;

use crate::config::types::{Configuration, NamedListBlock};
use crate::value::DynValue;

pub use crate::config::types::MergeStrategy;

/// Merge `child` onto `parent`, producing the result per spec §4.5.
///
/// `locals` are never merged (invariant 2): the result always carries the
/// child's locals untouched, regardless of strategy.
pub fn merge(parent: &Configuration, child: &Configuration, strategy: MergeStrategy) -> Configuration {
    if strategy == MergeStrategy::NoMerge {
        return child.clone();
    }

    let mut out = child.clone();

    out.terraform_binary = child.terraform_binary.clone().or_else(|| parent.terraform_binary.clone());
    out.terraform_version_constraint = child
        .terraform_version_constraint
        .clone()
        .or_else(|| parent.terraform_version_constraint.clone());
    out.terragrunt_version_constraint = child
        .terragrunt_version_constraint
        .clone()
        .or_else(|| parent.terragrunt_version_constraint.clone());
    out.download_dir = child.download_dir.clone().or_else(|| parent.download_dir.clone());
    out.prevent_destroy = child.prevent_destroy || parent.prevent_destroy;
    out.skip = child.skip || parent.skip;

    out.iam_role = child.iam_role.clone().or_else(|| parent.iam_role.clone());
    out.iam_assume_role_session_name = child
        .iam_assume_role_session_name
        .clone()
        .or_else(|| parent.iam_assume_role_session_name.clone());
    out.iam_assume_role_duration = child.iam_assume_role_duration.or(parent.iam_assume_role_duration);
    out.iam_web_identity_token = child
        .iam_web_identity_token
        .clone()
        .or_else(|| parent.iam_web_identity_token.clone());

    out.inputs = merge_maps(&parent.inputs, &child.inputs, strategy);
    // Locals are explicitly NOT merged (invariant 2): `out.locals` stays `child.locals`.

    out.terraform.source = child.terraform.source.clone().or_else(|| parent.terraform.source.clone());
    out.terraform.copy_terraform_lock_file = child.terraform.copy_terraform_lock_file
        || parent.terraform.copy_terraform_lock_file;
    out.terraform.include_in_copy = merge_lists(
        &parent.terraform.include_in_copy,
        &child.terraform.include_in_copy,
        strategy,
    );
    out.terraform.exclude_from_copy = merge_lists(
        &parent.terraform.exclude_from_copy,
        &child.terraform.exclude_from_copy,
        strategy,
    );
    out.terraform.extra_arguments = merge_named_lists(
        &parent.terraform.extra_arguments,
        &child.terraform.extra_arguments,
    );
    out.terraform.before_hooks = merge_named_lists(&parent.terraform.before_hooks, &child.terraform.before_hooks);
    out.terraform.after_hooks = merge_named_lists(&parent.terraform.after_hooks, &child.terraform.after_hooks);
    out.terraform.error_hooks = merge_named_lists(&parent.terraform.error_hooks, &child.terraform.error_hooks);

    out.remote_state = match (&parent.remote_state, &child.remote_state) {
        (Some(p), Some(c)) => Some(merge_remote_state(p, c, strategy)),
        (Some(p), None) => Some(p.clone()),
        (None, c) => c.clone(),
    };

    out.static_dependencies = merge_lists(&parent.static_dependencies, &child.static_dependencies, strategy);

    out.feature_flags = merge_by_key(&parent.feature_flags, &child.feature_flags, |f| f.name.clone());
    out.generate = merge_by_key(&parent.generate, &child.generate, |g| g.name.clone());

    out.catalog = child.catalog.clone().or_else(|| parent.catalog.clone());
    out.engine = child.engine.clone().or_else(|| parent.engine.clone());
    out.exclude = child.exclude.clone().or_else(|| parent.exclude.clone());

    out
}

fn merge_lists(parent: &[String], child: &[String], strategy: MergeStrategy) -> Vec<String> {
    match strategy {
        MergeStrategy::Deep => {
            let mut v = parent.to_vec();
            v.extend(child.iter().cloned());
            v
        }
        _ => {
            if child.is_empty() {
                parent.to_vec()
            } else {
                child.to_vec()
            }
        }
    }
}

/// The hook/extra-args by-name override rule (spec §4.5.4): parent-only
/// items first, then overlapping items (child's value, parent's position),
/// then child-only items.
fn merge_named_lists(parent: &[NamedListBlock], child: &[NamedListBlock]) -> Vec<NamedListBlock> {
    let mut result = Vec::new();
    let mut consumed_child = std::collections::HashSet::new();

    for p in parent {
        if let Some(c) = child.iter().find(|c| c.name == p.name) {
            result.push(c.clone());
            consumed_child.insert(c.name.clone());
        } else {
            result.push(p.clone());
        }
    }
    for c in child {
        if !consumed_child.contains(&c.name) {
            result.push(c.clone());
        }
    }
    result
}

fn merge_by_key<T: Clone>(parent: &[T], child: &[T], key: impl Fn(&T) -> String) -> Vec<T> {
    let mut result = Vec::new();
    let mut consumed_child = std::collections::HashSet::new();
    for p in parent {
        if let Some(c) = child.iter().find(|c| key(c) == key(p)) {
            result.push(c.clone());
            consumed_child.insert(key(c));
        } else {
            result.push(p.clone());
        }
    }
    for c in child {
        if !consumed_child.contains(&key(c)) {
            result.push(c.clone());
        }
    }
    result
}

fn merge_remote_state(
    parent: &crate::config::types::RemoteStateBlock,
    child: &crate::config::types::RemoteStateBlock,
    strategy: MergeStrategy,
) -> crate::config::types::RemoteStateBlock {
    let mut out = child.clone();
    out.backend = child.backend.clone().or_else(|| parent.backend.clone());
    out.disable_init = child.disable_init || parent.disable_init;
    out.disable_dependency_optimization = child.disable_dependency_optimization || parent.disable_dependency_optimization;
    out.generate = child.generate.clone().or_else(|| parent.generate.clone());
    out.config = merge_maps(&parent.config, &child.config, strategy);
    out.encryption = merge_maps(&parent.encryption, &child.encryption, strategy);
    out
}

/// §4.5.3: `shallow` replaces the map wholesale with the child's; `deep`
/// recursively merges nested objects, child wins on scalar conflicts;
/// `deep_map_only` merges like deep but replaces (does not concatenate)
/// list-typed values.
pub fn merge_maps(
    parent: &BTreeMap<String, DynValue>,
    child: &BTreeMap<String, DynValue>,
    strategy: MergeStrategy,
) -> BTreeMap<String, DynValue> {
    match strategy {
        MergeStrategy::Shallow | MergeStrategy::NoMerge => {
            if child.is_empty() {
                parent.clone()
            } else {
                child.clone()
            }
        }
        MergeStrategy::Deep | MergeStrategy::DeepMapOnly => {
            let mut out = parent.clone();
            for (k, cv) in child {
                match (out.get(k), cv) {
                    (Some(DynValue::Object(pm)), DynValue::Object(cm)) => {
                        out.insert(k.clone(), DynValue::Object(merge_maps(pm, cm, strategy)));
                    }
                    (Some(DynValue::Map(pm)), DynValue::Map(cm)) => {
                        out.insert(k.clone(), DynValue::Map(merge_maps(pm, cm, strategy)));
                    }
                    (Some(DynValue::List(pv)), DynValue::List(cv_list))
                        if strategy == MergeStrategy::Deep =>
                    {
                        let mut merged = pv.clone();
                        merged.extend(cv_list.iter().cloned());
                        out.insert(k.clone(), DynValue::List(merged));
                    }
                    _ => {
                        out.insert(k.clone(), cv.clone());
                    }
                }
            }
            out
        }
    }
}
