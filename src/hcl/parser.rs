//! Block-level decoding: converts `hcl::Body` structures into
//! `Configuration` fields, evaluating attribute expressions as they're
//! encountered.
//!
//! Grounded on `so0k-oxid::hcl::parser::parse_hcl`'s per-block-kind
//! dispatch (`match block.identifier()`), and on
//! `hcl_expr_to_expression` for AST conversion (now living in
//! `crate::config::expr::from_hcl`).

use std::collections::BTreeMap;

use crate::config::expr::{self, Expression};
use crate::config::types::*;
use crate::error::{CoreError, CoreResult};
use crate::eval::{self, Scope};
use crate::functions::FunctionRegistry;
use crate::hcl::{BlockKind, DecodeSet};
use crate::value::DynValue;

pub fn decode_body(
    body: &hcl::Body,
    decode_set: &DecodeSet,
    cfg: &mut Configuration,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<()> {
    for structure in body.iter() {
        match structure {
            hcl::Structure::Block(block) => {
                decode_block(block, decode_set, cfg, scope, functions)?;
            }
            hcl::Structure::Attribute(attr) => {
                decode_top_level_attribute(attr, cfg, scope, functions)?;
            }
        }
    }
    Ok(())
}

fn decode_top_level_attribute(
    attr: &hcl::Attribute,
    cfg: &mut Configuration,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<()> {
    let value = || eval_attr(attr, scope, functions);
    match attr.key.as_str() {
        "terraform_binary" => cfg.terraform_binary = Some(expr::expr_to_plain_string(&attr.expr)),
        "terraform_version_constraint" => {
            cfg.terraform_version_constraint = Some(expr::expr_to_plain_string(&attr.expr))
        }
        "terragrunt_version_constraint" => {
            cfg.terragrunt_version_constraint = Some(expr::expr_to_plain_string(&attr.expr))
        }
        "download_dir" => cfg.download_dir = Some(expr::expr_to_plain_string(&attr.expr)),
        "prevent_destroy" => cfg.prevent_destroy = expr::expr_to_bool(&attr.expr),
        "skip" => cfg.skip = expr::expr_to_bool(&attr.expr),
        "iam_role" => cfg.iam_role = Some(expr::expr_to_plain_string(&attr.expr)),
        "iam_assume_role_session_name" => {
            cfg.iam_assume_role_session_name = Some(expr::expr_to_plain_string(&attr.expr))
        }
        "iam_assume_role_duration" => {
            cfg.iam_assume_role_duration = expr::expr_to_plain_string(&attr.expr).parse().ok()
        }
        "iam_web_identity_token" => {
            cfg.iam_web_identity_token = Some(expr::expr_to_plain_string(&attr.expr))
        }
        "inputs" => {
            if let DynValue::Object(m) | DynValue::Map(m) = value()? {
                cfg.inputs = m;
            }
        }
        _ => {}
    }
    Ok(())
}

fn eval_attr(attr: &hcl::Attribute, scope: &Scope, functions: &FunctionRegistry) -> CoreResult<DynValue> {
    let expression = expr::from_hcl(&attr.expr);
    eval::eval(&expression, scope, functions)
}

fn eval_expr(e: &hcl::Expression, scope: &Scope, functions: &FunctionRegistry) -> CoreResult<DynValue> {
    eval::eval(&expr::from_hcl(e), scope, functions)
}

fn block_attrs(block: &hcl::Block) -> impl Iterator<Item = &hcl::Attribute> {
    block.body().iter().filter_map(|s| match s {
        hcl::Structure::Attribute(a) => Some(a),
        _ => None,
    })
}

fn block_attr<'a>(block: &'a hcl::Block, name: &str) -> Option<&'a hcl::Attribute> {
    block_attrs(block).find(|a| a.key.as_str() == name)
}

fn decode_block(
    block: &hcl::Block,
    decode_set: &DecodeSet,
    cfg: &mut Configuration,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<()> {
    match block.identifier() {
        "include" if decode_set.wants(BlockKind::Include) => decode_include(block, cfg, scope, functions)?,
        "dependency" if decode_set.wants(BlockKind::Dependency) => {
            decode_dependency(block, cfg, scope, functions)?
        }
        "dependencies" if decode_set.wants(BlockKind::Dependencies) => decode_dependencies(block, cfg),
        "terraform" if decode_set.wants(BlockKind::Terraform) || decode_set.wants(BlockKind::TerraformSource) => {
            decode_terraform(block, cfg, scope, functions)?
        }
        "remote_state" if decode_set.wants(BlockKind::RemoteState) => {
            decode_remote_state(block, cfg, scope, functions)?
        }
        "locals" if decode_set.wants(BlockKind::Locals) => decode_locals(block, cfg, scope, functions)?,
        "feature" if decode_set.wants(BlockKind::FeatureFlags) => decode_feature(block, cfg, scope, functions)?,
        "generate" if decode_set.wants(BlockKind::Generate) => decode_generate(block, cfg, scope, functions)?,
        "engine" if decode_set.wants(BlockKind::Engine) => decode_engine(block, cfg, scope, functions)?,
        "catalog" if decode_set.wants(BlockKind::Catalog) => decode_catalog(block, cfg, scope, functions)?,
        "exclude" if decode_set.wants(BlockKind::Exclude) => decode_exclude(block, cfg, scope, functions)?,
        "errors" if decode_set.wants(BlockKind::Errors) => decode_errors(block, cfg, scope, functions)?,
        _ => {}
    }
    Ok(())
}

fn decode_include(
    block: &hcl::Block,
    cfg: &mut Configuration,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<()> {
    let label = block.labels().first().map(|l| l.as_str().to_string());
    let is_bare = label.is_none();
    let label = label.unwrap_or_else(|| "".to_string());

    let path_expr = block_attr(block, "path")
        .map(|a| expr::from_hcl(&a.expr))
        .unwrap_or_default();
    let expose = block_attr(block, "expose")
        .map(|a| expr::expr_to_bool(&a.expr))
        .unwrap_or(false);
    let merge_strategy = match block_attr(block, "merge_strategy").map(|a| expr::expr_to_plain_string(&a.expr)) {
        None => MergeStrategy::default(),
        Some(s) if s.is_empty() => MergeStrategy::default(),
        Some(s) => MergeStrategy::parse(&s).ok_or(CoreError::InvalidMergeStrategy(s))?,
    };

    // Resolve the path expression now so the include resolver (C5) doesn't
    // need its own copy of the function registry for `find_in_parent_folders`.
    let resolved_path = eval::eval(&path_expr, scope, functions)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string));

    cfg.processed_includes.insert(
        label.clone(),
        IncludeConfig {
            label,
            path: resolved_path
                .clone()
                .map(|p| Expression::Literal(DynValue::String(p)))
                .unwrap_or(path_expr),
            expose,
            merge_strategy,
            is_bare,
        },
    );
    Ok(())
}

fn decode_dependency(
    block: &hcl::Block,
    cfg: &mut Configuration,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<()> {
    let name = block.labels().first().map(|l| l.as_str().to_string()).unwrap_or_default();
    let mut dep = Dependency::new(name);

    if let Some(a) = block_attr(block, "config_path") {
        dep.config_path = expr::from_hcl(&a.expr);
    }
    if let Some(a) = block_attr(block, "enabled") {
        dep.enabled = expr::expr_to_bool(&a.expr);
    }
    if let Some(a) = block_attr(block, "skip_outputs") {
        dep.skip_outputs = expr::expr_to_bool(&a.expr);
    }
    if let Some(a) = block_attr(block, "mock_outputs") {
        dep.mock_outputs = Some(eval_expr(&a.expr, scope, functions)?);
    }
    if let Some(a) = block_attr(block, "mock_outputs_allowed_terraform_commands") {
        dep.mock_allowed_commands = expr::expr_to_string_list(&a.expr);
    }
    if let Some(a) = block_attr(block, "mock_outputs_merge_strategy_with_state") {
        let s = expr::expr_to_plain_string(&a.expr);
        if !s.is_empty() {
            dep.merge_strategy_with_state = Some(MergeStrategy::parse(&s).ok_or(CoreError::InvalidMergeStrategy(s))?);
        }
    }

    cfg.dependencies_block.push(dep);
    Ok(())
}

fn decode_dependencies(block: &hcl::Block, cfg: &mut Configuration) {
    if let Some(a) = block_attr(block, "paths") {
        cfg.static_dependencies = expr::expr_to_string_list(&a.expr);
    }
}

fn decode_terraform(
    block: &hcl::Block,
    cfg: &mut Configuration,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<()> {
    if let Some(a) = block_attr(block, "source") {
        cfg.terraform.source = Some(expr::expr_to_plain_string(&a.expr));
    }
    if let Some(a) = block_attr(block, "include_in_copy") {
        cfg.terraform.include_in_copy = expr::expr_to_string_list(&a.expr);
    }
    if let Some(a) = block_attr(block, "exclude_from_copy") {
        cfg.terraform.exclude_from_copy = expr::expr_to_string_list(&a.expr);
    }
    if let Some(a) = block_attr(block, "copy_terraform_lock_file") {
        cfg.terraform.copy_terraform_lock_file = expr::expr_to_bool(&a.expr);
    }

    for structure in block.body().iter() {
        if let hcl::Structure::Block(inner) = structure {
            let named = decode_named_list_block(inner, scope, functions)?;
            match inner.identifier() {
                "extra_arguments" => cfg.terraform.extra_arguments.push(named),
                "before_hook" => cfg.terraform.before_hooks.push(named),
                "after_hook" => cfg.terraform.after_hooks.push(named),
                "error_hook" => cfg.terraform.error_hooks.push(named),
                _ => {}
            }
        }
    }
    Ok(())
}

fn decode_named_list_block(
    block: &hcl::Block,
    _scope: &Scope,
    _functions: &FunctionRegistry,
) -> CoreResult<NamedListBlock> {
    let name = block.labels().first().map(|l| l.as_str().to_string()).unwrap_or_default();
    let mut named = NamedListBlock {
        name,
        ..Default::default()
    };
    if let Some(a) = block_attr(block, "commands") {
        named.commands = expr::expr_to_string_list(&a.expr);
    }
    if let Some(a) = block_attr(block, "arguments") {
        named.arguments = expr::expr_to_string_list(&a.expr);
    }
    if let Some(a) = block_attr(block, "execute") {
        named.execute = expr::expr_to_string_list(&a.expr);
    }
    if let Some(a) = block_attr(block, "run_on_error") {
        named.run_on_error = expr::expr_to_bool(&a.expr);
    }
    if let Some(a) = block_attr(block, "if_missing_command") {
        named.if_missing_command = expr::expr_to_string_list(&a.expr);
    }
    Ok(named)
}

fn decode_remote_state(
    block: &hcl::Block,
    cfg: &mut Configuration,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<()> {
    let mut rs = RemoteStateBlock::default();
    if let Some(a) = block_attr(block, "backend") {
        rs.backend = Some(expr::expr_to_plain_string(&a.expr));
    }
    if let Some(a) = block_attr(block, "disable_init") {
        rs.disable_init = expr::expr_to_bool(&a.expr);
    }
    if let Some(a) = block_attr(block, "disable_dependency_optimization") {
        rs.disable_dependency_optimization = expr::expr_to_bool(&a.expr);
    }
    if let Some(a) = block_attr(block, "config") {
        if let DynValue::Object(m) | DynValue::Map(m) = eval_expr(&a.expr, scope, functions)? {
            rs.config = m;
        }
    }
    if let Some(a) = block_attr(block, "encryption") {
        if let DynValue::Object(m) | DynValue::Map(m) = eval_expr(&a.expr, scope, functions)? {
            rs.encryption = m;
        }
    }
    for structure in block.body().iter() {
        if let hcl::Structure::Block(inner) = structure {
            if inner.identifier() == "generate" {
                let path = block_attr(inner, "path").map(|a| expr::expr_to_plain_string(&a.expr)).unwrap_or_default();
                let if_exists = block_attr(inner, "if_exists")
                    .map(|a| expr::expr_to_plain_string(&a.expr))
                    .unwrap_or_default();
                rs.generate = Some(GenerateSpec { path, if_exists });
            }
        }
    }

    if rs.backend.is_none() {
        return Err(CoreError::RemoteBackendMissing);
    }
    cfg.remote_state = Some(rs);
    Ok(())
}

/// Two-pass fixpoint for forward references within `locals` (spec §4.7
/// stage 3): repeat evaluation until no new local resolves, or until one
/// full pass makes no progress.
fn decode_locals(
    block: &hcl::Block,
    cfg: &mut Configuration,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<()> {
    let attrs: Vec<&hcl::Attribute> = block_attrs(block).collect();
    let mut resolved: BTreeMap<String, DynValue> = BTreeMap::new();
    let mut last_error: Option<CoreError> = None;

    for _ in 0..attrs.len().max(1) {
        let mut progressed = false;
        let mut local_scope = scope.clone();
        local_scope.bind_map("local", resolved.clone());

        for attr in &attrs {
            if resolved.contains_key(attr.key.as_str()) {
                continue;
            }
            match eval_attr(attr, &local_scope, functions) {
                Ok(v) if !v.is_unknown() => {
                    resolved.insert(attr.key.to_string(), v);
                    progressed = true;
                }
                Ok(_) => {}
                Err(e) => last_error = Some(e),
            }
        }
        if !progressed {
            break;
        }
    }

    if resolved.len() < attrs.len() {
        // Final pass: force-resolve any remaining locals (e.g. ones whose
        // only dependency is itself being absent, which yields Unknown
        // rather than an error) so later stages see a complete map.
        let mut local_scope = scope.clone();
        local_scope.bind_map("local", resolved.clone());
        for attr in &attrs {
            if !resolved.contains_key(attr.key.as_str()) {
                if let Ok(v) = eval_attr(attr, &local_scope, functions) {
                    resolved.insert(attr.key.to_string(), v);
                }
            }
        }
    }

    if let Some(err) = last_error {
        if resolved.len() < attrs.len() {
            return Err(err);
        }
    }

    cfg.locals = resolved;
    Ok(())
}

fn decode_feature(
    block: &hcl::Block,
    cfg: &mut Configuration,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<()> {
    let name = block.labels().first().map(|l| l.as_str().to_string()).unwrap_or_default();
    let default = block_attr(block, "default")
        .map(|a| eval_attr(a, scope, functions))
        .transpose()?
        .unwrap_or(DynValue::Null);
    cfg.feature_flags.push(FeatureFlag { name, default });
    Ok(())
}

fn decode_generate(
    block: &hcl::Block,
    cfg: &mut Configuration,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<()> {
    let name = block.labels().first().map(|l| l.as_str().to_string()).unwrap_or_default();
    let mut g = GenerateBlock {
        name,
        ..Default::default()
    };
    if let Some(a) = block_attr(block, "path") {
        g.path = expr::expr_to_plain_string(&a.expr);
    }
    if let Some(a) = block_attr(block, "if_exists") {
        g.if_exists = expr::expr_to_plain_string(&a.expr);
    }
    if let Some(a) = block_attr(block, "if_disabled") {
        g.if_disabled = expr::expr_to_plain_string(&a.expr);
    }
    if let Some(a) = block_attr(block, "contents") {
        g.contents = eval_attr(a, scope, functions)?.as_str().unwrap_or_default().to_string();
    }
    if let Some(a) = block_attr(block, "comment_prefix") {
        g.comment_prefix = expr::expr_to_plain_string(&a.expr);
    }
    if let Some(a) = block_attr(block, "disable_signature") {
        g.disable_signature = expr::expr_to_bool(&a.expr);
    }
    if let Some(a) = block_attr(block, "disable") {
        g.disable = expr::expr_to_bool(&a.expr);
    }

    if cfg.generate.iter().any(|existing| existing.name == g.name) {
        return Err(CoreError::DuplicatedGenerateBlocks(vec![g.name]));
    }
    cfg.generate.push(g);
    Ok(())
}

fn decode_engine(
    block: &hcl::Block,
    cfg: &mut Configuration,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<()> {
    let mut e = EngineBlock {
        kind: EngineBlock::default_kind(),
        ..Default::default()
    };
    if let Some(a) = block_attr(block, "source") {
        e.source = expr::expr_to_plain_string(&a.expr);
    }
    if let Some(a) = block_attr(block, "version") {
        e.version = Some(expr::expr_to_plain_string(&a.expr));
    }
    if let Some(a) = block_attr(block, "type") {
        e.kind = expr::expr_to_plain_string(&a.expr);
    }
    if let Some(a) = block_attr(block, "meta") {
        if let DynValue::Object(m) | DynValue::Map(m) = eval_attr(a, scope, functions)? {
            e.meta = m;
        }
    }
    cfg.engine = Some(e);
    Ok(())
}

fn decode_catalog(
    block: &hcl::Block,
    cfg: &mut Configuration,
    _scope: &Scope,
    _functions: &FunctionRegistry,
) -> CoreResult<()> {
    let urls = block_attr(block, "urls")
        .map(|a| expr::expr_to_string_list(&a.expr))
        .unwrap_or_default();
    cfg.catalog = Some(CatalogBlock { urls });
    Ok(())
}

fn decode_exclude(
    block: &hcl::Block,
    cfg: &mut Configuration,
    _scope: &Scope,
    _functions: &FunctionRegistry,
) -> CoreResult<()> {
    let mut e = ExcludeBlock::default();
    if let Some(a) = block_attr(block, "if") {
        e.condition = Some(expr::expr_to_bool(&a.expr));
    }
    if let Some(a) = block_attr(block, "actions") {
        e.actions = expr::expr_to_string_list(&a.expr);
    }
    if let Some(a) = block_attr(block, "exclude_dependencies") {
        e.exclude_dependencies = expr::expr_to_bool(&a.expr);
    }
    cfg.exclude = Some(e);
    Ok(())
}

fn decode_errors(
    block: &hcl::Block,
    cfg: &mut Configuration,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<()> {
    let mut errors = ErrorsBlock::default();
    for structure in block.body().iter() {
        if let hcl::Structure::Block(inner) = structure {
            match inner.identifier() {
                "retry" => {
                    let label = inner.labels().first().map(|l| l.as_str().to_string()).unwrap_or_default();
                    let mut r = RetryBlock {
                        label,
                        ..Default::default()
                    };
                    if let Some(a) = block_attr(inner, "retryable_errors") {
                        r.retryable_errors = expr::expr_to_string_list(&a.expr);
                    }
                    if let Some(a) = block_attr(inner, "max_attempts") {
                        r.max_attempts = expr::expr_to_plain_string(&a.expr).parse().unwrap_or(0);
                    }
                    if let Some(a) = block_attr(inner, "sleep_interval_sec") {
                        r.sleep_interval_sec = expr::expr_to_plain_string(&a.expr).parse().unwrap_or(0);
                    }
                    errors.retry.push(r);
                }
                "ignore" => {
                    let label = inner.labels().first().map(|l| l.as_str().to_string()).unwrap_or_default();
                    let mut i = IgnoreBlock {
                        label,
                        ..Default::default()
                    };
                    if let Some(a) = block_attr(inner, "ignorable_errors") {
                        i.ignorable_errors = expr::expr_to_string_list(&a.expr);
                    }
                    if let Some(a) = block_attr(inner, "message") {
                        i.message = expr::expr_to_plain_string(&a.expr);
                    }
                    if let Some(a) = block_attr(inner, "signals") {
                        if let DynValue::Object(m) | DynValue::Map(m) = eval_attr(a, scope, functions)? {
                            i.signals = m;
                        }
                    }
                    errors.ignore.push(i);
                }
                _ => {}
            }
        }
    }
    cfg.errors = Some(errors);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;
    use std::path::PathBuf;

    fn parse(src: &str) -> hcl::Body {
        hcl::from_str(src).unwrap()
    }

    #[test]
    fn decodes_minimal_remote_state() {
        let body = parse(r#"remote_state { backend = "s3" }"#);
        let scope = Scope::new();
        let functions = FunctionRegistry::with_no_session_hooks();
        let cfg = crate::hcl::decode(
            &body,
            &DecodeSet::all(),
            PathBuf::from("/unit/terragrunt.hcl"),
            &scope,
            &functions,
        )
        .unwrap();
        assert_eq!(cfg.remote_state.unwrap().backend.as_deref(), Some("s3"));
    }

    #[test]
    fn missing_backend_is_an_error() {
        let body = parse("remote_state {}");
        let scope = Scope::new();
        let functions = FunctionRegistry::with_no_session_hooks();
        let result = crate::hcl::decode(
            &body,
            &DecodeSet::all(),
            PathBuf::from("/unit/terragrunt.hcl"),
            &scope,
            &functions,
        );
        assert!(matches!(result, Err(CoreError::RemoteBackendMissing)));
    }

    #[test]
    fn decodes_dependency_block_with_mocks() {
        let body = parse(
            r#"
            dependency "d" {
              config_path = "../d"
              mock_outputs = { x = 1 }
              mock_outputs_allowed_terraform_commands = ["validate"]
            }
            "#,
        );
        let scope = Scope::new();
        let functions = FunctionRegistry::with_no_session_hooks();
        let cfg = crate::hcl::decode(
            &body,
            &DecodeSet::all(),
            PathBuf::from("/unit/terragrunt.hcl"),
            &scope,
            &functions,
        )
        .unwrap();
        assert_eq!(cfg.dependencies_block.len(), 1);
        assert_eq!(cfg.dependencies_block[0].mock_allowed_commands, vec!["validate".to_string()]);
    }

    #[test]
    fn locals_fixpoint_resolves_forward_reference() {
        let body = parse(
            r#"
            locals {
              b = "${local.a}-suffix"
              a = "value"
            }
            "#,
        );
        let scope = Scope::new();
        let functions = FunctionRegistry::with_no_session_hooks();
        let cfg = crate::hcl::decode(
            &body,
            &DecodeSet::all(),
            PathBuf::from("/unit/terragrunt.hcl"),
            &scope,
            &functions,
        )
        .unwrap();
        assert_eq!(cfg.locals.get("b"), Some(&DynValue::String("value-suffix".to_string())));
    }

    #[test]
    fn duplicate_generate_blocks_error() {
        let body = parse(
            r#"
            generate "backend" { path = "a.tf" if_exists = "overwrite" }
            generate "backend" { path = "b.tf" if_exists = "overwrite" }
            "#,
        );
        let scope = Scope::new();
        let functions = FunctionRegistry::with_no_session_hooks();
        let result = crate::hcl::decode(
            &body,
            &DecodeSet::all(),
            PathBuf::from("/unit/terragrunt.hcl"),
            &scope,
            &functions,
        );
        assert!(matches!(result, Err(CoreError::DuplicatedGenerateBlocks(_))));
    }
}
