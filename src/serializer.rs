//! Configuration serializer (C8, spec §4.8): produces the dynamic value
//! handed back by `read_terragrunt_config` and by exposed `include.<label>`
//! bindings.
//!
//! Grounded on `so0k-oxid::state::models`'s record-to-JSON shape, adapted
//! from a single flat struct into the label-keyed transposition spec §4.8
//! requires for block lists.

use std::collections::BTreeMap;

use crate::config::types::{
    Configuration, Dependency, ErrorsBlock, ExecutionBlock, FeatureFlag, GenerateBlock, IncludeConfig, NamedListBlock,
};
use crate::value::DynValue;

/// Serialize a materialized [`Configuration`] into its dynamic-value form.
/// Absent optional fields are omitted from the resulting object rather than
/// encoded as `Null` (spec §4.8: "Absent fields yield `NilVal` and are
/// omitted").
pub fn serialize(cfg: &Configuration) -> DynValue {
    let mut out = BTreeMap::new();

    insert_opt(&mut out, "terraform_binary", cfg.terraform_binary.as_deref());
    insert_opt(&mut out, "terraform_version_constraint", cfg.terraform_version_constraint.as_deref());
    insert_opt(&mut out, "terragrunt_version_constraint", cfg.terragrunt_version_constraint.as_deref());
    insert_opt(&mut out, "download_dir", cfg.download_dir.as_deref());
    out.insert("prevent_destroy".to_string(), DynValue::Bool(cfg.prevent_destroy));
    out.insert("skip".to_string(), DynValue::Bool(cfg.skip));
    insert_opt(&mut out, "iam_role", cfg.iam_role.as_deref());
    insert_opt(&mut out, "iam_assume_role_session_name", cfg.iam_assume_role_session_name.as_deref());
    if let Some(duration) = cfg.iam_assume_role_duration {
        out.insert("iam_assume_role_duration".to_string(), DynValue::Number(duration as f64));
    }
    insert_opt(&mut out, "iam_web_identity_token", cfg.iam_web_identity_token.as_deref());

    if !cfg.inputs.is_empty() {
        out.insert("inputs".to_string(), DynValue::Object(cfg.inputs.clone()));
    }
    if !cfg.locals.is_empty() {
        out.insert("locals".to_string(), DynValue::Object(cfg.locals.clone()));
    }

    out.insert("terraform".to_string(), serialize_terraform(&cfg.terraform));

    if let Some(remote_state) = &cfg.remote_state {
        out.insert("remote_state".to_string(), serialize_remote_state(remote_state));
    }

    if !cfg.dependencies_block.is_empty() {
        out.insert(
            "dependency".to_string(),
            DynValue::Object(cfg.dependencies_block.iter().map(|d| (d.name.clone(), serialize_dependency(d))).collect()),
        );
    }
    if !cfg.static_dependencies.is_empty() {
        out.insert(
            "dependencies".to_string(),
            DynValue::Object(BTreeMap::from([(
                "paths".to_string(),
                DynValue::List(cfg.static_dependencies.iter().cloned().map(DynValue::String).collect()),
            )])),
        );
    }

    if !cfg.generate.is_empty() {
        out.insert(
            "generate".to_string(),
            DynValue::Object(cfg.generate.iter().map(|g| (g.name.clone(), serialize_generate(g))).collect()),
        );
    }

    if !cfg.feature_flags.is_empty() {
        out.insert(
            "feature".to_string(),
            DynValue::Object(cfg.feature_flags.iter().map(|f| (f.name.clone(), serialize_feature_flag(f))).collect()),
        );
    }

    if let Some(errors) = &cfg.errors {
        out.insert("errors".to_string(), serialize_errors(errors));
    }

    if let Some(catalog) = &cfg.catalog {
        out.insert(
            "catalog".to_string(),
            DynValue::Object(BTreeMap::from([(
                "urls".to_string(),
                DynValue::List(catalog.urls.iter().cloned().map(DynValue::String).collect()),
            )])),
        );
    }

    if let Some(engine) = &cfg.engine {
        let mut m = BTreeMap::new();
        m.insert("source".to_string(), DynValue::String(engine.source.clone()));
        insert_opt(&mut m, "version", engine.version.as_deref());
        m.insert("type".to_string(), DynValue::String(engine.kind.clone()));
        if !engine.meta.is_empty() {
            m.insert("meta".to_string(), DynValue::Object(engine.meta.clone()));
        }
        out.insert("engine".to_string(), DynValue::Object(m));
    }

    if let Some(exclude) = &cfg.exclude {
        let mut m = BTreeMap::new();
        if let Some(condition) = exclude.condition {
            m.insert("if".to_string(), DynValue::Bool(condition));
        }
        m.insert("actions".to_string(), DynValue::List(exclude.actions.iter().cloned().map(DynValue::String).collect()));
        m.insert("exclude_dependencies".to_string(), DynValue::Bool(exclude.exclude_dependencies));
        out.insert("exclude".to_string(), DynValue::Object(m));
    }

    if !cfg.processed_includes.is_empty() {
        out.insert(
            "include".to_string(),
            DynValue::Object(cfg.processed_includes.iter().map(|(label, inc)| (label.clone(), serialize_include(inc))).collect()),
        );
    }

    DynValue::Object(out)
}

fn insert_opt(out: &mut BTreeMap<String, DynValue>, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        out.insert(key.to_string(), DynValue::String(v.to_string()));
    }
}

fn serialize_terraform(terraform: &ExecutionBlock) -> DynValue {
    let mut m = BTreeMap::new();
    insert_opt(&mut m, "source", terraform.source.as_deref());
    if !terraform.include_in_copy.is_empty() {
        m.insert(
            "include_in_copy".to_string(),
            DynValue::List(terraform.include_in_copy.iter().cloned().map(DynValue::String).collect()),
        );
    }
    if !terraform.exclude_from_copy.is_empty() {
        m.insert(
            "exclude_from_copy".to_string(),
            DynValue::List(terraform.exclude_from_copy.iter().cloned().map(DynValue::String).collect()),
        );
    }
    m.insert("copy_terraform_lock_file".to_string(), DynValue::Bool(terraform.copy_terraform_lock_file));

    if !terraform.extra_arguments.is_empty() {
        m.insert("extra_arguments".to_string(), serialize_named_list(&terraform.extra_arguments));
    }
    if !terraform.before_hooks.is_empty() {
        m.insert("before_hook".to_string(), serialize_named_list(&terraform.before_hooks));
    }
    if !terraform.after_hooks.is_empty() {
        m.insert("after_hook".to_string(), serialize_named_list(&terraform.after_hooks));
    }
    if !terraform.error_hooks.is_empty() {
        m.insert("error_hook".to_string(), serialize_named_list(&terraform.error_hooks));
    }
    DynValue::Object(m)
}

fn serialize_named_list(items: &[NamedListBlock]) -> DynValue {
    DynValue::Object(
        items
            .iter()
            .map(|item| {
                let mut m = BTreeMap::new();
                if !item.commands.is_empty() {
                    m.insert("commands".to_string(), DynValue::List(item.commands.iter().cloned().map(DynValue::String).collect()));
                }
                if !item.arguments.is_empty() {
                    m.insert("arguments".to_string(), DynValue::List(item.arguments.iter().cloned().map(DynValue::String).collect()));
                }
                if !item.execute.is_empty() {
                    m.insert("execute".to_string(), DynValue::List(item.execute.iter().cloned().map(DynValue::String).collect()));
                }
                m.insert("run_on_error".to_string(), DynValue::Bool(item.run_on_error));
                if !item.if_missing_command.is_empty() {
                    m.insert(
                        "if_missing_command".to_string(),
                        DynValue::List(item.if_missing_command.iter().cloned().map(DynValue::String).collect()),
                    );
                }
                (item.name.clone(), DynValue::Object(m))
            })
            .collect(),
    )
}

fn serialize_remote_state(remote_state: &crate::config::types::RemoteStateBlock) -> DynValue {
    let mut m = BTreeMap::new();
    insert_opt(&mut m, "backend", remote_state.backend.as_deref());
    m.insert("disable_init".to_string(), DynValue::Bool(remote_state.disable_init));
    m.insert(
        "disable_dependency_optimization".to_string(),
        DynValue::Bool(remote_state.disable_dependency_optimization),
    );
    if !remote_state.config.is_empty() {
        m.insert("config".to_string(), DynValue::Object(remote_state.config.clone()));
    }
    if !remote_state.encryption.is_empty() {
        m.insert("encryption".to_string(), DynValue::Object(remote_state.encryption.clone()));
    }
    if let Some(generate) = &remote_state.generate {
        m.insert(
            "generate".to_string(),
            DynValue::Object(BTreeMap::from([
                ("path".to_string(), DynValue::String(generate.path.clone())),
                ("if_exists".to_string(), DynValue::String(generate.if_exists.clone())),
            ])),
        );
    }
    DynValue::Object(m)
}

fn serialize_dependency(dep: &Dependency) -> DynValue {
    let mut m = BTreeMap::new();
    m.insert("enabled".to_string(), DynValue::Bool(dep.enabled));
    m.insert("skip_outputs".to_string(), DynValue::Bool(dep.skip_outputs));
    if let Some(outputs) = &dep.rendered_outputs {
        m.insert("outputs".to_string(), outputs.clone());
    }
    if let Some(inputs) = &dep.inputs_snapshot {
        m.insert("inputs".to_string(), inputs.clone());
    }
    DynValue::Object(m)
}

fn serialize_generate(g: &GenerateBlock) -> DynValue {
    let mut m = BTreeMap::new();
    m.insert("path".to_string(), DynValue::String(g.path.clone()));
    m.insert("if_exists".to_string(), DynValue::String(g.if_exists.clone()));
    if !g.if_disabled.is_empty() {
        m.insert("if_disabled".to_string(), DynValue::String(g.if_disabled.clone()));
    }
    m.insert("contents".to_string(), DynValue::String(g.contents.clone()));
    if !g.comment_prefix.is_empty() {
        m.insert("comment_prefix".to_string(), DynValue::String(g.comment_prefix.clone()));
    }
    m.insert("disable_signature".to_string(), DynValue::Bool(g.disable_signature));
    m.insert("disable".to_string(), DynValue::Bool(g.disable));
    DynValue::Object(m)
}

fn serialize_feature_flag(f: &FeatureFlag) -> DynValue {
    DynValue::Object(BTreeMap::from([("default".to_string(), f.default.clone())]))
}

fn serialize_errors(errors: &ErrorsBlock) -> DynValue {
    let mut m = BTreeMap::new();
    if !errors.retry.is_empty() {
        m.insert(
            "retry".to_string(),
            DynValue::Object(
                errors
                    .retry
                    .iter()
                    .map(|r| {
                        let mut rm = BTreeMap::new();
                        rm.insert(
                            "retryable_errors".to_string(),
                            DynValue::List(r.retryable_errors.iter().cloned().map(DynValue::String).collect()),
                        );
                        rm.insert("max_attempts".to_string(), DynValue::Number(r.max_attempts as f64));
                        rm.insert("sleep_interval_sec".to_string(), DynValue::Number(r.sleep_interval_sec as f64));
                        (r.label.clone(), DynValue::Object(rm))
                    })
                    .collect(),
            ),
        );
    }
    if !errors.ignore.is_empty() {
        m.insert(
            "ignore".to_string(),
            DynValue::Object(
                errors
                    .ignore
                    .iter()
                    .map(|i| {
                        let mut im = BTreeMap::new();
                        im.insert(
                            "ignorable_errors".to_string(),
                            DynValue::List(i.ignorable_errors.iter().cloned().map(DynValue::String).collect()),
                        );
                        if !i.message.is_empty() {
                            im.insert("message".to_string(), DynValue::String(i.message.clone()));
                        }
                        if !i.signals.is_empty() {
                            im.insert("signals".to_string(), DynValue::Object(i.signals.clone()));
                        }
                        (i.label.clone(), DynValue::Object(im))
                    })
                    .collect(),
            ),
        );
    }
    DynValue::Object(m)
}

fn serialize_include(inc: &IncludeConfig) -> DynValue {
    let mut m = BTreeMap::new();
    m.insert("expose".to_string(), DynValue::Bool(inc.expose));
    DynValue::Object(m)
}
