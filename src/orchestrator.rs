//! Full parser / orchestrator (C7, spec §4.7): the five-stage pipeline that
//! turns one unit file into a fully merged, fully evaluated `Configuration`.
//!
//! Grounded on `so0k-oxid::config::loader::load_workspace_config`'s
//! "stat, cache lookup, parse, decode" shape, generalized from a single
//! decode pass into the five staged passes the dependency/include graph
//! needs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::cache::ContentHash;
use crate::config::types::Configuration;
use crate::dependency::{DependencyGraphSource, DependencyResolver, NoRemoteStateSource, RemoteStateSource};
use crate::error::{CoreError, CoreResult};
use crate::eval::Scope;
use crate::functions::{ConfigReader, FunctionRegistry};
use crate::hcl::{self, BlockKind, DecodeSet};
use crate::include::{self, ParentResolver};
use crate::remote_state::BackendRegistry;
use crate::serializer;
use crate::session::ParsingSession;
use crate::strict;

/// Per-call options narrowing what the orchestrator does, distinct from the
/// session-wide policy in `ParsingSession` (spec §4.7, §5).
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Only decode this subset; used for C4-style partial reads during
    /// cycle detection and optimization probing.
    pub decode_set: Option<DecodeSet>,
    /// Skip stage 4 (dependency resolution) entirely — used while building
    /// the static dependency graph, where resolving outputs would recurse
    /// forever.
    pub skip_dependencies: bool,
}

pub struct Orchestrator {
    pub session: Arc<ParsingSession>,
    pub backends: Arc<BackendRegistry>,
    self_ref: Weak<Orchestrator>,
}

impl Orchestrator {
    /// Returns an `Arc` so `read_terragrunt_config` can hand the function
    /// registry a strong reference back to this same orchestrator (C3/C7
    /// re-entry, spec §4.3).
    pub fn new(session: Arc<ParsingSession>, backends: Arc<BackendRegistry>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            session,
            backends,
            self_ref: weak.clone(),
        })
    }

    /// `parse(path)`, spec §4.7.
    pub async fn parse(&self, path: &Path) -> CoreResult<Configuration> {
        self.parse_with_options(path, &ParseOptions::default()).await
    }

    pub async fn parse_with_options(&self, path: &Path, options: &ParseOptions) -> CoreResult<Configuration> {
        let decode_set = options.decode_set.clone().unwrap_or_else(DecodeSet::all);

        // Stage 1: pre-parse.
        let body = self.stage1_pre_parse(path, &decode_set).await?;

        // Stage 2: role pre-read (TerragruntFlags only), CLI wins on conflict
        // (CLI-provided iam_role already lives on the session and is applied
        // by the caller after `parse` returns; here we only extract the
        // file's own value so it's available if the session didn't override).
        let role_functions = FunctionRegistry::with_no_session_hooks();
        let role_scope = Scope::new();
        let role_decode = DecodeSet::only(&[BlockKind::TerragruntFlags]);
        let role_cfg = hcl::decode(&body, &role_decode, path.to_path_buf(), &role_scope, &role_functions)?;

        // Stage 3: base blocks (include, locals, feature), fixpoint already
        // handled inside `decode_locals`.
        let base_decode = DecodeSet::only(&[BlockKind::Include, BlockKind::Locals, BlockKind::FeatureFlags]);
        let functions = self.function_registry(path);
        let mut scope = Scope::new();
        let base_cfg = hcl::decode(&body, &base_decode, path.to_path_buf(), &scope, &functions)?;

        self.detect_deprecations(&base_cfg)?;

        scope.bind_map("local", base_cfg.locals.clone());
        scope.bind_map(
            "feature",
            base_cfg
                .feature_flags
                .iter()
                .map(|f| (f.name.clone(), f.default.clone()))
                .collect(),
        );

        // Stage 4: dependency resolution.
        let dependency_decode = DecodeSet::only(&[BlockKind::Dependency, BlockKind::Dependencies]);
        let dep_cfg = hcl::decode(&body, &dependency_decode, path.to_path_buf(), &scope, &functions)?;

        if !options.skip_dependencies && !dep_cfg.dependencies_block.is_empty() {
            for dep in &dep_cfg.dependencies_block {
                if let Some(target) = literal_path(&dep.config_path) {
                    crate::dependency::check_for_cycles(&target, self).await?;
                }
            }

            let resolver = DependencyResolver::new(
                self.session.caches.clone(),
                self.session.run_self.clone(),
                self.session.run_command.clone(),
                self.backends.clone(),
                self.remote_state_source(),
                self.session.command.clone(),
            );
            let resolved = resolver.resolve_all(&dep_cfg).await?;

            let mut dependency_scope = BTreeMap::new();
            for resolved in resolved {
                let mut entry = BTreeMap::new();
                entry.insert("outputs".to_string(), resolved.outputs);
                dependency_scope.insert(resolved.name, crate::value::DynValue::Object(entry));
            }
            scope.bind_map("dependency", dependency_scope);
        }

        // Stage 5: full decode with the complete scope.
        let mut cfg = hcl::decode(&body, &decode_set, path.to_path_buf(), &scope, &functions)?;
        cfg.processed_includes = base_cfg.processed_includes;
        cfg.locals = base_cfg.locals;
        cfg.feature_flags = base_cfg.feature_flags;
        if !dep_cfg.dependencies_block.is_empty() {
            cfg.dependencies_block = dep_cfg.dependencies_block;
        }

        if !cfg.processed_includes.is_empty() {
            let strict = &self.session.strict;
            let (merged, exposed) = include::resolve_includes(cfg, &decode_set, strict, self).await?;
            cfg = merged;
            if !exposed.is_empty() {
                // Bound for completeness (e.g. future callers re-evaluating
                // this unit's expressions); attributes within this same
                // decode pass were already evaluated before the include
                // merge ran, so `include.<label>` references inside the
                // child's own attributes require a unit to be re-parsed
                // once the parent is known — matching how `decode_include`
                // already resolves `path` eagerly rather than lazily.
                let mut include_scope = BTreeMap::new();
                for (label, parent) in exposed {
                    include_scope.insert(label, serializer::serialize(&parent));
                }
                scope.bind_map("include", include_scope);
            }
        }

        let dups = cfg.duplicated_generate_labels();
        if !dups.is_empty() {
            return Err(CoreError::DuplicatedGenerateBlocks(dups));
        }

        let _ = role_cfg; // retained for future CLI-vs-file precedence wiring

        Ok(cfg)
    }

    async fn stage1_pre_parse(&self, path: &Path, decode_set: &DecodeSet) -> CoreResult<hcl::Body> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound(path.to_path_buf()));
        }

        let mtime = hcl::mtime::mtime_micros(path).unwrap_or_default();
        let path_str = path.display().to_string();
        let decode_str = format!("{decode_set:?}");
        let mtime_str = mtime.to_string();
        let key = ContentHash::of(&[path_str.as_str(), self.session.working_dir.as_str(), decode_str.as_str(), mtime_str.as_str()]);

        if let Some(cached) = self.session.caches.parsed_files.get(key) {
            return Ok((*cached).clone());
        }

        let body = hcl::parse_file(path)?;
        self.session.caches.parsed_files.insert(key, body.clone());
        Ok(body)
    }

    fn function_registry(&self, path: &Path) -> FunctionRegistry {
        let mut registry = FunctionRegistry::new(
            self.session.caches.clone(),
            self.session.run_command.clone(),
            self.session.credentials.clone(),
            self.session.env.clone(),
            path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")),
        );
        if let Some(strong) = self.self_ref.upgrade() {
            registry.set_config_reader(strong as Arc<dyn ConfigReader>);
        }
        registry
    }

    /// Hands the dependency resolver a strong reference to this same
    /// orchestrator so it can partial-parse a target's `remote_state`
    /// block (spec §4.6.2 item 2). Falls back to a source that never
    /// finds one if `self` somehow has no live `Arc` yet.
    fn remote_state_source(&self) -> Arc<dyn RemoteStateSource> {
        match self.self_ref.upgrade() {
            Some(strong) => strong as Arc<dyn RemoteStateSource>,
            None => Arc::new(NoRemoteStateSource),
        }
    }

    fn detect_deprecations(&self, cfg: &Configuration) -> CoreResult<()> {
        for include in cfg.processed_includes.values() {
            if include.is_bare {
                self.session
                    .strict
                    .evaluate(strict::BARE_INCLUDE, &cfg.source_path.display().to_string())?;
            }
        }
        Ok(())
    }
}

fn literal_path(expr: &crate::config::expr::Expression) -> Option<PathBuf> {
    match expr {
        crate::config::expr::Expression::Literal(crate::value::DynValue::String(s)) => Some(PathBuf::from(s)),
        _ => None,
    }
}

#[async_trait]
impl ParentResolver for Orchestrator {
    async fn parse_parent(&self, path: &PathBuf, decode_set: &DecodeSet) -> CoreResult<Configuration> {
        let options = ParseOptions {
            decode_set: Some(decode_set.clone()),
            skip_dependencies: true,
        };
        self.parse_with_options(path, &options).await
    }
}

#[async_trait]
impl DependencyGraphSource for Orchestrator {
    async fn dependency_targets(&self, path: &Path) -> CoreResult<Vec<PathBuf>> {
        let options = ParseOptions {
            decode_set: Some(DecodeSet::only(&[BlockKind::Dependency, BlockKind::Dependencies])),
            skip_dependencies: true,
        };
        let cfg = self.parse_with_options(path, &options).await?;
        Ok(cfg
            .dependencies_block
            .iter()
            .filter_map(|d| literal_path(&d.config_path))
            .collect())
    }
}

#[async_trait]
impl RemoteStateSource for Orchestrator {
    /// Discard-diagnostics partial parse (spec §4.6.2 item 2): a target
    /// that doesn't exist, doesn't parse, or has no `remote_state` block
    /// simply isn't eligible for the optimization rather than failing the
    /// whole dependency resolution.
    async fn remote_state_for(&self, path: &Path) -> CoreResult<Option<crate::config::types::RemoteStateBlock>> {
        if !path.exists() {
            return Ok(None);
        }
        let options = ParseOptions {
            decode_set: Some(DecodeSet::only(&[BlockKind::RemoteState])),
            skip_dependencies: true,
        };
        Ok(self.parse_with_options(path, &options).await.ok().and_then(|cfg| cfg.remote_state))
    }
}

#[async_trait]
impl ConfigReader for Orchestrator {
    async fn read_config(&self, path: &Path) -> CoreResult<crate::value::DynValue> {
        let options = ParseOptions {
            decode_set: None,
            skip_dependencies: false,
        };
        let cfg = self.parse_with_options(path, &options).await?;
        Ok(serializer::serialize(&cfg))
    }
}
