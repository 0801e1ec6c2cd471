//! Dependency resolver (C6, spec §4.6).
//!
//! Grounded on `so0k-oxid::executor::parallel`'s `Semaphore`-bounded
//! fan-out for the concurrent fetch (§4.6.3). The static cycle check
//! (§4.6.1) is a direct visited/current-stack DFS per the spec's own
//! algorithm description rather than `so0k-oxid::dag::builder`'s
//! build-then-`is_cyclic_directed` shape, since the latter can't recover
//! the offending path without a second traversal.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::cache::Caches;
use crate::config::types::{Configuration, Dependency, MergeStrategy, RemoteStateBlock};
use crate::error::{CoreError, CoreResult};
use crate::merge;
use crate::remote_state::{Backend, BackendRegistry};
use crate::runtime::{RunCommand, RunSelf};
use crate::value::DynValue;

const DEFAULT_FANOUT_LIMIT: usize = 8;

/// Abstracts "read just enough of a unit to learn its dependency targets",
/// implemented by `crate::orchestrator::Orchestrator` via a partial parse
/// with decode set `{Dependency}` (spec §4.6.1).
#[async_trait]
pub trait DependencyGraphSource: Send + Sync {
    async fn dependency_targets(&self, path: &Path) -> CoreResult<Vec<PathBuf>>;
}

/// Abstracts "read just enough of a unit to learn its backend config",
/// implemented by `crate::orchestrator::Orchestrator` via a discard-
/// diagnostics partial parse with decode set `{RemoteState}` (spec §4.6.2
/// item 2). Returns `Ok(None)` whenever the probe isn't usable — missing
/// file, no `remote_state` block, or a parse error — so the caller always
/// has a clean fallback to the full tool-invocation path.
#[async_trait]
pub trait RemoteStateSource: Send + Sync {
    async fn remote_state_for(&self, path: &Path) -> CoreResult<Option<RemoteStateBlock>>;
}

/// DFS cycle check (spec §4.6.1): `visited` holds fully-explored nodes,
/// `stack` holds the nodes on the current path. Returns the cycle as a
/// path list the moment a `stack` member is revisited.
pub async fn check_for_cycles(root: &Path, source: &dyn DependencyGraphSource) -> CoreResult<()> {
    let mut visited = HashSet::new();
    let mut stack = Vec::new();
    dfs(root, source, &mut visited, &mut stack).await
}

fn dfs<'a>(
    node: &'a Path,
    source: &'a dyn DependencyGraphSource,
    visited: &'a mut HashSet<PathBuf>,
    stack: &'a mut Vec<PathBuf>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = CoreResult<()>> + Send + 'a>> {
    Box::pin(async move {
        if stack.iter().any(|p| p == node) {
            let mut cycle: Vec<PathBuf> = stack.iter().cloned().collect();
            cycle.push(node.to_path_buf());
            return Err(CoreError::DependencyCycle(cycle));
        }
        if visited.contains(node) {
            return Ok(());
        }

        stack.push(node.to_path_buf());
        for target in source.dependency_targets(node).await? {
            dfs(&target, source, visited, stack).await?;
        }
        stack.pop();
        visited.insert(node.to_path_buf());
        Ok(())
    })
}

/// One dependency's resolved outcome (spec §4.6.2).
#[derive(Debug, Clone)]
pub struct ResolvedOutput {
    pub name: String,
    pub outputs: DynValue,
}

pub struct DependencyResolver {
    pub caches: Arc<Caches>,
    pub run_self: Arc<dyn RunSelf>,
    pub run_command: Arc<dyn RunCommand>,
    pub backends: Arc<BackendRegistry>,
    pub remote_state_source: Arc<dyn RemoteStateSource>,
    pub command: String,
    pub fanout_limit: usize,
}

impl DependencyResolver {
    pub fn new(
        caches: Arc<Caches>,
        run_self: Arc<dyn RunSelf>,
        run_command: Arc<dyn RunCommand>,
        backends: Arc<BackendRegistry>,
        remote_state_source: Arc<dyn RemoteStateSource>,
        command: String,
    ) -> Self {
        Self {
            caches,
            run_self,
            run_command,
            backends,
            remote_state_source,
            command,
            fanout_limit: DEFAULT_FANOUT_LIMIT,
        }
    }

    /// Resolve every dependency of `cfg`, fanning out concurrently (bounded
    /// by `fanout_limit`) and collecting all results before reporting the
    /// first failure (spec §4.6.3: "collect-then-report").
    pub async fn resolve_all(&self, cfg: &Configuration) -> CoreResult<Vec<ResolvedOutput>> {
        let semaphore = Arc::new(Semaphore::new(self.fanout_limit.max(1)));
        let mut handles = Vec::with_capacity(cfg.dependencies_block.len());

        for dep in &cfg.dependencies_block {
            let dep = dep.clone();
            let semaphore = semaphore.clone();
            let this = self.clone_shared();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                this.resolve_one(&dep).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(resolved)) => results.push(resolved),
                Ok(Err(e)) if first_error.is_none() => first_error = Some(e),
                Ok(Err(_)) => {}
                Err(join_err) if first_error.is_none() => {
                    first_error = Some(CoreError::Other(format!("dependency task panicked: {join_err}")))
                }
                Err(_) => {}
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    fn clone_shared(&self) -> Arc<DependencyResolverShared> {
        Arc::new(DependencyResolverShared {
            caches: self.caches.clone(),
            run_self: self.run_self.clone(),
            run_command: self.run_command.clone(),
            backends: self.backends.clone(),
            remote_state_source: self.remote_state_source.clone(),
            command: self.command.clone(),
        })
    }

    async fn resolve_one(&self, dep: &Dependency) -> CoreResult<ResolvedOutput> {
        self.clone_shared().resolve_one(dep).await
    }
}

/// The subset of `DependencyResolver` state that must be `'static` to move
/// into a spawned task.
struct DependencyResolverShared {
    caches: Arc<Caches>,
    run_self: Arc<dyn RunSelf>,
    run_command: Arc<dyn RunCommand>,
    backends: Arc<BackendRegistry>,
    remote_state_source: Arc<dyn RemoteStateSource>,
    command: String,
}

impl DependencyResolverShared {
    fn target_path(&self, dep: &Dependency) -> CoreResult<String> {
        match &dep.config_path {
            crate::config::expr::Expression::Literal(DynValue::String(s)) => Ok(s.clone()),
            _ => Err(CoreError::DependencyDirNotFound(vec![PathBuf::from(&dep.name)])),
        }
    }

    async fn resolve_one(&self, dep: &Dependency) -> CoreResult<ResolvedOutput> {
        let mocks_allowed = self.mocks_allowed(dep);

        if !dep.enabled || dep.skip_outputs {
            return self.outcome_from_mocks_or_fail(dep, mocks_allowed, DynValue::Null);
        }

        let target = self.target_path(dep)?;

        let lock = self.caches.output_locks.lock_for(&target);
        let _guard = lock.lock().await;

        if let Some(cached) = self.caches.dependency_outputs.get(&target) {
            let fetched: DynValue = crate::value::from_dyn_json(&serde_json::from_str(&cached).map_err(|e| {
                CoreError::OutputParsingError {
                    name: dep.name.clone(),
                    reason: e.to_string(),
                }
            })?)?;
            return Ok(ResolvedOutput {
                name: dep.name.clone(),
                outputs: self.apply_mock_merge(dep, fetched),
            });
        }

        let fetched = match self.fetch_via_backend(&target).await {
            Some(result) => result?,
            None => self.fetch_via_tool(&target).await?,
        };

        if is_empty_outputs(&fetched) {
            if mocks_allowed {
                if let Some(mocks) = &dep.mock_outputs {
                    return Ok(ResolvedOutput {
                        name: dep.name.clone(),
                        outputs: mocks.clone(),
                    });
                }
            }
            return Err(CoreError::TerragruntOutputTargetNoOutputs {
                name: dep.name.clone(),
                path: PathBuf::from(&target),
            });
        }

        let json = crate::value::to_dyn_json(&fetched);
        self.caches.dependency_outputs.insert(target.clone(), json.to_string());

        Ok(ResolvedOutput {
            name: dep.name.clone(),
            outputs: self.apply_mock_merge(dep, fetched),
        })
    }

    fn mocks_allowed(&self, dep: &Dependency) -> bool {
        if dep.mock_outputs.is_none() {
            return false;
        }
        dep.mock_allowed_commands.is_empty()
            || dep.mock_allowed_commands.iter().any(|c| c == &self.command)
            || is_render_command(&self.command)
    }

    fn outcome_from_mocks_or_fail(&self, dep: &Dependency, mocks_allowed: bool, fallback: DynValue) -> CoreResult<ResolvedOutput> {
        if mocks_allowed {
            if let Some(mocks) = &dep.mock_outputs {
                return Ok(ResolvedOutput {
                    name: dep.name.clone(),
                    outputs: mocks.clone(),
                });
            }
        }
        Ok(ResolvedOutput {
            name: dep.name.clone(),
            outputs: fallback,
        })
    }

    fn apply_mock_merge(&self, dep: &Dependency, fetched: DynValue) -> DynValue {
        let Some(mocks) = &dep.mock_outputs else {
            return fetched;
        };
        let Some(strategy) = dep.merge_strategy_with_state else {
            return fetched;
        };
        let (DynValue::Object(mock_map) | DynValue::Map(mock_map)) = mocks else {
            return fetched;
        };
        let (DynValue::Object(fetched_map) | DynValue::Map(fetched_map)) = &fetched else {
            return fetched;
        };
        match strategy {
            MergeStrategy::NoMerge => fetched,
            MergeStrategy::Shallow => DynValue::Object(merge::merge_maps(mock_map, fetched_map, MergeStrategy::Shallow)),
            MergeStrategy::DeepMapOnly => {
                DynValue::Object(merge::merge_maps(mock_map, fetched_map, MergeStrategy::DeepMapOnly))
            }
            MergeStrategy::Deep => DynValue::Object(merge::merge_maps(mock_map, fetched_map, MergeStrategy::Deep)),
        }
    }

    /// Optimized direct-state read (spec §4.6.2 item 2). Available only
    /// when the target's own `remote_state` block parses cleanly, doesn't
    /// disable the optimization, and names a backend the embedder has
    /// registered; `None` means the caller must fall back to the full
    /// tool-invocation path (spec §4.6.2 item 3).
    async fn fetch_via_backend(&self, target: &str) -> Option<CoreResult<DynValue>> {
        let remote_state = match self.remote_state_source.remote_state_for(Path::new(target)).await {
            Ok(Some(rs)) => rs,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };

        if remote_state.disable_dependency_optimization {
            return None;
        }
        let backend_name = remote_state.backend.as_ref()?;
        let backend = self.backends.get(backend_name)?;

        Some(self.fetch_via_optimized_read(target, &remote_state, backend).await)
    }

    /// The two sub-strategies of spec §4.6.2 item 2: reuse an already
    /// initialized target directory when one exists, otherwise stand up a
    /// disposable workspace with a generated `backend.tf` and run `init`
    /// there before reading outputs.
    async fn fetch_via_optimized_read(
        &self,
        target: &str,
        remote_state: &RemoteStateBlock,
        backend: Arc<dyn Backend>,
    ) -> CoreResult<DynValue> {
        let target_dir = Path::new(target).parent().unwrap_or_else(|| Path::new("."));

        if target_dir.join(".terraform").is_dir() {
            let dir = target_dir.display().to_string();
            let stdout = self
                .run_command
                .run(&dir, &["output".to_string(), "-json".to_string()])
                .await?;
            return parse_output_json(target, &stdout);
        }

        let workspace = tempfile::tempdir().map_err(|e| CoreError::Io {
            path: target_dir.to_path_buf(),
            source: e,
        })?;

        let config = DynValue::Object(remote_state.config.clone());
        let stanza = backend.generate_backend_stanza(&config)?;
        let backend_tf = workspace.path().join("backend.tf");
        std::fs::write(&backend_tf, stanza).map_err(|e| CoreError::Io { path: backend_tf.clone(), source: e })?;

        let lock_file = target_dir.join(".terraform.lock.hcl");
        if lock_file.is_file() {
            let _ = std::fs::copy(&lock_file, workspace.path().join(".terraform.lock.hcl"));
        }

        let workspace_dir = workspace.path().display().to_string();
        // `init` is allowed to fail here (e.g. no network for provider
        // plugins that aren't needed for an outputs-only read); only the
        // subsequent `output` call's failure is fatal.
        let _ = self
            .run_command
            .run(&workspace_dir, &["init".to_string(), "-get=false".to_string()])
            .await;
        let stdout = self
            .run_command
            .run(&workspace_dir, &["output".to_string(), "-json".to_string()])
            .await?;
        parse_output_json(target, &stdout)
    }

    /// Full tool invocation (spec §4.6.2 item 3): re-enter the orchestrator's
    /// own dispatcher against the target, forcing `command=output`.
    async fn fetch_via_tool(&self, target: &str) -> CoreResult<DynValue> {
        let stdout = self
            .run_self
            .run_self(target, &["output".to_string(), "-json".to_string()])
            .await?;
        parse_output_json(target, &stdout)
    }
}

/// Spec §4.6.2/S6: a target with no outputs at all (as opposed to one that
/// simply failed to fetch) is distinguished so callers can fall back to
/// mocks, or fail with `TerragruntOutputTargetNoOutputs` if none apply.
fn is_empty_outputs(value: &DynValue) -> bool {
    matches!(value, DynValue::Object(m) | DynValue::Map(m) if m.is_empty())
}

fn is_render_command(command: &str) -> bool {
    matches!(command, "render" | "render-json")
}

/// Parses the `tool output -json` shape (spec §4.6.6):
/// `map<name, {type, value, sensitive}>`.
fn parse_output_json(target: &str, raw: &str) -> CoreResult<DynValue> {
    let parsed: serde_json::Value = serde_json::from_str(raw).map_err(|e| CoreError::OutputParsingError {
        name: target.to_string(),
        reason: e.to_string(),
    })?;

    let serde_json::Value::Object(map) = parsed else {
        return Err(CoreError::OutputParsingError {
            name: target.to_string(),
            reason: "expected a JSON object at top level".to_string(),
        });
    };

    let mut out = std::collections::BTreeMap::new();
    for (name, entry) in map {
        let value = entry.get("value").cloned().unwrap_or(serde_json::Value::Null);
        out.insert(name, crate::value::from_dyn_json(&value)?);
    }
    Ok(DynValue::Object(out))
}

/// A `RemoteStateSource` that never finds a `remote_state` block, used
/// wherever the optimized-read path isn't under test.
pub struct NoRemoteStateSource;

#[async_trait]
impl RemoteStateSource for NoRemoteStateSource {
    async fn remote_state_for(&self, _path: &Path) -> CoreResult<Option<RemoteStateBlock>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGraph(std::collections::HashMap<PathBuf, Vec<PathBuf>>);

    #[async_trait]
    impl DependencyGraphSource for FixedGraph {
        async fn dependency_targets(&self, path: &Path) -> CoreResult<Vec<PathBuf>> {
            Ok(self.0.get(path).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn detects_two_node_cycle() {
        let mut graph = std::collections::HashMap::new();
        graph.insert(PathBuf::from("/a"), vec![PathBuf::from("/b")]);
        graph.insert(PathBuf::from("/b"), vec![PathBuf::from("/a")]);
        let source = FixedGraph(graph);
        let result = check_for_cycles(Path::new("/a"), &source).await;
        assert!(matches!(result, Err(CoreError::DependencyCycle(_))));
    }

    #[tokio::test]
    async fn acyclic_graph_passes() {
        let mut graph = std::collections::HashMap::new();
        graph.insert(PathBuf::from("/a"), vec![PathBuf::from("/b")]);
        graph.insert(PathBuf::from("/b"), vec![]);
        let source = FixedGraph(graph);
        assert!(check_for_cycles(Path::new("/a"), &source).await.is_ok());
    }

    #[test]
    fn parses_output_json_shape() {
        let raw = r#"{"vpc_id": {"type": "string", "value": "vpc-123", "sensitive": false}}"#;
        let value = parse_output_json("/dep", raw).unwrap();
        assert_eq!(
            value.get_path(&["vpc_id".to_string()]),
            Some(&DynValue::String("vpc-123".to_string()))
        );
    }

    #[test]
    fn malformed_output_json_is_an_error() {
        let result = parse_output_json("/dep", "not json");
        assert!(matches!(result, Err(CoreError::OutputParsingError { .. })));
    }

    #[test]
    fn mocks_unavailable_without_command_allowlist_match() {
        let shared = DependencyResolverShared {
            caches: Arc::new(Caches::new()),
            run_self: Arc::new(crate::runtime::NoopRunCommand),
            run_command: Arc::new(crate::runtime::NoopRunCommand),
            backends: Arc::new(BackendRegistry::new()),
            remote_state_source: Arc::new(NoRemoteStateSource),
            command: "apply".to_string(),
        };
        let mut dep = Dependency::new("d");
        dep.mock_outputs = Some(DynValue::Object(Default::default()));
        dep.mock_allowed_commands = vec!["validate".to_string()];
        assert!(!shared.mocks_allowed(&dep));
    }

    #[test]
    fn render_commands_always_allow_mocks() {
        let shared = DependencyResolverShared {
            caches: Arc::new(Caches::new()),
            run_self: Arc::new(crate::runtime::NoopRunCommand),
            run_command: Arc::new(crate::runtime::NoopRunCommand),
            backends: Arc::new(BackendRegistry::new()),
            remote_state_source: Arc::new(NoRemoteStateSource),
            command: "render-json".to_string(),
        };
        let mut dep = Dependency::new("d");
        dep.mock_outputs = Some(DynValue::Object(Default::default()));
        dep.mock_allowed_commands = vec!["validate".to_string()];
        assert!(shared.mocks_allowed(&dep));
    }

    struct EmptyOutputsRunSelf;

    #[async_trait]
    impl RunSelf for EmptyOutputsRunSelf {
        async fn run_self(&self, _config_path: &str, _args: &[String]) -> CoreResult<String> {
            Ok("{}".to_string())
        }
    }

    fn dep_with_mock(command_allowed: &str) -> Dependency {
        let mut dep = Dependency::new("d");
        dep.config_path = crate::config::expr::Expression::Literal(DynValue::String("../d".to_string()));
        dep.mock_outputs = Some(DynValue::Object(std::collections::BTreeMap::from([(
            "x".to_string(),
            DynValue::Number(1.0),
        )])));
        dep.mock_allowed_commands = vec![command_allowed.to_string()];
        dep
    }

    #[tokio::test]
    async fn empty_outputs_fall_back_to_allowed_mocks() {
        let shared = DependencyResolverShared {
            caches: Arc::new(Caches::new()),
            run_self: Arc::new(EmptyOutputsRunSelf),
            run_command: Arc::new(crate::runtime::NoopRunCommand),
            backends: Arc::new(BackendRegistry::new()),
            remote_state_source: Arc::new(NoRemoteStateSource),
            command: "validate".to_string(),
        };
        let dep = dep_with_mock("validate");
        let resolved = shared.resolve_one(&dep).await.unwrap();
        assert_eq!(
            resolved.outputs.get_path(&["x".to_string()]),
            Some(&DynValue::Number(1.0))
        );
    }

    #[tokio::test]
    async fn empty_outputs_without_allowed_mocks_is_an_error() {
        let shared = DependencyResolverShared {
            caches: Arc::new(Caches::new()),
            run_self: Arc::new(EmptyOutputsRunSelf),
            run_command: Arc::new(crate::runtime::NoopRunCommand),
            backends: Arc::new(BackendRegistry::new()),
            remote_state_source: Arc::new(NoRemoteStateSource),
            command: "apply".to_string(),
        };
        let dep = dep_with_mock("validate");
        let result = shared.resolve_one(&dep).await;
        assert!(matches!(result, Err(CoreError::TerragruntOutputTargetNoOutputs { .. })));
    }

    struct FixedRemoteState(RemoteStateBlock);

    #[async_trait]
    impl RemoteStateSource for FixedRemoteState {
        async fn remote_state_for(&self, _path: &Path) -> CoreResult<Option<RemoteStateBlock>> {
            Ok(Some(self.0.clone()))
        }
    }

    struct RecordingBackend {
        stanza: String,
    }

    #[async_trait]
    impl Backend for RecordingBackend {
        fn name(&self) -> &str {
            "s3"
        }
        async fn fetch_state_outputs(&self, _key: &str) -> CoreResult<DynValue> {
            Err(CoreError::Other("direct state reads aren't wired up".to_string()))
        }
        fn generate_backend_stanza(&self, _config: &DynValue) -> CoreResult<String> {
            Ok(self.stanza.clone())
        }
    }

    /// Returns `output -json` for any working dir, failing loudly if `init`
    /// is ever invoked — used to prove the `.terraform` marker check skips
    /// re-initialization.
    struct RefusesInit;

    #[async_trait]
    impl RunCommand for RefusesInit {
        async fn run(&self, _working_dir: &str, command: &[String]) -> CoreResult<String> {
            if command.first().map(String::as_str) == Some("init") {
                return Err(CoreError::Other("init should not run when already initialized".to_string()));
            }
            Ok(r#"{"x": {"value": 5}}"#.to_string())
        }
    }

    /// Tolerates `init` failing, then on `output` asserts `backend.tf` in
    /// the working dir holds the generated stanza before answering.
    struct ChecksGeneratedBackendFile {
        expected_stanza: String,
    }

    #[async_trait]
    impl RunCommand for ChecksGeneratedBackendFile {
        async fn run(&self, working_dir: &str, command: &[String]) -> CoreResult<String> {
            match command.first().map(String::as_str) {
                Some("init") => Ok(String::new()),
                Some("output") => {
                    let written = std::fs::read_to_string(std::path::Path::new(working_dir).join("backend.tf"))
                        .map_err(|e| CoreError::Other(e.to_string()))?;
                    if written != self.expected_stanza {
                        return Err(CoreError::Other("backend.tf contents did not match".to_string()));
                    }
                    Ok(r#"{"x": {"value": 5}}"#.to_string())
                }
                _ => Err(CoreError::Other("unexpected command".to_string())),
            }
        }
    }

    fn dep_for_target(target: &str) -> Dependency {
        let mut dep = Dependency::new("d");
        dep.config_path = crate::config::expr::Expression::Literal(DynValue::String(target.to_string()));
        dep
    }

    #[tokio::test]
    async fn optimized_read_skips_init_when_terraform_marker_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".terraform")).unwrap();
        let target = dir.path().join("terragrunt.hcl");
        std::fs::write(&target, "").unwrap();

        let mut backends = BackendRegistry::new();
        backends.register(Arc::new(RecordingBackend { stanza: "irrelevant".to_string() }));

        let shared = DependencyResolverShared {
            caches: Arc::new(Caches::new()),
            run_self: Arc::new(crate::runtime::NoopRunCommand),
            run_command: Arc::new(RefusesInit),
            backends: Arc::new(backends),
            remote_state_source: Arc::new(FixedRemoteState(RemoteStateBlock {
                backend: Some("s3".to_string()),
                ..Default::default()
            })),
            command: "apply".to_string(),
        };

        let dep = dep_for_target(&target.display().to_string());
        let resolved = shared.resolve_one(&dep).await.unwrap();
        assert_eq!(resolved.outputs.get_path(&["x".to_string()]), Some(&DynValue::Number(5.0)));
    }

    #[tokio::test]
    async fn optimized_read_without_marker_writes_generated_backend_tf() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("terragrunt.hcl");
        std::fs::write(&target, "").unwrap();

        let stanza = r#"terraform { backend "s3" { bucket = "my-bucket" } }"#.to_string();
        let mut backends = BackendRegistry::new();
        backends.register(Arc::new(RecordingBackend { stanza: stanza.clone() }));

        let shared = DependencyResolverShared {
            caches: Arc::new(Caches::new()),
            run_self: Arc::new(crate::runtime::NoopRunCommand),
            run_command: Arc::new(ChecksGeneratedBackendFile { expected_stanza: stanza }),
            backends: Arc::new(backends),
            remote_state_source: Arc::new(FixedRemoteState(RemoteStateBlock {
                backend: Some("s3".to_string()),
                config: std::collections::BTreeMap::from([("bucket".to_string(), DynValue::String("my-bucket".to_string()))]),
                ..Default::default()
            })),
            command: "apply".to_string(),
        };

        let dep = dep_for_target(&target.display().to_string());
        let resolved = shared.resolve_one(&dep).await.unwrap();
        assert_eq!(resolved.outputs.get_path(&["x".to_string()]), Some(&DynValue::Number(5.0)));
    }

    #[tokio::test]
    async fn disable_dependency_optimization_falls_back_to_tool() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("terragrunt.hcl");
        std::fs::write(&target, "").unwrap();

        let shared = DependencyResolverShared {
            caches: Arc::new(Caches::new()),
            run_self: Arc::new(EmptyOutputsRunSelf),
            run_command: Arc::new(RefusesInit),
            backends: Arc::new(BackendRegistry::new()),
            remote_state_source: Arc::new(FixedRemoteState(RemoteStateBlock {
                backend: Some("s3".to_string()),
                disable_dependency_optimization: true,
                ..Default::default()
            })),
            command: "validate".to_string(),
        };

        let dep = dep_for_target(&target.display().to_string());
        let result = shared.resolve_one(&dep).await;
        assert!(matches!(result, Err(CoreError::TerragruntOutputTargetNoOutputs { .. })));
    }

    #[tokio::test]
    async fn unregistered_backend_name_falls_back_to_tool() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("terragrunt.hcl");
        std::fs::write(&target, "").unwrap();

        let shared = DependencyResolverShared {
            caches: Arc::new(Caches::new()),
            run_self: Arc::new(EmptyOutputsRunSelf),
            run_command: Arc::new(RefusesInit),
            backends: Arc::new(BackendRegistry::new()),
            remote_state_source: Arc::new(FixedRemoteState(RemoteStateBlock {
                backend: Some("gcs".to_string()),
                ..Default::default()
            })),
            command: "validate".to_string(),
        };

        let dep = dep_for_target(&target.display().to_string());
        let result = shared.resolve_one(&dep).await;
        assert!(matches!(result, Err(CoreError::TerragruntOutputTargetNoOutputs { .. })));
    }
}
