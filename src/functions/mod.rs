//! Built-in function registry (C3, spec §4.3).
//!
//! Grounded on `so0k-oxid::provider::manager::ProviderManager` for the
//! "closure over shared session state, cached by fingerprint" shape, and
//! on `so0k-oxid::executor::retry` for the cached-external-command pattern
//! backing `run_cmd`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::{Caches, ContentHash};
use crate::error::{CoreError, CoreResult};
use crate::runtime::{CredentialProvider, RunCommand};
use crate::value::DynValue;

/// Recursive re-entry into the orchestrator (C7), backing
/// `read_terragrunt_config` (spec §4.3). Implemented by
/// `crate::orchestrator::Orchestrator`; kept as a trait here (rather than a
/// direct dependency on `crate::orchestrator`) for the same reason
/// `crate::include::ParentResolver` is.
#[async_trait]
pub trait ConfigReader: Send + Sync {
    async fn read_config(&self, path: &Path) -> CoreResult<DynValue>;
}

/// Static lists behind `get_terraform_commands_that_need_vars` / `_locking`
/// (spec §4.3).
pub const COMMANDS_NEEDING_VARS: &[&str] = &[
    "apply", "console", "destroy", "import", "plan", "push", "refresh",
];
pub const COMMANDS_NEEDING_LOCKING: &[&str] = &[
    "apply", "destroy", "import", "init", "plan", "refresh", "taint", "untaint",
];

const DEFAULT_MAX_FOLDERS_TO_CHECK: u32 = 100;

/// Everything a function call needs: session caches, runtime hooks, and the
/// path context used by `find_in_parent_folders` / `path_relative_to_include`.
pub struct FunctionRegistry {
    caches: Option<Arc<Caches>>,
    run_command: Option<Arc<dyn RunCommand>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    config_reader: Option<Arc<dyn ConfigReader>>,
    env: std::collections::HashMap<String, String>,
    working_dir: PathBuf,
    include_paths: std::collections::HashMap<String, PathBuf>,
    max_folders_to_check: u32,
}

impl FunctionRegistry {
    pub fn new(
        caches: Arc<Caches>,
        run_command: Arc<dyn RunCommand>,
        credentials: Arc<dyn CredentialProvider>,
        env: std::collections::HashMap<String, String>,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            caches: Some(caches),
            run_command: Some(run_command),
            credentials: Some(credentials),
            config_reader: None,
            env,
            working_dir,
            include_paths: std::collections::HashMap::new(),
            max_folders_to_check: DEFAULT_MAX_FOLDERS_TO_CHECK,
        }
    }

    /// A registry usable for pure-literal expression evaluation (tests,
    /// partial decodes) where no embedder hooks are wired up.
    pub fn with_no_session_hooks() -> Self {
        Self {
            caches: None,
            run_command: None,
            credentials: None,
            config_reader: None,
            env: std::collections::HashMap::new(),
            working_dir: PathBuf::from("."),
            include_paths: std::collections::HashMap::new(),
            max_folders_to_check: DEFAULT_MAX_FOLDERS_TO_CHECK,
        }
    }

    pub fn bind_include_path(&mut self, label: impl Into<String>, path: PathBuf) {
        self.include_paths.insert(label.into(), path);
    }

    pub fn set_config_reader(&mut self, reader: Arc<dyn ConfigReader>) {
        self.config_reader = Some(reader);
    }

    pub fn call(&self, name: &str, args: &[DynValue]) -> CoreResult<DynValue> {
        match name {
            "find_in_parent_folders" => self.find_in_parent_folders(args),
            "path_relative_to_include" => self.path_relative_to_include(args),
            "path_relative_from_include" => self.path_relative_from_include(args),
            "get_env" => self.get_env(args),
            "read_terragrunt_config" => self.read_terragrunt_config(args),
            "get_terraform_commands_that_need_vars" => Ok(string_list(COMMANDS_NEEDING_VARS)),
            "get_terraform_commands_that_need_locking" => Ok(string_list(COMMANDS_NEEDING_LOCKING)),
            "run_cmd" => self.run_cmd(args),
            "sops_decrypt_file" => self.sops_decrypt_file(args),
            "get_aws_account_id" => self.get_aws_account_id(),
            "get_aws_caller_identity_arn" => self.caller_identity_field("arn"),
            "get_aws_caller_identity_user_id" => self.caller_identity_field("user_id"),
            _ => Err(CoreError::Other(format!("unknown function: {name}"))),
        }
    }

    fn arg_str(args: &[DynValue], idx: usize) -> Option<String> {
        args.get(idx).and_then(|v| v.as_str()).map(str::to_string)
    }

    fn find_in_parent_folders(&self, args: &[DynValue]) -> CoreResult<DynValue> {
        let name = Self::arg_str(args, 0).unwrap_or_else(|| "terragrunt.hcl".to_string());
        let default = Self::arg_str(args, 1);

        let cache_key = format!("{}::{}", self.working_dir.display(), name);
        if let Some(caches) = &self.caches {
            if let Some(cached) = caches.parent_folder_lookups.get(&cache_key) {
                return match cached {
                    Some(p) => Ok(DynValue::String(p)),
                    None => default
                        .map(DynValue::String)
                        .ok_or_else(|| self.parent_not_found_err(&name)),
                };
            }
        }

        let mut dir = self.working_dir.clone();
        let mut found = None;
        if dir.pop() {
            for _ in 0..self.max_folders_to_check {
                let candidate = dir.join(&name);
                if candidate.is_file() {
                    found = Some(candidate);
                    break;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        if let Some(caches) = &self.caches {
            caches
                .parent_folder_lookups
                .insert(cache_key, found.as_ref().map(|p| p.display().to_string()));
        }

        match found {
            Some(p) => Ok(DynValue::String(p.display().to_string())),
            None => default
                .map(DynValue::String)
                .ok_or_else(|| self.parent_not_found_err(&name)),
        }
    }

    fn parent_not_found_err(&self, name: &str) -> CoreError {
        CoreError::ParentFileNotFound {
            name: name.to_string(),
            start: self.working_dir.clone(),
        }
    }

    fn path_relative_to_include(&self, args: &[DynValue]) -> CoreResult<DynValue> {
        let label = Self::arg_str(args, 0).unwrap_or_default();
        let include_dir = self.resolve_include_dir(&label)?;
        let rel = relative_path(&include_dir, &self.working_dir);
        Ok(DynValue::String(rel))
    }

    fn path_relative_from_include(&self, args: &[DynValue]) -> CoreResult<DynValue> {
        let label = Self::arg_str(args, 0).unwrap_or_default();
        let include_dir = self.resolve_include_dir(&label)?;
        let rel = relative_path(&self.working_dir, &include_dir);
        Ok(DynValue::String(rel))
    }

    fn resolve_include_dir(&self, label: &str) -> CoreResult<PathBuf> {
        if label.is_empty() {
            return self
                .include_paths
                .values()
                .next()
                .cloned()
                .ok_or_else(|| CoreError::Other("no include is bound in this scope".to_string()));
        }
        self.include_paths
            .get(label)
            .cloned()
            .ok_or_else(|| CoreError::Other(format!("no include named '{label}' is bound")))
    }

    fn get_env(&self, args: &[DynValue]) -> CoreResult<DynValue> {
        let name = Self::arg_str(args, 0)
            .ok_or_else(|| CoreError::InvalidParameterType {
                expected: "string".to_string(),
                actual: "missing".to_string(),
            })?;
        match self.env.get(&name) {
            Some(v) => Ok(DynValue::String(v.clone())),
            None => Ok(Self::arg_str(args, 1).map(DynValue::String).unwrap_or(DynValue::Null)),
        }
    }

    fn read_terragrunt_config(&self, args: &[DynValue]) -> CoreResult<DynValue> {
        let path = Self::arg_str(args, 0).ok_or_else(|| CoreError::InvalidParameterType {
            expected: "string".to_string(),
            actual: "missing".to_string(),
        })?;
        let default = args.get(1).cloned();

        let reader = match &self.config_reader {
            Some(reader) => reader,
            None => return default.ok_or_else(|| CoreError::Other("no ConfigReader hook configured".to_string())),
        };

        let result = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(reader.read_config(Path::new(&path)))
        });

        match result {
            Ok(v) => Ok(v),
            Err(e) => default.ok_or(e),
        }
    }

    fn run_cmd(&self, args: &[DynValue]) -> CoreResult<DynValue> {
        let parts: Vec<String> = args.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
        let fingerprint = ContentHash::of(&parts.iter().map(String::as_str).collect::<Vec<_>>()).to_hex();

        if let Some(caches) = &self.caches {
            if let Some(cached) = caches.run_command.get(&fingerprint) {
                return Ok(DynValue::String(cached));
            }
        }

        let run_command = self
            .run_command
            .as_ref()
            .ok_or_else(|| CoreError::Other("no RunCommand hook configured".to_string()))?;

        let wd = self.working_dir.display().to_string();
        let stdout = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(run_command.run(&wd, &parts))
        })?;

        if let Some(caches) = &self.caches {
            caches.run_command.insert(fingerprint, stdout.clone());
        }
        Ok(DynValue::String(stdout.trim_end().to_string()))
    }

    fn sops_decrypt_file(&self, args: &[DynValue]) -> CoreResult<DynValue> {
        let path = Self::arg_str(args, 0)
            .ok_or_else(|| CoreError::InvalidParameterType {
                expected: "string".to_string(),
                actual: "missing".to_string(),
            })?;
        self.run_cmd(&[DynValue::String("sops".to_string()), DynValue::String("-d".to_string()), DynValue::String(path)])
    }

    fn get_aws_account_id(&self) -> CoreResult<DynValue> {
        self.caller_identity_field("account_id")
    }

    fn caller_identity_field(&self, field: &str) -> CoreResult<DynValue> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| CoreError::Other("no CredentialProvider hook configured".to_string()))?;
        let identity = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(credentials.caller_identity())
        })?;
        Ok(DynValue::String(match field {
            "account_id" => identity.account_id,
            "arn" => identity.arn,
            "user_id" => identity.user_id,
            _ => String::new(),
        }))
    }
}

fn string_list(items: &[&str]) -> DynValue {
    DynValue::List(items.iter().map(|s| DynValue::String(s.to_string())).collect())
}

fn relative_path(base: &Path, target: &Path) -> String {
    pathdiff(target, base).unwrap_or_else(|| target.display().to_string())
}

fn pathdiff(target: &Path, base: &Path) -> Option<String> {
    let target = target.components().collect::<Vec<_>>();
    let base = base.components().collect::<Vec<_>>();
    let common = target.iter().zip(base.iter()).take_while(|(a, b)| a == b).count();
    let mut out = PathBuf::new();
    for _ in common..base.len() {
        out.push("..");
    }
    for comp in &target[common..] {
        out.push(comp.as_os_str());
    }
    if out.as_os_str().is_empty() {
        Some(".".to_string())
    } else {
        Some(out.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_env_falls_back_to_default_then_null() {
        let mut env = std::collections::HashMap::new();
        env.insert("FOO".to_string(), "bar".to_string());
        let registry = FunctionRegistry {
            caches: None,
            run_command: None,
            credentials: None,
            config_reader: None,
            env,
            working_dir: PathBuf::from("."),
            include_paths: Default::default(),
            max_folders_to_check: DEFAULT_MAX_FOLDERS_TO_CHECK,
        };
        assert_eq!(
            registry.call("get_env", &[DynValue::String("FOO".to_string())]).unwrap(),
            DynValue::String("bar".to_string())
        );
        assert_eq!(
            registry
                .call(
                    "get_env",
                    &[DynValue::String("MISSING".to_string()), DynValue::String("d".to_string())]
                )
                .unwrap(),
            DynValue::String("d".to_string())
        );
    }

    #[test]
    fn commands_that_need_vars_is_static() {
        let registry = FunctionRegistry::with_no_session_hooks();
        let result = registry.call("get_terraform_commands_that_need_vars", &[]).unwrap();
        assert!(result.as_list().unwrap().contains(&DynValue::String("apply".to_string())));
    }
}
