//! Runtime hook traits (spec §6.4): how the core asks its embedder to run
//! external commands, re-invoke itself, and mint credentials.
//!
//! Grounded on the `#[async_trait]` shape of `so0k-oxid::state::backend::StateBackend`.

use async_trait::async_trait;

use crate::error::CoreResult;

/// Runs an arbitrary external command (e.g. `terraform output -json`) and
/// returns its captured stdout. Implemented by the embedder; the core never
/// shells out directly so that callers can sandbox, mock, or record/replay.
#[async_trait]
pub trait RunCommand: Send + Sync {
    async fn run(&self, working_dir: &str, command: &[String]) -> CoreResult<String>;
}

/// Re-invokes the host tool against another configuration path, used by
/// `read_terragrunt_config` and by dependency output resolution's
/// "optimized" strategy (spec §5.4).
#[async_trait]
pub trait RunSelf: Send + Sync {
    async fn run_self(&self, config_path: &str, args: &[String]) -> CoreResult<String>;
}

/// Produces short-lived credentials for a named role/provider, backing the
/// `get_aws_account_id` / `get_aws_caller_identity_*` functions (SPEC_FULL §4).
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn assume_role(&self, role_arn: &str, session_name: &str) -> CoreResult<Credentials>;
    async fn caller_identity(&self) -> CoreResult<CallerIdentity>;
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub account_id: String,
    pub arn: String,
    pub user_id: String,
}

/// A `RunCommand` that always fails, used where no embedder hook is wired
/// (e.g. unit tests that never exercise `run_cmd`).
pub struct NoopRunCommand;

#[async_trait]
impl RunCommand for NoopRunCommand {
    async fn run(&self, _working_dir: &str, command: &[String]) -> CoreResult<String> {
        Err(crate::error::CoreError::Other(format!(
            "no RunCommand hook configured; cannot execute: {}",
            command.join(" ")
        )))
    }
}

#[async_trait]
impl RunSelf for NoopRunCommand {
    async fn run_self(&self, config_path: &str, _args: &[String]) -> CoreResult<String> {
        Err(crate::error::CoreError::Other(format!(
            "no RunSelf hook configured; cannot re-invoke for {config_path}"
        )))
    }
}

/// A `CredentialProvider` that always fails, used where no embedder
/// credential hook is wired (e.g. the demo binary, unit tests).
pub struct NoopCredentials;

#[async_trait]
impl CredentialProvider for NoopCredentials {
    async fn assume_role(&self, role_arn: &str, _session_name: &str) -> CoreResult<Credentials> {
        Err(crate::error::CoreError::Other(format!(
            "no CredentialProvider hook configured; cannot assume role {role_arn}"
        )))
    }

    async fn caller_identity(&self) -> CoreResult<CallerIdentity> {
        Err(crate::error::CoreError::Other(
            "no CredentialProvider hook configured".to_string(),
        ))
    }
}
