//! Parsing session (spec §4.2): the bundle of caches, policy, and runtime
//! hooks threaded through every stage of [`crate::orchestrator`].
//!
//! Grounded on `so0k-oxid::provider::manager::ProviderManager`, which
//! plays the same role for the teacher (a struct owning the long-lived
//! `Arc`-wrapped maps and handed by reference to everything that needs
//! them).

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::Caches;
use crate::runtime::{CredentialProvider, RunCommand, RunSelf};
use crate::strict::StrictControls;

/// Everything the orchestrator needs that outlives a single config file:
/// environment, caches, strict-control policy, and the embedder's runtime
/// hooks.
pub struct ParsingSession {
    pub working_dir: String,
    pub env: HashMap<String, String>,
    pub command: String,
    pub caches: Arc<Caches>,
    pub strict: StrictControls,
    pub run_command: Arc<dyn RunCommand>,
    pub run_self: Arc<dyn RunSelf>,
    pub credentials: Arc<dyn CredentialProvider>,
}

impl ParsingSession {
    pub fn new(
        working_dir: impl Into<String>,
        command: impl Into<String>,
        run_command: Arc<dyn RunCommand>,
        run_self: Arc<dyn RunSelf>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            env: std::env::vars().collect(),
            command: command.into(),
            caches: Arc::new(Caches::new()),
            strict: StrictControls::new(),
            run_command,
            run_self,
            credentials,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_strict(mut self, strict: StrictControls) -> Self {
        self.strict = strict;
        self
    }

    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::NoopRunCommand;

    struct NoopCredentials;

    #[async_trait::async_trait]
    impl CredentialProvider for NoopCredentials {
        async fn assume_role(
            &self,
            _role_arn: &str,
            _session_name: &str,
        ) -> crate::error::CoreResult<crate::runtime::Credentials> {
            Err(crate::error::CoreError::Other("no credential provider".to_string()))
        }

        async fn caller_identity(&self) -> crate::error::CoreResult<crate::runtime::CallerIdentity> {
            Err(crate::error::CoreError::Other("no credential provider".to_string()))
        }
    }

    #[test]
    fn session_carries_explicit_env_override() {
        let noop = Arc::new(NoopRunCommand);
        let mut env = HashMap::new();
        env.insert("FOO".to_string(), "bar".to_string());
        let session = ParsingSession::new(
            "/work",
            "plan",
            noop.clone(),
            noop,
            Arc::new(NoopCredentials),
        )
        .with_env(env);
        assert_eq!(session.get_env("FOO"), Some("bar"));
    }
}
