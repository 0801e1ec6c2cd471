//! End-to-end coverage for the seven concrete scenarios of spec §8.3,
//! driven through the full `Orchestrator::parse` pipeline rather than
//! through any one module in isolation.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tg_core::error::CoreError;
use tg_core::orchestrator::Orchestrator;
use tg_core::remote_state::BackendRegistry;
use tg_core::runtime::{CallerIdentity, Credentials, CredentialProvider, NoopRunCommand, RunSelf};
use tg_core::session::ParsingSession;

struct NoopCredentials;

#[async_trait]
impl CredentialProvider for NoopCredentials {
    async fn assume_role(&self, _role_arn: &str, _session_name: &str) -> tg_core::error::CoreResult<Credentials> {
        Err(CoreError::Other("no credentials".to_string()))
    }
    async fn caller_identity(&self) -> tg_core::error::CoreResult<CallerIdentity> {
        Err(CoreError::Other("no credentials".to_string()))
    }
}

/// Always reports empty outputs, simulating a dependency target that
/// exists but has never been applied (S6).
struct EmptyOutputsRunSelf;

#[async_trait]
impl RunSelf for EmptyOutputsRunSelf {
    async fn run_self(&self, _config_path: &str, _args: &[String]) -> tg_core::error::CoreResult<String> {
        Ok("{}".to_string())
    }
}

fn session_with_command(command: &str) -> Arc<ParsingSession> {
    let noop = Arc::new(NoopRunCommand);
    Arc::new(ParsingSession::new(
        "/work",
        command,
        noop.clone(),
        noop,
        Arc::new(NoopCredentials),
    ))
}

fn session_with_run_self(command: &str, run_self: Arc<dyn RunSelf>) -> Arc<ParsingSession> {
    let noop = Arc::new(NoopRunCommand);
    Arc::new(ParsingSession::new("/work", command, noop, run_self, Arc::new(NoopCredentials)))
}

fn orchestrator(session: Arc<ParsingSession>) -> Arc<Orchestrator> {
    Orchestrator::new(session, Arc::new(BackendRegistry::new()))
}

#[tokio::test]
async fn s1_minimal_remote_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("terragrunt.hcl");
    std::fs::write(&path, r#"remote_state { backend = "s3" }"#).unwrap();

    let cfg = orchestrator(session_with_command("plan")).parse(&path).await.unwrap();
    let remote_state = cfg.remote_state.unwrap();
    assert_eq!(remote_state.backend.as_deref(), Some("s3"));
    assert!(remote_state.config.is_empty());
}

#[tokio::test]
async fn s2_missing_backend_attribute() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("terragrunt.hcl");
    std::fs::write(&path, "remote_state {}").unwrap();

    let result = orchestrator(session_with_command("plan")).parse(&path).await;
    assert!(matches!(result, Err(CoreError::RemoteBackendMissing)));
}

#[tokio::test]
async fn s3_include_with_override() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("terragrunt.hcl"),
        r#"
        remote_state {
          backend = "s3"
          config = {
            bucket = "p"
            key    = "k"
            region = "r"
          }
        }
        "#,
    )
    .unwrap();

    let child_dir = dir.path().join("a/b/c");
    std::fs::create_dir_all(&child_dir).unwrap();
    let child_path = child_dir.join("terragrunt.hcl");
    std::fs::write(
        &child_path,
        r#"
        include {
          path = find_in_parent_folders()
        }
        remote_state {
          backend = "s3"
          config = {
            bucket  = "override"
            key     = "override"
            region  = "override"
            encrypt = false
          }
        }
        "#,
    )
    .unwrap();

    let cfg = orchestrator(session_with_command("plan")).parse(&child_path).await.unwrap();
    let remote_state = cfg.remote_state.unwrap();
    assert_eq!(
        remote_state.config.get("bucket"),
        Some(&tg_core::value::DynValue::String("override".to_string()))
    );
    assert_eq!(
        remote_state.config.get("encrypt"),
        Some(&tg_core::value::DynValue::Bool(false))
    );
}

#[tokio::test]
async fn s4_two_level_inheritance_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("terragrunt.hcl"), "remote_state { backend = \"s3\" }").unwrap();

    let parent_dir = dir.path().join("parent");
    std::fs::create_dir_all(&parent_dir).unwrap();
    std::fs::write(
        parent_dir.join("terragrunt.hcl"),
        r#"include { path = find_in_parent_folders() }"#,
    )
    .unwrap();

    let child_dir = parent_dir.join("child");
    std::fs::create_dir_all(&child_dir).unwrap();
    let child_path = child_dir.join("terragrunt.hcl");
    std::fs::write(&child_path, r#"include { path = find_in_parent_folders() }"#).unwrap();

    let result = orchestrator(session_with_command("plan")).parse(&child_path).await;
    assert!(matches!(result, Err(CoreError::TooManyLevelsOfInheritance { .. })));
}

#[tokio::test]
async fn s5_dependency_cycle_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let a_dir = dir.path().join("a");
    let b_dir = dir.path().join("b");
    std::fs::create_dir_all(&a_dir).unwrap();
    std::fs::create_dir_all(&b_dir).unwrap();

    let a_path = a_dir.join("terragrunt.hcl");
    let b_path = b_dir.join("terragrunt.hcl");

    std::fs::write(
        &a_path,
        format!(
            r#"dependency "b" {{ config_path = "{}" }}"#,
            b_path.display()
        ),
    )
    .unwrap();
    std::fs::write(
        &b_path,
        format!(
            r#"dependency "a" {{ config_path = "{}" }}"#,
            a_path.display()
        ),
    )
    .unwrap();

    let result = orchestrator(session_with_command("plan")).parse(&a_path).await;
    match result {
        Err(CoreError::DependencyCycle(cycle)) => {
            assert!(cycle.contains(&a_path));
            assert!(cycle.contains(&b_path));
        }
        other => panic!("expected DependencyCycle, got {other:?}"),
    }
}

fn write_mocked_dependency(dir: &std::path::Path, target: &PathBuf) {
    std::fs::write(
        dir.join("terragrunt.hcl"),
        format!(
            r#"
            dependency "d" {{
              config_path = "{}"
              mock_outputs = {{ x = 1 }}
              mock_outputs_allowed_terraform_commands = ["validate"]
            }}
            inputs = {{ check = dependency.d.outputs.x }}
            "#,
            target.display()
        ),
    )
    .unwrap();
}

#[tokio::test]
async fn s6_apply_with_no_real_outputs_and_disallowed_mocks_fails() {
    let dir = tempfile::tempdir().unwrap();
    let consumer_dir = dir.path().join("unit");
    let target_dir = dir.path().join("d");
    std::fs::create_dir_all(&consumer_dir).unwrap();
    std::fs::create_dir_all(&target_dir).unwrap();
    let target_path = target_dir.join("terragrunt.hcl");
    std::fs::write(&target_path, "").unwrap();
    write_mocked_dependency(&consumer_dir, &target_path);

    let session = session_with_run_self("apply", Arc::new(EmptyOutputsRunSelf));
    let result = orchestrator(session).parse(&consumer_dir.join("terragrunt.hcl")).await;
    assert!(matches!(
        result,
        Err(CoreError::TerragruntOutputTargetNoOutputs { .. })
    ));
}

#[tokio::test]
async fn s6_validate_falls_back_to_mocks() {
    let dir = tempfile::tempdir().unwrap();
    let consumer_dir = dir.path().join("unit");
    let target_dir = dir.path().join("d");
    std::fs::create_dir_all(&consumer_dir).unwrap();
    std::fs::create_dir_all(&target_dir).unwrap();
    let target_path = target_dir.join("terragrunt.hcl");
    std::fs::write(&target_path, "").unwrap();
    write_mocked_dependency(&consumer_dir, &target_path);

    let session = session_with_run_self("validate", Arc::new(EmptyOutputsRunSelf));
    let cfg = orchestrator(session)
        .parse(&consumer_dir.join("terragrunt.hcl"))
        .await
        .unwrap();
    assert_eq!(cfg.dependencies_block[0].name, "d");
    assert_eq!(
        cfg.inputs.get("check"),
        Some(&tg_core::value::DynValue::Number(1.0))
    );
}

#[tokio::test]
async fn s7_hook_override_by_name() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("terragrunt.hcl"),
        r#"
        terraform {
          before_hook "h" {
            commands = ["parent-apply"]
            execute  = ["true"]
          }
        }
        "#,
    )
    .unwrap();

    let child_dir = dir.path().join("child");
    std::fs::create_dir_all(&child_dir).unwrap();
    let child_path = child_dir.join("terragrunt.hcl");
    std::fs::write(
        &child_path,
        r#"
        include {
          path = find_in_parent_folders()
        }
        terraform {
          before_hook "h" {
            commands = ["child-apply"]
            execute  = ["true"]
          }
        }
        "#,
    )
    .unwrap();

    let cfg = orchestrator(session_with_command("plan")).parse(&child_path).await.unwrap();
    assert_eq!(cfg.terraform.before_hooks.len(), 1);
    assert_eq!(cfg.terraform.before_hooks[0].commands, vec!["child-apply".to_string()]);
}
