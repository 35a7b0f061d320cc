use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GROUP_PATH: &str = "/subscriptions/sub-123/resourcegroups/demo-resource-group";
const STORAGE_PATH: &str = "/subscriptions/sub-123/resourceGroups/demo-resource-group/providers/Microsoft.Storage/storageAccounts/demo";

/// Helper to create a test command isolated from the caller's Azure environment
fn azbuilder() -> Command {
    let mut cmd = Command::cargo_bin("azbuilder").unwrap();
    for var in [
        "AZURE_CLIENT_ID",
        "AZURE_CLIENT_SECRET",
        "AZURE_SUBSCRIPTION_ID",
        "AZURE_TENANT_ID",
        "AZURE_AUTHORITY_HOST",
        "AZBUILDER_ARM_ENDPOINT",
        "AZBUILDER_CONFIG",
        "AZBUILDER_CREDENTIALS",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd
}

struct Inputs {
    _dir: TempDir,
    config: PathBuf,
    credentials: PathBuf,
}

fn inputs(config: &str, credentials: Value) -> Inputs {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("stack.yaml");
    let credentials_path = dir.path().join("credentials.json");
    fs::write(&config_path, config).unwrap();
    fs::write(&credentials_path, credentials.to_string()).unwrap();
    Inputs {
        _dir: dir,
        config: config_path,
        credentials: credentials_path,
    }
}

fn full_credentials() -> Value {
    json!({
        "clientId": "app-id",
        "clientSecret": "s3cret",
        "subscriptionId": "sub-123",
        "tenantId": "tenant-id"
    })
}

fn stack_args<'a>(command: &'a str, stack: &'a str, inputs: &'a Inputs) -> Vec<&'a Path> {
    vec![
        Path::new(command),
        Path::new(stack),
        Path::new("-c"),
        inputs.config.as_path(),
        Path::new("-p"),
        inputs.credentials.as_path(),
    ]
}

// ---------------------------------------------------------------------------
// 1. Help, version and argument errors
// ---------------------------------------------------------------------------

#[test]
fn help_flag_shows_examples() {
    azbuilder()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Provision and tear down Azure resource stacks"))
        .stdout(predicate::str::contains("EXAMPLES:"));
}

#[test]
fn version_flag() {
    azbuilder()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("azbuilder"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn no_args_shows_usage() {
    azbuilder()
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn unknown_stack_kind_is_rejected() {
    azbuilder()
        .args(["create", "vm", "-c", "vm.yaml", "-p", "creds.json"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid value 'vm'"));
}

#[test]
fn create_help_lists_wait_flags() {
    azbuilder()
        .args(["create", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--timeout"))
        .stdout(predicate::str::contains("--interval"));
}

// ---------------------------------------------------------------------------
// 2. Offline validation
// ---------------------------------------------------------------------------

#[test]
fn validate_reports_derived_group() {
    let inputs = inputs("name: demo\nregion: eastus\n", full_credentials());

    let output = azbuilder()
        .args(stack_args("validate", "aks", &inputs))
        .args(["-o", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let summary: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(summary["status"], "valid");
    assert_eq!(summary["name"], "demo");
    assert_eq!(summary["resourceGroup"], "demo-resource-group");
}

#[test]
fn validate_names_missing_client_secret() {
    let inputs = inputs(
        "name: demo\nregion: eastus\n",
        json!({ "clientId": "app-id", "subscriptionId": "sub-123" }),
    );

    azbuilder()
        .args(stack_args("validate", "blob", &inputs))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("could not find clientSecret"))
        .stderr(predicate::str::contains("AZURE_CLIENT_SECRET"));
}

#[test]
fn secret_from_environment_satisfies_validation() {
    let inputs = inputs(
        "name: demo\nregion: eastus\n",
        json!({ "clientId": "app-id", "subscriptionId": "sub-123" }),
    );

    azbuilder()
        .env("AZURE_CLIENT_SECRET", "from-env")
        .args(stack_args("validate", "blob", &inputs))
        .args(["-o", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("status: valid"));
}

#[test]
fn database_stack_requires_database_block() {
    let inputs = inputs("name: orders\nregion: eastus\n", full_credentials());

    azbuilder()
        .args(stack_args("validate", "database", &inputs))
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not find database"))
        .stderr(predicate::str::contains("'database:' block"));
}

#[test]
fn missing_config_file_is_reported() {
    let inputs = inputs("name: demo\nregion: eastus\n", full_credentials());
    let missing = inputs.config.with_file_name("nope.yaml");

    azbuilder()
        .arg("validate")
        .arg("aks")
        .arg("-c")
        .arg(&missing)
        .arg("-p")
        .arg(&inputs.credentials)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"))
        .stderr(predicate::str::contains("nope.yaml"));
}

// ---------------------------------------------------------------------------
// 3. Completions
// ---------------------------------------------------------------------------

#[test]
fn bash_completions_mention_binary() {
    azbuilder()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("azbuilder"));
}

// ---------------------------------------------------------------------------
// 4. Against a mock Resource Manager
// ---------------------------------------------------------------------------

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/tenant-id/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "arm-token"
        })))
        .mount(server)
        .await;
}

/// Run the binary off the runtime so the mock server keeps serving
async fn run(mut cmd: Command) -> assert_cmd::assert::Assert {
    tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap()
}

fn against(server: &MockServer) -> Command {
    let mut cmd = azbuilder();
    cmd.env("AZBUILDER_ARM_ENDPOINT", server.uri())
        .env("AZURE_AUTHORITY_HOST", server.uri());
    cmd
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn create_blob_prints_resource() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("PUT"))
        .and(path(GROUP_PATH))
        .and(query_param("api-version", "2021-04-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "/subscriptions/sub-123/resourceGroups/demo-resource-group",
            "properties": { "provisioningState": "Succeeded" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(STORAGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": STORAGE_PATH,
            "name": "demo",
            "properties": { "provisioningState": "Succeeded" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let inputs = inputs("name: demo\nregion: eastus\n", full_credentials());
    let mut cmd = against(&server);
    cmd.args(stack_args("create", "blob", &inputs))
        .args(["--interval", "1", "-o", "json"]);

    let assert = run(cmd).await.success();
    let resource: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(resource["kind"], "storageAccount");
    assert_eq!(resource["id"], STORAGE_PATH);
    assert_eq!(resource["resourceGroup"], "demo-resource-group");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delete_removes_only_the_group() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("DELETE"))
        .and(path(GROUP_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let inputs = inputs("name: demo\nregion: eastus\n", full_credentials());
    let mut cmd = against(&server);
    cmd.args(stack_args("delete", "aks", &inputs)).args(["-o", "json"]);

    run(cmd)
        .await
        .success()
        .stdout(predicate::str::contains("\"status\": \"deleted\""));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn provider_failure_exits_non_zero_with_phase() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("PUT"))
        .and(path(GROUP_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": {
                "code": "ResourceGroupBeingDeleted",
                "message": "The resource group 'demo-resource-group' is in deprovisioning state."
            }
        })))
        .mount(&server)
        .await;

    let inputs = inputs("name: demo\nregion: eastus\n", full_credentials());
    let mut cmd = against(&server);
    cmd.args(stack_args("create", "blob", &inputs));

    run(cmd)
        .await
        .failure()
        .code(1)
        .stderr(predicate::str::contains("ensure-resource-group"))
        .stderr(predicate::str::contains("ResourceGroupBeingDeleted"))
        .stderr(predicate::str::contains("azbuilder delete"));
}
