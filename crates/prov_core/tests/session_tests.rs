//! End-to-end session tests against the mock runner.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use prov_core::{CoreError, CoreResult, Provisioner, ProvisionerConfig};
use prov_iac::IacError;
use prov_proto::{
    channel, AgentAuth, LogLevel, Metadata, ParameterDestination, ParameterValue, ProtoError, ProvisionClient,
    ProvisionRequest, ProvisionResponse, Request, WorkspaceTransition,
};
use prov_runner::{MockResponse, MockRunner};
use tempfile::tempdir;

const VERSION: &str = r#"{"terraform_version":"1.3.7"}"#;

const GRAPH: &str = r#"digraph {
	compound = "true"
	newrank = "true"
	subgraph "root" {
		"[root] coder_agent.dev (expand)" [label = "coder_agent.dev", shape = "box"]
		"[root] null_resource.web (expand)" [label = "null_resource.web", shape = "box"]
		"[root] null_resource.web (expand)" -> "[root] coder_agent.dev (expand)"
		"[root] root" -> "[root] null_resource.web (expand)"
	}
}"#;

const PLAN: &str = r#"{
    "configuration": {"root_module": {"resources": [
        {"address": "coder_agent.dev", "type": "coder_agent", "name": "dev",
         "expressions": {"startup_script": {"constant_value": "code-server"}}},
        {"address": "null_resource.web", "type": "null_resource", "name": "web"}
    ]}},
    "planned_values": {"root_module": {"resources": [
        {"address": "coder_agent.dev", "type": "coder_agent", "name": "dev", "values": {}},
        {"address": "null_resource.web", "type": "null_resource", "name": "web", "values": {}}
    ]}}
}"#;

const STATE: &str = r#"{
    "values": {"root_module": {"resources": [
        {"address": "coder_agent.dev", "type": "coder_agent", "name": "dev",
         "values": {"id": "agent-1", "token": "secret-token", "env": {"A": "B"}}},
        {"address": "null_resource.web", "type": "null_resource", "name": "web", "values": {"id": "42"}}
    ]}}
}"#;

const PLAN_LOG: &str = r#"{"@level":"info","@message":"null_resource.web: Plan to create","type":"planned_change"}"#;

fn base_mock() -> MockRunner {
    MockRunner::new()
        .on("version", MockResponse::success(VERSION))
        .on("init", MockResponse::success("Initializing the backend...\n"))
}

fn provisioner(mock: &MockRunner) -> Provisioner {
    Provisioner::new(
        ProvisionerConfig::default().with_binary_path("/usr/local/bin/terraform"),
        Arc::new(mock.clone()),
    )
}

fn start(dir: &Path) -> ProvisionRequest {
    ProvisionRequest::new(dir).metadata(Metadata {
        service_url: "https://coder.example.com".to_string(),
        workspace_transition: WorkspaceTransition::Start,
        workspace_name: "dev".to_string(),
        workspace_owner: "alice".to_string(),
    })
}

/// Run a session to the end, collecting every response.
async fn run_session(provisioner: Provisioner, request: ProvisionRequest) -> (CoreResult<()>, Vec<ProvisionResponse>) {
    let (mut client, stream) = channel(64);
    let session = tokio::spawn(async move { provisioner.provision(stream).await });
    client.send(Request::Start(request)).await.unwrap();

    let responses = collect(&mut client).await;
    (session.await.unwrap(), responses)
}

async fn collect(client: &mut ProvisionClient) -> Vec<ProvisionResponse> {
    let mut responses = Vec::new();
    while let Some(response) = client.recv().await {
        responses.push(response);
    }
    responses
}

fn logs(responses: &[ProvisionResponse]) -> Vec<(LogLevel, String)> {
    responses
        .iter()
        .filter_map(|r| match r {
            ProvisionResponse::Log(log) => Some((log.level, log.output.clone())),
            ProvisionResponse::Complete(_) => None,
        })
        .collect()
}

fn completion(responses: &[ProvisionResponse]) -> &prov_proto::Complete {
    match responses.last() {
        Some(ProvisionResponse::Complete(complete)) => complete,
        other => panic!("expected completion last, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_before_start_ends_quietly() {
    let mock = base_mock();
    let (mut client, stream) = channel(8);
    client.cancel().await.unwrap();

    provisioner(&mock).provision(stream).await.unwrap();

    assert!(collect(&mut client).await.is_empty());
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_stream_closed_before_start() {
    let (client, stream) = channel(8);
    drop(client);

    let err = provisioner(&base_mock()).provision(stream).await.unwrap_err();
    assert!(matches!(err, CoreError::StreamClosed));
}

#[tokio::test]
async fn test_undecodable_first_message_is_fatal() {
    let (client, stream) = channel(8);
    let decode = serde_json::from_str::<Request>("{\"type\":\"resume\"}").unwrap_err();
    client.send_raw(Err(ProtoError::Decode(decode))).await.unwrap();

    let err = provisioner(&base_mock()).provision(stream).await.unwrap_err();
    assert!(matches!(err, CoreError::Proto(_)));
}

#[tokio::test]
async fn test_dry_run_correlates_plan() {
    let dir = tempdir().unwrap();
    let mock = base_mock()
        .on("plan", MockResponse::success(format!("{}\nnot json\n", PLAN_LOG)))
        .on("show", MockResponse::success(PLAN))
        .on("graph", MockResponse::success(GRAPH));

    let (result, responses) = run_session(provisioner(&mock), start(dir.path()).dry_run()).await;
    result.unwrap();

    assert_eq!(
        logs(&responses),
        vec![
            (LogLevel::Debug, "Initializing the backend...".to_string()),
            (LogLevel::Info, "null_resource.web: Plan to create".to_string()),
        ]
    );

    let complete = completion(&responses);
    assert!(complete.error.is_none());
    assert!(complete.state.is_empty());
    assert_eq!(complete.resources.len(), 1);
    let resource = &complete.resources[0];
    assert_eq!((resource.resource_type.as_str(), resource.name.as_str()), ("null_resource", "web"));
    let agent = resource.agent.as_ref().unwrap();
    assert_eq!(agent.startup_script, "code-server");
    assert_eq!(agent.auth, AgentAuth::Token(String::new()));

    let plan = &mock.get_subcommand_calls("plan")[0];
    let planfile = format!("-out={}", dir.path().join("terraform.tfplan").display());
    assert_eq!(
        plan.args,
        vec!["plan", "-no-color", "-input=false", "-json", "-refresh=true", planfile.as_str()]
    );
    assert_eq!(plan.program, Path::new("/usr/local/bin/terraform"));
    assert_eq!(
        mock.get_subcommand_calls("show")[0].args.last().map(String::as_str),
        Some(dir.path().join("terraform.tfplan").to_str().unwrap())
    );
}

#[tokio::test]
async fn test_apply_returns_state_and_agents() {
    let dir = tempdir().unwrap();
    let mock = base_mock()
        .on("apply", MockResponse::success(PLAN_LOG).writes_file("terraform.tfstate", STATE))
        .on("show", MockResponse::success(STATE))
        .on("graph", MockResponse::success(GRAPH));

    let (result, responses) = run_session(provisioner(&mock), start(dir.path())).await;
    result.unwrap();

    let complete = completion(&responses);
    assert_eq!(complete.state, STATE.as_bytes());
    assert_eq!(complete.resources.len(), 1);
    let agent = complete.resources[0].agent.as_ref().unwrap();
    assert_eq!(agent.id, "agent-1");
    assert_eq!(agent.auth, AgentAuth::Token("secret-token".to_string()));
    assert_eq!(agent.env.get("A").map(String::as_str), Some("B"));

    assert_eq!(
        mock.get_subcommand_calls("apply")[0].args,
        vec!["apply", "-no-color", "-auto-approve", "-input=false", "-json", "-refresh=true"]
    );
}

#[tokio::test]
async fn test_apply_failure_returns_prior_state() {
    let dir = tempdir().unwrap();
    let mock = base_mock().on(
        "apply",
        MockResponse::failure(1, "Error: creating instance: quota exceeded")
            .with_stdout(r#"{"@level":"error","@message":"Error: creating instance","diagnostic":{"severity":"error","summary":"creating instance","detail":"quota exceeded"}}"#),
    );

    let request = start(dir.path()).prior_state(b"prior-state".to_vec());
    let (result, responses) = run_session(provisioner(&mock), request).await;
    result.unwrap();

    assert_eq!(
        logs(&responses)[1..],
        [
            (LogLevel::Error, "Error: creating instance".to_string()),
            (LogLevel::Error, "quota exceeded".to_string()),
        ]
    );
    let complete = completion(&responses);
    assert_eq!(complete.state, b"prior-state");
    assert!(complete.resources.is_empty());
    assert_eq!(
        complete.error.as_deref(),
        Some("exit status 1: Error: creating instance: quota exceeded")
    );
    assert!(!mock.was_called("show"));
}

#[tokio::test]
async fn test_apply_failure_without_state_is_fatal() {
    let dir = tempdir().unwrap();
    let mock = base_mock().on("apply", MockResponse::failure(1, "Error: boom"));

    let (result, responses) = run_session(provisioner(&mock), start(dir.path())).await;

    assert!(matches!(result, Err(CoreError::ReadState { .. })));
    assert!(responses.iter().all(|r| !r.is_complete()));
}

#[tokio::test]
async fn test_prior_state_written_before_engine_runs() {
    let dir = tempdir().unwrap();
    let mock = MockRunner::new().on("version", MockResponse::failure(127, "terraform: not found"));

    let request = start(dir.path()).prior_state(b"{\"version\":4}".to_vec());
    let (result, _) = run_session(provisioner(&mock), request).await;

    assert!(matches!(result, Err(CoreError::Iac(IacError::Version(_)))));
    assert_eq!(
        fs::read(dir.path().join("terraform.tfstate")).unwrap(),
        b"{\"version\":4}"
    );
}

#[tokio::test]
async fn test_dry_run_cancel_completes_with_error() {
    let dir = tempdir().unwrap();
    let mock = base_mock().on(
        "plan",
        MockResponse::failure(1, "Interrupt received.")
            .with_stdout(PLAN_LOG)
            .hold_until_interrupt(),
    );

    let (mut client, stream) = channel(64);
    let provisioner = provisioner(&mock);
    let session = tokio::spawn(async move { provisioner.provision(stream).await });
    client.send(Request::Start(start(dir.path()).dry_run())).await.unwrap();

    let mut responses = Vec::new();
    while let Some(response) = client.recv().await {
        let planning = matches!(&response, ProvisionResponse::Log(log) if log.level == LogLevel::Info);
        responses.push(response);
        if planning {
            client.cancel().await.unwrap();
        }
    }
    session.await.unwrap().unwrap();

    let complete = completion(&responses);
    assert_eq!(complete.error.as_deref(), Some("exit status 1: Interrupt received."));
    assert!(complete.resources.is_empty());
    assert!(mock.get_subcommand_calls("plan")[0].interrupted);
}

#[tokio::test]
async fn test_dry_run_failure_is_fatal() {
    let dir = tempdir().unwrap();
    let mock = base_mock().on("plan", MockResponse::failure(1, "Error: Unsupported argument"));

    let (result, responses) = run_session(provisioner(&mock), start(dir.path()).dry_run()).await;

    match result {
        Err(CoreError::PlanFailed(message)) => assert!(message.contains("Unsupported argument")),
        other => panic!("expected plan failure, got {:?}", other),
    }
    assert!(responses.iter().all(|r| !r.is_complete()));
}

#[tokio::test]
async fn test_old_engine_is_rejected() {
    let dir = tempdir().unwrap();
    let mock = MockRunner::new().on("version", MockResponse::success(r#"{"terraform_version":"1.0.11"}"#));

    let (result, _) = run_session(provisioner(&mock), start(dir.path())).await;

    let err = result.unwrap_err();
    assert!(matches!(err, CoreError::Iac(IacError::VersionTooOld { .. })));
    assert!(err.to_string().contains("is too old. required >= \"1.1.0\""));
    assert!(!mock.was_called("init"));
}

#[tokio::test]
async fn test_init_failure_is_fatal_after_logs() {
    let dir = tempdir().unwrap();
    let mock = MockRunner::new()
        .on("version", MockResponse::success(VERSION))
        .on(
            "init",
            MockResponse::failure(1, "Error: Failed to install provider").with_stdout("Initializing provider plugins...\n"),
        );

    let (result, responses) = run_session(provisioner(&mock), start(dir.path())).await;

    assert!(matches!(result, Err(CoreError::Iac(IacError::InitFailed(_)))));
    assert_eq!(
        logs(&responses),
        vec![(LogLevel::Debug, "Initializing provider plugins...".to_string())]
    );
    assert!(!mock.was_called("apply"));
}

#[tokio::test]
async fn test_unsupported_parameter_stops_before_engine() {
    let dir = tempdir().unwrap();
    let mock = base_mock();
    let mut param = ParameterValue::var("region", "eu");
    param.destination_scheme = ParameterDestination::Unspecified;

    let (result, responses) = run_session(provisioner(&mock), start(dir.path()).parameter(param)).await;

    assert!(matches!(result, Err(CoreError::UnsupportedParameter { .. })));
    assert!(responses.is_empty());
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_parameters_and_identity_reach_engine() {
    let dir = tempdir().unwrap();
    let mock = base_mock()
        .on("apply", MockResponse::success("").writes_file("terraform.tfstate", "{}"))
        .on("show", MockResponse::success("{}"));
    let mut request = start(dir.path())
        .transition(WorkspaceTransition::Destroy)
        .parameter(ParameterValue::env("AWS_REGION", "eu-west-1"))
        .parameter(ParameterValue::var("instance_type", "t3.micro"))
        .parameter(ParameterValue::var("disk", "20"));
    request.metadata.workspace_owner = "bob".to_string();

    let (result, _) = run_session(provisioner(&mock), request).await;
    result.unwrap();

    let apply = &mock.get_subcommand_calls("apply")[0];
    assert_eq!(
        apply.args[6..],
        ["-destroy", "-var", "instance_type=t3.micro", "-var", "disk=20"]
    );
    assert_eq!(apply.env_value("AWS_REGION"), Some("eu-west-1"));
    assert_eq!(apply.env_value("SERVICE_URL"), Some("https://coder.example.com"));
    assert_eq!(apply.env_value("WORKSPACE_TRANSITION"), Some("destroy"));
    assert_eq!(apply.env_value("WORKSPACE_NAME"), Some("dev"));
    assert_eq!(apply.env_value("WORKSPACE_OWNER"), Some("bob"));
    assert_eq!(apply.env_value("instance_type"), None);
}

#[tokio::test]
async fn test_dry_run_destroy_adds_flag() {
    let dir = tempdir().unwrap();
    let mock = base_mock()
        .on("show", MockResponse::success(PLAN))
        .on("graph", MockResponse::success(GRAPH));

    let request = start(dir.path()).dry_run().transition(WorkspaceTransition::Destroy);
    let (result, _) = run_session(provisioner(&mock), request).await;
    result.unwrap();

    assert_eq!(
        mock.get_subcommand_calls("plan")[0].args.last().map(String::as_str),
        Some("-destroy")
    );
}

#[tokio::test]
async fn test_plugin_cache_on_every_invocation() {
    let dir = tempdir().unwrap();
    let mock = base_mock()
        .on("show", MockResponse::success(PLAN))
        .on("graph", MockResponse::success(GRAPH));
    let provisioner = Provisioner::new(
        ProvisionerConfig::default().with_cache_path("/var/cache/tf"),
        Arc::new(mock.clone()),
    );

    let (result, _) = run_session(provisioner, start(dir.path()).dry_run()).await;
    result.unwrap();

    let calls = mock.get_calls();
    assert_eq!(calls.len(), 5);
    for call in calls {
        assert_eq!(call.env_value("TF_PLUGIN_CACHE_DIR"), Some("/var/cache/tf"));
        assert_eq!(call.working_dir.as_deref(), Some(dir.path()));
    }
}

#[tokio::test]
async fn test_correlation_is_idempotent() {
    let mut completions = Vec::new();
    for _ in 0..2 {
        let dir = tempdir().unwrap();
        let mock = base_mock()
            .on("show", MockResponse::success(PLAN))
            .on("graph", MockResponse::success(GRAPH));
        let (result, responses) = run_session(provisioner(&mock), start(dir.path()).dry_run()).await;
        result.unwrap();
        completions.push(completion(&responses).clone());
    }
    assert_eq!(completions[0], completions[1]);
}
