//! Processing-execution action against a mocked Entrepôt API: creation
//! pipeline, reconciliation behaviors, monitoring and interrupt handling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use entrepot_client::{ApiRequester, Authenticator, ProcessingExecution};
use gpf_common::{Config, GpfError};
use gpf_workflow::{ActionContext, Behavior, InterruptSignal, ProcessingExecutionAction};

fn context_for(server: &MockServer) -> ActionContext {
    let overlay = format!(
        "[store_api]\n\
         root_url = {uri}\n\
         root_datastore = TEST\n\
         nb_attempts = 3\n\
         sec_between_attempts = 0\n\
         [store_authentification]\n\
         token_url = {uri}/auth/token\n\
         login = TEST_LOGIN\n\
         password = TEST_PASSWORD\n\
         nb_attempts = 3\n\
         sec_between_attempts = 0\n\
         [processing_execution]\n\
         nb_sec_between_check_updates = 0\n",
        uri = server.uri()
    );
    let config = Arc::new(Config::from_ini_str(&overlay).unwrap());
    let auth = Arc::new(Authenticator::new(config.clone()));
    let api = Arc::new(ApiRequester::new(config.clone(), auth));
    ActionContext::new(config, api)
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test_token",
            "expires_in": 300
        })))
        .mount(server)
        .await;
}

fn new_output_definition() -> Value {
    json!({
        "type": "processing-execution",
        "body_parameters": {
            "processing": "proc-1",
            "inputs": {},
            "output": {"stored_data": {"name": "X"}},
            "parameters": {}
        },
        "tags": {"t": "v"},
        "comments": ["c1", "c2"]
    })
}

fn action(
    context: &ActionContext,
    definition: Value,
    behavior: Behavior,
) -> ProcessingExecutionAction {
    ProcessingExecutionAction::new(context.clone(), "test/étape", definition, Some(behavior), Some(false))
        .unwrap()
}

async fn mount_empty_stored_data_list(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

/// S5: fresh create applies every step in order.
#[tokio::test]
async fn fresh_create_runs_the_full_pipeline_in_order() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_empty_stored_data_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-1",
            "status": "CREATED",
            "processing": {"_id": "proc-1", "name": "mon traitement"},
            "inputs": {},
            "output": {"stored_data": {"_id": "sd-9"}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "sd-9", "name": "X", "status": "CREATED"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-9/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-9/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-9/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-1/launch"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let context = context_for(&server);
    let mut action = action(&context, new_output_definition(), Behavior::Stop);
    action.run(None).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let sequence: Vec<(String, String)> = requests
        .iter()
        .filter(|r| r.url.path() != "/auth/token")
        .map(|r| (r.method.to_string(), r.url.path().to_string()))
        .collect();
    assert_eq!(
        sequence,
        vec![
            ("GET".into(), "/api/v1/datastores/TEST/stored_data".into()),
            ("POST".into(), "/api/v1/datastores/TEST/processings/executions".into()),
            ("GET".into(), "/api/v1/datastores/TEST/stored_data/sd-9".into()),
            ("POST".into(), "/api/v1/datastores/TEST/stored_data/sd-9/tags".into()),
            ("GET".into(), "/api/v1/datastores/TEST/stored_data/sd-9/comments".into()),
            ("POST".into(), "/api/v1/datastores/TEST/stored_data/sd-9/comments".into()),
            ("POST".into(), "/api/v1/datastores/TEST/stored_data/sd-9/comments".into()),
            ("POST".into(), "/api/v1/datastores/TEST/processings/executions/pe-1/launch".into()),
        ]
    );

    let comment_bodies: Vec<Value> = requests
        .iter()
        .filter(|r| r.url.path().ends_with("/comments") && r.method.to_string() == "POST")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(comment_bodies, vec![json!({"text": "c1"}), json!({"text": "c2"})]);
}

/// Property 8: a matching pre-existing output with STOP fails before any
/// create or launch.
#[tokio::test]
async fn stop_with_existing_output_fails_without_creating() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([{"_id": "sd-1", "name": "X"}])))
        .mount(&server)
        .await;

    let context = context_for(&server);
    let mut action = action(&context, new_output_definition(), Behavior::Stop);
    let err = action.run(None).await.unwrap_err();
    assert!(err.to_string().contains("existe déjà"));

    let creates = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("/processings/executions") && r.method.to_string() == "POST")
        .count();
    assert_eq!(creates, 0);
}

/// Property 9: CONTINUE with a healthy existing output reuses the job and
/// launches it exactly once (its status is still CREATED).
#[tokio::test]
async fn continue_reuses_the_existing_job_and_launches_once() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([{"_id": "sd-1", "name": "X"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "sd-1", "name": "X", "status": "CREATED"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/processings/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"_id": "pe-7"}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-7",
            "status": "CREATED",
            "processing": {"_id": "proc-1"},
            "inputs": {},
            "output": {"stored_data": {"_id": "sd-1"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-7/launch"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let definition = json!({
        "type": "processing-execution",
        "body_parameters": {
            "processing": "proc-1",
            "inputs": {},
            "output": {"stored_data": {"name": "X"}},
            "parameters": {}
        }
    });
    let context = context_for(&server);
    let mut action = action(&context, definition, Behavior::Continue);
    action.run(None).await.unwrap();

    let creates = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("/processings/executions") && r.method.to_string() == "POST")
        .count();
    assert_eq!(creates, 0);
}

/// Property 10: CONTINUE with an UNSTABLE existing output fails without
/// creating anything.
#[tokio::test]
async fn continue_with_unstable_output_fails() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([{"_id": "sd-1", "name": "X"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "sd-1", "name": "X", "status": "UNSTABLE"
        })))
        .mount(&server)
        .await;

    let context = context_for(&server);
    let mut action = action(&context, new_output_definition(), Behavior::Continue);
    let err = action.run(None).await.unwrap_err();
    assert!(err.to_string().contains("a échoué"));
}

/// RESUME on an UNSTABLE output deletes it and recreates from scratch.
#[tokio::test]
async fn resume_with_unstable_output_deletes_and_recreates() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([{"_id": "sd-1", "name": "X"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "sd-1", "name": "X", "status": "UNSTABLE"
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-2",
            "status": "CREATED",
            "processing": {"_id": "proc-1"},
            "inputs": {},
            "output": {"stored_data": {"_id": "sd-2"}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "sd-2", "name": "X", "status": "CREATED"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-2/launch"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let definition = json!({
        "type": "processing-execution",
        "body_parameters": {
            "processing": "proc-1",
            "inputs": {},
            "output": {"stored_data": {"name": "X"}},
            "parameters": {}
        }
    });
    let context = context_for(&server);
    let mut action = action(&context, definition, Behavior::Resume);
    action.run(None).await.unwrap();
}

/// Update path, STOP: an equivalent job (same inputs, same parameters)
/// already targets the output entity.
#[tokio::test]
async fn update_path_stop_with_matching_job_fails() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "sd-5", "status": "GENERATED"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/processings/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"_id": "pe-9"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-9",
            "status": "SUCCESS",
            "inputs": {"upload": [{"_id": "u1"}]},
            "parameters": {"p": 1}
        })))
        .mount(&server)
        .await;

    let definition = json!({
        "type": "processing-execution",
        "body_parameters": {
            "processing": "proc-1",
            "inputs": {"upload": ["u1"]},
            "output": {"stored_data": {"_id": "sd-5"}},
            "parameters": {"p": 1}
        }
    });
    let context = context_for(&server);
    let mut action = action(&context, definition, Behavior::Stop);
    let err = action.run(None).await.unwrap_err();
    assert!(err.to_string().contains("déjà été lancé"));
}

/// Update path: a candidate whose inputs differ is not a match, so a fresh
/// job is created.
#[tokio::test]
async fn update_path_input_mismatch_creates_a_fresh_job() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "sd-5", "status": "GENERATED"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/processings/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"_id": "pe-9"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-9",
            "status": "SUCCESS",
            "inputs": {"upload": [{"_id": "u2"}]},
            "parameters": {"p": 1}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-10",
            "status": "CREATED",
            "processing": {"_id": "proc-1"},
            "inputs": {"upload": [{"_id": "u1"}]},
            "output": {"stored_data": {"_id": "sd-5"}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/uploads/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "u1", "status": "CLOSED"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-10/launch"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let definition = json!({
        "type": "processing-execution",
        "body_parameters": {
            "processing": "proc-1",
            "inputs": {"upload": ["u1"]},
            "output": {"stored_data": {"_id": "sd-5"}},
            "parameters": {"p": 1}
        }
    });
    let context = context_for(&server);
    let mut action = action(&context, definition, Behavior::Stop);
    action.run(None).await.unwrap();
}

/// Property 13: re-running an action adds only the comments that are not
/// already present.
#[tokio::test]
async fn comments_are_idempotent() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_empty_stored_data_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-1",
            "status": "CREATED",
            "processing": {"_id": "proc-1"},
            "inputs": {},
            "output": {"stored_data": {"_id": "sd-9"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "sd-9", "name": "X", "status": "CREATED"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-9/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-9/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"text": "c1"}])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-9/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-1/launch"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let context = context_for(&server);
    let mut action = action(&context, new_output_definition(), Behavior::Stop);
    action.run(None).await.unwrap();

    let added: Vec<Value> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("/comments") && r.method.to_string() == "POST")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(added, vec![json!({"text": "c2"})]);
}

/// Property 11: the callback fires once per polling iteration, terminal
/// refresh included, and the terminal status is returned verbatim.
#[tokio::test]
async fn monitoring_invokes_callback_each_iteration_and_returns_status() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_empty_stored_data_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-1",
            "status": "CREATED",
            "processing": {"_id": "proc-1"},
            "inputs": {},
            "output": {"stored_data": {"_id": "sd-9"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "sd-9", "name": "X", "status": "CREATED"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-1/launch"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-1", "status": "CREATED"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-1", "status": "PROGRESS"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-1", "status": "SUCCESS"
        })))
        .mount(&server)
        .await;

    let context = context_for(&server);
    let definition = json!({
        "type": "processing-execution",
        "body_parameters": {
            "processing": "proc-1",
            "inputs": {},
            "output": {"stored_data": {"name": "X"}},
            "parameters": {}
        }
    });
    let mut action = action(&context, definition, Behavior::Stop);
    action.run(None).await.unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let callback = move |_: &ProcessingExecution| {
        counter.fetch_add(1, Ordering::SeqCst);
    };
    let interrupt = InterruptSignal::new();
    let status = action
        .monitoring_until_end(Some(&callback), None, &interrupt)
        .await
        .unwrap();
    assert_eq!(status, "SUCCESS");
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

/// Property 12 / S6: interrupt with a confirming ctrl-c handler aborts the
/// job, deletes the freshly created upload output once the job reports
/// ABORTED, and surfaces the interruption.
#[tokio::test]
async fn interrupt_aborts_job_and_deletes_new_upload_output() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-2",
            "status": "CREATED",
            "processing": {"_id": "proc-1"},
            "inputs": {},
            "output": {"upload": {"_id": "up-7"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/uploads/up-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "up-7", "name": "U", "status": "OPEN"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-2/launch"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-2", "status": "PROGRESS"
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-2", "status": "ABORTED"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-2/abort"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/datastores/TEST/uploads/up-7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let definition = json!({
        "type": "processing-execution",
        "body_parameters": {
            "processing": "proc-1",
            "inputs": {},
            "output": {"upload": {"name": "U"}},
            "parameters": {}
        }
    });
    let context = context_for(&server);
    let mut action = action(&context, definition, Behavior::Stop);
    action.run(None).await.unwrap();

    let interrupt = InterruptSignal::new();
    interrupt.fire();
    let ctrl_c = || true;
    let err = action
        .monitoring_until_end(None, Some(&ctrl_c), &interrupt)
        .await
        .unwrap_err();
    assert!(matches!(err, GpfError::Interrupted));
}

/// A ctrl-c handler that declines keeps the monitoring loop going.
#[tokio::test]
async fn declined_interrupt_resumes_polling() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_empty_stored_data_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-3",
            "status": "CREATED",
            "processing": {"_id": "proc-1"},
            "inputs": {},
            "output": {"stored_data": {"_id": "sd-3"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/stored_data/sd-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "sd-3", "name": "X", "status": "CREATED"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-3/launch"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-3", "status": "PROGRESS"
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datastores/TEST/processings/executions/pe-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "pe-3", "status": "SUCCESS"
        })))
        .mount(&server)
        .await;

    let definition = json!({
        "type": "processing-execution",
        "body_parameters": {
            "processing": "proc-1",
            "inputs": {},
            "output": {"stored_data": {"name": "X"}},
            "parameters": {}
        }
    });
    let context = context_for(&server);
    let mut action = action(&context, definition, Behavior::Stop);
    action.run(None).await.unwrap();

    let interrupt = InterruptSignal::new();
    interrupt.fire();
    let ctrl_c = || false;
    let status = action
        .monitoring_until_end(None, Some(&ctrl_c), &interrupt)
        .await
        .unwrap();
    assert_eq!(status, "SUCCESS");

    // no abort must have been issued
    let aborts = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("/abort"))
        .count();
    assert_eq!(aborts, 0);
}
