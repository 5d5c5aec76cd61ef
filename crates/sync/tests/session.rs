use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pipeline::{
    AddNode, ConfigSchema, ConnectNodes, ConnectionId, ExecutionAck, FieldKind, FieldSchema,
    GraphError, NodeConfig, NodeId, NodeKind, NodeStatus, NodeTemplate, Pipeline, PipelineId,
    PipelineService, Position, RemoteRequestError, TemplateId, TemplateRegistry, REQUIRED_MESSAGE,
};
use serde_json::json;
use sync::{PersistState, PipelineSession, Reconciled, SyncError};
use tokio::sync::Notify;

/// Pauses a fake service call until the test releases it.
#[derive(Default)]
struct Gate {
    started: Notify,
    release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.started.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
struct FakeService {
    creates: AtomicUsize,
    adds: AtomicUsize,
    connects: AtomicUsize,
    executes: AtomicUsize,
    fail_create: AtomicBool,
    fail_add: AtomicBool,
    /// When set, `add_node` returns this id instead of a fresh one.
    fixed_node_id: Mutex<Option<String>>,
    /// Config of every `add_node` request, in arrival order.
    received_configs: Mutex<Vec<NodeConfig>>,
    add_gate: Option<Arc<Gate>>,
    connect_gate: Option<Arc<Gate>>,
    execute_gate: Option<Arc<Gate>>,
}

fn unavailable() -> RemoteRequestError {
    RemoteRequestError::Status {
        status: 503,
        body: "unavailable".into(),
        retry_after: None,
    }
}

#[async_trait]
impl PipelineService for FakeService {
    async fn node_templates(&self) -> Result<TemplateRegistry, RemoteRequestError> {
        Ok(registry())
    }

    async fn create_pipeline(&self, request: &pipeline::CreatePipeline) -> Result<PipelineId, RemoteRequestError> {
        assert_eq!(request.name, "Churn");
        // Give a concurrent caller the chance to race for creation.
        tokio::task::yield_now().await;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(PipelineId::new("p1").unwrap())
    }

    async fn add_node(&self, pipeline: &PipelineId, request: &AddNode) -> Result<NodeId, RemoteRequestError> {
        assert_eq!(pipeline.as_str(), "p1");
        self.received_configs.lock().unwrap().push(request.config.clone());
        if let Some(gate) = &self.add_gate {
            gate.pass().await;
        }
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let n = self.adds.fetch_add(1, Ordering::SeqCst) + 1;
        let fixed = self.fixed_node_id.lock().unwrap().clone();
        Ok(NodeId::new(fixed.unwrap_or_else(|| format!("n{n}"))).unwrap())
    }

    async fn connect_nodes(
        &self,
        _pipeline: &PipelineId,
        _request: &ConnectNodes,
    ) -> Result<ConnectionId, RemoteRequestError> {
        if let Some(gate) = &self.connect_gate {
            gate.pass().await;
        }
        let n = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ConnectionId::new(format!("c{n}")).unwrap())
    }

    async fn execute(&self, _pipeline: &PipelineId) -> Result<ExecutionAck, RemoteRequestError> {
        if let Some(gate) = &self.execute_gate {
            gate.pass().await;
        }
        self.executes.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionAck {
            status: Some("queued".into()),
            run_id: None,
        })
    }
}

fn registry() -> TemplateRegistry {
    let mut csv_schema = ConfigSchema::new();
    csv_schema.insert("path".into(), FieldSchema::new(FieldKind::File).required());
    TemplateRegistry::from_templates([
        NodeTemplate {
            id: TemplateId::new("csv_source").unwrap(),
            kind: NodeKind::Source,
            name: "CSV File".into(),
            description: "Reads a CSV file".into(),
            icon: "file".into(),
            category: "Sources".into(),
            config_schema: csv_schema,
        },
        NodeTemplate {
            id: TemplateId::new("dedupe").unwrap(),
            kind: NodeKind::Transform,
            name: "Deduplicate".into(),
            description: String::new(),
            icon: "filter".into(),
            category: "Transforms".into(),
            config_schema: ConfigSchema::new(),
        },
    ])
}

fn tid(s: &str) -> TemplateId {
    TemplateId::new(s).unwrap()
}

fn nid(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

fn session(service: FakeService) -> PipelineSession<FakeService> {
    PipelineSession::new(service, registry(), Pipeline::new("Churn", "weekly churn", "retail"))
}

fn config(value: serde_json::Value) -> NodeConfig {
    serde_json::from_value(value).unwrap()
}

async fn added(session: &PipelineSession<FakeService>, template: &str) -> NodeId {
    session
        .add_node(&tid(template), Position::default(), NodeConfig::new())
        .await
        .unwrap()
        .applied()
        .unwrap()
        .id
}

#[tokio::test]
async fn first_add_node_persists_the_pipeline_shell() {
    let session = session(FakeService::default());
    assert_eq!(session.persist_state().await, PersistState::Unsaved);

    let node = session
        .add_node(&tid("csv_source"), Position::new(40.0, 60.0), NodeConfig::new())
        .await
        .unwrap()
        .applied()
        .unwrap();

    assert_eq!(node.id, nid("n1"));
    assert_eq!(node.status, NodeStatus::Configured);
    assert!(node.config.is_empty());
    assert_eq!(node.kind, NodeKind::Source);
    assert_eq!(node.name, "CSV File");
    assert_eq!(session.service().creates.load(Ordering::SeqCst), 1);
    assert_eq!(
        session.persist_state().await,
        PersistState::Saved(PipelineId::new("p1").unwrap())
    );

    let graph = session.snapshot().await;
    assert_eq!(graph.id().map(|id| id.as_str()), Some("p1"));
    assert_eq!(graph.nodes().len(), 1);

    added(&session, "dedupe").await;
    assert_eq!(session.service().creates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn add_node_sends_its_config_and_mirrors_it_locally() {
    let session = session(FakeService::default());
    let sent = config(json!({"path": "sales.csv"}));

    let node = session
        .add_node(&tid("csv_source"), Position::default(), sent.clone())
        .await
        .unwrap()
        .applied()
        .unwrap();

    assert_eq!(node.config, sent);
    assert_eq!(*session.service().received_configs.lock().unwrap(), vec![sent.clone()]);
    assert_eq!(session.snapshot().await.node(&node.id).unwrap().config, sent);
    assert!(session.validate().await.is_clean());
}

#[tokio::test]
async fn concurrent_first_mutations_create_once() {
    let session = session(FakeService::default());
    let csv = tid("csv_source");
    let dedupe = tid("dedupe");
    let (a, b) = tokio::join!(
        session.add_node(&csv, Position::default(), NodeConfig::new()),
        session.add_node(&dedupe, Position::default(), NodeConfig::new()),
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(session.service().creates.load(Ordering::SeqCst), 1);
    assert_eq!(session.snapshot().await.nodes().len(), 2);
}

#[tokio::test]
async fn unknown_template_fails_before_any_remote_call() {
    let session = session(FakeService::default());
    let result = session
        .add_node(&tid("parquet_source"), Position::default(), NodeConfig::new())
        .await;
    assert_eq!(
        result,
        Err(SyncError::Graph(GraphError::TemplateNotFound {
            template_id: tid("parquet_source")
        }))
    );
    assert_eq!(session.service().creates.load(Ordering::SeqCst), 0);
    assert_eq!(session.service().adds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_create_leaves_session_unsaved() {
    let service = FakeService::default();
    service.fail_create.store(true, Ordering::SeqCst);
    let session = session(service);

    let err = session
        .add_node(&tid("csv_source"), Position::default(), NodeConfig::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Remote(_)));
    assert_eq!(session.persist_state().await, PersistState::Unsaved);
    let graph = session.snapshot().await;
    assert!(graph.id().is_none());
    assert!(graph.nodes().is_empty());

    session.service().fail_create.store(false, Ordering::SeqCst);
    added(&session, "csv_source").await;
    assert_eq!(session.service().creates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_add_leaves_graph_unchanged() {
    let session = session(FakeService::default());
    added(&session, "csv_source").await;
    let before = session.snapshot().await;

    session.service().fail_add.store(true, Ordering::SeqCst);
    let err = session
        .add_node(&tid("dedupe"), Position::default(), NodeConfig::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Remote(RemoteRequestError::Status { status: 503, .. })));
    assert_eq!(session.snapshot().await, before);
    assert!(session.pending().await.is_empty());
}

#[tokio::test]
async fn connect_then_delete_keeps_projection_consistent() {
    let session = session(FakeService::default());
    let n1 = added(&session, "csv_source").await;
    let n2 = added(&session, "dedupe").await;

    let connection = session.connect(&n1, &n2).await.unwrap().applied().unwrap();
    assert_eq!(connection.id.as_str(), "c1");

    let graph = session.snapshot().await;
    assert_eq!(graph.node(&n1).unwrap().outputs(), &[n2.clone()]);
    assert_eq!(graph.node(&n2).unwrap().inputs(), &[n1.clone()]);
    assert_eq!(graph.connections().len(), 1);

    session.delete_node(&n1).await;
    let graph = session.snapshot().await;
    assert!(graph.node(&n2).unwrap().inputs().is_empty());
    assert!(graph.connections().is_empty());
    assert!(graph.is_projection_consistent());
}

#[tokio::test]
async fn invalid_connections_never_reach_the_service() {
    let session = session(FakeService::default());
    let n1 = added(&session, "csv_source").await;

    assert!(matches!(
        session.connect(&n1, &n1).await,
        Err(SyncError::Graph(GraphError::InvalidConnection { .. }))
    ));
    assert_eq!(
        session.connect(&n1, &nid("ghost")).await,
        Err(SyncError::Graph(GraphError::NodeNotFound { node_id: nid("ghost") }))
    );
    assert_eq!(session.service().connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn connect_response_after_delete_is_discarded() {
    let gate = Arc::new(Gate::default());
    let session = session(FakeService {
        connect_gate: Some(gate.clone()),
        ..FakeService::default()
    });
    let n1 = added(&session, "csv_source").await;
    let n2 = added(&session, "dedupe").await;

    let (result, ()) = tokio::join!(session.connect(&n1, &n2), async {
        gate.started.notified().await;
        session.delete_node(&n1).await;
        gate.release.notify_one();
    });

    assert!(result.unwrap().is_discarded());
    let graph = session.snapshot().await;
    assert!(graph.connections().is_empty());
    assert!(graph.node(&n2).unwrap().inputs().is_empty());
    assert!(graph.is_projection_consistent());
}

#[tokio::test]
async fn cancelled_add_is_not_applied() {
    let gate = Arc::new(Gate::default());
    let session = session(FakeService {
        add_gate: Some(gate.clone()),
        ..FakeService::default()
    });

    let dedupe = tid("dedupe");
    let (result, ()) = tokio::join!(session.add_node(&dedupe, Position::default(), NodeConfig::new()), async {
        gate.started.notified().await;
        let pending = session.pending().await;
        assert_eq!(pending.len(), 1);
        assert!(session.cancel(pending[0].0).await);
        gate.release.notify_one();
    });

    assert!(matches!(result, Ok(Reconciled::Discarded { .. })));
    assert!(session.snapshot().await.nodes().is_empty());
}

#[tokio::test]
async fn deleted_node_is_not_resurrected_by_a_late_add() {
    let service = FakeService::default();
    *service.fixed_node_id.lock().unwrap() = Some("n1".into());
    let session = session(service);

    let n1 = added(&session, "dedupe").await;
    session.delete_node(&n1).await;

    let again = session
        .add_node(&tid("dedupe"), Position::default(), NodeConfig::new())
        .await
        .unwrap();
    assert!(again.is_discarded());
    assert!(session.snapshot().await.nodes().is_empty());
}

#[tokio::test]
async fn execute_requires_a_saved_pipeline() {
    let session = session(FakeService::default());
    assert_eq!(session.execute().await, Err(SyncError::NotPersisted));

    added(&session, "dedupe").await;
    let receipt = session.execute().await.unwrap();
    assert_eq!(receipt.pipeline_id.as_str(), "p1");
    assert_eq!(receipt.ack.status.as_deref(), Some("queued"));
    assert_eq!(session.last_execution().await, Some(receipt));
}

#[tokio::test]
async fn second_execute_while_first_is_pending_is_rejected() {
    let gate = Arc::new(Gate::default());
    let session = session(FakeService {
        execute_gate: Some(gate.clone()),
        ..FakeService::default()
    });
    added(&session, "dedupe").await;

    let (first, second) = tokio::join!(session.execute(), async {
        gate.started.notified().await;
        let second = session.execute().await;
        gate.release.notify_one();
        second
    });

    assert!(first.is_ok());
    assert_eq!(second, Err(SyncError::ExecutionInFlight));
    assert_eq!(session.service().executes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn config_updates_report_field_errors() {
    let session = session(FakeService::default());
    let n1 = added(&session, "csv_source").await;

    let errors = session.update_node_config(&n1, NodeConfig::new()).await.unwrap();
    assert_eq!(errors.get("path").map(String::as_str), Some(REQUIRED_MESSAGE));
    assert!(!session.validate().await.is_clean());

    assert!(session
        .update_node_config(&n1, config(json!({"path": "sales.csv"})))
        .await
        .unwrap()
        .is_empty());
    assert!(session.validate().await.is_clean());

    assert!(matches!(
        session.update_node_config(&nid("ghost"), NodeConfig::new()).await,
        Err(SyncError::Graph(GraphError::NodeNotFound { .. }))
    ));
}

#[tokio::test]
async fn status_updates_come_from_outside() {
    let session = session(FakeService::default());
    let n1 = added(&session, "dedupe").await;
    session.set_node_status(&n1, NodeStatus::Completed).await.unwrap();
    assert_eq!(
        session.snapshot().await.node(&n1).unwrap().status,
        NodeStatus::Completed
    );
}
