//! [`PipelineSession`]: the local graph kept in step with the remote service.

use pipeline::{
    AddNode, ConnectNodes, Connection, CreatePipeline, ExecutionAck, FieldErrors, MutationSeq,
    NodeConfig, NodeId, NodeStatus, Pipeline, PipelineId, PipelineNode, PipelineReport,
    PipelineService, Position, TemplateId, TemplateRegistry, Timestamp,
};
use tokio::sync::Mutex;
use tracing::instrument;

use crate::ledger::{MutationLedger, PendingMutation};
use crate::SyncError;

/// Whether the pipeline exists on the service yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistState {
    /// Never persisted. The first remote mutation creates it.
    Unsaved,
    Saved(PipelineId),
}

/// How a service response was reconciled into the local graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled<T> {
    Applied(T),
    /// The response arrived but no longer applies (cancelled, or its target was
    /// deleted meanwhile). The local graph was not touched.
    Discarded { seq: MutationSeq, reason: String },
}

impl<T> Reconciled<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Reconciled::Applied(value) => Some(value),
            Reconciled::Discarded { .. } => None,
        }
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, Reconciled::Discarded { .. })
    }
}

/// Record of an accepted run request.
///
/// `execute` is not assumed idempotent; callers use the receipt to avoid
/// re-submitting a run that was already accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReceipt {
    pub pipeline_id: PipelineId,
    pub seq: MutationSeq,
    pub accepted_at: Timestamp,
    pub ack: ExecutionAck,
}

struct SessionState {
    graph: Pipeline,
    registry: TemplateRegistry,
    ledger: MutationLedger,
    last_execution: Option<ExecutionReceipt>,
}

/// One pipeline being edited against the remote service.
///
/// Operations take `&self` and may overlap. The graph lock is never held
/// across a service call; responses are matched back through the mutation
/// ledger. Lock order is `persist` before `state`.
pub struct PipelineSession<S> {
    service: S,
    persist: Mutex<PersistState>,
    state: Mutex<SessionState>,
}

impl<S: PipelineService> PipelineSession<S> {
    /// Wraps an existing local pipeline. If it already carries an id it is
    /// treated as saved.
    pub fn new(service: S, registry: TemplateRegistry, graph: Pipeline) -> Self {
        let persist = match graph.id() {
            Some(id) => PersistState::Saved(id.clone()),
            None => PersistState::Unsaved,
        };
        Self {
            service,
            persist: Mutex::new(persist),
            state: Mutex::new(SessionState {
                graph,
                registry,
                ledger: MutationLedger::default(),
                last_execution: None,
            }),
        }
    }

    /// Fetches the template catalog and opens a session on `graph`.
    pub async fn start(service: S, graph: Pipeline) -> Result<Self, SyncError> {
        let registry = service.node_templates().await?;
        tracing::info!(templates = registry.len(), "node template catalog loaded");
        Ok(Self::new(service, registry, graph))
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// A copy of the current local graph.
    pub async fn snapshot(&self) -> Pipeline {
        self.state.lock().await.graph.clone()
    }

    pub async fn registry(&self) -> TemplateRegistry {
        self.state.lock().await.registry.clone()
    }

    pub async fn persist_state(&self) -> PersistState {
        self.persist.lock().await.clone()
    }

    /// Replaces the template registry with a freshly fetched catalog.
    pub async fn refresh_templates(&self) -> Result<(), SyncError> {
        let registry = self.service.node_templates().await?;
        self.state.lock().await.registry = registry;
        Ok(())
    }

    /// Returns the pipeline id, creating the pipeline on the service first if it
    /// has never been saved.
    ///
    /// Concurrent callers wait on the same creation; exactly one create request
    /// is issued. A failed create leaves the session unsaved.
    #[instrument(skip_all)]
    pub async fn ensure_saved(&self) -> Result<PipelineId, SyncError> {
        let mut persist = self.persist.lock().await;
        if let PersistState::Saved(id) = &*persist {
            return Ok(id.clone());
        }

        let request = {
            let state = self.state.lock().await;
            CreatePipeline {
                name: state.graph.name.clone(),
                description: state.graph.description.clone(),
                industry: state.graph.industry.clone(),
            }
        };
        let id = self.service.create_pipeline(&request).await.map_err(|err| {
            tracing::error!(error = %err, "pipeline create failed");
            err
        })?;

        {
            let mut state = self.state.lock().await;
            state.graph = state.graph.with_id(id.clone());
        }
        *persist = PersistState::Saved(id.clone());
        tracing::info!(pipeline_id = %id, "pipeline persisted");
        Ok(id)
    }

    /// Adds a node from `template_id` at `position`, created on the service
    /// with `config`. The local node carries the same config once applied.
    ///
    /// The template is checked locally before anything is sent, so an unknown
    /// template never creates an orphan node on the service.
    #[instrument(skip_all, fields(template_id = %template_id))]
    pub async fn add_node(
        &self,
        template_id: &TemplateId,
        position: Position,
        config: NodeConfig,
    ) -> Result<Reconciled<PipelineNode>, SyncError> {
        self.state.lock().await.registry.require(template_id)?;
        let pipeline_id = self.ensure_saved().await?;

        let seq = self.state.lock().await.ledger.begin(PendingMutation::AddNode {
            template_id: template_id.clone(),
        });
        let request = AddNode {
            template_id: template_id.clone(),
            position,
            config,
        };
        let result = self.service.add_node(&pipeline_id, &request).await;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let pending = state.ledger.finish(seq);
        let node_id = result.map_err(|err| {
            tracing::error!(%seq, error = %err, "add_node failed");
            err
        })?;

        if pending.is_none() {
            return Ok(discard(seq, format!("add_node for {node_id} was cancelled")));
        }
        if state.ledger.is_tombstoned(&node_id) {
            return Ok(discard(seq, format!("node {node_id} was deleted")));
        }

        let (mut node, next) = state
            .graph
            .add_node(&state.registry, template_id, node_id, position)
            .map_err(|err| {
                tracing::error!(%seq, error = %err, "service created a node that cannot be mirrored locally");
                err
            })?;
        state.graph = next.update_node_config(&node.id, request.config.clone())?;
        node.config = request.config;
        tracing::info!(%seq, node_id = %node.id, "node added");
        Ok(Reconciled::Applied(node))
    }

    /// Connects `source`'s output to `target`'s input.
    #[instrument(skip_all, fields(source = %source, target = %target))]
    pub async fn connect(&self, source: &NodeId, target: &NodeId) -> Result<Reconciled<Connection>, SyncError> {
        self.state.lock().await.graph.check_connection(source, target)?;
        let pipeline_id = self.ensure_saved().await?;

        let seq = self.state.lock().await.ledger.begin(PendingMutation::Connect {
            source: source.clone(),
            target: target.clone(),
        });
        let request = ConnectNodes {
            source_node_id: source.clone(),
            target_node_id: target.clone(),
        };
        let result = self.service.connect_nodes(&pipeline_id, &request).await;

        let mut state = self.state.lock().await;
        let pending = state.ledger.finish(seq);
        let connection_id = result.map_err(|err| {
            tracing::error!(%seq, error = %err, "connect_nodes failed");
            err
        })?;

        if pending.is_none() {
            return Ok(discard(seq, format!("connection {connection_id} was cancelled")));
        }
        if !state.graph.contains_node(source) || !state.graph.contains_node(target) {
            return Ok(discard(seq, format!("an endpoint of {connection_id} was deleted")));
        }

        let (connection, next) = state.graph.connect(connection_id, source, target)?;
        state.graph = next;
        tracing::info!(%seq, connection_id = %connection.id, "nodes connected");
        Ok(Reconciled::Applied(connection))
    }

    /// Deletes a node locally and cancels in-flight connects that reference it.
    ///
    /// The service contract has no delete action. Deleting an absent id is a
    /// no-op.
    #[instrument(skip_all, fields(node_id = %id))]
    pub async fn delete_node(&self, id: &NodeId) {
        let mut state = self.state.lock().await;
        let seq = state.ledger.record_local();
        let cancelled = state.ledger.node_deleted(id);
        if !cancelled.is_empty() {
            tracing::warn!(%seq, ?cancelled, "cancelled in-flight mutations for deleted node");
        }
        state.graph = state.graph.delete_node(id);
    }

    /// Replaces a node's config locally and returns its validation errors.
    pub async fn update_node_config(&self, id: &NodeId, config: NodeConfig) -> Result<FieldErrors, SyncError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let next = state.graph.update_node_config(id, config)?;
        state.ledger.record_local();
        state.graph = next;
        Ok(state
            .graph
            .validate_configs(&state.registry)
            .errors_for(id)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn move_node(&self, id: &NodeId, position: Position) -> Result<(), SyncError> {
        let mut state = self.state.lock().await;
        state.graph = state.graph.move_node(id, position)?;
        Ok(())
    }

    /// Applies a status update delivered by the external result stream.
    pub async fn set_node_status(&self, id: &NodeId, status: NodeStatus) -> Result<(), SyncError> {
        let mut state = self.state.lock().await;
        state.graph = state.graph.set_node_status(id, status)?;
        Ok(())
    }

    pub async fn validate(&self) -> PipelineReport {
        let state = self.state.lock().await;
        state.graph.validate_configs(&state.registry)
    }

    /// Sends a run request. Returns once the service has acknowledged it.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotPersisted`] if the pipeline was never saved.
    /// - [`SyncError::ExecutionInFlight`] if a previous request is unanswered.
    /// - [`SyncError::Remote`] if the service call failed.
    #[instrument(skip_all)]
    pub async fn execute(&self) -> Result<ExecutionReceipt, SyncError> {
        let pipeline_id = match &*self.persist.lock().await {
            PersistState::Saved(id) => id.clone(),
            PersistState::Unsaved => return Err(SyncError::NotPersisted),
        };

        let seq = {
            let mut state = self.state.lock().await;
            if state.ledger.execution_in_flight() {
                return Err(SyncError::ExecutionInFlight);
            }
            state.ledger.begin(PendingMutation::Execute)
        };
        let result = self.service.execute(&pipeline_id).await;

        let mut state = self.state.lock().await;
        state.ledger.finish(seq);
        let ack = result.map_err(|err| {
            tracing::error!(%seq, error = %err, "execute failed");
            err
        })?;

        let receipt = ExecutionReceipt {
            pipeline_id,
            seq,
            accepted_at: Timestamp::now(),
            ack,
        };
        tracing::info!(%seq, pipeline_id = %receipt.pipeline_id, "run request accepted");
        state.last_execution = Some(receipt.clone());
        Ok(receipt)
    }

    pub async fn last_execution(&self) -> Option<ExecutionReceipt> {
        self.state.lock().await.last_execution.clone()
    }

    /// In-flight remote mutations in issue order.
    pub async fn pending(&self) -> Vec<(MutationSeq, PendingMutation)> {
        self.state.lock().await.ledger.pending()
    }

    /// Cancels an in-flight mutation; its response will be discarded.
    pub async fn cancel(&self, seq: MutationSeq) -> bool {
        self.state.lock().await.ledger.cancel(seq)
    }
}

fn discard<T>(seq: MutationSeq, reason: String) -> Reconciled<T> {
    tracing::warn!(%seq, %reason, "discarding stale service response");
    Reconciled::Discarded { seq, reason }
}
