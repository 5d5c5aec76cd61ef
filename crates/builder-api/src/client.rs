//! [`HttpPipelineService`]: the visual-builder endpoints over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    AddNode, ConnectNodes, ConnectionId, CreatePipeline, ExecutionAck, NodeId, PipelineId,
    PipelineService, RemoteRequestError, RequestId, TemplateRegistry,
};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::config::{ClientConfig, ConfigError};
use crate::wire::{
    ActionBody, AddNodeResponse, ConnectNodesResponse, CreatePipelineResponse, ExecuteResponse,
    TemplatesResponse,
};

/// Path of the visual-builder collection, relative to the base URL.
pub const BUILDER_PATH: &str = "api/data-ingestion/visual-builder/";

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Error bodies longer than this are truncated before being logged or returned.
const MAX_ERROR_BODY: usize = 512;

pub struct HttpPipelineService {
    http: Client,
    collection: Url,
    auth_token: Option<String>,
}

impl HttpPipelineService {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let base = config.base_url()?;
        let collection = base.join(BUILDER_PATH).map_err(|e| ConfigError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient {
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            collection,
            auth_token: config.auth_token.clone(),
        })
    }

    /// `{collection}/{id}/`, with the id percent-encoded as a single path segment.
    fn pipeline_url(&self, id: &PipelineId) -> Result<Url, RemoteRequestError> {
        let invalid = || RemoteRequestError::Transport {
            message: format!("pipeline id `{id}` cannot be used in a url"),
            timed_out: false,
        };
        if matches!(id.as_str(), "." | "..") {
            return Err(invalid());
        }
        let mut url = self.collection.clone();
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .push(id.as_str())
            .push("");
        Ok(url)
    }

    /// Sends a request and returns the raw body of a 2xx response.
    async fn send(&self, builder: RequestBuilder, operation: &'static str) -> Result<Vec<u8>, RemoteRequestError> {
        let request_id = RequestId::new_random();
        let mut builder = builder.header(REQUEST_ID_HEADER, request_id.to_string());
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        let request = builder.build().map_err(transport)?;
        tracing::debug!(%request_id, operation, method = %request.method(), url = %request.url(), "sending request");

        let response = self.http.execute(request).await.map_err(|e| {
            tracing::error!(%request_id, operation, error = %e, "request failed");
            transport(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let mut body = response.text().await.unwrap_or_default();
            truncate(&mut body);
            tracing::error!(%request_id, operation, status = status.as_u16(), %body, "service rejected request");
            return Err(RemoteRequestError::Status {
                status: status.as_u16(),
                body,
                retry_after,
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        tracing::debug!(%request_id, operation, status = status.as_u16(), bytes = body.len(), "response received");
        Ok(body.to_vec())
    }
}

fn transport(err: reqwest::Error) -> RemoteRequestError {
    RemoteRequestError::Transport {
        message: err.to_string(),
        timed_out: err.is_timeout(),
    }
}

fn decode<T: DeserializeOwned>(body: &[u8], operation: &str) -> Result<T, RemoteRequestError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::error!(operation, error = %e, "unexpected response body");
        RemoteRequestError::MalformedBody {
            message: format!("{operation}: {e}"),
        }
    })
}

fn truncate(body: &mut String) {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
}

#[async_trait]
impl PipelineService for HttpPipelineService {
    #[instrument(skip_all)]
    async fn node_templates(&self) -> Result<TemplateRegistry, RemoteRequestError> {
        let request = self
            .http
            .get(self.collection.clone())
            .query(&[("action", "node_templates")]);
        let body = self.send(request, "node_templates").await?;
        let response: TemplatesResponse = decode(&body, "node_templates")?;
        Ok(TemplateRegistry::from_catalog(response.into_catalog()))
    }

    #[instrument(skip_all, fields(name = %request.name))]
    async fn create_pipeline(&self, request: &CreatePipeline) -> Result<PipelineId, RemoteRequestError> {
        let builder = self.http.post(self.collection.clone()).json(request);
        let body = self.send(builder, "create_pipeline").await?;
        let response: CreatePipelineResponse = decode(&body, "create_pipeline")?;
        response.pipeline_id.into_id("pipeline_id", |s| PipelineId::new(s))
    }

    #[instrument(skip_all, fields(pipeline_id = %pipeline, node_type = %request.template_id))]
    async fn add_node(&self, pipeline: &PipelineId, request: &AddNode) -> Result<NodeId, RemoteRequestError> {
        let body = ActionBody::AddNode {
            node_type: &request.template_id,
            position: request.position,
            config: &request.config,
        };
        let builder = self.http.post(self.pipeline_url(pipeline)?).json(&body);
        let body = self.send(builder, "add_node").await?;
        let response: AddNodeResponse = decode(&body, "add_node")?;
        response.node_id.into_id("node_id", |s| NodeId::new(s))
    }

    #[instrument(skip_all, fields(pipeline_id = %pipeline))]
    async fn connect_nodes(
        &self,
        pipeline: &PipelineId,
        request: &ConnectNodes,
    ) -> Result<ConnectionId, RemoteRequestError> {
        let body = ActionBody::ConnectNodes {
            source_node_id: &request.source_node_id,
            target_node_id: &request.target_node_id,
        };
        let builder = self.http.post(self.pipeline_url(pipeline)?).json(&body);
        let body = self.send(builder, "connect_nodes").await?;
        let response: ConnectNodesResponse = decode(&body, "connect_nodes")?;
        response
            .connection_id
            .into_id("connection_id", |s| ConnectionId::new(s))
    }

    #[instrument(skip_all, fields(pipeline_id = %pipeline))]
    async fn execute(&self, pipeline: &PipelineId) -> Result<ExecutionAck, RemoteRequestError> {
        let builder = self
            .http
            .post(self.pipeline_url(pipeline)?)
            .json(&ActionBody::Execute);
        let body = self.send(builder, "execute").await?;
        // Acknowledgement only; an empty body is a valid ack.
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ExecutionAck::default());
        }
        let response: ExecuteResponse = decode(&body, "execute")?;
        Ok(ExecutionAck {
            status: response.status,
            run_id: response.run_id.map(|id| id.into_plain()),
        })
    }
}
