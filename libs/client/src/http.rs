//! HTTP implementation of [`ControlPlane`].

use std::time::Duration;

use async_trait::async_trait;
use converge_events::{
    ActualLrp, ActualLrpFilter, CellPresence, DesiredLrp, DesiredLrpUpdate, DomainUpsertRequest,
    ErrorBody, ErrorKind, ListResponse, Task, TaskRequest,
};
use converge_id::{Domain, ProcessGuid, TaskGuid};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::sse::SseEventSource;
use crate::{ClientError, ControlPlane, EventSource};

/// Connection settings for [`HttpControlPlane`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Control plane base URL, e.g. `http://127.0.0.1:8889`.
    pub base_url: String,

    /// Upper bound on every non-streaming request.
    pub request_timeout: Duration,

    /// Upper bound on establishing a connection, streaming included.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8889".to_string(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// JSON-over-HTTP control-plane client.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: reqwest::Client,
    stream_client: reqwest::Client,
    base_url: Url,
}

impl HttpControlPlane {
    /// Create a new client from config.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| ClientError::Config(format!("{}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "{} cannot be used as a base URL",
                config.base_url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers.clone())
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        // The event stream is long-lived; only the connect phase is bounded.
        let stream_client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            stream_client,
            base_url,
        })
    }

    /// Returns the base URL requests are issued against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build a URL from path segments, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        debug!(url = %url, "GET");
        let response = self.client.get(url).send().await?;
        Self::handle_response(response).await
    }

    async fn expect_success(response: Response) -> Result<(), ClientError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Self::handle_error(response).await
        }
    }

    /// Handle a successful or error response.
    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        if response.status().is_success() {
            let body = response.bytes().await?;
            serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
        } else {
            Self::handle_error(response).await
        }
    }

    /// Handle an error response.
    async fn handle_error<T>(response: Response) -> Result<T, ClientError> {
        let status = response.status().as_u16();
        let body = response.bytes().await.unwrap_or_default();

        // Only a typed body can say "not found"; a bare 404 may be a wrong route or a proxy.
        let error_body: ErrorBody = serde_json::from_slice(&body).unwrap_or_else(|_| ErrorBody {
            code: "unknown".to_string(),
            message: String::from_utf8_lossy(&body).into_owned(),
            field: None,
        });

        Err(ClientError::api(
            status,
            ErrorKind::from_code(&error_body.code),
            error_body.message,
            error_body.field,
        ))
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn ping(&self) -> Result<(), ClientError> {
        let response = self.client.get(self.url(&["ping"])?).send().await?;
        Self::expect_success(response).await
    }

    async fn desire_task(&self, request: &TaskRequest) -> Result<(), ClientError> {
        debug!(task_guid = %request.task_guid, "Desiring task");
        let response = self
            .client
            .post(self.url(&["v1", "tasks"])?)
            .json(request)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    async fn task_by_guid(&self, guid: &TaskGuid) -> Result<Task, ClientError> {
        self.get(self.url(&["v1", "tasks", guid.as_str()])?).await
    }

    async fn tasks(&self, domain: Option<&Domain>) -> Result<Vec<Task>, ClientError> {
        let mut url = self.url(&["v1", "tasks"])?;
        if let Some(domain) = domain {
            url.query_pairs_mut().append_pair("domain", domain.as_str());
        }
        let list: ListResponse<Task> = self.get(url).await?;
        Ok(list.items)
    }

    async fn cancel_task(&self, guid: &TaskGuid) -> Result<(), ClientError> {
        debug!(task_guid = %guid, "Cancelling task");
        let response = self
            .client
            .post(self.url(&["v1", "tasks", guid.as_str(), "cancel"])?)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    async fn delete_task(&self, guid: &TaskGuid) -> Result<(), ClientError> {
        debug!(task_guid = %guid, "Deleting task");
        let response = self
            .client
            .delete(self.url(&["v1", "tasks", guid.as_str()])?)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    async fn desire_lrp(&self, lrp: &DesiredLrp) -> Result<(), ClientError> {
        debug!(
            process_guid = %lrp.process_guid,
            instances = lrp.instances,
            "Desiring LRP"
        );
        let response = self
            .client
            .post(self.url(&["v1", "desired_lrps"])?)
            .json(lrp)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    async fn desired_lrp_by_process_guid(
        &self,
        guid: &ProcessGuid,
    ) -> Result<DesiredLrp, ClientError> {
        self.get(self.url(&["v1", "desired_lrps", guid.as_str()])?)
            .await
    }

    async fn desired_lrps(&self, domain: Option<&Domain>) -> Result<Vec<DesiredLrp>, ClientError> {
        let mut url = self.url(&["v1", "desired_lrps"])?;
        if let Some(domain) = domain {
            url.query_pairs_mut().append_pair("domain", domain.as_str());
        }
        let list: ListResponse<DesiredLrp> = self.get(url).await?;
        Ok(list.items)
    }

    async fn update_desired_lrp(
        &self,
        guid: &ProcessGuid,
        update: &DesiredLrpUpdate,
    ) -> Result<(), ClientError> {
        debug!(process_guid = %guid, ?update, "Updating desired LRP");
        let response = self
            .client
            .patch(self.url(&["v1", "desired_lrps", guid.as_str()])?)
            .json(update)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    async fn remove_desired_lrp(&self, guid: &ProcessGuid) -> Result<(), ClientError> {
        debug!(process_guid = %guid, "Removing desired LRP");
        let response = self
            .client
            .delete(self.url(&["v1", "desired_lrps", guid.as_str()])?)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    async fn actual_lrps(&self, filter: &ActualLrpFilter) -> Result<Vec<ActualLrp>, ClientError> {
        let mut url = self.url(&["v1", "actual_lrps"])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(domain) = &filter.domain {
                query.append_pair("domain", domain.as_str());
            }
            if let Some(guid) = &filter.process_guid {
                query.append_pair("process_guid", guid.as_str());
            }
            if let Some(index) = filter.index {
                query.append_pair("index", &index.to_string());
            }
        }
        let list: ListResponse<ActualLrp> = self.get(url).await?;
        Ok(list.items)
    }

    async fn actual_lrp(&self, guid: &ProcessGuid, index: i32) -> Result<ActualLrp, ClientError> {
        let index = index.to_string();
        self.get(self.url(&["v1", "actual_lrps", guid.as_str(), &index])?)
            .await
    }

    async fn retire_actual_lrp(&self, guid: &ProcessGuid, index: i32) -> Result<(), ClientError> {
        debug!(process_guid = %guid, index, "Retiring actual LRP");
        let index = index.to_string();
        let response = self
            .client
            .post(self.url(&["v1", "actual_lrps", guid.as_str(), &index, "retire"])?)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    async fn cells(&self) -> Result<Vec<CellPresence>, ClientError> {
        let list: ListResponse<CellPresence> = self.get(self.url(&["v1", "cells"])?).await?;
        Ok(list.items)
    }

    async fn upsert_domain(&self, domain: &Domain, ttl: Duration) -> Result<(), ClientError> {
        let body = DomainUpsertRequest {
            ttl_seconds: ttl.as_secs(),
        };
        let response = self
            .client
            .put(self.url(&["v1", "domains", domain.as_str()])?)
            .json(&body)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    async fn domains(&self) -> Result<Vec<Domain>, ClientError> {
        let list: ListResponse<Domain> = self.get(self.url(&["v1", "domains"])?).await?;
        Ok(list.items)
    }

    async fn subscribe_to_events(&self) -> Result<Box<dyn EventSource>, ClientError> {
        let url = self.url(&["v1", "events"])?;
        debug!(url = %url, "Subscribing to events");
        let response = self
            .stream_client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            return Self::handle_error(response).await;
        }

        Ok(Box::new(SseEventSource::from_response(response)))
    }
}
