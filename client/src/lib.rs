use std::{sync::Arc, time::Instant};

use anyhow::Result;
use async_trait::async_trait;
use common::{
    metrics::NetworkMetric,
    util::now_millis,
};
use futures_util::{stream::BoxStream, StreamExt};
use model::{
    attestation::{Attestation, AttestationResponse},
    genesis::{Genesis, GenesisResponse},
    head::HeadEvent,
    spec::{ChainSpec, SpecResponse},
    syncing::{SyncingResponse, SyncingStatus},
    validator::{ValidatorData, ValidatorResponse},
    version::VersionResponse,
};
use reqwest_eventsource::{Event, EventSource};
use url::Url;

pub mod model;

#[async_trait]
pub trait BeaconApiClient: Sync + Send {
    async fn get_syncing_status(&self) -> Result<SyncingStatus>;
    async fn get_genesis(&self) -> Result<Option<Genesis>>;
    async fn get_node_version(&self) -> Result<String>;
    async fn get_spec(&self) -> Result<ChainSpec>;
    async fn get_block_attestations(&self, slot: u64) -> Result<Option<Vec<Attestation>>>;
    async fn get_validator(&self, pubkey: &str) -> Result<Option<ValidatorData>>;
    async fn head_events(&self) -> Result<BoxStream<'static, Result<HeadEvent>>>;
}

/// Builds one client per beacon URL. The supervisor holds this seam so watcher
/// and lifecycle tasks can be exercised against scripted clients.
pub trait ClientFactory: Sync + Send {
    fn create(&self, url: &Url) -> Arc<dyn BeaconApiClient>;
}

/// Receives one metric per HTTP exchange. Implemented by the supervisor to
/// persist per-beacon latency/status history.
pub trait MetricsSink: Sync + Send {
    fn record(&self, metric: NetworkMetric);
}

pub struct HttpClient {
    base_url: Url,
    client: reqwest::Client,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl HttpClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(base_url: Url, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
            metrics: Some(metrics),
        }
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        log::debug!("GET {url}");
        let start = Instant::now();
        let result = self.client.get(url).send().await;
        if let Some(sink) = &self.metrics {
            let code = match &result {
                Ok(response) => response.status().as_u16(),
                Err(err) => err.status().map(|status| status.as_u16()).unwrap_or(0),
            };
            sink.record(NetworkMetric {
                url: self.base_url.to_string(),
                code,
                latency: start.elapsed().as_millis() as i64,
                time: now_millis(),
            });
        }
        Ok(result?)
    }
}

#[async_trait]
impl BeaconApiClient for HttpClient {
    async fn get_syncing_status(&self) -> Result<SyncingStatus> {
        let url = self.base_url.join("eth/v1/node/syncing")?;
        let response = self.get(url).await?;
        response.error_for_status_ref()?;
        let data = response.json::<SyncingResponse>().await?.data;
        Ok(data)
    }

    async fn get_genesis(&self) -> Result<Option<Genesis>> {
        let url = self.base_url.join("eth/v1/beacon/genesis")?;
        let response = self.get(url).await?;
        match response.error_for_status_ref() {
            Ok(_) => {
                let data = response.json::<GenesisResponse>().await?.data;
                Ok(Some(data))
            }
            Err(err) if err.status().map(|s| s.as_u16()) == Some(404) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_node_version(&self) -> Result<String> {
        let url = self.base_url.join("eth/v1/node/version")?;
        let response = self.get(url).await?;
        response.error_for_status_ref()?;
        let data = response.json::<VersionResponse>().await?.data;
        Ok(data.version)
    }

    async fn get_spec(&self) -> Result<ChainSpec> {
        let url = self.base_url.join("eth/v1/config/spec")?;
        let response = self.get(url).await?;
        response.error_for_status_ref()?;
        let data = response.json::<SpecResponse>().await?.data;
        Ok(data)
    }

    async fn get_block_attestations(&self, slot: u64) -> Result<Option<Vec<Attestation>>> {
        let url = self
            .base_url
            .join(&format!("eth/v1/beacon/blocks/{slot}/attestations"))?;
        let response = self.get(url).await?;
        match response.error_for_status_ref() {
            Ok(_) => {
                let attestations = response.json::<AttestationResponse>().await?.data;
                Ok(Some(attestations))
            }
            Err(err) if err.status().map(|s| s.as_u16()) == Some(404) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_validator(&self, pubkey: &str) -> Result<Option<ValidatorData>> {
        let url = self
            .base_url
            .join(&format!("eth/v1/beacon/states/head/validators/{pubkey}"))?;
        let response = self.get(url).await?;
        match response.error_for_status_ref() {
            Ok(_) => {
                let data = response.json::<ValidatorResponse>().await?.data;
                Ok(Some(data))
            }
            Err(err) if err.status().map(|s| s.as_u16()) == Some(404) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn head_events(&self) -> Result<BoxStream<'static, Result<HeadEvent>>> {
        let mut url = self.base_url.join("eth/v1/events")?;
        url.query_pairs_mut().append_pair("topics", "head");
        log::debug!("GET {url} (event stream)");
        let source = EventSource::new(self.client.get(url))?;
        let stream = source
            .filter_map(|event| async move {
                match event {
                    Ok(Event::Open) => None,
                    Ok(Event::Message(message)) => {
                        Some(serde_json::from_str::<HeadEvent>(&message.data).map_err(Into::into))
                    }
                    Err(err) => Some(Err(err.into())),
                }
            })
            .boxed();
        Ok(stream)
    }
}

pub struct HttpClientFactory {
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl HttpClientFactory {
    pub fn new() -> Self {
        Self { metrics: None }
    }

    pub fn with_metrics(metrics: Arc<dyn MetricsSink>) -> Self {
        Self { metrics: Some(metrics) }
    }
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFactory for HttpClientFactory {
    fn create(&self, url: &Url) -> Arc<dyn BeaconApiClient> {
        match &self.metrics {
            Some(metrics) => Arc::new(HttpClient::with_metrics(url.clone(), metrics.clone())),
            None => Arc::new(HttpClient::new(url.clone())),
        }
    }
}
