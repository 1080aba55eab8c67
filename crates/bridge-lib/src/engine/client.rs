//! HTTP client for the container engine API

use super::{ContainerEngine, ContainerInfo, EngineResult, ImageInfo};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{ContainerCreated, ContainerSpec};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Container engine reached over its REST API
pub struct HttpEngine {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateContainerBody<'a> {
    image: &'a str,
    env: &'a [String],
    exposed_ports: BTreeMap<&'a str, serde_json::Value>,
    labels: BTreeMap<&'a str, &'a str>,
    host_config: CreateHostConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateHostConfig<'a> {
    binds: &'a [String],
}

impl HttpEngine {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let mut base_url = Url::parse(&config.url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> EngineResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// `None` on 404, the decoded body on success
    async fn optional_json<T: DeserializeOwned>(response: Response) -> EngineResult<Option<T>> {
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        Ok(Some(response.json().await?))
    }

    async fn check(response: Response) -> EngineResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(EngineError::Api { status, message })
    }
}

#[async_trait]
impl ContainerEngine for HttpEngine {
    async fn inspect_image(&self, image: &str) -> EngineResult<Option<ImageInfo>> {
        let url = self.url(&format!("images/{}/json", image))?;
        debug!(image = %image, "Inspecting image");
        let response = self.client.get(url).send().await?;
        Self::optional_json(response).await
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<Option<ContainerInfo>> {
        let url = self.url(&format!("containers/{}/json", id))?;
        let response = self.client.get(url).send().await?;
        Self::optional_json(response).await
    }

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<ContainerCreated> {
        let mut url = self.url("containers/create")?;
        if !spec.name.is_empty() {
            url.query_pairs_mut().append_pair("name", &spec.name);
        }

        let body = CreateContainerBody {
            image: &spec.image,
            env: &spec.env,
            exposed_ports: spec
                .exposed_ports
                .iter()
                .map(|port| (port.as_str(), serde_json::json!({})))
                .collect(),
            labels: spec
                .labels
                .iter()
                .filter_map(|(key, value)| value.as_deref().map(|value| (key.as_str(), value)))
                .collect(),
            host_config: CreateHostConfig { binds: &spec.binds },
        };

        let response = self.client.post(url).json(&body).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn remove_container(
        &self,
        id: &str,
        force: bool,
        remove_volumes: bool,
    ) -> EngineResult<bool> {
        let mut url = self.url(&format!("containers/{}", id))?;
        url.query_pairs_mut()
            .append_pair("force", if force { "1" } else { "0" })
            .append_pair("v", if remove_volumes { "1" } else { "0" });

        let response = self.client.delete(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(response).await?;
        Ok(true)
    }

    async fn ping(&self) -> EngineResult<()> {
        let response = self.client.get(self.url("_ping")?).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}
