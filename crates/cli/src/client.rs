//! API client for communicating with the bridge agent

use anyhow::{Context, Result};
use bridge_lib::{
    engine::ContainerInfo, ContainerCreated, ContainerSpec, RuntimeInfo, ServerConf,
};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the bridge agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

/// Error body returned by the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
struct RuntimeRequest<'a> {
    servers: &'a [ServerConf],
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        // Discovery alone may take two minutes
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(180))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(error) => anyhow::bail!("API error ({}, {}): {}", status, error.kind, error.message),
            Err(_) => anyhow::bail!("API error ({}): {}", status, body),
        }
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::check(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::check(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Make a POST request with no body and no payload in the response
    pub async fn post_empty(&self, path: &str) -> Result<()> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::check(response).await?;
        Ok(())
    }

    /// Make a DELETE request with query parameters
    pub async fn delete(&self, path: &str, query: &[(&str, &str)]) -> Result<()> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::check(response).await?;
        Ok(())
    }

    pub async fn create(&self, spec: &ContainerSpec) -> Result<ContainerCreated> {
        self.post("containers/create", spec).await
    }

    pub async fn inspect(&self, id: &str) -> Result<ContainerInfo> {
        self.get(&format!("containers/{}/json", id)).await
    }

    /// Runtime info; `servers` are merged over the agent's configured servers
    pub async fn runtime(&self, id: &str, servers: &[ServerConf]) -> Result<RuntimeInfo> {
        let path = format!("containers/{}/runtime", id);
        if servers.is_empty() {
            self.get(&path).await
        } else {
            self.post(&path, &RuntimeRequest { servers }).await
        }
    }

    /// Runs the cluster job that creates the workspace's project directory
    pub async fn make_files(&self, workspace: &str) -> Result<()> {
        self.post_empty(&format!("workspaces/{}/files", workspace))
            .await
    }

    /// Runs the cluster job that deletes the workspace's project directory
    pub async fn clear_files(&self, workspace: &str) -> Result<()> {
        self.delete(&format!("workspaces/{}/files", workspace), &[])
            .await
    }

    pub async fn remove(&self, id: &str, force: bool, remove_volumes: bool) -> Result<()> {
        let flag = |on: bool| if on { "1" } else { "0" };
        self.delete(
            &format!("containers/{}", id),
            &[("force", flag(force)), ("v", flag(remove_volumes))],
        )
        .await
    }
}
