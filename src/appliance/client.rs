//! JSON client for the BIG-IP iControl REST management API

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::error::{ApplianceError, Result};
use super::{encode_uri_path_component, join_partition};
use crate::config::RouterConfig;

/// Error body returned by the appliance alongside 4xx/5xx responses
#[derive(Deserialize, Debug)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Client for the `/mgmt/tm` REST tree of a single appliance
#[derive(Clone)]
pub struct ApplianceClient {
    http_client: Client,
    base_url: String,
    username: String,
    password: String,
    partition_path: String,
}

impl ApplianceClient {
    /// Build a client from the router configuration.
    ///
    /// Certificate verification is disabled when `config.insecure` is set.
    pub fn new(config: &RouterConfig) -> crate::Result<Self> {
        let http_client = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        Ok(Self {
            http_client,
            base_url: format!("{}/mgmt/tm", config.management_url()),
            username: config.username.clone(),
            password: config.password.clone(),
            partition_path: config.partition_path.clone(),
        })
    }

    /// Rooted partition path all objects are created in
    pub fn partition_path(&self) -> &str {
        &self.partition_path
    }

    /// Encoded identifier of `name` inside the configured partition
    pub fn resource_id(&self, name: &str) -> String {
        encode_uri_path_component(&join_partition(&self.partition_path, name))
    }

    /// Full partition path of `name`, as used in payload references
    pub fn full_path(&self, name: &str) -> String {
        join_partition(&self.partition_path, name)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .basic_auth(&self.username, Some(&self.password))
    }

    /// Send a request and fold any status >= 400 into an [`ApplianceError`].
    async fn execute(&self, verb: &str, url: &str, request: RequestBuilder) -> Result<Response> {
        trace!("{} {}", verb, url);
        let response = request
            .send()
            .await
            .map_err(|source| ApplianceError::Transport {
                verb: verb.to_string(),
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.as_u16() < 400 {
            return Ok(response);
        }

        // An HTML error page leaves the message empty; only the status is kept.
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .map(|err| err.message.unwrap_or_default());

        debug!("{} {} returned {}", verb, url, status);
        Err(ApplianceError::from_status(
            verb,
            url,
            status.as_u16(),
            message,
        ))
    }

    /// GET `path` and decode the JSON body into `T`
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self
            .execute("GET", &url, self.request(Method::GET, &url))
            .await?;

        response
            .json::<T>()
            .await
            .map_err(|e| ApplianceError::Decode {
                verb: "GET".to_string(),
                url,
                reason: e.to_string(),
            })
    }

    /// GET `path`, discarding the body
    pub async fn probe(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        self.execute("GET", &url, self.request(Method::GET, &url))
            .await
            .map(|_| ())
    }

    pub async fn post<P: Serialize + ?Sized>(&self, path: &str, payload: &P) -> Result<()> {
        let url = self.url(path);
        self.execute("POST", &url, self.request(Method::POST, &url).json(payload))
            .await
            .map(|_| ())
    }

    pub async fn patch<P: Serialize + ?Sized>(&self, path: &str, payload: &P) -> Result<()> {
        let url = self.url(path);
        self.execute("PATCH", &url, self.request(Method::PATCH, &url).json(payload))
            .await
            .map(|_| ())
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        self.execute("DELETE", &url, self.request(Method::DELETE, &url))
            .await
            .map(|_| ())
    }
}
