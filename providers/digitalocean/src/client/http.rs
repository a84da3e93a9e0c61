use super::{
    ClientResult, CloudFirewall, CloudFirewallRequest, DigitalOceanClient, Droplet, DropletRequest,
    Vpc, VpcRequest,
};
use log::{debug, trace, warn};
use reqwest::{Client, Method, StatusCode, Url};
use resource_reconciler::ClientError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::{Debug, Formatter};
use std::iter;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.digitalocean.com";

/// How many objects to request per page when listing.
const PAGE_SIZE: u32 = 200;

/// Settings for the [`HttpClient`].
#[derive(Clone, Eq, PartialEq)]
pub struct HttpClientConfig {
    pub base_url: String,
    /// A DigitalOcean personal access token.
    pub token: String,
    /// How long a single request may take.
    pub timeout: Duration,
    /// How many times a request that failed with a transient error is sent again. Requests that
    /// create something are only sent again when they never reached DigitalOcean or were rate
    /// limited.
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl HttpClientConfig {
    pub fn new<S>(token: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            token: token.into(),
            ..Default::default()
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            token: String::new(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl Debug for HttpClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

/// A [`DigitalOceanClient`] that talks to the DigitalOcean v2 REST API.
#[derive(Clone, Debug)]
pub struct HttpClient {
    config: HttpClientConfig,
    http: Client,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::request)?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Send a request, retrying failures that [`is_retryable`] allows. Returns `None` for empty
    /// responses.
    async fn send<B>(&self, method: Method, url: &str, body: Option<&B>) -> ClientResult<Option<Value>>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut attempt = 0;
        loop {
            match self.send_once(method.clone(), url, body).await {
                Err(e) if is_retryable(&method, &e) && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} {} failed, retrying ({}/{}): {}",
                        method, url, attempt, self.config.max_retries, e
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                result => return result,
            }
        }
    }

    async fn send_once<B>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> ClientResult<Option<Value>>
    where
        B: Serialize + ?Sized + Sync,
    {
        trace!("{} {}", method, url);
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.config.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(ClientError::request)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(ClientError::request)?;
        if !status.is_success() {
            return Err(ClientError::Status {
                code: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        if status == StatusCode::NO_CONTENT || bytes.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ClientError::Serialization(Some(Box::new(e))))
    }

    /// Every object under `key` across all pages of a listing. `query` is added to the first page;
    /// later pages are requested at the URL that each page links to.
    async fn get_all<T>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        key: &str,
    ) -> ClientResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let per_page = PAGE_SIZE.to_string();
        let first = Url::parse_with_params(
            &self.url(path),
            query
                .iter()
                .copied()
                .chain(iter::once(("per_page", per_page.as_str()))),
        )
        .map_err(ClientError::request)?;
        let mut next = Some(first.to_string());
        let mut items = Vec::new();
        while let Some(url) = next.take() {
            let page = self
                .send::<Value>(Method::GET, &url, None)
                .await?
                .ok_or_else(|| ClientError::missing(format!("a response body from {}", url)))?;
            next = page
                .pointer("/links/pages/next")
                .and_then(Value::as_str)
                .map(str::to_string);
            items.extend(field::<Vec<T>>(&page, key)?);
        }
        debug!("Listed {} {}", items.len(), key);
        Ok(items)
    }

    async fn post<B, T>(&self, path: &str, body: &B, key: &str) -> ClientResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_with_object(Method::POST, path, body, key).await
    }

    async fn put<B, T>(&self, path: &str, body: &B, key: &str) -> ClientResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_with_object(Method::PUT, path, body, key).await
    }

    async fn send_with_object<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        key: &str,
    ) -> ClientResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self
            .send(method, &url, Some(body))
            .await?
            .ok_or_else(|| ClientError::missing(format!("a response body from {}", url)))?;
        field(&response, key)
    }

    async fn delete(&self, path: &str) -> ClientResult<()> {
        self.send::<Value>(Method::DELETE, &self.url(path), None)
            .await
            .map(|_| ())
    }
}

/// Whether a request that failed with `error` may be sent again. A POST creates something, so it is
/// only repeated when DigitalOcean cannot have acted on it: the connection was never made or the
/// request was rate limited.
fn is_retryable(method: &Method, error: &ClientError) -> bool {
    if !error.is_transient() {
        return false;
    }
    if *method != Method::POST {
        return true;
    }
    match error {
        ClientError::Status { code, .. } => *code == StatusCode::TOO_MANY_REQUESTS.as_u16(),
        ClientError::RequestFailed(Some(source)) => source
            .downcast_ref::<reqwest::Error>()
            .map(reqwest::Error::is_connect)
            .unwrap_or(false),
        _ => false,
    }
}

/// Deserialize the object stored under `key` in a response body.
fn field<T>(response: &Value, key: &str) -> ClientResult<T>
where
    T: DeserializeOwned,
{
    let value = response
        .get(key)
        .ok_or_else(|| ClientError::missing(format!("'{}' in the response", key)))?;
    serde_json::from_value(value.clone()).map_err(|e| ClientError::Serialization(Some(Box::new(e))))
}

#[async_trait::async_trait]
impl DigitalOceanClient for HttpClient {
    async fn list_droplets_by_tag(&self, tag: &str) -> ClientResult<Vec<Droplet>> {
        self.get_all("droplets", &[("tag_name", tag)], "droplets")
            .await
    }

    async fn create_droplet(&self, request: &DropletRequest) -> ClientResult<Droplet> {
        self.post("droplets", request, "droplet").await
    }

    async fn delete_droplet(&self, id: u64) -> ClientResult<()> {
        self.delete(&format!("droplets/{}", id)).await
    }

    async fn tag_droplet(&self, id: u64, tag: &str) -> ClientResult<()> {
        // Creating a tag that already exists returns it unchanged.
        let _: Value = self.post("tags", &json!({ "name": tag }), "tag").await?;
        let resources = json!({
            "resources": [{ "resource_id": id.to_string(), "resource_type": "droplet" }]
        });
        self.send(
            Method::POST,
            &self.url(&format!("tags/{}/resources", tag)),
            Some(&resources),
        )
        .await
        .map(|_| ())
    }

    async fn list_vpcs(&self) -> ClientResult<Vec<Vpc>> {
        self.get_all("vpcs", &[], "vpcs").await
    }

    async fn create_vpc(&self, request: &VpcRequest) -> ClientResult<Vpc> {
        self.post("vpcs", request, "vpc").await
    }

    async fn delete_vpc(&self, id: &str) -> ClientResult<()> {
        self.delete(&format!("vpcs/{}", id)).await
    }

    async fn list_firewalls(&self) -> ClientResult<Vec<CloudFirewall>> {
        self.get_all("firewalls", &[], "firewalls").await
    }

    async fn create_firewall(&self, request: &CloudFirewallRequest) -> ClientResult<CloudFirewall> {
        self.post("firewalls", request, "firewall").await
    }

    async fn update_firewall(
        &self,
        id: &str,
        request: &CloudFirewallRequest,
    ) -> ClientResult<CloudFirewall> {
        self.put(&format!("firewalls/{}", id), request, "firewall")
            .await
    }

    async fn delete_firewall(&self, id: &str) -> ClientResult<()> {
        self.delete(&format!("firewalls/{}", id)).await
    }
}
