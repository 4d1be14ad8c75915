//! CouchDB HTTP backend

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use std::time::Duration;
use tracing::{debug, warn};

use super::{DocumentStore, is_addressable_id};
use crate::error::StoreError;

/// Attempts for a single upsert when CouchDB reports an update conflict
const MAX_PUT_ATTEMPTS: u32 = 3;

pub struct CouchStore {
    client: reqwest::Client,
    base_url: Url,
    credentials: Option<(String, String)>,
}

impl CouchStore {
    /// Build a client for the server at `url`.
    ///
    /// Credentials embedded in the URL are stripped from it and sent as basic
    /// auth instead, so the stored base URL is safe to log.
    pub fn new(url: &str, request_timeout_secs: u64) -> Result<Self, StoreError> {
        let mut base_url = Url::parse(url).map_err(|e| StoreError::unavailable("connect", e))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(StoreError::unavailable(
                "connect",
                format!("unsupported URL scheme: {}", base_url.scheme()),
            ));
        }

        let credentials = if base_url.username().is_empty() {
            None
        } else {
            let user = urlencoding::decode(base_url.username())
                .map_err(|e| StoreError::unavailable("connect", e))?
                .into_owned();
            let pass = urlencoding::decode(base_url.password().unwrap_or(""))
                .map_err(|e| StoreError::unavailable("connect", e))?
                .into_owned();
            Some((user, pass))
        };
        // Url::set_username/set_password only fail for cannot-be-a-base URLs,
        // which http(s) never are.
        let _ = base_url.set_username("");
        let _ = base_url.set_password(None);
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| StoreError::unavailable("connect", e))?;

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// Server URL without credentials
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn database_url(&self, operation: &str, name: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(&urlencoding::encode(name))
            .map_err(|e| StoreError::unavailable(operation, e))
    }

    fn document_url(&self, operation: &str, collection: &str, id: &str) -> Result<Url, StoreError> {
        let path = format!("{}/{}", urlencoding::encode(collection), encode_doc_id(id));
        self.base_url
            .join(&path)
            .map_err(|e| StoreError::unavailable(operation, e))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    async fn send(&self, operation: &str, builder: RequestBuilder) -> Result<Response, StoreError> {
        builder
            .send()
            .await
            .map_err(|e| StoreError::unavailable(operation, e))
    }

    /// Current revision of a document, or `None` if it does not exist
    async fn current_revision(&self, collection: &str, id: &str) -> Result<Option<String>, StoreError> {
        let url = self.document_url("put_document", collection, id)?;
        let response = self
            .send("put_document", self.request(Method::HEAD, url))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let etag = response
                    .headers()
                    .get(reqwest::header::ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.trim_matches('"').to_string());
                match etag {
                    Some(rev) => Ok(Some(rev)),
                    None => Err(StoreError::unavailable(
                        "put_document",
                        format!("{collection}/{id}: revision header missing"),
                    )),
                }
            }
            status => Err(StoreError::unavailable(
                "put_document",
                format!("{collection}/{id}: revision lookup returned {status}"),
            )),
        }
    }
}

#[async_trait]
impl DocumentStore for CouchStore {
    async fn database_exists(&self, name: &str) -> Result<bool, StoreError> {
        let url = self.database_url("database_exists", name)?;
        let response = self
            .send("database_exists", self.request(Method::HEAD, url))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(unexpected("database_exists", name, response).await),
        }
    }

    async fn create_database(&self, name: &str) -> Result<(), StoreError> {
        let url = self.database_url("create_database", name)?;
        let response = self
            .send("create_database", self.request(Method::PUT, url))
            .await?;
        match response.status() {
            StatusCode::PRECONDITION_FAILED => {
                debug!(database = %name, "Database already exists");
                Ok(())
            }
            status if status.is_success() => Ok(()),
            _ => Err(unexpected("create_database", name, response).await),
        }
    }

    async fn destroy_database(&self, name: &str) -> Result<(), StoreError> {
        let url = self.database_url("destroy_database", name)?;
        let response = self
            .send("destroy_database", self.request(Method::DELETE, url))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(database = %name, "Database already absent");
                Ok(())
            }
            status if status.is_success() => Ok(()),
            _ => Err(unexpected("destroy_database", name, response).await),
        }
    }

    async fn put_document(
        &self,
        collection: &str,
        id: &str,
        doc: serde_json::Value,
    ) -> Result<(), StoreError> {
        if !is_addressable_id(id) {
            return Err(StoreError::unavailable(
                "put_document",
                format!("{collection}/{id:?}: document id cannot be addressed"),
            ));
        }

        let mut rev: Option<String> = None;

        for attempt in 1..=MAX_PUT_ATTEMPTS {
            let mut url = self.document_url("put_document", collection, id)?;
            if let Some(rev) = &rev {
                url.query_pairs_mut().append_pair("rev", rev);
            }

            let response = self
                .send("put_document", self.request(Method::PUT, url).json(&doc))
                .await?;

            match response.status() {
                status if status.is_success() => {
                    debug!(collection = %collection, id = %id, "Document stored");
                    return Ok(());
                }
                StatusCode::CONFLICT if attempt < MAX_PUT_ATTEMPTS => {
                    debug!(
                        collection = %collection,
                        id = %id,
                        attempt = attempt,
                        "Update conflict, fetching current revision"
                    );
                    rev = self.current_revision(collection, id).await?;
                }
                _ => {
                    let target = format!("{collection}/{id}");
                    return Err(unexpected("put_document", &target, response).await);
                }
            }
        }

        warn!(collection = %collection, id = %id, "Upsert gave up after repeated conflicts");
        Err(StoreError::unavailable(
            "put_document",
            format!("{collection}/{id}: conflict not resolved after {MAX_PUT_ATTEMPTS} attempts"),
        ))
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<serde_json::Value, StoreError> {
        if !is_addressable_id(id) {
            return Err(StoreError::not_found(collection, id));
        }

        let url = self.document_url("get_document", collection, id)?;
        let response = self
            .send("get_document", self.request(Method::GET, url))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::not_found(collection, id)),
            status if status.is_success() => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| StoreError::unavailable("get_document", e))?;
                Ok(serde_json::from_slice(&body)?)
            }
            _ => {
                let target = format!("{collection}/{id}");
                Err(unexpected("get_document", &target, response).await)
            }
        }
    }

    fn name(&self) -> &str {
        "couchdb"
    }
}

/// Encode a document id for use as a path segment.
///
/// Design document ids keep their `_design/` prefix unescaped.
fn encode_doc_id(id: &str) -> String {
    match id.strip_prefix("_design/") {
        Some(rest) => format!("_design/{}", urlencoding::encode(rest)),
        None => urlencoding::encode(id).into_owned(),
    }
}

async fn unexpected(operation: &str, target: &str, response: Response) -> StoreError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read response body".to_string());
    warn!(
        operation = %operation,
        target = %target,
        status = %status,
        body = %body.trim(),
        "CouchDB returned unexpected response"
    );
    StoreError::unavailable(operation, format!("{target}: status {status}: {}", body.trim()))
}
