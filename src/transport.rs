use anyhow::Result;
use reqwest::Method;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::http_client::build_http_client;
use crate::models::{Collection, RecordId};
use crate::upload::StagedImage;

const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub enum ApiRequest {
    List(Collection),
    Create { collection: Collection, body: Value },
    Update { collection: Collection, id: RecordId, body: Value },
    Delete { collection: Collection, id: RecordId },
    Login(Value),
    Register(Value),
    UpdateProfile(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    List,
    Create,
    Update,
    Delete,
    Upload,
    Login,
    Register,
    UpdateProfile,
}

impl ApiRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            ApiRequest::List(_) => RequestKind::List,
            ApiRequest::Create { .. } => RequestKind::Create,
            ApiRequest::Update { .. } => RequestKind::Update,
            ApiRequest::Delete { .. } => RequestKind::Delete,
            ApiRequest::Login(_) => RequestKind::Login,
            ApiRequest::Register(_) => RequestKind::Register,
            ApiRequest::UpdateProfile(_) => RequestKind::UpdateProfile,
        }
    }

    pub fn collection(&self) -> Option<Collection> {
        match self {
            ApiRequest::List(collection)
            | ApiRequest::Create { collection, .. }
            | ApiRequest::Update { collection, .. }
            | ApiRequest::Delete { collection, .. } => Some(*collection),
            _ => None,
        }
    }

    pub fn method(&self) -> Method {
        match self {
            ApiRequest::List(_) => Method::GET,
            ApiRequest::Create { .. } | ApiRequest::Login(_) | ApiRequest::Register(_) => {
                Method::POST
            }
            ApiRequest::Update { .. } | ApiRequest::UpdateProfile(_) => Method::PUT,
            ApiRequest::Delete { .. } => Method::DELETE,
        }
    }

    pub fn path(&self) -> String {
        match self {
            ApiRequest::List(collection) | ApiRequest::Create { collection, .. } => {
                collection.path().to_string()
            }
            ApiRequest::Update { collection, id, .. } | ApiRequest::Delete { collection, id } => {
                format!("{}/{id}", collection.path())
            }
            ApiRequest::Login(_) => "auth/login".to_string(),
            ApiRequest::Register(_) => "auth/register".to_string(),
            ApiRequest::UpdateProfile(_) => "auth/profile".to_string(),
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            ApiRequest::Create { body, .. }
            | ApiRequest::Update { body, .. }
            | ApiRequest::Login(body)
            | ApiRequest::Register(body)
            | ApiRequest::UpdateProfile(body) => Some(body),
            ApiRequest::List(_) | ApiRequest::Delete { .. } => None,
        }
    }
}

pub trait Transport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<Value, SyncError>;

    /// Posts the staged image and returns the permanent reference for it.
    fn upload(&self, image: &StagedImage) -> Result<String, SyncError>;
}

pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = build_http_client(config.timeout)?;
        Ok(Self::with_client(client, &config.api_base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<Value, SyncError> {
        let url = self.url(&request.path());
        log::debug!("{} {url}", request.method());
        let mut req = self
            .client
            .request(request.method(), &url)
            .header(ACCEPT, "application/json");
        if let Some(body) = request.body() {
            req = req.json(body);
        }
        let resp = req.send().map_err(network_error)?;
        read_json(resp)
    }

    fn upload(&self, image: &StagedImage) -> Result<String, SyncError> {
        let bytes = image
            .read_bytes()
            .map_err(|err| SyncError::network(format!("failed reading staged image: {err}")))?;
        let part = Part::bytes(bytes)
            .file_name(image.file_name().to_string())
            .mime_str(image.mime())
            .map_err(network_error)?;
        let form = Form::new().part("file", part);

        let url = self.url("upload");
        log::debug!("POST {url} ({} bytes)", image.len());
        let resp = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .map_err(network_error)?;
        let status = resp.status().as_u16();
        let body = read_json(resp)?;
        body.get("image_url")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SyncError::server(status, "upload response carried no image_url"))
    }
}

fn read_json(resp: Response) -> Result<Value, SyncError> {
    let status = resp.status();
    let body = resp.text().map_err(network_error)?;
    if !status.is_success() {
        return Err(SyncError::Server {
            status: status.as_u16(),
            message: server_message(&body),
        });
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(trimmed).map_err(|err| {
        SyncError::server(status.as_u16(), format!("malformed response body: {err}"))
    })
}

fn network_error(err: reqwest::Error) -> SyncError {
    SyncError::Network {
        timed_out: err.is_timeout(),
        reason: err.to_string(),
    }
}

/// Pulls the human-readable message out of an error body: `{"error": ..}` or
/// `{"message": ..}` when JSON, otherwise the trimmed text.
pub fn server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let from_json = ["error", "message", "detail"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if from_json.is_some() {
            return from_json;
        }
        if value.is_object() || value.is_array() {
            return None;
        }
    }
    if trimmed.starts_with('<') {
        // HTML error pages carry nothing worth showing.
        return None;
    }
    Some(trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect())
}
