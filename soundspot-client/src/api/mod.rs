use std::{fmt::Display, path::Path};

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;

mod http;
pub use http::*;

use crate::{AuthScope, ClientError, ClientResult};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// No response reached the client
    #[error("Network failure: {0}")]
    Network(String),
    /// The request could not be built, for example because of a malformed file part
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let method = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };

        f.write_str(method)
    }
}

/// A binary attached to a multipart request
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new<N, M>(file_name: N, mime_type: M, bytes: Vec<u8>) -> Self
    where
        N: Into<String>,
        M: Into<String>,
    {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Reads a file from disk, guessing the mime type from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Ok(Self::new(file_name, guess_mime_type(&extension), bytes))
    }
}

fn guess_mime_type(extension: &str) -> &'static str {
    match extension {
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Text fields and files sent as multipart/form-data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub files: Vec<(String, FileUpload)>,
}

impl MultipartForm {
    pub fn text<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// Adds a text field only when there is a value
    pub fn optional_text<K, V>(self, key: K, value: Option<V>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        match value {
            Some(value) => self.text(key, value),
            None => self,
        }
    }

    pub fn file<K>(mut self, key: K, file: FileUpload) -> Self
    where
        K: Into<String>,
    {
        self.files.push((key.into(), file));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(MultipartForm),
}

/// A request relative to the API base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
    /// Set by the session store, never by repositories
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new<P>(method: Method, path: P) -> Self
    where
        P: Into<String>,
    {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            bearer: None,
        }
    }

    pub fn get<P: Into<String>>(path: P) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post<P: Into<String>>(path: P) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put<P: Into<String>>(path: P) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete<P: Into<String>>(path: P) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    pub fn bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// The parsed body. Empty bodies are `Null`, non-JSON bodies are a string.
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The message the server attached to the response, if any
    pub fn message(&self) -> Option<String> {
        match &self.body {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Object(map) => ["message", "error", "msg"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        }
    }

    /// Turns the response into its body, or the error matching its status.
    /// `scope` is the session whose token was attached, if any.
    pub fn into_result(self, scope: AuthScope) -> ClientResult<Value> {
        if self.is_success() {
            return Ok(self.body);
        }

        let message = self.message();

        let error = match self.status {
            400 | 409 | 422 => {
                ClientError::Validation(message.unwrap_or_else(|| "Invalid request".to_string()))
            }
            401 => ClientError::Unauthorized(scope),
            403 => ClientError::Forbidden(
                message.unwrap_or_else(|| "You are not allowed to do that".to_string()),
            ),
            404 => ClientError::NotFound(message.unwrap_or_else(|| "Not found".to_string())),
            status => ClientError::Server {
                status,
                message: message.unwrap_or_else(|| format!("Server error ({})", status)),
            },
        };

        Err(error)
    }
}

/// Represents a type that can deliver requests to the soundspot API
#[async_trait]
pub trait Transport
where
    Self: 'static + Send + Sync,
{
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// The transport plus the default authorization header.
///
/// The regular session's token is installed as the default on login and removed on logout.
/// Admin requests never use the default and carry their token explicitly.
pub struct Api {
    transport: Box<dyn Transport>,
    default_bearer: RwLock<Option<String>>,
}

impl Api {
    pub fn new<T>(transport: T) -> Self
    where
        T: Transport,
    {
        Self {
            transport: Box::new(transport),
            default_bearer: Default::default(),
        }
    }

    pub fn set_default_bearer(&self, token: Option<String>) {
        *self.default_bearer.write() = token;
    }

    pub fn default_bearer(&self) -> Option<String> {
        self.default_bearer.read().clone()
    }

    /// Sends a request as is
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        debug!("{} {}", request.method, request.path);
        self.transport.send(request).await
    }

    /// Sends a request with the default authorization attached, unless it already has one
    pub async fn execute_with_default(
        &self,
        mut request: ApiRequest,
    ) -> Result<ApiResponse, TransportError> {
        if request.bearer.is_none() {
            request.bearer = self.default_bearer();
        }

        self.execute(request).await
    }
}

/// Builds a JSON object from pairs, leaving out absent values
pub(crate) fn object<I>(pairs: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Option<Value>)>,
{
    let map: Map<String, Value> = pairs
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
        .collect();

    Value::Object(map)
}
