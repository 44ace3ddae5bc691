//! HTTP(S) connection to the WFA REST API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::element::{Element, SerializeOptions};
use crate::error::{ApiCode, Result, WfaError};

/// Content type of WFA request bodies.
pub const CONTENT_TYPE_XML: &str = "application/xml";

/// Port used until [`ServerConnection::set_port`] is called.
pub const DEFAULT_PORT: u16 = 80;

/// Protocol used to reach the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    #[default]
    Http,
    Https,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Http => write!(f, "http"),
            TransportType::Https => write!(f, "https"),
        }
    }
}

/// Authorization style for communicating with the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    #[default]
    BasicAuth,
    CertificateAuth,
}

/// Something that can run a WFA REST call and return the parsed body.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a request against `path` (relative to `/rest/`).
    ///
    /// A body turns the request into a `POST`, otherwise a `GET` is sent.
    async fn invoke(&self, path: &str, body: Option<&Element>) -> Result<Element>;

    /// Base address of the server, used in log and error messages.
    fn base_url(&self) -> String;
}

/// Connection parameters plus a lazily built HTTP client.
pub struct ServerConnection {
    host: String,
    port: u16,
    transport_type: TransportType,
    style: AuthStyle,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<Duration>,
    opener: RwLock<Option<Client>>,
}

impl ServerConnection {
    /// Create a connection using basic auth over HTTP on the default port.
    pub fn new(host: impl Into<String>, username: Option<String>, password: Option<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            transport_type: TransportType::default(),
            style: AuthStyle::default(),
            username,
            password,
            timeout: None,
            opener: RwLock::new(None),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn transport_type(&self) -> TransportType {
        self.transport_type
    }

    pub fn style(&self) -> AuthStyle {
        self.style
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Switch protocol. Resets the port to [`DEFAULT_PORT`].
    pub fn set_transport_type(&mut self, transport_type: TransportType) {
        self.transport_type = transport_type;
        self.port = DEFAULT_PORT;
        self.invalidate();
    }

    /// Set the server port. Drops the cached HTTP client.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
        self.invalidate();
    }

    pub fn set_style(&mut self, style: AuthStyle) {
        self.style = style;
        self.invalidate();
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = Some(username.into());
        self.invalidate();
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Some(password.into());
        self.invalidate();
    }

    /// Set the request timeout. Drops the cached HTTP client.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
        self.invalidate();
    }

    /// Whether a client is currently cached.
    pub async fn is_connected(&self) -> bool {
        self.opener.read().await.is_some()
    }

    fn invalidate(&mut self) {
        *self.opener.get_mut() = None;
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/{}", self.base_url(), path)
    }

    /// Get the cached client, building it if necessary.
    async fn opener(&self) -> Result<Client> {
        {
            let cached = self.opener.read().await;
            if let Some(client) = cached.as_ref() {
                return Ok(client.clone());
            }
        }

        let client = self.build_opener()?;

        {
            let mut cached = self.opener.write().await;
            *cached = Some(client.clone());
        }

        Ok(client)
    }

    fn build_opener(&self) -> Result<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_XML));

        match self.style {
            AuthStyle::BasicAuth => {
                let credentials = format!(
                    "{}:{}",
                    self.username.as_deref().unwrap_or_default(),
                    self.password.as_deref().unwrap_or_default()
                );
                let mut value = HeaderValue::from_str(&format!(
                    "Basic {}",
                    STANDARD.encode(credentials)
                ))
                .map_err(|e| WfaError::Configuration(format!("invalid credentials: {}", e)))?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            AuthStyle::CertificateAuth => {
                return Err(WfaError::Configuration(
                    "certificate authentication is not supported".to_string(),
                ));
            }
        }

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

#[async_trait]
impl Transport for ServerConnection {
    async fn invoke(&self, path: &str, body: Option<&Element>) -> Result<Element> {
        let url = self.url(path);
        let client = self.opener().await?;

        let request = match body {
            Some(body) => client
                .post(&url)
                .body(body.serialize(&SerializeOptions::standalone())?),
            None => client.get(&url),
        };

        let response = request.send().await.map_err(|e| WfaError::ApiError {
            code: ApiCode::Unexpected,
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WfaError::ApiError {
                code: ApiCode::Status(status.as_u16()),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        let xml = response.text().await.map_err(|e| WfaError::ApiError {
            code: ApiCode::Unexpected,
            message: e.to_string(),
        })?;
        if xml.trim().is_empty() {
            return Err(WfaError::ApiError {
                code: ApiCode::NoResponse,
                message: "No response received".to_string(),
            });
        }

        Element::parse(&xml)
    }

    fn base_url(&self) -> String {
        format!("{}://{}:{}", self.transport_type, self.host, self.port)
    }
}

impl fmt::Display for ServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server: {}", self.host)
    }
}
