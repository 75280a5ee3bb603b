//! Single-request HTTP transport.
//!
//! A [`Transport`] sends exactly one request and never follows redirects;
//! retries, redirect handling and URL validation live in
//! [`FetchClient`](super::FetchClient).

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cookie_store::CookieStore;
use reqwest_cookie_store::CookieStoreMutex;
use tracing::debug;

use crate::error::{FetchError, FetchResult};

/// Request method and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    /// URL-encoded form post
    Post(Vec<(String, String)>),
}

/// One outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub method: Method,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
        }
    }

    pub fn post_form(url: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            method: Method::Post(fields),
        }
    }
}

/// Response as received, before any redirect handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            location: None,
            body: body.into(),
        }
    }

    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self {
            status,
            location: Some(location.into()),
            body: Vec::new(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            location: None,
            body: Vec::new(),
        }
    }
}

/// Sends a single request without following redirects.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> FetchResult<RawResponse>;

    /// Flush the cookie jar to durable storage.
    fn persist_cookies(&self) -> FetchResult<()> {
        Ok(())
    }
}

/// `reqwest` transport bound to a JSON cookie jar on disk.
pub struct ReqwestTransport {
    client: reqwest::Client,
    jar: Arc<CookieStoreMutex>,
    cookie_path: PathBuf,
}

fn load_jar(path: &Path) -> FetchResult<CookieStore> {
    match File::open(path) {
        Ok(file) => cookie_store::serde::json::load(BufReader::new(file)).map_err(FetchError::CookieJar),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CookieStore::default()),
        Err(e) => Err(FetchError::CookieJar(Box::new(e))),
    }
}

impl ReqwestTransport {
    /// Build a client whose cookies persist at `cookie_path`.
    ///
    /// A fresh job starts with an empty jar; a continuation reopens the jar
    /// its predecessor saved.
    pub fn open(
        cookie_path: impl Into<PathBuf>,
        user_agent: &str,
        timeout: Duration,
        fresh: bool,
    ) -> FetchResult<Self> {
        let cookie_path = cookie_path.into();
        let store = if fresh {
            CookieStore::default()
        } else {
            load_jar(&cookie_path)?
        };
        let jar = Arc::new(CookieStoreMutex::new(store));

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .user_agent(user_agent)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| FetchError::Client(Box::new(e)))?;

        debug!(cookie_path = %cookie_path.display(), fresh, "HTTP transport ready");
        Ok(Self {
            client,
            jar,
            cookie_path,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> FetchResult<RawResponse> {
        let builder = match &request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post(fields) => self.client.post(&request.url).form(fields),
        };

        let response = builder.send().await.map_err(|e| FetchError::Http {
            url: request.url.clone(),
            source: Box::new(e),
        })?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await.map_err(|e| FetchError::Http {
            url: request.url.clone(),
            source: Box::new(e),
        })?;

        Ok(RawResponse {
            status,
            location,
            body: body.to_vec(),
        })
    }

    fn persist_cookies(&self) -> FetchResult<()> {
        let store = self
            .jar
            .lock()
            .map_err(|_| FetchError::CookieJar("cookie jar lock poisoned".into()))?;

        let tmp = self
            .cookie_path
            .with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        let file = File::create(&tmp).map_err(|e| FetchError::CookieJar(Box::new(e)))?;
        let mut writer = BufWriter::new(file);
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(&store, &mut writer)
            .map_err(FetchError::CookieJar)?;
        writer
            .flush()
            .map_err(|e| FetchError::CookieJar(Box::new(e)))?;
        drop(writer);

        std::fs::rename(&tmp, &self.cookie_path).map_err(|e| FetchError::CookieJar(Box::new(e)))?;
        debug!(cookie_path = %self.cookie_path.display(), "Cookie jar persisted");
        Ok(())
    }
}
