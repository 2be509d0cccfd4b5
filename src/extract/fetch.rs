// src/extract/fetch.rs
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

/// Page bodies past this size are cut off; metadata lives near the top.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Browser-like UA; plenty of sites serve bots an empty shell or a 403.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub timeout: Duration,
    pub user_agent: Option<&'a str>,
    pub accept: &'a str,
}

impl<'a> FetchRequest<'a> {
    pub fn json(url: &'a str, timeout: Duration) -> Self {
        Self {
            url,
            timeout,
            user_agent: None,
            accept: "application/json",
        }
    }

    pub fn html(url: &'a str, timeout: Duration, user_agent: &'a str) -> Self {
        Self {
            url,
            timeout,
            user_agent: Some(user_agent),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        }
    }

    pub fn xml(url: &'a str, timeout: Duration) -> Self {
        Self {
            url,
            timeout,
            user_agent: None,
            accept: "application/rss+xml,application/xml,text/xml;q=0.9,*/*;q=0.5",
        }
    }
}

/// Raw response. Non-2xx statuses come back as `Ok`; callers decide what they mean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedPage {
    pub fn ok(content_type: &str, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.to_string()),
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Success statuses pass through, everything else becomes `FetchError::Status`.
    pub fn into_success(self) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::Status(self.status))
        }
    }
}

/// Outbound HTTP seam shared by the extractor and the connectors.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, req: FetchRequest<'_>) -> Result<FetchedPage, FetchError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, req: FetchRequest<'_>) -> Result<FetchedPage, FetchError> {
        let mut builder = self
            .client
            .get(req.url)
            .timeout(req.timeout)
            .header(reqwest::header::ACCEPT, req.accept)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9");
        if let Some(ua) = req.user_agent {
            builder = builder.header(reqwest::header::USER_AGENT, ua);
        }

        let rsp = builder
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, req.timeout))?;

        let status = rsp.status().as_u16();
        let content_type = rsp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = read_capped(rsp, MAX_BODY_BYTES, req.timeout).await?;

        Ok(FetchedPage {
            status,
            content_type,
            body,
        })
    }
}

/// Read at most `cap` bytes of the body, decoded lossily as UTF-8.
async fn read_capped(
    mut rsp: reqwest::Response,
    cap: usize,
    timeout: Duration,
) -> Result<String, FetchError> {
    let hint = rsp.content_length().map_or(0, |n| n as usize).min(cap);
    let mut buf = Vec::with_capacity(hint);
    while let Some(chunk) = rsp
        .chunk()
        .await
        .map_err(|e| FetchError::from_reqwest(e, timeout))?
    {
        if push_capped(&mut buf, &chunk, cap) {
            debug!(url = %rsp.url(), cap, "response body truncated");
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Append up to the cap; `true` once the buffer is full.
fn push_capped(buf: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    let room = cap.saturating_sub(buf.len());
    buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    buf.len() >= cap
}

// --- Test helper ---

/// Canned responses keyed by URL prefix. Each prefix holds a queue; the last
/// entry repeats once the queue is down to one. Unknown URLs get a 404.
#[derive(Debug, Default)]
pub struct StubFetcher {
    routes: Mutex<Vec<(String, Vec<Result<FetchedPage, FetchError>>)>>,
    pub calls: Mutex<Vec<String>>,
    pub timeouts: Mutex<HashMap<String, Duration>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, prefix: &str, response: Result<FetchedPage, FetchError>) -> Self {
        {
            let mut routes = self.routes.lock().expect("stub mutex poisoned");
            match routes.iter_mut().find(|(p, _)| p == prefix) {
                Some((_, queue)) => queue.push(response),
                None => routes.push((prefix.to_string(), vec![response])),
            }
        }
        self
    }

    pub fn calls_to(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .expect("stub mutex poisoned")
            .iter()
            .filter(|u| u.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, req: FetchRequest<'_>) -> Result<FetchedPage, FetchError> {
        self.calls
            .lock()
            .expect("stub mutex poisoned")
            .push(req.url.to_string());
        self.timeouts
            .lock()
            .expect("stub mutex poisoned")
            .insert(req.url.to_string(), req.timeout);

        let mut routes = self.routes.lock().expect("stub mutex poisoned");
        let queue = routes
            .iter_mut()
            .filter(|(p, _)| req.url.starts_with(p.as_str()))
            .max_by_key(|(p, _)| p.len())
            .map(|(_, q)| q);
        match queue {
            Some(q) if q.len() > 1 => q.remove(0),
            Some(q) => q
                .first()
                .cloned()
                .unwrap_or(Err(FetchError::Status(404))),
            None => Ok(FetchedPage::status(404)),
        }
    }
}
