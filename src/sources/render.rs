use std::ops::{Deref, DerefMut};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::SourceError;

/// Hands out pages. One page per extraction, never shared.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Page>, SourceError>;
}

#[async_trait]
pub trait Page: Send {
    async fn navigate(&mut self, url: &Url) -> Result<(), SourceError>;
    /// Current document as HTML.
    async fn content(&mut self) -> Result<String, SourceError>;
    fn release(&mut self);
}

/// Owns an open page and releases it when dropped, whichever way the
/// extraction exits.
pub struct PageLease {
    page: Box<dyn Page>,
}

impl PageLease {
    pub fn new(page: Box<dyn Page>) -> Self { Self { page } }
}

impl Deref for PageLease {
    type Target = dyn Page;
    fn deref(&self) -> &Self::Target { self.page.as_ref() }
}

impl DerefMut for PageLease {
    fn deref_mut(&mut self) -> &mut Self::Target { self.page.as_mut() }
}

impl Drop for PageLease {
    fn drop(&mut self) { self.page.release(); }
}

/// Fetches pages over plain HTTP. Content rendered by client-side scripts is
/// not visible to it.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    user_agent: String,
    request_timeout: Duration,
}

impl HttpRenderer {
    pub fn new(user_agent: impl Into<String>, request_timeout: Duration) -> Self {
        Self { user_agent: user_agent.into(), request_timeout }
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn open(&self) -> Result<Box<dyn Page>, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| SourceError::Renderer(e.to_string()))?;
        Ok(Box::new(HttpPage { client: Some(client), body: None }))
    }
}

struct HttpPage {
    client: Option<reqwest::Client>,
    body: Option<String>,
}

#[async_trait]
impl Page for HttpPage {
    async fn navigate(&mut self, url: &Url) -> Result<(), SourceError> {
        let client = self.client.as_ref().ok_or_else(|| SourceError::Renderer("page already released".into()))?;
        let unreachable = |reason: String| SourceError::Unreachable { url: url.to_string(), reason };
        let resp = client.get(url.clone()).send().await.map_err(|e| unreachable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(unreachable(format!("status {}", resp.status())));
        }
        let body = resp.text().await.map_err(|e| unreachable(e.to_string()))?;
        debug!(%url, bytes = body.len(), "page loaded");
        self.body = Some(body);
        Ok(())
    }

    async fn content(&mut self) -> Result<String, SourceError> {
        self.body.clone().ok_or_else(|| SourceError::Renderer("no page loaded".into()))
    }

    fn release(&mut self) {
        self.client.take();
        self.body.take();
    }
}
