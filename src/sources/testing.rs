use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::render::{Page, Renderer};
use super::SourceError;
use crate::settings::SourceSettings;

pub fn test_settings() -> SourceSettings {
    SourceSettings {
        settle_delay: Duration::ZERO,
        ready_timeout: Duration::from_millis(60),
        poll_interval: Duration::from_millis(10),
        ..SourceSettings::default()
    }
}

/// Builds a Daraz-shaped results page from `(title, price text)` pairs.
pub fn daraz_page(items: &[(String, String)]) -> String {
    let mut html = String::from("<html><body>");
    for (i, (title, price)) in items.iter().enumerate() {
        html.push_str(&format!(
            r#"<div data-qa-locator="product-item"><div class="RfADt"><a title="{title}" href="//www.daraz.pk/products/item-{i}.html">{title}</a></div><span class="ooOxS">{price}</span></div>"#
        ));
    }
    html.push_str("</body></html>");
    html
}

#[derive(Clone)]
enum Behaviour {
    Serve(String),
    /// An empty shell for the first `polls` reads, then the real document.
    AppearsAfter { polls: usize, html: String },
    Unreachable,
}

#[derive(Default)]
struct Counters {
    acquired: AtomicUsize,
    released: AtomicUsize,
    reads: AtomicUsize,
    visited: Mutex<Vec<String>>,
}

/// Renderer double that counts page leases.
pub struct FakeRenderer {
    behaviour: Behaviour,
    counters: Arc<Counters>,
}

impl FakeRenderer {
    pub fn serving(html: impl Into<String>) -> Self {
        Self { behaviour: Behaviour::Serve(html.into()), counters: Arc::default() }
    }

    pub fn appearing_after(polls: usize, html: impl Into<String>) -> Self {
        Self { behaviour: Behaviour::AppearsAfter { polls, html: html.into() }, counters: Arc::default() }
    }

    pub fn unreachable() -> Self {
        Self { behaviour: Behaviour::Unreachable, counters: Arc::default() }
    }

    pub fn acquired(&self) -> usize { self.counters.acquired.load(Ordering::SeqCst) }
    pub fn released(&self) -> usize { self.counters.released.load(Ordering::SeqCst) }
    pub fn reads(&self) -> usize { self.counters.reads.load(Ordering::SeqCst) }
    pub fn visited(&self) -> Vec<String> { self.counters.visited.lock().unwrap().clone() }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn open(&self) -> Result<Box<dyn Page>, SourceError> {
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage { behaviour: self.behaviour.clone(), counters: self.counters.clone(), loaded: false }))
    }
}

struct FakePage {
    behaviour: Behaviour,
    counters: Arc<Counters>,
    loaded: bool,
}

#[async_trait]
impl Page for FakePage {
    async fn navigate(&mut self, url: &Url) -> Result<(), SourceError> {
        self.counters.visited.lock().unwrap().push(url.to_string());
        match self.behaviour {
            Behaviour::Serve(_) | Behaviour::AppearsAfter { .. } => {
                self.loaded = true;
                Ok(())
            }
            Behaviour::Unreachable => Err(SourceError::Unreachable { url: url.to_string(), reason: "connection refused".into() }),
        }
    }

    async fn content(&mut self) -> Result<String, SourceError> {
        let read = self.counters.reads.fetch_add(1, Ordering::SeqCst);
        match (&self.behaviour, self.loaded) {
            (Behaviour::Serve(html), true) => Ok(html.clone()),
            (Behaviour::AppearsAfter { polls, html }, true) => {
                Ok(if read < *polls { "<html><body><div id=\"app\"></div></body></html>".to_string() } else { html.clone() })
            }
            _ => Err(SourceError::Renderer("no page loaded".into())),
        }
    }

    fn release(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Product source that answers from a fixed list, or always fails.
pub struct StaticSource {
    name: &'static str,
    listings: Option<Vec<super::Listing>>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(name: &'static str, listings: Vec<super::Listing>) -> Self {
        Self { name, listings: Some(listings), calls: AtomicUsize::new(0) }
    }

    pub fn failing(name: &'static str) -> Self {
        Self { name, listings: None, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl super::ProductSource for StaticSource {
    fn name(&self) -> &'static str { self.name }
    fn description(&self) -> &'static str { "static test source" }

    async fn extract(&self, query: &super::Query) -> Result<Vec<super::Listing>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.listings.clone().ok_or_else(|| SourceError::Unreachable { url: format!("test://{}/{query}", self.name), reason: "connection reset".into() })
    }
}

pub fn listing(title: &str, price: f64) -> super::Listing {
    super::Listing::new(title, price, Url::parse(&format!("https://shop.test/{}", price)).unwrap()).unwrap()
}
