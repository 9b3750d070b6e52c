//! Product sources: one scraper per storefront behind a shared extraction
//! contract. A source turns a query into at most [`MAX_LISTINGS`] listings in
//! page order, dropping items it cannot parse.

use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::ScoutError;
use crate::settings::SourceSettings;

pub mod daraz;
pub mod ishopping;
pub mod render;
pub mod telemart;
#[cfg(test)]
pub mod testing;

use render::{PageLease, Renderer};

pub const MAX_LISTINGS: usize = 10;

/// Free-text product query, trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query(String);

impl Query {
    pub fn parse(raw: &str) -> Result<Self, ScoutError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ScoutError::EmptyQuery);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    title: String,
    price: f64,
    link: String,
}

impl Listing {
    pub fn new(title: &str, price: f64, link: Url) -> Result<Self, MalformedListing> {
        let title = collapse_whitespace(title);
        if title.is_empty() {
            return Err(MalformedListing::EmptyTitle);
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(MalformedListing::Price(price.to_string()));
        }
        Ok(Self { title, price, link: link.into() })
    }

    pub fn title(&self) -> &str { &self.title }
    pub fn price(&self) -> f64 { self.price }
    pub fn link(&self) -> &str { &self.link }
}

/// Why a single item on a results page was skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedListing {
    #[error("no element matching {0}")]
    MissingElement(&'static str),
    #[error("element has no {0} attribute")]
    MissingAttribute(&'static str),
    #[error("title is empty")]
    EmptyTitle,
    #[error("unparsable price {0:?}")]
    Price(String),
    #[error("unusable link {0:?}")]
    Link(String),
}

/// Every variant means the source could not answer this query.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("could not load {url}: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("{0} returned an empty page")]
    EmptyPage(String),
    #[error("no listings appeared within {0:?}")]
    Timeout(Duration),
    #[error("rendering resource unavailable: {0}")]
    Renderer(String),
    #[error("invalid selector {0}")]
    Selector(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// How long to let a page settle before reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    Fixed(Duration),
    UntilItems(Duration),
}

/// Site-specific half of a scraper: where to look and how to read one item.
pub trait Storefront: Send + Sync {
    fn tool_name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn search_url(&self, query: &Query) -> Result<Url, SourceError>;
    fn wait_strategy(&self, settings: &SourceSettings) -> WaitStrategy;
    fn item_selector(&self) -> &Selector;
    fn parse_item(&self, item: ElementRef<'_>) -> Result<Listing, MalformedListing>;
}

#[async_trait]
pub trait ProductSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn extract(&self, query: &Query) -> Result<Vec<Listing>, SourceError>;
}

pub struct ScrapingSource<S> {
    store: S,
    renderer: Arc<dyn Renderer>,
    settings: SourceSettings,
}

impl<S: Storefront> ScrapingSource<S> {
    pub fn new(store: S, renderer: Arc<dyn Renderer>, settings: SourceSettings) -> Self {
        Self { store, renderer, settings }
    }
}

#[async_trait]
impl<S: Storefront + 'static> ProductSource for ScrapingSource<S> {
    fn name(&self) -> &'static str { self.store.tool_name() }
    fn description(&self) -> &'static str { self.store.description() }

    async fn extract(&self, query: &Query) -> Result<Vec<Listing>, SourceError> {
        let started = Instant::now();
        let result = scrape(self.renderer.as_ref(), &self.store, &self.settings, query).await;
        metrics::histogram!("price_scout_extract_seconds", "source" => self.name()).record(started.elapsed().as_secs_f64());
        match &result {
            Ok(listings) => info!(source = self.name(), query = %query, count = listings.len(), "extracted listings"),
            Err(e) => warn!(source = self.name(), query = %query, error = %e, "source unavailable"),
        }
        result
    }
}

/// The three storefronts with their production origins.
pub fn default_sources(renderer: Arc<dyn Renderer>, settings: &SourceSettings) -> Result<Vec<Arc<dyn ProductSource>>, SourceError> {
    Ok(vec![
        Arc::new(ScrapingSource::new(daraz::Daraz::new()?, renderer.clone(), settings.clone())) as Arc<dyn ProductSource>,
        Arc::new(ScrapingSource::new(telemart::Telemart::new()?, renderer.clone(), settings.clone())) as Arc<dyn ProductSource>,
        Arc::new(ScrapingSource::new(ishopping::IShopping::new()?, renderer, settings.clone())) as Arc<dyn ProductSource>,
    ])
}

pub async fn scrape(renderer: &dyn Renderer, store: &dyn Storefront, settings: &SourceSettings, query: &Query) -> Result<Vec<Listing>, SourceError> {
    let url = store.search_url(query)?;
    let html = {
        let mut page = PageLease::new(renderer.open().await?);
        page.navigate(&url).await?;
        match store.wait_strategy(settings) {
            WaitStrategy::Fixed(delay) => {
                tokio::time::sleep(delay).await;
                page.content().await?
            }
            WaitStrategy::UntilItems(limit) => {
                wait_for_items(&mut page, store.item_selector(), limit, settings.poll_interval).await?
            }
        }
    };
    if html.trim().is_empty() {
        return Err(SourceError::EmptyPage(url.into()));
    }
    Ok(parse_listings(store, &html))
}

async fn wait_for_items(page: &mut PageLease, items: &Selector, limit: Duration, poll: Duration) -> Result<String, SourceError> {
    tokio::time::timeout(limit, poll_for_items(page, items, poll))
        .await
        .map_err(|_| SourceError::Timeout(limit))?
}

async fn poll_for_items(page: &mut PageLease, items: &Selector, poll: Duration) -> Result<String, SourceError> {
    loop {
        let html = page.content().await?;
        if has_match(&html, items) {
            return Ok(html);
        }
        tokio::time::sleep(poll).await;
    }
}

fn has_match(html: &str, selector: &Selector) -> bool {
    Html::parse_document(html).select(selector).next().is_some()
}

/// Parse every candidate item, keep the first [`MAX_LISTINGS`] that are well formed.
pub fn parse_listings(store: &dyn Storefront, html: &str) -> Vec<Listing> {
    let doc = Html::parse_document(html);
    let mut listings = Vec::new();
    for (index, item) in doc.select(store.item_selector()).enumerate() {
        match store.parse_item(item) {
            Ok(listing) => {
                trace!(source = store.tool_name(), title = listing.title(), price = listing.price(), link = listing.link(), "listing");
                listings.push(listing);
                if listings.len() == MAX_LISTINGS { break; }
            }
            Err(reason) => {
                debug!(source = store.tool_name(), index, %reason, "skipping malformed listing");
                metrics::counter!("price_scout_listings_skipped_total", "source" => store.tool_name()).increment(1);
            }
        }
    }
    listings
}

pub fn compile(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Selector(format!("{css}: {e:?}")))
}

pub fn first_match<'a>(item: ElementRef<'a>, selector: &Selector, css: &'static str) -> Result<ElementRef<'a>, MalformedListing> {
    item.select(selector).next().ok_or(MalformedListing::MissingElement(css))
}

pub fn attr<'a>(el: ElementRef<'a>, name: &'static str) -> Result<&'a str, MalformedListing> {
    el.value().attr(name).ok_or(MalformedListing::MissingAttribute(name))
}

pub fn text_of(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

static PRICE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").ok());
static WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

/// Reads the first number out of strings like `Rs. 1,299` or `PKR 45,000.00`.
pub fn parse_price(raw: &str) -> Result<f64, MalformedListing> {
    let malformed = || MalformedListing::Price(raw.to_string());
    let re = PRICE_PATTERN.as_ref().ok_or_else(malformed)?;
    let digits = re.find(raw).map(|m| m.as_str().replace(',', "")).ok_or_else(malformed)?;
    let value: f64 = digits.parse().map_err(|_| malformed())?;
    if value.is_finite() && value > 0.0 { Ok(value) } else { Err(malformed()) }
}

pub fn resolve_link(origin: &Url, href: &str) -> Result<Url, MalformedListing> {
    let href = href.trim();
    if href.is_empty() {
        return Err(MalformedListing::Link(href.to_string()));
    }
    let url = origin.join(href).map_err(|_| MalformedListing::Link(href.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(MalformedListing::Link(href.to_string())),
    }
}

fn collapse_whitespace(s: &str) -> String {
    match WHITESPACE.as_ref() {
        Some(re) => re.replace_all(s.trim(), " ").into_owned(),
        None => s.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::daraz::Daraz;
    use crate::sources::testing::{FakeRenderer, daraz_page, test_settings};

    #[test]
    fn query_is_trimmed_and_rejects_blank() {
        assert_eq!(Query::parse("  iphone 13 ").unwrap().as_str(), "iphone 13");
        assert!(matches!(Query::parse(" \t "), Err(ScoutError::EmptyQuery)));
    }

    #[test]
    fn price_strips_currency_and_separators() {
        assert_eq!(parse_price("Rs. 1,299").unwrap(), 1299.0);
        assert_eq!(parse_price("PKR 45,000.50").unwrap(), 45000.5);
        assert_eq!(parse_price("12999.0000").unwrap(), 12999.0);
        assert!(parse_price("Rs. ").is_err());
        assert!(parse_price("Rs. 0").is_err());
        assert!(parse_price("call for price").is_err());
    }

    #[test]
    fn links_resolve_against_origin() {
        let origin = Url::parse("https://telemart.pk").unwrap();
        assert_eq!(resolve_link(&origin, "/p/iphone-13").unwrap().as_str(), "https://telemart.pk/p/iphone-13");
        assert_eq!(resolve_link(&origin, "//www.daraz.pk/products/x.html").unwrap().as_str(), "https://www.daraz.pk/products/x.html");
        assert_eq!(resolve_link(&origin, "https://other.pk/a").unwrap().as_str(), "https://other.pk/a");
        assert!(resolve_link(&origin, "  ").is_err());
        assert!(resolve_link(&origin, "javascript:void(0)").is_err());
    }

    #[test]
    fn listing_rejects_empty_title_and_bad_price() {
        let link = Url::parse("https://x.pk/a").unwrap();
        assert_eq!(Listing::new("  ", 10.0, link.clone()), Err(MalformedListing::EmptyTitle));
        assert!(Listing::new("Phone", -1.0, link.clone()).is_err());
        let ok = Listing::new(" Apple   iPhone\n13 ", 10.0, link).unwrap();
        assert_eq!(ok.title(), "Apple iPhone 13");
    }

    #[test]
    fn twelve_items_with_two_malformed_yield_first_ten_good() {
        let mut items: Vec<(String, String)> = (1..=12).map(|i| (format!("Phone {i}"), format!("Rs. {},000", i))).collect();
        items[2].1 = "Rs. --".into();
        items[5].1 = String::new();
        let html = daraz_page(&items);
        let store = Daraz::new().unwrap();
        let listings = parse_listings(&store, &html);
        assert_eq!(listings.len(), 10);
        let titles: Vec<&str> = listings.iter().map(|l| l.title()).collect();
        assert_eq!(titles, vec!["Phone 1", "Phone 2", "Phone 4", "Phone 5", "Phone 7", "Phone 8", "Phone 9", "Phone 10", "Phone 11", "Phone 12"]);
    }

    #[test]
    fn more_than_ten_good_items_are_truncated_not_ranked() {
        let items: Vec<(String, String)> = (1..=15).map(|i| (format!("Phone {i}"), format!("Rs. {}", 2000 - i))).collect();
        let listings = parse_listings(&Daraz::new().unwrap(), &daraz_page(&items));
        assert_eq!(listings.len(), MAX_LISTINGS);
        assert_eq!(listings[0].title(), "Phone 1");
        assert_eq!(listings[9].title(), "Phone 10");
    }

    #[tokio::test]
    async fn lease_released_once_on_success() {
        let html = daraz_page(&[("Phone".into(), "Rs. 100".into())]);
        let renderer = FakeRenderer::serving(html);
        let store = Daraz::new().unwrap();
        let q = Query::parse("phone").unwrap();
        let listings = scrape(&renderer, &store, &test_settings(), &q).await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(renderer.acquired(), 1);
        assert_eq!(renderer.released(), 1);
        assert_eq!(renderer.visited(), vec!["https://www.daraz.pk/catalog/?q=phone&rating=4".to_string()]);
    }

    #[tokio::test]
    async fn lease_released_once_on_partial_failure() {
        let html = daraz_page(&[("Phone".into(), "Rs. 100".into()), ("Case".into(), "n/a".into())]);
        let renderer = FakeRenderer::serving(html);
        let q = Query::parse("phone").unwrap();
        let listings = scrape(&renderer, &Daraz::new().unwrap(), &test_settings(), &q).await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!((renderer.acquired(), renderer.released()), (1, 1));
    }

    #[tokio::test]
    async fn lease_released_once_on_failure() {
        let renderer = FakeRenderer::unreachable();
        let q = Query::parse("phone").unwrap();
        let err = scrape(&renderer, &Daraz::new().unwrap(), &test_settings(), &q).await.unwrap_err();
        assert!(matches!(err, SourceError::Unreachable { .. }));
        assert_eq!((renderer.acquired(), renderer.released()), (1, 1));
    }

    #[tokio::test]
    async fn empty_page_is_unavailable() {
        let renderer = FakeRenderer::serving("   ");
        let q = Query::parse("phone").unwrap();
        let err = scrape(&renderer, &Daraz::new().unwrap(), &test_settings(), &q).await.unwrap_err();
        assert!(matches!(err, SourceError::EmptyPage(_)));
        assert_eq!((renderer.acquired(), renderer.released()), (1, 1));
    }

    #[tokio::test]
    async fn page_without_items_is_an_empty_result() {
        let renderer = FakeRenderer::serving("<html><body><p>No results</p></body></html>");
        let q = Query::parse("zzzz").unwrap();
        let listings = scrape(&renderer, &Daraz::new().unwrap(), &test_settings(), &q).await.unwrap();
        assert!(listings.is_empty());
    }
}
