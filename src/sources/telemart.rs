use scraper::{ElementRef, Selector};
use url::Url;

use super::{Listing, MalformedListing, Query, SourceError, Storefront, WaitStrategy};
use super::{attr, compile, first_match, parse_price, resolve_link, text_of};
use crate::settings::SourceSettings;

const ITEM: &str = "div.bg-white.relative.cursor-pointer";
const LINK: &str = "a";
const TITLE: &str = "h4";
const PRICE: &str = "span.text-green-600";

pub struct Telemart {
    origin: Url,
    item: Selector,
    link: Selector,
    title: Selector,
    price: Selector,
}

impl Telemart {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_origin(Url::parse("https://telemart.pk")?)
    }

    pub fn with_origin(origin: Url) -> Result<Self, SourceError> {
        Ok(Self { origin, item: compile(ITEM)?, link: compile(LINK)?, title: compile(TITLE)?, price: compile(PRICE)? })
    }
}

impl Storefront for Telemart {
    fn tool_name(&self) -> &'static str { "get_telemart_products" }

    fn description(&self) -> &'static str {
        "Scrapes product listings from Telemart.pk for the search query. Returns up to 10 items with name, price, and link."
    }

    fn search_url(&self, query: &Query) -> Result<Url, SourceError> {
        let mut url = self.origin.join("/search")?;
        url.query_pairs_mut().append_pair("query", query.as_str());
        Ok(url)
    }

    fn wait_strategy(&self, settings: &SourceSettings) -> WaitStrategy {
        WaitStrategy::UntilItems(settings.ready_timeout)
    }

    fn item_selector(&self) -> &Selector { &self.item }

    fn parse_item(&self, item: ElementRef<'_>) -> Result<Listing, MalformedListing> {
        let href = attr(first_match(item, &self.link, LINK)?, "href")?;
        let title = text_of(first_match(item, &self.title, TITLE)?);
        let price = parse_price(&text_of(first_match(item, &self.price, PRICE)?))?;
        Listing::new(&title, price, resolve_link(&self.origin, href)?)
    }
}
