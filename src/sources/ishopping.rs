use scraper::{ElementRef, Selector};
use url::Url;

use super::{Listing, MalformedListing, Query, SourceError, Storefront, WaitStrategy};
use super::{attr, compile, first_match, parse_price, resolve_link, text_of};
use crate::settings::SourceSettings;

const ITEM: &str = "div.product-item-info";
const TITLE: &str = "a.product-item-link";
const PRICE: &str = "span.price-wrapper";

/// iShopping exposes the machine-readable price in `data-price-amount`.
pub struct IShopping {
    origin: Url,
    item: Selector,
    title: Selector,
    price: Selector,
}

impl IShopping {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_origin(Url::parse("https://www.ishopping.pk")?)
    }

    pub fn with_origin(origin: Url) -> Result<Self, SourceError> {
        Ok(Self { origin, item: compile(ITEM)?, title: compile(TITLE)?, price: compile(PRICE)? })
    }
}

impl Storefront for IShopping {
    fn tool_name(&self) -> &'static str { "get_ishopping_products" }

    fn description(&self) -> &'static str {
        "Scrapes search results from iShopping.pk. Returns up to 10 products with their title, price, and URL."
    }

    fn search_url(&self, query: &Query) -> Result<Url, SourceError> {
        let mut url = self.origin.join("/catalogsearch/result/")?;
        url.query_pairs_mut().append_pair("q", query.as_str());
        Ok(url)
    }

    fn wait_strategy(&self, settings: &SourceSettings) -> WaitStrategy {
        WaitStrategy::UntilItems(settings.ready_timeout)
    }

    fn item_selector(&self) -> &Selector { &self.item }

    fn parse_item(&self, item: ElementRef<'_>) -> Result<Listing, MalformedListing> {
        let anchor = first_match(item, &self.title, TITLE)?;
        let amount = attr(first_match(item, &self.price, PRICE)?, "data-price-amount")?;
        let price = parse_price(amount)?;
        Listing::new(&text_of(anchor), price, resolve_link(&self.origin, attr(anchor, "href")?)?)
    }
}
