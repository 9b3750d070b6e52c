use scraper::{ElementRef, Selector};
use url::Url;

use super::{Listing, MalformedListing, Query, SourceError, Storefront, WaitStrategy};
use super::{attr, compile, first_match, parse_price, resolve_link, text_of};
use crate::settings::SourceSettings;

const ITEM: &str = r#"[data-qa-locator="product-item"]"#;
const TITLE: &str = "div.RfADt a";
const PRICE: &str = "span.ooOxS";

/// Daraz renders its grid client-side, so the page is given a fixed settle time.
pub struct Daraz {
    origin: Url,
    item: Selector,
    title: Selector,
    price: Selector,
}

impl Daraz {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_origin(Url::parse("https://www.daraz.pk")?)
    }

    pub fn with_origin(origin: Url) -> Result<Self, SourceError> {
        Ok(Self { origin, item: compile(ITEM)?, title: compile(TITLE)?, price: compile(PRICE)? })
    }
}

impl Storefront for Daraz {
    fn tool_name(&self) -> &'static str { "get_daraz_products" }

    fn description(&self) -> &'static str {
        "Scrapes up to 10 top-rated products (4 stars and above) from Daraz.pk for the search query. Returns title, price, and product link."
    }

    fn search_url(&self, query: &Query) -> Result<Url, SourceError> {
        let mut url = self.origin.join("/catalog/")?;
        url.query_pairs_mut().append_pair("q", query.as_str()).append_pair("rating", "4");
        Ok(url)
    }

    fn wait_strategy(&self, settings: &SourceSettings) -> WaitStrategy {
        WaitStrategy::Fixed(settings.settle_delay)
    }

    fn item_selector(&self) -> &Selector { &self.item }

    fn parse_item(&self, item: ElementRef<'_>) -> Result<Listing, MalformedListing> {
        let anchor = first_match(item, &self.title, TITLE)?;
        let title = attr(anchor, "title")?;
        let price = parse_price(&text_of(first_match(item, &self.price, PRICE)?))?;
        let link = resolve_link(&self.origin, attr(anchor, "href")?)?;
        Listing::new(title, price, link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first_item(store: &Daraz, html: &str) -> Result<Listing, MalformedListing> {
        let doc = Html::parse_document(html);
        let item = doc.select(store.item_selector()).next().unwrap();
        store.parse_item(item)
    }

    #[test]
    fn reads_title_attribute_and_protocol_relative_link() {
        let html = r#"<div data-qa-locator="product-item">
            <div class="RfADt"><a title=" Apple iPhone 13 128GB " href="//www.daraz.pk/products/iphone-13-i1.html">Apple iPhone…</a></div>
            <span class="ooOxS">Rs. 189,999</span>
        </div>"#;
        let listing = first_item(&Daraz::new().unwrap(), html).unwrap();
        assert_eq!(listing.title(), "Apple iPhone 13 128GB");
        assert_eq!(listing.price(), 189999.0);
        assert_eq!(listing.link(), "https://www.daraz.pk/products/iphone-13-i1.html");
    }

    #[test]
    fn missing_price_is_malformed() {
        let html = r#"<div data-qa-locator="product-item"><div class="RfADt"><a title="Case" href="/x">Case</a></div></div>"#;
        assert_eq!(first_item(&Daraz::new().unwrap(), html), Err(MalformedListing::MissingElement(PRICE)));
    }

    #[test]
    fn search_url_encodes_query_and_rating_filter() {
        let q = Query::parse("iphone 13").unwrap();
        let url = Daraz::new().unwrap().search_url(&q).unwrap();
        assert_eq!(url.as_str(), "https://www.daraz.pk/catalog/?q=iphone+13&rating=4");
    }
}
