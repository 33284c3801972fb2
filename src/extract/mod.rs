//! Price extraction from parsed documents.
//!
//! Strategies run in order and the first hit wins:
//! 1. structured data (JSON-LD offers, price meta tags)
//! 2. a cascade of price-flavoured CSS selectors
//! 3. a scan of all visible text for currency-tagged amounts
//!
//! Every strategy only accepts values above the plausibility floor.

mod normalize;

pub use normalize::{parse_all, parse_price};

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::ExtractionError;

/// Default floor in local-currency terms; rejects ratings, counts and "0"
pub const DEFAULT_PLAUSIBILITY_FLOOR: f64 = 100.0;

/// Selectors associated with price/cost/rate semantics, most specific first
const PRICE_SELECTORS: &[&str] = &[
    "[data-price]",
    ".price-value",
    ".room-price",
    ".hotel-price",
    ".total-price",
    ".final-price",
    ".price-amount",
    ".priceText",
    ".price",
    ".amount",
    "span[data-testid*=\"price\"]",
    "span[class*=\"price\"]",
    "div[class*=\"price\"]",
    "[class*=\"price\"]",
    "[class*=\"Price\"]",
    "[class*=\"fiyat\"]",
    "[class*=\"cost\"]",
    "[class*=\"rate\"]",
];

static JSON_LD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector"));

static PRICE_META: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="product:price:amount"], meta[itemprop="price"], [itemprop="price"][content]"#)
        .expect("valid selector")
});

/// Amount followed by a currency marker, or a symbol followed by an amount
static CURRENCY_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    let amount = normalize::AMOUNT_PATTERN;
    Regex::new(&format!(
        r"(?:(?P<suffixed>{amount})\s*(?:₺|€|\$|£|(?i:TL|TRY|USD|EUR|GBP)\b))|(?:(?:₺|€|\$|£)\s*(?P<prefixed>{amount}))"
    ))
    .expect("currency pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    StructuredData,
    SelectorCascade,
    DocumentScan,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::StructuredData,
        Strategy::SelectorCascade,
        Strategy::DocumentScan,
    ];
}

#[derive(Debug, Clone)]
pub struct PriceExtractor {
    floor: f64,
    selectors: Vec<Selector>,
}

impl Default for PriceExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_PLAUSIBILITY_FLOOR)
    }
}

impl PriceExtractor {
    pub fn new(floor: f64) -> Self {
        let selectors = PRICE_SELECTORS
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .collect();

        Self {
            floor: floor.max(0.0),
            selectors,
        }
    }

    /// Put site-specific selectors ahead of the generic cascade
    pub fn with_preferred_selectors(mut self, preferred: &[&str]) -> Result<Self, ExtractionError> {
        let mut parsed = preferred
            .iter()
            .map(|s| parse_selector(s))
            .collect::<Result<Vec<_>, _>>()?;
        parsed.append(&mut self.selectors);
        self.selectors = parsed;
        Ok(self)
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Run every strategy. `None` means unavailable, not an error.
    pub fn extract(&self, document: &Html) -> Option<f64> {
        self.extract_with(document, &Strategy::ALL)
    }

    pub fn extract_with(&self, document: &Html, strategies: &[Strategy]) -> Option<f64> {
        strategies.iter().find_map(|strategy| {
            let price = match strategy {
                Strategy::StructuredData => self.structured_data(document),
                Strategy::SelectorCascade => self.selector_cascade(document),
                Strategy::DocumentScan => self.document_scan(document),
            };
            if let Some(price) = price {
                debug!(?strategy, price, "Price extracted");
            }
            price
        })
    }

    /// JSON-LD `offers.price` or a price meta tag above the floor
    pub fn structured_data(&self, document: &Html) -> Option<f64> {
        let from_json_ld = document.select(&JSON_LD).find_map(|script| {
            let raw = script.text().collect::<String>();
            let json: Value = serde_json::from_str(raw.trim()).ok()?;
            find_offer_price(&json, self.floor)
        });

        from_json_ld.or_else(|| {
            document
                .select(&PRICE_META)
                .filter_map(|meta| meta.value().attr("content"))
                .filter_map(parse_price)
                .find(|price| *price > self.floor)
        })
    }

    /// First selector match whose text holds a plausible amount
    pub fn selector_cascade(&self, document: &Html) -> Option<f64> {
        self.selectors.iter().find_map(|selector| {
            document
                .select(selector)
                .find_map(|element| self.plausible_in(element))
        })
    }

    /// Largest currency-tagged amount anywhere in the visible text.
    ///
    /// Totals usually dominate per-night and tax lines, so the maximum wins.
    /// On pages with no real price this can pick an unrelated large figure.
    pub fn document_scan(&self, document: &Html) -> Option<f64> {
        let text = visible_text(document);

        CURRENCY_AMOUNT
            .captures_iter(&text)
            .filter_map(|caps| caps.name("suffixed").or_else(|| caps.name("prefixed")))
            .filter_map(|m| normalize::parse_amount(m.as_str()))
            .filter(|price| *price > self.floor)
            .max_by(|a, b| a.total_cmp(b))
    }

    /// Price under an operator-asserted selector; absence is a hard error
    pub fn extract_custom(&self, document: &Html, selector: &str) -> Result<f64, ExtractionError> {
        let parsed = parse_selector(selector)?;
        let element = document
            .select(&parsed)
            .next()
            .ok_or_else(|| ExtractionError::SelectorNotFound(selector.to_string()))?;

        let text = element.text().collect::<String>();
        parse_price(&text)
            .filter(|price| *price > 0.0)
            .ok_or_else(|| ExtractionError::NoPrice {
                selector: selector.to_string(),
                text: text.trim().to_string(),
            })
    }

    fn plausible_in(&self, element: ElementRef<'_>) -> Option<f64> {
        let attr = element.value().attr("data-price").map(str::to_string);
        let text = element.text().collect::<String>();

        attr.into_iter()
            .chain(std::iter::once(text))
            .filter(|candidate| candidate.chars().any(|c| c.is_ascii_digit()))
            .filter_map(|candidate| parse_price(&candidate))
            .find(|price| *price > self.floor)
    }
}

/// First number under `selector`, without any floor (ratings, review counts)
pub fn first_number(document: &Html, selector: &str) -> Option<f64> {
    let parsed = Selector::parse(selector).ok()?;
    document
        .select(&parsed)
        .find_map(|element| parse_price(&element.text().collect::<String>()))
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector).map_err(|e| ExtractionError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{e:?}"),
    })
}

fn find_offer_price(value: &Value, floor: f64) -> Option<f64> {
    match value {
        Value::Array(items) => items.iter().find_map(|item| find_offer_price(item, floor)),
        Value::Object(map) => map
            .get("offers")
            .and_then(|offers| offer_price(offers, floor))
            .or_else(|| map.get("@graph").and_then(|graph| find_offer_price(graph, floor)))
            .or_else(|| map.get("containsPlace").and_then(|place| find_offer_price(place, floor))),
        _ => None,
    }
}

fn offer_price(offers: &Value, floor: f64) -> Option<f64> {
    match offers {
        Value::Array(items) => items.iter().find_map(|offer| offer_price(offer, floor)),
        Value::Object(map) => ["price", "lowPrice"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|value| json_number(value, floor))
            .or_else(|| map.get("priceSpecification").and_then(|spec| offer_price(spec, floor))),
        _ => None,
    }
}

fn json_number(value: &Value, floor: f64) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_price(s),
        _ => None,
    }?;
    (number.is_finite() && number > floor).then_some(number)
}

fn visible_text(document: &Html) -> String {
    let mut text = String::new();
    for node in document.root_element().descendants() {
        if let Node::Text(chunk) = node.value() {
            let hidden = node
                .parent()
                .and_then(|parent| parent.value().as_element())
                .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript"));
            // Newline is not a digit-group separator, so adjacent cells stay apart
            if !hidden {
                text.push_str(chunk);
                text.push('\n');
            }
        }
    }
    text
}
