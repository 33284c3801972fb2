//! Traits and per-source configuration for platform adapters

use async_trait::async_trait;

use crate::error::AcquireError;
use crate::models::{Competitor, DateRange, Platform, PriceObservation};

/// Capability an adapter brings; dispatch goes through this tag, never
/// through platform strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Generic,
    CustomSelector,
    StructuredData,
    DateParameterized,
}

/// Per-call inputs that do not belong to the competitor record
#[derive(Debug, Clone)]
pub struct AcquireContext {
    pub hotel_id: String,
    /// Only meaningful for date-parameterized sources
    pub date_range: Option<DateRange>,
}

impl AcquireContext {
    pub fn for_hotel(hotel_id: impl Into<String>) -> Self {
        Self {
            hotel_id: hotel_id.into(),
            date_range: None,
        }
    }

    pub fn with_dates(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }
}

/// Turns one competitor into one observation
#[async_trait]
pub trait Adapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    /// Fetch and price the competitor's page.
    ///
    /// A page without a plausible price is an unavailable observation, not
    /// an error.
    async fn acquire(
        &self,
        competitor: &Competitor,
        ctx: &AcquireContext,
    ) -> Result<PriceObservation, AcquireError>;

    /// Give back long-lived resources such as a headless browser
    async fn release(&self) {}
}

/// Source knowledge for listing sites read by the generic adapter
#[derive(Debug, Clone)]
pub struct SiteProfile {
    /// Currency the site quotes in
    pub currency: String,
    /// Selectors tried before the generic cascade
    pub price: Vec<String>,
    pub rating: Option<String>,
    pub review_count: Option<String>,
}

impl SiteProfile {
    /// Profile for sites we know nothing specific about
    pub fn plain(currency: &str) -> Self {
        Self {
            currency: currency.to_string(),
            price: Vec::new(),
            rating: None,
            review_count: None,
        }
    }

    /// Known selectors for a listing platform, if we have any
    pub fn for_platform(platform: Platform, currency: &str) -> Self {
        match platform {
            Platform::Booking => Self {
                currency: currency.to_string(),
                price: vec![".hprt-price-price".to_string(), ".prco-valign-middle-helper".to_string()],
                rating: Some(".review-score-badge".to_string()),
                review_count: Some(".review-score-review-count".to_string()),
            },
            Platform::Expedia => Self {
                currency: currency.to_string(),
                price: vec![".uitax".to_string(), "[data-stid=\"price-summary\"]".to_string()],
                rating: Some(".ui-rating".to_string()),
                review_count: None,
            },
            _ => Self::plain(currency),
        }
    }
}

/// URL knowledge for a source that prices a specific stay
#[derive(Debug, Clone)]
pub struct DatedSite {
    pub platform: Platform,
    pub currency: String,
    pub check_in_param: String,
    pub check_out_param: String,
    pub adults_param: String,
    pub children_param: String,
    pub adults: u32,
    pub children: u32,
}

impl DatedSite {
    /// ETS Tur: `?giris=DD.MM.YYYY&cikis=DD.MM.YYYY&yetiskin=2&cocuk=0`
    pub fn etstur() -> Self {
        Self {
            platform: Platform::Etstur,
            currency: "TRY".to_string(),
            check_in_param: "giris".to_string(),
            check_out_param: "cikis".to_string(),
            adults_param: "yetiskin".to_string(),
            children_param: "cocuk".to_string(),
            adults: 2,
            children: 0,
        }
    }

    /// Query-parameterized URL for `range`; any query on `base` is dropped
    pub fn build_url(&self, base: &str, range: &DateRange) -> String {
        let base = base.split('?').next().unwrap_or(base);
        format!(
            "{base}?{}={}&{}={}&{}={}&{}={}",
            self.check_in_param,
            urlencoding::encode(&range.check_in_text()),
            self.check_out_param,
            urlencoding::encode(&range.check_out_text()),
            self.adults_param,
            self.adults,
            self.children_param,
            self.children,
        )
    }
}
