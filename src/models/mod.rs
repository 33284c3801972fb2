//! Data models for tracked hotels, their competitors and price observations

mod dates;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use dates::{DateRange, SeasonRequest, format_date, parse_date};

/// Source a competitor listing lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// The competitor hotel's own website
    #[serde(alias = "generic")]
    Competitor,
    Booking,
    Expedia,
    /// Turkish travel agency; prices are quoted per date range
    Etstur,
    Airbnb,
    Agoda,
    #[serde(rename = "hotels.com")]
    HotelsCom,
    #[serde(other)]
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Competitor => "competitor",
            Self::Booking => "booking",
            Self::Expedia => "expedia",
            Self::Etstur => "etstur",
            Self::Airbnb => "airbnb",
            Self::Agoda => "agoda",
            Self::HotelsCom => "hotels.com",
            Self::Unknown => "unknown",
        }
    }
}

impl From<&str> for Platform {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "competitor" | "generic" => Self::Competitor,
            "booking" => Self::Booking,
            "expedia" => Self::Expedia,
            "etstur" => Self::Etstur,
            "airbnb" => Self::Airbnb,
            "agoda" => Self::Agoda,
            "hotels.com" => Self::HotelsCom,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a direct competitor site should be read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScrapingMethod {
    #[default]
    Auto,
    Custom,
    StructuredData,
}

impl ScrapingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Custom => "custom",
            Self::StructuredData => "structured-data",
        }
    }
}

impl From<&str> for ScrapingMethod {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "custom" => Self::Custom,
            "structured-data" | "structured" => Self::StructuredData,
            _ => Self::Auto,
        }
    }
}

/// A tracked external listing whose price is observed periodically
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Competitor {
    pub name: String,
    pub url: String,
    pub platform: Platform,
    #[serde(default)]
    pub scraping_method: ScrapingMethod,
    pub custom_selector: Option<String>,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub last_scraped_price: Option<f64>,
}

impl Competitor {
    pub fn new(name: impl Into<String>, url: impl Into<String>, platform: Platform) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            platform,
            scraping_method: ScrapingMethod::Auto,
            custom_selector: None,
            last_scraped_at: None,
            last_scraped_price: None,
        }
    }

    /// Label used in logs when the operator left the name empty
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            self.platform.as_str()
        } else {
            &self.name
        }
    }
}

/// A hotel we track competitors for
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotel {
    pub id: String,
    pub name: Option<String>,
    pub city: Option<String>,
    pub competitors: Vec<Competitor>,
}

impl Hotel {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// One immutable record of a price, or of its confirmed absence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceObservation {
    pub id: String,
    pub hotel_id: String,
    pub platform: Platform,
    pub source_url: String,
    pub price: f64,
    pub currency: String,
    #[serde(with = "dates::optional", default)]
    pub check_in: Option<NaiveDate>,
    #[serde(with = "dates::optional", default)]
    pub check_out: Option<NaiveDate>,
    pub adults: Option<u32>,
    pub children: Option<u32>,
    pub room_type: Option<String>,
    pub availability: bool,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub scraped_at: DateTime<Utc>,
}

impl PriceObservation {
    /// Build an observation stamped with the current time.
    ///
    /// Negative or non-finite prices collapse to zero, and a zero price is
    /// always reported as unavailable.
    pub fn new(
        hotel_id: &str,
        platform: Platform,
        source_url: &str,
        price: f64,
        currency: &str,
    ) -> Self {
        let price = if price.is_finite() && price > 0.0 { price } else { 0.0 };
        let scraped_at = Utc::now();

        Self {
            id: String::new(),
            hotel_id: hotel_id.to_string(),
            platform,
            source_url: source_url.to_string(),
            price,
            currency: currency.to_string(),
            check_in: None,
            check_out: None,
            adults: None,
            children: None,
            room_type: None,
            availability: price > 0.0,
            rating: None,
            review_count: None,
            scraped_at,
        }
        .with_fresh_id()
    }

    /// An explicit "no price" record
    pub fn unavailable(hotel_id: &str, platform: Platform, source_url: &str, currency: &str) -> Self {
        Self::new(hotel_id, platform, source_url, 0.0, currency)
    }

    pub fn with_dates(mut self, range: &DateRange) -> Self {
        self.check_in = Some(range.check_in);
        self.check_out = Some(range.check_out);
        self.with_fresh_id()
    }

    pub fn is_available(&self) -> bool {
        self.availability && self.price > 0.0
    }

    fn with_fresh_id(mut self) -> Self {
        let check_in = self.check_in.map(format_date).unwrap_or_default();
        self.id = format!(
            "{:x}",
            md5::compute(format!(
                "{}:{}:{}:{}:{}",
                self.hotel_id,
                self.source_url,
                self.platform,
                self.scraped_at.timestamp_nanos_opt().unwrap_or_default(),
                check_in
            ))
        );
        self
    }
}

/// Per-competitor outcome reported by the on-demand triggers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorResult {
    pub competitor_name: String,
    #[serde(flatten)]
    pub observation: Option<PriceObservation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompetitorResult {
    pub fn observed(competitor_name: &str, observation: PriceObservation) -> Self {
        Self {
            competitor_name: competitor_name.to_string(),
            observation: Some(observation),
            error: None,
        }
    }

    pub fn failed(competitor_name: &str, error: impl ToString) -> Self {
        Self {
            competitor_name: competitor_name.to_string(),
            observation: None,
            error: Some(error.to_string()),
        }
    }
}

/// Summary returned by "scrape now" and "scrape season" triggers
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeSummary {
    pub hotel_id: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub observations: Vec<PriceObservation>,
    pub results: Vec<CompetitorResult>,
}
