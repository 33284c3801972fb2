//! Platform adapters and the registry that picks one per competitor

mod custom;
mod dated;
mod generic;
mod season;
mod structured;

pub use custom::CustomSelectorAdapter;
pub use dated::DatedAdapter;
pub use generic::GenericAdapter;
pub use season::{SeasonDriver, SeasonPacing};
pub use structured::StructuredDataAdapter;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::extract::PriceExtractor;
use crate::fetch::FetchClient;
use crate::models::{Competitor, Platform, ScrapingMethod};
use crate::traits::{Adapter, AdapterKind, DatedSite, SiteProfile};

/// Settings shared by every adapter the registry builds
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub plausibility_floor: f64,
    pub reporting_currency: String,
}

/// One adapter instance per capability, each with its own fetch client
pub struct AdapterRegistry {
    generic: GenericAdapter,
    booking: GenericAdapter,
    expedia: GenericAdapter,
    custom: CustomSelectorAdapter,
    structured: StructuredDataAdapter,
    dated: Arc<DatedAdapter>,
}

impl AdapterRegistry {
    /// Build every adapter, asking `new_client` for a fresh fetch client each time
    pub fn build<F>(settings: &AdapterSettings, mut new_client: F) -> Result<Self>
    where
        F: FnMut(AdapterKind) -> Result<FetchClient>,
    {
        let extractor = PriceExtractor::new(settings.plausibility_floor);
        let currency = settings.reporting_currency.as_str();

        let listing = |platform: Platform, client: FetchClient| {
            GenericAdapter::new(
                client,
                extractor.clone(),
                SiteProfile::for_platform(platform, currency),
            )
            .with_context(|| format!("Failed to build {platform} adapter"))
        };

        Ok(Self {
            generic: listing(Platform::Competitor, new_client(AdapterKind::Generic)?)?,
            booking: listing(Platform::Booking, new_client(AdapterKind::Generic)?)?,
            expedia: listing(Platform::Expedia, new_client(AdapterKind::Generic)?)?,
            custom: CustomSelectorAdapter::new(
                new_client(AdapterKind::CustomSelector)?,
                extractor.clone(),
                currency,
            ),
            structured: StructuredDataAdapter::new(
                new_client(AdapterKind::StructuredData)?,
                extractor.clone(),
                currency,
            ),
            dated: Arc::new(DatedAdapter::new(
                new_client(AdapterKind::DateParameterized)?,
                extractor.clone(),
                DatedSite::etstur(),
            )),
        })
    }

    /// Adapter for a competitor, or `None` when its platform is unsupported
    pub fn resolve(&self, competitor: &Competitor) -> Option<&dyn Adapter> {
        match competitor.platform {
            Platform::Competitor => Some(match competitor.scraping_method {
                ScrapingMethod::Auto => &self.generic as &dyn Adapter,
                ScrapingMethod::Custom => &self.custom,
                ScrapingMethod::StructuredData => &self.structured,
            }),
            Platform::Booking => Some(&self.booking),
            Platform::Expedia => Some(&self.expedia),
            Platform::Etstur => Some(self.dated.as_ref()),
            Platform::Airbnb | Platform::Agoda | Platform::HotelsCom | Platform::Unknown => None,
        }
    }

    pub fn dated(&self) -> Arc<DatedAdapter> {
        Arc::clone(&self.dated)
    }

    /// Release every adapter's long-lived resources
    pub async fn release_all(&self) {
        self.generic.release().await;
        self.booking.release().await;
        self.expedia.release().await;
        self.custom.release().await;
        self.structured.release().await;
        self.dated.release().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RetryPolicy;
    use crate::testing::ScriptedTransport;

    fn registry() -> AdapterRegistry {
        let settings = AdapterSettings {
            plausibility_floor: 100.0,
            reporting_currency: "USD".to_string(),
        };
        AdapterRegistry::build(&settings, |_| {
            Ok(FetchClient::new(Arc::new(ScriptedTransport::new()), RetryPolicy::default()))
        })
        .unwrap()
    }

    fn kind_for(platform: Platform, method: ScrapingMethod) -> Option<AdapterKind> {
        let mut competitor = Competitor::new("x", "https://x.example", platform);
        competitor.scraping_method = method;
        registry().resolve(&competitor).map(|adapter| adapter.kind())
    }

    #[test]
    fn direct_sites_dispatch_on_scraping_method() {
        assert_eq!(kind_for(Platform::Competitor, ScrapingMethod::Auto), Some(AdapterKind::Generic));
        assert_eq!(kind_for(Platform::Competitor, ScrapingMethod::Custom), Some(AdapterKind::CustomSelector));
        assert_eq!(
            kind_for(Platform::Competitor, ScrapingMethod::StructuredData),
            Some(AdapterKind::StructuredData)
        );
    }

    #[test]
    fn listing_and_dated_platforms() {
        assert_eq!(kind_for(Platform::Booking, ScrapingMethod::Auto), Some(AdapterKind::Generic));
        assert_eq!(kind_for(Platform::Etstur, ScrapingMethod::Auto), Some(AdapterKind::DateParameterized));
    }

    #[test]
    fn unsupported_platforms_are_skipped() {
        assert_eq!(kind_for(Platform::Airbnb, ScrapingMethod::Auto), None);
        assert_eq!(kind_for(Platform::Unknown, ScrapingMethod::Auto), None);
    }
}
