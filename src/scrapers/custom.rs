//! Operator-supplied selector adapter

use async_trait::async_trait;
use scraper::Html;
use tracing::{error, info};

use crate::error::{AcquireError, ExtractionError};
use crate::extract::PriceExtractor;
use crate::fetch::FetchClient;
use crate::models::{Competitor, PriceObservation};
use crate::traits::{AcquireContext, Adapter, AdapterKind};

/// Reads the price from exactly one selector.
///
/// The operator asserted the selector exists, so a miss is an
/// `ExtractionError` rather than an unavailable observation.
pub struct CustomSelectorAdapter {
    client: FetchClient,
    extractor: PriceExtractor,
    currency: String,
}

impl CustomSelectorAdapter {
    pub fn new(client: FetchClient, extractor: PriceExtractor, currency: &str) -> Self {
        Self {
            client,
            extractor,
            currency: currency.to_string(),
        }
    }
}

#[async_trait]
impl Adapter for CustomSelectorAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::CustomSelector
    }

    async fn acquire(
        &self,
        competitor: &Competitor,
        ctx: &AcquireContext,
    ) -> Result<PriceObservation, AcquireError> {
        let selector = competitor
            .custom_selector
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ExtractionError::InvalidSelector {
                selector: String::new(),
                reason: "no custom selector configured".to_string(),
            })?;

        let page = self.client.fetch(&competitor.url, &[]).await?;

        let price = {
            let document = Html::parse_document(&page.html);
            self.extractor.extract_custom(&document, selector)
        }
        .inspect_err(|e| error!(competitor = %competitor.label(), error = %e, "Custom selector failed"))?;

        info!(competitor = %competitor.label(), price, selector, "Price found with custom selector");

        Ok(PriceObservation::new(
            &ctx.hotel_id,
            competitor.platform,
            &competitor.url,
            price,
            &self.currency,
        ))
    }

    async fn release(&self) {
        self.client.release().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RetryPolicy;
    use crate::models::{Platform, ScrapingMethod};
    use crate::testing::ScriptedTransport;
    use std::sync::Arc;

    fn adapter(html: &str) -> CustomSelectorAdapter {
        let client = FetchClient::new(Arc::new(ScriptedTransport::serving(html)), RetryPolicy::default());
        CustomSelectorAdapter::new(client, PriceExtractor::default(), "USD")
    }

    fn competitor(selector: Option<&str>) -> Competitor {
        let mut competitor = Competitor::new("Harbour Inn", "https://harbour.example", Platform::Competitor);
        competitor.scraping_method = ScrapingMethod::Custom;
        competitor.custom_selector = selector.map(str::to_string);
        competitor
    }

    #[tokio::test]
    async fn reads_only_the_configured_selector() {
        let adapter = adapter(r#"<span class="price">$999.00</span><b id="best-rate">$89.00</b>"#);

        let obs = adapter
            .acquire(&competitor(Some("#best-rate")), &AcquireContext::for_hotel("h1"))
            .await
            .unwrap();

        // No plausibility floor: the operator picked this element
        assert_eq!(obs.price, 89.0);
        assert!(obs.availability);
    }

    #[tokio::test]
    async fn missing_selector_match_is_an_extraction_error() {
        let adapter = adapter(r#"<span class="price">$999.00</span>"#);

        let err = adapter
            .acquire(&competitor(Some("#best-rate")), &AcquireContext::for_hotel("h1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AcquireError::Extraction(ExtractionError::SelectorNotFound(_))
        ));
    }

    #[tokio::test]
    async fn unconfigured_selector_fails_before_fetching() {
        let adapter = adapter("<html></html>");

        let err = adapter
            .acquire(&competitor(None), &AcquireContext::for_hotel("h1"))
            .await
            .unwrap_err();

        assert!(matches!(err, AcquireError::Extraction(ExtractionError::InvalidSelector { .. })));
    }
}
