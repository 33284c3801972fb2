//! Adapter that trusts embedded offer metadata only

use async_trait::async_trait;
use scraper::Html;
use tracing::{info, warn};

use crate::error::AcquireError;
use crate::extract::{PriceExtractor, Strategy};
use crate::fetch::FetchClient;
use crate::models::{Competitor, PriceObservation};
use crate::traits::{AcquireContext, Adapter, AdapterKind};

pub struct StructuredDataAdapter {
    client: FetchClient,
    extractor: PriceExtractor,
    currency: String,
}

impl StructuredDataAdapter {
    pub fn new(client: FetchClient, extractor: PriceExtractor, currency: &str) -> Self {
        Self {
            client,
            extractor,
            currency: currency.to_string(),
        }
    }
}

#[async_trait]
impl Adapter for StructuredDataAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::StructuredData
    }

    async fn acquire(
        &self,
        competitor: &Competitor,
        ctx: &AcquireContext,
    ) -> Result<PriceObservation, AcquireError> {
        let page = self.client.fetch(&competitor.url, &[]).await?;

        let price = {
            let document = Html::parse_document(&page.html);
            self.extractor
                .extract_with(&document, &[Strategy::StructuredData])
        };

        match price {
            Some(price) => info!(competitor = %competitor.label(), price, "Price found in structured data"),
            None => warn!(competitor = %competitor.label(), "No offer price in structured data"),
        }

        Ok(PriceObservation::new(
            &ctx.hotel_id,
            competitor.platform,
            &competitor.url,
            price.unwrap_or(0.0),
            &self.currency,
        ))
    }

    async fn release(&self) {
        self.client.release().await;
    }
}
