//! Date-parameterized adapter for sources that price a specific stay

use async_trait::async_trait;
use chrono::Utc;
use scraper::Html;
use tracing::{info, warn};

use crate::error::AcquireError;
use crate::extract::PriceExtractor;
use crate::fetch::FetchClient;
use crate::models::{Competitor, DateRange, PriceObservation};
use crate::traits::{AcquireContext, Adapter, AdapterKind, DatedSite};

pub struct DatedAdapter {
    client: FetchClient,
    extractor: PriceExtractor,
    site: DatedSite,
}

impl DatedAdapter {
    pub fn new(client: FetchClient, extractor: PriceExtractor, site: DatedSite) -> Self {
        Self {
            client,
            extractor,
            site,
        }
    }

    pub fn site(&self) -> &DatedSite {
        &self.site
    }

    /// Price one stay.
    ///
    /// Renders headless first and falls back to a static fetch. A page with
    /// no plausible price becomes an unavailable observation that still
    /// carries the requested dates.
    pub async fn acquire_range(
        &self,
        hotel_id: &str,
        label: &str,
        url: &str,
        range: &DateRange,
    ) -> Result<PriceObservation, AcquireError> {
        let full_url = self.site.build_url(url, range);
        info!(
            competitor = %label,
            check_in = %range.check_in_text(),
            check_out = %range.check_out_text(),
            "Fetching dated price"
        );

        let page = self.client.fetch_rendered_first(&full_url).await?;

        let price = {
            let document = Html::parse_document(&page.html);
            self.extractor.extract(&document)
        };

        if price.is_none() {
            warn!(competitor = %label, check_in = %range.check_in_text(), "No availability for stay");
        }

        let mut observation = PriceObservation::new(
            hotel_id,
            self.site.platform,
            &full_url,
            price.unwrap_or(0.0),
            &self.site.currency,
        )
        .with_dates(range);
        observation.adults = Some(self.site.adults);
        observation.children = Some(self.site.children);

        Ok(observation)
    }

    /// Unavailable record for a stay whose attempt failed outright
    pub fn miss(&self, hotel_id: &str, url: &str, range: &DateRange) -> PriceObservation {
        let full_url = self.site.build_url(url, range);
        let mut observation =
            PriceObservation::unavailable(hotel_id, self.site.platform, &full_url, &self.site.currency)
                .with_dates(range);
        observation.adults = Some(self.site.adults);
        observation.children = Some(self.site.children);
        observation
    }
}

#[async_trait]
impl Adapter for DatedAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::DateParameterized
    }

    async fn acquire(
        &self,
        competitor: &Competitor,
        ctx: &AcquireContext,
    ) -> Result<PriceObservation, AcquireError> {
        let range = ctx
            .date_range
            .unwrap_or_else(|| DateRange::default_from(Utc::now().date_naive()));

        self.acquire_range(&ctx.hotel_id, competitor.label(), &competitor.url, &range)
            .await
    }

    async fn release(&self) {
        self.client.release().await;
    }
}
