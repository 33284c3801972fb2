//! Fetch-as-is adapter running the full extraction cascade

use async_trait::async_trait;
use scraper::Html;
use tracing::{info, warn};

use crate::error::{AcquireError, ExtractionError};
use crate::extract::{PriceExtractor, first_number};
use crate::fetch::FetchClient;
use crate::models::{Competitor, PriceObservation};
use crate::traits::{AcquireContext, Adapter, AdapterKind, SiteProfile};

pub struct GenericAdapter {
    client: FetchClient,
    extractor: PriceExtractor,
    profile: SiteProfile,
}

impl GenericAdapter {
    pub fn new(
        client: FetchClient,
        extractor: PriceExtractor,
        profile: SiteProfile,
    ) -> Result<Self, ExtractionError> {
        let preferred: Vec<&str> = profile.price.iter().map(String::as_str).collect();
        let extractor = extractor.with_preferred_selectors(&preferred)?;

        Ok(Self {
            client,
            extractor,
            profile,
        })
    }
}

#[async_trait]
impl Adapter for GenericAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Generic
    }

    async fn acquire(
        &self,
        competitor: &Competitor,
        ctx: &AcquireContext,
    ) -> Result<PriceObservation, AcquireError> {
        let page = self.client.fetch(&competitor.url, &[]).await?;

        // Html is not Send; keep it out of any await
        let (price, rating, reviews) = {
            let document = Html::parse_document(&page.html);
            let price = self.extractor.extract(&document);
            let rating = self
                .profile
                .rating
                .as_deref()
                .and_then(|selector| first_number(&document, selector))
                .filter(|rating| *rating > 0.0);
            let reviews = self
                .profile
                .review_count
                .as_deref()
                .and_then(|selector| first_number(&document, selector))
                .filter(|count| *count > 0.0)
                .map(|count| count as u32);
            (price, rating, reviews)
        };

        let mut observation = PriceObservation::new(
            &ctx.hotel_id,
            competitor.platform,
            &competitor.url,
            price.unwrap_or(0.0),
            &self.profile.currency,
        );
        observation.rating = rating;
        observation.review_count = reviews;

        match price {
            Some(price) => info!(competitor = %competitor.label(), price, "Price found"),
            None => warn!(competitor = %competitor.label(), url = %competitor.url, "No plausible price on page"),
        }

        Ok(observation)
    }

    async fn release(&self) {
        self.client.release().await;
    }
}
