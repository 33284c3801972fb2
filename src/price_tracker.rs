use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::database::{Bookkeeping, ObservationSink};
use crate::models::{Competitor, CompetitorResult, Hotel, PriceObservation, ScrapeSummary, SeasonRequest};
use crate::scrapers::{AdapterRegistry, SeasonDriver, SeasonPacing};
use crate::traits::{AcquireContext, AdapterKind};

/// When a competitor's `last_scraped_*` fields are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookkeepingPolicy {
    /// Only after a positive price was found
    #[default]
    OnSuccess,
    /// After every attempt; the stored price only moves on success
    OnAttempt,
}

impl FromStr for BookkeepingPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on-success" | "success" => Ok(Self::OnSuccess),
            "on-attempt" | "attempt" => Ok(Self::OnAttempt),
            other => Err(anyhow!("Unknown bookkeeping policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerPolicy {
    pub bookkeeping: BookkeepingPolicy,
    /// Persist zero-price observations as well
    pub retain_misses: bool,
}

/// Outcome of one scheduled pass over every hotel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub hotels: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hotels, {}/{} competitors priced, {} failed",
            self.hotels, self.succeeded, self.attempted, self.failed
        )
    }
}

#[derive(Clone)]
pub struct PriceTracker {
    adapters: Arc<AdapterRegistry>,
    sink: Arc<dyn ObservationSink>,
    policy: TrackerPolicy,
    pacing: SeasonPacing,
}

impl PriceTracker {
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        sink: Arc<dyn ObservationSink>,
        policy: TrackerPolicy,
        pacing: SeasonPacing,
    ) -> Self {
        Self {
            adapters,
            sink,
            policy,
            pacing,
        }
    }

    /// One scheduled pass: every competitor of every hotel, in order.
    ///
    /// Only a failure to list hotels fails the tick; everything below that
    /// is contained per competitor.
    pub async fn run_tick(&self) -> Result<TickReport> {
        let hotels = self.sink.list_hotels().await.context("Failed to load hotels")?;
        info!(hotels = hotels.len(), "Starting price check");

        let mut report = TickReport {
            hotels: hotels.len(),
            ..TickReport::default()
        };

        for hotel in &hotels {
            let summary = self.acquire_hotel(hotel).await;
            report.attempted += summary.attempted;
            report.succeeded += summary.succeeded;
            report.failed += summary.results.iter().filter(|r| r.error.is_some()).count();
        }

        if report.succeeded > 0 {
            info!("Price check finished: {}", report);
        } else {
            warn!("Price check finished without any prices: {}", report);
        }

        Ok(report)
    }

    /// Scrape every competitor of one hotel right now
    pub async fn scrape_hotel(&self, hotel_id: &str) -> Result<ScrapeSummary> {
        let hotel = self.load_hotel(hotel_id).await?;
        Ok(self.acquire_hotel(&hotel).await)
    }

    /// Sweep a season for one date-parameterized competitor of a hotel.
    ///
    /// Without `competitor_url` the hotel's first date-parameterized
    /// competitor is used.
    pub async fn scrape_season(
        &self,
        hotel_id: &str,
        competitor_url: Option<&str>,
        request: &SeasonRequest,
    ) -> Result<ScrapeSummary> {
        let hotel = self.load_hotel(hotel_id).await?;
        let competitor = self.season_competitor(&hotel, competitor_url)?;

        let driver = SeasonDriver::new(self.adapters.dated(), self.pacing);
        let observations = driver
            .scrape_season(&hotel.id, competitor.label(), &competitor.url, request)
            .await?;

        let mut summary = ScrapeSummary {
            hotel_id: hotel.id.clone(),
            attempted: observations.len(),
            ..ScrapeSummary::default()
        };

        let mut last_price = None;
        for observation in observations {
            if observation.is_available() {
                summary.succeeded += 1;
                last_price = Some(observation.price);
            }

            match self.persist(&observation).await {
                Ok(()) => summary
                    .results
                    .push(CompetitorResult::observed(competitor.label(), observation.clone())),
                Err(e) => {
                    error!(competitor = %competitor.label(), error = %e, "Failed to store observation");
                    summary
                        .results
                        .push(CompetitorResult::failed(competitor.label(), format!("{e:#}")));
                }
            }
            summary.observations.push(observation);
        }

        if last_price.is_some() || self.policy.bookkeeping == BookkeepingPolicy::OnAttempt {
            self.mark_scraped(&hotel.id, competitor, last_price).await;
        }

        info!(
            hotel = %hotel.label(),
            competitor = %competitor.label(),
            priced = summary.succeeded,
            total = summary.attempted,
            "Season scrape stored"
        );

        Ok(summary)
    }

    /// Shut down every adapter's browser
    pub async fn release(&self) {
        self.adapters.release_all().await;
    }

    async fn load_hotel(&self, hotel_id: &str) -> Result<Hotel> {
        self.sink
            .get_hotel(hotel_id)
            .await
            .with_context(|| format!("Failed to load hotel {hotel_id}"))?
            .ok_or_else(|| anyhow!("Hotel not found: {hotel_id}"))
    }

    fn season_competitor<'a>(&self, hotel: &'a Hotel, url: Option<&str>) -> Result<&'a Competitor> {
        let dated = |c: &&Competitor| {
            self.adapters
                .resolve(c)
                .is_some_and(|adapter| adapter.kind() == AdapterKind::DateParameterized)
        };

        match url {
            Some(url) => {
                let Some(competitor) = hotel.competitors.iter().find(|c| c.url == url) else {
                    bail!("Hotel {} has no competitor with URL {url}", hotel.id);
                };
                if !dated(&competitor) {
                    bail!("{} does not support date-parameterized requests", competitor.label());
                }
                Ok(competitor)
            }
            None => hotel
                .competitors
                .iter()
                .find(dated)
                .ok_or_else(|| anyhow!("Hotel {} has no date-parameterized competitor", hotel.id)),
        }
    }

    async fn acquire_hotel(&self, hotel: &Hotel) -> ScrapeSummary {
        let mut summary = ScrapeSummary {
            hotel_id: hotel.id.clone(),
            ..ScrapeSummary::default()
        };

        for competitor in &hotel.competitors {
            if competitor.url.trim().is_empty() {
                debug!(hotel = %hotel.label(), competitor = %competitor.label(), "Skipping competitor without URL");
                continue;
            }

            let Some(adapter) = self.adapters.resolve(competitor) else {
                warn!(
                    hotel = %hotel.label(),
                    competitor = %competitor.label(),
                    platform = %competitor.platform,
                    "Unsupported platform, skipping"
                );
                continue;
            };

            summary.attempted += 1;
            let ctx = AcquireContext::for_hotel(&hotel.id);

            let observation = match adapter.acquire(competitor, &ctx).await {
                Ok(observation) => observation,
                Err(e) => {
                    error!(competitor = %competitor.label(), error = %e, "Scrape failed");
                    if self.policy.bookkeeping == BookkeepingPolicy::OnAttempt {
                        self.mark_scraped(&hotel.id, competitor, None).await;
                    }
                    summary.results.push(CompetitorResult::failed(competitor.label(), &e));
                    continue;
                }
            };

            if observation.is_available() {
                info!(competitor = %competitor.label(), price = observation.price, currency = %observation.currency, "Price found");
            } else {
                warn!(competitor = %competitor.label(), "No price found");
            }

            if let Err(e) = self.persist(&observation).await {
                error!(competitor = %competitor.label(), error = %e, "Failed to store observation");
                summary
                    .results
                    .push(CompetitorResult::failed(competitor.label(), format!("{e:#}")));
                continue;
            }

            if observation.is_available() {
                summary.succeeded += 1;
                self.mark_scraped(&hotel.id, competitor, Some(observation.price)).await;
            } else if self.policy.bookkeeping == BookkeepingPolicy::OnAttempt {
                self.mark_scraped(&hotel.id, competitor, None).await;
            }

            summary
                .results
                .push(CompetitorResult::observed(competitor.label(), observation.clone()));
            summary.observations.push(observation);
        }

        summary
    }

    /// Append the observation unless it is a miss that should be dropped
    async fn persist(&self, observation: &PriceObservation) -> Result<()> {
        if observation.is_available() || self.policy.retain_misses {
            self.sink.insert_observation(observation).await?;
        }
        Ok(())
    }

    async fn mark_scraped(&self, hotel_id: &str, competitor: &Competitor, price: Option<f64>) {
        let update = Bookkeeping {
            last_scraped_price: price.filter(|p| *p > 0.0),
            last_scraped_at: Utc::now(),
        };

        if let Err(e) = self
            .sink
            .update_competitor_bookkeeping(hotel_id, &competitor.url, &update)
            .await
        {
            error!(competitor = %competitor.label(), error = %e, "Failed to update bookkeeping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::fetch::{FetchClient, RetryPolicy};
    use crate::models::{Platform, ScrapingMethod};
    use crate::scrapers::AdapterSettings;
    use crate::testing::ScriptedTransport;
    use chrono::NaiveDate;
    use std::time::Duration;

    const PRICED: &str = r#"<span class="price">$1,250.00</span>"#;

    fn registry(transport: Arc<ScriptedTransport>) -> Arc<AdapterRegistry> {
        let settings = AdapterSettings {
            plausibility_floor: 100.0,
            reporting_currency: "USD".to_string(),
        };
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        };
        let registry =
            AdapterRegistry::build(&settings, |_| Ok(FetchClient::new(transport.clone(), policy))).unwrap();
        Arc::new(registry)
    }

    fn quick_pacing() -> SeasonPacing {
        SeasonPacing {
            pause: Duration::ZERO,
            long_pause: Duration::ZERO,
            long_every: 10,
        }
    }

    async fn setup(html: &str, competitors: Vec<Competitor>, policy: TrackerPolicy) -> (PriceTracker, Database) {
        let db = Database::in_memory().await.unwrap();
        db.save_hotel(&Hotel {
            id: "h1".to_string(),
            name: Some("Blue Bay".to_string()),
            city: None,
            competitors,
        })
        .await
        .unwrap();

        let transport = Arc::new(ScriptedTransport::serving(html));
        let tracker = PriceTracker::new(registry(transport), Arc::new(db.clone()), policy, quick_pacing());
        (tracker, db)
    }

    fn seaside() -> Competitor {
        Competitor::new("Seaside", "https://seaside.example", Platform::Competitor)
    }

    #[tokio::test]
    async fn repeated_ticks_append_and_keep_the_same_price() {
        let (tracker, db) = setup(PRICED, vec![seaside()], TrackerPolicy::default()).await;

        let first = tracker.run_tick().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        tracker.run_tick().await.unwrap();

        assert_eq!(first, TickReport { hotels: 1, attempted: 1, succeeded: 1, failed: 0 });

        let rows = db.observations_for("h1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_ne!(rows[0].scraped_at, rows[1].scraped_at);
        assert_ne!(rows[0].id, rows[1].id);

        let hotel = db.get_hotel("h1").await.unwrap().unwrap();
        assert_eq!(hotel.competitors[0].last_scraped_price, Some(1250.0));
    }

    #[tokio::test]
    async fn skips_unsupported_and_blank_competitors() {
        let blank = Competitor::new("Blank", "  ", Platform::Competitor);
        let airbnb = Competitor::new("Loft", "https://airbnb.example/rooms/1", Platform::Airbnb);
        let odd = Competitor::new("Odd", "https://odd.example", Platform::Unknown);
        let (tracker, _db) = setup(PRICED, vec![blank, airbnb, odd, seaside()], TrackerPolicy::default()).await;

        let summary = tracker.scrape_hotel("h1").await.unwrap();

        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.results[0].competitor_name, "Seaside");
        assert_eq!(summary.observations[0].price, 1250.0);
        assert_eq!(summary.observations[0].currency, "USD");
    }

    #[tokio::test]
    async fn failures_are_reported_per_competitor() {
        let mut broken = Competitor::new("Broken", "https://broken.example", Platform::Competitor);
        broken.scraping_method = ScrapingMethod::Custom;
        let (tracker, db) = setup(PRICED, vec![broken, seaside()], TrackerPolicy::default()).await;

        let summary = tracker.scrape_hotel("h1").await.unwrap();

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert!(summary.results[0].error.is_some());
        assert!(summary.results[1].error.is_none());

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["results"][0]["competitorName"], "Broken");
        assert!(json["results"][0]["error"].is_string());
        assert_eq!(json["results"][1]["price"], 1250.0);

        // Default policy leaves a failed competitor untouched
        let hotel = db.get_hotel("h1").await.unwrap().unwrap();
        assert!(hotel.competitors[0].last_scraped_at.is_none());
    }

    #[tokio::test]
    async fn misses_are_dropped_unless_retained() {
        let (tracker, db) = setup("<p>Sold out</p>", vec![seaside()], TrackerPolicy::default()).await;
        let summary = tracker.scrape_hotel("h1").await.unwrap();
        assert_eq!(summary.succeeded, 0);
        assert!(!summary.observations[0].availability);
        assert!(db.observations_for("h1").await.unwrap().is_empty());

        let retaining = TrackerPolicy {
            retain_misses: true,
            ..TrackerPolicy::default()
        };
        let (tracker, db) = setup("<p>Sold out</p>", vec![seaside()], retaining).await;
        tracker.scrape_hotel("h1").await.unwrap();
        assert_eq!(db.observations_for("h1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn on_attempt_policy_marks_misses_without_touching_price() {
        let policy = TrackerPolicy {
            bookkeeping: BookkeepingPolicy::OnAttempt,
            retain_misses: false,
        };
        let (tracker, db) = setup("<p>Sold out</p>", vec![seaside()], policy).await;

        tracker.run_tick().await.unwrap();

        let competitor = &db.get_hotel("h1").await.unwrap().unwrap().competitors[0];
        assert!(competitor.last_scraped_at.is_some());
        assert_eq!(competitor.last_scraped_price, None);
    }

    #[tokio::test]
    async fn unknown_hotel_is_an_error() {
        let (tracker, _db) = setup(PRICED, vec![seaside()], TrackerPolicy::default()).await;
        assert!(tracker.scrape_hotel("nope").await.is_err());
    }

    #[tokio::test]
    async fn season_scrape_stores_every_stay() {
        let ets = Competitor::new("Seaside ETS", "https://www.etstur.com/Seaside", Platform::Etstur);
        let (tracker, db) = setup(
            r#"<span class="price">24.500 TL</span>"#,
            vec![seaside(), ets],
            TrackerPolicy::default(),
        )
        .await;

        let request = SeasonRequest {
            year: 2026,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            nights: 7,
            interval_days: 7,
        };
        let summary = tracker.scrape_season("h1", None, &request).await.unwrap();

        assert_eq!(summary.attempted, 9);
        assert_eq!(summary.succeeded, 9);
        assert!(summary.observations.iter().all(|o| o.currency == "TRY"));
        assert_eq!(db.observations_for("h1").await.unwrap().len(), 9);

        let hotel = db.get_hotel("h1").await.unwrap().unwrap();
        assert_eq!(hotel.competitors[1].last_scraped_price, Some(24500.0));
    }

    #[tokio::test]
    async fn season_scrape_needs_a_dated_competitor() {
        let (tracker, _db) = setup(PRICED, vec![seaside()], TrackerPolicy::default()).await;
        let request = SeasonRequest::full_year(2026).unwrap();

        assert!(tracker.scrape_season("h1", None, &request).await.is_err());
        assert!(
            tracker
                .scrape_season("h1", Some("https://seaside.example"), &request)
                .await
                .is_err()
        );
    }
}
