//! Season sweeps: one dated request per interval across a date range

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::AcquireError;
use crate::models::{PriceObservation, SeasonRequest};
use crate::scrapers::DatedAdapter;
use crate::traits::Adapter;

/// Pauses between sweep attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonPacing {
    pub pause: Duration,
    pub long_pause: Duration,
    /// Every n-th attempt is followed by `long_pause` instead of `pause`
    pub long_every: u32,
}

impl Default for SeasonPacing {
    fn default() -> Self {
        Self {
            pause: Duration::from_secs(3),
            long_pause: Duration::from_secs(10),
            long_every: 10,
        }
    }
}

impl SeasonPacing {
    pub fn pause_after(&self, attempt: u32) -> Duration {
        if self.long_every > 0 && attempt % self.long_every == 0 {
            self.long_pause
        } else {
            self.pause
        }
    }
}

pub struct SeasonDriver {
    adapter: Arc<DatedAdapter>,
    pacing: SeasonPacing,
}

impl SeasonDriver {
    pub fn new(adapter: Arc<DatedAdapter>, pacing: SeasonPacing) -> Self {
        Self { adapter, pacing }
    }

    /// Request every stay of the season and collect the results.
    ///
    /// Failed attempts turn into unavailable observations, so the output has
    /// one entry per interval step. The adapter's headless browser is
    /// released once the sweep is over.
    pub async fn scrape_season(
        &self,
        hotel_id: &str,
        label: &str,
        url: &str,
        request: &SeasonRequest,
    ) -> Result<Vec<PriceObservation>, AcquireError> {
        request.validate()?;
        let ranges = request.ranges();
        let total = ranges.len();

        info!(
            competitor = %label,
            year = request.year,
            nights = request.nights,
            interval_days = request.interval_days,
            total,
            "Starting season sweep"
        );

        let mut results = Vec::with_capacity(total);
        for (index, range) in ranges.iter().enumerate() {
            let attempt = index as u32 + 1;

            let observation = match self.adapter.acquire_range(hotel_id, label, url, range).await {
                Ok(observation) => {
                    if observation.is_available() {
                        info!(attempt, total, check_in = %range.check_in_text(), price = observation.price, "Stay priced");
                    } else {
                        warn!(attempt, total, check_in = %range.check_in_text(), "No availability");
                    }
                    observation
                }
                Err(e) => {
                    error!(attempt, total, check_in = %range.check_in_text(), error = %e, "Stay attempt failed");
                    self.adapter.miss(hotel_id, url, range)
                }
            };
            results.push(observation);

            let pause = self.pacing.pause_after(attempt);
            if pause == self.pacing.long_pause && pause != self.pacing.pause {
                info!(attempt, seconds = pause.as_secs(), "Taking a longer break");
            }
            tokio::time::sleep(pause).await;
        }

        self.adapter.release().await;

        let priced = results.iter().filter(|o| o.is_available()).count();
        info!(competitor = %label, priced, total = results.len(), "Season sweep finished");

        Ok(results)
    }
}
