use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, migrate::MigrateDatabase};
use std::str::FromStr;
use tracing::info;

use crate::models::{Competitor, Hotel, Platform, PriceObservation, ScrapingMethod};

/// Bookkeeping written back onto a competitor after an attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bookkeeping {
    /// `None` leaves the stored price untouched
    pub last_scraped_price: Option<f64>,
    pub last_scraped_at: DateTime<Utc>,
}

/// Where the engine reads hotels from and writes observations to
#[async_trait]
pub trait ObservationSink: Send + Sync {
    /// Append one observation; returns its id
    async fn insert_observation(&self, observation: &PriceObservation) -> Result<String>;

    /// Update the single competitor of `hotel_id` whose URL is `competitor_url`
    async fn update_competitor_bookkeeping(
        &self,
        hotel_id: &str,
        competitor_url: &str,
        update: &Bookkeeping,
    ) -> Result<()>;

    async fn list_hotels(&self) -> Result<Vec<Hotel>>;

    async fn get_hotel(&self, id: &str) -> Result<Option<Hotel>>;
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Create database file if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating database file");
            Sqlite::create_database(db_url).await?;
        }

        let options = SqliteConnectOptions::from_str(db_url)?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to {db_url}"))?;

        Self::migrate(pool).await
    }

    /// Private in-memory database, for tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // One connection that never expires, or the data disappears with it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(Self { pool })
    }

    /// Replace a hotel and its competitor list
    pub async fn save_hotel(&self, hotel: &Hotel) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO hotels (id, name, city) VALUES (?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET name = excluded.name, city = excluded.city
            ",
        )
        .bind(&hotel.id)
        .bind(&hotel.name)
        .bind(&hotel.city)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM competitors WHERE hotel_id = ?")
            .bind(&hotel.id)
            .execute(&mut *tx)
            .await?;

        for (position, competitor) in hotel.competitors.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO competitors (
                    hotel_id, position, name, url, platform, scraping_method,
                    custom_selector, last_scraped_at, last_scraped_price
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&hotel.id)
            .bind(position as i64)
            .bind(&competitor.name)
            .bind(&competitor.url)
            .bind(competitor.platform.as_str())
            .bind(competitor.scraping_method.as_str())
            .bind(&competitor.custom_selector)
            .bind(competitor.last_scraped_at)
            .bind(competitor.last_scraped_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Observations of one hotel, oldest first
    pub async fn observations_for(&self, hotel_id: &str) -> Result<Vec<PriceObservation>> {
        let rows = sqlx::query(
            r"
            SELECT id, hotel_id, platform, source_url, price, currency, check_in, check_out,
                   adults, children, room_type, availability, rating, review_count, scraped_at
            FROM price_observations
            WHERE hotel_id = ?
            ORDER BY scraped_at ASC
            ",
        )
        .bind(hotel_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PriceObservation {
                    id: row.try_get("id")?,
                    hotel_id: row.try_get("hotel_id")?,
                    platform: Platform::from(row.try_get::<String, _>("platform")?.as_str()),
                    source_url: row.try_get("source_url")?,
                    price: row.try_get("price")?,
                    currency: row.try_get("currency")?,
                    check_in: row.try_get::<Option<NaiveDate>, _>("check_in")?,
                    check_out: row.try_get::<Option<NaiveDate>, _>("check_out")?,
                    adults: row.try_get::<Option<i64>, _>("adults")?.map(|v| v as u32),
                    children: row.try_get::<Option<i64>, _>("children")?.map(|v| v as u32),
                    room_type: row.try_get("room_type")?,
                    availability: row.try_get("availability")?,
                    rating: row.try_get("rating")?,
                    review_count: row.try_get::<Option<i64>, _>("review_count")?.map(|v| v as u32),
                    scraped_at: row.try_get("scraped_at")?,
                })
            })
            .collect()
    }

    async fn competitors_for(&self, hotel_id: &str) -> Result<Vec<Competitor>> {
        let rows = sqlx::query(
            r"
            SELECT name, url, platform, scraping_method, custom_selector,
                   last_scraped_at, last_scraped_price
            FROM competitors
            WHERE hotel_id = ?
            ORDER BY position ASC
            ",
        )
        .bind(hotel_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Competitor {
                    name: row.try_get("name")?,
                    url: row.try_get("url")?,
                    platform: Platform::from(row.try_get::<String, _>("platform")?.as_str()),
                    scraping_method: ScrapingMethod::from(
                        row.try_get::<String, _>("scraping_method")?.as_str(),
                    ),
                    custom_selector: row.try_get("custom_selector")?,
                    last_scraped_at: row.try_get("last_scraped_at")?,
                    last_scraped_price: row.try_get("last_scraped_price")?,
                })
            })
            .collect()
    }

    /// Attach competitors to a decoded hotel row
    async fn hydrate(&self, (id, name, city): HotelRow) -> Result<Hotel> {
        let competitors = self.competitors_for(&id).await?;

        Ok(Hotel {
            id,
            name,
            city,
            competitors,
        })
    }
}

type HotelRow = (String, Option<String>, Option<String>);

fn hotel_row(row: &SqliteRow) -> Result<HotelRow> {
    Ok((row.try_get("id")?, row.try_get("name")?, row.try_get("city")?))
}

#[async_trait]
impl ObservationSink for Database {
    async fn insert_observation(&self, observation: &PriceObservation) -> Result<String> {
        sqlx::query(
            r"
            INSERT INTO price_observations (
                id, hotel_id, platform, source_url, price, currency, check_in, check_out,
                adults, children, room_type, availability, rating, review_count, scraped_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&observation.id)
        .bind(&observation.hotel_id)
        .bind(observation.platform.as_str())
        .bind(&observation.source_url)
        .bind(observation.price)
        .bind(&observation.currency)
        .bind(observation.check_in)
        .bind(observation.check_out)
        .bind(observation.adults.map(i64::from))
        .bind(observation.children.map(i64::from))
        .bind(&observation.room_type)
        .bind(observation.availability)
        .bind(observation.rating)
        .bind(observation.review_count.map(i64::from))
        .bind(observation.scraped_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert price observation")?;

        Ok(observation.id.clone())
    }

    async fn update_competitor_bookkeeping(
        &self,
        hotel_id: &str,
        competitor_url: &str,
        update: &Bookkeeping,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE competitors
            SET last_scraped_price = COALESCE(?, last_scraped_price),
                last_scraped_at = ?
            WHERE hotel_id = ? AND url = ?
            ",
        )
        .bind(update.last_scraped_price)
        .bind(update.last_scraped_at)
        .bind(hotel_id)
        .bind(competitor_url)
        .execute(&self.pool)
        .await
        .context("Failed to update competitor bookkeeping")?;

        Ok(())
    }

    async fn list_hotels(&self) -> Result<Vec<Hotel>> {
        let rows = sqlx::query("SELECT id, name, city FROM hotels ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(hotel_row)
            .collect::<Result<Vec<_>>>()?;

        let mut hotels = Vec::with_capacity(rows.len());
        for row in rows {
            hotels.push(self.hydrate(row).await?);
        }
        Ok(hotels)
    }

    async fn get_hotel(&self, id: &str) -> Result<Option<Hotel>> {
        let row = sqlx::query("SELECT id, name, city FROM hotels WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(hotel_row)
            .transpose()?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }
}
