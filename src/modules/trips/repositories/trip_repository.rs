use crate::core::{AppError, Result};
use crate::modules::trips::models::{Trip, TripStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, MySqlPool};
use std::str::FromStr;

/// Read access to trips plus creation for scheduling collaborators
#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn create(&self, trip: &Trip) -> Result<Trip>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Trip>>;
}

pub(crate) const TRIP_COLUMNS: &str = "id, trip_code, fare, total_seats, available_seats, \
     booked_seats, status, scheduled_departure, created_at, updated_at";

#[derive(Debug, FromRow)]
pub(crate) struct TripRow {
    id: String,
    trip_code: String,
    fare: Decimal,
    total_seats: u32,
    available_seats: u32,
    booked_seats: u32,
    status: String,
    scheduled_departure: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = AppError;

    fn try_from(row: TripRow) -> Result<Self> {
        Ok(Trip {
            status: TripStatus::from_str(&row.status).map_err(AppError::Internal)?,
            id: row.id,
            trip_code: row.trip_code,
            fare: row.fare,
            total_seats: row.total_seats,
            available_seats: row.available_seats,
            booked_seats: row.booked_seats,
            scheduled_departure: row.scheduled_departure,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// MySQL-backed trip repository
pub struct MySqlTripRepository {
    pool: MySqlPool,
}

impl MySqlTripRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TripRepository for MySqlTripRepository {
    async fn create(&self, trip: &Trip) -> Result<Trip> {
        sqlx::query(
            r#"
            INSERT INTO trips (
                id, trip_code, fare, total_seats, available_seats,
                booked_seats, status, scheduled_departure, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trip.id)
        .bind(&trip.trip_code)
        .bind(trip.fare)
        .bind(trip.total_seats)
        .bind(trip.available_seats)
        .bind(trip.booked_seats)
        .bind(trip.status.to_string())
        .bind(trip.scheduled_departure)
        .bind(trip.created_at)
        .bind(trip.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create trip: {}", e)))?;

        self.find_by_id(&trip.id)
            .await?
            .ok_or_else(|| AppError::internal("Trip was created but not found"))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE id = ?",
            TRIP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Trip::try_from).transpose()
    }
}
