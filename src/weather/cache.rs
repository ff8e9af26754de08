//! Process-wide weather cache keyed by (cell, hour).
//!
//! Cells are lat/lon rounded to 0.01°. Reads are lock-free dashmap shard
//! lookups; writes serialize per key inside the shard lock. Staleness is
//! checked on read so an expired entry behaves exactly like a miss.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::config::defaults::WEATHER_CELL_DEGREES;
use crate::types::{GeoPoint, WeatherObservation};

/// Cache key: cell coordinates in centi-degrees plus the UTC hour bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub cell_lat: i32,
    pub cell_lon: i32,
    pub hour_bucket: i64,
    pub forecast: bool,
}

impl CellKey {
    pub fn new(location: GeoPoint, observed_at_micros: i64, forecast: bool) -> Self {
        let scale = 1.0 / WEATHER_CELL_DEGREES;
        Self {
            cell_lat: (location.lat * scale).round() as i32,
            cell_lon: (location.lon * scale).round() as i32,
            hour_bucket: observed_at_micros / 3_600_000_000,
            forecast,
        }
    }
}

struct Entry {
    observations: Vec<WeatherObservation>,
    stored_at: Instant,
}

/// Whether a read was served from cache. Surfaced as the `X-Cache` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

impl CacheOutcome {
    pub fn header_value(self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
        }
    }
}

/// See module docs.
pub struct WeatherCache {
    entries: DashMap<CellKey, Entry>,
    current_ttl: Duration,
    forecast_ttl: Duration,
}

impl WeatherCache {
    pub fn new(current_ttl: Duration, forecast_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            current_ttl,
            forecast_ttl,
        }
    }

    fn ttl_for(&self, key: &CellKey) -> Duration {
        if key.forecast {
            self.forecast_ttl
        } else {
            self.current_ttl
        }
    }

    /// Fresh cached observations for a key, or None on miss/stale.
    pub fn get(&self, key: &CellKey) -> Option<Vec<WeatherObservation>> {
        let entry = self.entries.get(key)?;
        if entry.stored_at.elapsed() > self.ttl_for(key) {
            return None;
        }
        Some(entry.observations.clone())
    }

    pub fn put(&self, key: CellKey, observations: Vec<WeatherObservation>) {
        self.entries.insert(
            key,
            Entry {
                observations,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries. Called opportunistically by the pipeline's
    /// periodic cycle.
    pub fn evict_stale(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|key, entry| entry.stored_at.elapsed() <= self.ttl_for(key));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
