//! In-memory catalog of radio stations

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::error::{RegistryError, RegistryResult, ValidationError};
use crate::station::{Station, StationDraft};

/// Mandatory fields checked by [`StationRegistry::validate`], in check order
const REQUIRED_FIELDS: [&str; 3] = ["id", "url", "name"];

/// Validated map of station id to station.
///
/// Stations can be added but never replaced or removed.
#[derive(Debug, Default)]
pub struct StationRegistry {
    stations: RwLock<HashMap<String, Station>>,
}

impl StationRegistry {
    /// Create a registry from seed data. Any invalid seed fails construction.
    pub fn new<I, S>(seed: I) -> RegistryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<StationDraft>,
    {
        let mut stations = HashMap::new();
        for draft in seed {
            let station = Self::checked(draft.into())?;
            if let Some(previous) = stations.insert(station.id().to_string(), station) {
                warn!(station = previous.id(), "Duplicate station in seed data, keeping the last one");
            }
        }
        debug!(count = stations.len(), "Station registry seeded");

        Ok(Self {
            stations: RwLock::new(stations),
        })
    }

    /// Check that every mandatory field is present and not empty.
    ///
    /// Reports the first missing field in `id, url, name` order.
    pub fn validate(station: &StationDraft) -> Result<(), ValidationError> {
        match REQUIRED_FIELDS
            .into_iter()
            .find(|field| station.field(field).is_none())
        {
            Some(field) => Err(ValidationError::MissingField(field)),
            None => Ok(()),
        }
    }

    /// Check if a station with this id exists
    pub async fn has(&self, id: &str) -> bool {
        self.stations.read().await.contains_key(id)
    }

    /// Add a new station. An existing station with the same id is left untouched.
    #[instrument(skip(self, station))]
    pub async fn add(&self, station: impl Into<StationDraft>) -> RegistryResult<()> {
        let station = Self::checked(station.into())?;

        let mut stations = self.stations.write().await;
        if stations.contains_key(station.id()) {
            return Err(RegistryError::AlreadyExists(station.id().to_string()));
        }
        debug!(station = station.id(), "Station added");
        stations.insert(station.id().to_string(), station);
        Ok(())
    }

    /// Look a station up by id
    pub async fn get(&self, id: &str) -> Option<Station> {
        self.stations.read().await.get(id).cloned()
    }

    /// Snapshot of every station, in no particular order
    pub async fn all(&self) -> Vec<Station> {
        self.stations.read().await.values().cloned().collect()
    }

    fn checked(draft: StationDraft) -> RegistryResult<Station> {
        Self::validate(&draft)?;
        Ok(Station::try_from(draft)?)
    }
}
