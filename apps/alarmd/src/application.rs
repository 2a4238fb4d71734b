//! Alarm daemon wiring
//!
//! Connects the alarm clock to the radio: when the clock rings, the station
//! stored under `alarm_station` is faded in unless something is already
//! playing. Alarm settings survive restarts through the settings store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use reveille_mpd_client::MpdPool;
use reveille_radio::{FadeOutcome, Radio, StationRegistry};
use reveille_settings_client::SettingsStore;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::alarm_clock::{AlarmClock, AlarmEvent, AlarmTime};
use crate::config::{Config, DEFAULT_FADE_DURATION_MS};
use crate::error::{AppError, AppResult};

/// Setting holding the alarm time of day
pub const ALARM_TIME_KEY: &str = "alarm_time";
/// Setting holding whether the alarm is armed
pub const ALARM_ENABLED_KEY: &str = "alarm_enabled";
/// Setting holding the id of the station played by the alarm
pub const ALARM_STATION_KEY: &str = "alarm_station";

/// Alarm settings as submitted by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmSettings {
    pub time: AlarmTime,
    pub is_enabled: bool,
    pub selected_station: String,
}

impl AlarmSettings {
    /// Check the time and the station before anything is applied
    pub fn validate(&self) -> AppResult<()> {
        self.time.validate()?;
        if self.selected_station.is_empty() {
            return Err(AppError::invalid_settings(
                "\"selectedStation\" must be a non empty string.",
            ));
        }
        Ok(())
    }
}

/// What happened when the alarm rang
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingOutcome {
    /// Something was already playing, nothing was touched
    AlreadyPlaying,
    /// No station is stored or the stored one is unknown
    NoStation,
    /// The alarm station was faded in
    Faded(FadeOutcome),
}

/// The alarm daemon
pub struct Application {
    radio: Radio,
    registry: StationRegistry,
    settings: SettingsStore,
    alarm: AlarmClock,
    fade_duration: Duration,
    running: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Application {
    /// Assemble the daemon from its parts
    pub fn new(
        radio: Radio,
        registry: StationRegistry,
        settings: SettingsStore,
        alarm: AlarmClock,
    ) -> Self {
        Self {
            radio,
            registry,
            settings,
            alarm,
            fade_duration: Duration::from_millis(DEFAULT_FADE_DURATION_MS),
            running: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    /// Build the daemon from configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let radio = Radio::new(MpdPool::new(config.mpd().clone()));
        let registry = StationRegistry::new(config.stations.iter().cloned())?;
        let settings = SettingsStore::from_config(config.couchdb())?;

        Ok(Self::new(radio, registry, settings, AlarmClock::new(AlarmTime::default()))
            .with_fade_duration(config.fade_duration))
    }

    /// Set how long the alarm takes to reach full volume
    pub fn with_fade_duration(mut self, fade_duration: Duration) -> Self {
        self.fade_duration = fade_duration;
        self
    }

    pub fn radio(&self) -> &Radio {
        &self.radio
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn alarm(&self) -> &AlarmClock {
        &self.alarm
    }

    /// Start listening for the alarm and restore the stored alarm settings.
    ///
    /// Can only be called once.
    #[instrument(skip(self))]
    pub async fn run(self: &Arc<Self>) -> AppResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AppError::AlreadyRunning);
        }

        self.spawn_listener();

        let time: AlarmTime = self
            .settings
            .get(ALARM_TIME_KEY)
            .await?
            .unwrap_or_default();
        self.alarm
            .set_time(time.hours, time.minutes, Some(time.seconds))?;

        let enabled: bool = self
            .settings
            .get(ALARM_ENABLED_KEY)
            .await?
            .unwrap_or(false);
        if enabled {
            self.alarm.run();
        }

        info!(time = %time, enabled, "Alarm daemon running");
        Ok(())
    }

    /// React to the alarm ringing
    #[instrument(skip(self))]
    pub async fn handle_ring(&self) -> AppResult<RingOutcome> {
        if self.radio.is_playing().await? {
            debug!("Already playing, alarm ignored");
            return Ok(RingOutcome::AlreadyPlaying);
        }

        let station_id: Option<String> = self.settings.get(ALARM_STATION_KEY).await?;
        let station = match station_id {
            Some(id) => match self.registry.get(&id).await {
                Some(station) => station,
                None => {
                    warn!(station = %id, "Alarm station is not in the catalog");
                    return Ok(RingOutcome::NoStation);
                }
            },
            None => {
                warn!("No alarm station selected");
                return Ok(RingOutcome::NoStation);
            }
        };

        info!(station = station.id(), "Waking up");
        self.radio.set_current_station(station)?;
        let outcome = self.radio.fade_in(self.fade_duration).await?;
        Ok(RingOutcome::Faded(outcome))
    }

    /// Validate, apply and persist new alarm settings.
    ///
    /// The three settings are written concurrently; the first failure is
    /// returned and the others may or may not have been stored.
    #[instrument(skip(self))]
    pub async fn update_alarm_settings(&self, settings: AlarmSettings) -> AppResult<()> {
        settings.validate()?;

        let time = self
            .alarm
            .set_time(settings.time.hours, settings.time.minutes, None)?;
        if settings.is_enabled {
            self.alarm.run();
        } else {
            self.alarm.stop();
        }

        let time = time.with_seconds(0);
        tokio::try_join!(
            self.settings.set(ALARM_TIME_KEY, &time),
            self.settings.set(ALARM_ENABLED_KEY, &settings.is_enabled),
            self.settings
                .set(ALARM_STATION_KEY, settings.selected_station.as_str()),
        )?;

        info!(
            time = %time,
            enabled = settings.is_enabled,
            station = %settings.selected_station,
            "Alarm settings saved"
        );
        Ok(())
    }

    /// Play a catalog station right away
    #[instrument(skip(self))]
    pub async fn play_station(&self, id: &str) -> AppResult<()> {
        let station = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| AppError::StationNotFound(id.to_string()))?;
        self.radio.set_current_station(station)?;
        self.radio.play().await?;
        Ok(())
    }

    /// Stop playback, including an alarm fade-in
    pub async fn stop(&self) -> AppResult<()> {
        self.radio.stop().await?;
        Ok(())
    }

    /// Disarm the alarm and stop listening for it
    pub fn shutdown(&self) {
        self.alarm.stop();
        self.radio.cancel_fade();
        if let Some(listener) = self.lock_listener().take() {
            listener.abort();
        }
    }

    fn spawn_listener(self: &Arc<Self>) {
        let mut events = self.alarm.subscribe();
        let app = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AlarmEvent::Ring(_)) => {
                        let Some(app) = Weak::upgrade(&app) else {
                            break;
                        };
                        if let Err(e) = app.handle_ring().await {
                            e.log();
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Alarm listener lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        *self.lock_listener() = Some(handle);
    }

    fn lock_listener(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        if let Some(listener) = self.lock_listener().take() {
            listener.abort();
        }
    }
}
