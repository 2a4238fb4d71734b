//! Playback controller driving MPD through the connection pool
//!
//! Every operation borrows one pooled connection, sends its commands as a
//! single command list and gives the connection back on every exit path.
//! Nothing about the player is cached: `is_playing` always asks the daemon.
//!
//! There is no ordering between concurrent operations. A `play` and a `stop`
//! issued together run on two connections and race at the daemon.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use reveille_mpd_client::{Command, MpdPool};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{RadioError, RadioResult, ValidationError};
use crate::station::{Station, StationDraft};

/// Shortest accepted fade-in
pub const MIN_FADE_DURATION: Duration = Duration::from_millis(100);

/// Number of volume steps in a fade-in (0 to 100 percent)
const FADE_STEPS: u8 = 100;

/// How a fade-in ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeOutcome {
    /// Volume reached 100
    Completed,
    /// Another operation or [`Radio::cancel_fade`] stopped the ramp
    Cancelled,
    /// The connection died in the middle of the ramp
    ConnectionLost,
}

struct ActiveFade {
    generation: u64,
    token: CancellationToken,
}

/// Internet radio receiver backed by MPD
pub struct Radio {
    pool: MpdPool,
    current_station: RwLock<Option<Station>>,
    fade: Mutex<Option<ActiveFade>>,
    fade_generation: AtomicU64,
}

impl Radio {
    /// Create a controller on top of a connection pool
    pub fn new(pool: MpdPool) -> Self {
        Self {
            pool,
            current_station: RwLock::new(None),
            fade: Mutex::new(None),
            fade_generation: AtomicU64::new(0),
        }
    }

    /// Pool used by this controller
    pub fn pool(&self) -> &MpdPool {
        &self.pool
    }

    /// Select the station used by `play` and `fade_in`. No I/O.
    pub fn set_current_station(&self, station: impl Into<StationDraft>) -> Result<(), ValidationError> {
        let station = Station::try_from(station.into())?;
        debug!(station = station.id(), "Current station selected");
        *self
            .current_station
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(station);
        Ok(())
    }

    /// Currently selected station, if any
    pub fn current_station(&self) -> Option<Station> {
        self.current_station
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Play the selected station at full volume
    #[instrument(skip(self))]
    pub async fn play(&self) -> RadioResult<()> {
        let station = self.require_station()?;
        self.cancel_fade();

        let mut connection = self.pool.acquire().await?;
        connection
            .send_commands(&[
                Command::clear(),
                Command::setvol(100),
                Command::add(station.url()),
                Command::play(),
            ])
            .await?;

        info!(station = station.id(), "Playing station");
        Ok(())
    }

    /// Stop playback and empty the playlist
    #[instrument(skip(self))]
    pub async fn stop(&self) -> RadioResult<()> {
        self.cancel_fade();

        let mut connection = self.pool.acquire().await?;
        connection
            .send_commands(&[Command::stop(), Command::clear()])
            .await?;

        info!("Playback stopped");
        Ok(())
    }

    /// Start the selected station muted and raise the volume by one percent
    /// per step until it reaches 100 after roughly `duration`.
    ///
    /// One connection is held for the whole ramp. A failed step is logged and
    /// the ramp goes on; the operation resolves once the volume is at 100 or
    /// the fade is cancelled.
    #[instrument(skip(self), fields(duration_ms = duration.as_millis() as u64))]
    pub async fn fade_in(&self, duration: Duration) -> RadioResult<FadeOutcome> {
        let station = self.require_station()?;
        if duration < MIN_FADE_DURATION {
            return Err(RadioError::FadeTooShort);
        }

        let fade = self.begin_fade();
        let token = fade.token.clone();

        let mut connection = self.pool.acquire().await?;
        if token.is_cancelled() {
            return Ok(FadeOutcome::Cancelled);
        }
        connection
            .send_commands(&[
                Command::setvol(0),
                Command::add(station.url()),
                Command::play(),
            ])
            .await?;

        let period = fade_step(duration);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            station = station.id(),
            step_ms = period.as_millis() as u64,
            "Fading in"
        );

        for volume in 1..=FADE_STEPS {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(volume = volume - 1, "Fade-in cancelled");
                    return Ok(FadeOutcome::Cancelled);
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = connection.send_command(&Command::setvol(volume)).await {
                warn!(volume, error = %e, "Failed to raise volume");
                if e.is_fatal() {
                    return Ok(FadeOutcome::ConnectionLost);
                }
            }
        }

        debug!("Fade-in completed");
        Ok(FadeOutcome::Completed)
    }

    /// Stop an in-flight fade-in, if any. The volume stays where it is.
    pub fn cancel_fade(&self) {
        if let Some(fade) = self.fade.lock().unwrap_or_else(|e| e.into_inner()).take() {
            debug!(generation = fade.generation, "Cancelling fade-in");
            fade.token.cancel();
        }
    }

    /// Check whether a fade-in is running
    pub fn is_fading(&self) -> bool {
        self.fade
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Ask the daemon whether it is playing right now
    #[instrument(skip(self))]
    pub async fn is_playing(&self) -> RadioResult<bool> {
        let mut connection = self.pool.acquire().await?;
        let status = connection.status().await?;
        Ok(status.is_playing())
    }

    fn require_station(&self) -> RadioResult<Station> {
        self.current_station().ok_or(RadioError::NoStationSelected)
    }

    /// Register a new fade, cancelling the previous one
    fn begin_fade(&self) -> FadeRegistration<'_> {
        let generation = self.fade_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();

        let previous = self
            .fade
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(ActiveFade {
                generation,
                token: token.clone(),
            });
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        FadeRegistration {
            radio: self,
            generation,
            token,
        }
    }
}

/// Unregisters a fade when it ends, however it ends
struct FadeRegistration<'a> {
    radio: &'a Radio,
    generation: u64,
    token: CancellationToken,
}

impl Drop for FadeRegistration<'_> {
    fn drop(&mut self) {
        let mut fade = self.radio.fade.lock().unwrap_or_else(|e| e.into_inner());
        if fade.as_ref().map(|f| f.generation) == Some(self.generation) {
            *fade = None;
        }
    }
}

/// Interval between two volume steps: `duration / 100`, rounded to the millisecond
pub fn fade_step(duration: Duration) -> Duration {
    let millis = (duration.as_millis() as u64 + 50) / u64::from(FADE_STEPS);
    Duration::from_millis(millis.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_step_rounds() {
        assert_eq!(fade_step(Duration::from_millis(100)), Duration::from_millis(1));
        assert_eq!(fade_step(Duration::from_millis(150)), Duration::from_millis(2));
        assert_eq!(fade_step(Duration::from_millis(149)), Duration::from_millis(1));
        assert_eq!(fade_step(Duration::from_secs(50)), Duration::from_millis(500));
    }
}
