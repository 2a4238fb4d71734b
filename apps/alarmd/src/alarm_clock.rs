//! Daily alarm timer
//!
//! The clock rings once a day at a local time of day. Listeners receive
//! [`AlarmEvent`]s over a broadcast channel; the clock itself never touches
//! the radio.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

/// Capacity of the event channel. Events are rare, lagging listeners only
/// lose old notifications.
const EVENT_CAPACITY: usize = 16;

/// A time of day, persisted as the `alarm_time` setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmTime {
    pub hours: u8,
    pub minutes: u8,
    #[serde(default)]
    pub seconds: u8,
}

impl AlarmTime {
    /// Build a validated time of day
    pub fn new(hours: u8, minutes: u8, seconds: u8) -> AppResult<Self> {
        let time = Self {
            hours,
            minutes,
            seconds,
        };
        time.validate()?;
        Ok(time)
    }

    /// Check every component is within its range
    pub fn validate(&self) -> AppResult<()> {
        if self.hours > 23 {
            return Err(AppError::invalid_settings(
                "\"time.hours\" must be an integer in [0, 23] interval.",
            ));
        }
        if self.minutes > 59 {
            return Err(AppError::invalid_settings(
                "\"time.minutes\" must be an integer in [0, 59] interval.",
            ));
        }
        if self.seconds > 59 {
            return Err(AppError::invalid_settings(
                "\"time.seconds\" must be an integer in [0, 59] interval.",
            ));
        }
        Ok(())
    }

    /// Same time with the seconds replaced
    pub fn with_seconds(self, seconds: u8) -> Self {
        Self { seconds, ..self }
    }

    fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(
            u32::from(self.hours),
            u32::from(self.minutes),
            u32::from(self.seconds),
        )
        .unwrap_or_default()
    }
}

impl Default for AlarmTime {
    /// 09:45:00
    fn default() -> Self {
        Self {
            hours: 9,
            minutes: 45,
            seconds: 0,
        }
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// Notifications published by [`AlarmClock`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmEvent {
    TimeChanged(AlarmTime),
    Started,
    Stopped,
    Ring(AlarmTime),
}

/// First occurrence of `time` strictly after `after`
pub fn next_ring_at(after: NaiveDateTime, time: AlarmTime) -> NaiveDateTime {
    let candidate = after.date().and_time(time.as_naive_time());
    if candidate > after {
        candidate
    } else {
        candidate + chrono::Duration::days(1)
    }
}

type NowFn = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

struct ClockState {
    time: AlarmTime,
    timer: Option<JoinHandle<()>>,
}

/// Timer ringing once a day at the configured time
pub struct AlarmClock {
    state: Mutex<ClockState>,
    events: broadcast::Sender<AlarmEvent>,
    now: NowFn,
}

impl AlarmClock {
    /// Create a stopped clock set to `time`, reading the local wall clock
    pub fn new(time: AlarmTime) -> Self {
        Self::with_clock(time, || Local::now().naive_local())
    }

    /// Create a stopped clock reading the time of day from `now`
    pub fn with_clock(
        time: AlarmTime,
        now: impl Fn() -> NaiveDateTime + Send + Sync + 'static,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(ClockState { time, timer: None }),
            events,
            now: Arc::new(now),
        }
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AlarmEvent> {
        self.events.subscribe()
    }

    /// Change the alarm time. A running clock is rescheduled.
    pub fn set_time(&self, hours: u8, minutes: u8, seconds: Option<u8>) -> AppResult<AlarmTime> {
        let time = AlarmTime::new(hours, minutes, seconds.unwrap_or(0))?;

        let mut state = self.lock();
        state.time = time;
        if let Some(timer) = state.timer.take() {
            timer.abort();
            state.timer = Some(self.spawn_timer(time));
        }
        drop(state);

        debug!(time = %time, "Alarm time changed");
        self.publish(AlarmEvent::TimeChanged(time));
        Ok(time)
    }

    /// Configured alarm time
    pub fn get_time(&self) -> AlarmTime {
        self.lock().time
    }

    /// Start ringing at the configured time. Restarts a running clock.
    pub fn run(&self) {
        let mut state = self.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let time = state.time;
        state.timer = Some(self.spawn_timer(time));
        drop(state);

        info!(time = %time, "Alarm enabled");
        self.publish(AlarmEvent::Started);
    }

    /// Stop ringing. Does nothing when the clock is not running.
    pub fn stop(&self) {
        let timer = self.lock().timer.take();
        if let Some(timer) = timer {
            timer.abort();
            info!("Alarm disabled");
            self.publish(AlarmEvent::Stopped);
        }
    }

    /// Check whether the clock is armed
    pub fn is_running(&self) -> bool {
        self.lock().timer.is_some()
    }

    fn spawn_timer(&self, time: AlarmTime) -> JoinHandle<()> {
        tokio::spawn(ring_daily(time, Arc::clone(&self.now), self.events.clone()))
    }

    fn publish(&self, event: AlarmEvent) {
        // No listener is not an error.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for AlarmClock {
    fn drop(&mut self) {
        if let Some(timer) = self.lock().timer.take() {
            timer.abort();
        }
    }
}

/// Ring at every occurrence of `time`, scheduling each one from the previous
async fn ring_daily(time: AlarmTime, now: NowFn, events: broadcast::Sender<AlarmEvent>) {
    let mut previous = now();
    loop {
        let target = next_ring_at(previous, time);
        let wait = (target - now()).to_std().unwrap_or_default();
        debug!(target = %target, wait_secs = wait.as_secs(), "Next alarm scheduled");
        tokio::time::sleep(wait).await;

        // Woken early by a wall clock adjustment: wait for the same target again.
        if now() < target {
            continue;
        }

        info!(time = %time, "Alarm ringing");
        let _ = events.send(AlarmEvent::Ring(time));
        previous = target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::time::Duration;
    use tokio::time::Instant;
    use tracing_test::traced_test;

    fn at(hours: u32, minutes: u32, seconds: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 14)
            .unwrap()
            .and_hms_opt(hours, minutes, seconds)
            .unwrap()
    }

    /// Wall clock starting at `start` and advancing with tokio's (paused) clock
    fn paused_clock(start: NaiveDateTime) -> impl Fn() -> NaiveDateTime + Send + Sync {
        let origin = Instant::now();
        move || start + chrono::Duration::from_std(origin.elapsed()).unwrap()
    }

    #[test]
    fn test_next_ring_later_today() {
        let time = AlarmTime::new(9, 45, 0).unwrap();
        assert_eq!(next_ring_at(at(8, 0, 0), time), at(9, 45, 0));
    }

    #[test]
    fn test_next_ring_tomorrow_when_passed_or_exact() {
        let time = AlarmTime::new(9, 45, 0).unwrap();
        let tomorrow = at(9, 45, 0) + chrono::Duration::days(1);
        assert_eq!(next_ring_at(at(10, 0, 0), time), tomorrow);
        assert_eq!(next_ring_at(at(9, 45, 0), time), tomorrow);
    }

    #[test]
    fn test_alarm_time_validation() {
        assert_eq!(
            AlarmTime::new(24, 0, 0).unwrap_err().to_string(),
            "\"time.hours\" must be an integer in [0, 23] interval."
        );
        assert_eq!(
            AlarmTime::new(7, 60, 0).unwrap_err().to_string(),
            "\"time.minutes\" must be an integer in [0, 59] interval."
        );
        assert!(AlarmTime::new(23, 59, 59).is_ok());
    }

    #[test]
    fn test_alarm_time_serde() {
        let time: AlarmTime = serde_json::from_str(r#"{"hours": 7, "minutes": 5}"#).unwrap();
        assert_eq!(time, AlarmTime::new(7, 5, 0).unwrap());
        assert_eq!(time.to_string(), "07:05:00");
        assert_eq!(AlarmTime::default().to_string(), "09:45:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rings_once_per_day() {
        let clock = AlarmClock::with_clock(
            AlarmTime::new(9, 45, 0).unwrap(),
            paused_clock(at(9, 44, 0)),
        );
        let mut events = clock.subscribe();
        clock.run();
        assert_eq!(events.recv().await.unwrap(), AlarmEvent::Started);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(events.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            events.try_recv().unwrap(),
            AlarmEvent::Ring(clock.get_time())
        );

        // Nothing more until the same time tomorrow.
        tokio::time::sleep(Duration::from_secs(23 * 3600)).await;
        assert!(events.try_recv().is_err());
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_matches::assert_matches!(events.try_recv(), Ok(AlarmEvent::Ring(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_time_reschedules_running_clock() {
        let clock = AlarmClock::with_clock(AlarmTime::default(), paused_clock(at(8, 0, 0)));
        clock.run();
        let mut events = clock.subscribe();

        let time = clock.set_time(8, 1, None).unwrap();
        assert_eq!(time, AlarmTime::new(8, 1, 0).unwrap());
        assert_eq!(events.recv().await.unwrap(), AlarmEvent::TimeChanged(time));
        assert!(clock.is_running());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(events.try_recv().unwrap(), AlarmEvent::Ring(time));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_silences_clock() {
        let clock = AlarmClock::with_clock(AlarmTime::new(8, 1, 0).unwrap(), paused_clock(at(8, 0, 0)));
        clock.run();
        let mut events = clock.subscribe();

        clock.stop();
        assert!(!clock.is_running());
        assert_eq!(events.recv().await.unwrap(), AlarmEvent::Stopped);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(events.try_recv().is_err());

        // Stopping twice publishes nothing.
        clock.stop();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_time_on_stopped_clock_does_not_start_it() {
        let clock = AlarmClock::with_clock(AlarmTime::default(), paused_clock(at(8, 0, 0)));
        clock.set_time(8, 0, Some(30)).unwrap();
        assert!(!clock.is_running());
        assert_eq!(clock.get_time(), AlarmTime::new(8, 0, 30).unwrap());
        assert!(clock.set_time(8, 61, None).is_err());
        assert_eq!(clock.get_time().minutes, 0);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_ring_is_logged() {
        let clock = AlarmClock::with_clock(AlarmTime::new(8, 0, 5).unwrap(), paused_clock(at(8, 0, 0)));
        clock.run();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(logs_contain("Alarm enabled"));
        assert!(logs_contain("Alarm ringing"));
    }
}
