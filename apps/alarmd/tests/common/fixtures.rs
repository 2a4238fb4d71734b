//! Test fixtures for alarm daemon tests

use std::sync::Arc;
use std::time::Duration;

use reveille_alarmd::{AlarmClock, AlarmTime, Application};
use reveille_mpd_client::MpdPool;
use reveille_radio::{Radio, Station, StationRegistry};
use reveille_settings_client::SettingsStore;
use reveille_shared_config::{CouchDbConfig, MpdConfig};
use reveille_test_utils::{MockCouchServer, MockMpdServer};

pub const BBC_URL: &str = "http://bbc.example/stream";
pub const FIP_URL: &str = "http://fip.example/stream";

/// Shortest fade accepted by the radio, keeps ring tests fast
pub const TEST_FADE: Duration = Duration::from_millis(100);

pub fn stations() -> Vec<Station> {
    vec![
        Station::new("bbc", "BBC", BBC_URL).unwrap(),
        Station::new("fip", "FIP", FIP_URL).unwrap(),
    ]
}

/// A daemon with its fake collaborators
pub struct TestApp {
    pub app: Arc<Application>,
    pub mpd: MockMpdServer,
    pub couch: MockCouchServer,
}

impl TestApp {
    pub async fn start() -> Self {
        Self::start_with_clock(AlarmClock::new(AlarmTime::default())).await
    }

    pub async fn start_with_clock(alarm: AlarmClock) -> Self {
        let mpd = MockMpdServer::start().await;
        let couch = MockCouchServer::start().await;

        let radio = Radio::new(MpdPool::new(MpdConfig::with_address(mpd.host(), mpd.port())));
        let registry = StationRegistry::new(stations()).unwrap();
        let settings = SettingsStore::from_config(&CouchDbConfig::with_url(couch.url())).unwrap();

        let app = Application::new(radio, registry, settings, alarm).with_fade_duration(TEST_FADE);

        Self {
            app: Arc::new(app),
            mpd,
            couch,
        }
    }
}
