//! Radio station values

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Mandatory station keys in the order they are reported by [`StationDraft::missing_keys`]
pub const STATION_KEYS: [&str; 3] = ["id", "name", "url"];

/// A validated, immutable radio station
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "StationDraft")]
pub struct Station {
    id: String,
    name: String,
    url: String,
}

impl Station {
    /// Build a station, rejecting empty fields
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        StationDraft {
            id: Some(id.into()),
            name: Some(name.into()),
            url: Some(url.into()),
        }
        .try_into()
    }

    /// Machine name, unique within a registry
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stream URL handed to the daemon
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Station data that has not been validated yet.
///
/// Any key may be missing; unknown keys are ignored when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl StationDraft {
    /// Value of a mandatory key, treating an empty string as absent
    pub fn field(&self, key: &str) -> Option<&str> {
        let value = match key {
            "id" => self.id.as_deref(),
            "name" => self.name.as_deref(),
            "url" => self.url.as_deref(),
            _ => None,
        };
        value.filter(|v| !v.is_empty())
    }

    /// Mandatory keys that are absent or empty, in `id, name, url` order
    pub fn missing_keys(&self) -> Vec<&'static str> {
        STATION_KEYS
            .into_iter()
            .filter(|key| self.field(key).is_none())
            .collect()
    }
}

impl TryFrom<StationDraft> for Station {
    type Error = ValidationError;

    fn try_from(draft: StationDraft) -> Result<Self, Self::Error> {
        let missing = draft.missing_keys();
        if !missing.is_empty() {
            return Err(ValidationError::MissingKeys(missing));
        }

        if draft.url.as_deref().map_or(false, has_line_break) {
            return Err(ValidationError::LineBreak("url"));
        }

        match draft {
            StationDraft {
                id: Some(id),
                name: Some(name),
                url: Some(url),
            } => Ok(Self { id, name, url }),
            _ => Err(ValidationError::MissingKeys(STATION_KEYS.to_vec())),
        }
    }
}

/// The URL is sent to the daemon as one protocol line
fn has_line_break(value: &str) -> bool {
    value.contains(['\n', '\r'])
}

impl From<Station> for StationDraft {
    fn from(station: Station) -> Self {
        Self {
            id: Some(station.id),
            name: Some(station.name),
            url: Some(station.url),
        }
    }
}

impl From<&Station> for StationDraft {
    fn from(station: &Station) -> Self {
        station.clone().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn draft_without(removed: &[&str]) -> StationDraft {
        let mut draft = StationDraft {
            id: Some("bbc".to_string()),
            name: Some("BBC".to_string()),
            url: Some("http://bbc.example/stream".to_string()),
        };
        for key in removed {
            match *key {
                "id" => draft.id = None,
                "name" => draft.name = None,
                "url" => draft.url = None,
                _ => unreachable!(),
            }
        }
        draft
    }

    #[rstest]
    #[case(&["id"])]
    #[case(&["name"])]
    #[case(&["url"])]
    #[case(&["id", "name"])]
    #[case(&["id", "url"])]
    #[case(&["name", "url"])]
    #[case(&["id", "name", "url"])]
    fn test_missing_keys_are_reported_in_order(#[case] removed: &[&'static str]) {
        let err = Station::try_from(draft_without(removed)).unwrap_err();
        assert_eq!(err, ValidationError::MissingKeys(removed.to_vec()));

        let expected = removed
            .iter()
            .map(|k| format!("\"{k}\""))
            .collect::<Vec<_>>()
            .join(", ");
        assert_eq!(
            err.to_string(),
            format!("These keys are missed at station object: {expected}")
        );
    }

    #[test]
    fn test_complete_draft_is_valid() {
        let station = Station::try_from(draft_without(&[])).unwrap();
        assert_eq!(station.id(), "bbc");
        assert_eq!(station.name(), "BBC");
        assert_eq!(station.url(), "http://bbc.example/stream");
    }

    #[test]
    fn test_empty_strings_count_as_missing() {
        let err = Station::new("", "BBC", "").unwrap_err();
        assert_eq!(err, ValidationError::MissingKeys(vec!["id", "url"]));
    }

    #[rstest]
    #[case("http://a\nstop\nadd b")]
    #[case("http://a\r\nstop")]
    #[case("http://a\r")]
    fn test_url_with_line_break_is_rejected(#[case] url: &str) {
        let err = Station::new("evil", "Evil", url).unwrap_err();
        assert_eq!(err, ValidationError::LineBreak("url"));
        assert_eq!(err.to_string(), "\"url\" field must not contain line breaks.");
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let station: Station = serde_json::from_str(
            r#"{"id": "fip", "name": "FIP", "url": "http://fip.example", "genre": "eclectic"}"#,
        )
        .unwrap();
        assert_eq!(station.id(), "fip");
    }

    #[test]
    fn test_deserializing_invalid_station_fails() {
        let err = serde_json::from_str::<Station>(r#"{"name": "FIP"}"#).unwrap_err();
        assert!(err
            .to_string()
            .contains("These keys are missed at station object: \"id\", \"url\""));
    }

    #[test]
    fn test_station_serializes_plainly() {
        let station = Station::new("bbc", "BBC", "http://bbc.example/stream").unwrap();
        assert_eq!(
            serde_json::to_value(&station).unwrap(),
            serde_json::json!({"id": "bbc", "name": "BBC", "url": "http://bbc.example/stream"})
        );
    }
}
