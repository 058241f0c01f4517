//! Activity observations and their canonical `(game, platform, key)` form.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ApplicationKey, ValidationError};

/// Activity name reported by the Steam Deck companion integration.
///
/// The actual title only appears in the free-text details field.
pub const STEAM_DECK_NAME: &str = "Steam Deck";

/// Prefix the Steam Deck integration puts in front of the title in `details`.
const STEAM_DECK_DETAILS_PREFIX: &str = "Playing ";

/// Platform assumed when the event source doesn't report one.
pub const DEFAULT_PLATFORM: &str = "pc";

/// Platform value that is coalesced into [`DEFAULT_PLATFORM`].
const DESKTOP_PLATFORM: &str = "desktop";

/// The kind of activity a member is engaged in.
///
/// Mirrors the activity types the event source emits; only
/// [`ActivityKind::Playing`] is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Playing,
    Streaming,
    Listening,
    Watching,
    Custom,
    Competing,
}

impl ActivityKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Streaming => "streaming",
            Self::Listening => "listening",
            Self::Watching => "watching",
            Self::Custom => "custom",
            Self::Competing => "competing",
        }
    }

    /// Whether this activity counts as playing a game.
    #[must_use]
    pub const fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "playing" => Ok(Self::Playing),
            "streaming" => Ok(Self::Streaming),
            "listening" => Ok(Self::Listening),
            "watching" => Ok(Self::Watching),
            "custom" => Ok(Self::Custom),
            "competing" => Ok(Self::Competing),
            _ => Err(ValidationError::UnknownActivityKind {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for ActivityKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActivityKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A single activity as reported by the event source for one member.
///
/// Constructed only through validation: the name is never empty and optional
/// fields are `None` rather than empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawActivity", into = "RawActivity")]
pub struct ActivityObservation {
    kind: ActivityKind,
    name: String,
    details: Option<String>,
    application_id: Option<ApplicationKey>,
    platform: Option<String>,
    start: Option<DateTime<Utc>>,
}

/// Wire shape of an activity, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawActivity {
    #[serde(rename = "type")]
    kind: ActivityKind,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    application_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<DateTime<Utc>>,
}

impl TryFrom<RawActivity> for ActivityObservation {
    type Error = ValidationError;

    fn try_from(raw: RawActivity) -> Result<Self, Self::Error> {
        let name = raw
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or(ValidationError::Empty {
                field: "activity name",
            })?;
        Ok(Self {
            kind: raw.kind,
            name,
            details: non_blank(raw.details),
            application_id: non_blank(raw.application_id).map(ApplicationKey::from_validated),
            platform: non_blank(raw.platform),
            start: raw.start,
        })
    }
}

impl From<ActivityObservation> for RawActivity {
    fn from(observation: ActivityObservation) -> Self {
        Self {
            kind: observation.kind,
            name: Some(observation.name),
            details: observation.details,
            application_id: observation.application_id.map(String::from),
            platform: observation.platform,
            start: observation.start,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ActivityObservation {
    /// Creates an observation with only the required fields set.
    pub fn new(kind: ActivityKind, name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::try_from(RawActivity {
            kind,
            name: Some(name.into()),
            details: None,
            application_id: None,
            platform: None,
            start: None,
        })
    }

    /// Shorthand for a [`ActivityKind::Playing`] observation.
    pub fn playing(name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(ActivityKind::Playing, name)
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = non_blank(Some(details.into()));
        self
    }

    #[must_use]
    pub fn with_application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id =
            non_blank(Some(application_id.into())).map(ApplicationKey::from_validated);
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = non_blank(Some(platform.into()));
        self
    }

    #[must_use]
    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub const fn kind(&self) -> ActivityKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub const fn application_id(&self) -> Option<&ApplicationKey> {
        self.application_id.as_ref()
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    /// Session start time as reported upstream, if any.
    pub const fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }
}

/// An activity after name, platform and identity normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalActivity {
    pub game_name: String,
    pub platform: String,
    pub application_key: ApplicationKey,
}

impl CanonicalActivity {
    /// Whether both describe the same game session. Platform is not compared.
    pub fn same_session(&self, other: &Self) -> bool {
        self.application_key == other.application_key && self.game_name == other.game_name
    }
}

/// Maps a raw observation to its canonical form.
///
/// Deterministic in its input; the only side effect is a warning when a
/// fallback path is taken. A Steam Deck activity without an application id
/// is keyed on its extracted title so different Deck games never share a key.
pub fn normalize(observation: &ActivityObservation) -> CanonicalActivity {
    let game_name = resolve_game_name(observation);

    let application_key = observation.application_id().cloned().unwrap_or_else(|| {
        // Steam Deck activities share one raw name across every title.
        let fallback = if observation.name() == STEAM_DECK_NAME {
            game_name.clone()
        } else {
            observation.name().to_string()
        };
        tracing::warn!(
            activity = observation.name(),
            application_key = %fallback,
            "activity has no application id, keying on name"
        );
        ApplicationKey::from_validated(fallback)
    });

    CanonicalActivity {
        game_name,
        platform: normalize_platform(observation.platform()),
        application_key,
    }
}

fn resolve_game_name(observation: &ActivityObservation) -> String {
    if observation.name() != STEAM_DECK_NAME {
        return observation.name().to_string();
    }

    let title = observation.details().map(|details| {
        details
            .strip_prefix(STEAM_DECK_DETAILS_PREFIX)
            .unwrap_or(details)
            .trim()
    });
    match title {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => {
            tracing::warn!(
                details = observation.details(),
                "Steam Deck activity without a title in details"
            );
            observation.name().to_string()
        }
    }
}

fn normalize_platform(platform: Option<&str>) -> String {
    match platform {
        None => DEFAULT_PLATFORM.to_string(),
        Some(p) if p.eq_ignore_ascii_case(DESKTOP_PLATFORM) => DEFAULT_PLATFORM.to_string(),
        Some(p) => p.to_string(),
    }
}
