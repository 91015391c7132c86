//! Timed on-screen text overlays.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Screen anchor for an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsdPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl OsdPosition {
    #[cfg(test)]
    pub const ALL: &[OsdPosition] = &[
        OsdPosition::TopLeft,
        OsdPosition::TopRight,
        OsdPosition::BottomLeft,
        OsdPosition::BottomRight,
        OsdPosition::Center,
    ];
}

/// Overlay verbosity tier. Ordering is significant: an entry is drawn only if
/// its level is at or below the configured preference and the preference is
/// not `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsdLevel {
    Off,
    #[default]
    Standard,
    Debug,
}

impl OsdLevel {
    pub fn visible_at(self, preference: OsdLevel) -> bool {
        preference != OsdLevel::Off && self != OsdLevel::Off && self <= preference
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OsdLevel::Off => "off",
            OsdLevel::Standard => "standard",
            OsdLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for OsdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsdLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(OsdLevel::Off),
            "standard" | "on" => Ok(OsdLevel::Standard),
            "debug" => Ok(OsdLevel::Debug),
            other => Err(format!("unknown OSD level '{other}' (expected off, standard or debug)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimedOsd {
    pub text: String,
    pub position: OsdPosition,
    pub level: OsdLevel,
    pub expires_at: Instant,
}

/// Unordered set of overlays that disappear at their expiry instant.
#[derive(Debug, Default)]
pub struct OsdQueue {
    entries: Vec<TimedOsd>,
}

impl OsdQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: impl Into<String>, position: OsdPosition, level: OsdLevel, duration: Duration) {
        self.push_at(text, position, level, Instant::now() + duration);
    }

    pub fn push_at(
        &mut self,
        text: impl Into<String>,
        position: OsdPosition,
        level: OsdLevel,
        expires_at: Instant,
    ) {
        self.entries.push(TimedOsd {
            text: text.into(),
            position,
            level,
            expires_at,
        });
    }

    /// Drop every entry whose expiry is at or before `now`.
    ///
    /// Returns true only if something visible at `preference` went away, so
    /// the caller knows a redraw is needed.
    pub fn expire(&mut self, now: Instant, preference: OsdLevel) -> bool {
        let mut visible_removed = false;
        self.entries.retain(|entry| {
            let keep = entry.expires_at > now;
            if !keep && entry.level.visible_at(preference) {
                visible_removed = true;
            }
            keep
        });
        visible_removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimedOsd> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_gating() {
        assert!(OsdLevel::Standard.visible_at(OsdLevel::Standard));
        assert!(OsdLevel::Standard.visible_at(OsdLevel::Debug));
        assert!(!OsdLevel::Debug.visible_at(OsdLevel::Standard));
        assert!(!OsdLevel::Standard.visible_at(OsdLevel::Off));
        assert!(!OsdLevel::Off.visible_at(OsdLevel::Debug));
    }

    #[test]
    fn parses_levels() {
        assert_eq!("DEBUG".parse::<OsdLevel>().unwrap(), OsdLevel::Debug);
        assert_eq!("off".parse::<OsdLevel>().unwrap(), OsdLevel::Off);
        assert!("loud".parse::<OsdLevel>().is_err());
        assert_eq!(OsdLevel::Standard.to_string(), "standard");
    }

    #[test]
    fn expiry_removes_only_due_entries() {
        let now = Instant::now();
        let mut queue = OsdQueue::new();
        queue.push_at("soon", OsdPosition::Center, OsdLevel::Standard, now + Duration::from_millis(10));
        queue.push_at("later", OsdPosition::TopLeft, OsdLevel::Standard, now + Duration::from_secs(10));

        assert!(!queue.expire(now, OsdLevel::Standard));
        assert_eq!(queue.len(), 2);
        assert!(queue.expire(now + Duration::from_millis(10), OsdLevel::Standard));
        let left: Vec<&str> = queue.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(left, ["later"]);
    }

    #[test]
    fn hidden_entries_expire_without_redraw() {
        let now = Instant::now();
        let mut queue = OsdQueue::new();
        queue.push_at("fps", OsdPosition::BottomLeft, OsdLevel::Debug, now);
        assert!(!queue.expire(now, OsdLevel::Standard));
        assert!(queue.is_empty());
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&OsdPosition::BottomRight).unwrap();
        assert_eq!(json, "\"bottom_right\"");
        let level: OsdLevel = serde_json::from_str("\"debug\"").unwrap();
        assert_eq!(level, OsdLevel::Debug);
    }
}
