use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown rendition: {0}")]
pub struct UnknownRendition(pub String);

/// Encoded quality variant published for an item.
///
/// Declaration order is the probe order used when restoring published output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rendition {
    P720,
    P480,
    P360,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenditionProfile {
    pub width: u32,
    pub height: u32,
    /// Encoder rate ceiling, also used as the VBV buffer size.
    pub max_bitrate: &'static str,
    pub crf: u8,
    pub preset: &'static str,
    /// Advertised in the master playlist.
    pub bandwidth: u64,
}

impl RenditionProfile {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl Rendition {
    pub const ALL: [Rendition; 3] = [Rendition::P720, Rendition::P480, Rendition::P360];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rendition::P720 => "720p",
            Rendition::P480 => "480p",
            Rendition::P360 => "360p",
        }
    }

    pub fn profile(&self) -> RenditionProfile {
        match self {
            Rendition::P720 => RenditionProfile {
                width: 1280,
                height: 720,
                max_bitrate: "2500k",
                crf: 23,
                preset: "medium",
                bandwidth: 2_500_000,
            },
            Rendition::P480 => RenditionProfile {
                width: 854,
                height: 480,
                max_bitrate: "1200k",
                crf: 26,
                preset: "medium",
                bandwidth: 1_000_000,
            },
            Rendition::P360 => RenditionProfile {
                width: 640,
                height: 360,
                max_bitrate: "600k",
                crf: 28,
                preset: "fast",
                bandwidth: 500_000,
            },
        }
    }

    /// Resolves requested names in order, dropping unknown names and repeats.
    pub fn resolve_lenient<I, S>(names: I) -> Vec<Rendition>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolved = Vec::new();
        for name in names {
            match name.as_ref().parse::<Rendition>() {
                Ok(rendition) if !resolved.contains(&rendition) => resolved.push(rendition),
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "ignoring requested rendition"),
            }
        }
        resolved
    }

    /// Resolves names in order, rejecting the whole list on the first unknown name.
    pub fn resolve_strict<I, S>(names: I) -> Result<Vec<Rendition>, UnknownRendition>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| name.as_ref().parse::<Rendition>())
            .collect()
    }
}

impl fmt::Display for Rendition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rendition {
    type Err = UnknownRendition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "720p" => Ok(Rendition::P720),
            "480p" => Ok(Rendition::P480),
            "360p" => Ok(Rendition::P360),
            other => Err(UnknownRendition(other.to_string())),
        }
    }
}

impl Serialize for Rendition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_resolution_keeps_request_order() {
        let resolved = Rendition::resolve_lenient(["360p", "1080p", "720p", "360p"]);
        assert_eq!(resolved, vec![Rendition::P360, Rendition::P720]);
    }

    #[test]
    fn strict_resolution_rejects_unknown_names() {
        let err = Rendition::resolve_strict(["720p", "4k"]).unwrap_err();
        assert_eq!(err, UnknownRendition("4k".into()));
    }

    #[test]
    fn profiles_match_published_bandwidths() {
        assert_eq!(Rendition::P720.profile().bandwidth, 2_500_000);
        assert_eq!(Rendition::P480.profile().resolution(), "854x480");
        assert_eq!(Rendition::P360.profile().preset, "fast");
    }
}
