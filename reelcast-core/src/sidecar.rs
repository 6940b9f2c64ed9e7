use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};

pub const SIDECAR_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Three-line metadata file stored beside published output: name, source
/// locator, creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSidecar {
    pub name: String,
    pub source_locator: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl ItemSidecar {
    pub fn render(&self) -> String {
        let created_at = self
            .created_at
            .map(|ts| ts.format(SIDECAR_TIME_FORMAT).to_string())
            .unwrap_or_default();
        format!("{}\n{}\n{}", self.name, self.source_locator, created_at)
    }

    /// Returns `None` when the first line is blank.
    pub fn parse(contents: &str) -> Option<Self> {
        let mut lines = contents.trim().lines();
        let name = lines.next()?.trim().to_string();
        if name.is_empty() {
            return None;
        }
        let source_locator = lines.next().unwrap_or_default().trim().to_string();
        let created_at = lines
            .next()
            .and_then(|line| NaiveDateTime::parse_from_str(line.trim(), SIDECAR_TIME_FORMAT).ok())
            .map(|naive| naive.and_utc());
        Some(Self {
            name,
            source_locator,
            created_at,
        })
    }

    /// Missing or unreadable files are treated like an empty sidecar.
    pub fn read(path: &Path) -> Option<Self> {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|contents| Self::parse(&contents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_all_three_lines() {
        let sidecar = ItemSidecar::parse("Cowboy Bebop\nmagnet:?xt=urn:btih:abc\n2024-03-01 12:30:00\n")
            .unwrap();
        assert_eq!(sidecar.name, "Cowboy Bebop");
        assert_eq!(sidecar.source_locator, "magnet:?xt=urn:btih:abc");
        assert_eq!(
            sidecar.created_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap())
        );
    }

    #[test]
    fn name_only_is_enough() {
        let sidecar = ItemSidecar::parse("Trigun").unwrap();
        assert_eq!(sidecar.name, "Trigun");
        assert!(sidecar.source_locator.is_empty());
        assert!(sidecar.created_at.is_none());
    }

    #[test]
    fn blank_contents_are_ignored() {
        assert!(ItemSidecar::parse("  \n").is_none());
    }

    #[test]
    fn render_matches_parse() {
        let sidecar = ItemSidecar {
            name: "Akira".into(),
            source_locator: "magnet:?xt=urn:btih:def".into(),
            created_at: Some(Utc.with_ymd_and_hms(2023, 12, 24, 8, 0, 5).unwrap()),
        };
        assert_eq!(
            sidecar.render(),
            "Akira\nmagnet:?xt=urn:btih:def\n2023-12-24 08:00:05"
        );
        assert_eq!(ItemSidecar::parse(&sidecar.render()), Some(sidecar));
    }
}
