use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;

use crate::layout::{rendition_playlist_name, MASTER_PLAYLIST_NAME};
use crate::rendition::{Rendition, UnknownRendition};

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error(transparent)]
    UnknownRendition(#[from] UnknownRendition),
    #[error("failed to write master playlist {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type PlaylistResult<T> = Result<T, PlaylistError>;

/// Renders the adaptive master playlist, one stream entry per rendition in
/// the given order.
pub fn render_master_playlist(renditions: &[Rendition]) -> String {
    let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n\n");
    for rendition in renditions {
        let profile = rendition.profile();
        let _ = writeln!(
            playlist,
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}",
            profile.bandwidth,
            profile.resolution()
        );
        let _ = writeln!(playlist, "{}", rendition_playlist_name(*rendition));
    }
    playlist
}

/// Name-based entry point; any name outside the rendition table rejects the
/// whole playlist.
pub fn render_master_playlist_for<I, S>(names: I) -> PlaylistResult<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let renditions = Rendition::resolve_strict(names)?;
    Ok(render_master_playlist(&renditions))
}

pub async fn write_master_playlist(
    output_dir: &Path,
    renditions: &[Rendition],
) -> PlaylistResult<PathBuf> {
    let path = output_dir.join(MASTER_PLAYLIST_NAME);
    fs::write(&path, render_master_playlist(renditions))
        .await
        .map_err(|source| PlaylistError::Io {
            source,
            path: path.clone(),
        })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_input_order() {
        let playlist = render_master_playlist(&[Rendition::P480, Rendition::P720]);
        assert_eq!(
            playlist,
            "#EXTM3U\n#EXT-X-VERSION:3\n\n\
             #EXT-X-STREAM-INF:BANDWIDTH=1000000,RESOLUTION=854x480\n480p.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720\n720p.m3u8\n"
        );
    }

    #[test]
    fn empty_rendition_set_has_header_only() {
        let playlist = render_master_playlist(&[]);
        assert_eq!(playlist, "#EXTM3U\n#EXT-X-VERSION:3\n\n");
        assert!(!playlist.contains("#EXT-X-STREAM-INF"));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = render_master_playlist_for(["720p", "2160p"]).unwrap_err();
        assert!(matches!(err, PlaylistError::UnknownRendition(_)));
    }

    #[tokio::test]
    async fn writes_master_into_output_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_master_playlist(dir.path(), &[Rendition::P360])
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("master.m3u8"));
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.ends_with("RESOLUTION=640x360\n360p.m3u8\n"));
    }
}
