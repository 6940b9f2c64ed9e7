#![cfg(unix)]

use std::fs;

use reelcast_core::restore::FALLBACK_NAME_PREFIX;
use reelcast_core::{Catalog, ItemId, ItemStatus, Rendition, Restorer};
use tempfile::tempdir;

mod common;

use common::test_config;

fn publish(root: &std::path::Path, id: &str, renditions: &[&str], sidecar: Option<&str>) {
    let dir = root.join("hls").join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("master.m3u8"), "#EXTM3U\n").unwrap();
    for rendition in renditions {
        fs::write(dir.join(format!("{rendition}.m3u8")), "#EXTM3U\n").unwrap();
    }
    if let Some(contents) = sidecar {
        fs::write(dir.join("metadata.txt"), contents).unwrap();
    }
}

#[test]
fn restores_published_item_with_only_existing_renditions() {
    let dir = tempdir().unwrap();
    publish(
        dir.path(),
        "1700000000000000001",
        &["720p"],
        Some("Night of the Living Dead\nmagnet:?xt=urn:btih:abc\n2024-03-01 12:30:00\n"),
    );
    let catalog = Catalog::new();

    let report = Restorer::new(&test_config(dir.path())).restore_into(&catalog);

    assert_eq!(report.published, 1);
    assert_eq!(report.intake, 0);
    let record = catalog
        .get(&ItemId::from("1700000000000000001"))
        .unwrap()
        .snapshot();
    assert_eq!(record.status, ItemStatus::Ready);
    assert_eq!(record.progress, 100);
    assert_eq!(record.name, "Night of the Living Dead");
    assert_eq!(record.source_locator, "magnet:?xt=urn:btih:abc");
    assert_eq!(record.produced_renditions, vec![Rendition::P720]);
    assert_eq!(record.rendition_urls.len(), 1);
    assert_eq!(
        record.rendition_urls[&Rendition::P720],
        "/hls/1700000000000000001/720p.m3u8"
    );
    assert_eq!(
        record.stream_manifest_path.as_deref(),
        Some("/hls/1700000000000000001/master.m3u8")
    );
    assert!(record.source_media_path.is_none());
    assert_eq!(
        record.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        "2024-03-01 12:30:00"
    );
}

#[test]
fn published_item_without_sidecar_gets_fallback_name() {
    let dir = tempdir().unwrap();
    publish(dir.path(), "1700000000000000002", &["480p", "360p"], None);
    let catalog = Catalog::new();

    Restorer::new(&test_config(dir.path())).restore_into(&catalog);

    let record = catalog
        .get(&ItemId::from("1700000000000000002"))
        .unwrap()
        .snapshot();
    assert_eq!(record.name, format!("{FALLBACK_NAME_PREFIX}17000000"));
    assert_eq!(
        record.produced_renditions,
        vec![Rendition::P480, Rendition::P360]
    );
}

#[test]
fn directories_without_master_playlist_are_ignored() {
    let dir = tempdir().unwrap();
    let partial = dir.path().join("hls").join("1700000000000000003");
    fs::create_dir_all(&partial).unwrap();
    fs::write(partial.join("720p.m3u8"), "#EXTM3U\n").unwrap();
    let catalog = Catalog::new();

    let report = Restorer::new(&test_config(dir.path())).restore_into(&catalog);

    assert_eq!(report.total(), 0);
    assert!(catalog.is_empty());
}

#[test]
fn restores_downloaded_media_as_ready() {
    let dir = tempdir().unwrap();
    let download = dir.path().join("downloads").join("foo");
    fs::create_dir_all(download.join("extras")).unwrap();
    fs::write(download.join("readme.txt"), "hello").unwrap();
    fs::write(download.join("extras").join("movie.MKV"), "video").unwrap();
    fs::create_dir_all(dir.path().join("downloads").join("empty")).unwrap();
    let config = test_config(dir.path());
    let catalog = Catalog::new();

    let report = Restorer::new(&config).restore_into(&catalog);

    assert_eq!(report.intake, 1);
    let records = catalog.list();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.name, "foo");
    assert_eq!(record.status, ItemStatus::Ready);
    assert_eq!(record.progress, 100);
    assert_eq!(
        record.source_media_path.as_deref(),
        Some(download.join("extras").join("movie.MKV").as_path())
    );
    assert_eq!(record.requested_renditions, Rendition::ALL.to_vec());
    assert!(record.produced_renditions.is_empty());
    assert!(record.stream_manifest_path.is_none());
}

#[test]
fn download_matching_published_name_is_not_duplicated() {
    let dir = tempdir().unwrap();
    publish(
        dir.path(),
        "1700000000000000004",
        &["720p"],
        Some("foo\nmagnet:?xt=urn:btih:def\n"),
    );
    let download = dir.path().join("downloads").join("foo");
    fs::create_dir_all(&download).unwrap();
    fs::write(download.join("movie.mp4"), "video").unwrap();
    let catalog = Catalog::new();

    let report = Restorer::new(&test_config(dir.path())).restore_into(&catalog);

    assert_eq!(report.published, 1);
    assert_eq!(report.intake, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(catalog.len(), 1);
}

#[test]
fn missing_roots_restore_nothing() {
    let dir = tempdir().unwrap();
    let catalog = Catalog::new();

    let report = Restorer::new(&test_config(dir.path())).restore_into(&catalog);

    assert_eq!(report.total(), 0);
    assert!(catalog.is_empty());
}
