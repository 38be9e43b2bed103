//! End-to-end store lifecycle over a temp directory and the simulated API
//!
//! Opens a store, mirrors, syncs, compares and verifies, checking the
//! persisted lockfile, manifest and snapshots along the way.
//!
//! Run with:
//!   cargo test --test store_lifecycle

use std::sync::Arc;
use std::time::Duration;

use ucd_store::lockfile::{read_lockfile, read_manifest, read_snapshot, write_manifest};
use ucd_store::ops::{
    compare, get_file, list_files, mirror, sync, verify, CompareOptions, FileOptions, MirrorOptions,
    SyncOptions,
};
use ucd_store::{
    Bridge, ConflictStrategy, FilterConfig, NodeBridge, OpenOptions, SimulatedUcdApi, StoreConfig,
    StoreContext, StoreError,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two published versions sharing `Blocks.txt`, differing in `Scripts.txt`.
fn published_api() -> Arc<SimulatedUcdApi> {
    let api = SimulatedUcdApi::new();
    api.add_version(
        "15.1.0",
        &[
            ("Blocks.txt", "0000..007F; Basic Latin\n"),
            ("Scripts.txt", "0041..005A ; Latin\n"),
            ("auxiliary/GraphemeBreakTest.txt", "÷ 0020 ÷\n"),
            ("Unihan.zip", "PK"),
        ],
    );
    api.add_version(
        "16.0.0",
        &[
            ("Blocks.txt", "0000..007F; Basic Latin\n"),
            ("Scripts.txt", "0041..005A ; Latin\n1E030..1E06D ; Cyrillic\n"),
            ("auxiliary/GraphemeBreakTest.txt", "÷ 0020 ÷\n"),
            ("emoji/emoji-data.txt", "1F600 ; Emoji\n"),
            ("Unihan.zip", "PK"),
        ],
    );
    Arc::new(api)
}

fn config(dir: &tempfile::TempDir) -> StoreConfig {
    StoreConfig::new(dir.path())
}

fn bridge(dir: &tempfile::TempDir) -> Bridge {
    Bridge::Node(NodeBridge::new(dir.path()))
}

async fn open(dir: &tempfile::TempDir, api: &Arc<SimulatedUcdApi>, options: OpenOptions) -> StoreContext {
    StoreContext::open(config(dir), api.clone(), bridge(dir), options)
        .await
        .expect("open store")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_bootstrap_mirror_and_read_back() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let api = published_api();
    let ctx = open(&dir, &api, OpenOptions::default()).await;
    assert_eq!(ctx.versions(), ["16.0.0", "15.1.0"]);

    let report = mirror(&ctx, &MirrorOptions::default()).await.unwrap();
    assert_eq!(report.summary.versions_processed, 2);
    // Unihan.zip is excluded by default.
    assert_eq!(report.version("16.0.0").unwrap().counts.total_files, 4);
    assert_eq!(report.version("15.1.0").unwrap().counts.total_files, 3);
    assert_eq!(report.summary.counts.failed, 0);
    assert!(!dir.path().join("16.0.0/Unihan.zip").exists());

    let lockfile = read_lockfile(ctx.bridge(), ".ucd-store.lock").await.unwrap();
    let entry = &lockfile.versions["16.0.0"];
    assert_eq!(entry.file_count, 4);
    assert_eq!(entry.path, "16.0.0/snapshot.json");
    let snapshot = read_snapshot(ctx.bridge(), &entry.path).await.unwrap();
    assert_eq!(snapshot.unicode_version, "16.0.0");
    assert_eq!(snapshot.total_size(), entry.total_size);

    let files = list_files(&ctx, "16.0.0", &FileOptions::default()).await.unwrap();
    assert_eq!(
        files,
        vec![
            "Blocks.txt",
            "Scripts.txt",
            "auxiliary/GraphemeBreakTest.txt",
            "emoji/emoji-data.txt",
        ]
    );

    let requests_before = api.file_requests();
    let content = get_file(&ctx, "16.0.0", "emoji/emoji-data.txt", &FileOptions::default())
        .await
        .unwrap();
    assert_eq!(content, "1F600 ; Emoji\n");
    assert_eq!(api.file_requests(), requests_before);
}

#[tokio::test]
async fn test_mirror_is_idempotent_and_force_overwrites() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let api = published_api();
    let ctx = open(&dir, &api, OpenOptions::versions(["16.0.0"])).await;

    let first = mirror(&ctx, &MirrorOptions::default()).await.unwrap();
    assert_eq!(first.summary.counts.downloaded, 4);
    let blocks_path = dir.path().join("16.0.0/Blocks.txt");
    let original = std::fs::read_to_string(&blocks_path).unwrap();

    let second = mirror(&ctx, &MirrorOptions::default()).await.unwrap();
    assert_eq!(second.summary.counts.downloaded, 0);
    assert_eq!(second.summary.counts.skipped, 4);
    assert_eq!(std::fs::read_to_string(&blocks_path).unwrap(), original);

    std::fs::write(&blocks_path, "local edit").unwrap();
    let forced = mirror(
        &ctx,
        &MirrorOptions {
            force: true,
            ..MirrorOptions::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(forced.summary.counts.downloaded, 4);
    assert_eq!(forced.summary.counts.skipped, 0);
    assert_eq!(std::fs::read_to_string(&blocks_path).unwrap(), original);
}

#[tokio::test]
async fn test_mirror_isolates_a_missing_file() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let api = SimulatedUcdApi::new();
    api.add_version("16.0.0", &[("A.txt", "a"), ("B.txt", "b"), ("C.txt", "c")]);
    api.fail_file("16.0.0", "B.txt", 404);
    let api = Arc::new(api);
    let ctx = open(&dir, &api, OpenOptions::versions(["16.0.0"])).await;

    let report = mirror(&ctx, &MirrorOptions::default()).await.unwrap();
    let version = report.version("16.0.0").unwrap();
    assert_eq!(version.counts.downloaded, 2);
    assert_eq!(version.counts.failed, 1);
    assert_eq!(version.counts.skipped, 0);
    assert_eq!(version.errors.len(), 1);
    assert_eq!(version.errors[0].file, "B.txt");

    let lockfile = read_lockfile(ctx.bridge(), ".ucd-store.lock").await.unwrap();
    assert_eq!(lockfile.versions["16.0.0"].file_count, 2);
}

#[tokio::test]
async fn test_mirror_respects_concurrency_limit() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let api = SimulatedUcdApi::new().with_latency(Duration::from_millis(5));
    let files: Vec<(String, String)> = (0..20)
        .map(|i| (format!("data/File{:02}.txt", i), format!("{}", i)))
        .collect();
    let refs: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
    api.add_version("16.0.0", &refs);
    let api = Arc::new(api);
    let ctx = open(&dir, &api, OpenOptions::versions(["16.0.0"])).await;

    let report = mirror(&ctx, &MirrorOptions::default()).await.unwrap();
    assert_eq!(report.summary.counts.downloaded, 20);
    assert!(api.max_in_flight() <= 5);
    assert!(api.max_in_flight() >= 1);
}

#[tokio::test]
async fn test_strict_reopen_and_overwrite() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let api = published_api();
    open(&dir, &api, OpenOptions::versions(["16.0.0", "15.1.0"])).await;

    let reordered = open(&dir, &api, OpenOptions::versions(["15.1.0", "16.0.0"])).await;
    assert_eq!(reordered.versions(), ["16.0.0", "15.1.0"]);

    let err = StoreContext::open(config(&dir), api.clone(), bridge(&dir), OpenOptions::versions(["16.0.0"]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { .. }));

    let overwritten = open(
        &dir,
        &api,
        OpenOptions::versions(["16.0.0"]).with_strategy(ConflictStrategy::Overwrite),
    )
    .await;
    assert_eq!(overwritten.versions(), ["16.0.0"]);
    assert_eq!(
        read_manifest(overwritten.bridge(), ".ucd-store.json").await.unwrap(),
        vec!["16.0.0"]
    );
}

#[tokio::test]
async fn test_manifest_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(&dir);
    let versions = vec!["15.0.0".to_string(), "16.0.0".to_string(), "15.1.0".to_string()];

    write_manifest(&bridge, "manifest.json", &versions).await.unwrap();
    let mut read = read_manifest(&bridge, "manifest.json").await.unwrap();
    read.sort();
    let mut expected = versions.clone();
    expected.sort();
    assert_eq!(read, expected);
}

#[tokio::test]
async fn test_sync_prunes_unavailable_and_orphans() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let api = published_api();
    let mut ctx = open(&dir, &api, OpenOptions::default()).await;

    let first = sync(&mut ctx, &SyncOptions::default()).await.unwrap();
    assert_eq!(first.added, vec!["16.0.0", "15.1.0"]);

    std::fs::write(dir.path().join("15.1.0/Orphan.txt"), "orphan").unwrap();
    api.unlist_version("16.0.0");

    let options = SyncOptions {
        remove_unavailable: true,
        clean_orphaned: true,
        ..SyncOptions::default()
    };
    let result = sync(&mut ctx, &options).await.unwrap();
    assert_eq!(result.removed, vec!["16.0.0"]);
    assert_eq!(result.unchanged, vec!["15.1.0"]);
    assert_eq!(result.versions, vec!["15.1.0"]);
    assert_eq!(result.removed_files["15.1.0"], vec!["Orphan.txt"]);
    assert!(result.mirror_report.is_none());

    let lockfile = read_lockfile(ctx.bridge(), ".ucd-store.lock").await.unwrap();
    assert!(!lockfile.versions.contains_key("16.0.0"));
    // Files of a removed version stay unless deletion was requested.
    assert!(dir.path().join("16.0.0/Blocks.txt").exists());
}

#[tokio::test]
async fn test_compare_mirrored_versions() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let api = published_api();
    let ctx = open(&dir, &api, OpenOptions::default()).await;
    mirror(&ctx, &MirrorOptions::default()).await.unwrap();

    let requests_before = api.file_requests();
    let result = compare(&ctx, "15.1.0", "16.0.0", &CompareOptions::default()).await.unwrap();
    assert_eq!(result.added, vec!["emoji/emoji-data.txt"]);
    assert!(result.removed.is_empty());
    assert_eq!(result.modified, vec!["Scripts.txt"]);
    assert_eq!(result.unchanged, 2);
    assert_eq!(result.changes.len(), 1);
    assert_eq!(api.file_requests(), requests_before);

    let reverse = compare(&ctx, "16.0.0", "15.1.0", &CompareOptions::default()).await.unwrap();
    assert_eq!(reverse.removed, result.added);
    assert_eq!(reverse.added, result.removed);
}

#[tokio::test]
async fn test_verify_after_remote_drops_a_version() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let api = published_api();
    let ctx = open(&dir, &api, OpenOptions::versions(["16.0.0"])).await;

    let result = verify(&ctx).await.unwrap();
    assert!(result.valid);
    assert_eq!(result.extra_versions, vec!["15.1.0"]);

    api.unlist_version("16.0.0");
    let result = verify(&ctx).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.missing_versions, vec!["16.0.0"]);
}

#[tokio::test]
async fn test_custom_global_filters_apply_everywhere() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let api = published_api();
    let config = config(&dir).with_filters(FilterConfig {
        include: Vec::new(),
        exclude: vec!["auxiliary/".to_string()],
        disable_default_exclusions: true,
    });
    let ctx = StoreContext::open(config, api.clone(), bridge(&dir), OpenOptions::versions(["16.0.0"]))
        .await
        .unwrap();

    let report = mirror(&ctx, &MirrorOptions::default()).await.unwrap();
    assert_eq!(report.summary.counts.total_files, 4);
    assert!(dir.path().join("16.0.0/Unihan.zip").exists());
    assert!(!dir.path().join("16.0.0/auxiliary").exists());

    let err = get_file(&ctx, "16.0.0", "auxiliary/GraphemeBreakTest.txt", &FileOptions::with_api())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::FilterRejected(_)));
}
