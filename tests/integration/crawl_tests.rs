//! Integration tests for the crawler
//!
//! These tests serve images from wiremock mock servers and feed pages from
//! an in-memory feed, and run whole crawls end-to-end.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use makeup_harvest::config::{Config, DedupPolicy};
use makeup_harvest::extract::{Category, DerivedImages, ExtractError, FeatureExtractor};
use makeup_harvest::feed::{FeedError, FeedPage, FeedSource, Target};
use makeup_harvest::state::{ProgressReporter, Stage};
use makeup_harvest::storage::{read_log, TargetLayout};
use makeup_harvest::crawler::CrawlContext;
use makeup_harvest::Coordinator;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves fixed pages keyed by cursor; the first page uses the empty key
struct PagedFeed {
    pages: HashMap<String, Value>,
}

impl PagedFeed {
    fn new(pages: &[(&str, Value)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(cursor, page)| (cursor.to_string(), page.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl FeedSource for PagedFeed {
    async fn fetch_page(&self, _: &Target, cursor: Option<&str>) -> Result<FeedPage, FeedError> {
        let page = self
            .pages
            .get(cursor.unwrap_or(""))
            .cloned()
            .unwrap_or_else(|| json!({}));
        Ok(FeedPage::from_json(&page))
    }
}

/// Serves `first` on the first call; on the next call it waits for one
/// stored download, presses 'e' and serves `second`
struct ExtractOnSecondPage {
    first: Value,
    second: Value,
    ctx: OnceLock<Arc<CrawlContext>>,
}

#[async_trait]
impl FeedSource for ExtractOnSecondPage {
    async fn fetch_page(&self, _: &Target, cursor: Option<&str>) -> Result<FeedPage, FeedError> {
        if cursor.is_none() {
            return Ok(FeedPage::from_json(&self.first));
        }
        if let Some(ctx) = self.ctx.get() {
            for _ in 0..500 {
                if ctx.progress.downloaded() >= 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            ctx.stage.request_extracting();
        }
        Ok(FeedPage::from_json(&self.second))
    }
}

/// Produces a full derived set for files starting with "good" (or for every
/// file when `all` is set) and fails otherwise
struct StubExtractor {
    all: bool,
}

impl FeatureExtractor for StubExtractor {
    fn extract(&self, source: &Path, _: &DynamicImage) -> Result<DerivedImages, ExtractError> {
        let good = self.all
            || source
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("good"));
        if !good {
            return Err(ExtractError::NoFace);
        }
        let pixel = DynamicImage::ImageRgb8(RgbImage::new(3, 3));
        DerivedImages::from_ordered(vec![pixel; Category::COUNT])
    }
}

fn png_bytes() -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::new(8, 8))
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("Failed to encode PNG");
    buffer.into_inner()
}

fn image_item(base: &str, name: &str) -> Value {
    json!({
        "media_type": 1,
        "code": format!("C{}", name),
        "id": name,
        "image_versions2": { "candidates": [ { "url": format!("{}/{}.jpg", base, name) } ] }
    })
}

/// Mounts one image that must be fetched exactly `times` times
async fn mount_image(server: &MockServer, name: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/{}.jpg", name)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .expect(times)
        .mount(server)
        .await;
}

fn create_test_config(base: &Path, limit: u64, dedup: DedupPolicy) -> Config {
    let mut config = Config::default();
    config.output.base_path = base.to_path_buf();
    config.crawler.image_limit = limit;
    config.crawler.dedup = dedup;
    config.crawler.threads = 1;
    config.crawler.processes = 2;
    config
}

fn build_coordinator(
    config: Config,
    targets: Vec<Target>,
    feed: PagedFeed,
    extractor: StubExtractor,
    initial: Stage,
) -> Coordinator {
    Coordinator::new(config, targets, Arc::new(feed), Arc::new(extractor), initial)
        .expect("Failed to create coordinator")
        .with_progress(ProgressReporter::hidden(0))
}

fn raw_files(layout: &TargetLayout) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(layout.full_dir())
        .expect("Failed to list full/")
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_limit_cuts_off_download_and_extracts() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_image(&server, "u1", 1).await;
    mount_image(&server, "u2", 1).await;
    mount_image(&server, "u3", 1).await;
    mount_image(&server, "u4", 0).await;

    let feed = PagedFeed::new(&[
        (
            "",
            json!({
                "items": [image_item(&base, "u1"), image_item(&base, "u2")],
                "more_available": true,
                "next_max_id": "p2"
            }),
        ),
        (
            "p2",
            json!({
                "items": [image_item(&base, "u2"), image_item(&base, "u3"), image_item(&base, "u4")],
                "more_available": false
            }),
        ),
    ]);

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 3, DedupPolicy::PerTarget);
    let coordinator = build_coordinator(
        config,
        vec![Target::hashtag("makeup")],
        feed,
        StubExtractor { all: true },
        Stage::Downloading,
    );

    let summary = coordinator.run().await;

    assert_eq!(summary.stage, Stage::Extracting);
    assert_eq!(summary.downloaded, 3);
    assert_eq!(summary.extracted, 3);
    assert!(summary.failed_targets.is_empty());

    let layout = TargetLayout::new(dir.path(), "makeup");
    assert_eq!(
        read_log(&layout.log_path()).unwrap(),
        vec!["u1.png", "u2.png", "u3.png"]
    );
    assert_eq!(raw_files(&layout), vec!["u1.png", "u2.png", "u3.png"]);
    assert_eq!(coordinator.context().retained.snapshot("makeup").len(), 3);

    for category in Category::ALL {
        assert!(layout.category_dir(category).join("u3.png").exists());
    }
}

#[tokio::test]
async fn test_carousel_downloads_only_image_sub_items() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_image(&server, "s1", 1).await;

    let feed = PagedFeed::new(&[(
        "",
        json!({
            "items": [{
                "media_type": 8,
                "code": "car",
                "id": "10",
                "carousel_media": [
                    image_item(&base, "s1"),
                    { "media_type": 2, "id": "11",
                      "video_versions": [ { "url": format!("{}/s2.mp4", base) } ] }
                ]
            }],
            "more_available": false
        }),
    )]);

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 0, DedupPolicy::PerTarget);
    let coordinator = build_coordinator(
        config,
        vec![Target::user("someone")],
        feed,
        StubExtractor { all: true },
        Stage::Downloading,
    );

    let summary = coordinator.run().await;

    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.stage, Stage::Downloading);
    let layout = TargetLayout::new(dir.path(), "someone");
    assert_eq!(read_log(&layout.log_path()).unwrap(), vec!["s1.png"]);
}

#[tokio::test]
async fn test_resume_skips_logged_images() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_image(&server, "a", 0).await;
    mount_image(&server, "b", 0).await;
    mount_image(&server, "c", 1).await;

    let dir = TempDir::new().unwrap();
    let layout = TargetLayout::new(dir.path(), "makeup");
    layout.ensure().unwrap();
    std::fs::write(layout.log_path(), "a.png\nb.png\n").unwrap();

    let feed = PagedFeed::new(&[(
        "",
        json!({
            "items": [image_item(&base, "a"), image_item(&base, "c"), image_item(&base, "b")],
            "more_available": false
        }),
    )]);

    let config = create_test_config(dir.path(), 0, DedupPolicy::PerTarget);
    let coordinator = build_coordinator(
        config,
        vec![Target::hashtag("makeup")],
        feed,
        StubExtractor { all: true },
        Stage::Downloading,
    );

    let summary = coordinator.run().await;

    assert_eq!(summary.downloaded, 1);
    assert_eq!(
        read_log(&layout.log_path()).unwrap(),
        vec!["a.png", "b.png", "c.png"]
    );
}

#[tokio::test]
async fn test_global_dedup_across_targets() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_image(&server, "shared", 1).await;

    let page = json!({
        "items": [image_item(&base, "shared")],
        "more_available": false
    });
    let feed = PagedFeed::new(&[("", page)]);

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 0, DedupPolicy::Global);
    let coordinator = build_coordinator(
        config,
        vec![Target::hashtag("makeup"), Target::hashtag("lips")],
        feed,
        StubExtractor { all: true },
        Stage::Downloading,
    );

    let summary = coordinator.run().await;

    assert_eq!(summary.downloaded, 1);
    let logged: usize = ["makeup", "lips"]
        .iter()
        .map(|t| read_log(&TargetLayout::new(dir.path(), t).log_path()).unwrap().len())
        .sum();
    assert_eq!(logged, 1);
}

#[tokio::test]
async fn test_extract_only_run_counts_good_images() {
    let dir = TempDir::new().unwrap();
    let layout = TargetLayout::new(dir.path(), "makeup");
    layout.ensure().unwrap();
    RgbImage::new(6, 6).save(layout.raw_path("good.png")).unwrap();
    RgbImage::new(6, 6).save(layout.raw_path("noface.png")).unwrap();

    let config = create_test_config(dir.path(), 0, DedupPolicy::PerTarget);
    let coordinator = build_coordinator(
        config,
        vec![Target::hashtag("makeup")],
        PagedFeed::new(&[]),
        StubExtractor { all: false },
        Stage::Extracting,
    );

    let summary = coordinator.run().await;

    assert_eq!(summary.extracted, 1);
    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.stage, Stage::Extracting);
    for category in Category::ALL {
        let dir = layout.category_dir(category);
        assert!(dir.join("good.png").exists());
        assert!(!dir.join("noface.png").exists());
    }
    // The log is untouched when downloading is skipped
    assert!(!layout.log_path().exists());
}

#[tokio::test]
async fn test_extract_key_mid_crawl_hands_off_to_extraction() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_image(&server, "k1", 1).await;
    // Still in flight when the stage changes
    Mock::given(method("GET"))
        .and(path("/k2.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes())
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;
    mount_image(&server, "q1", 0).await;

    let feed = Arc::new(ExtractOnSecondPage {
        first: json!({
            "items": [image_item(&base, "k1"), image_item(&base, "k2")],
            "more_available": true,
            "next_max_id": "p2"
        }),
        second: json!({
            "items": [image_item(&base, "q1")],
            "more_available": false
        }),
        ctx: OnceLock::new(),
    });

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 0, DedupPolicy::PerTarget);
    let coordinator = Coordinator::new(
        config,
        vec![Target::hashtag("makeup")],
        Arc::clone(&feed) as Arc<dyn FeedSource>,
        Arc::new(StubExtractor { all: true }),
        Stage::Downloading,
    )
    .expect("Failed to create coordinator")
    .with_progress(ProgressReporter::hidden(0));
    let _ = feed.ctx.set(Arc::clone(coordinator.context()));

    let summary = coordinator.run().await;

    assert_eq!(summary.stage, Stage::Extracting);
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.extracted, 1);

    let layout = TargetLayout::new(dir.path(), "makeup");
    assert_eq!(read_log(&layout.log_path()).unwrap(), vec!["k1.png"]);
    // No stray k2 download and no leftover .part file
    assert_eq!(raw_files(&layout), vec!["k1.png"]);

    let ctx = coordinator.context();
    assert_eq!(ctx.retained.snapshot("makeup"), vec!["k1.png"]);
    assert_eq!(ctx.progress.max(), 1);
    assert_eq!(ctx.progress.index(), 1);
    for category in Category::ALL {
        assert!(layout.category_dir(category).join("k1.png").exists());
    }
}
