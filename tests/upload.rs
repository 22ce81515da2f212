use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use league_feed::coordinator::MutationCoordinator;
use league_feed::error::SyncError;
use league_feed::fake_api::FakeApi;
use league_feed::models::{Article, ArticlePayload};
use league_feed::store::CollectionStore;
use league_feed::transport::{ApiRequest, Transport};
use league_feed::upload::{IMAGE_FIELD, StagedImage};

const MAX_UPLOAD: u64 = 1024;

fn temp_file(name: &str, len: usize) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("league_feed_upload_{}", std::process::id()));
    fs::create_dir_all(&dir).expect("temp dir should be writable");
    let path = dir.join(name);
    fs::write(&path, vec![7u8; len]).expect("temp file should write");
    path
}

/// Records where each staged image lived while the upload ran.
struct RecordingUploads {
    inner: FakeApi,
    fail: bool,
    seen: Mutex<Vec<(PathBuf, bool)>>,
}

impl Transport for RecordingUploads {
    fn send(&self, request: &ApiRequest) -> Result<Value, SyncError> {
        self.inner.send(request)
    }

    fn upload(&self, image: &StagedImage) -> Result<String, SyncError> {
        let path = image.path().to_path_buf();
        let existed = path.exists();
        self.seen.lock().expect("seen lock").push((path, existed));
        if self.fail {
            return Err(SyncError::network("connection reset"));
        }
        self.inner.upload(image)
    }
}

fn payload_with_image(path: PathBuf) -> ArticlePayload {
    ArticlePayload {
        title: "Photo story".to_string(),
        body: "Pictures from the weekend".to_string(),
        author: "Newsroom".to_string(),
        image_url: None,
        pending_image: Some(path),
    }
}

fn run_create(fail: bool, image: PathBuf) -> (Result<Article, SyncError>, Vec<(PathBuf, bool)>) {
    let transport = Arc::new(RecordingUploads {
        inner: FakeApi::new(),
        fail,
        seen: Mutex::new(Vec::new()),
    });
    let shared: Arc<dyn Transport> = transport.clone();
    let articles = MutationCoordinator::<Article>::new(CollectionStore::new(), shared, MAX_UPLOAD);
    let result = articles
        .create(payload_with_image(image))
        .and_then(|created| created.ok_or_else(|| SyncError::network("no record returned")));
    let seen = transport.seen.lock().expect("seen lock").clone();
    (result, seen)
}

#[test]
fn staged_copy_is_released_on_drop() {
    let source = temp_file("badge.PNG", 64);
    let staged = StagedImage::acquire(&source, MAX_UPLOAD).expect("png should stage");
    let staged_path = staged.path().to_path_buf();

    assert_ne!(staged_path, source);
    assert!(staged_path.exists());
    assert_eq!(staged.file_name(), "badge.PNG");
    assert_eq!(staged.mime(), "image/png");
    assert_eq!(staged.len(), 64);
    assert_eq!(staged.read_bytes().expect("staged bytes").len(), 64);

    drop(staged);
    assert!(!staged_path.exists());
    assert!(source.exists(), "the original file is never touched");
}

#[test]
fn oversized_or_unknown_files_are_rejected() {
    let big = temp_file("huge.jpg", 2048);
    let err = StagedImage::acquire(&big, MAX_UPLOAD).expect_err("file over limit");
    assert!(err.validation().and_then(|v| v.for_field(IMAGE_FIELD)).is_some());

    let pdf = temp_file("scan.pdf", 10);
    let err = StagedImage::acquire(&pdf, MAX_UPLOAD).expect_err("pdf is not an image");
    assert!(err.to_string().contains("unsupported image type"));

    let missing = std::env::temp_dir().join("league_feed_missing_image.gif");
    let err = StagedImage::acquire(&missing, MAX_UPLOAD).expect_err("missing file");
    assert!(err.validation().is_some());
}

#[test]
fn staged_copy_is_gone_after_successful_create() {
    let (result, seen) = run_create(false, temp_file("ok.webp", 32));
    let article = result.expect("create should succeed");

    assert!(article.image_url.is_some());
    assert_eq!(seen.len(), 1);
    let (path, existed) = &seen[0];
    assert!(existed, "staged copy should exist during the upload");
    assert!(!path.exists(), "staged copy should be removed afterwards");
}

#[test]
fn staged_copy_is_gone_after_failed_upload() {
    let (result, seen) = run_create(true, temp_file("fail.gif", 32));
    let err = result.expect_err("upload failure should surface");

    assert!(matches!(err, SyncError::Network { .. }));
    assert_eq!(seen.len(), 1);
    let (path, existed) = &seen[0];
    assert!(existed);
    assert!(!path.exists());
}

#[cfg(target_os = "linux")]
#[test]
fn copy_failing_part_way_leaves_nothing_staged() {
    let mem = std::path::Path::new("/proc/self/mem");
    if !mem.exists() {
        return;
    }
    let dir = std::env::temp_dir().join(format!("league_feed_partial_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("temp dir should be writable");
    // Opens and stats as a regular file, but reading it from offset zero fails.
    let source = dir.join("unreadable.png");
    std::os::unix::fs::symlink(mem, &source).expect("symlink should be created");
    let staging = dir.join("staging");

    let err = StagedImage::acquire_in(&staging, &source, MAX_UPLOAD)
        .expect_err("reading the source should fail");
    assert!(err.validation().and_then(|v| v.for_field(IMAGE_FIELD)).is_some());
    let leftovers = fs::read_dir(&staging)
        .expect("staging dir was created")
        .count();
    assert_eq!(leftovers, 0);
}
