//! End-to-end pipeline scenarios against a scripted backend gateway.

use async_trait::async_trait;
use sigcap_desktop::api::{BackendGateway, UrlCheck};
use sigcap_desktop::config::SigCapConfig;
use sigcap_desktop::error::SigCapError;
use sigcap_desktop::host::HostWindow;
use sigcap_desktop::upload_queue::{
    DuplicateDecision, EnqueueRequest, UploadQueue, UploadStatus,
};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

/// Scripted gateway: queued per-call check results (falling back to a
/// default), fixed create/upload outcomes, and a call log.
struct MockGateway {
    checks: Mutex<VecDeque<Result<UrlCheck, String>>>,
    default_check: Mutex<Result<UrlCheck, String>>,
    create: Mutex<Result<String, String>>,
    upload: Mutex<Result<String, String>>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockGateway {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            checks: Mutex::new(VecDeque::new()),
            default_check: Mutex::new(Ok(UrlCheck {
                exists: false,
                detected_link_id: None,
            })),
            create: Mutex::new(Ok("L1".to_string())),
            upload: Mutex::new(Ok("http://img/1.png".to_string())),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn push_check(&self, result: Result<UrlCheck, String>) {
        self.checks.lock().unwrap().push_back(result);
    }

    fn set_default_check(&self, result: Result<UrlCheck, String>) {
        *self.default_check.lock().unwrap() = result;
    }

    fn set_upload(&self, result: Result<String, String>) {
        *self.upload.lock().unwrap() = result;
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }
}

#[async_trait]
impl BackendGateway for MockGateway {
    async fn check_exists(&self, _url: &str, _sport_id: &str) -> Result<UrlCheck, SigCapError> {
        self.calls.lock().unwrap().push("check_exists");
        let next = self.checks.lock().unwrap().pop_front();
        let result = next.unwrap_or_else(|| self.default_check.lock().unwrap().clone());
        result.map_err(SigCapError::Api)
    }

    async fn create_link(
        &self,
        _url: &str,
        _sport_id: &str,
        _signal_id: &str,
        _assigned_user_id: &str,
    ) -> Result<String, SigCapError> {
        self.calls.lock().unwrap().push("create_link");
        self.create.lock().unwrap().clone().map_err(SigCapError::Api)
    }

    async fn upload_image(
        &self,
        file_path: &Path,
        _detected_link_id: &str,
        _bucket_name: &str,
    ) -> Result<String, SigCapError> {
        self.calls.lock().unwrap().push("upload_image");
        if !file_path.exists() {
            return Err(SigCapError::Upload(format!(
                "Failed to read screenshot '{}'",
                file_path.display()
            )));
        }
        self.upload.lock().unwrap().clone().map_err(SigCapError::Upload)
    }
}

struct RecordingHost {
    visible: AtomicBool,
    minimize_count: AtomicUsize,
}

impl RecordingHost {
    fn new(visible: bool) -> Arc<Self> {
        Arc::new(Self {
            visible: AtomicBool::new(visible),
            minimize_count: AtomicUsize::new(0),
        })
    }

    fn minimized(&self) -> usize {
        self.minimize_count.load(Ordering::SeqCst)
    }
}

impl HostWindow for RecordingHost {
    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn minimize_to_background(&self) {
        self.minimize_count.fetch_add(1, Ordering::SeqCst);
    }
}

fn make_queue(gateway: Arc<MockGateway>, host: Arc<RecordingHost>, dir: &TempDir) -> UploadQueue {
    let mut config = SigCapConfig::default();
    config.screenshots_dir = Some(dir.path().to_string_lossy().into_owned());
    UploadQueue::new(gateway, host, &config).with_minimize_grace(Duration::from_millis(10))
}

fn write_screenshot(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, b"fake png bytes").unwrap();
    path
}

fn request(file_path: PathBuf) -> EnqueueRequest {
    EnqueueRequest {
        signal_id: "sig1".to_string(),
        signal_name: "Late odds move".to_string(),
        url: "http://x.test/a".to_string(),
        bucket_name: "qa-batch-1".to_string(),
        sport_id: "s1".to_string(),
        assigned_user_id: "u1".to_string(),
        file_path,
    }
}

async fn wait_for_status(
    queue: &UploadQueue,
    item_id: u64,
    status: UploadStatus,
) -> sigcap_desktop::upload_queue::QueueItem {
    timeout(Duration::from_secs(2), async {
        loop {
            if let Some(item) = queue.get_item(item_id) {
                if item.status == status {
                    return item;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("item did not reach expected status in time")
}

async fn wait_for_prompt(queue: &UploadQueue) {
    timeout(Duration::from_secs(2), async {
        while queue.pending_prompt_count() == 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("duplicate prompt never appeared");
}

#[tokio::test]
async fn enqueue_rejects_missing_fields_without_touching_queue() {
    let gateway = MockGateway::new();
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "shot.png");

    let mut missing_signal = request(file.clone());
    missing_signal.signal_id = String::new();
    let mut missing_sport = request(file.clone());
    missing_sport.sport_id = String::new();
    let mut missing_user = request(file.clone());
    missing_user.assigned_user_id = String::new();
    let mut missing_file = request(file);
    missing_file.file_path = PathBuf::new();

    for req in [missing_signal, missing_sport, missing_user, missing_file] {
        assert_eq!(queue.enqueue(req), None);
    }

    assert!(queue.items().is_empty());
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn happy_path_creates_link_then_uploads() {
    let gateway = MockGateway::new();
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "shot.png");

    let item_id = queue.enqueue(request(file)).unwrap();
    let item = wait_for_status(&queue, item_id, UploadStatus::Success).await;

    assert_eq!(item.detected_link_id.as_deref(), Some("L1"));
    assert_eq!(item.image_url.as_deref(), Some("http://img/1.png"));
    assert!(item.error.is_none());
    assert_eq!(gateway.calls(), vec!["check_exists", "create_link", "upload_image"]);
}

#[tokio::test]
async fn check_failure_is_terminal_and_never_assumed_negative() {
    let gateway = MockGateway::new();
    gateway.set_default_check(Err("network timeout".to_string()));
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "shot.png");

    let item_id = queue.enqueue(request(file)).unwrap();
    let item = wait_for_status(&queue, item_id, UploadStatus::Error).await;

    assert!(item.error.as_deref().unwrap().contains("network timeout"));
    assert!(item.error.as_deref().unwrap().contains("URL check failed"));
    assert!(item.detected_link_id.is_none());
    assert_eq!(gateway.calls(), vec!["check_exists"]);
}

#[tokio::test]
async fn duplicate_cancel_makes_no_backend_writes() {
    let gateway = MockGateway::new();
    gateway.push_check(Ok(UrlCheck {
        exists: true,
        detected_link_id: Some("L5".to_string()),
    }));
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "shot.png");

    let item_id = queue.enqueue(request(file)).unwrap();
    wait_for_prompt(&queue).await;

    assert!(queue.resolve_duplicate(item_id, DuplicateDecision::Cancel));
    let item = wait_for_status(&queue, item_id, UploadStatus::Cancelled).await;

    assert!(item.detected_link_id.is_none());
    assert!(item.error.is_none());
    assert_eq!(gateway.count("create_link"), 0);
    assert_eq!(gateway.count("upload_image"), 0);
}

#[tokio::test]
async fn duplicate_dismiss_behaves_like_cancel() {
    let gateway = MockGateway::new();
    gateway.push_check(Ok(UrlCheck {
        exists: true,
        detected_link_id: Some("L5".to_string()),
    }));
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "shot.png");

    let item_id = queue.enqueue(request(file)).unwrap();
    wait_for_prompt(&queue).await;

    assert!(queue.dismiss_duplicate(item_id));
    let item = wait_for_status(&queue, item_id, UploadStatus::Cancelled).await;
    assert_eq!(item.status, UploadStatus::Cancelled);
}

#[tokio::test]
async fn duplicate_continue_reuses_fresh_link_id() {
    let gateway = MockGateway::new();
    // First check triggers the prompt; the re-check supplies the id the
    // item must carry
    gateway.push_check(Ok(UrlCheck {
        exists: true,
        detected_link_id: Some("stale".to_string()),
    }));
    gateway.push_check(Ok(UrlCheck {
        exists: true,
        detected_link_id: Some("L9".to_string()),
    }));
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "shot.png");

    let item_id = queue.enqueue(request(file)).unwrap();
    wait_for_prompt(&queue).await;

    assert!(queue.resolve_duplicate(item_id, DuplicateDecision::Continue));
    let item = wait_for_status(&queue, item_id, UploadStatus::Success).await;

    assert_eq!(item.detected_link_id.as_deref(), Some("L9"));
    assert_eq!(
        gateway.calls(),
        vec!["check_exists", "check_exists", "upload_image"]
    );
}

#[tokio::test]
async fn duplicate_vanished_on_recheck_falls_back_to_creation() {
    let gateway = MockGateway::new();
    gateway.push_check(Ok(UrlCheck {
        exists: true,
        detected_link_id: Some("L5".to_string()),
    }));
    gateway.push_check(Ok(UrlCheck {
        exists: false,
        detected_link_id: None,
    }));
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "shot.png");

    let item_id = queue.enqueue(request(file)).unwrap();
    wait_for_prompt(&queue).await;
    queue.resolve_duplicate(item_id, DuplicateDecision::Continue);

    let item = wait_for_status(&queue, item_id, UploadStatus::Success).await;
    assert_eq!(item.detected_link_id.as_deref(), Some("L1"));
    assert_eq!(gateway.count("create_link"), 1);
}

#[tokio::test]
async fn cancel_all_prompts_resolves_every_waiting_item() {
    let gateway = MockGateway::new();
    gateway.set_default_check(Ok(UrlCheck {
        exists: true,
        detected_link_id: Some("L5".to_string()),
    }));
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "shot.png");

    let first = queue.enqueue(request(file.clone())).unwrap();
    let second = queue.enqueue(request(file)).unwrap();

    timeout(Duration::from_secs(2), async {
        while queue.pending_prompt_count() < 2 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("both prompts should be pending");

    assert_eq!(queue.cancel_all_prompts(), 2);
    wait_for_status(&queue, first, UploadStatus::Cancelled).await;
    wait_for_status(&queue, second, UploadStatus::Cancelled).await;
}

#[tokio::test]
async fn retry_preconditions_are_noops() {
    let gateway = MockGateway::new();
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "shot.png");

    // Successful item: not retryable
    let success_id = queue.enqueue(request(file.clone())).unwrap();
    wait_for_status(&queue, success_id, UploadStatus::Success).await;

    // Failed before any link existed: not retryable either
    gateway.set_default_check(Err("network timeout".to_string()));
    let checkfail_id = queue.enqueue(request(file)).unwrap();
    wait_for_status(&queue, checkfail_id, UploadStatus::Error).await;

    gateway.clear_calls();
    assert!(queue.retry(success_id).is_err());
    assert!(queue.retry(checkfail_id).is_err());
    assert!(queue.retry(9999).is_err());

    // No network traffic and no status changes
    sleep(Duration::from_millis(50)).await;
    assert!(gateway.calls().is_empty());
    assert_eq!(queue.get_item(success_id).unwrap().status, UploadStatus::Success);
    assert_eq!(queue.get_item(checkfail_id).unwrap().status, UploadStatus::Error);
}

#[tokio::test]
async fn retry_after_upload_failure_reruns_only_upload() {
    let gateway = MockGateway::new();
    gateway.set_upload(Err("storage unavailable".to_string()));
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "shot.png");

    let item_id = queue.enqueue(request(file)).unwrap();
    let failed = wait_for_status(&queue, item_id, UploadStatus::Error).await;
    assert_eq!(failed.detected_link_id.as_deref(), Some("L1"));
    assert!(failed.error.as_deref().unwrap().contains("storage unavailable"));

    gateway.set_upload(Ok("http://img/2.png".to_string()));
    gateway.clear_calls();

    queue.retry(item_id).unwrap();
    let item = wait_for_status(&queue, item_id, UploadStatus::Success).await;

    assert_eq!(gateway.calls(), vec!["upload_image"]);
    assert_eq!(item.detected_link_id.as_deref(), Some("L1"));
    assert_eq!(item.image_url.as_deref(), Some("http://img/2.png"));
}

#[tokio::test]
async fn retry_recovers_moved_screenshot_by_domain_prefix() {
    let gateway = MockGateway::new();
    gateway.set_upload(Err("storage unavailable".to_string()));
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "original.png");

    let item_id = queue.enqueue(request(file.clone())).unwrap();
    wait_for_status(&queue, item_id, UploadStatus::Error).await;

    // Original gone, but a domain-prefixed capture for x.test remains
    fs::remove_file(&file).unwrap();
    let recovered = write_screenshot(&dir, "x_test_qa_20250314_092653.png");

    gateway.set_upload(Ok("http://img/3.png".to_string()));
    queue.retry(item_id).unwrap();

    let item = wait_for_status(&queue, item_id, UploadStatus::Success).await;
    assert_eq!(item.file_path, recovered);
}

#[tokio::test]
async fn retry_fails_clearly_when_no_file_can_be_found() {
    let gateway = MockGateway::new();
    gateway.set_upload(Err("storage unavailable".to_string()));
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "unrelated_name.png");

    let item_id = queue.enqueue(request(file.clone())).unwrap();
    wait_for_status(&queue, item_id, UploadStatus::Error).await;

    fs::remove_file(&file).unwrap();
    gateway.clear_calls();

    let result = queue.retry(item_id);
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("not found"));

    let item = queue.get_item(item_id).unwrap();
    assert_eq!(item.status, UploadStatus::Error);
    assert!(item.error.as_deref().unwrap().contains("not found"));
    assert_eq!(gateway.count("upload_image"), 0);
}

#[tokio::test]
async fn clear_non_errors_leaves_only_error_items() {
    let gateway = MockGateway::new();
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "shot.png");

    // 2 success
    let s1 = queue.enqueue(request(file.clone())).unwrap();
    let s2 = queue.enqueue(request(file.clone())).unwrap();
    wait_for_status(&queue, s1, UploadStatus::Success).await;
    wait_for_status(&queue, s2, UploadStatus::Success).await;

    // 3 error
    gateway.set_upload(Err("storage unavailable".to_string()));
    let mut error_ids = Vec::new();
    for _ in 0..3 {
        let id = queue.enqueue(request(file.clone())).unwrap();
        wait_for_status(&queue, id, UploadStatus::Error).await;
        error_ids.push(id);
    }

    // 1 still uploading, parked on an unanswered duplicate prompt
    gateway.set_default_check(Ok(UrlCheck {
        exists: true,
        detected_link_id: Some("L5".to_string()),
    }));
    let parked = queue.enqueue(request(file)).unwrap();
    wait_for_prompt(&queue).await;
    assert_eq!(queue.get_item(parked).unwrap().status, UploadStatus::Uploading);

    let removed = queue.clear_non_errors();
    assert_eq!(removed, 3);

    let remaining = queue.items();
    assert_eq!(remaining.len(), 3);
    assert!(remaining.iter().all(|item| item.status == UploadStatus::Error));
    assert!(remaining.iter().all(|item| error_ids.contains(&item.id)));

    // The parked item's prompt goes with it
    assert_eq!(queue.pending_prompt_count(), 0);
}

#[tokio::test]
async fn clear_non_errors_releases_parked_prompts() {
    let gateway = MockGateway::new();
    gateway.set_default_check(Ok(UrlCheck {
        exists: true,
        detected_link_id: Some("L5".to_string()),
    }));
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "shot.png");

    let parked = queue.enqueue(request(file)).unwrap();
    wait_for_prompt(&queue).await;

    assert_eq!(queue.clear_non_errors(), 1);
    assert!(queue.items().is_empty());
    assert_eq!(queue.pending_prompt_count(), 0);

    // A late operator answer is a no-op and triggers no backend calls
    assert!(!queue.resolve_duplicate(parked, DuplicateDecision::Continue));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(gateway.calls(), vec!["check_exists"]);
}

#[tokio::test]
async fn background_capture_requests_minimize_after_success() {
    let gateway = MockGateway::new();
    let host = RecordingHost::new(false); // tray context
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host.clone(), &dir);
    let file = write_screenshot(&dir, "shot.png");

    let item_id = queue.enqueue(request(file)).unwrap();
    let item = wait_for_status(&queue, item_id, UploadStatus::Success).await;
    assert!(item.background_capture);

    timeout(Duration::from_secs(2), async {
        while host.minimized() == 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("host was never asked to minimize");
}

#[tokio::test]
async fn foreground_capture_never_minimizes() {
    let gateway = MockGateway::new();
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host.clone(), &dir);
    let file = write_screenshot(&dir, "shot.png");

    let item_id = queue.enqueue(request(file)).unwrap();
    wait_for_status(&queue, item_id, UploadStatus::Success).await;

    sleep(Duration::from_millis(100)).await;
    assert_eq!(host.minimized(), 0);
}

#[tokio::test]
async fn check_exists_is_idempotent_without_writes() {
    let gateway = MockGateway::new();
    gateway.set_default_check(Ok(UrlCheck {
        exists: true,
        detected_link_id: Some("L5".to_string()),
    }));

    let first = gateway.check_exists("http://x.test/a", "s1").await.unwrap();
    let second = gateway.check_exists("http://x.test/a", "s1").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn same_url_items_can_both_pass_a_narrow_interleave() {
    // Two items for one URL enqueued back to back: duplicate protection is
    // the per-item check, not a lock, so both may see "does not exist"
    let gateway = MockGateway::new();
    let host = RecordingHost::new(true);
    let dir = TempDir::new().unwrap();
    let queue = make_queue(gateway.clone(), host, &dir);
    let file = write_screenshot(&dir, "shot.png");

    let a = queue.enqueue(request(file.clone())).unwrap();
    let b = queue.enqueue(request(file)).unwrap();

    wait_for_status(&queue, a, UploadStatus::Success).await;
    wait_for_status(&queue, b, UploadStatus::Success).await;
    assert_eq!(gateway.count("create_link"), 2);
}
