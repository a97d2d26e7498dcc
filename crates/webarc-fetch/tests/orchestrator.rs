use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use webarc_fetch::{
    BodyStream, DownloadOptions, DownloadOrchestrator, DownloadRegistry, DownloadStatus,
    FetchError, HttpClient, cancel_pair,
};
use webarc_store::GameDataStore;

#[derive(Debug)]
struct MockError(String);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockError {}

#[derive(Clone)]
enum MockBody {
    Bytes(Vec<u8>),
    Error(String),
    /// A connection that opens but never yields, for cancellation tests.
    Stalled,
}

struct MockClient {
    bodies: HashMap<String, MockBody>,
    hits: Mutex<Vec<String>>,
}

impl MockClient {
    fn new(bodies: &[(&str, MockBody)]) -> Self {
        Self {
            bodies: bodies
                .iter()
                .map(|(url, body)| (url.to_string(), body.clone()))
                .collect(),
            hits: Mutex::new(Vec::new()),
        }
    }

    fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

impl HttpClient for MockClient {
    type Error = MockError;

    async fn stream(&self, url: &str) -> Result<BodyStream<MockError>, MockError> {
        self.hits.lock().unwrap().push(url.to_string());
        match self.bodies.get(url) {
            Some(MockBody::Bytes(data)) => {
                let total = data.len() as u64;
                // Two chunks, so the orchestrator's loop runs more than once.
                let mid = data.len() / 2;
                let chunks = vec![
                    Ok(Bytes::copy_from_slice(&data[..mid])),
                    Ok(Bytes::copy_from_slice(&data[mid..])),
                ];
                Ok(BodyStream {
                    total_bytes: Some(total),
                    stream: Box::pin(futures_util::stream::iter(chunks)),
                })
            }
            Some(MockBody::Error(message)) => Err(MockError(message.clone())),
            Some(MockBody::Stalled) => Ok(BodyStream {
                total_bytes: None,
                stream: Box::pin(futures_util::stream::pending()),
            }),
            None => Err(MockError(format!("404 for {url}"))),
        }
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

struct Fixture {
    _root: tempfile::TempDir,
    store: GameDataStore,
    registry: Arc<DownloadRegistry>,
    data_id: i64,
    root_path: std::path::PathBuf,
}

async fn fixture(payload: &[u8]) -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let root_path = root.path().to_path_buf();
    let store = GameDataStore::in_memory(&root_path).await.unwrap();
    let data_id = store
        .insert_game_data("game-1", &sha256_hex(payload), payload.len() as i64, None)
        .await
        .unwrap();
    store.upsert_game("game-1", Some(data_id)).await.unwrap();
    Fixture {
        _root: root,
        store,
        registry: Arc::new(DownloadRegistry::new(Duration::from_secs(5))),
        data_id,
        root_path,
    }
}

fn orchestrator(
    fx: &Fixture,
    client: MockClient,
) -> DownloadOrchestrator<MockClient> {
    DownloadOrchestrator::new(
        client,
        Arc::clone(&fx.registry),
        fx.store.clone(),
        fx.root_path.join("games"),
        fx.root_path.join("staging"),
    )
    .unwrap()
}

#[tokio::test]
async fn successful_download_imports_and_records() {
    let payload = b"zip file payload".to_vec();
    let fx = fixture(&payload).await;
    let client = MockClient::new(&[("http://mirror-a/pack", MockBody::Bytes(payload.clone()))]);
    let orchestrator = orchestrator(&fx, client);

    let progress_bytes = Arc::new(Mutex::new(0u64));
    let seen = Arc::clone(&progress_bytes);
    let options = DownloadOptions::default().on_progress(Arc::new(move |p| {
        *seen.lock().unwrap() = p.bytes_downloaded;
    }));

    let dest = orchestrator
        .download(fx.data_id, &["http://mirror-a/pack".into()], options)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), payload);
    assert_eq!(*progress_bytes.lock().unwrap(), payload.len() as u64);

    let record = fx.store.game_data(fx.data_id).await.unwrap().unwrap();
    assert!(record.present_on_disk);
    let relative = record.path.unwrap();
    let resolved = fx.store.resolve_path(&relative).unwrap();
    assert_eq!(
        std::fs::metadata(&resolved).unwrap().len(),
        record.size as u64
    );
    assert!(fx.store.game_active_data_on_disk("game-1").await.unwrap());
    assert_eq!(
        fx.registry.get("game-1").unwrap().status,
        DownloadStatus::Completed
    );
}

#[tokio::test]
async fn reuses_recorded_basename_for_target() {
    let payload = b"versioned payload".to_vec();
    let fx = fixture(&payload).await;
    // A catalog import that already knows the historical file name.
    let data_id = fx
        .store
        .insert_game_data(
            "game-2",
            &sha256_hex(&payload),
            payload.len() as i64,
            Some("games/original-name.zip"),
        )
        .await
        .unwrap();
    fx.store.upsert_game("game-2", Some(data_id)).await.unwrap();

    let client = MockClient::new(&[("http://mirror-a/pack", MockBody::Bytes(payload.clone()))]);
    let orchestrator = orchestrator(&fx, client);
    let dest = orchestrator
        .download(
            data_id,
            &["http://mirror-a/pack".into()],
            DownloadOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(
        dest.file_name().unwrap().to_string_lossy(),
        "original-name.zip"
    );
}

#[tokio::test]
async fn synthesizes_target_name_when_record_has_none() {
    let payload = b"versioned payload".to_vec();
    let fx = fixture(&payload).await;
    let client = MockClient::new(&[("http://mirror-a/pack", MockBody::Bytes(payload.clone()))]);
    let orchestrator = orchestrator(&fx, client);
    let dest = orchestrator
        .download(
            fx.data_id,
            &["http://mirror-a/pack".into()],
            DownloadOptions::default(),
        )
        .await
        .unwrap();
    let name = dest.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("game-1-"));
    assert!(name.ends_with(".zip"));
}

#[tokio::test]
async fn already_present_fails_fast_without_contacting_sources() {
    let payload = b"payload".to_vec();
    let fx = fixture(&payload).await;
    fx.store
        .mark_downloaded(fx.data_id, "games/pack.zip")
        .await
        .unwrap();

    let client = MockClient::new(&[("http://mirror-a/pack", MockBody::Bytes(payload))]);
    let orchestrator = orchestrator(&fx, client);
    let err = orchestrator
        .download(
            fx.data_id,
            &["http://mirror-a/pack".into()],
            DownloadOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::AlreadyPresent { .. }));
    assert!(orchestrator.client().hits().is_empty());
}

#[tokio::test]
async fn second_concurrent_download_is_rejected() {
    let payload = b"payload".to_vec();
    let fx = fixture(&payload).await;
    // Simulate the other pathway holding the asset key.
    fx.registry
        .register("game-1", Some(fx.data_id), webarc_fetch::DownloadOrigin::OnDemandServer)
        .unwrap();

    let client = MockClient::new(&[("http://mirror-a/pack", MockBody::Bytes(payload))]);
    let orchestrator = orchestrator(&fx, client);
    let err = orchestrator
        .download(
            fx.data_id,
            &["http://mirror-a/pack".into()],
            DownloadOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::AlreadyActive { .. }));
}

#[tokio::test]
async fn bad_source_falls_through_to_good_source() {
    let payload = b"the real payload".to_vec();
    let fx = fixture(&payload).await;
    let client = MockClient::new(&[
        ("http://mirror-a/pack", MockBody::Bytes(b"corrupted".to_vec())),
        ("http://mirror-b/pack", MockBody::Bytes(payload.clone())),
    ]);
    let orchestrator = orchestrator(&fx, client);

    let dest = orchestrator
        .download(
            fx.data_id,
            &[
                "http://mirror-a/pack".into(),
                "http://mirror-b/pack".into(),
            ],
            DownloadOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), payload);
    assert_eq!(
        orchestrator.client().hits(),
        vec!["http://mirror-a/pack", "http://mirror-b/pack"]
    );
}

#[tokio::test]
async fn total_failure_reports_every_source() {
    let payload = b"payload".to_vec();
    let fx = fixture(&payload).await;
    let client = MockClient::new(&[
        ("http://mirror-a/pack", MockBody::Error("connection refused".into())),
        ("http://mirror-b/pack", MockBody::Bytes(b"payl0ad".to_vec())),
    ]);
    let orchestrator = orchestrator(&fx, client);

    let err = orchestrator
        .download(
            fx.data_id,
            &[
                "http://mirror-a/pack".into(),
                "http://mirror-b/pack".into(),
            ],
            DownloadOptions::default(),
        )
        .await
        .unwrap_err();

    match err {
        FetchError::AllSourcesFailed { asset_id, failures } => {
            assert_eq!(asset_id, "game-1");
            assert_eq!(failures.len(), 2);
            assert!(failures[0].reason.contains("connection refused"));
            assert!(failures[1].reason.contains("hash mismatch"));
            // The integrity failure names the source that produced the bytes.
            assert!(failures[1].reason.contains("http://mirror-b/pack"));
        }
        other => panic!("expected AllSourcesFailed, got {other:?}"),
    }

    let record = fx.store.game_data(fx.data_id).await.unwrap().unwrap();
    assert!(!record.present_on_disk);
    assert_eq!(
        fx.registry.get("game-1").unwrap().status,
        DownloadStatus::Failed
    );
}

// Real time on purpose: the sqlite pool's acquire timeout misfires under
// a paused clock. The stalled stream pends forever, so the short sleep
// only has to let the first attempt start.
#[tokio::test]
async fn cancellation_aborts_without_trying_remaining_sources() {
    let payload = b"payload".to_vec();
    let fx = fixture(&payload).await;
    let client = MockClient::new(&[
        ("http://mirror-a/pack", MockBody::Stalled),
        ("http://mirror-b/pack", MockBody::Bytes(payload)),
    ]);
    let orchestrator = Arc::new(orchestrator(&fx, client));

    let (handle, token) = cancel_pair();
    let task = {
        let orchestrator = Arc::clone(&orchestrator);
        let data_id = fx.data_id;
        tokio::spawn(async move {
            orchestrator
                .download(
                    data_id,
                    &[
                        "http://mirror-a/pack".into(),
                        "http://mirror-b/pack".into(),
                    ],
                    DownloadOptions::default().cancel(token),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();
    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, FetchError::Cancelled));

    // Only the stalled source was contacted.
    assert_eq!(orchestrator.client().hits(), vec!["http://mirror-a/pack"]);
    // The staging area holds no leftover partial file.
    let staging = fx.root_path.join("staging");
    if staging.exists() {
        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
    }
}

#[tokio::test]
async fn empty_source_list_is_rejected() {
    let payload = b"payload".to_vec();
    let fx = fixture(&payload).await;
    let client = MockClient::new(&[]);
    let orchestrator = orchestrator(&fx, client);
    let err = orchestrator
        .download(fx.data_id, &[], DownloadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::NoSources));
}
