//! End-to-end backup runs against an in-memory source

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mongo_backup::error::ErrorKind;
use mongo_backup::{
    BackupError, BackupOptions, CustomEncoder, DocumentSource, MemorySource, Parser, Result,
    run_with_source,
};
use mongodb::bson::{Document, doc};

const URI: &str = "mongodb://localhost:27017/accounts";

fn accounts() -> MemorySource {
    MemorySource::new("accounts")
        .with_collection(
            "logins",
            vec![
                doc! { "_id": 1, "user": "ada", "ok": true },
                doc! { "_id": 2, "user": "bob", "ok": false },
                doc! { "_id": 3, "user": "ada", "ok": true },
            ],
        )
        .with_collection(
            "auths",
            vec![
                doc! { "_id": "a1", "method": "password" },
                doc! { "_id": "a2", "method": "token" },
            ],
        )
        .with_indexes(
            "logins",
            vec![
                doc! { "v": 2, "key": { "_id": 1 }, "name": "_id_" },
                doc! { "v": 2, "key": { "user": 1 }, "name": "user_1" },
            ],
        )
        .with_collection("system.profile", vec![doc! { "_id": 1 }])
}

fn shared(source: MemorySource) -> Arc<dyn DocumentSource> {
    Arc::new(source)
}

/// Records every callback invocation
#[derive(Clone, Default)]
struct CallbackLog(Arc<Mutex<Vec<Option<String>>>>);

impl CallbackLog {
    fn attach(&self, options: BackupOptions) -> BackupOptions {
        let calls = Arc::clone(&self.0);
        options.callback(move |err| {
            calls.lock().unwrap().push(err.map(|e| e.to_string()));
        })
    }

    fn calls(&self) -> Vec<Option<String>> {
        self.0.lock().unwrap().clone()
    }
}

/// Writer whose bytes stay readable after the run drops it
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn archive_entries(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(io::Cursor::new(bytes));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            (path, content)
        })
        .collect()
}

#[tokio::test]
async fn test_json_export_of_selected_collections() {
    let tmp = tempfile::tempdir().unwrap();
    let callback = CallbackLog::default();
    let options = callback.attach(
        BackupOptions::new(URI)
            .root(tmp.path())
            .parser(Parser::Json)
            .collections(["logins", "auths"]),
    );

    let summary = run_with_source(options, shared(accounts())).await.unwrap();

    let db = tmp.path().join("accounts");
    assert_eq!(file_count(&db.join("logins")), 3);
    assert_eq!(file_count(&db.join("auths")), 2);
    assert!(db.join("auths/a1.json").is_file());
    assert_eq!(summary.documents, 5);
    assert_eq!(callback.calls(), vec![None]);

    let login: serde_json::Value =
        serde_json::from_slice(&std::fs::read(db.join("logins/2.json")).unwrap()).unwrap();
    assert_eq!(login["user"], "bob");
    assert_eq!(login["ok"], false);
}

#[tokio::test]
async fn test_bson_export_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let options = BackupOptions::new(URI).root(tmp.path()).collections(["auths"]);

    run_with_source(options, shared(accounts())).await.unwrap();

    let bytes = std::fs::read(tmp.path().join("accounts/auths/a2.bson")).unwrap();
    let restored = Document::from_reader(bytes.as_slice()).unwrap();
    assert_eq!(restored, doc! { "_id": "a2", "method": "token" });
}

#[tokio::test]
async fn test_missing_collection_does_not_stop_others() {
    let tmp = tempfile::tempdir().unwrap();
    let callback = CallbackLog::default();
    let options = callback.attach(
        BackupOptions::new(URI)
            .root(tmp.path())
            .parser(Parser::Json)
            .collections(["logins", "wrong_name"]),
    );

    let err = run_with_source(options, shared(accounts())).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CollectionNotFound);
    assert_eq!(err.to_string(), "Collection wrong_name does not exist");
    assert_eq!(file_count(&tmp.path().join("accounts/logins")), 3);
    assert!(!tmp.path().join("accounts/wrong_name").exists());
    assert_eq!(
        callback.calls(),
        vec![Some("Collection wrong_name does not exist".to_string())]
    );
}

#[tokio::test]
async fn test_empty_selection_completes() {
    let tmp = tempfile::tempdir().unwrap();
    let callback = CallbackLog::default();
    let options = callback.attach(
        BackupOptions::new(URI)
            .root(tmp.path())
            .exclude(["logins", "auths"]),
    );

    let summary = run_with_source(options, shared(accounts())).await.unwrap();

    assert_eq!(summary.collections, 0);
    assert_eq!(summary.documents, 0);
    assert!(tmp.path().join("accounts").is_dir());
    assert_eq!(file_count(&tmp.path().join("accounts")), 0);
    assert_eq!(callback.calls(), vec![None]);
}

#[tokio::test]
async fn test_system_collections_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let options = BackupOptions::new(URI).root(tmp.path());

    let summary = run_with_source(options, shared(accounts())).await.unwrap();

    assert_eq!(summary.collections, 2);
    assert!(!tmp.path().join("accounts/system.profile").exists());
}

#[tokio::test]
async fn test_metadata_holds_index_definitions() {
    let tmp = tempfile::tempdir().unwrap();
    let options = BackupOptions::new(URI)
        .root(tmp.path())
        .collections(["logins", "auths"])
        .metadata(true);

    run_with_source(options, shared(accounts())).await.unwrap();

    let meta = tmp.path().join("accounts/.metadata");
    let logins: serde_json::Value =
        serde_json::from_slice(&std::fs::read(meta.join("logins")).unwrap()).unwrap();
    assert_eq!(logins.as_array().unwrap().len(), 2);
    assert_eq!(logins[1]["name"], "user_1");

    let auths: serde_json::Value =
        serde_json::from_slice(&std::fs::read(meta.join("auths")).unwrap()).unwrap();
    assert!(auths.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_metadata_failure_is_not_a_run_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let callback = CallbackLog::default();
    let options = callback.attach(
        BackupOptions::new(URI)
            .root(tmp.path())
            .collections(["logins"])
            .metadata(true),
    );

    let source = accounts().with_index_failure("logins");
    run_with_source(options, shared(source)).await.unwrap();

    assert_eq!(file_count(&tmp.path().join("accounts/logins")), 3);
    assert!(!tmp.path().join("accounts/.metadata/logins").exists());
    assert_eq!(callback.calls(), vec![None]);
}

#[tokio::test]
async fn test_archive_stream_leaves_no_tree() {
    let tmp = tempfile::tempdir().unwrap();
    let buffer = SharedBuffer::default();
    let options = BackupOptions::new(URI)
        .root(tmp.path().join("unused"))
        .stream(buffer.clone())
        .parser(Parser::Json)
        .collections(["logins", "auths"])
        .metadata(true);

    run_with_source(options, shared(accounts())).await.unwrap();

    assert!(!tmp.path().join("unused").exists());

    let bytes = buffer.0.lock().unwrap().clone();
    let entries = archive_entries(bytes);
    let files: Vec<&str> = entries
        .iter()
        .filter(|(_, content)| !content.is_empty())
        .map(|(path, _)| path.as_str())
        .collect();

    assert_eq!(files.len(), 3 + 2 + 2);
    assert!(files.contains(&"accounts/logins/1.json"));
    assert!(files.contains(&"accounts/auths/a2.json"));
    assert!(files.contains(&"accounts/.metadata/logins"));

    let (_, content) = entries
        .iter()
        .find(|(path, _)| path == "accounts/logins/3.json")
        .unwrap();
    let login: serde_json::Value = serde_json::from_slice(content).unwrap();
    assert_eq!(login["user"], "ada");
}

#[tokio::test]
async fn test_parallel_scan_exports_everything() {
    let tmp = tempfile::tempdir().unwrap();
    let options = BackupOptions::new(URI)
        .root(tmp.path())
        .collections(["logins"])
        .parallel_cursors(3);

    let summary = run_with_source(options, shared(accounts())).await.unwrap();

    assert_eq!(summary.documents, 3);
    assert_eq!(file_count(&tmp.path().join("accounts/logins")), 3);
}

#[tokio::test]
async fn test_query_filters_documents() {
    let tmp = tempfile::tempdir().unwrap();
    let options = BackupOptions::new(URI)
        .root(tmp.path())
        .collections(["logins"])
        .query(doc! { "user": "ada" });

    let summary = run_with_source(options, shared(accounts())).await.unwrap();

    assert_eq!(summary.documents, 2);
    assert!(!tmp.path().join("accounts/logins/2.bson").exists());
}

#[tokio::test]
async fn test_cursor_failure_is_reported_once() {
    let tmp = tempfile::tempdir().unwrap();
    let callback = CallbackLog::default();
    let options = callback.attach(BackupOptions::new(URI).root(tmp.path()));

    let source = accounts().with_stream_failure("auths", 1);
    let err = run_with_source(options, shared(source)).await.unwrap_err();

    assert!(matches!(err, BackupError::Source(_)));
    assert_eq!(file_count(&tmp.path().join("accounts/logins")), 3);
    let calls = callback.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].as_deref().unwrap().contains("auths"));
}

#[tokio::test]
async fn test_store_failure_fails_only_its_collection() {
    let tmp = tempfile::tempdir().unwrap();
    // A directory where a document file belongs makes that write fail
    std::fs::create_dir_all(tmp.path().join("accounts/auths/a1.json")).unwrap();

    let callback = CallbackLog::default();
    let options = callback.attach(
        BackupOptions::new(URI)
            .root(tmp.path())
            .parser(Parser::Json)
            .collections(["logins", "auths"]),
    );

    let err = run_with_source(options, shared(accounts())).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SinkIo);
    assert!(err.to_string().contains("a1.json"));
    assert_eq!(file_count(&tmp.path().join("accounts/logins")), 3);
    let calls = callback.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].as_deref().unwrap().contains("a1.json"));
}

/// Writer accepting every byte but failing to flush
struct FailingFlush;

impl Write for FailingFlush {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::other("device full"))
    }
}

#[tokio::test]
async fn test_archive_finalize_failure_fails_run() {
    let callback = CallbackLog::default();
    let options = callback.attach(
        BackupOptions::new(URI)
            .stream(FailingFlush)
            .collections(["auths"]),
    );

    let err = run_with_source(options, shared(accounts())).await.unwrap_err();

    assert!(matches!(err, BackupError::Sink { .. }));
    assert!(err.to_string().contains("device full"));
    let calls = callback.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].is_some());
}

#[tokio::test]
async fn test_listing_failure_fails_run() {
    let tmp = tempfile::tempdir().unwrap();
    let callback = CallbackLog::default();
    let options = callback.attach(BackupOptions::new(URI).root(tmp.path()));

    let result = run_with_source(options, shared(accounts().with_listing_failure())).await;

    assert!(result.is_err());
    assert_eq!(callback.calls().len(), 1);
    assert!(callback.calls()[0].is_some());
}

#[tokio::test]
async fn test_file_in_place_of_root_is_replaced() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("dump");
    std::fs::write(&root, b"stale").unwrap();

    let options = BackupOptions::new(URI).root(&root).collections(["auths"]);
    run_with_source(options, shared(accounts())).await.unwrap();

    assert!(root.is_dir());
    assert_eq!(file_count(&root.join("accounts/auths")), 2);
}

#[tokio::test]
async fn test_conflicting_options_fail_before_any_io() {
    let tmp = tempfile::tempdir().unwrap();
    let callback = CallbackLog::default();
    let options = callback.attach(
        BackupOptions::new(URI)
            .root(tmp.path().join("dump"))
            .collections(["logins"])
            .exclude(["auths"]),
    );

    let err = run_with_source(options, shared(accounts())).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!tmp.path().join("dump").exists());
    assert!(callback.calls().is_empty());
}

/// Custom encoder writing the `user` field of each document as a line
struct UserLines(Mutex<Vec<String>>);

#[async_trait]
impl CustomEncoder for UserLines {
    async fn export(&self, doc: Document, destination: &Path) -> Result<()> {
        let user = doc.get_str("user").unwrap_or("unknown").to_string();
        assert!(destination.ends_with("logins"));
        self.0.lock().unwrap().push(user);
        Ok(())
    }
}

#[tokio::test]
async fn test_custom_encoder_owns_storage() {
    let tmp = tempfile::tempdir().unwrap();
    let encoder = Arc::new(UserLines(Mutex::new(Vec::new())));
    let options = BackupOptions::new(URI)
        .root(tmp.path())
        .collections(["logins"])
        .parser(Parser::Custom(encoder.clone()));

    let summary = run_with_source(options, shared(accounts())).await.unwrap();

    assert_eq!(summary.documents, 3);
    let mut users = encoder.0.lock().unwrap().clone();
    users.sort();
    assert_eq!(users, vec!["ada", "ada", "bob"]);
    assert_eq!(file_count(&tmp.path().join("accounts/logins")), 0);
}
