use docvault::engine::DiskStore;
use docvault::sdk::Client;
use docvault::server::Router;
use docvault::{DocumentReader, DocumentWriter, Error, StoreConfig, StoreInspector, BlobIngestor};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tokio::net::TcpListener;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Roster {
    users: Vec<User>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct User {
    id: u32,
    name: String,
}

async fn start() -> (TempDir, DiskStore, String) {
    let dir = tempdir().unwrap();
    let store = DiskStore::with_root(dir.path(), &StoreConfig::default()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new(Arc::new(store.clone()), store.root(), addr.port());
    tokio::spawn(async move {
        let _ = router.serve(listener).await;
    });

    (dir, store, format!("http://{}", addr))
}

#[tokio::test]
async fn test_status_endpoint() {
    let (dir, _store, base) = start().await;

    let body: Value = reqwest::get(format!("{}/api/status", base)).await.unwrap().json().await.unwrap();
    assert_eq!(body["port"].as_u64().unwrap(), base.rsplit(':').next().unwrap().parse::<u64>().unwrap());
    assert_eq!(body["root"], json!(dir.path()));
    assert_eq!(body["lockHeld"], json!(false));
    assert!(body["time"].is_string());
}

#[tokio::test]
async fn test_save_and_load_over_http() {
    let (dir, _store, base) = start().await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("{}/api/save", base))
        .json(&json!({
            "users": [{"id": 1, "name": "A"}],
            "currentUser": {"name": "Admin"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], json!(true));
    assert!(body["time"].is_string());

    let loaded: Value = http.get(format!("{}/api/data", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(loaded, json!({"users": [{"id": 1, "name": "A"}]}));

    let history: Vec<Value> = http.get(format!("{}/api/history", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(history.len(), 1);
    let path = history[0]["path"].as_str().unwrap();
    assert!(path.ends_with("_SYNC_by_Admin.json"), "{}", path);
    let archived: Value = serde_json::from_slice(&fs::read(dir.path().join(path)).unwrap()).unwrap();
    assert_eq!(archived, loaded);
}

#[tokio::test]
async fn test_fresh_store_serves_empty_schema() {
    let (_dir, _store, base) = start().await;
    let client = Client::new(&base);

    let doc = client.load().await.unwrap();
    for key in ["users", "statements", "guq", "notifications", "attendanceRecords", "decrees", "carriers"] {
        assert_eq!(doc[key], json!([]), "{}", key);
    }
}

#[tokio::test]
async fn test_save_conflict_returns_409() {
    let (dir, store, base) = start().await;
    let client = Client::new(&base);
    client.save(json!({"users": [{"id": 1}]}), "SYNC", "Admin").await.unwrap();
    let master = dir.path().join("Database").join("master_data.json");
    let before = fs::read(&master).unwrap();

    let _lease = store.write_lock().acquire().unwrap();

    let resp = reqwest::Client::new()
        .post(format!("{}/api/save", base))
        .json(&json!({"users": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());

    assert!(matches!(client.save(json!({"users": []}), "SYNC", "Admin").await, Err(Error::Busy)));
    assert!(client.status().await.unwrap().lock_held);
    assert_eq!(fs::read(&master).unwrap(), before);
}

#[tokio::test]
async fn test_duplicate_uploads_are_distinct_and_retrievable() {
    let (_dir, _store, base) = start().await;
    let client = Client::new(&base);

    let a = client.ingest(b"first copy".to_vec(), "to trinh.pdf", "GUQ").await.unwrap();
    let b = client.ingest(b"second copy".to_vec(), "to trinh.pdf", "GUQ").await.unwrap();

    assert_ne!(a.file_name, b.file_name);
    assert_eq!(a.original_name, "to trinh.pdf");
    assert!(a.file_name.ends_with("_to_trinh.pdf"));
    assert_eq!(client.fetch_file(&a.path).await.unwrap(), b"first copy");
    assert_eq!(client.fetch_file(&b.path).await.unwrap(), b"second copy");
}

#[tokio::test]
async fn test_upload_creates_missing_subcategory() {
    let (dir, _store, base) = start().await;

    let form = Form::new().part("file", Part::bytes(b"rules".to_vec()).file_name("noi-quy.txt"));
    let resp = reqwest::Client::new()
        .post(format!("{}/api/upload?category=LIBRARY/Policies", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], json!(true));
    let record = &body["record"];
    assert_eq!(record["category"], json!("LIBRARY/Policies"));
    assert!(record["id"].is_string());
    assert!(record["uploadDate"].is_string());
    let path = record["path"].as_str().unwrap();
    assert_eq!(fs::read(dir.path().join(path)).unwrap(), b"rules");
}

#[tokio::test]
async fn test_upload_without_file_is_rejected() {
    let (_dir, _store, base) = start().await;

    let form = Form::new().text("note", "nothing attached");
    let resp = reqwest::Client::new()
        .post(format!("{}/api/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], json!("no file provided"));
}

#[tokio::test]
async fn test_upload_outside_root_is_rejected() {
    let (_dir, _store, base) = start().await;
    let client = Client::new(&base);

    let res = client.ingest(b"x".to_vec(), "x.txt", "../escape").await;
    assert!(matches!(res, Err(Error::Internal(msg)) if msg.starts_with("400")));
}

#[tokio::test]
async fn test_typed_helpers() {
    let (_dir, _store, base) = start().await;
    let client = Client::connect(&base).await.unwrap();

    let roster = Roster {
        users: vec![User { id: 7, name: "Lan".to_string() }],
    };
    client.save_typed(&roster, "SYNC", "Lan").await.unwrap();

    let got: Roster = client.load_typed().await.unwrap();
    assert_eq!(got, roster);
}
