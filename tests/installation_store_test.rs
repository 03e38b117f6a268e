// Integration tests for the installation store over the on-disk backends

use blobauth::installation::{BlobInstallationStore, Installation, InstallationStore};
use blobauth::object_store::{FsObjectStore, ObjectStore, SqliteObjectStore, StoreResult};
use std::sync::Arc;
use tempfile::TempDir;

fn sample_installation(user_id: &str, bot_token: &str, installed_at: f64) -> Installation {
    Installation {
        app_id: Some("A0001".to_string()),
        enterprise_id: Some("ent1".to_string()),
        enterprise_name: Some("Enterprise One".to_string()),
        team_id: Some("team1".to_string()),
        team_name: Some("Team One".to_string()),
        bot_token: Some(bot_token.to_string()),
        bot_id: Some("B0001".to_string()),
        bot_user_id: Some("U0BOT".to_string()),
        bot_scopes: vec!["chat:write".to_string()],
        user_id: Some(user_id.to_string()),
        user_token: Some(format!("xoxp-{}", user_id)),
        incoming_webhook_url: Some("https://hooks.example.com/T/B/X".to_string()),
        incoming_webhook_channel: Some("#general".to_string()),
        token_type: Some("bot".to_string()),
        installed_at,
        ..Default::default()
    }
}

fn sorted_keys(objects: &dyn ObjectStore, prefix: &str) -> Vec<String> {
    let mut keys: Vec<String> = objects
        .list(prefix)
        .unwrap()
        .collect::<StoreResult<_>>()
        .unwrap();
    keys.sort();
    keys
}

/// Saving with user "u1" at 1000 for ent1/team1 under app1 writes the four installer keys.
#[test]
fn test_key_layout_on_filesystem() {
    let temp_dir = TempDir::new().unwrap();
    let objects: Arc<dyn ObjectStore> =
        Arc::new(FsObjectStore::new(temp_dir.path(), "installations").unwrap());
    let store = BlobInstallationStore::new(objects.clone(), "app1");

    store.save(&sample_installation("u1", "xoxb-1", 1000.0)).unwrap();

    assert_eq!(
        sorted_keys(objects.as_ref(), "app1/ent1-team1/installer-"),
        vec![
            "app1/ent1-team1/installer-1000",
            "app1/ent1-team1/installer-latest",
            "app1/ent1-team1/installer-u1-1000",
            "app1/ent1-team1/installer-u1-latest",
        ]
    );

    let base = temp_dir.path().join("installations/app1/ent1-team1");
    let latest = std::fs::read(base.join("installer-latest")).unwrap();
    for name in ["installer-1000", "installer-u1-latest", "installer-u1-1000"] {
        assert_eq!(std::fs::read(base.join(name)).unwrap(), latest);
    }
}

#[test]
fn test_full_lifecycle_on_compressed_filesystem() {
    let temp_dir = TempDir::new().unwrap();
    let objects: Arc<dyn ObjectStore> = Arc::new(
        FsObjectStore::new(temp_dir.path(), "installations")
            .unwrap()
            .with_compression(true),
    );
    let store = BlobInstallationStore::new(objects.clone(), "app1");

    let first = sample_installation("u1", "xoxb-1", 1000.0);
    let second = sample_installation("u2", "xoxb-2", 2000.0);
    store.save(&first).unwrap();
    store.save(&second).unwrap();

    // u1 sees the rotated bot token
    let u1 = store
        .find_installation(Some("ent1"), Some("team1"), Some("u1"), false)
        .unwrap();
    assert_eq!(u1.bot_token.as_deref(), Some("xoxb-2"));
    assert_eq!(u1.user_token.as_deref(), Some("xoxp-u1"));

    assert_eq!(
        store.find_bot(Some("ent1"), Some("team1"), false),
        Some(second.to_bot())
    );

    store.delete_installation(Some("ent1"), Some("team1"), Some("u1")).unwrap();
    assert!(store
        .find_installation(Some("ent1"), Some("team1"), Some("u1"), false)
        .is_none());
    assert_eq!(
        store.find_installation(Some("ent1"), Some("team1"), Some("u2"), false),
        Some(second.clone())
    );

    store.delete_installation(Some("ent1"), Some("team1"), Some("u2")).unwrap();
    store.delete_bot(Some("ent1"), Some("team1")).unwrap();

    assert!(sorted_keys(objects.as_ref(), "").is_empty());
}

#[test]
fn test_sqlite_backend_shares_file_with_other_tenants() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("oauth.db");
    let objects: Arc<dyn ObjectStore> =
        Arc::new(SqliteObjectStore::open(&db_path, "installations").unwrap());
    let store = BlobInstallationStore::new(objects.clone(), "app1").with_historical_data(false);

    let workspace_a = sample_installation("u1", "xoxb-a", 1.0);
    let workspace_b = Installation {
        enterprise_id: None,
        team_id: Some("team2".to_string()),
        ..sample_installation("u9", "xoxb-b", 2.0)
    };
    store.save(&workspace_a).unwrap();
    store.save(&workspace_b).unwrap();

    assert_eq!(
        store.find_installation(None, Some("team2"), None, false),
        Some(workspace_b)
    );

    store.delete_installation(Some("ent1"), Some("team1"), None).unwrap();
    store.delete_bot(Some("ent1"), Some("team1")).unwrap();

    assert!(sorted_keys(objects.as_ref(), "app1/ent1-team1/").is_empty());
    assert_eq!(sorted_keys(objects.as_ref(), "app1/none-team2/").len(), 3);

    // Data survives reopening the database
    let reopened: Arc<dyn ObjectStore> =
        Arc::new(SqliteObjectStore::open(&db_path, "installations").unwrap());
    let store = BlobInstallationStore::new(reopened, "app1");
    assert!(store.find_bot(None, Some("team2"), false).is_some());
}

#[test]
fn test_client_ids_are_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let objects: Arc<dyn ObjectStore> =
        Arc::new(FsObjectStore::new(temp_dir.path(), "installations").unwrap());
    let app1 = BlobInstallationStore::new(objects.clone(), "app1");
    let app2 = BlobInstallationStore::new(objects, "app2");

    app1.save(&sample_installation("u1", "xoxb-1", 1.0)).unwrap();

    assert!(app1.find_bot(Some("ent1"), Some("team1"), false).is_some());
    assert!(app2.find_bot(Some("ent1"), Some("team1"), false).is_none());
}
