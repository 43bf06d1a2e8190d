//! PostgreSQL backend integration tests.
//!
//! Opt-in: set `APPVARS_TEST_DATABASE_URL` and build with
//! `--features postgres-backend`. Without the variable each test returns
//! early.

#![cfg(feature = "postgres-backend")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use appvars_storage::{ApplicationScope, PostgresBackend, StorageBackend, VariableWrite};
use uuid::Uuid;

fn maybe_database_url() -> Option<String> {
    let url = std::env::var("APPVARS_TEST_DATABASE_URL").ok()?;
    let url = url.trim().to_owned();
    if url.is_empty() { None } else { Some(url) }
}

async fn backend_with_application() -> Option<(PostgresBackend, Uuid)> {
    let url = maybe_database_url()?;
    let backend = PostgresBackend::connect(&url).await.expect("connect postgres");

    let app_id: Uuid = sqlx::query_scalar(
        "INSERT INTO application (project_key, name) VALUES ($1, $2) RETURNING id",
    )
    .bind("TEST")
    .bind(format!("app-{}", Uuid::new_v4()))
    .fetch_one(backend.pool())
    .await
    .expect("insert application");

    Some((backend, app_id))
}

fn secret_write(name: &str) -> VariableWrite {
    VariableWrite {
        name: name.to_owned(),
        clear_value: None,
        cipher_value: vec![1, 2, 3, 4],
        var_type: "password".to_owned(),
    }
}

#[tokio::test]
async fn insert_update_delete_roundtrip_if_configured() {
    let Some((backend, app_id)) = backend_with_application().await else {
        return;
    };

    let resolved = backend
        .resolve_application(&ApplicationScope::Id(app_id))
        .await
        .unwrap();
    assert_eq!(resolved, Some(app_id));

    let before = backend.last_modified(app_id).await.unwrap().unwrap();
    let stored = backend
        .insert_variable(app_id, &secret_write("DB_PASS"))
        .await
        .unwrap();
    assert_eq!(stored.name, "DB_PASS");
    assert_eq!(stored.clear_value, None);
    let after_insert = backend.last_modified(app_id).await.unwrap().unwrap();
    assert!(after_insert > before);

    let mut changed = secret_write("DB_PASS");
    changed.cipher_value = vec![9, 9];
    assert_eq!(backend.update_variable(app_id, &changed).await.unwrap(), 1);
    let row = backend.get_variable(app_id, "DB_PASS").await.unwrap().unwrap();
    assert_eq!(row.cipher_value, vec![9, 9]);

    assert_eq!(backend.delete_variable(app_id, "DB_PASS").await.unwrap(), 1);
    assert_eq!(backend.delete_variable(app_id, "DB_PASS").await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_name_is_classified_if_configured() {
    let Some((backend, app_id)) = backend_with_application().await else {
        return;
    };

    backend
        .insert_variable(app_id, &secret_write("TOKEN"))
        .await
        .unwrap();
    let err = backend
        .insert_variable(app_id, &secret_write("TOKEN"))
        .await
        .unwrap_err();
    assert!(err.is_unique_violation(), "unexpected error: {err}");
}

#[tokio::test]
async fn audits_newest_first_if_configured() {
    let Some((backend, app_id)) = backend_with_application().await else {
        return;
    };

    let first = backend.insert_audit(app_id, "alice", "[]").await.unwrap();
    let second = backend.insert_audit(app_id, "bob", "[]").await.unwrap();

    let listed = backend.list_audits(app_id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed.first().map(|a| a.id), Some(second.id));

    let fetched = backend.get_audit(app_id, first.id).await.unwrap().unwrap();
    assert_eq!(fetched.author, "alice");
    assert!(backend.get_audit(Uuid::new_v4(), first.id).await.unwrap().is_none());
}
