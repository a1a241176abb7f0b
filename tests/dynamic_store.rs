use serde_json::json;
use uuid::Uuid;

mod common;

// The dynamic store should create the table on first write, widen it when a
// later payload brings new keys, and round-trip values as JSON.
#[tokio::test]
async fn dynamic_collection_lifecycle() -> anyhow::Result<()> {
    let Some(db) = common::setup_state().await? else {
        return Ok(());
    };
    let state = db.state.clone();

    sqlx::query(r#"DROP TABLE IF EXISTS "grimoire_notes""#)
        .execute(&state.pool)
        .await?;

    // First write creates the table and infers column types
    let created = state
        .store
        .insert(
            "grimoire_notes",
            json!({
                "title": "The Tower",
                "rank": 16,
                "sealed": false,
                "tags": ["major", "upright"]
            }),
        )
        .await?;
    assert_eq!(created["title"], "The Tower");
    assert_eq!(created["rank"], 16);
    assert_eq!(created["sealed"], false);
    let id: Uuid = serde_json::from_value(created["id"].clone())?;

    // A later payload with a new key widens the table
    state
        .store
        .insert(
            "grimoire_notes",
            json!({ "title": "The Star", "rank": 17, "weight": 0.5 }),
        )
        .await?;

    let (records, total) = state.store.list("grimoire_notes", 20, 0).await?;
    assert_eq!(total, 2);
    assert_eq!(records.len(), 2);
    // Rows without the late-added column read back as null
    assert!(records.iter().any(|r| r["weight"].is_null()));

    // Point read, update, delete
    let fetched = state.store.get("grimoire_notes", id).await?;
    assert_eq!(fetched["title"], "The Tower");

    let updated = state
        .store
        .update("grimoire_notes", id, json!({ "sealed": true }))
        .await?;
    assert_eq!(updated["sealed"], true);
    assert_eq!(updated["title"], "The Tower");

    state.store.delete("grimoire_notes", id).await?;
    let gone = state.store.get("grimoire_notes", id).await;
    assert!(gone.is_err());

    // Inferred column types match the JSON value kinds
    let columns: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT column_name, data_type FROM information_schema.columns
        WHERE table_schema = 'public' AND table_name = 'grimoire_notes'
        "#,
    )
    .fetch_all(&state.pool)
    .await?;
    let type_of = |name: &str| {
        columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, ty)| ty.as_str())
    };
    assert_eq!(type_of("title"), Some("text"));
    assert_eq!(type_of("rank"), Some("bigint"));
    assert_eq!(type_of("sealed"), Some("boolean"));
    assert_eq!(type_of("tags"), Some("jsonb"));
    assert_eq!(type_of("weight"), Some("double precision"));

    sqlx::query(r#"DROP TABLE IF EXISTS "grimoire_notes""#)
        .execute(&state.pool)
        .await?;

    Ok(())
}

#[tokio::test]
async fn dynamic_store_refuses_reserved_and_missing_collections() -> anyhow::Result<()> {
    let Some(db) = common::setup_state().await? else {
        return Ok(());
    };
    let state = db.state.clone();

    // Core tables are off limits
    let reserved = state.store.insert("users", json!({ "email": "x" })).await;
    assert!(reserved.is_err());

    // Reading a collection that was never written is a clean miss
    let missing = state.store.list("never_written", 20, 0).await;
    assert!(missing.is_err());

    // Injection-shaped slugs are rejected before touching SQL
    let hostile = state
        .store
        .insert("notes\"; drop table users; --", json!({ "a": 1 }))
        .await;
    assert!(hostile.is_err());

    Ok(())
}
