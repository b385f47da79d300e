use std::{collections::HashSet, sync::Arc};

use kvdoc::{memory::InMemoryStore, prelude::*};
use serde::{Deserialize, Serialize};

fn store() -> DocumentStore {
    let registry = ModelRegistry::builder()
        .register(ModelDef::new("Player").default_value("level", 1))
        .build()
        .unwrap();

    DocumentStore::new(InMemoryStore::new(), registry)
}

#[tokio::test]
async fn created_documents_round_trip() {
    let players = store().model("Player").unwrap();

    let created = players.create(doc! { "name": "Ann", "score": 10 }).await.unwrap();
    let found = players.find_by_id(created.id()).await.unwrap().unwrap();

    assert_eq!(found.id(), created.id());
    assert_eq!(found.get_str("name").unwrap(), "Ann");
    assert_eq!(found.get_i32("score").unwrap(), 10);
    assert_eq!(found.get_i32("level").unwrap(), 1);
    assert_eq!(found.get_str("model").unwrap(), "Player");
    assert_eq!(found.get_str("createdAt").unwrap(), found.get_str("updatedAt").unwrap());
    assert_eq!(found.document(), created.document());
}

#[tokio::test]
async fn payload_overrides_defaults_but_not_system_fields() {
    let players = store().model("Player").unwrap();

    let created = players
        .create(doc! { "level": 3, "id": "chosen", "model": "Other", "createdAt": "1970-01-01T00:00:00.000Z" })
        .await
        .unwrap();

    assert_eq!(created.get_i32("level").unwrap(), 3);
    assert_ne!(created.id(), "chosen");
    assert_eq!(created.get_str("id").unwrap(), created.id());
    assert_eq!(created.get_str("model").unwrap(), "Player");
    assert_ne!(created.get_str("createdAt").unwrap(), "1970-01-01T00:00:00.000Z");
}

#[tokio::test]
async fn timestamps_are_utc_milliseconds() {
    let players = store().model("Player").unwrap();

    let created = players.create(doc! {}).await.unwrap();
    let created_at = created.get_str("createdAt").unwrap();

    assert_eq!(created_at.len(), "2024-01-01T00:00:00.000Z".len());
    assert!(created_at.ends_with('Z'));
}

#[tokio::test]
async fn ids_never_collide() {
    let players = store().model("Player").unwrap();
    let mut ids = HashSet::new();

    for n in 0..50 {
        let created = players.create(doc! { "n": n }).await.unwrap();
        ids.insert(created.id().to_string());
    }

    assert_eq!(ids.len(), 50);
    assert_eq!(players.count_documents(doc! {}).await.unwrap(), 50);
}

#[tokio::test]
async fn hydrated_delete_removes_only_that_document() {
    let players = store().model("Player").unwrap();
    let ann = players.create(doc! { "name": "Ann" }).await.unwrap();
    let bo = players.create(doc! { "name": "Bo" }).await.unwrap();

    ann.delete_one().await.unwrap();

    assert!(players.find_by_id(ann.id()).await.unwrap().is_none());
    assert!(players.find_by_id(bo.id()).await.unwrap().is_some());
    assert_eq!(players.count_documents(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn saving_refreshes_updated_at_and_keeps_identity() {
    let players = store().model("Player").unwrap();
    let mut ann = players.create(doc! { "name": "Ann", "score": 10 }).await.unwrap();
    let created_at = ann.get_str("createdAt").unwrap().to_string();

    ann.set("score", 11);
    ann.set("stats.wins", 2);
    ann.insert("id", "hijacked");
    ann.insert("createdAt", "1970-01-01T00:00:00.000Z");
    ann.save().await.unwrap();

    let stored = players.find_by_id(ann.id()).lean().await.unwrap().unwrap();
    assert_eq!(stored.get_i32("score").unwrap(), 11);
    assert_eq!(stored.get_document("stats").unwrap(), &doc! { "wins": 2 });
    assert_eq!(stored.get_str("id").unwrap(), ann.id());
    assert_eq!(stored.get_str("createdAt").unwrap(), created_at);
    assert!(stored.get_str("updatedAt").unwrap() >= created_at.as_str());
    assert_eq!(players.count_documents(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn update_operators_apply_to_every_match() {
    let players = store().model("Player").unwrap();
    players.create(doc! { "name": "Ann", "team": "red", "score": 1 }).await.unwrap();
    players.create(doc! { "name": "Bo", "team": "red", "score": 2 }).await.unwrap();
    players.create(doc! { "name": "Cy", "team": "blue", "score": 3 }).await.unwrap();

    let result = players
        .update_many(
            doc! { "team": "red" },
            doc! { "$inc": { "score": 10 }, "$push": { "badges": "mvp" }, "$unset": { "team": "" } },
        )
        .await
        .unwrap();

    assert_eq!(result.matched_count, 2);
    assert_eq!(result.modified_count, 2);

    let ann = players.find_one(doc! { "name": "Ann" }).lean().await.unwrap().unwrap();
    assert_eq!(ann.get_i32("score").unwrap(), 11);
    assert_eq!(ann.get_array("badges").unwrap(), &vec![Bson::from("mvp")]);
    assert!(!ann.contains_key("team"));

    let cy = players.find_one(doc! { "name": "Cy" }).lean().await.unwrap().unwrap();
    assert_eq!(cy.get_i32("score").unwrap(), 3);
}

#[tokio::test]
async fn plain_patches_behave_as_set() {
    let players = store().model("Player").unwrap();
    let ann = players.create(doc! { "name": "Ann", "score": 1 }).await.unwrap();

    players
        .update_one(doc! { "id": ann.id() }, doc! { "score": 5 }, UpdateOptions::default())
        .await
        .unwrap();

    let stored = players.find_by_id(ann.id()).lean().await.unwrap().unwrap();
    assert_eq!(stored.get_i32("score").unwrap(), 5);
    assert_eq!(stored.get_str("name").unwrap(), "Ann");
}

#[tokio::test]
async fn immutable_fields_are_ignored_by_lenient_updates() {
    let players = store().model("Player").unwrap();
    let ann = players.create(doc! { "name": "Ann" }).await.unwrap();

    players
        .update_many(doc! {}, doc! { "$set": { "id": "other", "model": "Team", "name": "Anna" } })
        .await
        .unwrap();

    let stored = players.find_by_id(ann.id()).lean().await.unwrap().unwrap();
    assert_eq!(stored.get_str("name").unwrap(), "Anna");
    assert_eq!(stored.get_str("model").unwrap(), "Player");
}

#[tokio::test]
async fn update_one_touches_a_single_document() {
    let players = store().model("Player").unwrap();
    players.create(doc! { "team": "red" }).await.unwrap();
    players.create(doc! { "team": "red" }).await.unwrap();

    let result = players
        .update_one(doc! { "team": "red" }, doc! { "$set": { "captain": true } }, UpdateOptions::default())
        .await
        .unwrap();

    assert_eq!(result.matched_count, 1);
    assert_eq!(players.count_documents(doc! { "captain": true }).await.unwrap(), 1);
}

#[tokio::test]
async fn update_one_without_match_or_upsert_is_a_no_op() {
    let players = store().model("Player").unwrap();

    let result = players
        .update_one(doc! { "name": "Nobody" }, doc! { "$set": { "score": 1 } }, UpdateOptions::default())
        .await
        .unwrap();

    assert_eq!(result, UpdateResult::default());
    assert!(!players.exists(doc! {}).await.unwrap());
}

#[tokio::test]
async fn upserts_are_idempotent() {
    let players = store().model("Player").unwrap();

    for _ in 0..2 {
        let upserted = players
            .find_one_and_update(doc! { "name": "Cy" }, doc! { "$inc": { "score": 1 } }, UpdateOptions::upsert())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(upserted.get_str("name").unwrap(), "Cy");
    }

    let matches = players.find(doc! { "name": "Cy" }).lean().await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].get_i32("score").unwrap(), 2);
    assert_eq!(matches[0].get_i32("level").unwrap(), 1);
}

#[tokio::test]
async fn upserts_by_id_keep_the_requested_id() {
    let players = store().model("Player").unwrap();

    let result = players
        .update_one(doc! { "id": "player-7" }, doc! { "$set": { "name": "Di" } }, UpdateOptions::upsert())
        .await
        .unwrap();
    players
        .update_one(doc! { "id": "player-7" }, doc! { "$set": { "score": 4 } }, UpdateOptions::upsert())
        .await
        .unwrap();

    assert_eq!(result.upserted_id.as_deref(), Some("player-7"));
    let stored = players.find_by_id("player-7").lean().await.unwrap().unwrap();
    assert_eq!(stored.get_str("name").unwrap(), "Di");
    assert_eq!(stored.get_i32("score").unwrap(), 4);
    assert_eq!(players.count_documents(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn upserts_never_overwrite_a_document_the_filter_did_not_match() {
    let players = store().model("Player").unwrap();
    players
        .update_one(
            doc! { "id": "p1" },
            doc! { "$set": { "name": "Ann", "status": "active", "score": 10 } },
            UpdateOptions::upsert(),
        )
        .await
        .unwrap();

    let upserted = players
        .find_one_and_update(
            doc! { "id": "p1", "status": "pending" },
            doc! { "$set": { "status": "done" } },
            UpdateOptions::upsert(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_ne!(upserted.id(), "p1");
    assert_eq!(upserted.get_str("status").unwrap(), "done");
    let original = players.find_by_id("p1").lean().await.unwrap().unwrap();
    assert_eq!(original.get_str("name").unwrap(), "Ann");
    assert_eq!(original.get_str("status").unwrap(), "active");
    assert_eq!(original.get_i32("score").unwrap(), 10);
    assert_eq!(players.count_documents(doc! {}).await.unwrap(), 2);
}

#[tokio::test]
async fn strict_upserts_reject_a_taken_id() {
    let registry = ModelRegistry::builder().register(ModelDef::new("Player")).build().unwrap();
    let store = DocumentStore::with_options(InMemoryStore::new(), registry, StoreOptions::default().with_strict(true));
    let players = store.model("Player").unwrap();
    players
        .update_one(doc! { "id": "p1" }, doc! { "$set": { "status": "active" } }, UpdateOptions::upsert())
        .await
        .unwrap();

    let err = players
        .update_one(
            doc! { "id": "p1", "status": "pending" },
            doc! { "$set": { "status": "done" } },
            UpdateOptions::upsert(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DocumentStoreError::DuplicateId { ref id, .. } if id == "p1"));
    let original = players.find_by_id("p1").lean().await.unwrap().unwrap();
    assert_eq!(original.get_str("status").unwrap(), "active");
}

#[tokio::test]
async fn find_one_and_update_without_upsert_returns_none() {
    let players = store().model("Player").unwrap();

    let updated = players
        .find_one_and_update(doc! { "name": "Nobody" }, doc! { "$set": { "score": 1 } }, UpdateOptions::default())
        .await
        .unwrap();

    assert!(updated.is_none());
    assert_eq!(players.count_documents(doc! {}).await.unwrap(), 0);
}

#[tokio::test]
async fn find_one_and_update_returns_the_updated_document() {
    let players = store().model("Player").unwrap();
    let ann = players.create(doc! { "name": "Ann", "score": 1 }).await.unwrap();

    let updated = players
        .find_one_and_update(doc! { "name": "Ann" }, doc! { "$set": { "score": 9 } }, UpdateOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.id(), ann.id());
    assert_eq!(updated.get_i32("score").unwrap(), 9);
}

#[tokio::test]
async fn deletes_report_counts() {
    let players = store().model("Player").unwrap();
    for team in ["red", "red", "blue"] {
        players.create(doc! { "team": team }).await.unwrap();
    }

    let one = players.delete_one(doc! { "team": "red" }).await.unwrap();
    let many = players.delete_many(doc! { "team": { "$in": ["red", "blue"] } }).await.unwrap();
    let none = players.delete_one(doc! {}).await.unwrap();

    assert_eq!(one.deleted_count, 1);
    assert_eq!(many.deleted_count, 2);
    assert_eq!(none.deleted_count, 0);
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Player {
    name: String,
    score: i32,
}

#[tokio::test]
async fn typed_values_encode_and_decode() {
    let players = store().model("Player").unwrap();
    let ann = Player { name: "Ann".into(), score: 10 };

    let created = players.create_from(&ann).await.unwrap();
    let found = players.find_by_id(created.id()).await.unwrap().unwrap();

    assert_eq!(found.decode::<Player>().unwrap(), ann);
}

const OLD_STAMP: &str = "2000-01-01T00:00:00.000Z";

async fn seed_old_player(backend: &InMemoryStore, table: &str, id: &str) {
    let key = ItemKey::for_document("Player", id);
    backend
        .put_item(
            table,
            doc! {
                "primaryKey": &key.primary_key,
                "sortKey": &key.sort_key,
                "id": id,
                "model": "Player",
                "name": id,
                "score": 1,
                "createdAt": OLD_STAMP,
                "updatedAt": OLD_STAMP,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn every_update_path_refreshes_updated_at() {
    let backend = Arc::new(InMemoryStore::new());
    let registry = ModelRegistry::builder().register(ModelDef::new("Player")).build().unwrap();
    let store = DocumentStore::new(backend.clone(), registry);
    let table = store.options().table.clone();
    for id in ["many", "one", "found"] {
        seed_old_player(&backend, &table, id).await;
    }
    let players = store.model("Player").unwrap();

    players
        .update_many(doc! { "name": "many" }, doc! { "$inc": { "score": 1 } })
        .await
        .unwrap();
    players
        .update_one(doc! { "name": "one" }, doc! { "$inc": { "score": 1 } }, UpdateOptions::default())
        .await
        .unwrap();
    players
        .find_one_and_update(doc! { "name": "found" }, doc! { "$inc": { "score": 1 } }, UpdateOptions::default())
        .await
        .unwrap()
        .unwrap();

    for id in ["many", "one", "found"] {
        let stored = players.find_by_id(id).lean().await.unwrap().unwrap();
        assert_eq!(stored.get_i32("score").unwrap(), 2, "{id}");
        assert_eq!(stored.get_str("createdAt").unwrap(), OLD_STAMP, "{id}");
        assert!(stored.get_str("updatedAt").unwrap() > OLD_STAMP, "{id}");
    }
}

#[tokio::test]
async fn saving_a_partial_document_after_it_was_deleted_writes_nothing() {
    let players = store().model("Player").unwrap();
    let ann = players.create(doc! { "name": "Ann", "score": 1 }).await.unwrap();

    let mut partial = players.find_by_id(ann.id()).select("score").await.unwrap().unwrap();
    players.delete_one(doc! { "id": ann.id() }).await.unwrap();
    partial.set("score", 5);
    partial.save().await.unwrap();

    assert!(players.find_by_id(ann.id()).await.unwrap().is_none());
    assert_eq!(players.count_documents(doc! {}).await.unwrap(), 0);
}
