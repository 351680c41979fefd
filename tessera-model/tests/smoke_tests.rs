//! End-to-end smoke tests for the Tessera record layer

use serde_json::json;
use tessera_core::{Document, PrimaryKey, Query, RecordError, TesseraError, TesseraResult};
use tessera_core::{ListRequest, SortKey};
use tessera_model::{
    ExecResult, ReadOptions, RemoveAck, SaveOutcome, UpdateMode, UpdateOutcome, WriteOptions,
};
use tessera_test_utils::assertions::*;
use tessera_test_utils::fixtures::*;
use tessera_test_utils::{doc, init_tracing};

#[tokio::test]
async fn smoke_test_full_crud_chain() -> TesseraResult<()> {
    init_tracing();
    let (registry, _db, _cache) = memory_registry(fast_config());

    // Author
    let mut users = registry.register(user_definition()).await?;
    let author = users
        .create(
            doc(json!({"name": "ada", "email": "ada@example.com"})),
            WriteOptions::default(),
        )
        .await?;
    assert_eq!(author, PrimaryKey::Int(1));

    // Post referencing the author; sequences are per table
    let mut posts = registry.register(post_definition()).await?;
    let mut payload = post(7);
    payload.insert("author_id".into(), json!(1));
    let key = posts.create(payload, WriteOptions::default()).await?;
    assert_eq!(key, PrimaryKey::Int(1));
    assert!(!posts.is_new());

    let found = posts
        .find_one(key.clone(), ReadOptions::default())
        .await?
        .expect("post exists");
    assert_eq!(found["title"], json!("post 7"));
    assert_eq!(found["views"], json!(7));
    assert_eq!(found["author"][0]["name"], json!("ada"));

    // Update never writes the primary key
    let outcome = posts
        .update(
            doc(json!({"rowid": 1})),
            doc(json!({"title": "edited", "rowid": 99})),
            UpdateMode::Update,
            WriteOptions::default(),
        )
        .await?;
    assert_eq!(
        outcome,
        UpdateOutcome::Acknowledged {
            matched: 1,
            modified: 1
        }
    );
    let found = posts
        .find_one(PrimaryKey::Int(1), ReadOptions::default())
        .await?
        .expect("post still keyed 1");
    assert_eq!(found["title"], json!("edited"));
    assert_eq!(found["rowid"], json!(1));

    let after = posts
        .find_one_and_update(
            doc(json!({"rowid": 1})),
            doc(json!({"$inc": {"views": 1}})),
            WriteOptions::default(),
        )
        .await?;
    assert_eq!(after["views"], json!(8));

    let page = posts
        .find_list_cached(
            &ListRequest::new(Document::new()).with_sort(SortKey::asc("rowid")),
            ReadOptions::default(),
        )
        .await?;
    assert_eq!(page.count, 1);
    assert_eq!(page.list.len(), 1);

    // Remove, then remove again
    let ack = posts
        .remove(doc(json!({"rowid": 1})), WriteOptions::default())
        .await?;
    assert_eq!(
        ack,
        RemoveAck {
            deleted: 1,
            keys: vec![PrimaryKey::Int(1)]
        }
    );
    assert_no_matching_record(
        &posts
            .remove(doc(json!({"rowid": 1})), WriteOptions::default())
            .await,
    );
    assert!(posts
        .find_one(PrimaryKey::Int(1), ReadOptions::default())
        .await?
        .is_none());

    Ok(())
}

#[tokio::test]
async fn smoke_test_save_creates_then_updates() -> TesseraResult<()> {
    let (registry, _db, _cache) = memory_registry(fast_config());
    let mut posts = registry.register(post_definition()).await?;

    posts.set("title", json!("draft"))?;
    let created = posts.save(WriteOptions::default()).await?;
    assert_eq!(created, SaveOutcome::Created(PrimaryKey::Int(1)));

    posts.set("title", json!("final"))?;
    let updated = posts.save(WriteOptions::default()).await?;
    assert!(matches!(
        updated,
        SaveOutcome::Updated(UpdateOutcome::Acknowledged { matched: 1, .. })
    ));

    let found = posts
        .find_one(PrimaryKey::Int(1), ReadOptions::default())
        .await?
        .expect("saved post");
    assert_eq!(found["title"], json!("final"));
    assert_eq!(posts.count(&Document::new()).await?, 1);
    Ok(())
}

#[tokio::test]
async fn smoke_test_validation_runs_before_io() -> TesseraResult<()> {
    let (registry, db, cache) = memory_registry(fast_config());
    let mut posts = registry.register(post_definition()).await?;

    assert_empty_payload(&posts.create(Document::new(), WriteOptions::default()).await);
    assert_validation_error(
        &posts
            .create(doc(json!({"views": 3})), WriteOptions::default())
            .await,
    );
    assert_validation_error(
        &posts
            .update(
                doc(json!({"rowid": 1})),
                doc(json!({"title": "x", "$inc": {"views": 1}})),
                UpdateMode::Update,
                WriteOptions::default(),
            )
            .await,
    );
    assert_empty_payload(
        &posts
            .update(
                doc(json!({"rowid": 1})),
                doc(json!({"rowid": 2})),
                UpdateMode::Update,
                WriteOptions::default(),
            )
            .await,
    );

    // Nothing reached the store or the cache.
    let stored = tessera_storage::StoreClient::count(&db.open("master", "posts"), &Document::new())
        .await?;
    assert_eq!(stored, 0);
    assert_eq!(cache.key_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn smoke_test_exec_operations() -> TesseraResult<()> {
    let (registry, _db, _cache) = memory_registry(fast_config());
    let posts = registry.register(post_definition()).await?;
    for n in 1..=3 {
        posts
            .clone()
            .create(post(n), WriteOptions::default())
            .await?;
    }

    assert_eq!(
        posts.exec("count", Query::new()).await?,
        ExecResult::Count(3)
    );
    let ExecResult::Documents(docs) = posts
        .exec("find", Query::new().sort_by(SortKey::desc("views")).limit(2))
        .await?
    else {
        panic!("find returns documents");
    };
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["views"], json!(3));

    let ExecResult::Documents(counted) = posts
        .exec(
            "find",
            Query::new().aggregate(vec![
                json!({"$match": {"views": {"$gte": 2}}}),
                json!({"$count": "total"}),
            ]),
        )
        .await?
    else {
        panic!("aggregate returns documents");
    };
    assert_eq!(counted[0]["total"], json!(2));

    let err = posts.exec("distinct", Query::new()).await.unwrap_err();
    assert!(matches!(
        err,
        TesseraError::Record(RecordError::UnsupportedOperation { .. })
    ));
    Ok(())
}
