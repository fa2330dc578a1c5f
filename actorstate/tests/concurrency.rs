#![cfg(all(feature = "macros", feature = "memory"))]

mod common;

use actorstate::{prelude::*, session::SessionError};
use common::*;

fn seeded() -> MemoryDb {
    let db = database();
    db.insert(Account {
        id: 1,
        balance: 100,
        etag: Vec::new(),
    })
    .unwrap();
    db
}

#[tokio::test]
async fn test_token_tracked_on_read_and_write() {
    init_tracing();

    let db = seeded();
    let storage = ActorStorage::new(db.clone());
    let identity = ActorIdentity::new("Account", 1_i64);
    let mut container = StateContainer::<Account>::default();

    storage
        .read_state("Account", &identity, &mut container)
        .await
        .unwrap();

    let first = container.token.clone();
    assert_eq!(first, Some(hex(&db.records::<Account>()[0].etag)));

    container.state.balance = 90;
    storage
        .write_state("Account", &identity, &mut container)
        .await
        .unwrap();

    let stored = db.records::<Account>();
    assert_eq!(stored[0].balance, 90);
    assert_eq!(container.token, Some(hex(&stored[0].etag)));
    assert_ne!(container.token, first);
    assert_eq!(container.state.etag, stored[0].etag);
}

#[tokio::test]
async fn test_stale_writer_is_rejected() {
    init_tracing();

    let db = seeded();
    let storage = ActorStorage::new(db.clone());
    let identity = ActorIdentity::new("Account", 1_i64);

    let mut first = StateContainer::<Account>::default();
    let mut second = StateContainer::<Account>::default();
    storage
        .read_state("Account", &identity, &mut first)
        .await
        .unwrap();
    storage
        .read_state("Account", &identity, &mut second)
        .await
        .unwrap();

    first.state.balance = 50;
    storage
        .write_state("Account", &identity, &mut first)
        .await
        .unwrap();

    second.state.balance = 0;
    let err = storage
        .write_state("Account", &identity, &mut second)
        .await
        .unwrap_err();

    let inconsistent = err.as_inconsistent().expect("inconsistent state");
    assert_eq!(inconsistent.stored_token, first.token);
    assert_eq!(inconsistent.current_token, second.token);
    assert_ne!(inconsistent.stored_token, inconsistent.current_token);
    assert!(err.to_string().contains("stored token"));

    let conflicted = inconsistent.conflict.entries[0].record::<Account>();
    assert_eq!(conflicted.map(|a| a.balance), Some(0));

    assert_eq!(db.records::<Account>()[0].balance, 50);
}

#[tokio::test]
async fn test_stale_clear_is_rejected() {
    init_tracing();

    let db = seeded();
    let storage = ActorStorage::new(db.clone());
    let identity = ActorIdentity::new("Account", 1_i64);

    let mut first = StateContainer::<Account>::default();
    let mut second = StateContainer::<Account>::default();
    storage
        .read_state("Account", &identity, &mut first)
        .await
        .unwrap();
    storage
        .read_state("Account", &identity, &mut second)
        .await
        .unwrap();

    storage
        .write_state("Account", &identity, &mut first)
        .await
        .unwrap();

    let err = storage
        .clear_state("Account", &identity, &mut second)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Session(SessionError::Concurrency(_))
    ));
    assert_eq!(db.len::<Account>(), 1);

    storage
        .clear_state("Account", &identity, &mut first)
        .await
        .unwrap();
    assert!(db.is_empty::<Account>());
    assert_eq!(first.token, None);
}

#[tokio::test]
async fn test_persistence_checked_on_token() {
    init_tracing();

    let db = database();
    let storage = ActorStorage::new(db.clone());
    storage
        .configure::<Account, _>("ledger", |options| options.check_persistence_on("etag"))
        .unwrap();

    let identity = ActorIdentity::new("Account", 5_i64);
    let mut container = StateContainer::new(Account {
        id: 5,
        balance: 1,
        etag: Vec::new(),
    });

    // Empty token: inserted
    storage
        .write_state("ledger", &identity, &mut container)
        .await
        .unwrap();
    assert!(container.exists);
    assert!(!container.state.etag.is_empty());

    // Generated token: updated
    container.state.balance = 2;
    storage
        .write_state("ledger", &identity, &mut container)
        .await
        .unwrap();

    assert_eq!(db.len::<Account>(), 1);
    assert_eq!(db.records::<Account>()[0].balance, 2);
    assert_eq!(container.token, Some(hex(&container.state.etag)));
}

#[tokio::test]
async fn test_null_token_reads_as_none() {
    init_tracing();

    let db = database();
    db.insert(Reading {
        id: 1,
        revision: None,
    })
    .unwrap();
    db.insert(Reading {
        id: 2,
        revision: Some(1.5),
    })
    .unwrap();

    let storage = ActorStorage::new(db);

    let mut unset = StateContainer::<Reading>::default();
    storage
        .read_state("Reading", &ActorIdentity::new("Reading", 1_i64), &mut unset)
        .await
        .unwrap();
    assert!(unset.exists);
    assert_eq!(unset.token, None);

    let mut set = StateContainer::<Reading>::default();
    storage
        .read_state("Reading", &ActorIdentity::new("Reading", 2_i64), &mut set)
        .await
        .unwrap();
    assert_eq!(set.token.as_deref(), Some("1.5"));
}

#[tokio::test]
async fn test_named_token_property() {
    init_tracing();

    let storage = ActorStorage::new(seeded());
    storage
        .configure::<Account, _>("named", |options| options.use_token_property("etag"))
        .unwrap();

    let engine = storage.storage::<Account>("named").await.unwrap();
    assert!(engine.options().checks_token());
    assert_eq!(engine.options().token().map(|t| t.property), Some("etag"));
}

#[tokio::test]
async fn test_token_configuration_errors() {
    init_tracing();

    let storage = ActorStorage::new(seeded());

    let err = storage
        .configure::<Account, _>("balance", |options| options.use_token_property("balance"))
        .unwrap_err();
    assert!(err.to_string().contains("is not a concurrency token"));

    let err = storage
        .configure::<Account, _>("missing", |options| options.use_token_property("version"))
        .unwrap_err();
    assert!(err.to_string().contains("not found"));

    let err = storage
        .configure::<Article, _>("article", |options| options.use_token())
        .unwrap_err();
    assert!(err.to_string().contains("concurrency token"));
}

#[tokio::test]
async fn test_records_without_token_skip_checks() {
    init_tracing();

    let storage = ActorStorage::new(database());
    let engine = storage.storage::<Article>("Article").await.unwrap();

    assert!(!engine.options().checks_token());
    assert!(engine.options().token().is_none());
}
