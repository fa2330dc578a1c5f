#![allow(dead_code)]

use std::sync::Once;

use actorstate::prelude::*;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
pub struct Article {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
pub struct Tag {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
pub struct Room {
    #[record(key)]
    pub id: i64,
    #[record(key)]
    pub key_ext: String,
    pub topic: String,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
pub struct Account {
    pub id: i64,
    pub balance: i64,
    #[record(concurrency_token)]
    pub etag: Vec<u8>,
}

/// Token the client manages; the store never fills it in.
#[derive(Debug, Clone, Default, PartialEq, Record)]
pub struct Reading {
    pub id: i64,
    #[record(concurrency_token)]
    pub revision: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
pub struct Measurement {
    pub id: f64,
    pub value: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
pub struct Coupon {
    #[record(key)]
    pub code: String,
    pub discount: i64,
}

/// Wraps an [`Account`] instead of being one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wallet {
    pub account: Option<Account>,
}

impl ActorState for Wallet {
    type Record = Account;
}

pub fn database() -> MemoryDb {
    MemoryDb::new()
        .with_table::<Article>()
        .with_table::<Profile>()
        .with_table::<Tag>()
        .with_table::<Room>()
        .with_table::<Account>()
        .with_table::<Reading>()
        .with_table::<Measurement>()
        .with_table::<Coupon>()
}

/// Uppercase hex of `bytes`, the textual form of byte tokens.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}
