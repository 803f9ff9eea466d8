//! Activity logging: bounded-channel logger thread writing JSONL.

pub mod activity;
pub mod jsonl;
