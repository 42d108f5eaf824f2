//! Multi-tenant GST invoicing backend.
//!
//! The [`ledger`] module keeps invoice and supplier bill balances consistent;
//! everything else is the HTTP surface and batch jobs around it.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod entitlements;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod money;
pub mod parties;
pub mod rate_limit;
pub mod validation;
pub mod webhooks;
pub mod worker;
