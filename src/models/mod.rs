//! Data models of the podcast bot
//!
//! Models live inside the per-user data maps of the application and are
//! persisted together with them.

pub mod subscription;

pub use subscription::{Subscription, SubscriptionList};
