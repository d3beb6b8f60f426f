//! Command handlers

pub mod help;
pub mod start;
pub mod subscribe;
pub mod subscriptions;
