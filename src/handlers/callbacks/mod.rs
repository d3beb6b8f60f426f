//! Callback query handlers

pub mod unsubscribe;
