//! Test helpers module
//!
//! Mock Bot API server and update builders shared by the integration tests.

#![allow(dead_code)]

pub mod telegram_mock;
pub mod test_data;

pub use telegram_mock::*;
pub use test_data::*;
