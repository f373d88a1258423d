//! Integration tests for the audit pipeline
//!
//! The crawler and link probe are replaced by scripted fakes; storage is an
//! in-memory SQLite database and callbacks go to a wiremock server.

mod callback_tests;
mod common;
mod pipeline_tests;
mod recovery_tests;
