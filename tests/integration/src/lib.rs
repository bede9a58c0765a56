//! Integration tests across the workspace crates
//!
//! This test suite validates:
//! - Device-to-device exposure detection over the loopback radio
//! - The HTTP report service client against a mock server
//! - Concurrent ingestion and matching on one on-disk database

pub mod test_utils;


#[cfg(test)]
mod report_service_tests;

#[cfg(test)]
mod concurrency_tests;
