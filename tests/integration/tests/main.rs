//! End-to-End Integration Tests
//!
//! These tests drive the reader and writer stores of complete tenants,
//! resolved through the store registry, against an in-process directory.

mod common;
mod applications;
mod certificates;
mod tenants;
mod users;
