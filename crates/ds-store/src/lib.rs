//! # ds-store
//!
//! Store contracts for the directory store.
//!
//! This crate defines the interfaces a tenant-scoped backend implements,
//! independent of the directory protocol behind it.
//!
//! ## Store Traits
//!
//! - [`ReaderStore`] - lookups and paged searches returning domain objects
//! - [`WriterStore`] - creates, updates, deletes and their cascades
//!
//! Every write returns a [`ds_model::ProviderResponse`]; every failure is a
//! [`StoreError`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod criteria;
pub mod error;
pub mod reader;
pub mod writer;

pub use criteria::{PageRequest, PageResult, SearchCriteria, SearchType};
pub use error::{StoreError, StoreResult};
pub use reader::ReaderStore;
pub use writer::WriterStore;
