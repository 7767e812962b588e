pub mod config;

pub use failure::Error;
use std::result::Result as StdResult;

/// Shared result alias: every fallible boundary in this crate returns one of
/// the `Fail` enums defined alongside the module it belongs to
/// (`path::PathError`, `model::ModelError`, `xml::XmlError`,
/// `storage::StorageReadError` / `StorageWriteError`), converted here so
/// callers can `?`-propagate across module boundaries.
pub type Result<T> = StdResult<T, Error>;
