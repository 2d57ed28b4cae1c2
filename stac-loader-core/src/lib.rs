#![doc = "stac-loader-core: core logic library for stac-loader."]

//! This crate holds the ingestion pipeline: document model, normalization,
//! bounded-concurrency fetching and bulk indexing. Storage and index clients
//! are consumed through the traits in [`contract`]; the network-backed
//! implementations live in the `stac-loader` crate.

pub mod bulk;
pub mod config;
pub mod contract;
pub mod document;
pub mod fetch;
pub mod normalize;
pub mod synchronise;
