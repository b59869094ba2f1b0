#![doc = "rag-ingest-core: core logic library for rag-ingest."]

//! This crate contains the exporters, the AnythingLLM document-store client and the
//! synchronisation pipeline. The CLI crate only loads configuration and wires these together.
//!
//! # Usage
//! Add this as a dependency for all shared export, upload and pipeline code.

pub mod contract;
pub mod error;
pub mod export;
pub mod http;
pub mod render;
pub mod store;
pub mod synchronise;
