#![deny(missing_docs)]

//! Core library for the Rusty Docs PDF ingestion server.

/// HTTP routing and upload handlers.
pub mod api;
/// Blob storage used to archive uploads.
pub mod blob;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Document ingestion pipeline.
pub mod processing;
/// Vector store abstraction and adapters.
pub mod vector_store;
