// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:     Configuration structs loaded from JSON
// - schema:     Channel, message and archive record types
// - util:       Shared helpers (snowflake parsing, backoff)
// - source:     MessageSource trait and the Discord REST source
// - collector:  Gate, per-channel fetcher and run orchestration
// - aggregate:  Normalization and global ordering of messages
// - archive:    Line-delimited JSON archive store
// - analytics:  Offline reports over the archive
// - metrics:    Global runtime counters
//
pub mod aggregate;
pub mod analytics;
pub mod archive;
pub mod collector;
pub mod config;
pub mod metrics;
pub mod schema;
pub mod source;
pub mod util;
