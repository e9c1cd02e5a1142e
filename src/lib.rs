//! Offline structural consistency checking for Sombra record stores.
//!
//! The checker sweeps every fixed-size record file of a store set (nodes,
//! relationships, properties, dynamic values, tokens, schema) plus the
//! label-scan and secondary indexes, verifying each cross-reference with
//! bounded memory. Findings are tallied into a [`report::CheckSummary`];
//! the stores themselves are only ever read.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod access;
pub mod check;
pub mod config;
pub mod error;
pub mod full;
pub mod logging;
pub mod report;
pub mod store;
pub mod types;

pub use config::{CheckConfig, ExecutionOrder};
pub use error::{CheckError, Result};
pub use full::FullCheck;
pub use report::{CheckSummary, Inconsistency, InconsistencyKind, RecordType, Severity};
pub use store::DirectStoreAccess;
