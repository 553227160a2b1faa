//! # Query Shape Normalization
//!
//! Best-effort rewriting of outgoing analytical queries for the columnar
//! store. Never blocks execution: unrecognized shapes pass through unchanged.

pub mod interceptor;

pub use interceptor::{InterceptorStats, QueryShapeInterceptor, RewriteRecord};
