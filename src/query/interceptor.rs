//! # Query Shape Interceptor
//!
//! The columnar store rejects bracket indexing on array columns
//! (`visit_ids[1]`); the correct form is `arrayElement(visit_ids, 1)`.
//! Queries written against the ORM's syntax keep arriving with the bracket
//! shape, so outgoing queries are normalized before execution.
//!
//! This is a best-effort normalizer, not a validator: only bracket access on
//! columns known to be array-typed is rewritten, everything else passes
//! through unmodified, and the interceptor itself never fails a query.

use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing::debug;

static ARRAY_ACCESS_RE: OnceLock<Regex> = OnceLock::new();

/// `identifier[index]` where the index itself contains no brackets.
fn array_access_re() -> &'static Regex {
    ARRAY_ACCESS_RE.get_or_init(|| {
        Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\[\s*([^\[\]]+?)\s*\]")
            .expect("array access pattern is valid")
    })
}

/// Per-execution rewrite result.
#[derive(Debug, Clone, Serialize)]
pub struct RewriteRecord {
    pub original: String,
    /// Present only when a fix was applied
    pub rewritten: Option<String>,
    pub fixed: bool,
}

impl RewriteRecord {
    /// The query text to execute.
    pub fn effective(&self) -> &str {
        self.rewritten.as_deref().unwrap_or(&self.original)
    }
}

/// Process-wide rewrite counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct InterceptorStats {
    pub queries_executed: u64,
    pub queries_fixed: u64,
}

/// Rewrites incorrect array-element access on known array columns.
#[derive(Debug)]
pub struct QueryShapeInterceptor {
    array_columns: HashSet<String>,
    queries_executed: AtomicU64,
    queries_fixed: AtomicU64,
}

impl QueryShapeInterceptor {
    pub fn new<I, S>(array_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            array_columns: array_columns.into_iter().map(Into::into).collect(),
            queries_executed: AtomicU64::new(0),
            queries_fixed: AtomicU64::new(0),
        }
    }

    /// Normalize an outgoing query, recording execution and fix counters.
    ///
    /// Bracket access on a known array column becomes
    /// `arrayElement(column, index)`; anything else is left untouched.
    pub fn normalize(&self, query: &str) -> RewriteRecord {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);

        let mut fixes = 0u64;
        let rewritten = array_access_re().replace_all(query, |caps: &Captures<'_>| {
            let column = &caps[1];
            if self.array_columns.contains(column) {
                fixes += 1;
                format!("arrayElement({}, {})", column, caps[2].trim())
            } else {
                caps[0].to_string()
            }
        });

        if fixes > 0 {
            self.queries_fixed.fetch_add(1, Ordering::Relaxed);
            debug!(fixes = fixes, "Rewrote array access to arrayElement form");
            RewriteRecord {
                original: query.to_string(),
                rewritten: Some(rewritten.into_owned()),
                fixed: true,
            }
        } else {
            RewriteRecord {
                original: query.to_string(),
                rewritten: None,
                fixed: false,
            }
        }
    }

    pub fn statistics(&self) -> InterceptorStats {
        InterceptorStats {
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_fixed: self.queries_fixed.load(Ordering::Relaxed),
        }
    }

    /// Zero both counters.
    pub fn reset_statistics(&self) {
        self.queries_executed.store(0, Ordering::Relaxed);
        self.queries_fixed.store(0, Ordering::Relaxed);
    }
}
