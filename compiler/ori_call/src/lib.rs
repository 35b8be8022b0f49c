//! Call-site specialization for the Ori interpreter.
//!
//! A [`CallSite`] caches what it learns about the callees it sees: the
//! first few get a chain link each, with arguments matched once and reused
//! on later calls. Calls that forward `...` cache per argument shape
//! instead. Past [`CacheLimits`] a site falls back to matching on every
//! call.
//!
//! ```text
//! CallSite::execute
//!     │ resolve callee (LookupCache)
//!     ▼
//! chain ──▶ link(f) ──▶ link(g) ──▶ ... ──▶ generic
//!              │            │
//!          fixed target  variadic subchain ──▶ shape ──▶ ... ──▶ generic
//!              │            │
//!              └────────────┴──▶ Invoker ──▶ callee body
//! ```
//!
//! Environments, lookup and guards live in `ori_frame`.

mod args;
mod call_site;
mod chain;
mod config;
mod invoker;
mod matcher;

use std::sync::Once;

pub use args::{ArgExpr, ArgSpec, CallArguments, SuppliedNames, VariadicSignature};
pub use call_site::{CallSite, CallSiteBuilder, CalleeExpr};
pub use chain::{ChainShape, LinkShape};
pub use config::CacheLimits;
pub use invoker::{Invoker, DEFAULT_MAX_CALL_DEPTH};
pub use matcher::{
    ArgumentMatcher, CallSourceInfo, FormalMatcher, FormalSource, MatchedArguments, SharedMatcher,
};

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber when `RUST_LOG` is set.
///
/// Safe to call more than once. Chain specialization and guard
/// invalidation log at `debug`; chain misses and lookups at `trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}
