//! SPF (RFC 7208) `check_host()` evaluation.
//!
//! DNS caching is the caller's responsibility. This library provides
//! a `DnsResolver` trait; implement it with caching at the resolver layer.
//!
//! ```no_run
//! use spf_check::{HickoryResolver, SpfResult, SpfVerifier};
//!
//! # async fn run() {
//! let verifier = SpfVerifier::new(HickoryResolver::new());
//! let verdict = verifier
//!     .check_host("192.0.2.1".parse().unwrap(), "example.com", "user@example.com")
//!     .await;
//! if verdict.result == SpfResult::Fail {
//!     // reject
//! }
//! # }
//! ```

pub mod common;
pub mod spf;

pub use common::dns::{DnsError, DnsResolver, HickoryResolver, MockResolver, MxRecord};
pub use spf::{check_host, SpfConfig, SpfError, SpfResult, SpfVerdict, SpfVerifier};
