//! SPF authorization checks that explain themselves: which directive
//! matched, through which includes and redirects, and what the policy
//! did wrong along the way.
//!
//! DNS is injected through the [`common::dns::DnsResolver`] trait. A
//! hickory-based resolver is provided, and an in-memory one for tests.

pub mod common;
pub mod config;
pub mod logging;
pub mod report;
pub mod spf;
