//! siteaudit - website audits behind an SSRF-safe admission layer.
//!
//! Untrusted URLs pass through [`safety`] before anything is fetched,
//! expensive work is bounded by [`admission`], and callers are throttled by
//! [`rate_limit`]. [`audit`] ties these together for the HTTP [`server`] and
//! the [`cli`].

pub mod admission;
pub mod audit;
pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod rate_limit;
pub mod safety;
pub mod server;
