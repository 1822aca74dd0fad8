//! Outbound target safety checks.
//!
//! - [`address`]: literal classification of hosts and IPs
//! - [`dns`]: resolution with a TTL cache, any private answer is unsafe
//! - [`url`]: turns user input into a vetted [`TargetUrl`]

pub mod address;
pub mod dns;
pub mod url;

pub use address::{classify, classify_ip, AddressReason, AddressVerdict};
pub use dns::{DnsConfig, DnsSafetyResolver, HostLookup, SystemLookup, UnsafeHost};
pub use url::{RejectionReason, TargetUrl, UrlValidator, UNSAFE_TARGET_MESSAGE};
