//! Connect-time DNS guard for the HTTP client.
//!
//! Validation resolves a host once; the HTTP client resolves it again when
//! dialing. Routing the client's lookups through [`DnsSafetyResolver`] means
//! an answer that changed to a private address in between is refused.

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};

use crate::safety::DnsSafetyResolver;

pub struct GuardedDnsResolver {
    dns: Arc<DnsSafetyResolver>,
}

impl GuardedDnsResolver {
    pub fn new(dns: Arc<DnsSafetyResolver>) -> Self {
        Self { dns }
    }
}

impl Resolve for GuardedDnsResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let dns = self.dns.clone();
        Box::pin(async move {
            let ips = dns.resolve_public(name.as_str()).await?;
            let addrs: Addrs = Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok::<_, Box<dyn StdError + Send + Sync>>(addrs)
        })
    }
}
