//! URL safety check command.

use std::sync::Arc;

use console::style;

use crate::config::Settings;
use crate::safety::{classify, DnsSafetyResolver, UrlValidator};

/// Run the URL validator on one input and print the verdict.
pub async fn cmd_check(settings: &Settings, url: &str) -> anyhow::Result<()> {
    let dns = Arc::new(DnsSafetyResolver::new(settings.dns.clone()));
    let validator = UrlValidator::new(dns.clone());

    match validator.validate(url).await {
        Ok(target) => {
            println!("{} {}", style("✓").green(), target);
            let verdict = classify(target.host());
            println!("  Host:     {} ({:?})", target.host(), verdict.reason);
            if let Ok(addrs) = dns.resolve_public(target.host()).await {
                let addrs: Vec<String> = addrs.iter().map(|a| a.to_string()).collect();
                println!("  Resolves: {}", addrs.join(", "));
            }
            Ok(())
        }
        Err(reason) => {
            eprintln!("{} {}: {}", style("✗").red(), url, reason);
            std::process::exit(1);
        }
    }
}
