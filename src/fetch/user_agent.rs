//! User agent handling for outbound requests.

/// Identifies audit traffic to the sites being audited.
pub const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; SiteAudit/",
    env!("CARGO_PKG_VERSION"),
    "; website audit)"
);

/// Desktop Chrome string used when a site serves reduced markup to bots.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Resolve a configured user agent.
/// - None or empty => default SiteAudit user agent
/// - "browser" => desktop Chrome user agent
/// - anything else => used verbatim
pub fn resolve_user_agent(config_value: Option<&str>) -> String {
    match config_value.map(str::trim) {
        None | Some("") => USER_AGENT.to_string(),
        Some(v) if v.eq_ignore_ascii_case("browser") => BROWSER_USER_AGENT.to_string(),
        Some(custom) => custom.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent() {
        assert_eq!(resolve_user_agent(None), USER_AGENT);
        assert_eq!(resolve_user_agent(Some("  ")), USER_AGENT);
        assert_eq!(resolve_user_agent(Some("Browser")), BROWSER_USER_AGENT);
        assert_eq!(resolve_user_agent(Some("MyBot/1.0")), "MyBot/1.0");
    }

    #[test]
    fn test_default_user_agent_is_descriptive() {
        assert!(USER_AGENT.contains("SiteAudit/"));
    }
}
