//! Technology signals read from the rendered page's JavaScript globals.

use serde::{Deserialize, Serialize};

/// Evaluated in the page after rendering. Every probe is wrapped so a hostile
/// page cannot make the whole object fail.
pub const JS_SIGNALS_SCRIPT: &str = r#"
(() => {
    const probe = (fn) => { try { return !!fn(); } catch (_) { return false; } };
    const version = (fn) => { try { const v = fn(); return v ? String(v) : null; } catch (_) { return null; } };
    return {
        hasReact: probe(() => window.React || document.querySelector('[data-reactroot]') || window.__REACT_DEVTOOLS_GLOBAL_HOOK__),
        reactVersion: version(() => window.React && window.React.version),
        hasNextData: probe(() => window.__NEXT_DATA__ || document.getElementById('__NEXT_DATA__')),
        hasNuxt: probe(() => window.__NUXT__ || window.$nuxt),
        hasVue: probe(() => window.Vue || window.__VUE__ || document.querySelector('[data-v-app]')),
        vueVersion: version(() => window.Vue && window.Vue.version),
        hasAngular: probe(() => window.ng || window.getAllAngularRootElements || document.querySelector('[ng-version]')),
        angularVersion: version(() => { const el = document.querySelector('[ng-version]'); return el && el.getAttribute('ng-version'); }),
        hasSvelte: probe(() => window.__svelte || document.querySelector('[class*="svelte-"]')),
        hasGatsby: probe(() => window.___gatsby || document.getElementById('___gatsby')),
        hasRemix: probe(() => window.__remixContext),
        hasAstro: probe(() => document.querySelector('astro-island')),
        hasJquery: probe(() => window.jQuery),
        jqueryVersion: version(() => window.jQuery && window.jQuery.fn && window.jQuery.fn.jquery),
        hasWordpress: probe(() => window.wp || document.querySelector('link[href*="wp-content"]')),
        hasShopify: probe(() => window.Shopify),
        hasGoogleAnalytics: probe(() => window.ga || window.gtag || window.dataLayer),
        hasServiceWorker: probe(() => navigator.serviceWorker && navigator.serviceWorker.controller),
        scriptCount: document.scripts ? document.scripts.length : 0,
    };
})()
"#;

/// Framework and library globals detected in the rendered page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JsSignals {
    pub has_react: bool,
    pub react_version: Option<String>,
    pub has_next_data: bool,
    pub has_nuxt: bool,
    pub has_vue: bool,
    pub vue_version: Option<String>,
    pub has_angular: bool,
    pub angular_version: Option<String>,
    pub has_svelte: bool,
    pub has_gatsby: bool,
    pub has_remix: bool,
    pub has_astro: bool,
    pub has_jquery: bool,
    pub jquery_version: Option<String>,
    pub has_wordpress: bool,
    pub has_shopify: bool,
    pub has_google_analytics: bool,
    pub has_service_worker: bool,
    pub script_count: u32,
}

impl JsSignals {
    /// Parse the script's result. Missing or mistyped fields fall back to
    /// defaults instead of failing the render.
    pub fn from_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Names of detected frameworks and libraries.
    pub fn detected(&self) -> Vec<&'static str> {
        [
            (self.has_react, "React"),
            (self.has_next_data, "Next.js"),
            (self.has_nuxt, "Nuxt"),
            (self.has_vue, "Vue"),
            (self.has_angular, "Angular"),
            (self.has_svelte, "Svelte"),
            (self.has_gatsby, "Gatsby"),
            (self.has_remix, "Remix"),
            (self.has_astro, "Astro"),
            (self.has_jquery, "jQuery"),
            (self.has_wordpress, "WordPress"),
            (self.has_shopify, "Shopify"),
            (self.has_google_analytics, "Google Analytics"),
        ]
        .into_iter()
        .filter_map(|(present, name)| present.then_some(name))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_reads_known_fields() {
        let signals = JsSignals::from_value(json!({
            "hasReact": true,
            "reactVersion": "18.2.0",
            "hasNextData": true,
            "scriptCount": 14,
            "somethingNew": "ignored",
        }));
        assert!(signals.has_react);
        assert_eq!(signals.react_version.as_deref(), Some("18.2.0"));
        assert_eq!(signals.script_count, 14);
        assert_eq!(signals.detected(), vec!["React", "Next.js"]);
    }

    #[test]
    fn test_from_value_tolerates_garbage() {
        assert_eq!(JsSignals::from_value(json!(null)), JsSignals::default());
        assert_eq!(
            JsSignals::from_value(json!({"hasReact": "yes"})),
            JsSignals::default()
        );
    }
}
