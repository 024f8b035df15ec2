//! Shell manifest: the asset list one version must cache, plus store naming
//! and bypass configuration.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::SwError;

/// Separator between the app prefix and the version tag in store names.
const CACHE_INFIX: &str = "-cache-";

/// Configuration for one deployed shell version.
///
/// Changing the asset list only reaches existing users through a version
/// bump: the new version installs into its own store, and the old store is
/// purged when the new version activates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellManifest {
    /// Prefix scoping this application's stores.
    pub app_prefix: String,
    /// Version tag, bumped on every deployment that changes cached assets.
    pub version: String,
    /// Shell asset locators. Relative paths resolve against the proxy scope;
    /// absolute URLs are kept as-is (CDN assets, font stylesheets).
    pub shell_urls: Vec<String>,
    /// The document served when a navigation fails offline. Must be listed in
    /// `shell_urls`, otherwise it would never be cached.
    pub fallback_url: String,
    /// URL schemes the proxy never intercepts.
    #[serde(default)]
    pub bypass_schemes: Vec<String>,
}

impl ShellManifest {
    /// The LogReel Pro shell.
    pub fn logreel() -> Self {
        Self {
            app_prefix: "logreelpro".to_string(),
            version: "1.0.0".to_string(),
            shell_urls: vec![
                "./".to_string(),
                "./index.html".to_string(),
                "./manifest.json".to_string(),
                "./icon-192x192.png".to_string(),
                "./icon-512x512.png".to_string(),
                "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap"
                    .to_string(),
            ],
            fallback_url: "./index.html".to_string(),
            bypass_schemes: vec!["chrome-extension".to_string()],
        }
    }

    /// Parse a manifest from JSON.
    pub fn from_json(json: &str) -> Result<Self, SwError> {
        serde_json::from_str(json).map_err(|e| SwError::Config(format!("invalid manifest: {}", e)))
    }

    /// Store name for this version: `<app-prefix>-cache-<version>`.
    pub fn cache_name(&self) -> String {
        format!("{}{}{}", self.app_prefix, CACHE_INFIX, self.version)
    }

    /// Name prefix shared by every store of this application, any version.
    pub fn cache_family(&self) -> String {
        format!("{}{}", self.app_prefix, CACHE_INFIX)
    }

    /// Whether a store belongs to this application but not to this version.
    pub fn is_stale_store(&self, name: &str) -> bool {
        name.starts_with(&self.cache_family()) && name != self.cache_name()
    }

    /// Whether the proxy must leave requests to this URL untouched.
    pub fn is_bypassed(&self, url: &Url) -> bool {
        self.bypass_schemes.iter().any(|scheme| scheme == url.scheme())
    }

    /// Check the manifest is usable.
    pub fn validate(&self) -> Result<(), SwError> {
        if self.app_prefix.is_empty() {
            return Err(SwError::Config("app_prefix must not be empty".to_string()));
        }
        if self.version.is_empty() {
            return Err(SwError::Config("version must not be empty".to_string()));
        }
        if self.shell_urls.is_empty() {
            return Err(SwError::Config("shell_urls must not be empty".to_string()));
        }
        if !self.shell_urls.contains(&self.fallback_url) {
            return Err(SwError::Config(format!(
                "fallback_url {} is not in shell_urls",
                self.fallback_url
            )));
        }
        Ok(())
    }

    /// Resolve the shell locators against the proxy scope, in manifest order.
    pub fn resolve_shell_urls(&self, scope: &Url) -> Result<Vec<Url>, SwError> {
        self.shell_urls.iter().map(|raw| resolve(scope, raw)).collect()
    }

    /// Resolve the offline fallback locator against the proxy scope.
    pub fn resolve_fallback(&self, scope: &Url) -> Result<Url, SwError> {
        resolve(scope, &self.fallback_url)
    }
}

impl Default for ShellManifest {
    fn default() -> Self {
        Self::logreel()
    }
}

fn resolve(scope: &Url, raw: &str) -> Result<Url, SwError> {
    scope.join(raw).map_err(|e| {
        SwError::Config(format!("cannot resolve {} against {}: {}", raw, scope, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Url {
        Url::parse("https://app.logreel.test/").unwrap()
    }

    #[test]
    fn test_cache_name_format() {
        let manifest = ShellManifest::logreel();
        assert_eq!(manifest.cache_name(), "logreelpro-cache-1.0.0");
        assert_eq!(manifest.cache_family(), "logreelpro-cache-");
    }

    #[test]
    fn test_stale_store_detection() {
        let manifest = ShellManifest::logreel();
        assert!(manifest.is_stale_store("logreelpro-cache-0.9.0"));
        assert!(manifest.is_stale_store("logreelpro-cache-2.0.0-beta"));
        // The current store and foreign stores are not stale.
        assert!(!manifest.is_stale_store("logreelpro-cache-1.0.0"));
        assert!(!manifest.is_stale_store("otherapp-cache-1.0.0"));
        assert!(!manifest.is_stale_store("logreelpro-data"));
    }

    #[test]
    fn test_default_is_logreel_shell() {
        let manifest = ShellManifest::default();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.shell_urls.len(), 6);
        assert_eq!(manifest.fallback_url, "./index.html");
    }

    #[test]
    fn test_validate_rejects_unlisted_fallback() {
        let manifest = ShellManifest {
            fallback_url: "./offline.html".to_string(),
            ..ShellManifest::logreel()
        };
        let err = manifest.validate().unwrap_err();
        assert!(matches!(err, SwError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let empty_prefix = ShellManifest {
            app_prefix: String::new(),
            ..ShellManifest::logreel()
        };
        assert!(empty_prefix.validate().is_err());

        let empty_version = ShellManifest {
            version: String::new(),
            ..ShellManifest::logreel()
        };
        assert!(empty_version.validate().is_err());

        let no_urls = ShellManifest {
            shell_urls: Vec::new(),
            ..ShellManifest::logreel()
        };
        assert!(no_urls.validate().is_err());
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let manifest = ShellManifest::logreel();
        let resolved = manifest.resolve_shell_urls(&scope()).unwrap();

        assert_eq!(resolved[0].as_str(), "https://app.logreel.test/");
        assert_eq!(resolved[1].as_str(), "https://app.logreel.test/index.html");
        // Absolute locators keep their own origin.
        assert_eq!(resolved[5].host_str(), Some("fonts.googleapis.com"));

        let fallback = manifest.resolve_fallback(&scope()).unwrap();
        assert_eq!(fallback.as_str(), "https://app.logreel.test/index.html");
    }

    #[test]
    fn test_bypass_schemes() {
        let manifest = ShellManifest::logreel();
        let extension = Url::parse("chrome-extension://abcdef/page.html").unwrap();
        assert!(manifest.is_bypassed(&extension));
        assert!(!manifest.is_bypassed(&scope()));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "app_prefix": "logreelpro",
            "version": "2.0.0",
            "shell_urls": ["./", "./index.html"],
            "fallback_url": "./index.html"
        }"#;
        let manifest = ShellManifest::from_json(json).unwrap();
        assert_eq!(manifest.cache_name(), "logreelpro-cache-2.0.0");
        // bypass_schemes defaults to empty when omitted.
        assert!(manifest.bypass_schemes.is_empty());

        assert!(ShellManifest::from_json("{not json").is_err());
    }
}
