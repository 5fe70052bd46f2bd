//! The in-memory cache manifest.

use std::collections::HashSet;
use std::fmt;

use url::Url;

use super::codec;
use super::types::{CacheMode, ManifestError, ManifestOptions, SchemePolicy, WildcardFlag};
use super::uri::ManifestUri;

/// A parsed or hand-built cache manifest.
///
/// Every `add_*` operation validates its input against the document's rules
/// and reports whether the entry was accepted; rejected entries leave the
/// document untouched. The derived master entry list is kept in sync on
/// every accepted add.
#[derive(Debug, Clone)]
pub struct ManifestDocument {
    manifest_url: Option<Url>,
    cache_mode: CacheMode,
    explicit_entries: Vec<ManifestUri>,
    fallback_entries: Vec<(ManifestUri, ManifestUri)>,
    online_whitelist_namespaces: Vec<ManifestUri>,
    online_whitelist_wildcard: WildcardFlag,
    master_entries: Vec<ManifestUri>,
    master_index: HashSet<ManifestUri>,
    comment: Option<String>,
    scheme_policy: SchemePolicy,
    same_origin_required: bool,
}

impl Default for ManifestDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestDocument {
    /// Create an empty manifest with no manifest URL.
    ///
    /// Entries are parsed without a base, so relative references are kept
    /// as-is and accepted alongside http/https URIs.
    pub fn new() -> Self {
        Self {
            manifest_url: None,
            cache_mode: CacheMode::Fast,
            explicit_entries: Vec::new(),
            fallback_entries: Vec::new(),
            online_whitelist_namespaces: Vec::new(),
            online_whitelist_wildcard: WildcardFlag::Blocking,
            master_entries: Vec::new(),
            master_index: HashSet::new(),
            comment: None,
            scheme_policy: SchemePolicy::HttpOrHttpsOrNone,
            same_origin_required: false,
        }
    }

    /// Create an empty manifest anchored at `manifest_url`.
    pub fn with_url(manifest_url: &str, options: ManifestOptions) -> Result<Self, ManifestError> {
        let url = Url::parse(manifest_url).map_err(|e| ManifestError::InvalidManifestUrl {
            url: manifest_url.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_url(url, options)
    }

    /// Create an empty manifest anchored at an already parsed URL.
    pub fn from_url(mut manifest_url: Url, options: ManifestOptions) -> Result<Self, ManifestError> {
        validate_manifest_url(&manifest_url)?;
        manifest_url.set_fragment(None);

        let scheme_policy = if options.strict_schemes {
            SchemePolicy::Only(manifest_url.scheme().to_string())
        } else {
            SchemePolicy::HttpOrHttps
        };

        Ok(Self {
            manifest_url: Some(manifest_url),
            scheme_policy,
            same_origin_required: options.same_origin,
            ..Self::new()
        })
    }

    /// Parse manifest text. See [`codec::parse`].
    pub fn parse(
        manifest_url: Option<&str>,
        options: ManifestOptions,
        raw: &[u8],
    ) -> Result<Self, ManifestError> {
        codec::parse(manifest_url, options, raw)
    }

    /// Render the canonical manifest text. See [`codec::serialize`].
    pub fn serialize(&self) -> String {
        codec::serialize(self)
    }

    /// Resolve a manifest token into a URI, relative to the manifest URL when
    /// there is one.
    pub fn resolve(&self, token: &str) -> Result<ManifestUri, ManifestError> {
        match &self.manifest_url {
            Some(base) => ManifestUri::resolve(base, token),
            None => ManifestUri::parse(token),
        }
    }

    // ------------------------------------------------------------------
    // Adding entries
    // ------------------------------------------------------------------

    /// Add a token to the explicit (CACHE) section.
    pub fn add_explicit_entry(&mut self, token: &str) -> Result<bool, ManifestError> {
        let uri = self.resolve(token)?;
        Ok(self.add_explicit_uri(uri))
    }

    /// Add a URI to the explicit (CACHE) section.
    pub fn add_explicit_uri(&mut self, uri: ManifestUri) -> bool {
        let uri = uri.without_fragment();
        if self.is_self_reference(&uri) || !self.validate_scheme(&uri) {
            return false;
        }
        self.explicit_entries.push(uri.clone());
        self.add_master_entry(uri);
        true
    }

    /// Add a namespace/target pair to the FALLBACK section.
    pub fn add_fallback_entry(
        &mut self,
        namespace: &str,
        target: &str,
    ) -> Result<bool, ManifestError> {
        let namespace = self.resolve(namespace)?;
        let target = self.resolve(target)?;
        Ok(self.add_fallback_uri(namespace, target))
    }

    /// Add a namespace/target pair to the FALLBACK section.
    ///
    /// The first target registered for a namespace wins.
    pub fn add_fallback_uri(&mut self, namespace: ManifestUri, target: ManifestUri) -> bool {
        let namespace = namespace.without_fragment();
        let target = target.without_fragment();

        if !self.validate_same_origin(&namespace) || !self.validate_same_origin(&target) {
            return false;
        }
        if self.is_self_reference(&namespace) || self.is_self_reference(&target) {
            return false;
        }
        if !self.validate_scheme(&namespace) || !self.validate_scheme(&target) {
            return false;
        }
        if self.fallback_target(&namespace).is_some() {
            return false;
        }

        self.fallback_entries.push((namespace, target.clone()));
        self.add_master_entry(target);
        true
    }

    /// Add a token to the NETWORK section. `*` opens the wildcard.
    pub fn add_network_entry(&mut self, token: &str) -> Result<bool, ManifestError> {
        if token == "*" {
            self.online_whitelist_wildcard = WildcardFlag::Open;
            return Ok(true);
        }
        let uri = self.resolve(token)?;
        Ok(self.add_network_uri(uri))
    }

    /// Add a URI to the online whitelist. Same-origin rules do not apply here.
    pub fn add_network_uri(&mut self, uri: ManifestUri) -> bool {
        let uri = uri.without_fragment();
        if self.is_self_reference(&uri) || !self.validate_scheme(&uri) {
            return false;
        }
        self.online_whitelist_namespaces.push(uri);
        true
    }

    fn add_master_entry(&mut self, uri: ManifestUri) {
        if self.master_index.insert(uri.clone()) {
            self.master_entries.push(uri);
        }
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Whether `uri` passes the document's scheme policy.
    pub fn validate_scheme(&self, uri: &ManifestUri) -> bool {
        self.scheme_policy.allows(uri.scheme())
    }

    /// Whether `uri` shares scheme, host and port with the manifest URL.
    ///
    /// Always true when same-origin validation is off.
    pub fn validate_same_origin(&self, uri: &ManifestUri) -> bool {
        if !self.same_origin_required {
            return true;
        }
        match (&self.manifest_url, uri.as_url()) {
            (Some(manifest), Some(url)) => {
                url.scheme().eq_ignore_ascii_case(manifest.scheme())
                    && url.host_str().map(str::to_ascii_lowercase)
                        == manifest.host_str().map(str::to_ascii_lowercase)
                    && url.port_or_known_default() == manifest.port_or_known_default()
            }
            _ => false,
        }
    }

    fn is_self_reference(&self, uri: &ManifestUri) -> bool {
        match (&self.manifest_url, uri.as_url()) {
            (Some(manifest), Some(url)) => manifest == url,
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn manifest_url(&self) -> Option<&Url> {
        self.manifest_url.as_ref()
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    pub fn set_cache_mode(&mut self, mode: CacheMode) {
        self.cache_mode = mode;
    }

    pub fn explicit_entries(&self) -> &[ManifestUri] {
        &self.explicit_entries
    }

    /// Fallback namespace/target pairs in registration order.
    pub fn fallback_entries(&self) -> &[(ManifestUri, ManifestUri)] {
        &self.fallback_entries
    }

    /// The target registered for a fallback namespace.
    pub fn fallback_target(&self, namespace: &ManifestUri) -> Option<&ManifestUri> {
        self.fallback_entries
            .iter()
            .find(|(ns, _)| ns == namespace)
            .map(|(_, target)| target)
    }

    pub fn online_whitelist_namespaces(&self) -> &[ManifestUri] {
        &self.online_whitelist_namespaces
    }

    pub fn online_whitelist_wildcard(&self) -> WildcardFlag {
        self.online_whitelist_wildcard
    }

    pub fn set_online_whitelist_wildcard(&mut self, flag: WildcardFlag) {
        self.online_whitelist_wildcard = flag;
    }

    /// Every resource that must be cached: explicit entries and fallback
    /// targets, in the order they were first accepted.
    pub fn master_entries(&self) -> &[ManifestUri] {
        &self.master_entries
    }

    /// Whether `url` (fragment ignored, resolved like a manifest token) is a
    /// master entry. Unparsable input is never a master entry.
    pub fn is_master_entry(&self, url: &str) -> bool {
        match self.resolve(url) {
            Ok(uri) => self.master_index.contains(&uri.without_fragment()),
            Err(_) => false,
        }
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Set the comment written after the magic line. Line breaks are folded
    /// into spaces so the comment stays on one line.
    pub fn set_comment(&mut self, comment: Option<&str>) {
        self.comment = comment.map(|c| c.replace(['\r', '\n'], " "));
    }

    pub fn scheme_policy(&self) -> &SchemePolicy {
        &self.scheme_policy
    }

    pub fn same_origin_required(&self) -> bool {
        self.same_origin_required
    }

    /// The options this document validates with.
    pub fn options(&self) -> ManifestOptions {
        ManifestOptions {
            strict_schemes: matches!(self.scheme_policy, SchemePolicy::Only(_)),
            same_origin: self.same_origin_required,
        }
    }

    /// Remove every entry and close the wildcard. Cache mode and comment
    /// are kept.
    pub fn clear(&mut self) {
        self.explicit_entries.clear();
        self.fallback_entries.clear();
        self.online_whitelist_namespaces.clear();
        self.online_whitelist_wildcard = WildcardFlag::Blocking;
        self.master_entries.clear();
        self.master_index.clear();
    }
}

impl fmt::Display for ManifestDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&codec::serialize(self))
    }
}

/// Check that a URL can anchor a manifest: absolute http or https.
pub fn validate_manifest_url(url: &Url) -> Result<(), ManifestError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ManifestError::InvalidManifestUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {:?}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(url: &str, strict: bool, same_origin: bool) -> ManifestDocument {
        ManifestDocument::with_url(url, ManifestOptions::new(strict, same_origin)).unwrap()
    }

    fn strs(uris: &[ManifestUri]) -> Vec<&str> {
        uris.iter().map(|u| u.as_str()).collect()
    }

    #[test]
    fn test_manifest_url_must_be_http() {
        let err = ManifestDocument::with_url("ftp://x/m.appcache", ManifestOptions::default())
            .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidManifestUrl { .. }));

        let err = ManifestDocument::with_url("m.appcache", ManifestOptions::default()).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidManifestUrl { .. }));
    }

    #[test]
    fn test_self_reference_rejected_everywhere() {
        let mut d = doc("http://x/dir/m.appcache", false, false);
        assert!(!d.add_explicit_entry("m.appcache").unwrap());
        assert!(!d.add_explicit_entry("http://x/dir/m.appcache#frag").unwrap());
        assert!(!d.add_fallback_entry("m.appcache", "a.html").unwrap());
        assert!(!d.add_fallback_entry("ns/", "m.appcache#x").unwrap());
        assert!(!d.add_network_entry("/dir/m.appcache").unwrap());
        assert!(d.explicit_entries().is_empty());
        assert!(d.fallback_entries().is_empty());
        assert!(d.online_whitelist_namespaces().is_empty());
        assert!(d.master_entries().is_empty());
    }

    #[test]
    fn test_fragments_are_stripped() {
        let mut d = doc("http://x/dir/m.appcache", false, false);
        assert!(d.add_explicit_entry("a.html#intro").unwrap());
        assert_eq!(strs(d.explicit_entries()), vec!["http://x/dir/a.html"]);
        assert!(d.is_master_entry("http://x/dir/a.html#other"));
    }

    #[test]
    fn test_fallback_first_registration_wins() {
        let mut d = doc("http://x/m.appcache", false, false);
        assert!(d.add_fallback_entry("/ns/", "/first.html").unwrap());
        assert!(!d.add_fallback_entry("/ns/", "/second.html").unwrap());

        assert_eq!(d.fallback_entries().len(), 1);
        let ns = d.resolve("/ns/").unwrap();
        assert_eq!(d.fallback_target(&ns).unwrap().as_str(), "http://x/first.html");
        assert_eq!(strs(d.master_entries()), vec!["http://x/first.html"]);
        assert!(!d.is_master_entry("http://x/second.html"));
    }

    #[test]
    fn test_rejected_fallback_keeps_existing_master_entry() {
        let mut d = doc("http://x/m.appcache", false, false);
        d.add_explicit_entry("/second.html").unwrap();
        d.add_fallback_entry("/ns/", "/first.html").unwrap();
        assert!(!d.add_fallback_entry("/ns/", "/second.html").unwrap());
        assert_eq!(
            strs(d.master_entries()),
            vec!["http://x/second.html", "http://x/first.html"]
        );
    }

    #[test]
    fn test_master_entries_are_deduplicated_in_acceptance_order() {
        let mut d = doc("http://x/m.appcache", false, false);
        d.add_explicit_entry("/index.html").unwrap();
        d.add_explicit_entry("/about.html").unwrap();
        d.add_fallback_entry("/", "/offline.html").unwrap();
        d.add_explicit_entry("/index.html").unwrap();
        d.add_fallback_entry("/css/", "/offline.css").unwrap();
        d.add_fallback_entry("/img/", "/offline.html").unwrap();

        assert_eq!(d.explicit_entries().len(), 3);
        assert_eq!(
            strs(d.master_entries()),
            vec![
                "http://x/index.html",
                "http://x/about.html",
                "http://x/offline.html",
                "http://x/offline.css",
            ]
        );
    }

    #[test]
    fn test_strict_schemes() {
        let mut d = doc("https://x/m.appcache", true, false);
        assert!(!d.add_explicit_entry("http://x/a.html").unwrap());
        assert!(d.add_explicit_entry("https://y/a.html").unwrap());
        assert!(!d.add_network_entry("http://x/api").unwrap());
    }

    #[test]
    fn test_foreign_scheme_rejected() {
        let mut d = doc("http://x/m.appcache", false, false);
        assert!(!d.add_explicit_entry("ftp://x/file").unwrap());
        assert!(!d.add_explicit_entry("mailto:someone@example.com").unwrap());
        assert!(!d.add_fallback_entry("ftp://x/", "/a.html").unwrap());
        assert!(d.master_entries().is_empty());
    }

    #[test]
    fn test_same_origin_applies_to_fallback_only() {
        let mut d = doc("http://x:8080/m.appcache", false, true);
        assert!(!d.add_fallback_entry("http://y:8080/", "/off.html").unwrap());
        assert!(!d.add_fallback_entry("/", "http://x/off.html").unwrap());
        assert!(!d.add_fallback_entry("/", "https://x:8080/off.html").unwrap());
        assert!(d.add_fallback_entry("/", "http://X:8080/off.html").unwrap());

        assert!(d.add_network_entry("http://elsewhere/api").unwrap());
        assert!(d.add_explicit_entry("http://elsewhere/lib.js").unwrap());
        assert_eq!(d.options(), ManifestOptions::new(false, true));
    }

    #[test]
    fn test_no_manifest_url_accepts_relative() {
        let mut d = ManifestDocument::new();
        assert!(d.add_explicit_entry("http://www.google.de").unwrap());
        assert!(d.add_explicit_entry("/index.html#fragment").unwrap());
        assert!(d.add_explicit_entry("mail/home.html").unwrap());
        assert!(!d.add_explicit_entry("ftp://x/y").unwrap());
        assert_eq!(
            strs(d.explicit_entries()),
            vec!["http://www.google.de/", "/index.html", "mail/home.html"]
        );
    }

    #[test]
    fn test_network_wildcard() {
        let mut d = doc("http://x/m.appcache", false, false);
        assert_eq!(d.online_whitelist_wildcard(), WildcardFlag::Blocking);
        assert!(d.add_network_entry("*").unwrap());
        assert_eq!(d.online_whitelist_wildcard(), WildcardFlag::Open);
        assert!(d.online_whitelist_namespaces().is_empty());
    }

    #[test]
    fn test_invalid_token_is_an_error() {
        let mut d = doc("http://x/m.appcache", false, false);
        assert!(d.add_explicit_entry("bad|token").is_err());
    }

    #[test]
    fn test_is_master_entry_with_garbage() {
        let d = doc("http://x/m.appcache", false, false);
        assert!(!d.is_master_entry("not a uri"));
    }

    #[test]
    fn test_clear_keeps_mode_and_comment() {
        let mut d = doc("http://x/m.appcache", false, false);
        d.add_explicit_entry("/a.html").unwrap();
        d.add_fallback_entry("/", "/off.html").unwrap();
        d.add_network_entry("*").unwrap();
        d.set_cache_mode(CacheMode::PreferOnline);
        d.set_comment(Some("v1"));

        d.clear();

        assert!(d.explicit_entries().is_empty());
        assert!(d.fallback_entries().is_empty());
        assert!(d.master_entries().is_empty());
        assert_eq!(d.online_whitelist_wildcard(), WildcardFlag::Blocking);
        assert_eq!(d.cache_mode(), CacheMode::PreferOnline);
        assert_eq!(d.comment(), Some("v1"));

        assert!(d.add_explicit_entry("/a.html").unwrap());
        assert_eq!(d.master_entries().len(), 1);
    }

    #[test]
    fn test_comment_is_single_line() {
        let mut d = ManifestDocument::new();
        d.set_comment(Some("line one\nline two"));
        assert_eq!(d.comment(), Some("line one line two"));
    }
}
