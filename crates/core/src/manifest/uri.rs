//! URI references as they appear in a manifest.

use std::fmt;

use serde::{Serialize, Serializer};
use url::{ParseError, Url};

use super::types::ManifestError;

/// Characters that can never appear unescaped in a URI reference.
const ILLEGAL_CHARS: &[char] = &['"', '<', '>', '\\', '^', '`', '{', '|', '}'];

/// A manifest entry.
///
/// Entries of a document that has a manifest URL are always absolute, because
/// every token is resolved against that URL. Documents built without a
/// manifest URL may also hold relative references, which are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ManifestUri {
    Absolute(Url),
    Relative(String),
}

impl ManifestUri {
    /// Parse a token without a base: absolute URIs become [`ManifestUri::Absolute`],
    /// anything else that is syntactically valid becomes a relative reference.
    pub fn parse(token: &str) -> Result<Self, ManifestError> {
        check_syntax(token)?;
        match Url::parse(token) {
            Ok(url) => Ok(ManifestUri::Absolute(url)),
            Err(ParseError::RelativeUrlWithoutBase) => Ok(ManifestUri::Relative(token.to_string())),
            Err(e) => Err(invalid(token, e.to_string())),
        }
    }

    /// Resolve a token against `base`.
    pub fn resolve(base: &Url, token: &str) -> Result<Self, ManifestError> {
        check_syntax(token)?;
        base.join(token)
            .map(ManifestUri::Absolute)
            .map_err(|e| invalid(token, e.to_string()))
    }

    /// The scheme, or `None` for a relative reference.
    pub fn scheme(&self) -> Option<&str> {
        match self {
            ManifestUri::Absolute(url) => Some(url.scheme()),
            ManifestUri::Relative(_) => None,
        }
    }

    pub fn as_url(&self) -> Option<&Url> {
        match self {
            ManifestUri::Absolute(url) => Some(url),
            ManifestUri::Relative(_) => None,
        }
    }

    pub fn into_url(self) -> Option<Url> {
        match self {
            ManifestUri::Absolute(url) => Some(url),
            ManifestUri::Relative(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ManifestUri::Absolute(url) => url.as_str(),
            ManifestUri::Relative(reference) => reference,
        }
    }

    /// Drop the fragment component, if any.
    pub fn without_fragment(self) -> Self {
        match self {
            ManifestUri::Absolute(mut url) => {
                url.set_fragment(None);
                ManifestUri::Absolute(url)
            }
            ManifestUri::Relative(reference) => match reference.split_once('#') {
                Some((head, _)) => ManifestUri::Relative(head.to_string()),
                None => ManifestUri::Relative(reference),
            },
        }
    }
}

impl From<Url> for ManifestUri {
    fn from(url: Url) -> Self {
        ManifestUri::Absolute(url)
    }
}

impl fmt::Display for ManifestUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ManifestUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

fn invalid(token: &str, reason: String) -> ManifestError {
    ManifestError::InvalidUri {
        token: token.to_string(),
        reason,
    }
}

/// Reject tokens that are not URI references at all.
///
/// The `url` crate percent-encodes most garbage instead of failing, so the
/// character-level rules are checked up front.
fn check_syntax(token: &str) -> Result<(), ManifestError> {
    let mut hashes = 0;
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c.is_control() || c.is_whitespace() {
            return Err(invalid(token, format!("illegal character {:?}", c)));
        }
        if ILLEGAL_CHARS.contains(&c) {
            return Err(invalid(token, format!("illegal character '{}'", c)));
        }
        match c {
            '#' => {
                hashes += 1;
                if hashes > 1 {
                    return Err(invalid(token, "more than one fragment".to_string()));
                }
            }
            '%' => {
                let escape: String = chars.clone().take(2).collect();
                if escape.len() != 2 || !escape.chars().all(|h| h.is_ascii_hexdigit()) {
                    return Err(invalid(token, "malformed percent escape".to_string()));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute() {
        let uri = ManifestUri::parse("http://www.example.com/ex").unwrap();
        assert_eq!(uri.scheme(), Some("http"));
        assert_eq!(uri.as_str(), "http://www.example.com/ex");
    }

    #[test]
    fn test_parse_relative_without_base() {
        let uri = ManifestUri::parse("mail/query.html?query").unwrap();
        assert_eq!(uri, ManifestUri::Relative("mail/query.html?query".to_string()));
        assert_eq!(uri.scheme(), None);
        assert!(uri.as_url().is_none());
    }

    #[test]
    fn test_resolve_against_base() {
        let base = Url::parse("http://x/dir/m.appcache").unwrap();
        let uri = ManifestUri::resolve(&base, "/a.html").unwrap();
        assert_eq!(uri.as_str(), "http://x/a.html");
        let uri = ManifestUri::resolve(&base, "a.html").unwrap();
        assert_eq!(uri.as_str(), "http://x/dir/a.html");
        let uri = ManifestUri::resolve(&base, "../up.html").unwrap();
        assert_eq!(uri.as_str(), "http://x/up.html");
    }

    #[test]
    fn test_without_fragment() {
        let uri = ManifestUri::parse("http://x/a.html#top").unwrap().without_fragment();
        assert_eq!(uri.as_str(), "http://x/a.html");

        let uri = ManifestUri::parse("/index.html#fragment").unwrap().without_fragment();
        assert_eq!(uri.as_str(), "/index.html");
    }

    #[test]
    fn test_illegal_characters_rejected() {
        assert!(matches!(
            ManifestUri::parse("a<b>.html"),
            Err(ManifestError::InvalidUri { .. })
        ));
        let base = Url::parse("http://x/m.appcache").unwrap();
        assert!(ManifestUri::resolve(&base, "a{b}.html").is_err());
        assert!(ManifestUri::resolve(&base, "a#b#c").is_err());
    }

    #[test]
    fn test_percent_escapes() {
        assert!(ManifestUri::parse("/a%20b.html").is_ok());
        assert!(ManifestUri::parse("/a%2").is_err());
        assert!(ManifestUri::parse("/a%zz").is_err());
    }

    #[test]
    fn test_unparsable_absolute_uri() {
        assert!(ManifestUri::parse("http://[::1/").is_err());
    }

    #[test]
    fn test_serializes_as_string() {
        let uri = ManifestUri::parse("http://x/a").unwrap();
        assert_eq!(serde_json::to_string(&uri).unwrap(), "\"http://x/a\"");
    }
}
