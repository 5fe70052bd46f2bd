//! Text format of cache manifests.
//!
//! A manifest is a UTF-8 document whose first line is the `CACHE MANIFEST`
//! magic. The remaining lines are grouped in sections introduced by a header
//! line (`CACHE:`, `FALLBACK:`, `NETWORK:`, `SETTINGS:`). Lines before the
//! first header belong to the explicit section.

use url::{Position, Url};

use super::document::ManifestDocument;
use super::types::{CacheMode, ManifestError, ManifestOptions, WildcardFlag};
use super::uri::ManifestUri;

const MAGIC: &str = "CACHE MANIFEST";
const BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Explicit,
    Fallback,
    Network,
    Settings,
    Unknown,
}

impl Section {
    fn from_header(line: &str) -> Option<Self> {
        match line {
            "CACHE:" => Some(Section::Explicit),
            "FALLBACK:" => Some(Section::Fallback),
            "NETWORK:" => Some(Section::Network),
            "SETTINGS:" => Some(Section::Settings),
            _ if line.ends_with(':') => Some(Section::Unknown),
            _ => None,
        }
    }
}

/// Parse a manifest body.
///
/// Relative tokens are resolved against `manifest_url`. Without a manifest
/// URL, absolute tokens are kept and anything else is stored as a relative
/// reference. Entries that break a document rule are dropped; tokens that are
/// not URI references at all fail the whole parse.
///
/// Both `options` switches compare entries with the manifest URL, so they
/// only apply when one is given. Without it any http, https or relative
/// entry is accepted whatever `options` says.
pub fn parse(
    manifest_url: Option<&str>,
    options: ManifestOptions,
    raw: &[u8],
) -> Result<ManifestDocument, ManifestError> {
    let mut document = match manifest_url {
        Some(url) => ManifestDocument::with_url(url, options)?,
        None => ManifestDocument::new(),
    };

    let decoded = String::from_utf8_lossy(raw);
    let text = decoded.strip_prefix(BOM).unwrap_or(decoded.as_ref());
    let mut lines = text.split("\r\n").flat_map(|l| l.split(['\r', '\n']));

    let magic = lines.next().ok_or(ManifestError::NotAManifest)?;
    match magic.strip_prefix(MAGIC) {
        Some(rest) if rest.trim().is_empty() => {}
        _ => return Err(ManifestError::NotAManifest),
    }

    let mut section = Section::Explicit;
    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(next) = Section::from_header(line) {
            section = next;
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        match section {
            Section::Explicit => {
                document.add_explicit_entry(tokens[0])?;
            }
            Section::Fallback => {
                if tokens.len() >= 2 {
                    document.add_fallback_entry(tokens[0], tokens[1])?;
                }
            }
            Section::Network => {
                document.add_network_entry(tokens[0])?;
            }
            Section::Settings => {
                if tokens[0] == "prefer-online" {
                    document.set_cache_mode(CacheMode::PreferOnline);
                }
            }
            Section::Unknown => {}
        }
    }

    Ok(document)
}

/// Render a document in canonical form.
pub fn serialize(document: &ManifestDocument) -> String {
    let base = document.manifest_url();
    let mut out = String::new();

    out.push_str(MAGIC);
    out.push('\n');

    if let Some(comment) = document.comment() {
        out.push_str("# ");
        out.push_str(comment);
        out.push('\n');
    }

    for entry in document.explicit_entries() {
        push_line(&mut out, &render(base, entry));
    }

    if !document.fallback_entries().is_empty() {
        out.push_str("FALLBACK:\n");
        for (namespace, target) in document.fallback_entries() {
            let line = format!("{} {}", render(base, namespace), render(base, target));
            push_line(&mut out, &line);
        }
    }

    let wildcard_open = document.online_whitelist_wildcard() == WildcardFlag::Open;
    if wildcard_open || !document.online_whitelist_namespaces().is_empty() {
        out.push_str("NETWORK:\n");
        if wildcard_open {
            out.push_str("*\n");
        }
        for namespace in document.online_whitelist_namespaces() {
            push_line(&mut out, &render(base, namespace));
        }
    }

    if document.cache_mode() == CacheMode::PreferOnline {
        out.push_str("SETTINGS:\nprefer-online\n");
    }

    out
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

/// Render an entry as a manifest token that parses back to the same URI.
///
/// Entries sharing scheme and authority with the manifest URL are shortened
/// to an absolute path when that path resolves back to the entry.
fn render(base: Option<&Url>, uri: &ManifestUri) -> String {
    let mut token = match (base, uri.as_url()) {
        (Some(base), Some(url)) => shorten(base, url).unwrap_or_else(|| url.as_str().to_string()),
        _ => uri.as_str().to_string(),
    };
    // A line ending in ':' is a section header. The empty fragment is
    // stripped again when the entry is added.
    if token.ends_with(':') {
        token.push('#');
    }
    token
}

fn shorten(base: &Url, url: &Url) -> Option<String> {
    if url[..Position::BeforePath] != base[..Position::BeforePath] {
        return None;
    }
    // A path starting with `//` reads back as a network-path reference.
    let path = &url[Position::BeforePath..Position::AfterQuery];
    match base.join(path) {
        Ok(resolved) if resolved == *url => Some(path.to_string()),
        _ => None,
    }
}
