//! Catalog parsing and merging.
//!
//! Two remote formats are understood: a JSON manifest (array of records) and
//! the legacy `key_url:` / `key_version:` text list. Both normalize into
//! [`CatalogEntry`].

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::errors::CatalogError;
use crate::payload::PayloadKind;

/// Shown instead of a version when the source does not provide one.
pub const UNKNOWN_DATE: &str = "unknown date";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogOrigin {
    Manifest,
    Legacy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    pub display_name: String,
    pub name: String,
    pub author: Option<String>,
    pub version: String,
    pub source_url: String,
    pub payload_kind: PayloadKind,
    pub bouquet_id: Option<String>,
    pub bouquet_name: Option<String>,
    pub origin: CatalogOrigin,
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    version: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    bouquet_id: Option<String>,
    #[serde(default)]
    bouquet_name: Option<String>,
}

// Manifests are hand-edited; versions show up as strings and as numbers.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn declared_kind(kind: Option<&str>) -> PayloadKind {
    match kind.map(|k| k.trim().to_ascii_uppercase()).as_deref() {
        Some("M3U") => PayloadKind::M3UPlaylist,
        Some("BOUQUET") => PayloadKind::BouquetReference,
        _ => PayloadKind::Unknown,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the JSON manifest.
///
/// A document that is not a JSON array is an error. Individual records that
/// do not deserialize, or that lack a URL, are skipped.
pub fn parse_manifest(json: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
    let document: Value = serde_json::from_str(json).map_err(|e| CatalogError::Parse {
        source: "manifest".to_string(),
        message: e.to_string(),
    })?;

    let Value::Array(records) = document else {
        return Err(CatalogError::Parse {
            source: "manifest".to_string(),
            message: "expected a JSON array of records".to_string(),
        });
    };

    let mut entries = Vec::with_capacity(records.len());
    for value in records {
        let Ok(record) = serde_json::from_value::<ManifestRecord>(value) else {
            continue;
        };
        let Some(url) = non_blank(record.url) else {
            continue;
        };

        let name = non_blank(record.name).unwrap_or_else(|| url_basename(&url).to_string());
        let author = non_blank(record.author);
        let version = non_blank(record.version).unwrap_or_else(|| UNKNOWN_DATE.to_string());
        let payload_kind = declared_kind(record.kind.as_deref());

        let display_name = match &author {
            Some(author) => format!("{name} - {author} ({version})"),
            None => format!("{name} ({version})"),
        };

        let (bouquet_id, bouquet_name) = match payload_kind {
            PayloadKind::M3UPlaylist | PayloadKind::BouquetReference => (
                non_blank(record.bouquet_id),
                non_blank(record.bouquet_name).or_else(|| Some(name.clone())),
            ),
            _ => (None, None),
        };

        entries.push(CatalogEntry {
            display_name,
            name,
            author,
            version,
            source_url: url,
            payload_kind,
            bouquet_id,
            bouquet_name,
            origin: CatalogOrigin::Manifest,
        });
    }

    Ok(entries)
}

/// Parse the legacy key/value list.
///
/// `foo_bar_url: <url>` and `foo_bar_version: <date>` lines are paired on
/// `foo_bar`. Entries keep the order of their `_url` lines.
pub fn parse_legacy_list(text: &str) -> Vec<CatalogEntry> {
    let mut urls: Vec<(String, String)> = Vec::new();
    let mut versions: HashMap<String, String> = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if let Some(base) = key.strip_suffix("_url") {
            if !value.is_empty() && !urls.iter().any(|(k, _)| k == base) {
                urls.push((base.to_string(), value.to_string()));
            }
        } else if let Some(base) = key.strip_suffix("_version") {
            versions.insert(base.to_string(), value.to_string());
        }
    }

    urls.into_iter()
        .map(|(key, url)| {
            let name = title_case(&key.replace('_', " "));
            let version = versions
                .get(&key)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| UNKNOWN_DATE.to_string());
            CatalogEntry {
                display_name: format!("{name} - {version}"),
                name,
                author: None,
                version,
                source_url: url,
                payload_kind: PayloadKind::Unknown,
                bouquet_id: None,
                bouquet_name: None,
                origin: CatalogOrigin::Legacy,
            }
        })
        .collect()
}

/// Upper-case a letter when the preceding character is not a letter,
/// lower-case it otherwise.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_is_letter = false;
    for c in input.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

/// Concatenate sources in priority order, drop entries whose display name
/// contains a denied substring, then drop repeated URLs (first survivor wins).
pub fn merge_entries(
    sources: impl IntoIterator<Item = Vec<CatalogEntry>>,
    denylist: &[String],
) -> Vec<CatalogEntry> {
    let denied: Vec<String> = denylist
        .iter()
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect();

    let mut seen = HashSet::new();
    sources
        .into_iter()
        .flatten()
        .filter(|entry| {
            let name = entry.display_name.to_lowercase();
            !denied.iter().any(|d| name.contains(d.as_str()))
        })
        .filter(|entry| seen.insert(entry.source_url.trim().to_string()))
        .collect()
}

/// Last path segment of a URL without query or fragment.
pub fn url_basename(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    path.rsplit('/').next().unwrap_or(path)
}
