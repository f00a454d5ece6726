//! n8n version strings: extraction from web pages and outdated checks.

use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

fn html_version_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"n8n@([\d.]+)").ok()).as_ref()
}

/// Extract the version from an n8n editor page, which embeds `n8n@x.y.z`.
pub fn parse_version_from_html(html: &str) -> Option<String> {
    let captures = html_version_regex()?.captures(html)?;
    let version = captures.get(1)?.as_str().trim_matches('.');
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

/// Numeric components of a dotted version. A leading `v` and any pre-release
/// suffix (`-beta.1`) are ignored; non-numeric parts count as zero.
fn components(version: &str) -> Vec<u64> {
    let core = version.trim().trim_start_matches('v');
    let core = core.split(['-', '+']).next().unwrap_or(core);
    core.split('.')
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect()
}

pub fn compare(a: &str, b: &str) -> Ordering {
    let (a, b) = (components(a), components(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// True when `current` is strictly older than `latest`.
pub fn is_outdated(current: &str, latest: &str) -> bool {
    compare(current, latest) == Ordering::Less
}
