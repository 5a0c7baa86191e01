use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

const MIN_PORT: i64 = 1;
const MAX_PORT: i64 = u16::MAX as i64;

/// Parse a port specification into an ascending, deduplicated list of TCP ports (1..=65535).
///
/// Supported tokens, separated by commas:
/// - single port number: `80`
/// - inclusive range: `8000-8010` (clamped to the valid port range; `start > end` yields nothing)
///
/// Malformed tokens (non-numeric, more than one `-`) are skipped rather than reported,
/// so this never fails. An empty or absent spec selects [`default_ports`].
pub fn parse_port_spec(spec: Option<&str>) -> Vec<u16> {
    let spec = match spec.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return default_ports(),
    };

    let mut set = BTreeSet::new();
    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if token.contains('-') {
            let mut bounds = token.split('-');
            let range = match (bounds.next(), bounds.next(), bounds.next()) {
                (Some(a), Some(b), None) => parse_int(a).zip(parse_int(b)),
                _ => None,
            };
            if let Some((start, end)) = range {
                let lo = start.max(MIN_PORT);
                let hi = end.min(MAX_PORT);
                if lo <= hi {
                    set.extend((lo..=hi).map(|p| p as u16));
                }
            }
            continue;
        }

        if let Some(p) = parse_int(token).filter(|p| (MIN_PORT..=MAX_PORT).contains(p)) {
            set.insert(p as u16);
        }
    }

    set.into_iter().collect()
}

/// Where the ports of a scan come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSource {
    /// A user spec, parsed with [`parse_port_spec`]; `None` means the default set.
    Spec(Option<String>),
    /// Ports already expanded, e.g. by [`load_ports_from_path`]. An empty list scans nothing.
    List(Vec<u16>),
}

impl PortSource {
    /// The ascending, deduplicated ports to scan.
    pub fn resolve(&self) -> Vec<u16> {
        match self {
            PortSource::Spec(spec) => parse_port_spec(spec.as_deref()),
            PortSource::List(list) => {
                let set: BTreeSet<u16> = list.iter().copied().filter(|&p| p != 0).collect();
                set.into_iter().collect()
            }
        }
    }
}

impl Default for PortSource {
    fn default() -> Self {
        PortSource::Spec(None)
    }
}

/// Load a port spec from a file. Every line holds spec tokens; `#` starts a comment.
///
/// Lines are joined and passed to [`parse_port_spec`], so a file with no tokens yields
/// the default set. Errors only if the file cannot be read.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<Vec<u16>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    let joined = content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    Ok(parse_port_spec(Some(&joined)))
}

/// The fixed set of well-known ports scanned when no spec is given, ascending.
pub fn default_ports() -> Vec<u16> {
    const DEFAULT: &[u16] = &[
        21, 22, 23, 25, 53, 80, 110, 143, 443, 993, 995, 135, 139, 445, 1433, 3389, 5432, 3306,
        1521, 8080,
    ];
    let mut ports = DEFAULT.to_vec();
    ports.sort_unstable();
    ports
}

fn parse_int(s: &str) -> Option<i64> {
    s.trim().parse::<i64>().ok()
}
