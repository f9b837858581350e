//! Artifact root resolution: `<root>/result<N>`, where `N` is the host group.

use std::path::PathBuf;

use mpbench_common::config::OutputConfig;

/// Host group used when none is configured and the host name carries none.
pub const DEFAULT_HOST_GROUP: u32 = 0;

/// Trailing digits of a host name: `client3` → 3, `node-12` → 12.
pub fn parse_host_group(hostname: &str) -> Option<u32> {
    let trimmed = hostname.trim();
    let digits_start = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(idx, _)| idx)?;
    trimmed[digits_start..].parse().ok()
}

fn hostname() -> Option<String> {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// The configured host group, else the host name's, else
/// [`DEFAULT_HOST_GROUP`].
pub fn host_group(cfg: &OutputConfig) -> u32 {
    if let Some(group) = cfg.host_group {
        return group;
    }
    match hostname().as_deref().and_then(parse_host_group) {
        Some(group) => group,
        None => {
            tracing::warn!(
                default = DEFAULT_HOST_GROUP,
                "could not derive host group from host name, using default"
            );
            DEFAULT_HOST_GROUP
        }
    }
}

pub fn result_root(cfg: &OutputConfig) -> PathBuf {
    cfg.root.join(format!("result{}", host_group(cfg)))
}
