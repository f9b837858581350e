use mpbench_common::models::PathConditions;

use crate::path::PathSpec;
use crate::NetemError;

/// Shaping parameters for a single path, applied via `tc netem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Shaping {
    pub delay_ms: u32,
    pub loss_percent: u32,
    pub rate_kbit: Option<u64>,
    /// Override the netem queue `limit` (in packets).  When `None` and
    /// `rate_kbit` is set, the limit is derived from the bandwidth-delay
    /// product so excess packets are dropped instead of queued forever.
    pub netem_limit: Option<u32>,
}

impl Shaping {
    /// Extracts the parameters of path `index` (0 = path A, 1 = path B).
    pub fn for_path(conditions: &PathConditions, index: usize) -> Self {
        Self {
            delay_ms: conditions.delay_ms.get(index).unwrap_or(0),
            loss_percent: conditions.loss_percent.get(index).unwrap_or(0),
            rate_kbit: conditions.bandwidth_kbit.get(index).flatten(),
            netem_limit: None,
        }
    }

    /// True when installing this shaping would be equivalent to no qdisc.
    pub fn is_unshaped(&self) -> bool {
        self.delay_ms == 0 && self.loss_percent == 0 && self.rate_kbit.is_none()
    }

    fn queue_limit(&self) -> Option<u32> {
        if let Some(explicit) = self.netem_limit {
            return Some(explicit);
        }
        let rate = self.rate_kbit?;
        // 2 × BDP in MTU-sized packets, minimum 20. A zero delay falls back
        // to a 20 ms one-way estimate.
        let one_way = if self.delay_ms == 0 { 20 } else { self.delay_ms };
        let rtt_ms = one_way as u64 * 2;
        let bdp_bytes = rate * 1000 / 8 * rtt_ms / 1000;
        let mtu = 1400u64;
        let bdp_packets = (bdp_bytes / mtu) as u32;
        Some(std::cmp::max(bdp_packets.saturating_mul(2), 20))
    }
}

/// Builds the full `tc` argument list that installs `shaping` on `interface`.
///
/// Uses `qdisc replace` so applying the same parameters twice leaves the same
/// single root qdisc in place.
pub fn netem_args(interface: &str, shaping: &Shaping) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "qdisc".into(),
        "replace".into(),
        "dev".into(),
        interface.into(),
        "root".into(),
        "netem".into(),
    ];

    if let Some(limit) = shaping.queue_limit() {
        args.push("limit".into());
        args.push(limit.to_string());
    }

    if shaping.delay_ms > 0 {
        args.push("delay".into());
        args.push(format!("{}ms", shaping.delay_ms));
    }

    if shaping.loss_percent > 0 {
        args.push("loss".into());
        args.push(format!("{}%", shaping.loss_percent.min(100)));
    }

    if let Some(rate) = shaping.rate_kbit {
        args.push("rate".into());
        args.push(format!("{}kbit", rate));
    }

    args
}

/// Installs `shaping` on the path, or clears it when nothing is left to shape.
pub fn apply_shaping(path: &PathSpec, shaping: &Shaping) -> Result<(), NetemError> {
    if shaping.is_unshaped() {
        return clear_shaping(path);
    }

    let args = netem_args(&path.interface, shaping);
    let args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let output = path.exec("tc", &args)?;
    if !output.status.success() {
        return Err(NetemError::Failed {
            command: format!("tc {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Removes the root qdisc. Succeeds when there was nothing to remove.
pub fn clear_shaping(path: &PathSpec) -> Result<(), NetemError> {
    let args = ["qdisc", "del", "dev", path.interface.as_str(), "root"];
    let output = path.exec("tc", &args)?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if is_missing_qdisc(&stderr) {
        return Ok(());
    }
    Err(NetemError::Failed {
        command: format!("tc {}", args.join(" ")),
        stderr: stderr.trim().to_string(),
    })
}

/// `tc qdisc del` on an interface that only carries the default qdisc fails
/// with one of these messages depending on the iproute2 version.
fn is_missing_qdisc(stderr: &str) -> bool {
    stderr.contains("No such file or directory")
        || stderr.contains("Cannot delete qdisc with handle of zero")
        || stderr.contains("Cannot find specified qdisc")
}
