//! Helpers for tests: privilege checks, throwaway namespaces, and an
//! in-memory [`ConditionController`] that records every call.

use std::collections::HashMap;
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::controller::ConditionController;
use crate::impairment::Shaping;
use crate::path::PathSpec;
use crate::NetemError;

static NS_SEQ: AtomicU32 = AtomicU32::new(0);

/// Longest network namespace name `ip netns` accepts here.
pub const NS_NAME_MAX: usize = 15;

/// True when `ip netns` is usable, i.e. namespace-backed shaping tests can run.
pub fn check_privileges() -> bool {
    Command::new("ip")
        .arg("netns")
        .output()
        .is_ok_and(|o| o.status.success())
}

/// Namespace name unique to this process and call, at most
/// [`NS_NAME_MAX`] bytes.
pub fn unique_ns_name(prefix: &str) -> String {
    let suffix = format!(
        "_{:x}_{}",
        std::process::id() & 0xfff,
        NS_SEQ.fetch_add(1, Ordering::Relaxed)
    );
    let keep = NS_NAME_MAX.saturating_sub(suffix.len()).min(prefix.len());
    format!("{}{suffix}", &prefix[..keep])
}

fn sudo_ip(args: &[&str]) -> std::io::Result<std::process::Output> {
    Command::new("sudo").arg("ip").args(args).output()
}

/// A network namespace that exists for the lifetime of the value.
pub struct TestNamespace {
    pub name: String,
}

impl TestNamespace {
    /// Creates `name` afresh, replacing any namespace left by a crashed run.
    pub fn new(name: &str) -> Result<Self, NetemError> {
        let _ = sudo_ip(&["netns", "del", name]);
        let out = sudo_ip(&["netns", "add", name])?;
        if !out.status.success() {
            return Err(NetemError::Failed {
                command: format!("ip netns add {name}"),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        let ns = Self {
            name: name.to_string(),
        };
        ns.path("lo").exec("ip", &["link", "set", "lo", "up"])?;
        Ok(ns)
    }

    pub fn path(&self, interface: &str) -> PathSpec {
        PathSpec::new(interface)
            .in_namespace(self.name.clone())
            .with_sudo(true)
    }
}

impl Drop for TestNamespace {
    fn drop(&mut self) {
        let _ = sudo_ip(&["netns", "del", &self.name]);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    Apply {
        interface: String,
        shaping: Shaping,
        at: Instant,
    },
    Reset {
        interface: String,
        at: Instant,
    },
    ResetAll {
        at: Instant,
    },
}

#[derive(Default)]
struct Recorded {
    events: Vec<ControllerEvent>,
    current: HashMap<String, Shaping>,
}

/// In-memory controller. Tracks the shaping currently installed per interface
/// and the full call history.
#[derive(Default)]
pub struct RecordingController {
    inner: Mutex<Recorded>,
    fail_apply: bool,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    /// A controller whose `apply` always fails, as a missing `tc` would.
    pub fn failing_apply() -> Self {
        Self {
            fail_apply: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<ControllerEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    /// Every successful `apply` call, in order.
    pub fn applied(&self) -> Vec<(String, Shaping, Instant)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ControllerEvent::Apply {
                    interface,
                    shaping,
                    at,
                } => Some((interface, shaping, at)),
                _ => None,
            })
            .collect()
    }

    /// Shaping installed on `interface`, or `None` when it is unshaped.
    pub fn state(&self, interface: &str) -> Option<Shaping> {
        self.inner.lock().unwrap().current.get(interface).copied()
    }

    pub fn all_baseline(&self) -> bool {
        self.inner.lock().unwrap().current.is_empty()
    }
}

impl ConditionController for RecordingController {
    fn apply(&self, path: &PathSpec, shaping: &Shaping) -> Result<(), NetemError> {
        if self.fail_apply {
            return Err(NetemError::Failed {
                command: format!("tc qdisc replace dev {} root netem", path.interface),
                stderr: "simulated failure".into(),
            });
        }
        let mut inner = self.inner.lock().unwrap();
        if shaping.is_unshaped() {
            inner.current.remove(&path.interface);
        } else {
            inner.current.insert(path.interface.clone(), *shaping);
        }
        inner.events.push(ControllerEvent::Apply {
            interface: path.interface.clone(),
            shaping: *shaping,
            at: Instant::now(),
        });
        Ok(())
    }

    fn reset(&self, path: &PathSpec) -> Result<(), NetemError> {
        let mut inner = self.inner.lock().unwrap();
        inner.current.remove(&path.interface);
        inner.events.push(ControllerEvent::Reset {
            interface: path.interface.clone(),
            at: Instant::now(),
        });
        Ok(())
    }

    fn reset_all(&self) -> Result<(), NetemError> {
        let mut inner = self.inner.lock().unwrap();
        inner.current.clear();
        inner.events.push(ControllerEvent::ResetAll { at: Instant::now() });
        Ok(())
    }
}
