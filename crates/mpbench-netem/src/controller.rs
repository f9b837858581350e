use mpbench_common::config::PathsConfig;
use mpbench_common::models::PathConditions;
use tracing::{debug, warn};

use crate::impairment::{apply_shaping, clear_shaping, Shaping};
use crate::path::PathSpec;
use crate::NetemError;

/// Applies and clears shaping on named paths.
///
/// Implementations must be idempotent: applying the same shaping twice is
/// observably the same as applying it once, and `reset` succeeds on a path
/// that carries no shaping.
pub trait ConditionController: Send + Sync {
    fn apply(&self, path: &PathSpec, shaping: &Shaping) -> Result<(), NetemError>;

    fn reset(&self, path: &PathSpec) -> Result<(), NetemError>;

    /// Clears every path this controller knows about.
    fn reset_all(&self) -> Result<(), NetemError>;
}

/// [`ConditionController`] backed by `tc netem`.
#[derive(Debug, Clone)]
pub struct NetemController {
    paths: Vec<PathSpec>,
}

impl NetemController {
    pub fn new(paths: Vec<PathSpec>) -> Self {
        Self { paths }
    }
}

impl ConditionController for NetemController {
    fn apply(&self, path: &PathSpec, shaping: &Shaping) -> Result<(), NetemError> {
        debug!(path = %path, ?shaping, "applying netem shaping");
        apply_shaping(path, shaping)
    }

    fn reset(&self, path: &PathSpec) -> Result<(), NetemError> {
        debug!(path = %path, "clearing netem shaping");
        clear_shaping(path)
    }

    fn reset_all(&self) -> Result<(), NetemError> {
        let mut first_err = None;
        for path in &self.paths {
            if let Err(e) = clear_shaping(path) {
                warn!(path = %path, error = %e, "failed to clear shaping");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Builds the two path specs described by the `[paths]` config table.
pub fn paths_from_config(cfg: &PathsConfig) -> [PathSpec; 2] {
    cfg.interfaces.clone().map(|iface| {
        let spec = PathSpec::new(iface).with_sudo(cfg.sudo);
        match &cfg.namespace {
            Some(ns) => spec.in_namespace(ns.clone()),
            None => spec,
        }
    })
}

/// Applies [`PathConditions`] to both paths of a multipath link.
///
/// Shaping failures are logged and swallowed: a run continues under whatever
/// shaping was previously in place.
#[derive(Clone, Copy)]
pub struct PathShaper<'a> {
    controller: &'a dyn ConditionController,
    paths: &'a [PathSpec; 2],
}

impl<'a> PathShaper<'a> {
    pub fn new(controller: &'a dyn ConditionController, paths: &'a [PathSpec; 2]) -> Self {
        Self { controller, paths }
    }

    /// Returns `true` if every path accepted its shaping.
    pub fn apply(&self, conditions: &PathConditions) -> bool {
        let mut ok = true;
        for (idx, path) in self.paths.iter().enumerate() {
            let shaping = Shaping::for_path(conditions, idx);
            if let Err(e) = self.controller.apply(path, &shaping) {
                warn!(path = %path, ?shaping, error = %e, "shaping failed, keeping previous conditions");
                ok = false;
            }
        }
        ok
    }

    /// Returns both paths to no shaping. Returns `true` on full success.
    pub fn reset(&self) -> bool {
        let mut ok = true;
        for path in self.paths {
            if let Err(e) = self.controller.reset(path) {
                warn!(path = %path, error = %e, "failed to reset shaping");
                ok = false;
            }
        }
        ok
    }

    pub fn reset_all(&self) -> bool {
        match self.controller.reset_all() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to reset all shaping");
                false
            }
        }
    }
}
