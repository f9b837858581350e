use std::process::{Command, Output};

/// A shaped network path: the interface carrying it, optionally inside a
/// Linux network namespace.
///
/// Commands are executed directly, through `sudo`, and/or through
/// `ip netns exec` depending on how the path was configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    pub interface: String,
    pub namespace: Option<String>,
    pub sudo: bool,
}

impl PathSpec {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            namespace: None,
            sudo: false,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    /// The program and leading arguments that prefix every command run on
    /// this path.
    pub fn command_prefix(&self) -> Vec<String> {
        let mut prefix = Vec::new();
        if self.sudo {
            prefix.push("sudo".to_string());
        }
        if let Some(ns) = &self.namespace {
            prefix.extend(["ip".into(), "netns".into(), "exec".into(), ns.clone()]);
        }
        prefix
    }

    pub fn exec(&self, cmd: &str, args: &[&str]) -> Result<Output, std::io::Error> {
        let prefix = self.command_prefix();
        let mut command = match prefix.split_first() {
            Some((program, rest)) => {
                let mut c = Command::new(program);
                c.args(rest).arg(cmd);
                c
            }
            None => Command::new(cmd),
        };
        command.args(args).output()
    }
}

impl std::fmt::Display for PathSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}@{}", self.interface, ns),
            None => f.write_str(&self.interface),
        }
    }
}
