//! Resolved directory layout for one framework instance.
//!
//! Loading the bytes of a bootstrap configuration file and parsing it is out
//! of scope here (an external collaborator's job); `Config` is constructed
//! directly from already-resolved directory roots, mirroring the four paths
//! a real deployment would have read from that file: `socket_dir`,
//! `traces_dir`, `settings_dir`, and an opaque `config_file` path kept only
//! for diagnostics.

use octf_proto::{NodeId, NodePath};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} must be an absolute path, got {path:?}")]
    NotAbsolute { field: &'static str, path: PathBuf },
}

#[derive(Clone, Debug)]
pub struct Config {
    socket_dir: PathBuf,
    traces_dir: PathBuf,
    settings_dir: PathBuf,
    config_file: Option<PathBuf>,
}

impl Config {
    pub fn new(
        socket_dir: impl Into<PathBuf>,
        traces_dir: impl Into<PathBuf>,
        settings_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let socket_dir = require_absolute("socket_dir", socket_dir.into())?;
        let traces_dir = require_absolute("traces_dir", traces_dir.into())?;
        let settings_dir = require_absolute("settings_dir", settings_dir.into())?;
        Ok(Self {
            socket_dir,
            traces_dir,
            settings_dir,
            config_file: None,
        })
    }

    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn socket_dir(&self) -> &Path {
        &self.socket_dir
    }

    pub fn traces_dir(&self) -> &Path {
        &self.traces_dir
    }

    pub fn settings_dir(&self) -> &Path {
        &self.settings_dir
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// `<socket_dir>/<root_node_id>`, the AF_UNIX stream socket a service
    /// listens on or a client dials.
    pub fn unix_socket_path(&self, root: &NodeId) -> PathBuf {
        self.socket_dir.join(root.as_str())
    }

    /// `<settings_dir>/<node-path-basename>`.
    pub fn node_settings_path(&self, path: &NodePath) -> PathBuf {
        self.settings_dir.join(path.basename())
    }

    /// `<traces_dir>/<path>`.
    pub fn trace_dir(&self, path: &str) -> PathBuf {
        self.traces_dir.join(path)
    }

    /// `<traces_dir>/<node-path-basename>`, used when a trace is rooted
    /// directly at a node path rather than an arbitrary caller-chosen name.
    pub fn node_trace_dir(&self, path: &NodePath) -> PathBuf {
        self.traces_dir.join(path.basename())
    }

    pub fn node_path_basename(path: &NodePath) -> String {
        path.basename()
    }
}

fn require_absolute(field: &'static str, path: PathBuf) -> Result<PathBuf, ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::Empty { field });
    }
    if !path.is_absolute() {
        return Err(ConfigError::NotAbsolute { field, path });
    }
    Ok(path)
}

#[cfg(test)]
mod test {
    use super::*;
    use octf_proto::NodeId;

    #[test]
    fn rejects_relative_paths() {
        let err = Config::new("relative", "/traces", "/settings").unwrap_err();
        assert!(matches!(err, ConfigError::NotAbsolute { field: "socket_dir", .. }));
    }

    #[test]
    fn derives_expected_paths() {
        let cfg = Config::new("/run/octf", "/var/lib/octf/traces", "/etc/octf/settings").unwrap();
        let root = NodeId::new("service").unwrap();
        assert_eq!(cfg.unix_socket_path(&root), PathBuf::from("/run/octf/service"));

        let path = NodePath::new(vec![root, NodeId::new("disk0").unwrap()]).unwrap();
        assert_eq!(
            cfg.node_settings_path(&path),
            PathBuf::from("/etc/octf/settings/service:disk0")
        );
    }
}
