use crate::error::SecsResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Per-tool binary path overrides. Unset entries fall back to discovery over
/// the well-known system locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tools {
    #[serde(default)]
    pub cryptsetup: Option<String>,

    #[serde(default)]
    pub mkfs_ext4: Option<String>,

    #[serde(default)]
    pub e2fsck: Option<String>,

    #[serde(default)]
    pub resize2fs: Option<String>,

    #[serde(default)]
    pub mount: Option<String>,

    #[serde(default)]
    pub umount: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runtime {
    #[serde(default = "default_lock_dir")]
    pub lock_dir: String,
}

fn default_lock_dir() -> String {
    "/run/secs".to_string()
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
        }
    }
}

/// Host-integration configuration. Holds no container state: which containers
/// exist and what lifecycle state they are in is always recomputed from the
/// OS, never read from here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecsConfig {
    #[serde(default)]
    pub tools: Tools,

    #[serde(default)]
    pub runtime: Runtime,

    #[serde(skip)]
    pub path: PathBuf,
}

impl SecsConfig {
    /// Load the configuration at `path`, or fall back to defaults when the
    /// file does not exist. The config file is entirely optional.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> SecsResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let mut cfg: Self = toml::from_str(&contents)?;
        cfg.path = path.to_path_buf();
        Ok(cfg)
    }

    pub fn lock_dir(&self) -> PathBuf {
        PathBuf::from(&self.runtime.lock_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = SecsConfig::load_or_default("/nonexistent/secs.toml").unwrap();
        assert!(cfg.tools.cryptsetup.is_none());
        assert_eq!(cfg.lock_dir(), PathBuf::from("/run/secs"));
    }

    #[test]
    fn parses_overrides() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("secs.toml");
        fs::write(
            &path,
            r#"
[tools]
cryptsetup = "/opt/bin/cryptsetup"

[runtime]
lock_dir = "/var/lock/secs"
"#,
        )
        .unwrap();

        let cfg = SecsConfig::load_or_default(&path).unwrap();
        assert_eq!(cfg.tools.cryptsetup.as_deref(), Some("/opt/bin/cryptsetup"));
        assert!(cfg.tools.mount.is_none());
        assert_eq!(cfg.lock_dir(), PathBuf::from("/var/lock/secs"));
        assert_eq!(cfg.path, path);
    }

    #[test]
    fn rejects_malformed_toml() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("secs.toml");
        fs::write(&path, "[tools\ncryptsetup = 3").unwrap();
        assert!(SecsConfig::load_or_default(&path).is_err());
    }
}
