use crate::error::{SecsError, SecsResult};
use std::path::{Path, PathBuf};

/// Lifecycle state of a container, as observed by probing the OS. Never
/// cached: every transition re-derives it from header presence, the mapping
/// table, and the mount table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No container exists at the path.
    Absent,
    /// Encrypted backing store exists, no active mapping.
    Closed,
    /// Decrypted mapping exists but nothing is mounted.
    Open,
    /// Decrypted mapping is mounted somewhere.
    Mounted,
}

/// Identity of a managed container.
///
/// `mount` is the explicit mount path when the caller supplied one; when
/// absent, opening applies the hide-and-mount-in-place convention and the
/// mount point is the container path itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub path: PathBuf,
    pub mapper: String,
    pub mount: Option<PathBuf>,
}

impl Container {
    /// Build a container descriptor. The mapper name defaults to the path's
    /// basename when not supplied.
    pub fn new(
        path: PathBuf,
        mapper: Option<String>,
        mount: Option<PathBuf>,
    ) -> SecsResult<Self> {
        let mapper = match mapper {
            Some(name) => name,
            None => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    SecsError::InvalidConfig(format!(
                        "container path {} has no basename to derive a mapper name from",
                        path.display()
                    ))
                })?,
        };

        if mapper.is_empty() || mapper.contains('/') {
            return Err(SecsError::InvalidConfig(format!(
                "invalid mapper name `{mapper}`"
            )));
        }

        Ok(Self {
            path,
            mapper,
            mount,
        })
    }

    /// True when no explicit mount path was given and the container mounts
    /// in place of its own path.
    pub fn auto_mount(&self) -> bool {
        self.mount.is_none()
    }

    /// The path the decrypted filesystem attaches to.
    pub fn mount_path(&self) -> PathBuf {
        self.mount.clone().unwrap_or_else(|| self.path.clone())
    }

    /// Sibling path the backing file is renamed to while mounted in place:
    /// `<dir>/.<basename>`.
    pub fn hidden_path(&self) -> PathBuf {
        let basename = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.path.parent() {
            Some(parent) => parent.join(format!(".{basename}")),
            None => PathBuf::from(format!(".{basename}")),
        }
    }

    /// Device node the encryption engine exposes while the container is open.
    pub fn mapper_device(&self) -> PathBuf {
        Path::new("/dev/mapper").join(&self.mapper)
    }
}
