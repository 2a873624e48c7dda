//! System-backed `ContainerProvider` implementation. It shells out to the
//! host's `cryptsetup` and ext4 tooling for the operations that need them,
//! and performs the plain filesystem primitives (random fill, rename,
//! mkdir/rmdir, chown) natively.

use crate::command::{CommandRunner, StdioMode};
use crate::mounts;
use secs_core::config::SecsConfig;
use secs_core::error::{SecsError, SecsResult};
use secs_core::identity::Identity;
use secs_core::primitive::Primitive;
use secs_core::provider::ContainerProvider;
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};

/// Default locations probed when looking for `cryptsetup` on the host.
pub const DEFAULT_CRYPTSETUP_PATHS: &[&str] = &[
    "/sbin/cryptsetup",
    "/usr/sbin/cryptsetup",
    "/usr/bin/cryptsetup",
    "/bin/cryptsetup",
    "/usr/local/sbin/cryptsetup",
];

/// Default locations probed when looking for `mkfs.ext4`.
pub const DEFAULT_MKFS_EXT4_PATHS: &[&str] = &[
    "/sbin/mkfs.ext4",
    "/usr/sbin/mkfs.ext4",
    "/usr/local/sbin/mkfs.ext4",
];

/// Default locations probed when looking for `e2fsck`.
pub const DEFAULT_E2FSCK_PATHS: &[&str] =
    &["/sbin/e2fsck", "/usr/sbin/e2fsck", "/usr/local/sbin/e2fsck"];

/// Default locations probed when looking for `resize2fs`.
pub const DEFAULT_RESIZE2FS_PATHS: &[&str] = &[
    "/sbin/resize2fs",
    "/usr/sbin/resize2fs",
    "/usr/local/sbin/resize2fs",
];

/// Default locations probed when looking for `mount`.
pub const DEFAULT_MOUNT_PATHS: &[&str] = &["/bin/mount", "/usr/bin/mount", "/sbin/mount"];

/// Default locations probed when looking for `umount`.
pub const DEFAULT_UMOUNT_PATHS: &[&str] = &["/bin/umount", "/usr/bin/umount", "/sbin/umount"];

const RANDOM_SOURCE: &str = "/dev/urandom";
const MEGABYTE: usize = 1024 * 1024;

/// System provider driving the host `cryptsetup` and ext4 binaries.
#[derive(Debug, Clone)]
pub struct SystemLuksProvider {
    cryptsetup: CommandRunner,
    mkfs: CommandRunner,
    e2fsck: CommandRunner,
    resize2fs: CommandRunner,
    mount: CommandRunner,
    umount: CommandRunner,
}

impl SystemLuksProvider {
    /// Build a provider from the user configuration, falling back to
    /// discovery over the well-known paths for any tool not overridden.
    pub fn from_config(config: &SecsConfig) -> SecsResult<Self> {
        let tools = &config.tools;
        Ok(Self {
            cryptsetup: resolve(
                tools.cryptsetup.as_deref(),
                DEFAULT_CRYPTSETUP_PATHS,
                "cryptsetup",
            )?,
            mkfs: resolve(tools.mkfs_ext4.as_deref(), DEFAULT_MKFS_EXT4_PATHS, "mkfs.ext4")?,
            e2fsck: resolve(tools.e2fsck.as_deref(), DEFAULT_E2FSCK_PATHS, "e2fsck")?,
            resize2fs: resolve(
                tools.resize2fs.as_deref(),
                DEFAULT_RESIZE2FS_PATHS,
                "resize2fs",
            )?,
            mount: resolve(tools.mount.as_deref(), DEFAULT_MOUNT_PATHS, "mount")?,
            umount: resolve(tools.umount.as_deref(), DEFAULT_UMOUNT_PATHS, "umount")?,
        })
    }

    /// Build a provider with every tool resolved inside one directory.
    /// Intended for test harnesses with fake binaries.
    pub fn with_tool_dir(dir: &Path) -> SecsResult<Self> {
        Ok(Self {
            cryptsetup: runner_at(dir.join("cryptsetup"))?,
            mkfs: runner_at(dir.join("mkfs.ext4"))?,
            e2fsck: runner_at(dir.join("e2fsck"))?,
            resize2fs: runner_at(dir.join("resize2fs"))?,
            mount: runner_at(dir.join("mount"))?,
            umount: runner_at(dir.join("umount"))?,
        })
    }

    fn mapper_device(mapper: &str) -> PathBuf {
        Path::new("/dev/mapper").join(mapper)
    }

    /// Stream `size_mb` megabytes from the kernel RNG into `path`.
    fn fill_random(path: &Path, size_mb: u64, append: bool) -> std::io::Result<()> {
        let mut source = File::open(RANDOM_SOURCE)?;
        let mut target = if append {
            OpenOptions::new().append(true).open(path)?
        } else {
            File::create(path)?
        };

        let mut buf = vec![0u8; MEGABYTE];
        for _ in 0..size_mb {
            source.read_exact(&mut buf)?;
            target.write_all(&buf)?;
        }
        target.sync_all()?;
        Ok(())
    }

    /// Hand `path` (and, if a directory, everything under it) to `owner`.
    /// Symlinks are re-owned but never followed.
    fn chown_tree(path: &Path, owner: Identity) -> std::io::Result<()> {
        unix_fs::lchown(path, Some(owner.uid), Some(owner.gid))?;
        if fs::symlink_metadata(path)?.is_dir() {
            for entry in fs::read_dir(path)? {
                Self::chown_tree(&entry?.path(), owner)?;
            }
        }
        Ok(())
    }

    /// Run a native filesystem primitive, folding errors into step failures.
    fn native(op: &Primitive, run: impl FnOnce() -> std::io::Result<()>) -> SecsResult<()> {
        debug!("> {op}");
        run().map_err(|err| SecsError::Primitive {
            step: op.name().to_string(),
            detail: format!("{op}: {err}"),
        })
    }
}

impl ContainerProvider for SystemLuksProvider {
    fn is_encrypted(&self, path: &Path) -> bool {
        if !path.exists() {
            return false;
        }
        let path = path_str(path);
        matches!(
            self.cryptsetup.run(&["isLuks", &path], StdioMode::Quiet),
            Ok(0)
        )
    }

    fn is_active(&self, mapper: &str) -> bool {
        matches!(
            self.cryptsetup.run(&["status", mapper], StdioMode::Quiet),
            Ok(0)
        )
    }

    fn mount_point(&self, mapper: &str) -> Option<PathBuf> {
        mounts::find_mount_point(&Self::mapper_device(mapper))
    }

    fn execute(&self, op: &Primitive) -> SecsResult<()> {
        match op {
            Primitive::Allocate { path, size_mb } => {
                Self::native(op, || Self::fill_random(path, *size_mb, false))
            }
            Primitive::Append { path, size_mb } => {
                Self::native(op, || Self::fill_random(path, *size_mb, true))
            }
            Primitive::FormatHeader { path } => {
                let path = path_str(path);
                self.cryptsetup
                    .run_checked(&["-yq", "luksFormat", &path], op.name())
            }
            Primitive::MapDevice { path, mapper } => {
                let path = path_str(path);
                self.cryptsetup
                    .run_checked(&["luksOpen", &path, mapper], op.name())
            }
            Primitive::UnmapDevice { mapper } => {
                self.cryptsetup.run_checked(&["luksClose", mapper], op.name())
            }
            Primitive::ResizeMapping { mapper } => {
                self.cryptsetup.run_checked(&["resize", mapper], op.name())
            }
            Primitive::MakeFilesystem { mapper } => {
                let device = path_str(&Self::mapper_device(mapper));
                self.mkfs.run_checked(&["-j", &device], op.name())
            }
            Primitive::CheckFilesystem { mapper } => {
                let device = path_str(&Self::mapper_device(mapper));
                self.e2fsck.run_checked(&["-f", &device], op.name())
            }
            Primitive::GrowFilesystem { mapper } => {
                let device = path_str(&Self::mapper_device(mapper));
                self.resize2fs.run_checked(&[device.as_str()], op.name())
            }
            Primitive::RenamePath { from, to } => Self::native(op, || fs::rename(from, to)),
            Primitive::MakeMountDir { path } => Self::native(op, || fs::create_dir(path)),
            Primitive::RemoveMountDir { path } => Self::native(op, || fs::remove_dir(path)),
            Primitive::MountDevice { mapper, mount } => {
                let device = path_str(&Self::mapper_device(mapper));
                let mount = path_str(mount);
                self.mount.run_checked(&[&device, &mount], op.name())
            }
            Primitive::UnmountPath { mount } => {
                let mount = path_str(mount);
                self.umount.run_checked(&[mount.as_str()], op.name())
            }
            Primitive::ChangeOwner {
                path,
                owner,
                recursive,
            } => Self::native(op, || {
                if *recursive {
                    Self::chown_tree(path, *owner)
                } else {
                    unix_fs::lchown(path, Some(owner.uid), Some(owner.gid))
                }
            }),
        }
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Pick the override when configured, or walk the default locations.
fn resolve(
    override_path: Option<&str>,
    defaults: &[&str],
    name: &str,
) -> SecsResult<CommandRunner> {
    if let Some(path) = override_path {
        return runner_at(PathBuf::from(path));
    }
    for candidate in defaults {
        let path = Path::new(candidate);
        if path.exists() {
            return Ok(CommandRunner::new(path.to_path_buf()));
        }
    }
    Err(SecsError::InvalidConfig(format!(
        "unable to locate {name} binary; tried {defaults:?}"
    )))
}

fn runner_at(path: PathBuf) -> SecsResult<CommandRunner> {
    if !path.exists() {
        return Err(SecsError::InvalidConfig(format!(
            "binary not found at {}",
            path.display()
        )));
    }
    Ok(CommandRunner::new(path))
}
