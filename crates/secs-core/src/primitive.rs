use crate::identity::Identity;
use std::fmt;
use std::path::PathBuf;

/// A single operation the engine can ask a provider to perform.
///
/// Descriptors carry typed parameters; the provider decides how each maps to
/// an argument vector for an external tool or to a native filesystem call.
/// There is no shell and no string templating anywhere between here and the
/// child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    /// Fill `path` with `size_mb` megabytes of random data, replacing any
    /// existing content. Doubles as a wipe against known-plaintext attacks.
    Allocate { path: PathBuf, size_mb: u64 },

    /// Append `size_mb` megabytes of random data to the end of `path`.
    Append { path: PathBuf, size_mb: u64 },

    /// Write a fresh LUKS header over `path`. Prompts for a passphrase.
    FormatHeader { path: PathBuf },

    /// Map the container at `path` to `/dev/mapper/<mapper>`. Prompts for
    /// the passphrase.
    MapDevice { path: PathBuf, mapper: String },

    /// Tear down the `/dev/mapper/<mapper>` mapping, revoking plaintext
    /// access.
    UnmapDevice { mapper: String },

    /// Grow the mapping to cover a resized backing store.
    ResizeMapping { mapper: String },

    /// Build a journaled filesystem on the mapped device.
    MakeFilesystem { mapper: String },

    /// Force a consistency check of the filesystem on the mapped device.
    CheckFilesystem { mapper: String },

    /// Grow the filesystem to fill the mapped device.
    GrowFilesystem { mapper: String },

    /// Rename `from` to `to` (hide on open, restore on close).
    RenamePath { from: PathBuf, to: PathBuf },

    /// Create the mount-point directory.
    MakeMountDir { path: PathBuf },

    /// Remove the mount-point directory.
    RemoveMountDir { path: PathBuf },

    /// Mount `/dev/mapper/<mapper>` at `mount`.
    MountDevice { mapper: String, mount: PathBuf },

    /// Unmount whatever is attached at `mount`.
    UnmountPath { mount: PathBuf },

    /// Hand ownership of `path` to the invoking user.
    ChangeOwner {
        path: PathBuf,
        owner: Identity,
        recursive: bool,
    },
}

impl Primitive {
    /// Short step name used in warnings and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Allocate { .. } => "allocate",
            Primitive::Append { .. } => "append",
            Primitive::FormatHeader { .. } => "luksFormat",
            Primitive::MapDevice { .. } => "luksOpen",
            Primitive::UnmapDevice { .. } => "luksClose",
            Primitive::ResizeMapping { .. } => "resize",
            Primitive::MakeFilesystem { .. } => "mkfs",
            Primitive::CheckFilesystem { .. } => "fsck",
            Primitive::GrowFilesystem { .. } => "resizefs",
            Primitive::RenamePath { .. } => "rename",
            Primitive::MakeMountDir { .. } => "mkdir",
            Primitive::RemoveMountDir { .. } => "rmdir",
            Primitive::MountDevice { .. } => "mount",
            Primitive::UnmountPath { .. } => "umount",
            Primitive::ChangeOwner { .. } => "chown",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Allocate { path, size_mb } => {
                write!(f, "allocate {} ({size_mb}MB)", path.display())
            }
            Primitive::Append { path, size_mb } => {
                write!(f, "append {} (+{size_mb}MB)", path.display())
            }
            Primitive::FormatHeader { path } => write!(f, "luksFormat {}", path.display()),
            Primitive::MapDevice { path, mapper } => {
                write!(f, "luksOpen {} {mapper}", path.display())
            }
            Primitive::UnmapDevice { mapper } => write!(f, "luksClose {mapper}"),
            Primitive::ResizeMapping { mapper } => write!(f, "resize {mapper}"),
            Primitive::MakeFilesystem { mapper } => write!(f, "mkfs {mapper}"),
            Primitive::CheckFilesystem { mapper } => write!(f, "fsck {mapper}"),
            Primitive::GrowFilesystem { mapper } => write!(f, "resizefs {mapper}"),
            Primitive::RenamePath { from, to } => {
                write!(f, "rename {} -> {}", from.display(), to.display())
            }
            Primitive::MakeMountDir { path } => write!(f, "mkdir {}", path.display()),
            Primitive::RemoveMountDir { path } => write!(f, "rmdir {}", path.display()),
            Primitive::MountDevice { mapper, mount } => {
                write!(f, "mount {mapper} {}", mount.display())
            }
            Primitive::UnmountPath { mount } => write!(f, "umount {}", mount.display()),
            Primitive::ChangeOwner {
                path,
                owner,
                recursive,
            } => {
                let flag = if *recursive { "-R " } else { "" };
                write!(f, "chown {flag}{}:{} {}", owner.uid, owner.gid, path.display())
            }
        }
    }
}
