//! System integration for secs: the provider that drives the host's
//! `cryptsetup` and ext4 tooling. The heavy lifting lives in `system`, while
//! `command` and `mounts` cover process spawning and mount-table lookup.

mod command;
mod mounts;
mod system;

pub use system::{
    SystemLuksProvider, DEFAULT_CRYPTSETUP_PATHS, DEFAULT_E2FSCK_PATHS, DEFAULT_MKFS_EXT4_PATHS,
    DEFAULT_MOUNT_PATHS, DEFAULT_RESIZE2FS_PATHS, DEFAULT_UMOUNT_PATHS,
};
