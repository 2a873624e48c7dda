use std::env;

/// The pre-escalation user that owns container data.
///
/// The orchestrating process runs as root, but the container file and the
/// mounted tree belong to whoever invoked `sudo`. Captured once at startup
/// and injected into the engine so tests can supply an identity without any
/// real privilege escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    /// Read the invoking user from the sudo environment, if present.
    pub fn from_sudo_env() -> Option<Self> {
        let uid = env::var("SUDO_UID").ok()?.parse().ok()?;
        let gid = env::var("SUDO_GID").ok()?.parse().ok()?;
        Some(Self { uid, gid })
    }

    /// The effective uid/gid of the current process.
    pub fn current() -> Self {
        Self {
            uid: unsafe { libc::geteuid() },
            gid: unsafe { libc::getegid() },
        }
    }
}
