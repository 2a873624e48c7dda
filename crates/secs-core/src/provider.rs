use crate::error::SecsResult;
use crate::primitive::Primitive;
use std::path::{Path, PathBuf};

/// Abstraction over the host's disk-encryption and filesystem tooling.
///
/// Implementations provide a thin, testable surface over the underlying
/// system interface so the transition engine can be exercised without real
/// block devices or root privileges.
///
/// The three probes are read-only and advisory: they gate preconditions, so
/// a failed probe invocation degrades to the conservative answer (not
/// encrypted, not active, not mounted) instead of propagating an error.
pub trait ContainerProvider {
    /// True iff `path` exists and carries a header the encryption engine
    /// recognizes.
    fn is_encrypted(&self, path: &Path) -> bool;

    /// True iff the encryption engine reports an active mapping named
    /// `mapper`.
    fn is_active(&self, mapper: &str) -> bool;

    /// Where `/dev/mapper/<mapper>` is currently mounted, if anywhere.
    fn mount_point(&self, mapper: &str) -> Option<PathBuf>;

    /// Perform a single mutating operation, blocking until it completes.
    /// Success or failure is all the engine sees; output is not parsed.
    fn execute(&self, op: &Primitive) -> SecsResult<()>;
}
