//! Lifecycle transition engine: create, open, close, and expand.
//!
//! Each transition is a fixed, ordered list of primitive steps, gated by
//! state probes and guarded by a per-mapper advisory lock. The step list is
//! plain data: every step carries its own failure policy, so the fatal vs.
//! warn-and-continue classification is visible in the plan rather than
//! buried in control flow.

use crate::config::SecsConfig;
use crate::container::{Container, State};
use crate::error::{SecsError, SecsResult};
use crate::identity::Identity;
use crate::lockfile::TransitionLock;
use crate::primitive::Primitive;
use crate::provider::ContainerProvider;
use log::warn;
use std::path::PathBuf;
use std::sync::Arc;

/// Below this the LUKS header plus minimal filesystem metadata cannot fit.
pub const MIN_CREATE_MB: u64 = 3;

/// How a failing step affects the rest of its transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Abort the transition and surface the failure.
    Fatal,
    /// Log a warning and keep going.
    WarnAndContinue,
}

/// One primitive paired with its failure policy.
#[derive(Debug, Clone)]
pub struct Step {
    pub op: Primitive,
    pub policy: StepPolicy,
}

impl Step {
    fn fatal(op: Primitive) -> Self {
        Self {
            op,
            policy: StepPolicy::Fatal,
        }
    }

    fn lenient(op: Primitive) -> Self {
        Self {
            op,
            policy: StepPolicy::WarnAndContinue,
        }
    }
}

/// Drives the four lifecycle transitions over a provider.
///
/// Holds no state of its own beyond configuration and the invoking identity;
/// container state is re-derived from the OS on every call.
pub struct ContainerService<P: ContainerProvider> {
    config: Arc<SecsConfig>,
    provider: P,
    identity: Identity,
}

impl<P: ContainerProvider> ContainerService<P> {
    pub fn new(config: Arc<SecsConfig>, provider: P, identity: Identity) -> Self {
        Self {
            config,
            provider,
            identity,
        }
    }

    /// Observe which lifecycle state the container is in right now.
    pub fn probe(&self, container: &Container) -> State {
        if self.provider.mount_point(&container.mapper).is_some() {
            return State::Mounted;
        }
        if self.provider.is_active(&container.mapper) {
            return State::Open;
        }
        if self.provider.is_encrypted(&container.path) {
            return State::Closed;
        }
        State::Absent
    }

    /// Allocate, format, and build a filesystem in a new container. Leaves
    /// it in the Closed state, owned by the invoking user.
    ///
    /// No rollback on failure: an aborted create leaves at worst a file of
    /// random bytes, never user data.
    pub fn create(&self, container: &Container, size_mb: u64) -> SecsResult<()> {
        if size_mb < MIN_CREATE_MB {
            return Err(SecsError::SizeTooSmall {
                requested: size_mb,
                minimum: MIN_CREATE_MB,
            });
        }

        let _lock = self.lock(&container.mapper)?;
        let steps = [
            Step::fatal(Primitive::Allocate {
                path: container.path.clone(),
                size_mb,
            }),
            Step::fatal(Primitive::ChangeOwner {
                path: container.path.clone(),
                owner: self.identity,
                recursive: false,
            }),
            Step::fatal(Primitive::FormatHeader {
                path: container.path.clone(),
            }),
            Step::fatal(Primitive::MapDevice {
                path: container.path.clone(),
                mapper: container.mapper.clone(),
            }),
            Step::fatal(Primitive::MakeFilesystem {
                mapper: container.mapper.clone(),
            }),
            Step::fatal(Primitive::UnmapDevice {
                mapper: container.mapper.clone(),
            }),
        ];
        self.run_plan(&steps)
    }

    /// Decrypt and mount the container. Returns the mount point.
    ///
    /// Without an explicit mount path, the backing file is renamed to its
    /// hidden sibling and the mount appears exactly where the encrypted file
    /// used to be, so the same path names the container whether closed or
    /// open.
    pub fn open(&self, container: &Container) -> SecsResult<PathBuf> {
        let _lock = self.lock(&container.mapper)?;

        if self.is_active_or_mounted(container) {
            return Err(SecsError::AlreadyOpen(container.path.clone()));
        }
        if !self.provider.is_encrypted(&container.path) {
            return Err(SecsError::NotAContainer(container.path.clone()));
        }

        let mount = container.mount_path();
        let mut steps = vec![Step::fatal(Primitive::MapDevice {
            path: container.path.clone(),
            mapper: container.mapper.clone(),
        })];
        if container.auto_mount() {
            steps.push(Step::fatal(Primitive::RenamePath {
                from: container.path.clone(),
                to: container.hidden_path(),
            }));
        }
        steps.push(Step::lenient(Primitive::MakeMountDir {
            path: mount.clone(),
        }));
        steps.push(Step::fatal(Primitive::MountDevice {
            mapper: container.mapper.clone(),
            mount: mount.clone(),
        }));
        steps.push(Step::fatal(Primitive::ChangeOwner {
            path: mount.clone(),
            owner: self.identity,
            recursive: true,
        }));

        self.run_plan(&steps)?;
        Ok(mount)
    }

    /// Unmount and lock the container.
    ///
    /// Unmount, directory removal, and path restore are all lenient: the
    /// final unmap must run no matter what came before, because a dangling
    /// decrypted mapping is worse than untidy filesystem state.
    pub fn close(&self, container: &Container) -> SecsResult<()> {
        let _lock = self.lock(&container.mapper)?;

        if !self.is_active_or_mounted(container) {
            return Err(SecsError::NotOpen(container.path.clone()));
        }

        let mount = container.mount_path();
        let mut steps = vec![
            Step::lenient(Primitive::UnmountPath {
                mount: mount.clone(),
            }),
            Step::lenient(Primitive::RemoveMountDir { path: mount }),
        ];
        if container.auto_mount() {
            steps.push(Step::lenient(Primitive::RenamePath {
                from: container.hidden_path(),
                to: container.path.clone(),
            }));
        }
        steps.push(Step::fatal(Primitive::UnmapDevice {
            mapper: container.mapper.clone(),
        }));

        self.run_plan(&steps)
    }

    /// Grow a closed container by `delta_mb` megabytes, then grow the
    /// filesystem to match.
    ///
    /// Every step is fatal: a failure partway through leaves the container
    /// needing operator attention, which is reported rather than retried.
    /// The forced consistency check before resizing is a correctness
    /// requirement, not a courtesy.
    pub fn expand(&self, container: &Container, delta_mb: u64) -> SecsResult<()> {
        if delta_mb < 1 {
            return Err(SecsError::InvalidExpansion(delta_mb));
        }

        let _lock = self.lock(&container.mapper)?;

        if self.is_active_or_mounted(container) {
            return Err(SecsError::NotClosed(container.path.clone()));
        }
        if !self.provider.is_encrypted(&container.path) {
            return Err(SecsError::NotAContainer(container.path.clone()));
        }

        let steps = [
            Step::fatal(Primitive::Append {
                path: container.path.clone(),
                size_mb: delta_mb,
            }),
            Step::fatal(Primitive::MapDevice {
                path: container.path.clone(),
                mapper: container.mapper.clone(),
            }),
            Step::fatal(Primitive::ResizeMapping {
                mapper: container.mapper.clone(),
            }),
            Step::fatal(Primitive::CheckFilesystem {
                mapper: container.mapper.clone(),
            }),
            Step::fatal(Primitive::GrowFilesystem {
                mapper: container.mapper.clone(),
            }),
            Step::fatal(Primitive::UnmapDevice {
                mapper: container.mapper.clone(),
            }),
        ];
        self.run_plan(&steps)
    }

    fn is_active_or_mounted(&self, container: &Container) -> bool {
        self.provider.is_active(&container.mapper)
            || self.provider.mount_point(&container.mapper).is_some()
    }

    fn lock(&self, mapper: &str) -> SecsResult<TransitionLock> {
        TransitionLock::acquire(&self.config.lock_dir(), mapper)
    }

    fn run_plan(&self, steps: &[Step]) -> SecsResult<()> {
        for step in steps {
            match self.provider.execute(&step.op) {
                Ok(()) => {}
                Err(err) => match step.policy {
                    StepPolicy::Fatal => return Err(err),
                    StepPolicy::WarnAndContinue => {
                        warn!("{}: {err}; continuing", step.op.name());
                    }
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    /// Records executed primitives and answers probes from fixed flags.
    struct MockProvider {
        encrypted: bool,
        active: bool,
        mounted: Option<PathBuf>,
        executed: Mutex<Vec<Primitive>>,
        fail_steps: HashSet<&'static str>,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                encrypted: false,
                active: false,
                mounted: None,
                executed: Mutex::new(Vec::new()),
                fail_steps: HashSet::new(),
            }
        }

        fn encrypted(mut self) -> Self {
            self.encrypted = true;
            self
        }

        fn active(mut self) -> Self {
            self.active = true;
            self
        }

        fn failing(mut self, steps: &[&'static str]) -> Self {
            self.fail_steps = steps.iter().copied().collect();
            self
        }

        fn executed(&self) -> Vec<Primitive> {
            self.executed.lock().unwrap().clone()
        }

        fn step_names(&self) -> Vec<&'static str> {
            self.executed().iter().map(|op| op.name()).collect()
        }
    }

    impl ContainerProvider for MockProvider {
        fn is_encrypted(&self, _path: &Path) -> bool {
            self.encrypted
        }

        fn is_active(&self, _mapper: &str) -> bool {
            self.active
        }

        fn mount_point(&self, _mapper: &str) -> Option<PathBuf> {
            self.mounted.clone()
        }

        fn execute(&self, op: &Primitive) -> SecsResult<()> {
            self.executed.lock().unwrap().push(op.clone());
            if self.fail_steps.contains(op.name()) {
                return Err(SecsError::Primitive {
                    step: op.name().to_string(),
                    detail: "injected failure".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        service: ContainerService<MockProvider>,
        _tmp: TempDir,
    }

    fn fixture(provider: MockProvider) -> Fixture {
        let tmp = tempdir().unwrap();
        let mut config = SecsConfig::default();
        config.runtime.lock_dir = tmp.path().to_string_lossy().into_owned();
        let identity = Identity {
            uid: 1000,
            gid: 1000,
        };
        Fixture {
            service: ContainerService::new(Arc::new(config), provider, identity),
            _tmp: tmp,
        }
    }

    fn container() -> Container {
        Container::new(PathBuf::from("/data/vault"), None, None).unwrap()
    }

    #[test]
    fn create_rejects_undersized_container_without_side_effects() {
        let f = fixture(MockProvider::new());
        let err = f.service.create(&container(), 2).unwrap_err();
        assert_eq!(err.code(), "SC1200");
        assert!(f.service.provider.executed().is_empty());
    }

    #[test]
    fn create_runs_steps_in_order() {
        let f = fixture(MockProvider::new());
        f.service.create(&container(), 10).unwrap();
        assert_eq!(
            f.service.provider.step_names(),
            vec!["allocate", "chown", "luksFormat", "luksOpen", "mkfs", "luksClose"]
        );
    }

    #[test]
    fn create_aborts_on_format_failure() {
        let f = fixture(MockProvider::new().failing(&["luksFormat"]));
        let err = f.service.create(&container(), 10).unwrap_err();
        assert_eq!(err.code(), "SC2000");
        // nothing after the failed format runs
        assert_eq!(
            f.service.provider.step_names(),
            vec!["allocate", "chown", "luksFormat"]
        );
    }

    #[test]
    fn open_fails_fast_when_already_active() {
        let f = fixture(MockProvider::new().encrypted().active());
        let err = f.service.open(&container()).unwrap_err();
        assert_eq!(err.code(), "SC1203");
        assert!(f.service.provider.executed().is_empty());
    }

    #[test]
    fn open_fails_fast_without_luks_header() {
        let f = fixture(MockProvider::new());
        let err = f.service.open(&container()).unwrap_err();
        assert_eq!(err.code(), "SC1202");
        assert!(f.service.provider.executed().is_empty());
    }

    #[test]
    fn open_auto_mount_hides_and_mounts_in_place() {
        let f = fixture(MockProvider::new().encrypted());
        let c = container();
        let mount = f.service.open(&c).unwrap();
        assert_eq!(mount, PathBuf::from("/data/vault"));

        let executed = f.service.provider.executed();
        assert_eq!(
            executed[1],
            Primitive::RenamePath {
                from: PathBuf::from("/data/vault"),
                to: PathBuf::from("/data/.vault"),
            }
        );
        assert_eq!(
            f.service.provider.step_names(),
            vec!["luksOpen", "rename", "mkdir", "mount", "chown"]
        );
        match executed.last().unwrap() {
            Primitive::ChangeOwner {
                recursive, owner, ..
            } => {
                assert!(*recursive);
                assert_eq!(owner.uid, 1000);
            }
            other => panic!("expected trailing chown, got {other:?}"),
        }
    }

    #[test]
    fn open_explicit_mount_skips_rename() {
        let f = fixture(MockProvider::new().encrypted());
        let c = Container::new(
            PathBuf::from("/data/vault"),
            None,
            Some(PathBuf::from("/mnt/vault")),
        )
        .unwrap();
        let mount = f.service.open(&c).unwrap();
        assert_eq!(mount, PathBuf::from("/mnt/vault"));
        assert_eq!(
            f.service.provider.step_names(),
            vec!["luksOpen", "mkdir", "mount", "chown"]
        );
    }

    #[test]
    fn open_proceeds_when_mkdir_fails() {
        let f = fixture(MockProvider::new().encrypted().failing(&["mkdir"]));
        assert!(f.service.open(&container()).is_ok());
        assert_eq!(
            f.service.provider.step_names(),
            vec!["luksOpen", "rename", "mkdir", "mount", "chown"]
        );
    }

    #[test]
    fn close_fails_fast_when_not_open() {
        let f = fixture(MockProvider::new().encrypted());
        let err = f.service.close(&container()).unwrap_err();
        assert_eq!(err.code(), "SC1204");
        assert!(f.service.provider.executed().is_empty());
    }

    #[test]
    fn close_runs_restore_and_unmap_in_order() {
        let f = fixture(MockProvider::new().active());
        f.service.close(&container()).unwrap();
        assert_eq!(
            f.service.provider.step_names(),
            vec!["umount", "rmdir", "rename", "luksClose"]
        );
    }

    #[test]
    fn close_always_attempts_unmap_despite_lenient_failures() {
        let f = fixture(MockProvider::new().active().failing(&["umount", "rmdir", "rename"]));
        assert!(f.service.close(&container()).is_ok());
        assert_eq!(
            f.service.provider.step_names().last(),
            Some(&"luksClose")
        );
    }

    #[test]
    fn close_surfaces_unmap_failure() {
        let f = fixture(MockProvider::new().active().failing(&["luksClose"]));
        let err = f.service.close(&container()).unwrap_err();
        assert_eq!(err.code(), "SC2000");
    }

    #[test]
    fn close_with_explicit_mount_skips_restore() {
        let f = fixture(MockProvider::new().active());
        let c = Container::new(
            PathBuf::from("/data/vault"),
            None,
            Some(PathBuf::from("/mnt/vault")),
        )
        .unwrap();
        f.service.close(&c).unwrap();
        assert_eq!(
            f.service.provider.step_names(),
            vec!["umount", "rmdir", "luksClose"]
        );
    }

    #[test]
    fn expand_rejects_zero_delta() {
        let f = fixture(MockProvider::new().encrypted());
        let err = f.service.expand(&container(), 0).unwrap_err();
        assert_eq!(err.code(), "SC1201");
        assert!(f.service.provider.executed().is_empty());
    }

    #[test]
    fn expand_fails_fast_when_open() {
        let f = fixture(MockProvider::new().encrypted().active());
        let err = f.service.expand(&container(), 5).unwrap_err();
        assert_eq!(err.code(), "SC1205");
        assert!(f.service.provider.executed().is_empty());
    }

    #[test]
    fn expand_requires_luks_header() {
        let f = fixture(MockProvider::new());
        let err = f.service.expand(&container(), 5).unwrap_err();
        assert_eq!(err.code(), "SC1202");
    }

    #[test]
    fn expand_checks_before_growing() {
        let f = fixture(MockProvider::new().encrypted());
        f.service.expand(&container(), 5).unwrap();
        assert_eq!(
            f.service.provider.step_names(),
            vec!["append", "luksOpen", "resize", "fsck", "resizefs", "luksClose"]
        );
    }

    #[test]
    fn expand_aborts_when_fsck_fails() {
        let f = fixture(MockProvider::new().encrypted().failing(&["fsck"]));
        let err = f.service.expand(&container(), 5).unwrap_err();
        assert_eq!(err.code(), "SC2000");
        // the filesystem is never grown without a clean check
        assert!(!f.service.provider.step_names().contains(&"resizefs"));
    }

    #[test]
    fn probe_reports_each_state() {
        let c = container();

        let f = fixture(MockProvider::new());
        assert_eq!(f.service.probe(&c), State::Absent);

        let f = fixture(MockProvider::new().encrypted());
        assert_eq!(f.service.probe(&c), State::Closed);

        let f = fixture(MockProvider::new().encrypted().active());
        assert_eq!(f.service.probe(&c), State::Open);

        let mut provider = MockProvider::new().encrypted().active();
        provider.mounted = Some(PathBuf::from("/data/vault"));
        let f = fixture(provider);
        assert_eq!(f.service.probe(&c), State::Mounted);
    }
}
