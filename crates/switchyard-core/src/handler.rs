//! Handler contract and lifecycle.
//!
//! A [`Handler`] declares the formats it reads and writes and performs the
//! byte-level work. The registry wraps every handler in a [`HandlerSlot`],
//! which owns the readiness state machine:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready
//!                              \-> Failed(reason)
//! ```
//!
//! The capability probe ([`Handler::initialize`]) runs at most once per slot.
//! Callers that arrive while a probe is running block until it resolves and
//! observe the same terminal state.

use crate::error::{ConvertError, InitError};
use crate::format::Format;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// A named byte payload.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct FileData {
    /// File name, including its extension.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl FileData {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Extension after the last dot, if the name has one.
    pub fn extension(&self) -> Option<&str> {
        split_extension(&self.name).1
    }

    /// Name without its last extension.
    pub fn stem(&self) -> &str {
        split_extension(&self.name).0
    }

    /// Name with the last extension replaced (or appended if there is none).
    pub fn renamed_with_extension(&self, ext: &str) -> String {
        format!("{}.{}", self.stem(), ext)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for FileData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileData")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

/// A unit of conversion capability.
///
/// Implementations must be pure with respect to [`convert`](Handler::convert):
/// no filesystem access and no global state changes.
pub trait Handler: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    /// Declared formats, each tagged with its direction flags.
    fn supported_formats(&self) -> &[Format];

    /// Whether any known format is accepted as a source.
    fn supports_any_input(&self) -> bool {
        false
    }

    /// Capability probe. Called at most once, by [`HandlerSlot::ensure_ready`].
    fn initialize(&self) -> Result<(), InitError> {
        Ok(())
    }

    /// Convert a non-empty batch of files from `from` to `to`.
    fn convert(
        &self,
        inputs: &[FileData],
        from: &Format,
        to: &Format,
    ) -> Result<Vec<FileData>, ConvertError>;

    /// Check whether `from -> to` is one of the declared capability pairs.
    fn declares_pair(&self, from: &str, to: &str) -> bool {
        let formats = self.supported_formats();
        let writes = formats
            .iter()
            .any(|f| f.can_be_target && f.internal_id == to);
        let reads = self.supports_any_input()
            || formats
                .iter()
                .any(|f| f.can_be_source && f.internal_id == from);
        writes && reads && from != to
    }
}

/// Readiness of a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HandlerState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

impl HandlerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandlerState::Ready | HandlerState::Failed(_))
    }
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerState::Uninitialized => f.write_str("uninitialized"),
            HandlerState::Initializing => f.write_str("initializing"),
            HandlerState::Ready => f.write_str("ready"),
            HandlerState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// A registered handler together with its lifecycle state.
pub struct HandlerSlot {
    handler: Arc<dyn Handler>,
    state: Mutex<HandlerState>,
    cond: Condvar,
    probes: AtomicUsize,
    /// Shared with the registry; bumped on every transition to `Failed`.
    failure_epoch: Arc<AtomicU64>,
}

impl fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSlot")
            .field("name", &self.handler.name())
            .field("state", &self.state())
            .finish()
    }
}

impl HandlerSlot {
    pub(crate) fn new(handler: Arc<dyn Handler>, failure_epoch: Arc<AtomicU64>) -> Self {
        Self {
            handler,
            state: Mutex::new(HandlerState::Uninitialized),
            cond: Condvar::new(),
            probes: AtomicUsize::new(0),
            failure_epoch,
        }
    }

    pub fn name(&self) -> &str {
        self.handler.name()
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> HandlerState {
        self.lock_state().clone()
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.lock_state(), HandlerState::Failed(_))
    }

    /// Number of probes that have actually run. Never exceeds one.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::Acquire)
    }

    /// Drive the handler to a terminal state, probing if nobody has yet.
    pub fn ensure_ready(&self) -> Result<(), InitError> {
        let mut state = self.lock_state();
        loop {
            match state.clone() {
                HandlerState::Ready => return Ok(()),
                HandlerState::Failed(reason) => {
                    return Err(InitError::new(self.name(), reason));
                }
                HandlerState::Initializing => {
                    state = self
                        .cond
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                HandlerState::Uninitialized => {
                    *state = HandlerState::Initializing;
                    drop(state);
                    return self.probe();
                }
            }
        }
    }

    /// Run the probe with the state lock released and publish the outcome.
    fn probe(&self) -> Result<(), InitError> {
        self.probes.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(handler = self.name(), "probing handler");

        let outcome = catch_unwind(AssertUnwindSafe(|| self.handler.initialize()))
            .unwrap_or_else(|_| Err(InitError::new(self.name(), "initialization panicked")));

        {
            let mut state = self.lock_state();
            match &outcome {
                Ok(()) => {
                    *state = HandlerState::Ready;
                    tracing::info!(handler = self.name(), "handler ready");
                }
                Err(err) => {
                    *state = HandlerState::Failed(err.reason.clone());
                    self.failure_epoch.fetch_add(1, Ordering::AcqRel);
                    tracing::warn!(
                        handler = self.name(),
                        reason = %err.reason,
                        "handler failed to initialize"
                    );
                }
            }
        }
        self.cond.notify_all();
        outcome
    }

    fn lock_state(&self) -> MutexGuard<'_, HandlerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::common;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    struct SlowProbe {
        formats: Vec<Format>,
        delay: Duration,
        fail: bool,
    }

    impl Handler for SlowProbe {
        fn name(&self) -> &str {
            "slow"
        }

        fn supported_formats(&self) -> &[Format] {
            &self.formats
        }

        fn initialize(&self) -> Result<(), InitError> {
            thread::sleep(self.delay);
            if self.fail {
                Err(InitError::new("slow", "primitive missing"))
            } else {
                Ok(())
            }
        }

        fn convert(
            &self,
            inputs: &[FileData],
            _from: &Format,
            _to: &Format,
        ) -> Result<Vec<FileData>, ConvertError> {
            Ok(inputs.to_vec())
        }
    }

    struct PanickingProbe {
        formats: Vec<Format>,
    }

    impl Handler for PanickingProbe {
        fn name(&self) -> &str {
            "panics"
        }

        fn supported_formats(&self) -> &[Format] {
            &self.formats
        }

        fn initialize(&self) -> Result<(), InitError> {
            panic!("probe exploded")
        }

        fn convert(
            &self,
            _inputs: &[FileData],
            _from: &Format,
            _to: &Format,
        ) -> Result<Vec<FileData>, ConvertError> {
            Err(ConvertError::Failed("unreachable".into()))
        }
    }

    fn slot(fail: bool, delay: Duration) -> (Arc<HandlerSlot>, Arc<AtomicU64>) {
        let epoch = Arc::new(AtomicU64::new(0));
        let handler = SlowProbe {
            formats: vec![common::png().allow_both()],
            delay,
            fail,
        };
        let slot = HandlerSlot::new(Arc::new(handler), Arc::clone(&epoch));
        (Arc::new(slot), epoch)
    }

    #[test]
    fn test_file_data_names() {
        let file = FileData::new("photo.final.png", vec![1, 2, 3]);
        assert_eq!(file.extension(), Some("png"));
        assert_eq!(file.stem(), "photo.final");
        assert_eq!(file.renamed_with_extension("zst"), "photo.final.zst");

        let bare = FileData::new("README", vec![]);
        assert_eq!(bare.extension(), None);
        assert_eq!(bare.renamed_with_extension("txt"), "README.txt");

        let hidden = FileData::new(".profile", vec![]);
        assert_eq!(hidden.extension(), None);
        assert_eq!(hidden.stem(), ".profile");
    }

    #[test]
    fn test_ready_transition() {
        let (slot, epoch) = slot(false, Duration::ZERO);
        assert_eq!(slot.state(), HandlerState::Uninitialized);

        slot.ensure_ready().expect("probe should pass");
        assert_eq!(slot.state(), HandlerState::Ready);

        slot.ensure_ready().expect("still ready");
        assert_eq!(slot.probe_count(), 1);
        assert_eq!(epoch.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_failed_transition_is_sticky() {
        let (slot, epoch) = slot(true, Duration::ZERO);

        let err = slot.ensure_ready().unwrap_err();
        assert_eq!(err.handler, "slow");
        assert_eq!(err.reason, "primitive missing");
        assert!(slot.is_failed());
        assert_eq!(epoch.load(Ordering::Acquire), 1);

        let again = slot.ensure_ready().unwrap_err();
        assert_eq!(again, err);
        assert_eq!(slot.probe_count(), 1);
        assert_eq!(epoch.load(Ordering::Acquire), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_probe() {
        let (slot, _) = slot(false, Duration::from_millis(50));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = Arc::clone(&slot);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    slot.ensure_ready()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().expect("thread panicked").is_ok());
        }
        assert_eq!(slot.probe_count(), 1);
        assert_eq!(slot.state(), HandlerState::Ready);
    }

    #[test]
    fn test_concurrent_callers_observe_same_failure() {
        let (slot, epoch) = slot(true, Duration::from_millis(50));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let slot = Arc::clone(&slot);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    slot.ensure_ready()
                })
            })
            .collect();

        for handle in handles {
            let err = handle.join().expect("thread panicked").unwrap_err();
            assert_eq!(err.reason, "primitive missing");
        }
        assert_eq!(slot.probe_count(), 1);
        assert_eq!(epoch.load(Ordering::Acquire), 1);
    }

    #[test]
    fn test_panicking_probe_fails_instead_of_hanging() {
        let epoch = Arc::new(AtomicU64::new(0));
        let handler = PanickingProbe {
            formats: vec![common::png().allow_both()],
        };
        let slot = HandlerSlot::new(Arc::new(handler), epoch);

        let err = slot.ensure_ready().unwrap_err();
        assert_eq!(err.reason, "initialization panicked");
        assert_eq!(
            slot.state(),
            HandlerState::Failed("initialization panicked".into())
        );
    }

    #[test]
    fn test_declares_pair() {
        let handler = SlowProbe {
            formats: vec![common::png().allow_from(), common::gif().allow_to()],
            delay: Duration::ZERO,
            fail: false,
        };
        assert!(handler.declares_pair("png", "gif"));
        assert!(!handler.declares_pair("gif", "png"));
        assert!(!handler.declares_pair("png", "png"));
    }
}
