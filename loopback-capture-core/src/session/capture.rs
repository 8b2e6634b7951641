use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dispatch::dispatcher::{BufferCallback, CaptureDispatcher, FaultHook};
use crate::models::audio_models::{ApplicationInfo, AudioFormat, SessionDiagnostics};
use crate::models::config::SessionConfig;
use crate::models::error::CaptureError;
use crate::models::state::{SessionState, TargetMode};
use crate::traits::capture_backend::CaptureBackend;
use crate::traits::session_observer::SessionObserver;

/// Internal mutable session state, protected by `parking_lot::Mutex`.
struct SessionInner {
    state: SessionState,
    target: Option<TargetMode>,
    format: Option<AudioFormat>,
    backend: Option<Box<dyn CaptureBackend>>,
    // Fault recorded by the dispatch thread, surfaced on the next start.
    pending_fault: Option<CaptureError>,
}

/// One capture context bound to a backend.
///
/// Owns the session state machine:
/// ```text
/// uninitialized --initialize--> initialized
/// initialized/stopped --start/start_process--> capturing
/// capturing --stop--> stopped
/// {any} --destroy--> destroyed (terminal)
/// ```
///
/// Lifecycle operations (`initialize`, `start`, `start_process`, `stop`,
/// `destroy`) are serialized per session; concurrent idempotent calls
/// observe the post-transition state instead of erroring. Sessions are
/// independent of each other: there is no process-wide singleton, and any
/// number of sessions against different targets may run concurrently.
///
/// The consumer callback runs on the session's dispatch thread, decoupled
/// from the backend's real-time delivery thread by a bounded queue. It must
/// still return quickly: a slow callback fills the queue and buffers get
/// dropped (visible in [`SessionDiagnostics`]). Callbacks must not call
/// lifecycle operations on their own session.
pub struct CaptureSession {
    // Serializes lifecycle transitions. Never held while the dispatch
    // thread's fault hook could need `inner` *and* we wait on that thread --
    // the hook only takes `inner`, and joins happen with `inner` released.
    ops: Mutex<()>,
    inner: Arc<Mutex<SessionInner>>,
    dispatcher: CaptureDispatcher,
    observer: Arc<Mutex<Option<Arc<dyn SessionObserver>>>>,
    config: SessionConfig,
}

impl CaptureSession {
    /// Allocate a session in `Uninitialized` state around `backend`.
    ///
    /// Fails with `CaptureError::Allocation` when the backend reports the
    /// device subsystem unreachable.
    pub fn create(backend: Box<dyn CaptureBackend>) -> Result<Self, CaptureError> {
        Self::with_config(backend, SessionConfig::default())
    }

    pub fn with_config(
        backend: Box<dyn CaptureBackend>,
        config: SessionConfig,
    ) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::Allocation)?;
        if !backend.is_available() {
            return Err(CaptureError::Allocation(
                "audio device subsystem unreachable".into(),
            ));
        }
        Ok(Self {
            ops: Mutex::new(()),
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Uninitialized,
                target: None,
                format: None,
                backend: Some(backend),
                pending_fault: None,
            })),
            dispatcher: CaptureDispatcher::new(),
            observer: Arc::new(Mutex::new(None)),
            config,
        })
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// The active capture target while `Capturing`, or the last one.
    pub fn target(&self) -> Option<TargetMode> {
        self.inner.lock().target
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.dispatcher.diagnostics()
    }

    /// Buffers rejected by the bounded dispatch queue so far.
    pub fn dropped_buffers(&self) -> u64 {
        self.dispatcher.diagnostics().buffers_dropped
    }

    /// Register the out-of-band observer for state changes and faults.
    pub fn set_observer(&self, observer: Arc<dyn SessionObserver>) {
        *self.observer.lock() = Some(observer);
    }

    /// Register the consumer callback, replacing any previous registration.
    /// Valid before or after `start`; takes effect for buffers dispatched
    /// after it returns. Ignored once the session is destroyed.
    pub fn set_callback(&self, callback: BufferCallback) {
        if self.inner.lock().state.is_destroyed() {
            return;
        }
        self.dispatcher.set_callback(callback);
    }

    /// Unregister the consumer callback; subsequent buffers are discarded.
    pub fn clear_callback(&self) {
        self.dispatcher.clear_callback();
    }

    /// Open the default loopback endpoint and negotiate the PCM format.
    /// Transitions: `Uninitialized` → `Initialized`.
    ///
    /// On failure the session stays `Uninitialized`, so a retry needs no new
    /// session.
    pub fn initialize(&self) -> Result<(), CaptureError> {
        let _ops = self.ops.lock();
        {
            let mut inner = self.inner.lock();
            match inner.state {
                SessionState::Uninitialized => {}
                SessionState::Destroyed => {
                    return Err(CaptureError::InvalidState("session destroyed".into()))
                }
                _ => return Err(CaptureError::AlreadyInitialized),
            }

            let Some(backend) = inner.backend.as_mut() else {
                return Err(CaptureError::InvalidState("backend released".into()));
            };
            let format = backend.open_endpoint()?;
            format
                .validate()
                .map_err(CaptureError::Device)?;

            inner.format = Some(format);
            inner.state = SessionState::Initialized;
        }
        self.notify_state(SessionState::Initialized);
        Ok(())
    }

    /// Begin system-wide capture.
    /// Transitions: `Initialized`/`Stopped` → `Capturing`.
    pub fn start(&self) -> Result<(), CaptureError> {
        self.start_with(TargetMode::SystemWide)
    }

    /// Begin capture scoped to `pid`.
    ///
    /// Fails with `CaptureError::ProcessNotFound` when the pid is not
    /// rendering audio, leaving the session in its prior state; falling back
    /// to system-wide capture is the caller's decision.
    pub fn start_process(&self, pid: u32) -> Result<(), CaptureError> {
        self.start_with(TargetMode::Process(pid))
    }

    fn start_with(&self, target: TargetMode) -> Result<(), CaptureError> {
        let _ops = self.ops.lock();
        {
            let mut inner = self.inner.lock();
            if let Some(fault) = inner.pending_fault.take() {
                return Err(fault);
            }
            Self::check_can_start(inner.state)?;
        }

        // Reap the previous run's dispatch thread. Its producers are gone
        // (the session is not capturing and `ops` is held), so the join is
        // bounded by the queue drain.
        self.dispatcher.shutdown();
        let sink = self.dispatcher.start(self.config.queue_depth, self.fault_hook())?;

        // The backend call happens with `inner` released: a scripted backend
        // may push buffers (and even a fault) synchronously, and the dispatch
        // thread must be free to take the state lock while that happens.
        // `ops` keeps the backend slot ours for the duration.
        let mut backend = {
            let mut inner = self.inner.lock();
            // The fault hook cannot have changed a non-capturing state.
            Self::check_can_start(inner.state)?;
            inner
                .backend
                .take()
                .ok_or_else(|| CaptureError::InvalidState("backend released".into()))?
        };
        let started = match target {
            TargetMode::SystemWide => backend.start(sink),
            TargetMode::Process(pid) => backend.start_process(pid, sink),
        };
        {
            let mut inner = self.inner.lock();
            if started.is_ok() {
                inner.state = SessionState::Capturing;
                inner.target = Some(target);
            }
            inner.backend = Some(backend);
        }

        match started {
            Ok(()) => {
                self.notify_state(SessionState::Capturing);
                Ok(())
            }
            Err(error) => {
                // The backend dropped its sink on failure; the dispatch
                // thread drains out and the session keeps its prior state.
                self.dispatcher.shutdown();
                Err(error)
            }
        }
    }

    /// Stop capturing. Transitions: `Capturing` → `Stopped`.
    ///
    /// Idempotent: on a non-capturing session this is a no-op returning
    /// success. Queued buffers are still delivered; once this returns, no
    /// further callback invocation happens until the next start.
    pub fn stop(&self) -> Result<(), CaptureError> {
        let _ops = self.ops.lock();
        let (mut backend, was_capturing) = {
            let mut inner = self.inner.lock();
            if inner.state.is_destroyed() {
                return Ok(());
            }
            let was_capturing = inner.state.is_capturing();
            if was_capturing {
                inner.state = SessionState::Stopped;
            }
            (inner.backend.take(), was_capturing)
        };

        // Join the backend's delivery thread with `inner` released; it may
        // be mid-push, and the dispatch thread needs the state lock to
        // process a trailing fault.
        if let Some(backend) = backend.as_mut() {
            backend.stop();
        }
        if backend.is_some() {
            self.inner.lock().backend = backend;
        }

        self.dispatcher.shutdown();
        if was_capturing {
            self.notify_state(SessionState::Stopped);
        }
        Ok(())
    }

    /// Release the backend and tear the session down. Terminal and
    /// idempotent; waits for any in-flight callback invocation to finish
    /// before returning, so callback closure state is never used after free.
    pub fn destroy(&self) {
        let _ops = self.ops.lock();
        let (backend, first) = {
            let mut inner = self.inner.lock();
            let first = !inner.state.is_destroyed();
            inner.state = SessionState::Destroyed;
            inner.format = None;
            inner.pending_fault = None;
            (inner.backend.take(), first)
        };

        if let Some(mut backend) = backend {
            backend.stop();
            // Backend and its device handles released here.
        }

        self.dispatcher.shutdown();
        self.dispatcher.clear_callback();
        if first {
            self.notify_state(SessionState::Destroyed);
        }
    }

    /// The format snapshot taken at initialize time. Stable for the rest of
    /// the session's life.
    pub fn format(&self) -> Result<AudioFormat, CaptureError> {
        let inner = self.inner.lock();
        if inner.state.is_destroyed() {
            return Err(CaptureError::InvalidState("session destroyed".into()));
        }
        inner.format.ok_or(CaptureError::NotInitialized)
    }

    /// Snapshot the processes currently rendering audio, at most `max_count`
    /// entries. Truncates silently; returns an empty vector when nothing is
    /// rendering.
    pub fn list_applications(
        &self,
        max_count: usize,
    ) -> Result<Vec<ApplicationInfo>, CaptureError> {
        // Takes the op lock so the backend slot is never observed empty
        // while a lifecycle call has the backend checked out.
        let _ops = self.ops.lock();
        let mut inner = self.inner.lock();
        if inner.state.is_destroyed() {
            return Err(CaptureError::InvalidState("session destroyed".into()));
        }
        let Some(backend) = inner.backend.as_mut() else {
            return Err(CaptureError::InvalidState("backend released".into()));
        };
        let mut applications = backend.list_applications(max_count)?;
        applications.truncate(max_count);
        Ok(applications)
    }

    // --- Internal helpers ---

    fn check_can_start(state: SessionState) -> Result<(), CaptureError> {
        match state {
            SessionState::Initialized | SessionState::Stopped => Ok(()),
            SessionState::Uninitialized => Err(CaptureError::InvalidState(
                "start requires an initialized session".into(),
            )),
            SessionState::Capturing => {
                Err(CaptureError::InvalidState("session already capturing".into()))
            }
            SessionState::Destroyed => {
                Err(CaptureError::InvalidState("session destroyed".into()))
            }
        }
    }

    /// Hook run on the dispatch thread when the backend reports a fault:
    /// record it, leave capturing, notify the observer.
    fn fault_hook(&self) -> FaultHook {
        let inner = Arc::clone(&self.inner);
        let observer = Arc::clone(&self.observer);
        Arc::new(move |error: CaptureError| {
            let transitioned = {
                let mut inner = inner.lock();
                if inner.state.is_destroyed() {
                    return;
                }
                inner.pending_fault = Some(error.clone());
                if inner.state.is_capturing() {
                    inner.state = SessionState::Stopped;
                    true
                } else {
                    false
                }
            };
            let observer = observer.lock().clone();
            if let Some(observer) = observer {
                if transitioned {
                    observer.on_state_changed(SessionState::Stopped);
                }
                observer.on_error(&error);
            }
        })
    }

    fn notify_state(&self, state: SessionState) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            observer.on_state_changed(state);
        }
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CaptureSession")
            .field("state", &inner.state)
            .field("target", &inner.target)
            .field("format", &inner.format)
            .finish_non_exhaustive()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::models::audio_models::AudioBuffer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    fn session(backend: NullBackend) -> CaptureSession {
        CaptureSession::create(Box::new(backend)).unwrap()
    }

    fn initialized(backend: NullBackend) -> CaptureSession {
        let s = session(backend);
        s.initialize().unwrap();
        s
    }

    fn recording_callback() -> (BufferCallback, Arc<Mutex<Vec<usize>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let cb_frames = Arc::clone(&frames);
        let cb: BufferCallback = Arc::new(move |buf: &AudioBuffer| {
            cb_frames.lock().push(buf.frames());
        });
        (cb, frames)
    }

    struct RecordingObserver {
        states: Mutex<Vec<SessionState>>,
        errors: Mutex<Vec<CaptureError>>,
    }

    impl RecordingObserver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                states: Mutex::new(Vec::new()),
                errors: Mutex::new(Vec::new()),
            })
        }
    }

    impl SessionObserver for RecordingObserver {
        fn on_state_changed(&self, state: SessionState) {
            self.states.lock().push(state);
        }

        fn on_error(&self, error: &CaptureError) {
            self.errors.lock().push(error.clone());
        }
    }

    #[test]
    fn create_fails_when_subsystem_unreachable() {
        let err = CaptureSession::create(Box::new(NullBackend::new().unavailable())).unwrap_err();
        assert!(matches!(err, CaptureError::Allocation(_)));
    }

    #[test]
    fn lifecycle_follows_the_state_machine() {
        let s = session(NullBackend::new());
        assert_eq!(s.state(), SessionState::Uninitialized);

        s.initialize().unwrap();
        assert_eq!(s.state(), SessionState::Initialized);

        s.start().unwrap();
        assert_eq!(s.state(), SessionState::Capturing);
        assert_eq!(s.target(), Some(TargetMode::SystemWide));

        s.stop().unwrap();
        assert_eq!(s.state(), SessionState::Stopped);

        s.start().unwrap();
        assert_eq!(s.state(), SessionState::Capturing);

        s.stop().unwrap();
        s.destroy();
        assert_eq!(s.state(), SessionState::Destroyed);
    }

    #[test]
    fn start_before_initialize_is_invalid_and_harmless() {
        let s = session(NullBackend::new());
        let err = s.start().unwrap_err();
        assert!(matches!(err, CaptureError::InvalidState(_)));
        assert_eq!(s.state(), SessionState::Uninitialized);

        // Still initializable afterwards.
        s.initialize().unwrap();
        assert_eq!(s.state(), SessionState::Initialized);
    }

    #[test]
    fn double_initialize_fails_without_corrupting_state() {
        let s = initialized(NullBackend::new());
        assert_eq!(s.initialize().unwrap_err(), CaptureError::AlreadyInitialized);
        assert_eq!(s.state(), SessionState::Initialized);
    }

    #[test]
    fn failed_initialize_leaves_session_retryable() {
        let backend = NullBackend::new().failing_open(CaptureError::Device("no endpoint".into()));
        let s = session(backend);
        let err = s.initialize().unwrap_err();
        assert_eq!(err, CaptureError::Device("no endpoint".into()));
        assert_eq!(s.state(), SessionState::Uninitialized);
        assert_eq!(s.format().unwrap_err(), CaptureError::NotInitialized);
    }

    #[test]
    fn failed_start_keeps_prior_state() {
        let backend = NullBackend::new().failing_start(CaptureError::DeviceBusy("exclusive".into()));
        let s = initialized(backend);
        let err = s.start().unwrap_err();
        assert_eq!(err, CaptureError::DeviceBusy("exclusive".into()));
        assert_eq!(s.state(), SessionState::Initialized);
    }

    #[test]
    fn stop_is_a_noop_off_capturing() {
        let s = session(NullBackend::new());
        assert!(s.stop().is_ok());
        assert_eq!(s.state(), SessionState::Uninitialized);

        s.initialize().unwrap();
        assert!(s.stop().is_ok());
        assert_eq!(s.state(), SessionState::Initialized);

        s.start().unwrap();
        s.stop().unwrap();
        assert!(s.stop().is_ok());
        assert_eq!(s.state(), SessionState::Stopped);
    }

    #[test]
    fn destroy_is_idempotent_and_terminal() {
        let s = initialized(NullBackend::new());
        for _ in 0..3 {
            s.destroy();
            assert_eq!(s.state(), SessionState::Destroyed);
        }
        assert!(matches!(s.initialize(), Err(CaptureError::InvalidState(_))));
        assert!(matches!(s.start(), Err(CaptureError::InvalidState(_))));
        assert!(matches!(s.format(), Err(CaptureError::InvalidState(_))));
        assert!(matches!(
            s.list_applications(10),
            Err(CaptureError::InvalidState(_))
        ));
        // Idempotent operations still succeed quietly.
        assert!(s.stop().is_ok());
    }

    #[test]
    fn format_is_a_fixed_snapshot_with_valid_fields() {
        let format = AudioFormat {
            sample_rate: 48000,
            channels: 2,
            bits_per_sample: 32,
        };
        let s = initialized(NullBackend::new().with_format(format));

        let negotiated = s.format().unwrap();
        assert!(negotiated.sample_rate > 0);
        assert!(negotiated.channels > 0);
        assert!([16, 24, 32].contains(&negotiated.bits_per_sample));

        s.start().unwrap();
        assert_eq!(s.format().unwrap(), negotiated);
        s.stop().unwrap();
        assert_eq!(s.format().unwrap(), negotiated);
    }

    #[test]
    fn initialize_rejects_invalid_negotiated_format() {
        let backend = NullBackend::new().with_format(AudioFormat {
            sample_rate: 48000,
            channels: 2,
            bits_per_sample: 20,
        });
        let s = session(backend);
        assert!(matches!(s.initialize(), Err(CaptureError::Device(_))));
        assert_eq!(s.state(), SessionState::Uninitialized);
    }

    #[test]
    fn five_scripted_buffers_arrive_in_order_and_none_after_stop() {
        let s = initialized(NullBackend::new().with_script(vec![vec![0.0; 960]; 5]));
        let (cb, frames) = recording_callback();
        s.set_callback(cb);

        s.start().unwrap();
        s.stop().unwrap();

        assert_eq!(*frames.lock(), vec![480, 480, 480, 480, 480]);
        let diag = s.diagnostics();
        assert_eq!(diag.buffers_delivered, 5);
        assert_eq!(diag.frames_delivered, 5 * 480);
        assert_eq!(diag.buffers_dropped, 0);

        // Nothing trickles in after stop has returned.
        thread::sleep(Duration::from_millis(10));
        assert_eq!(frames.lock().len(), 5);
        s.destroy();
    }

    #[test]
    fn buffers_keep_capture_order() {
        let script: Vec<Vec<f32>> = (0..8).map(|i| vec![i as f32; 64]).collect();
        let s = initialized(NullBackend::new().with_script(script));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let cb_seen = Arc::clone(&seen);
        s.set_callback(Arc::new(move |buf: &AudioBuffer| {
            cb_seen.lock().push(buf.samples()[0]);
        }));

        s.start().unwrap();
        s.stop().unwrap();

        let seen = seen.lock();
        assert_eq!(*seen, (0..8).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn start_process_unknown_pid_fails_and_stays_initialized() {
        let backend = NullBackend::new().with_applications(vec![
            ApplicationInfo::new(100, "player.exe"),
            ApplicationInfo::new(200, "browser.exe"),
        ]);
        let s = initialized(backend);

        let err = s.start_process(9999).unwrap_err();
        assert_eq!(err, CaptureError::ProcessNotFound(9999));
        assert_eq!(s.state(), SessionState::Initialized);

        // A known pid still works afterwards.
        s.start_process(200).unwrap();
        assert_eq!(s.state(), SessionState::Capturing);
        assert_eq!(s.target(), Some(TargetMode::Process(200)));
        s.stop().unwrap();
    }

    #[test]
    fn only_the_latest_callback_receives_buffers() {
        let s = initialized(NullBackend::new().with_script(vec![vec![0.0; 128]; 4]));

        let first = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&first);
        s.set_callback(Arc::new(move |_: &AudioBuffer| {
            count.fetch_add(1, Ordering::SeqCst);
        }));

        let second = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&second);
        s.set_callback(Arc::new(move |_: &AudioBuffer| {
            count.fetch_add(1, Ordering::SeqCst);
        }));

        s.start().unwrap();
        s.stop().unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn callback_swapped_while_capturing_silences_the_old_one() {
        let s = initialized(NullBackend::new().streaming(64));

        let first = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&first);
        s.set_callback(Arc::new(move |_: &AudioBuffer| {
            count.fetch_add(1, Ordering::SeqCst);
        }));
        s.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while first.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(first.load(Ordering::SeqCst) > 0);

        // Swap mid-stream. set_callback waits out any in-flight invocation,
        // so once it returns the old callback never fires again.
        let second = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&second);
        s.set_callback(Arc::new(move |_: &AudioBuffer| {
            count.fetch_add(1, Ordering::SeqCst);
        }));
        let frozen = first.load(Ordering::SeqCst);

        let deadline = Instant::now() + Duration::from_secs(2);
        while second.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(second.load(Ordering::SeqCst) > 0);
        assert_eq!(first.load(Ordering::SeqCst), frozen);

        s.stop().unwrap();
        assert_eq!(first.load(Ordering::SeqCst), frozen);
    }

    #[test]
    fn debug_output_summarizes_the_session() {
        let s = initialized(NullBackend::new());
        let rendered = format!("{s:?}");
        assert!(rendered.contains("Initialized"));
    }

    #[test]
    fn cleared_callback_discards_buffers() {
        let s = initialized(NullBackend::new().with_script(vec![vec![0.0; 128]; 4]));
        let (cb, frames) = recording_callback();
        s.set_callback(cb);
        s.clear_callback();

        s.start().unwrap();
        s.stop().unwrap();
        assert!(frames.lock().is_empty());
    }

    #[test]
    fn list_applications_snapshots_and_truncates() {
        let apps: Vec<ApplicationInfo> = (1..=6)
            .map(|pid| ApplicationInfo::new(pid, format!("app-{pid}")))
            .collect();
        let s = session(NullBackend::new().with_applications(apps));

        let listed = s.list_applications(4).unwrap();
        assert_eq!(listed.len(), 4);
        assert_eq!(
            listed.iter().map(|a| a.pid).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );

        assert_eq!(s.list_applications(50).unwrap().len(), 6);

        let none = session(NullBackend::new());
        assert!(none.list_applications(50).unwrap().is_empty());
    }

    #[test]
    fn target_loss_stops_the_session_and_surfaces_the_error() {
        let backend = NullBackend::new()
            .with_applications(vec![ApplicationInfo::new(4242, "game.exe")])
            .streaming(64)
            .faulting_after(3, CaptureError::TargetLost(4242));
        let s = initialized(backend);
        let observer = RecordingObserver::new();
        s.set_observer(observer.clone());
        let (cb, _frames) = recording_callback();
        s.set_callback(cb);

        s.start_process(4242).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while s.state() != SessionState::Stopped && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(s.state(), SessionState::Stopped);
        assert!(observer
            .errors
            .lock()
            .contains(&CaptureError::TargetLost(4242)));

        // The fault is also surfaced on the next lifecycle call.
        assert_eq!(s.start().unwrap_err(), CaptureError::TargetLost(4242));
        // And only once.
        s.start().unwrap();
        s.stop().unwrap();
    }

    #[test]
    fn observer_sees_each_transition() {
        let s = session(NullBackend::new());
        let observer = RecordingObserver::new();
        s.set_observer(observer.clone());

        s.initialize().unwrap();
        s.start().unwrap();
        s.stop().unwrap();
        s.destroy();
        s.destroy();

        assert_eq!(
            *observer.states.lock(),
            vec![
                SessionState::Initialized,
                SessionState::Capturing,
                SessionState::Stopped,
                SessionState::Destroyed,
            ]
        );
    }

    #[test]
    fn concurrent_destroy_never_races_an_inflight_callback() {
        for _ in 0..20 {
            let s = Arc::new(
                CaptureSession::create(Box::new(NullBackend::new().streaming(64))).unwrap(),
            );
            s.initialize().unwrap();

            // The callback reads through shared closure state on every call;
            // destroy must wait out the in-flight invocation, so this data
            // is always alive when touched.
            let touched = Arc::new(AtomicUsize::new(0));
            let cb_touched = Arc::clone(&touched);
            s.set_callback(Arc::new(move |buf: &AudioBuffer| {
                cb_touched.fetch_add(buf.frames(), Ordering::SeqCst);
            }));
            s.start().unwrap();

            let destroyer = {
                let s = Arc::clone(&s);
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(2));
                    s.destroy();
                })
            };
            let stopper = {
                let s = Arc::clone(&s);
                thread::spawn(move || {
                    let _ = s.stop();
                })
            };

            destroyer.join().unwrap();
            stopper.join().unwrap();
            assert_eq!(s.state(), SessionState::Destroyed);

            // Delivery has fully ceased.
            let settled = touched.load(Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            assert_eq!(touched.load(Ordering::SeqCst), settled);
        }
    }

    #[test]
    fn sessions_are_independent() {
        let a = initialized(NullBackend::new().with_script(vec![vec![0.0; 64]; 2]));
        let b = initialized(NullBackend::new().with_script(vec![vec![0.0; 64]; 3]));

        let (cb_a, frames_a) = recording_callback();
        let (cb_b, frames_b) = recording_callback();
        a.set_callback(cb_a);
        b.set_callback(cb_b);

        a.start().unwrap();
        b.start().unwrap();
        a.stop().unwrap();
        b.stop().unwrap();

        assert_eq!(frames_a.lock().len(), 2);
        assert_eq!(frames_b.lock().len(), 3);

        a.destroy();
        // b is unaffected by a's destruction.
        b.start().unwrap();
        b.stop().unwrap();
    }
}
