//! Shared fakes for the integration tests
//!
//! - [`FakeProvider`] / [`FakeCamera`]: a camera that counts every call and
//!   keeps the frame sinks it was given, so tests can push frames
//! - [`ManualAuthorization`]: a permission dialog the test answers by hand

#![allow(dead_code)]

use qrscan::models::{AuthorizationState, MetadataObject, ScannerSettings};
use qrscan::services::{
    CameraDevice, DeviceError, DeviceProvider, FrameSink, OutputSpec, PermissionGate, Point, Size,
};
use qrscan::{Metrics, ScannerHandle, ScannerLifecycle, StateChange, spawn_scanner};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep, timeout};

pub const WAIT: Duration = Duration::from_secs(2);

/// Call counts shared by a provider and every camera it hands out
#[derive(Default)]
pub struct CameraLog {
    pub acquired: AtomicUsize,
    pub locks: AtomicUsize,
    pub unlocks: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub releases: AtomicUsize,
    pub outputs: Mutex<Vec<OutputSpec>>,
    pub focus_points: Mutex<Vec<Point>>,
    sinks: Mutex<Vec<FrameSink>>,
}

impl CameraLog {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Deliver a frame through the most recently registered sink, the way a
    /// capture thread would. Returns `false` if that sink is detached.
    pub fn push_frame(&self, objects: Vec<MetadataObject>) -> bool {
        let sink = self.sinks.lock().unwrap().last().cloned();
        sink.is_some_and(|sink| sink.deliver(objects))
    }

    /// Deliver through a specific activation's sink
    pub fn push_frame_to(&self, index: usize, objects: Vec<MetadataObject>) -> bool {
        let sink = self.sinks.lock().unwrap().get(index).cloned();
        sink.is_some_and(|sink| sink.deliver(objects))
    }

    pub fn last_output(&self) -> Option<OutputSpec> {
        self.outputs.lock().unwrap().last().cloned()
    }
}

pub struct FakeProvider {
    pub log: Arc<CameraLog>,
    pub available: bool,
    pub lock_held: bool,
    pub reject_output: bool,
    pub frame: Size,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            log: Arc::new(CameraLog::default()),
            available: true,
            lock_held: false,
            reject_output: false,
            frame: Size::new(1080.0, 1920.0),
        }
    }
}

impl DeviceProvider for FakeProvider {
    fn acquire(&self, _selector: qrscan::models::DeviceSelector) -> Option<Box<dyn CameraDevice>> {
        if !self.available {
            return None;
        }
        self.log.acquired.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(FakeCamera {
            log: Arc::clone(&self.log),
            lock_held: self.lock_held,
            reject_output: self.reject_output,
            frame: self.frame,
        }))
    }
}

pub struct FakeCamera {
    log: Arc<CameraLog>,
    lock_held: bool,
    reject_output: bool,
    frame: Size,
}

impl CameraDevice for FakeCamera {
    fn label(&self) -> String {
        "fake camera".to_string()
    }

    fn frame_dimensions(&self) -> Size {
        self.frame
    }

    fn lock_for_configuration(&mut self) -> Result<(), DeviceError> {
        if self.lock_held {
            return Err(DeviceError::LockHeld);
        }
        self.log.locks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unlock_for_configuration(&mut self) {
        self.log.unlocks.fetch_add(1, Ordering::SeqCst);
    }

    fn set_focus_point_of_interest(&mut self, point: Point) {
        self.log.focus_points.lock().unwrap().push(point);
    }

    fn add_input(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn add_output(&mut self, output: &OutputSpec, sink: FrameSink) -> Result<(), DeviceError> {
        if self.reject_output {
            return Err(DeviceError::OutputRejected("no metadata output".into()));
        }
        self.log.outputs.lock().unwrap().push(output.clone());
        self.log.sinks.lock().unwrap().push(sink);
        Ok(())
    }

    fn start_running(&mut self) {
        self.log.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_running(&mut self) {
        self.log.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&mut self) {
        self.log.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Authorization whose dialog stays open until the test answers it
pub struct ManualAuthorization {
    status: AuthorizationState,
    pending: Mutex<Vec<oneshot::Sender<bool>>>,
    requests: AtomicUsize,
}

impl ManualAuthorization {
    pub fn new(status: AuthorizationState) -> Arc<Self> {
        Arc::new(Self {
            status,
            pending: Mutex::new(Vec::new()),
            requests: AtomicUsize::new(0),
        })
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Answer every open dialog
    pub fn answer(&self, granted: bool) {
        for tx in self.pending.lock().unwrap().drain(..) {
            let _ = tx.send(granted);
        }
    }
}

impl qrscan::services::AuthorizationProvider for ManualAuthorization {
    fn authorization_status(&self) -> AuthorizationState {
        self.status
    }

    fn request_access(&self) -> oneshot::Receiver<bool> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push(tx);
        rx
    }
}

pub struct Harness {
    pub handle: ScannerHandle,
    pub task: JoinHandle<()>,
    pub events: broadcast::Receiver<StateChange>,
    pub log: Arc<CameraLog>,
    pub metrics: Arc<Metrics>,
    pub gate: Arc<PermissionGate>,
}

pub const PHONE_VIEWPORT: Size = Size {
    width: 375.0,
    height: 812.0,
};

/// Scanner with default settings whose screen already reported a
/// [`PHONE_VIEWPORT`]
pub fn spawn(auth: Arc<ManualAuthorization>, provider: FakeProvider) -> Harness {
    let h = spawn_with(auth, provider, ScannerSettings::default());
    h.handle.viewport_size_changed(PHONE_VIEWPORT.width, PHONE_VIEWPORT.height);
    h
}

/// Scanner that has not been told its viewport yet
pub fn spawn_with(
    auth: Arc<ManualAuthorization>,
    provider: FakeProvider,
    settings: ScannerSettings,
) -> Harness {
    let log = Arc::clone(&provider.log);
    let metrics = Arc::new(Metrics::new());
    let gate = Arc::new(PermissionGate::new(auth));
    let (lifecycle, channel) = ScannerLifecycle::new(
        Arc::clone(&gate),
        Arc::new(provider),
        settings,
        Arc::clone(&metrics),
    );
    let (handle, task) = spawn_scanner(lifecycle, channel);
    let events = handle.subscribe();
    Harness {
        handle,
        task,
        events,
        log,
        metrics,
        gate,
    }
}

/// Wait for the first event matching `pred`, skipping others
pub async fn next_event<F>(events: &mut broadcast::Receiver<StateChange>, pred: F) -> StateChange
where
    F: Fn(&StateChange) -> bool,
{
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("Event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("Timeout waiting for event")
}

/// Poll `cond` until it holds
pub async fn wait_until<F>(cond: F)
where
    F: Fn() -> bool,
{
    timeout(WAIT, async {
        while !cond() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Timeout waiting for condition");
}

/// Everything already queued on `events`
pub fn drain(events: &mut broadcast::Receiver<StateChange>) -> Vec<StateChange> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

pub fn is_running(event: &StateChange) -> bool {
    matches!(
        event,
        StateChange::SessionStateChanged {
            to: qrscan::SessionState::Running,
            ..
        }
    )
}
