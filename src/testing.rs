//! Test fixtures shared across modules.

use crate::capture::{Camera, CameraError, CameraHandle, CaptureConfig, Frame, MockCamera};
use crate::config::ServeMode;
use crate::metrics::MetricsRegistry;
use crate::service::SnapshotService;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Condvar, Mutex};

/// Builds a service over a mock camera plus its fault switch.
pub(crate) fn mock_service(mode: ServeMode) -> (SnapshotService, Arc<AtomicBool>) {
    let fault = Arc::new(AtomicBool::new(false));
    let camera = MockCamera::with_fault(Arc::clone(&fault));
    (service_with(Box::new(camera), mode), fault)
}

pub(crate) fn service_with(camera: Box<dyn Camera + Send>, mode: ServeMode) -> SnapshotService {
    let handle = CameraHandle::open(camera, CaptureConfig::with_dimensions(32, 24)).unwrap();
    let metrics = MetricsRegistry::new().unwrap();
    SnapshotService::new(Arc::new(handle), Arc::new(metrics), mode)
}

#[derive(Default)]
struct GateState {
    capturing: bool,
    released: bool,
}

/// Lets a test hold a capture in flight.
#[derive(Clone, Default)]
pub(crate) struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl Gate {
    pub(crate) fn wait_until_capturing(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap();
        while !state.capturing {
            state = cvar.wait(state).unwrap();
        }
    }

    pub(crate) fn release(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().unwrap().released = true;
        cvar.notify_all();
    }

    fn enter(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap();
        state.capturing = true;
        cvar.notify_all();
        while !state.released {
            state = cvar.wait(state).unwrap();
        }
    }
}

/// Mock camera whose first capture blocks until its gate is released.
pub(crate) struct SlowCamera {
    inner: MockCamera,
    gate: Gate,
}

impl SlowCamera {
    pub(crate) fn gated() -> (Self, Gate) {
        let gate = Gate::default();
        let camera = Self {
            inner: MockCamera::new(),
            gate: gate.clone(),
        };
        (camera, gate)
    }
}

impl Camera for SlowCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        self.inner.open(config)
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        self.gate.enter();
        self.inner.capture()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn close(&mut self) {
        self.inner.close()
    }

    fn backend_name(&self) -> &'static str {
        "slow-mock"
    }
}
