use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

use crate::ui::UiSink;

/// Counts in-flight requests and drives the single global loader.
///
/// The loader is shown on the 0 -> 1 transition and hidden on the 1 -> 0
/// transition, so overlapping calls produce exactly one show/hide pair.
pub struct RequestGate {
    in_flight: Mutex<usize>,
    ui: Arc<dyn UiSink>,
}

impl RequestGate {
    pub fn new(ui: Arc<dyn UiSink>) -> Self {
        Self {
            in_flight: Mutex::new(0),
            ui,
        }
    }

    pub fn enter(&self) -> InFlight<'_> {
        let mut count = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
        if *count == 1 {
            self.ui.show_loader();
        }
        InFlight { gate: self }
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn leave(&self) {
        let mut count = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if *count == 0 {
            warn!("request gate released more often than entered");
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.ui.hide_loader();
        }
    }
}

/// Releases its slot on drop, including when the owning future is cancelled.
pub struct InFlight<'a> {
    gate: &'a RequestGate,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.gate.leave();
    }
}
