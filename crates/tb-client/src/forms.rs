use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::error::ApiError;
use crate::ui::{Form, Notice, UiSink};

pub const BUSY_MESSAGE: &str = "Request in progress, please wait...";

/// Per-form re-entrancy guard: a form accepts one submission at a time.
pub struct FormGuards {
    busy: Mutex<HashSet<Form>>,
    ui: Arc<dyn UiSink>,
}

impl FormGuards {
    pub fn new(ui: Arc<dyn UiSink>) -> Self {
        Self {
            busy: Mutex::new(HashSet::new()),
            ui,
        }
    }

    /// Disables `form` until the returned guard drops. A second submit while
    /// busy is ignored with an informational notice.
    pub fn begin(&self, form: Form) -> Result<SubmitGuard<'_>, ApiError> {
        let inserted = self
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(form);
        if !inserted {
            debug!(?form, "ignoring duplicate submit");
            self.ui.notify(Notice::info(BUSY_MESSAGE));
            return Err(ApiError::Busy);
        }
        self.ui.form_busy(form, true);
        Ok(SubmitGuard { guards: self, form })
    }

    pub fn is_busy(&self, form: Form) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&form)
    }
}

pub struct SubmitGuard<'a> {
    guards: &'a FormGuards,
    form: Form,
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.guards
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.form);
        self.guards.ui.form_busy(self.form, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{RecordingUi, UiEvent};

    #[test]
    fn second_submit_is_rejected_until_release() {
        let ui = Arc::new(RecordingUi::default());
        let guards = FormGuards::new(ui.clone());

        let first = guards.begin(Form::Login).unwrap();
        assert!(matches!(guards.begin(Form::Login), Err(ApiError::Busy)));
        assert!(guards.begin(Form::Register).is_ok());
        drop(first);

        assert!(!guards.is_busy(Form::Login));
        assert!(guards.begin(Form::Login).is_ok());
        assert_eq!(ui.count(&UiEvent::FormBusy(Form::Login, true)), 2);
        assert_eq!(ui.notices().len(), 1);
    }
}
