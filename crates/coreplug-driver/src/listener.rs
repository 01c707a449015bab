//! Power-state listener: resume override.
//!
//! On `Active` every offline unit is powered up at once, without asking the
//! decision engine. The override runs on the event source's context and
//! does not wait for an in-flight pass; power-up is idempotent, so racing
//! with one is harmless. The next scheduled pass applies normal policy again.

use std::sync::Arc;

use tracing::{debug, info};

use coreplug_core::{PowerEvent, PowerStateCallback};

use crate::driver::Shared;

pub(crate) struct PowerStateListener {
    shared: Arc<Shared>,
}

impl PowerStateListener {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub(crate) fn handle(&self, event: PowerEvent) {
        if !self.shared.is_active() {
            debug!(?event, "power-state event ignored while inactive");
            return;
        }
        match event {
            PowerEvent::Active => self.resume(),
            PowerEvent::Suspend => debug!("suspend: keeping current online set"),
        }
    }

    fn resume(&self) {
        let brought_up = self
            .shared
            .controller()
            .bring_all_up(self.shared.now_ms());
        info!(units = ?brought_up, "resume: all units online");
    }

    pub(crate) fn into_callback(self) -> PowerStateCallback {
        Arc::new(move |event| self.handle(event))
    }
}
