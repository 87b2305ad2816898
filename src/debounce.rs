//! Turns noisy per-tick card reads into clean presence transitions.
//!
//! A read that differs from the previous one restarts the count. The same id
//! then has to come back on `confirmations` further ticks before it is
//! reported, once, as an [`Activated`](CardState::Activated) or
//! [`Deactivated`](CardState::Deactivated) event.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc::Sender;

use crate::config::ReaderConfig;
use crate::source::CardSource;
use crate::types::{CardEvent, CardState};

/// Debounce state, fed one read per tick
#[derive(Debug, Clone)]
pub struct Debouncer {
    last_seen: String,
    last_confirmed: String,
    run_length: u32,
    confirmations: u32,
}

impl Debouncer {
    pub fn new(confirmations: u32) -> Self {
        Self {
            last_seen: String::new(),
            last_confirmed: String::new(),
            run_length: 0,
            confirmations,
        }
    }

    /// Feed the id read on this tick, empty when no card was read
    pub fn observe(&mut self, id: &str) -> Option<CardEvent> {
        if id != self.last_seen {
            self.last_seen = id.to_owned();
            self.run_length = 0;
            return None;
        }

        if id == self.last_confirmed {
            return None;
        }

        self.run_length += 1;
        if self.run_length < self.confirmations {
            return None;
        }

        self.last_confirmed = id.to_owned();
        self.run_length = 0;
        if id.is_empty() {
            Some(CardEvent::deactivated())
        } else {
            Some(CardEvent::activated(id.to_owned()))
        }
    }

    /// The id last reported through an event, empty if none or removed
    pub fn confirmed(&self) -> &str {
        &self.last_confirmed
    }
}

/// Poll `source` every tick until `stop` fires or the event receiver goes away.
///
/// Each wait races the tick timer against `stop`, a dropped stop sender
/// counts as a stop.
pub(crate) fn poll<S: CardSource>(
    source: &mut S,
    config: &ReaderConfig,
    events: &Sender<CardEvent>,
    stop: &Receiver<()>,
) {
    let mut debouncer = Debouncer::new(config.confirmations);

    loop {
        if stopped(stop, config.poll_interval) {
            debug!("Card poller stopped");
            return;
        }

        let id = match source.read_card_id() {
            Ok(id) => id,
            Err(e) if e.is_transient() => {
                debug!("No card id this tick: {}", e);
                String::new()
            }
            Err(e) => {
                warn!("Error when reading card id: {}", e);
                String::new()
            }
        };

        let Some(event) = debouncer.observe(&id) else {
            continue;
        };

        let activated = event.state() == CardState::Activated;
        debug!("Sending {:?} event for {:?}", event.state(), event.card_id());
        // Blocks while the channel is full
        if events.blocking_send(event).is_err() {
            debug!("Event receiver closed, card poller exiting");
            return;
        }

        // The chip tends to misread right after a card arrives
        if activated && stopped(stop, config.activation_settle) {
            debug!("Card poller stopped");
            return;
        }
    }
}

fn stopped(stop: &Receiver<()>, wait: Duration) -> bool {
    !matches!(stop.recv_timeout(wait), Err(RecvTimeoutError::Timeout))
}
