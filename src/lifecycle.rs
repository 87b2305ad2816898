//! Opening, owning and closing the one active reader.
//!
//! A [`ReaderRegistry`] hands out at most one [`ReaderHandle`] at a time.
//! The handle owns a background poller thread, which in turn is the only
//! owner of the [`CardSource`] and therefore of the bus.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, warn};
use tokio::sync::mpsc;

use crate::config::ReaderConfig;
use crate::debounce;
use crate::source::{CardSource, SimulatedCard};
use crate::types::{CardEvent, CardState, ReaderError};

/// Guards against two readers polling the same chip.
///
/// Share one registry (behind an `Arc`) between everything that may open a
/// reader; independent registries do not see each other.
#[derive(Debug, Default)]
pub struct ReaderRegistry {
    active: Mutex<bool>,
}

impl ReaderRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// True while a handle from this registry is open
    pub fn is_active(&self) -> bool {
        *self.lock()
    }

    /// Claim the registry, connect a source and start polling it.
    ///
    /// `connect` only runs once the claim succeeded, so a second `open`
    /// fails with [`ReaderError::AlreadyActive`] without touching hardware.
    pub fn open<S, F>(
        self: &Arc<Self>,
        config: ReaderConfig,
        connect: F,
    ) -> Result<ReaderHandle, ReaderError>
    where
        S: CardSource + Send + 'static,
        F: FnOnce() -> Result<S, ReaderError>,
    {
        if config.channel_capacity == 0 {
            return Err(ReaderError::InvalidParameter(
                "Event channel capacity must be at least 1".into(),
            ));
        }

        self.claim()?;

        let source = match connect() {
            Ok(source) => source,
            Err(e) => {
                error!("Failed to set up card reader: {}", e);
                self.release();
                return Err(e);
            }
        };

        ReaderHandle::start(self.clone(), config, source).inspect_err(|_| self.release())
    }

    /// Open a reader backed by [`SimulatedCard::default`]
    pub fn open_simulated(self: &Arc<Self>, config: ReaderConfig) -> Result<ReaderHandle, ReaderError> {
        self.open(config, || Ok(SimulatedCard::default()))
    }

    /// Open the MFRC522 wired as described by `hardware`
    #[cfg(feature = "rpi")]
    pub fn open_hardware(
        self: &Arc<Self>,
        hardware: &crate::config::HardwareConfig,
        config: ReaderConfig,
    ) -> Result<ReaderHandle, ReaderError> {
        self.open(config, || {
            let transport = crate::spidev::SpidevTransport::new(hardware)?;
            let mut reader = crate::mfrc522::Mfrc522::new(transport);
            reader.init()?;
            Ok(reader)
        })
    }

    fn claim(&self) -> Result<(), ReaderError> {
        let mut active = self.lock();
        if *active {
            return Err(ReaderError::AlreadyActive);
        }
        *active = true;
        Ok(())
    }

    fn release(&self) {
        *self.lock() = false;
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An open reader. Events arrive in order on [`events`](Self::events) until
/// the handle is closed.
pub struct ReaderHandle {
    events: mpsc::Receiver<CardEvent>,
    stop: Option<std_mpsc::Sender<()>>,
    poller: Option<JoinHandle<Result<(), ReaderError>>>,
    registry: Arc<ReaderRegistry>,
}

impl ReaderHandle {
    fn start<S>(
        registry: Arc<ReaderRegistry>,
        config: ReaderConfig,
        mut source: S,
    ) -> Result<Self, ReaderError>
    where
        S: CardSource + Send + 'static,
    {
        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
        let (stop_tx, stop_rx) = std_mpsc::channel();

        let poller = std::thread::Builder::new()
            .name("card-poller".into())
            .spawn(move || {
                debounce::poll(&mut source, &config, &event_tx, &stop_rx);
                // event_tx drops here, which closes the channel
                source.shutdown()
            })
            .map_err(|e| ReaderError::Transport(format!("Failed to spawn card poller: {}", e)))?;

        debug!("Card reader opened");
        Ok(Self {
            events: event_rx,
            stop: Some(stop_tx),
            poller: Some(poller),
            registry,
        })
    }

    /// The event stream. Yields `None` once the reader has been closed and
    /// every buffered event was received.
    pub fn events(&mut self) -> &mut mpsc::Receiver<CardEvent> {
        &mut self.events
    }

    /// Wait for the next card to be put on the reader, ignoring removals.
    ///
    /// Returns `None` if no card shows up within `timeout` or the event
    /// stream ended.
    pub async fn wait_for_card(&mut self, timeout: Duration) -> Option<String> {
        let next_activation = async {
            while let Some(event) = self.events.recv().await {
                if event.state() == CardState::Activated {
                    debug!("Read card {}", event.card_id());
                    return Some(event.card_id().to_owned());
                }
            }
            None
        };
        tokio::time::timeout(timeout, next_activation)
            .await
            .ok()
            .flatten()
    }

    /// Stop polling, release the bus and free the registry for a new `open`.
    pub fn close(mut self) -> Result<(), ReaderError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), ReaderError> {
        let Some(poller) = self.poller.take() else {
            return Ok(());
        };

        if let Some(stop) = self.stop.take() {
            // Err only means the poller already exited
            let _ = stop.send(());
        }
        // Wakes a poller blocked on a full channel
        self.events.close();

        let result = match poller.join() {
            Ok(result) => result,
            Err(_) => Err(ReaderError::Transport("Card poller panicked".into())),
        };
        self.registry.release();
        debug!("Card reader closed");
        result
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Error while closing card reader: {}", e);
        }
    }
}
