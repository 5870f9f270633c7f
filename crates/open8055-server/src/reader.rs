//! Card reader task.
//!
//! One reader runs per open card. It blocks on the device read, decodes
//! each report and hands it to the owning session through a channel. The
//! session is the only writer of its socket.
//!
//! Right after `OPEN` the card may still deliver input reports from before
//! the client had a consistent view of it. Until one `SETCONFIG1` and one
//! `OUTPUT` report have been seen, every other report is dropped undecoded,
//! including ones of an unknown type.
//!
//! A blocked read has no timeout. To stop a reader, [`ReaderHandle::stop`]
//! marks it `STOPPING`, then the session writes `GETINPUT` so the card
//! answers and the read returns. That answer is dropped.

use std::sync::Arc;
use std::time::Duration;

use open8055_core::constants::READER_JOIN_TIMEOUT_MS;
use open8055_core::{CardId, RunState};
use open8055_hardware::{AnyCardDevice, CardDevice};
use open8055_protocol::{HidReport, HidType};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::state::StateCell;

/// Capacity of the reader to session channel.
pub const EVENT_QUEUE: usize = 64;

/// What a reader hands to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    Report(HidReport),
    /// The reader failed and is exiting. Sent to the client as `ERROR`.
    Failed(String),
}

/// Drops input reports until the card has shown its configuration and
/// output state once.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StartupFilter {
    seen_config: bool,
    seen_output: bool,
}

impl StartupFilter {
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.seen_config && self.seen_output
    }

    /// Whether a report whose first byte is `raw_type` is worth decoding.
    /// Before sync only the configuration and output reports are.
    #[must_use]
    pub fn wants(&self, raw_type: u8) -> bool {
        self.is_synced()
            || raw_type == HidType::SetConfig1.to_u8()
            || raw_type == HidType::Output.to_u8()
    }

    /// Record `report` and return whether it may be forwarded.
    pub fn admit(&mut self, report: &HidReport) -> bool {
        match report.hid_type() {
            HidType::SetConfig1 => self.seen_config = true,
            HidType::Output => self.seen_output = true,
            _ => return self.is_synced(),
        }
        true
    }
}

/// Session side of a running reader.
#[derive(Debug)]
pub struct ReaderHandle {
    card: CardId,
    state: StateCell,
    task: JoinHandle<()>,
}

impl ReaderHandle {
    /// Start reading `card`, which must already be open.
    pub fn spawn(
        device: Arc<AnyCardDevice>,
        card: CardId,
        events: mpsc::Sender<ReaderEvent>,
    ) -> Self {
        let state = StateCell::new();
        let task = tokio::spawn(run(device, card, state.clone(), events));
        Self { card, state, task }
    }

    pub fn card(&self) -> CardId {
        self.card
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    /// Ask the reader to stop after its current read.
    pub fn stop(&self) {
        self.state.advance(RunState::Stopping);
    }

    /// Wait for the reader to exit. A reader that does not finish in time
    /// is aborted.
    pub async fn join(mut self) {
        let limit = Duration::from_millis(READER_JOIN_TIMEOUT_MS);
        match tokio::time::timeout(limit, &mut self.task).await {
            Ok(Ok(())) => trace!(card = %self.card, "reader joined"),
            Ok(Err(e)) => warn!(card = %self.card, error = %e, "reader task failed"),
            Err(_) => {
                warn!(card = %self.card, "reader did not stop in time, aborting");
                self.task.abort();
            }
        }
        self.state.advance(RunState::Stopped);
    }
}

async fn run(
    device: Arc<AnyCardDevice>,
    card: CardId,
    state: StateCell,
    events: mpsc::Sender<ReaderEvent>,
) {
    let mut filter = StartupFilter::default();
    debug!(%card, "reader started");

    while state.is_running() {
        let result = device.read(card).await;
        if !state.is_running() {
            trace!(%card, "report after stop request dropped");
            break;
        }

        let event = match result {
            Ok(msg) if !filter.wants(msg[0]) => {
                trace!(%card, hid_type = msg[0], "report dropped before sync");
                continue;
            }
            Ok(msg) => match HidReport::decode(&msg) {
                Ok(report) => {
                    if !filter.admit(&report) {
                        trace!(%card, hid_type = %report.hid_type(), "report dropped before sync");
                        continue;
                    }
                    ReaderEvent::Report(report)
                }
                Err(e) => ReaderEvent::Failed(e.to_string()),
            },
            Err(e) => ReaderEvent::Failed(e.to_string()),
        };

        let failed = matches!(event, ReaderEvent::Failed(_));
        if let ReaderEvent::Failed(message) = &event {
            warn!(%card, error = %message, "card read failed");
        }
        if events.send(event).await.is_err() || failed {
            break;
        }
    }

    state.advance(RunState::Stopped);
    debug!(%card, "reader stopped");
}
