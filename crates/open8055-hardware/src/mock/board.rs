//! Simulated Open8055 cards for testing and development.
//!
//! This module provides an in-process device layer that behaves like a set
//! of attached Open8055 cards running the stock firmware. Tests and the
//! `--simulate` server mode drive it through a [`SimulatedBoardHandle`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use open8055_core::CardId;
use open8055_core::constants::{HID_MESSAGE_SIZE, MAX_CARDS};
use open8055_protocol::{
    Config1Report, HidCommand, HidMessage, HidReport, InputReport, OutputReport,
};
use tokio::sync::Notify;
use tracing::{debug, trace};

use super::firmware::Firmware;
use crate::{HardwareError, Result, traits::CardDevice};

#[derive(Debug, Default)]
struct SimulatedCard {
    present: bool,
    open: bool,
    firmware: Firmware,
    pending: VecDeque<HidMessage>,
    read_error: Option<String>,
    write_error: Option<String>,
    written: Vec<HidCommand>,
}

impl SimulatedCard {
    fn queue(&mut self, report: HidReport) {
        if self.open {
            self.pending.push_back(report.encode());
        }
    }
}

#[derive(Debug)]
struct Shared {
    cards: Mutex<Vec<SimulatedCard>>,
    /// One wakeup per card slot for a reader blocked in `read`.
    wakeups: Vec<Notify>,
}

impl Shared {
    fn new() -> Self {
        Self {
            cards: Mutex::new((0..MAX_CARDS).map(|_| SimulatedCard::default()).collect()),
            wakeups: (0..MAX_CARDS).map(|_| Notify::new()).collect(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SimulatedCard>> {
        self.cards.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake(&self, card: CardId) {
        self.wakeups[card.index()].notify_one();
    }

    /// Run `f` on one card and wake its reader afterwards.
    fn update<T>(&self, card: CardId, f: impl FnOnce(&mut SimulatedCard) -> T) -> T {
        let result = f(&mut self.lock()[card.index()]);
        self.wake(card);
        result
    }
}

/// Simulated device layer serving all card slots.
///
/// Cloning yields another view of the same cards.
///
/// # Examples
///
/// ```
/// use open8055_core::CardId;
/// use open8055_hardware::mock::SimulatedBoard;
/// use open8055_hardware::traits::CardDevice;
/// use open8055_protocol::{HidCommand, HidReport, HidType};
///
/// #[tokio::main]
/// async fn main() -> open8055_hardware::Result<()> {
///     let card = CardId::new(0).unwrap();
///     let (board, _handle) = SimulatedBoard::with_cards(&[card]);
///
///     board.open(card).await?;
///     board.write(card, &HidCommand::GetInput.encode()).await?;
///
///     let report = HidReport::decode(&board.read(card).await?).unwrap();
///     assert_eq!(report.hid_type(), HidType::Input);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedBoard {
    shared: Arc<Shared>,
}

impl SimulatedBoard {
    /// Create a board with no cards attached.
    pub fn new() -> (Self, SimulatedBoardHandle) {
        let shared = Arc::new(Shared::new());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            SimulatedBoardHandle { shared },
        )
    }

    /// Create a board with the given cards attached.
    pub fn with_cards(cards: &[CardId]) -> (Self, SimulatedBoardHandle) {
        let (board, handle) = Self::new();
        for &card in cards {
            handle.plug(card);
        }
        (board, handle)
    }
}

impl CardDevice for SimulatedBoard {
    async fn present(&self, card: CardId) -> bool {
        self.shared.lock()[card.index()].present
    }

    async fn open(&self, card: CardId) -> Result<()> {
        let mut cards = self.shared.lock();
        let slot = &mut cards[card.index()];
        if !slot.present {
            return Err(HardwareError::not_present(card));
        }
        if slot.open {
            return Err(HardwareError::already_open(card));
        }
        slot.open = true;
        slot.pending.clear();
        debug!(%card, "simulated card opened");
        Ok(())
    }

    async fn close(&self, card: CardId) -> Result<()> {
        self.shared.update(card, |slot| {
            if !slot.open {
                return Err(HardwareError::not_open(card));
            }
            slot.open = false;
            slot.pending.clear();
            debug!(%card, "simulated card closed");
            Ok(())
        })
    }

    async fn read(&self, card: CardId) -> Result<HidMessage> {
        loop {
            {
                let mut cards = self.shared.lock();
                let slot = &mut cards[card.index()];
                if !slot.open {
                    return Err(HardwareError::not_open(card));
                }
                if let Some(message) = slot.read_error.take() {
                    return Err(HardwareError::communication(message));
                }
                if let Some(report) = slot.pending.pop_front() {
                    trace!(%card, hid_type = report[0], "simulated report");
                    return Ok(report);
                }
            }
            self.shared.wakeups[card.index()].notified().await;
        }
    }

    async fn write(&self, card: CardId, data: &[u8]) -> Result<usize> {
        if data.len() > HID_MESSAGE_SIZE {
            return Err(HardwareError::other(format!(
                "message too long - expected at most {HID_MESSAGE_SIZE}, got {}",
                data.len()
            )));
        }
        self.shared.update(card, |slot| {
            if !slot.open {
                return Err(HardwareError::not_open(card));
            }
            if let Some(message) = slot.write_error.take() {
                return Err(HardwareError::communication(message));
            }
            match HidCommand::decode(data) {
                Ok(command) => {
                    trace!(%card, hid_type = %command.hid_type(), "simulated command");
                    for report in slot.firmware.apply(&command) {
                        slot.queue(report);
                    }
                    slot.written.push(command);
                }
                // The firmware ignores unknown message types.
                Err(e) => debug!(%card, error = %e, "simulated card ignored message"),
            }
            Ok(HID_MESSAGE_SIZE)
        })
    }
}

/// Handle for controlling simulated cards.
///
/// This handle lets tests attach and detach cards, change their inputs and
/// inject faults. It can be cloned and shared across tasks.
///
/// # Examples
///
/// ```
/// use open8055_core::CardId;
/// use open8055_hardware::mock::SimulatedBoard;
/// use open8055_hardware::traits::CardDevice;
///
/// #[tokio::main]
/// async fn main() {
///     let card = CardId::new(2).unwrap();
///     let (board, handle) = SimulatedBoard::new();
///     assert!(!board.present(card).await);
///
///     handle.plug(card);
///     assert!(board.present(card).await);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedBoardHandle {
    shared: Arc<Shared>,
}

impl SimulatedBoardHandle {
    /// Attach a card with power-on state.
    pub fn plug(&self, card: CardId) {
        self.shared.update(card, |slot| {
            *slot = SimulatedCard {
                present: true,
                ..Default::default()
            };
        });
    }

    /// Detach a card. A reader blocked on it fails.
    pub fn unplug(&self, card: CardId) {
        self.shared.update(card, |slot| {
            slot.present = false;
            if slot.open {
                slot.read_error = Some(format!("card{card} disconnected"));
            }
        });
    }

    /// Change the digital inputs; the card reports the new state.
    pub fn set_input_bits(&self, card: CardId, bits: u8) {
        self.shared.update(card, |slot| {
            slot.firmware.input.input_bits = bits;
            let input = slot.firmware.input;
            slot.queue(HidReport::Input(input));
        });
    }

    /// Change the analog inputs; the card reports the new state.
    pub fn set_adc(&self, card: CardId, adc: [u16; 2]) {
        self.shared.update(card, |slot| {
            slot.firmware.input.input_adc_value = adc;
            let input = slot.firmware.input;
            slot.queue(HidReport::Input(input));
        });
    }

    /// Count one pulse on counter `index` (0..5).
    pub fn pulse_counter(&self, card: CardId, index: usize) {
        self.shared.update(card, |slot| {
            if let Some(counter) = slot.firmware.input.input_counter.get_mut(index) {
                *counter = counter.wrapping_add(1);
            }
            let input = slot.firmware.input;
            slot.queue(HidReport::Input(input));
        });
    }

    /// Queue a raw message as if the card had sent it.
    pub fn inject_report(&self, card: CardId, message: HidMessage) {
        self.shared.update(card, |slot| slot.pending.push_back(message));
    }

    /// Make the next read on this card fail.
    pub fn fail_next_read(&self, card: CardId, message: impl Into<String>) {
        let message = message.into();
        self.shared.update(card, |slot| slot.read_error = Some(message));
    }

    /// Make the next write to this card fail.
    pub fn fail_next_write(&self, card: CardId, message: impl Into<String>) {
        let message = message.into();
        self.shared.update(card, |slot| slot.write_error = Some(message));
    }

    #[must_use]
    pub fn is_open(&self, card: CardId) -> bool {
        self.shared.lock()[card.index()].open
    }

    /// Every command written to this card since it was plugged in.
    #[must_use]
    pub fn written(&self, card: CardId) -> Vec<HidCommand> {
        self.shared.lock()[card.index()].written.clone()
    }

    #[must_use]
    pub fn output(&self, card: CardId) -> OutputReport {
        self.shared.lock()[card.index()].firmware.output
    }

    #[must_use]
    pub fn config(&self, card: CardId) -> Config1Report {
        self.shared.lock()[card.index()].firmware.config
    }

    #[must_use]
    pub fn input(&self, card: CardId) -> InputReport {
        self.shared.lock()[card.index()].firmware.input
    }
}
