//! USB HID backend for real Open8055 cards (feature `hardware-usb`).
//!
//! Card `n` is the HID device with vendor id [`OPEN8055_VID`] and product
//! id `OPEN8055_PID + n`. Each open card gets two hidapi handles: the
//! reader task blocks on one of them on Tokio's blocking pool while
//! commands go out through the other.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hidapi::{HidApi, HidDevice};
use open8055_core::CardId;
use open8055_core::constants::{HID_MESSAGE_SIZE, OPEN8055_PID, OPEN8055_VID};
use open8055_protocol::HidMessage;
use tracing::{debug, warn};

use crate::{HardwareError, Result, traits::CardDevice};

struct OpenCard {
    reader: Arc<Mutex<HidDevice>>,
    writer: Arc<Mutex<HidDevice>>,
}

/// Device layer talking to cards through hidapi.
pub struct HidBackend {
    api: Mutex<HidApi>,
    open: Mutex<HashMap<CardId, OpenCard>>,
}

impl HidBackend {
    /// Initialize hidapi.
    ///
    /// # Errors
    /// Returns `Communication` if the HID library cannot be initialized.
    pub fn new() -> Result<Self> {
        let api = HidApi::new().map_err(hid_error)?;
        Ok(Self {
            api: Mutex::new(api),
            open: Mutex::new(HashMap::new()),
        })
    }

    fn product_id(card: CardId) -> u16 {
        OPEN8055_PID + u16::from(card.as_u8())
    }

    fn open_cards(&self) -> MutexGuard<'_, HashMap<CardId, OpenCard>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handles(&self, card: CardId) -> Result<(Arc<Mutex<HidDevice>>, Arc<Mutex<HidDevice>>)> {
        self.open_cards()
            .get(&card)
            .map(|c| (Arc::clone(&c.reader), Arc::clone(&c.writer)))
            .ok_or_else(|| HardwareError::not_open(card))
    }
}

impl fmt::Debug for HidBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open: Vec<CardId> = self.open_cards().keys().copied().collect();
        f.debug_struct("HidBackend").field("open", &open).finish()
    }
}

impl CardDevice for HidBackend {
    async fn present(&self, card: CardId) -> bool {
        let mut api = self.api.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = api.refresh_devices() {
            warn!(error = %e, "refreshing HID device list failed");
            return false;
        }
        let pid = Self::product_id(card);
        api.device_list()
            .any(|d| d.vendor_id() == OPEN8055_VID && d.product_id() == pid)
    }

    async fn open(&self, card: CardId) -> Result<()> {
        if self.open_cards().contains_key(&card) {
            return Err(HardwareError::already_open(card));
        }

        let pid = Self::product_id(card);
        let (reader, writer) = {
            let api = self.api.lock().unwrap_or_else(PoisonError::into_inner);
            let reader = api
                .open(OPEN8055_VID, pid)
                .map_err(|_| HardwareError::not_present(card))?;
            let writer = api.open(OPEN8055_VID, pid).map_err(hid_error)?;
            (reader, writer)
        };
        reader.set_blocking_mode(true).map_err(hid_error)?;

        let mut cards = self.open_cards();
        if cards.contains_key(&card) {
            return Err(HardwareError::already_open(card));
        }
        cards.insert(
            card,
            OpenCard {
                reader: Arc::new(Mutex::new(reader)),
                writer: Arc::new(Mutex::new(writer)),
            },
        );
        debug!(%card, pid = format_args!("{pid:#06x}"), "card opened");
        Ok(())
    }

    async fn close(&self, card: CardId) -> Result<()> {
        self.open_cards()
            .remove(&card)
            .map(|_| debug!(%card, "card closed"))
            .ok_or_else(|| HardwareError::not_open(card))
    }

    async fn read(&self, card: CardId) -> Result<HidMessage> {
        let (reader, _) = self.handles(card)?;
        tokio::task::spawn_blocking(move || {
            let device = reader.lock().unwrap_or_else(PoisonError::into_inner);
            let mut buf = [0u8; HID_MESSAGE_SIZE];
            let got = device.read(&mut buf).map_err(hid_error)?;
            if got != HID_MESSAGE_SIZE {
                return Err(HardwareError::ShortRead {
                    expected: HID_MESSAGE_SIZE,
                    got,
                });
            }
            Ok(buf)
        })
        .await
        .map_err(|e| HardwareError::other(format!("reader task failed: {e}")))?
    }

    async fn write(&self, card: CardId, data: &[u8]) -> Result<usize> {
        if data.len() > HID_MESSAGE_SIZE {
            return Err(HardwareError::other(format!(
                "message too long - expected at most {HID_MESSAGE_SIZE}, got {}",
                data.len()
            )));
        }
        let (_, writer) = self.handles(card)?;

        // Report id 0 followed by the zero padded message.
        let mut buf = [0u8; HID_MESSAGE_SIZE + 1];
        buf[1..=data.len()].copy_from_slice(data);

        tokio::task::spawn_blocking(move || {
            let device = writer.lock().unwrap_or_else(PoisonError::into_inner);
            let got = device.write(&buf).map_err(hid_error)?;
            if got < buf.len() {
                return Err(HardwareError::ShortWrite {
                    expected: buf.len(),
                    got,
                });
            }
            Ok(HID_MESSAGE_SIZE)
        })
        .await
        .map_err(|e| HardwareError::other(format!("writer task failed: {e}")))?
    }
}

fn hid_error(e: hidapi::HidError) -> HardwareError {
    HardwareError::communication(e.to_string())
}
