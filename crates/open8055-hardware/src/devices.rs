//! Enum wrapper for card device dispatch.
//!
//! Native `async fn` in traits is not object-safe, so `Box<dyn CardDevice>`
//! is not available. [`AnyCardDevice`] gives the server one concrete device
//! type whose futures are `Send`, while backends stay selectable at runtime
//! and optional at compile time.
//!
//! # Examples
//!
//! ```
//! use open8055_hardware::devices::AnyCardDevice;
//! use open8055_hardware::mock::SimulatedBoard;
//!
//! let (board, _handle) = SimulatedBoard::new();
//! let device = AnyCardDevice::Simulated(board);
//! assert_eq!(device.backend_name(), "simulated");
//! ```

use open8055_core::CardId;
use open8055_protocol::HidMessage;

use crate::Result;
use crate::mock::SimulatedBoard;
use crate::traits::CardDevice;
#[cfg(feature = "hardware-usb")]
use crate::usb::HidBackend;

#[derive(Debug)]
#[non_exhaustive]
pub enum AnyCardDevice {
    /// In-process simulated cards.
    Simulated(SimulatedBoard),
    /// Real cards on the USB bus.
    #[cfg(feature = "hardware-usb")]
    Hid(HidBackend),
}

impl AnyCardDevice {
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Simulated(_) => "simulated",
            #[cfg(feature = "hardware-usb")]
            Self::Hid(_) => "hidapi",
        }
    }
}

impl CardDevice for AnyCardDevice {
    async fn present(&self, card: CardId) -> bool {
        match self {
            Self::Simulated(device) => device.present(card).await,
            #[cfg(feature = "hardware-usb")]
            Self::Hid(device) => device.present(card).await,
        }
    }

    async fn open(&self, card: CardId) -> Result<()> {
        match self {
            Self::Simulated(device) => device.open(card).await,
            #[cfg(feature = "hardware-usb")]
            Self::Hid(device) => device.open(card).await,
        }
    }

    async fn close(&self, card: CardId) -> Result<()> {
        match self {
            Self::Simulated(device) => device.close(card).await,
            #[cfg(feature = "hardware-usb")]
            Self::Hid(device) => device.close(card).await,
        }
    }

    async fn read(&self, card: CardId) -> Result<HidMessage> {
        match self {
            Self::Simulated(device) => device.read(card).await,
            #[cfg(feature = "hardware-usb")]
            Self::Hid(device) => device.read(card).await,
        }
    }

    async fn write(&self, card: CardId, data: &[u8]) -> Result<usize> {
        match self {
            Self::Simulated(device) => device.write(card, data).await,
            #[cfg(feature = "hardware-usb")]
            Self::Hid(device) => device.write(card, data).await,
        }
    }
}
