//! Device layer for Open8055 USB experiment cards.
//!
//! This crate defines the [`CardDevice`] contract the server consumes
//! (present / open / close / read / write for a numbered card) and two
//! implementations of it:
//!
//! - [`mock::SimulatedBoard`]: in-process cards running a model of the
//!   stock firmware, used by tests and by the server's simulation mode
//! - `usb::HidBackend` (feature `hardware-usb`): real cards through hidapi
//!
//! [`devices::AnyCardDevice`] wraps both behind one concrete type.
//!
//! # Waking a blocked reader
//!
//! `read` has no timeout. A reader that should stop is woken by writing a
//! command the card answers, such as `GETINPUT`:
//!
//! ```no_run
//! use open8055_core::CardId;
//! use open8055_hardware::traits::CardDevice;
//! use open8055_protocol::HidCommand;
//!
//! async fn wake_reader<D: CardDevice>(device: &D, card: CardId) {
//!     let _ = device.write(card, &HidCommand::GetInput.encode()).await;
//! }
//! ```
//!
//! [`CardDevice`]: traits::CardDevice

pub mod devices;
pub mod error;
pub mod mock;
pub mod traits;
#[cfg(feature = "hardware-usb")]
pub mod usb;

pub use devices::AnyCardDevice;
pub use error::{HardwareError, Result};
pub use traits::CardDevice;
