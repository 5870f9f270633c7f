//! Card device trait definition.
//!
//! One `CardDevice` serves every card slot of the host. Methods take
//! `&self` so a session and its card reader can share one device: the
//! reader blocks in [`CardDevice::read`] while the session keeps writing
//! commands to the same card.
//!
//! The trait uses native `async fn` methods (Rust 1.90 + Edition 2024
//! RPITIT), which makes it not object-safe. Use generics, or the
//! [`AnyCardDevice`](crate::devices::AnyCardDevice) enum where a single
//! concrete type is needed (for instance to spawn tasks, whose futures
//! must be `Send`).

#![allow(async_fn_in_trait)]

use open8055_core::CardId;
use open8055_protocol::HidMessage;

use crate::error::Result;

/// Device layer for Open8055 cards.
///
/// # Contract
///
/// - `open` fails with `AlreadyOpen` if the card is open, `NotPresent` if
///   no such card is attached. At most one holder per card.
/// - `read` blocks until the card sends a report. There is no timeout: to
///   wake a blocked reader, write a command that makes the card answer
///   (`GETINPUT`).
/// - `write` sends one message, zero padded to the HID message size, and
///   returns the number of bytes written.
///
/// # Examples
///
/// ```
/// use open8055_core::CardId;
/// use open8055_hardware::traits::CardDevice;
///
/// async fn present_cards<D: CardDevice>(device: &D) -> Vec<CardId> {
///     let mut cards = Vec::new();
///     for card in CardId::all() {
///         if device.present(card).await {
///             cards.push(card);
///         }
///     }
///     cards
/// }
/// ```
pub trait CardDevice: Send + Sync {
    /// Returns `true` if a card with this number is attached.
    async fn present(&self, card: CardId) -> bool;

    /// Claim the card.
    async fn open(&self, card: CardId) -> Result<()>;

    /// Release the card.
    async fn close(&self, card: CardId) -> Result<()>;

    /// Wait for the next report from the card.
    async fn read(&self, card: CardId) -> Result<HidMessage>;

    /// Send one message to the card.
    async fn write(&self, card: CardId, data: &[u8]) -> Result<usize>;
}
