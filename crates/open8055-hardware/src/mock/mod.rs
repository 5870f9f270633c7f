//! Simulated device implementations for testing and development.
//!
//! This module provides simulated cards that can be controlled
//! programmatically without requiring physical hardware.

pub mod board;
pub mod firmware;

pub use board::{SimulatedBoard, SimulatedBoardHandle};
pub use firmware::Firmware;
