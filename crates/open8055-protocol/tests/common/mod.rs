//! Common test utilities for protocol integration tests.
//!
//! Helpers build HID records with sensible defaults and frame both ends
//! of an in-memory duplex stream with the control codec.

#![allow(dead_code)]

use open8055_core::constants::HID_MESSAGE_SIZE;
use open8055_protocol::{
    Config1Report, ControlCodec, HidMessage, InputReport, OutputReport, hid::mode,
};
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

/// Output record with only the bitmask set.
pub fn output_bits(bits: u8) -> OutputReport {
    OutputReport {
        output_bits: bits,
        ..Default::default()
    }
}

/// Configuration record as a freshly reset card reports it.
pub fn power_on_config() -> Config1Report {
    Config1Report {
        mode_adc: [mode::ADC10; 2],
        mode_input: [mode::INPUT; 5],
        mode_output: [mode::OUTPUT; 8],
        mode_pwm: [mode::PWM; 2],
        debounce_value: [101; 5],
        card_address: 0,
    }
}

pub fn input_with(bits: u8, adc: [u16; 2]) -> InputReport {
    InputReport {
        input_bits: bits,
        input_adc_value: adc,
        ..Default::default()
    }
}

/// A raw message holding only a type byte.
pub fn raw_message(hid_type: u8) -> HidMessage {
    let mut msg = [0u8; HID_MESSAGE_SIZE];
    msg[0] = hid_type;
    msg
}

/// Both ends of a duplex stream framed with the control codec.
pub fn framed_duplex(
    buffer_size: usize,
) -> (
    Framed<DuplexStream, ControlCodec>,
    Framed<DuplexStream, ControlCodec>,
) {
    let (client, server) = tokio::io::duplex(buffer_size);
    (
        Framed::new(client, ControlCodec::client()),
        Framed::new(server, ControlCodec::new()),
    )
}
