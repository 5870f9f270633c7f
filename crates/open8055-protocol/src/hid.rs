//! Binary HID records exchanged with an Open8055 card.
//!
//! Every message is a fixed [`HID_MESSAGE_SIZE`] byte buffer whose first
//! byte is the message type. Multi-byte fields are big-endian on the wire.
//! Unused trailing bytes are zero.
//!
//! ```text
//! OUTPUT      0x01  type u8 | bits u8 | value u16 x8 | pwm u16 x2 | reset_counter u8
//! GETINPUT    0x02  type u8
//! SETCONFIG1  0x03  type u8 | adc u8 x2 | input u8 x5 | output u8 x8 | pwm u8 x2
//!                   | debounce u16 x5 | card_address u8
//! GETCONFIG   0x04  type u8
//! SAVECONFIG  0x05  type u8
//! SAVEALL     0x06  type u8
//! RESET       0x7F  type u8
//! INPUT       0x81  type u8 | bits u8 | counter u16 x5 | adc u16 x2
//! ```
//!
//! On the text side a record is a flat list of integers, type first, in
//! the field order above. [`HidCommand::from_args`] turns the arguments of
//! a `SEND` line into a command, [`HidReport`] renders a report read from
//! the card as the values of a `RECV` line.
//!
//! # Example
//!
//! ```
//! use open8055_protocol::hid::{HidCommand, HidReport, HidType};
//!
//! let cmd = HidCommand::from_args(&["1", "85"]).unwrap();
//! assert_eq!(cmd.hid_type(), HidType::Output);
//!
//! let msg = cmd.encode();
//! assert_eq!(&msg[..2], &[0x01, 85]);
//!
//! // The card echoes an OUTPUT record with the same layout.
//! let report = HidReport::decode(&msg).unwrap();
//! assert_eq!(report.to_string(), "1 85 0 0 0 0 0 0 0 0 0 0 0");
//! ```

use bytes::{Buf, BufMut};
use open8055_core::constants::HID_MESSAGE_SIZE;
use std::fmt;

use crate::error::{ProtocolError, Result};

/// One raw HID message as read from or written to a card.
pub type HidMessage = [u8; HID_MESSAGE_SIZE];

/// Port mode values used in `SETCONFIG1`.
pub mod mode {
    pub const ADC10: u8 = 10;
    pub const ADC9: u8 = 11;
    pub const ADC8: u8 = 12;

    pub const INPUT: u8 = 20;
    pub const FREQUENCY: u8 = 21;
    pub const EUSART: u8 = 22;

    pub const OUTPUT: u8 = 30;
    pub const SERVO: u8 = 31;
    pub const ISERVO: u8 = 32;
    pub const I2C: u8 = 33;

    pub const PWM: u8 = 40;
}

/// Message type carried in the first byte of every HID message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HidType {
    Output = 0x01,
    GetInput = 0x02,
    SetConfig1 = 0x03,
    GetConfig = 0x04,
    SaveConfig = 0x05,
    SaveAll = 0x06,
    Reset = 0x7F,
    Input = 0x81,
}

impl HidType {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(HidType::Output),
            0x02 => Some(HidType::GetInput),
            0x03 => Some(HidType::SetConfig1),
            0x04 => Some(HidType::GetConfig),
            0x05 => Some(HidType::SaveConfig),
            0x06 => Some(HidType::SaveAll),
            0x7F => Some(HidType::Reset),
            0x81 => Some(HidType::Input),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` for types a client may send to a card.
    #[must_use]
    pub fn is_command(self) -> bool {
        !matches!(self, HidType::Input)
    }

    /// Returns `true` for types a card reports back.
    #[must_use]
    pub fn is_report(self) -> bool {
        matches!(self, HidType::Input | HidType::Output | HidType::SetConfig1)
    }

    /// Widths of the fields following the type byte.
    #[must_use]
    pub fn fields(self) -> &'static [FieldWidth] {
        match self {
            HidType::Output => &OUTPUT_FIELDS,
            HidType::SetConfig1 => &CONFIG1_FIELDS,
            HidType::Input => &INPUT_FIELDS,
            _ => &[],
        }
    }

    /// Number of integers in the text form, type included.
    #[must_use]
    pub fn value_count(self) -> usize {
        1 + self.fields().len()
    }

    /// Number of meaningful bytes on the wire, type included.
    #[must_use]
    pub fn wire_len(self) -> usize {
        1 + self.fields().iter().map(|f| f.size()).sum::<usize>()
    }
}

impl fmt::Display for HidType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            HidType::Output => "OUTPUT",
            HidType::GetInput => "GETINPUT",
            HidType::SetConfig1 => "SETCONFIG1",
            HidType::GetConfig => "GETCONFIG",
            HidType::SaveConfig => "SAVECONFIG",
            HidType::SaveAll => "SAVEALL",
            HidType::Reset => "RESET",
            HidType::Input => "INPUT",
        };
        f.write_str(name)
    }
}

/// Width of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    U8,
    U16,
}

impl FieldWidth {
    #[must_use]
    pub fn max(self) -> u16 {
        match self {
            FieldWidth::U8 => u16::from(u8::MAX),
            FieldWidth::U16 => u16::MAX,
        }
    }

    #[must_use]
    pub fn size(self) -> usize {
        match self {
            FieldWidth::U8 => 1,
            FieldWidth::U16 => 2,
        }
    }
}

use FieldWidth::{U8, U16};

const OUTPUT_FIELDS: [FieldWidth; 12] = [U8, U16, U16, U16, U16, U16, U16, U16, U16, U16, U16, U8];

const CONFIG1_FIELDS: [FieldWidth; 23] = [
    U8, U8, // adc
    U8, U8, U8, U8, U8, // input
    U8, U8, U8, U8, U8, U8, U8, U8, // output
    U8, U8, // pwm
    U16, U16, U16, U16, U16, // debounce
    U8,  // card address
];

const INPUT_FIELDS: [FieldWidth; 8] = [U8, U16, U16, U16, U16, U16, U16, U16];

/// Output pin state, per-port servo/PWM values and counter reset mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputReport {
    pub output_bits: u8,
    pub output_value: [u16; 8],
    pub output_pwm_value: [u16; 2],
    pub reset_counter: u8,
}

impl OutputReport {
    fn put(&self, buf: &mut impl BufMut) {
        buf.put_u8(HidType::Output.to_u8());
        buf.put_u8(self.output_bits);
        for value in self.output_value {
            buf.put_u16(value);
        }
        for value in self.output_pwm_value {
            buf.put_u16(value);
        }
        buf.put_u8(self.reset_counter);
    }

    fn get(buf: &mut impl Buf) -> Self {
        let mut report = OutputReport {
            output_bits: buf.get_u8(),
            ..Default::default()
        };
        for value in &mut report.output_value {
            *value = buf.get_u16();
        }
        for value in &mut report.output_pwm_value {
            *value = buf.get_u16();
        }
        report.reset_counter = buf.get_u8();
        report
    }

    fn from_fields(fields: &[u16]) -> Self {
        let mut report = OutputReport {
            output_bits: low_byte(fields[0]),
            reset_counter: low_byte(fields[11]),
            ..Default::default()
        };
        report.output_value.copy_from_slice(&fields[1..9]);
        report.output_pwm_value.copy_from_slice(&fields[9..11]);
        report
    }

    fn values(&self) -> Vec<u16> {
        let mut values = Vec::with_capacity(HidType::Output.value_count());
        values.push(u16::from(HidType::Output.to_u8()));
        values.push(u16::from(self.output_bits));
        values.extend_from_slice(&self.output_value);
        values.extend_from_slice(&self.output_pwm_value);
        values.push(u16::from(self.reset_counter));
        values
    }
}

/// Port mode configuration, debounce timers and card address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config1Report {
    pub mode_adc: [u8; 2],
    pub mode_input: [u8; 5],
    pub mode_output: [u8; 8],
    pub mode_pwm: [u8; 2],
    pub debounce_value: [u16; 5],
    pub card_address: u8,
}

impl Config1Report {
    fn put(&self, buf: &mut impl BufMut) {
        buf.put_u8(HidType::SetConfig1.to_u8());
        buf.put_slice(&self.mode_adc);
        buf.put_slice(&self.mode_input);
        buf.put_slice(&self.mode_output);
        buf.put_slice(&self.mode_pwm);
        for value in self.debounce_value {
            buf.put_u16(value);
        }
        buf.put_u8(self.card_address);
    }

    fn get(buf: &mut impl Buf) -> Self {
        let mut report = Config1Report::default();
        buf.copy_to_slice(&mut report.mode_adc);
        buf.copy_to_slice(&mut report.mode_input);
        buf.copy_to_slice(&mut report.mode_output);
        buf.copy_to_slice(&mut report.mode_pwm);
        for value in &mut report.debounce_value {
            *value = buf.get_u16();
        }
        report.card_address = buf.get_u8();
        report
    }

    fn from_fields(fields: &[u16]) -> Self {
        let mut report = Config1Report::default();
        let bytes: Vec<u8> = fields[..17].iter().copied().map(low_byte).collect();
        report.mode_adc.copy_from_slice(&bytes[0..2]);
        report.mode_input.copy_from_slice(&bytes[2..7]);
        report.mode_output.copy_from_slice(&bytes[7..15]);
        report.mode_pwm.copy_from_slice(&bytes[15..17]);
        report.debounce_value.copy_from_slice(&fields[17..22]);
        report.card_address = low_byte(fields[22]);
        report
    }

    fn values(&self) -> Vec<u16> {
        let mut values = Vec::with_capacity(HidType::SetConfig1.value_count());
        values.push(u16::from(HidType::SetConfig1.to_u8()));
        values.extend(
            self.mode_adc
                .iter()
                .chain(&self.mode_input)
                .chain(&self.mode_output)
                .chain(&self.mode_pwm)
                .map(|&b| u16::from(b)),
        );
        values.extend_from_slice(&self.debounce_value);
        values.push(u16::from(self.card_address));
        values
    }
}

/// Live input pin state, counters and ADC readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputReport {
    pub input_bits: u8,
    pub input_counter: [u16; 5],
    pub input_adc_value: [u16; 2],
}

impl InputReport {
    fn put(&self, buf: &mut impl BufMut) {
        buf.put_u8(HidType::Input.to_u8());
        buf.put_u8(self.input_bits);
        for value in self.input_counter {
            buf.put_u16(value);
        }
        for value in self.input_adc_value {
            buf.put_u16(value);
        }
    }

    fn get(buf: &mut impl Buf) -> Self {
        let mut report = InputReport {
            input_bits: buf.get_u8(),
            ..Default::default()
        };
        for value in &mut report.input_counter {
            *value = buf.get_u16();
        }
        for value in &mut report.input_adc_value {
            *value = buf.get_u16();
        }
        report
    }

    fn from_fields(fields: &[u16]) -> Self {
        let mut report = InputReport {
            input_bits: low_byte(fields[0]),
            ..Default::default()
        };
        report.input_counter.copy_from_slice(&fields[1..6]);
        report.input_adc_value.copy_from_slice(&fields[6..8]);
        report
    }

    fn values(&self) -> Vec<u16> {
        let mut values = Vec::with_capacity(HidType::Input.value_count());
        values.push(u16::from(HidType::Input.to_u8()));
        values.push(u16::from(self.input_bits));
        values.extend_from_slice(&self.input_counter);
        values.extend_from_slice(&self.input_adc_value);
        values
    }
}

/// A command a client sends to a card with `SEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidCommand {
    Output(OutputReport),
    GetInput,
    SetConfig1(Config1Report),
    GetConfig,
    SaveConfig,
    SaveAll,
    Reset,
}

impl HidCommand {
    #[must_use]
    pub fn hid_type(&self) -> HidType {
        match self {
            HidCommand::Output(_) => HidType::Output,
            HidCommand::GetInput => HidType::GetInput,
            HidCommand::SetConfig1(_) => HidType::SetConfig1,
            HidCommand::GetConfig => HidType::GetConfig,
            HidCommand::SaveConfig => HidType::SaveConfig,
            HidCommand::SaveAll => HidType::SaveAll,
            HidCommand::Reset => HidType::Reset,
        }
    }

    /// Pack into a full HID message.
    #[must_use]
    pub fn encode(&self) -> HidMessage {
        let mut msg = [0u8; HID_MESSAGE_SIZE];
        let mut buf = &mut msg[..];
        match self {
            HidCommand::Output(report) => report.put(&mut buf),
            HidCommand::SetConfig1(report) => report.put(&mut buf),
            other => buf.put_u8(other.hid_type().to_u8()),
        }
        msg
    }

    /// Values in text order, type first.
    #[must_use]
    pub fn to_values(&self) -> Vec<u16> {
        match self {
            HidCommand::Output(report) => report.values(),
            HidCommand::SetConfig1(report) => report.values(),
            other => vec![u16::from(other.hid_type().to_u8())],
        }
    }

    /// Build a command from the arguments of a `SEND` line, type first.
    ///
    /// Missing trailing values are zero. Surplus trailing values are
    /// accepted only if they are zero.
    ///
    /// # Errors
    /// - `InvalidNumber` if a token is not a non-negative integer
    /// - `UnknownCommandType` if the type is not a command type
    /// - `ValueOutOfRange` if a value does not fit its field
    /// - `TooManyValues` if a surplus value is nonzero
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let Some((type_arg, value_args)) = args.split_first() else {
            return Err(ProtocolError::Usage("SEND type [values...]"));
        };
        let raw_type = parse_number(type_arg.as_ref())?;
        let values = value_args
            .iter()
            .map(|arg| parse_number(arg.as_ref()))
            .collect::<Result<Vec<u32>>>()?;
        Self::from_values(raw_type, &values)
    }

    /// Build a command from its type and the values following the type.
    ///
    /// # Errors
    /// See [`HidCommand::from_args`].
    pub fn from_values(raw_type: u32, values: &[u32]) -> Result<Self> {
        let hid_type = u8::try_from(raw_type)
            .ok()
            .and_then(HidType::from_u8)
            .filter(|t| t.is_command())
            .ok_or(ProtocolError::UnknownCommandType(raw_type))?;
        let fields = fit_fields(hid_type, values)?;

        Ok(match hid_type {
            HidType::Output => HidCommand::Output(OutputReport::from_fields(&fields)),
            HidType::SetConfig1 => HidCommand::SetConfig1(Config1Report::from_fields(&fields)),
            HidType::GetInput => HidCommand::GetInput,
            HidType::GetConfig => HidCommand::GetConfig,
            HidType::SaveConfig => HidCommand::SaveConfig,
            HidType::SaveAll => HidCommand::SaveAll,
            HidType::Reset => HidCommand::Reset,
            HidType::Input => return Err(ProtocolError::UnknownCommandType(raw_type)),
        })
    }

    /// Interpret a message written to a card.
    ///
    /// # Errors
    /// Returns `ShortReport` if `data` is shorter than the record, or
    /// `UnknownCommandType` for a type byte that is not a command.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let raw = peek_type(data)?;
        let hid_type = HidType::from_u8(raw)
            .filter(|t| t.is_command())
            .ok_or(ProtocolError::UnknownCommandType(u32::from(raw)))?;
        check_len(hid_type, data)?;

        let mut buf = &data[1..];
        Ok(match hid_type {
            HidType::Output => HidCommand::Output(OutputReport::get(&mut buf)),
            HidType::SetConfig1 => HidCommand::SetConfig1(Config1Report::get(&mut buf)),
            HidType::GetInput => HidCommand::GetInput,
            HidType::GetConfig => HidCommand::GetConfig,
            HidType::SaveConfig => HidCommand::SaveConfig,
            HidType::SaveAll => HidCommand::SaveAll,
            HidType::Reset => HidCommand::Reset,
            HidType::Input => return Err(ProtocolError::UnknownCommandType(u32::from(raw))),
        })
    }
}

/// A report a card sends back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidReport {
    Input(InputReport),
    Output(OutputReport),
    Config1(Config1Report),
}

impl HidReport {
    #[must_use]
    pub fn hid_type(&self) -> HidType {
        match self {
            HidReport::Input(_) => HidType::Input,
            HidReport::Output(_) => HidType::Output,
            HidReport::Config1(_) => HidType::SetConfig1,
        }
    }

    /// Unpack a message read from a card.
    ///
    /// # Errors
    /// Returns `UnknownReportType` for a type byte that is not a report, or
    /// `ShortReport` if `data` is shorter than the record.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let raw_type = peek_type(data)?;
        let hid_type = HidType::from_u8(raw_type)
            .filter(|t| t.is_report())
            .ok_or(ProtocolError::UnknownReportType(raw_type))?;
        check_len(hid_type, data)?;

        let mut buf = &data[1..];
        Ok(match hid_type {
            HidType::Output => HidReport::Output(OutputReport::get(&mut buf)),
            HidType::SetConfig1 => HidReport::Config1(Config1Report::get(&mut buf)),
            _ => HidReport::Input(InputReport::get(&mut buf)),
        })
    }

    #[must_use]
    pub fn encode(&self) -> HidMessage {
        let mut msg = [0u8; HID_MESSAGE_SIZE];
        let mut buf = &mut msg[..];
        match self {
            HidReport::Input(report) => report.put(&mut buf),
            HidReport::Output(report) => report.put(&mut buf),
            HidReport::Config1(report) => report.put(&mut buf),
        }
        msg
    }

    /// Values in text order, type first.
    #[must_use]
    pub fn to_values(&self) -> Vec<u16> {
        match self {
            HidReport::Input(report) => report.values(),
            HidReport::Output(report) => report.values(),
            HidReport::Config1(report) => report.values(),
        }
    }

    /// Rebuild a report from the values of a `RECV` line, type first.
    ///
    /// Unlike commands, the value count must match the record exactly.
    ///
    /// # Errors
    /// Returns `MalformedReply` if the count is wrong, `UnknownReportType`
    /// or `ValueOutOfRange` for bad values.
    pub fn from_values(values: &[u32]) -> Result<Self> {
        let Some((&raw_type, rest)) = values.split_first() else {
            return Err(ProtocolError::MalformedReply("RECV".to_string()));
        };
        let hid_type = u8::try_from(raw_type)
            .ok()
            .and_then(HidType::from_u8)
            .filter(|t| t.is_report())
            .ok_or(ProtocolError::UnknownReportType(low_byte_u32(raw_type)))?;
        if rest.len() != hid_type.fields().len() {
            return Err(ProtocolError::MalformedReply(format!(
                "RECV type 0x{:02X} expects {} values, got {}",
                hid_type.to_u8(),
                hid_type.value_count(),
                values.len()
            )));
        }
        let fields = fit_fields(hid_type, rest)?;
        Ok(match hid_type {
            HidType::Output => HidReport::Output(OutputReport::from_fields(&fields)),
            HidType::SetConfig1 => HidReport::Config1(Config1Report::from_fields(&fields)),
            _ => HidReport::Input(InputReport::from_fields(&fields)),
        })
    }
}

impl fmt::Display for HidReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for value in self.to_values() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{value}")?;
            first = false;
        }
        Ok(())
    }
}

fn parse_number(token: &str) -> Result<u32> {
    token
        .parse::<u32>()
        .map_err(|_| ProtocolError::InvalidNumber(token.to_string()))
}

/// Pad or trim `values` to the field count of `hid_type`, checking ranges.
fn fit_fields(hid_type: HidType, values: &[u32]) -> Result<Vec<u16>> {
    let widths = hid_type.fields();
    if values.len() > widths.len() && values[widths.len()..].iter().any(|&v| v != 0) {
        return Err(ProtocolError::TooManyValues {
            hid_type: hid_type.to_u8(),
            expected: hid_type.value_count(),
            got: values.len() + 1,
        });
    }

    let mut fields = Vec::with_capacity(widths.len());
    for (index, width) in widths.iter().enumerate() {
        let value = values.get(index).copied().unwrap_or(0);
        let fitted = u16::try_from(value)
            .ok()
            .filter(|v| *v <= width.max())
            .ok_or(ProtocolError::ValueOutOfRange {
                hid_type: hid_type.to_u8(),
                index: index + 1,
                value,
                max: width.max(),
            })?;
        fields.push(fitted);
    }
    Ok(fields)
}

fn peek_type(data: &[u8]) -> Result<u8> {
    data.first()
        .copied()
        .ok_or(ProtocolError::ShortReport { expected: 1, got: 0 })
}

fn check_len(hid_type: HidType, data: &[u8]) -> Result<()> {
    let expected = hid_type.wire_len();
    if data.len() < expected {
        return Err(ProtocolError::ShortReport {
            expected,
            got: data.len(),
        });
    }
    Ok(())
}

#[inline]
fn low_byte(value: u16) -> u8 {
    (value & 0xFF) as u8
}

#[inline]
fn low_byte_u32(value: u32) -> u8 {
    (value & 0xFF) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(HidType::Output, 13, 23)]
    #[case(HidType::SetConfig1, 24, 29)]
    #[case(HidType::Input, 9, 16)]
    #[case(HidType::GetInput, 1, 1)]
    #[case(HidType::Reset, 1, 1)]
    fn test_layout_sizes(#[case] t: HidType, #[case] values: usize, #[case] bytes: usize) {
        assert_eq!(t.value_count(), values);
        assert_eq!(t.wire_len(), bytes);
        assert!(t.wire_len() <= HID_MESSAGE_SIZE);
    }

    #[test]
    fn test_output_golden_bytes() {
        let cmd = HidCommand::from_args(&[
            "1", "85", "6000", "0", "0", "0", "0", "0", "0", "30000", "512", "1023", "3",
        ])
        .unwrap();
        let msg = cmd.encode();

        assert_eq!(msg[0], 0x01);
        assert_eq!(msg[1], 0x55);
        assert_eq!(&msg[2..4], &[0x17, 0x70]); // 6000
        assert_eq!(&msg[16..18], &[0x75, 0x30]); // 30000
        assert_eq!(&msg[18..20], &[0x02, 0x00]); // 512
        assert_eq!(&msg[20..22], &[0x03, 0xFF]); // 1023
        assert_eq!(msg[22], 3);
        assert!(msg[23..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_setconfig1_golden_bytes() {
        let mut args: Vec<String> = vec!["3".into()];
        args.extend(["10", "10"].map(String::from));
        args.extend(std::iter::repeat_n("20".to_string(), 5));
        args.extend(std::iter::repeat_n("30".to_string(), 8));
        args.extend(["40", "40"].map(String::from));
        args.extend(std::iter::repeat_n("258".to_string(), 5));
        args.push("7".into());

        let msg = HidCommand::from_args(&args).unwrap().encode();
        assert_eq!(msg[0], 0x03);
        assert_eq!(&msg[1..3], &[10, 10]);
        assert_eq!(&msg[3..8], &[20; 5]);
        assert_eq!(&msg[8..16], &[30; 8]);
        assert_eq!(&msg[16..18], &[40, 40]);
        assert_eq!(&msg[18..20], &[0x01, 0x02]);
        assert_eq!(msg[28], 7);
        assert_eq!(msg[29], 0);
    }

    #[test]
    fn test_input_decode_golden_bytes() {
        let mut msg = [0u8; HID_MESSAGE_SIZE];
        msg[0] = 0x81;
        msg[1] = 0x1F;
        msg[2..4].copy_from_slice(&[0x00, 0x2A]);
        msg[12..14].copy_from_slice(&[0x03, 0xFF]);
        msg[14..16].copy_from_slice(&[0x01, 0x00]);

        let report = HidReport::decode(&msg).unwrap();
        let HidReport::Input(input) = report else {
            panic!("expected INPUT report");
        };
        assert_eq!(input.input_bits, 0x1F);
        assert_eq!(input.input_counter[0], 42);
        assert_eq!(input.input_adc_value, [1023, 256]);
        assert_eq!(report.to_string(), "129 31 42 0 0 0 0 1023 256");
    }

    #[test]
    fn test_zero_padding() {
        let cmd = HidCommand::from_args(&["1", "85"]).unwrap();
        let HidCommand::Output(output) = cmd else {
            panic!("expected OUTPUT");
        };
        assert_eq!(output.output_bits, 85);
        assert_eq!(output.output_value, [0; 8]);
        assert_eq!(output.reset_counter, 0);
    }

    #[test]
    fn test_surplus_zero_values_accepted() {
        let mut args = vec!["1", "85"];
        args.extend(std::iter::repeat_n("0", 13));
        assert_eq!(args.len(), 15);

        let cmd = HidCommand::from_args(&args).unwrap();
        assert_eq!(cmd.encode()[1], 85);
    }

    #[test]
    fn test_surplus_nonzero_value_rejected() {
        let err = HidCommand::from_args(&["2", "0", "5"]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TooManyValues {
                hid_type: 0x02,
                expected: 1,
                got: 3
            }
        ));
    }

    #[rstest]
    #[case("8", "invalid HID command type 0x08")]
    #[case("129", "invalid HID command type 0x81")]
    #[case("300", "invalid HID command type 0x12C")]
    fn test_unknown_command_type(#[case] t: &str, #[case] message: &str) {
        let err = HidCommand::from_args(&[t]).unwrap_err();
        assert_eq!(err.to_string(), message);
    }

    #[rstest]
    #[case(&["1", "256"], 1)]
    #[case(&["1", "0", "65536"], 2)]
    #[case(&["1", "0", "0", "0", "0", "0", "0", "0", "0", "0", "0", "0", "256"], 12)]
    fn test_value_out_of_range(#[case] args: &[&str], #[case] expected_index: usize) {
        match HidCommand::from_args(args).unwrap_err() {
            ProtocolError::ValueOutOfRange { index, .. } => assert_eq!(index, expected_index),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[rstest]
    #[case(&["x"])]
    #[case(&["1", "-1"])]
    #[case(&["1", "0x10"])]
    fn test_invalid_number(#[case] args: &[&str]) {
        assert!(matches!(
            HidCommand::from_args(args),
            Err(ProtocolError::InvalidNumber(_))
        ));
    }

    #[rstest]
    #[case(HidCommand::GetInput, 0x02)]
    #[case(HidCommand::GetConfig, 0x04)]
    #[case(HidCommand::SaveConfig, 0x05)]
    #[case(HidCommand::SaveAll, 0x06)]
    #[case(HidCommand::Reset, 0x7F)]
    fn test_type_only_commands(#[case] cmd: HidCommand, #[case] byte: u8) {
        let msg = cmd.encode();
        assert_eq!(msg[0], byte);
        assert!(msg[1..].iter().all(|&b| b == 0));
        assert_eq!(HidCommand::decode(&msg).unwrap(), cmd);
    }

    #[test]
    fn test_unknown_report_type() {
        let mut msg = [0u8; HID_MESSAGE_SIZE];
        msg[0] = 0x42;
        let err = HidReport::decode(&msg).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown HID packet type 0x42 received from card"
        );
    }

    #[test]
    fn test_short_report() {
        let err = HidReport::decode(&[0x81, 0, 0]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ShortReport {
                expected: 16,
                got: 3
            }
        ));
        assert!(HidReport::decode(&[]).is_err());
    }

    #[test]
    fn test_report_from_values_requires_exact_count() {
        assert!(HidReport::from_values(&[1, 85]).is_err());
        let report = HidReport::from_values(&[1, 85, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(report.hid_type(), HidType::Output);
    }

    #[test]
    fn test_config1_values_order() {
        let report = Config1Report {
            mode_adc: [mode::ADC10, mode::ADC8],
            mode_input: [mode::INPUT; 5],
            mode_output: [mode::OUTPUT; 8],
            mode_pwm: [mode::PWM; 2],
            debounce_value: [101; 5],
            card_address: 2,
        };
        let values = HidReport::Config1(report).to_values();
        assert_eq!(values.len(), 24);
        assert_eq!(&values[..3], &[3, 10, 12]);
        assert_eq!(values[18], 101);
        assert_eq!(values[23], 2);
    }
}
