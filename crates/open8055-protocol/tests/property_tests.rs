//! Property-based tests for HID record packing and text rendering.
//!
//! These tests use proptest to generate arbitrary field values and verify
//! that packing then unpacking every record shape reproduces the values.

mod common;

use open8055_protocol::{
    Config1Report, HidCommand, HidReport, InputReport, OutputReport, Reply, Request,
};
use proptest::prelude::*;

fn any_output() -> impl Strategy<Value = OutputReport> {
    (
        any::<u8>(),
        any::<[u16; 8]>(),
        any::<[u16; 2]>(),
        any::<u8>(),
    )
        .prop_map(|(bits, value, pwm, reset)| OutputReport {
            output_bits: bits,
            output_value: value,
            output_pwm_value: pwm,
            reset_counter: reset,
        })
}

fn any_config1() -> impl Strategy<Value = Config1Report> {
    (
        any::<[u8; 2]>(),
        any::<[u8; 5]>(),
        any::<[u8; 8]>(),
        any::<[u8; 2]>(),
        any::<[u16; 5]>(),
        any::<u8>(),
    )
        .prop_map(|(adc, input, output, pwm, debounce, address)| Config1Report {
            mode_adc: adc,
            mode_input: input,
            mode_output: output,
            mode_pwm: pwm,
            debounce_value: debounce,
            card_address: address,
        })
}

fn any_input() -> impl Strategy<Value = InputReport> {
    (any::<u8>(), any::<[u16; 5]>(), any::<[u16; 2]>()).prop_map(|(bits, counter, adc)| {
        InputReport {
            input_bits: bits,
            input_counter: counter,
            input_adc_value: adc,
        }
    })
}

fn any_report() -> impl Strategy<Value = HidReport> {
    prop_oneof![
        any_output().prop_map(HidReport::Output),
        any_config1().prop_map(HidReport::Config1),
        any_input().prop_map(HidReport::Input),
    ]
}

proptest! {
    /// Property: unpacking a packed report yields the same report.
    #[test]
    fn prop_report_bytes_roundtrip(report in any_report()) {
        let msg = report.encode();
        prop_assert_eq!(msg[0], report.hid_type().to_u8());
        prop_assert_eq!(HidReport::decode(&msg).unwrap(), report);
    }

    /// Property: the text values of a report rebuild the same report.
    #[test]
    fn prop_report_values_roundtrip(report in any_report()) {
        let values: Vec<u32> = report.to_values().into_iter().map(u32::from).collect();
        prop_assert_eq!(values.len(), report.hid_type().value_count());
        prop_assert_eq!(HidReport::from_values(&values).unwrap(), report);
    }

    /// Property: a SEND line for any OUTPUT or SETCONFIG1 command packs to
    /// the same bytes as the command itself.
    #[test]
    fn prop_send_line_packs_identically(
        cmd in prop_oneof![
            any_output().prop_map(HidCommand::Output),
            any_config1().prop_map(HidCommand::SetConfig1),
        ]
    ) {
        let line = Request::send(&cmd).to_string();
        let Request::Send { args } = Request::parse(&line).unwrap() else {
            panic!("expected SEND");
        };
        let parsed = HidCommand::from_args(&args).unwrap();
        prop_assert_eq!(parsed.encode(), cmd.encode());
    }

    /// Property: a RECV line survives rendering and parsing.
    #[test]
    fn prop_recv_line_roundtrip(report in any_report()) {
        let line = Reply::Recv(report).to_string();
        prop_assert_eq!(line.parse::<Reply>().unwrap(), Reply::Recv(report));
    }

    /// Property: any prefix of the OUTPUT values is zero padded.
    #[test]
    fn prop_output_zero_padding(report in any_output(), keep in 0usize..=12) {
        let values: Vec<u32> = HidReport::Output(report)
            .to_values()
            .into_iter()
            .skip(1)
            .take(keep)
            .map(u32::from)
            .collect();
        let HidCommand::Output(padded) = HidCommand::from_values(1, &values).unwrap() else {
            panic!("expected OUTPUT");
        };
        let padded_values = HidReport::Output(padded).to_values();
        for (i, v) in padded_values.iter().enumerate().skip(1) {
            if i <= keep {
                prop_assert_eq!(u32::from(*v), values[i - 1]);
            } else {
                prop_assert_eq!(*v, 0);
            }
        }
    }

    /// Property: decoding arbitrary bytes never panics.
    #[test]
    fn prop_decode_arbitrary_bytes(data in prop::collection::vec(any::<u8>(), 0..40)) {
        let _ = HidReport::decode(&data);
        let _ = HidCommand::decode(&data);
    }
}

#[test]
fn test_power_on_config_roundtrip() {
    let report = HidReport::Config1(common::power_on_config());
    assert_eq!(HidReport::decode(&report.encode()).unwrap(), report);
}
