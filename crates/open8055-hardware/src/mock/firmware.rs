//! Model of the Open8055 card firmware's message handling.

use open8055_protocol::hid::mode;
use open8055_protocol::{Config1Report, HidCommand, HidReport, InputReport, OutputReport};

/// Lowest servo pulse width the firmware accepts.
pub const SERVO_MIN: u16 = 6000;
/// Highest servo pulse width the firmware accepts.
pub const SERVO_MAX: u16 = 30000;
/// Power-on debounce value of every counter input.
pub const DEBOUNCE_DEFAULT: u16 = 101;

/// State of one card as kept by its firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firmware {
    pub config: Config1Report,
    pub output: OutputReport,
    pub input: InputReport,
}

impl Default for Firmware {
    fn default() -> Self {
        Self {
            config: Config1Report {
                mode_adc: [mode::ADC10; 2],
                mode_input: [mode::INPUT; 5],
                mode_output: [mode::OUTPUT; 8],
                mode_pwm: [mode::PWM; 2],
                debounce_value: [DEBOUNCE_DEFAULT; 5],
                card_address: 0,
            },
            output: OutputReport::default(),
            input: InputReport::default(),
        }
    }
}

impl Firmware {
    /// Apply one command and return the reports the card sends in answer,
    /// in sending order.
    pub fn apply(&mut self, command: &HidCommand) -> Vec<HidReport> {
        match command {
            HidCommand::Output(received) => {
                self.output.output_bits = received.output_bits;
                for (current, value) in self.output.output_value.iter_mut().zip(received.output_value) {
                    *current = value.clamp(SERVO_MIN, SERVO_MAX);
                }
                self.output.output_pwm_value = received.output_pwm_value;
                for (i, counter) in self.input.input_counter.iter_mut().enumerate() {
                    if received.reset_counter & (1 << i) != 0 {
                        *counter = 0;
                    }
                }
                Vec::new()
            }
            HidCommand::SetConfig1(config) => {
                self.config = *config;
                Vec::new()
            }
            HidCommand::GetInput => vec![HidReport::Input(self.input)],
            HidCommand::GetConfig => vec![
                HidReport::Config1(self.config),
                HidReport::Output(self.output),
                HidReport::Input(self.input),
            ],
            HidCommand::SaveConfig | HidCommand::SaveAll => Vec::new(),
            HidCommand::Reset => {
                *self = Firmware::default();
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use open8055_protocol::HidType;

    #[test]
    fn test_getconfig_answers_config_output_input() {
        let mut fw = Firmware::default();
        let types: Vec<HidType> = fw
            .apply(&HidCommand::GetConfig)
            .iter()
            .map(HidReport::hid_type)
            .collect();
        assert_eq!(types, [HidType::SetConfig1, HidType::Output, HidType::Input]);
    }

    #[test]
    fn test_output_clamps_servo_values() {
        let mut fw = Firmware::default();
        let mut output = OutputReport {
            output_bits: 0x55,
            ..Default::default()
        };
        output.output_value[0] = 100;
        output.output_value[1] = 40000;
        output.output_value[2] = 12000;

        assert!(fw.apply(&HidCommand::Output(output)).is_empty());
        assert_eq!(fw.output.output_bits, 0x55);
        assert_eq!(&fw.output.output_value[..3], &[SERVO_MIN, SERVO_MAX, 12000]);
    }

    #[test]
    fn test_output_reset_counter_bits() {
        let mut fw = Firmware::default();
        fw.input.input_counter = [5, 6, 7, 8, 9];
        let output = OutputReport {
            reset_counter: 0b0_0101,
            ..Default::default()
        };
        fw.apply(&HidCommand::Output(output));
        assert_eq!(fw.input.input_counter, [0, 6, 0, 8, 9]);
        assert_eq!(fw.output.reset_counter, 0);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut fw = Firmware::default();
        fw.config.card_address = 3;
        fw.input.input_bits = 1;
        fw.apply(&HidCommand::Reset);
        assert_eq!(fw, Firmware::default());
    }

    #[test]
    fn test_setconfig1_stored_verbatim() {
        let mut fw = Firmware::default();
        let mut config = fw.config;
        config.mode_output[0] = mode::SERVO;
        config.debounce_value = [1, 2, 3, 4, 5];
        fw.apply(&HidCommand::SetConfig1(config));
        assert_eq!(fw.config, config);
    }
}
