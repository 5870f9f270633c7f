//! Client to server lines of the text control protocol.
//!
//! A line is split on whitespace. The verb is case-insensitive, the
//! arguments are kept verbatim. Argument counts are checked here; the
//! meaning of the arguments is checked by the session, in the order the
//! session needs (for `SEND` the open card comes before the HID type).

use std::fmt;
use std::str::FromStr;

use open8055_core::CardId;

use crate::error::{ProtocolError, Result};
use crate::hid::HidCommand;

pub const LIST_USAGE: &str = "LIST username password";
pub const OPEN_USAGE: &str = "OPEN cardid username password";
pub const SEND_USAGE: &str = "SEND type [values...]";

/// One parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    List {
        user: String,
        password: String,
    },
    Open {
        card: String,
        user: String,
        password: String,
    },
    Send {
        args: Vec<String>,
    },
    Quit,
}

impl Request {
    /// Parse one line without its terminator.
    ///
    /// # Errors
    /// `UnknownCommand` for an unknown or empty verb, `Usage` for a wrong
    /// argument count.
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let verb = tokens.next().unwrap_or("").to_ascii_uppercase();
        let args: Vec<String> = tokens.map(str::to_string).collect();

        match verb.as_str() {
            "LIST" => match <[String; 2]>::try_from(args) {
                Ok([user, password]) => Ok(Request::List { user, password }),
                Err(_) => Err(ProtocolError::Usage(LIST_USAGE)),
            },
            "OPEN" => match <[String; 3]>::try_from(args) {
                Ok([card, user, password]) => Ok(Request::Open {
                    card,
                    user,
                    password,
                }),
                Err(_) => Err(ProtocolError::Usage(OPEN_USAGE)),
            },
            "SEND" => {
                if args.is_empty() {
                    return Err(ProtocolError::Usage(SEND_USAGE));
                }
                Ok(Request::Send { args })
            }
            "QUIT" => Ok(Request::Quit),
            _ => Err(ProtocolError::UnknownCommand(verb)),
        }
    }

    /// Request verb as sent on the wire.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Request::List { .. } => "LIST",
            Request::Open { .. } => "OPEN",
            Request::Send { .. } => "SEND",
            Request::Quit => "QUIT",
        }
    }

    /// Build an `OPEN` request for a known card.
    pub fn open(card: CardId, user: impl Into<String>, password: impl Into<String>) -> Self {
        Request::Open {
            card: card.to_string(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Build a `SEND` request carrying `command` in its full text form.
    #[must_use]
    pub fn send(command: &HidCommand) -> Self {
        Request::Send {
            args: command.to_values().iter().map(u16::to_string).collect(),
        }
    }

    /// Parse the card argument of an `OPEN` request.
    ///
    /// # Errors
    /// `InvalidCardNumber` if it is not a valid card slot.
    pub fn parse_card(card: &str) -> Result<CardId> {
        CardId::from_str(card).map_err(|_| ProtocolError::InvalidCardNumber(card.to_string()))
    }
}

impl FromStr for Request {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Request::parse(s)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Request::List { user, password } => write!(f, "LIST {user} {password}"),
            Request::Open {
                card,
                user,
                password,
            } => write!(f, "OPEN {card} {user} {password}"),
            Request::Send { args } => write!(f, "SEND {}", args.join(" ")),
            Request::Quit => f.write_str("QUIT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::OutputReport;
    use rstest::rstest;

    #[rstest]
    #[case("LIST nobody nopass")]
    #[case("list nobody nopass")]
    #[case("  List   nobody\tnopass  ")]
    fn test_parse_list(#[case] line: &str) {
        assert_eq!(
            Request::parse(line).unwrap(),
            Request::List {
                user: "nobody".into(),
                password: "nopass".into()
            }
        );
    }

    #[test]
    fn test_parse_open() {
        let req = Request::parse("OPEN 0 nobody nopass").unwrap();
        assert_eq!(req, Request::open(CardId::new(0).unwrap(), "nobody", "nopass"));
    }

    #[rstest]
    #[case("LIST nobody", "usage: LIST username password")]
    #[case("LIST a b c", "usage: LIST username password")]
    #[case("OPEN 0 nobody", "usage: OPEN cardid username password")]
    #[case("SEND", "usage: SEND type [values...]")]
    #[case("FOO bar", "unknown command 'FOO'")]
    #[case("hello", "unknown command 'HELLO'")]
    #[case("", "unknown command ''")]
    fn test_parse_errors(#[case] line: &str, #[case] message: &str) {
        assert_eq!(Request::parse(line).unwrap_err().to_string(), message);
    }

    #[test]
    fn test_parse_send_keeps_raw_args() {
        let req = Request::parse("send 1 85 x").unwrap();
        assert_eq!(
            req,
            Request::Send {
                args: vec!["1".into(), "85".into(), "x".into()]
            }
        );
    }

    #[test]
    fn test_quit_ignores_arguments() {
        assert_eq!(Request::parse("quit now").unwrap(), Request::Quit);
    }

    #[rstest]
    #[case("16")]
    #[case("abc")]
    #[case("-1")]
    fn test_parse_card_invalid(#[case] card: &str) {
        assert_eq!(
            Request::parse_card(card).unwrap_err().to_string(),
            format!("invalid card number '{card}'")
        );
    }

    #[test]
    fn test_send_request_text() {
        let cmd = HidCommand::Output(OutputReport {
            output_bits: 85,
            ..Default::default()
        });
        let line = Request::send(&cmd).to_string();
        assert_eq!(line, "SEND 1 85 0 0 0 0 0 0 0 0 0 0 0");
        assert_eq!(Request::send(&HidCommand::GetConfig).to_string(), "SEND 4");
    }

    #[test]
    fn test_display_parse_agree() {
        let req = Request::open(CardId::new(3).unwrap(), "admin", "md5abc");
        assert_eq!(Request::parse(&req.to_string()).unwrap(), req);
    }
}
