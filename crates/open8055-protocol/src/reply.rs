//! Server to client lines of the text control protocol.

use std::fmt;
use std::str::FromStr;

use open8055_core::CardId;
use open8055_core::constants::{SALT_HEX_LEN, SERVER_NAME, SERVER_VERSION};

use crate::error::{ProtocolError, Result};
use crate::hid::HidReport;

/// One line the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Greeting: server name and version.
    Hello { name: String, version: String },
    /// Per-connection challenge, [`SALT_HEX_LEN`] lowercase hex characters.
    Salt(String),
    /// Ids of the cards currently present.
    List(Vec<CardId>),
    /// A report read from the open card.
    Recv(HidReport),
    Error(String),
}

impl Reply {
    /// The greeting of this server build.
    #[must_use]
    pub fn hello() -> Self {
        Reply::Hello {
            name: SERVER_NAME.to_string(),
            version: SERVER_VERSION.to_string(),
        }
    }

    /// Salt line for a 64-bit random value.
    #[must_use]
    pub fn salt(value: u64) -> Self {
        Reply::Salt(format!("{value:0width$x}", width = SALT_HEX_LEN))
    }

    pub fn error(message: impl fmt::Display) -> Self {
        Reply::Error(message.to_string())
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Reply::Hello { name, version } => write!(f, "HELLO {name} {version}"),
            Reply::Salt(salt) => write!(f, "SALT {salt}"),
            Reply::List(cards) => {
                f.write_str("LIST")?;
                for card in cards {
                    write!(f, " {card}")?;
                }
                Ok(())
            }
            Reply::Recv(report) => write!(f, "RECV {report}"),
            Reply::Error(message) => write!(f, "ERROR {message}"),
        }
    }
}

impl FromStr for Reply {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim_end();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let malformed = || ProtocolError::MalformedReply(line.to_string());

        match verb {
            "HELLO" => {
                let (name, version) = rest.split_once(' ').ok_or_else(malformed)?;
                Ok(Reply::Hello {
                    name: name.to_string(),
                    version: version.to_string(),
                })
            }
            "SALT" => {
                if rest.len() != SALT_HEX_LEN || !rest.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(malformed());
                }
                Ok(Reply::Salt(rest.to_string()))
            }
            "LIST" => rest
                .split_whitespace()
                .map(|id| id.parse::<CardId>().map_err(|_| malformed()))
                .collect::<Result<Vec<_>>>()
                .map(Reply::List),
            "RECV" => {
                let values = rest
                    .split_whitespace()
                    .map(|v| v.parse::<u32>().map_err(|_| malformed()))
                    .collect::<Result<Vec<_>>>()?;
                HidReport::from_values(&values).map(Reply::Recv)
            }
            "ERROR" => Ok(Reply::Error(rest.to_string())),
            _ => Err(malformed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::{InputReport, OutputReport};
    use rstest::rstest;

    #[test]
    fn test_hello_line() {
        assert_eq!(Reply::hello().to_string(), "HELLO Open8055Server 0.1.0");
    }

    #[rstest]
    #[case(0, "SALT 0000000000000000")]
    #[case(0xdead_beef, "SALT 00000000deadbeef")]
    #[case(u64::MAX, "SALT ffffffffffffffff")]
    fn test_salt_is_fixed_width(#[case] value: u64, #[case] line: &str) {
        assert_eq!(Reply::salt(value).to_string(), line);
    }

    #[test]
    fn test_list_line() {
        let cards = vec![CardId::new(0).unwrap(), CardId::new(3).unwrap()];
        assert_eq!(Reply::List(cards).to_string(), "LIST 0 3");
        assert_eq!(Reply::List(Vec::new()).to_string(), "LIST");
    }

    #[test]
    fn test_recv_line() {
        let report = HidReport::Output(OutputReport {
            output_bits: 85,
            ..Default::default()
        });
        let line = Reply::Recv(report).to_string();
        assert_eq!(line, "RECV 1 85 0 0 0 0 0 0 0 0 0 0 0");
        assert_eq!(line.parse::<Reply>().unwrap(), Reply::Recv(report));
    }

    #[rstest]
    #[case("HELLO Open8055Server 0.1.0")]
    #[case("SALT 0123456789abcdef")]
    #[case("LIST 0 15")]
    #[case("LIST")]
    #[case("ERROR permission denied")]
    #[case("RECV 129 3 1 2 3 4 5 1023 0")]
    fn test_parse_display_agree(#[case] line: &str) {
        let reply: Reply = line.parse().unwrap();
        assert_eq!(reply.to_string(), line);
    }

    #[rstest]
    #[case("SALT 123")]
    #[case("LIST 16")]
    #[case("RECV 1 85")]
    #[case("BYE")]
    fn test_parse_malformed(#[case] line: &str) {
        assert!(line.parse::<Reply>().is_err());
    }

    #[test]
    fn test_input_report_reply() {
        let report = HidReport::Input(InputReport {
            input_bits: 1,
            ..Default::default()
        });
        assert_eq!(Reply::Recv(report).to_string(), "RECV 129 1 0 0 0 0 0 0 0");
    }
}
