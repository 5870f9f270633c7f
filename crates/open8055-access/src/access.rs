//! Access list evaluation.
//!
//! An access list is an ordered set of rules, one per line:
//!
//! ```text
//! # network          user    verdict
//! 127.0.0.1/32       all     trust
//! 192.168.1.0/24     alice   md5
//! 0.0.0.0/0          all     deny
//! ```
//!
//! Blank lines and lines starting with `#` or `;` are ignored. The first
//! rule whose network contains the client address and whose user field is
//! `all` or the requested user decides. No match means `deny`.
//!
//! All addresses are compared in IPv6 form; IPv4 addresses and networks are
//! mapped into `::ffff:0:0/96`, so `10.0.0.1` and `::ffff:10.0.0.1` always
//! get the same verdict.
//!
//! ```
//! use open8055_access::AccessList;
//! use open8055_core::AuthMethod;
//!
//! let list: AccessList = "10.0.0.0/8 all md5\n0.0.0.0/0 all deny".parse().unwrap();
//! assert_eq!(list.evaluate("10.1.2.3".parse().unwrap(), None), AuthMethod::Md5);
//! assert_eq!(list.evaluate("192.0.2.1".parse().unwrap(), None), AuthMethod::Deny);
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;

use open8055_core::AuthMethod;

use crate::error::{AccessError, Result};

/// Rules used when the configuration does not provide a list: local
/// clients are trusted, everybody else is denied.
pub const LOCAL_ONLY_RULES: &str = "\
127.0.0.1/32    all     trust
::1/128         all     trust
0.0.0.0/0       all     deny
::/0            all     deny";

/// Offset of an IPv4 prefix inside the IPv4-mapped IPv6 range.
const MAPPED_PREFIX: u8 = 96;

/// Converts an address to the IPv6 form used for matching.
#[must_use]
pub fn normalize(addr: IpAddr) -> Ipv6Addr {
    match addr {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    }
}

/// An IPv6 network prefix. IPv4 networks are stored mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Network {
    addr: Ipv6Addr,
    prefix: u8,
}

impl Network {
    /// Build a network, clearing the host bits of `addr`.
    ///
    /// Returns `None` if `prefix` is longer than the address family allows.
    #[must_use]
    pub fn new(addr: IpAddr, prefix: u8) -> Option<Self> {
        let (addr, prefix) = match addr {
            IpAddr::V4(v4) if prefix <= 32 => (v4.to_ipv6_mapped(), MAPPED_PREFIX + prefix),
            IpAddr::V6(v6) if prefix <= 128 => (v6, prefix),
            _ => return None,
        };
        let masked = u128::from(addr) & mask(prefix);
        Some(Self {
            addr: Ipv6Addr::from(masked),
            prefix,
        })
    }

    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    /// Returns `true` if `addr` lies inside this network.
    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        let candidate = u128::from(normalize(addr));
        candidate & mask(self.prefix) == u128::from(self.addr)
    }
}

fn mask(prefix: u8) -> u128 {
    match prefix {
        0 => 0,
        p => u128::MAX << (128 - u32::from(p)),
    }
}

impl FromStr for Network {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let addr: IpAddr = addr.parse().map_err(|_| ())?;
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().map_err(|_| ())?,
            None if addr.is_ipv4() => 32,
            None => 128,
        };
        Network::new(addr, prefix).ok_or(())
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.addr.to_ipv4_mapped() {
            Some(v4) if self.prefix >= MAPPED_PREFIX => {
                write!(f, "{}/{}", v4, self.prefix - MAPPED_PREFIX)
            }
            _ => write!(f, "{}/{}", self.addr, self.prefix),
        }
    }
}

/// User field of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserMatch {
    /// `all`
    Any,
    Named(String),
}

impl UserMatch {
    fn matches(&self, user: Option<&str>) -> bool {
        match (self, user) {
            (UserMatch::Any, _) | (_, None) => true,
            (UserMatch::Named(name), Some(user)) => name == user,
        }
    }
}

impl fmt::Display for UserMatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UserMatch::Any => f.write_str("all"),
            UserMatch::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    pub network: Network,
    pub user: UserMatch,
    pub verdict: AuthMethod,
}

impl AccessRule {
    /// Returns `true` if this rule applies to `addr` and `user`.
    ///
    /// Without a user name only the address is compared.
    #[must_use]
    pub fn matches(&self, addr: IpAddr, user: Option<&str>) -> bool {
        self.user.matches(user) && self.network.contains(addr)
    }

    fn parse_line(line: usize, text: &str) -> Result<Self> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        let &[network, user, verdict] = fields.as_slice() else {
            return Err(AccessError::MalformedRule {
                line,
                text: text.to_string(),
            });
        };

        let network = network
            .parse()
            .map_err(|()| AccessError::InvalidNetwork {
                line,
                network: network.to_string(),
            })?;
        let user = match user {
            "all" => UserMatch::Any,
            name => UserMatch::Named(name.to_string()),
        };
        let verdict = verdict
            .parse()
            .map_err(|_| AccessError::InvalidVerdict {
                line,
                verdict: verdict.to_string(),
            })?;

        Ok(Self {
            network,
            user,
            verdict,
        })
    }
}

impl fmt::Display for AccessRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.network, self.user, self.verdict)
    }
}

/// An ordered list of access rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessList {
    rules: Vec<AccessRule>,
}

impl AccessList {
    #[must_use]
    pub fn new(rules: Vec<AccessRule>) -> Self {
        Self { rules }
    }

    /// The built-in list: trust loopback, deny everything else.
    #[must_use]
    pub fn local_only() -> Self {
        // Parsing a constant cannot fail; the test below keeps it that way.
        LOCAL_ONLY_RULES.parse().unwrap_or_default()
    }

    #[must_use]
    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Verdict of the first rule matching `addr` and `user`, `Deny` if none
    /// does.
    #[must_use]
    pub fn evaluate(&self, addr: IpAddr, user: Option<&str>) -> AuthMethod {
        self.rules
            .iter()
            .find(|rule| rule.matches(addr, user))
            .map_or(AuthMethod::Deny, |rule| rule.verdict)
    }
}

impl FromStr for AccessList {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self> {
        let rules = s
            .lines()
            .enumerate()
            .map(|(idx, text)| (idx + 1, text.trim()))
            .filter(|(_, text)| !text.is_empty() && !text.starts_with(['#', ';']))
            .map(|(line, text)| AccessRule::parse_line(line, text))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }
}

impl fmt::Display for AccessList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{rule}")?;
        }
        Ok(())
    }
}
