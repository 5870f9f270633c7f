//! Connect, list and open checks.
//!
//! [`AccessPolicy`] bundles the access lists of a server configuration with
//! the users file:
//!
//! | Check | List used |
//! |---|---|
//! | connect | `connect`, address only |
//! | `LIST` | `list`, or `connect` if no list rules are configured |
//! | `OPEN n` | the rules for card `n`, or `default` |
//!
//! A `trust` verdict needs no password. `plain` and `md5` require a valid
//! password of at least that strength.

use std::collections::HashMap;
use std::net::IpAddr;

use open8055_core::{AuthMethod, CardId};
use tracing::{error, warn};

use crate::access::AccessList;
use crate::error::Denied;
use crate::users::{Credential, UserFile, UserRepository};

/// A successful check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub verdict: AuthMethod,
    /// Set when a password was checked.
    pub credential: Option<Credential>,
}

#[derive(Debug, Clone)]
pub struct AccessPolicy<U = UserFile> {
    connect: AccessList,
    list: Option<AccessList>,
    default: AccessList,
    cards: HashMap<CardId, AccessList>,
    users: U,
}

impl<U: UserRepository> AccessPolicy<U> {
    /// Policy that trusts loopback clients and denies everybody else.
    pub fn new(users: U) -> Self {
        Self {
            connect: AccessList::local_only(),
            list: None,
            default: AccessList::local_only(),
            cards: HashMap::new(),
            users,
        }
    }

    #[must_use]
    pub fn with_connect(mut self, rules: AccessList) -> Self {
        self.connect = rules;
        self
    }

    #[must_use]
    pub fn with_list(mut self, rules: AccessList) -> Self {
        self.list = Some(rules);
        self
    }

    #[must_use]
    pub fn with_default(mut self, rules: AccessList) -> Self {
        self.default = rules;
        self
    }

    #[must_use]
    pub fn with_card(mut self, card: CardId, rules: AccessList) -> Self {
        self.cards.insert(card, rules);
        self
    }

    pub fn users(&self) -> &U {
        &self.users
    }

    /// Rules applied to `LIST`.
    pub fn list_rules(&self) -> &AccessList {
        self.list.as_ref().unwrap_or(&self.connect)
    }

    /// Rules applied to `OPEN card`.
    pub fn card_rules(&self, card: CardId) -> &AccessList {
        self.cards.get(&card).unwrap_or(&self.default)
    }

    /// May `addr` connect at all?
    ///
    /// # Errors
    /// Returns `Denied::Rule` if the connect list says `deny`.
    pub fn check_connect(&self, addr: IpAddr) -> Result<AuthMethod, Denied> {
        match self.connect.evaluate(addr, None) {
            verdict if verdict.permits_connect() => Ok(verdict),
            _ => Err(Denied::Rule),
        }
    }

    /// May `user` list the cards from `addr`?
    ///
    /// # Errors
    /// Returns the reason the check failed.
    pub async fn check_list(
        &self,
        addr: IpAddr,
        user: &str,
        password: &str,
        salt: &str,
    ) -> Result<Grant, Denied> {
        self.authorize(self.list_rules(), addr, user, password, salt)
            .await
    }

    /// May `user` open `card` from `addr`?
    ///
    /// # Errors
    /// Returns the reason the check failed.
    pub async fn check_open(
        &self,
        card: CardId,
        addr: IpAddr,
        user: &str,
        password: &str,
        salt: &str,
    ) -> Result<Grant, Denied> {
        self.authorize(self.card_rules(card), addr, user, password, salt)
            .await
    }

    async fn authorize(
        &self,
        rules: &AccessList,
        addr: IpAddr,
        user: &str,
        password: &str,
        salt: &str,
    ) -> Result<Grant, Denied> {
        let verdict = rules.evaluate(addr, Some(user));
        match verdict {
            AuthMethod::Deny => return Err(Denied::Rule),
            AuthMethod::Trust => {
                return Ok(Grant {
                    verdict,
                    credential: None,
                });
            }
            AuthMethod::Plain | AuthMethod::Md5 => {}
        }

        let credential = match self.users.authenticate(user, password, salt).await {
            Ok(Some(credential)) => credential,
            Ok(None) => return Err(Denied::BadCredentials),
            Err(e) => {
                error!(error = %e, "user lookup failed");
                return Err(Denied::UserStore(e.to_string()));
            }
        };

        if !verdict.accepts_strength(credential.strength) {
            warn!(
                %addr,
                user,
                required = %verdict,
                given = %credential.strength,
                "password too weak for access rule"
            );
            return Err(Denied::TooWeak {
                required: verdict,
                given: credential.strength,
            });
        }

        Ok(Grant {
            verdict,
            credential: Some(credential),
        })
    }
}
