//! Access control for the Open8055 server.
//!
//! - [`access`]: ordered IP/user access lists and their evaluation
//! - [`users`]: the users file, password hashing and the salted
//!   challenge-response check
//! - [`policy`]: the connect, `LIST` and `OPEN` checks a server performs
//!
//! # Example
//!
//! ```
//! use open8055_access::{AccessList, AccessPolicy, users::UserStore};
//! use open8055_core::{AuthMethod, CardId};
//!
//! # async fn example() {
//! let policy = AccessPolicy::new(UserStore::new())
//!     .with_default("0.0.0.0/0 all trust".parse::<AccessList>().unwrap());
//!
//! let card = CardId::new(0).unwrap();
//! let grant = policy
//!     .check_open(card, "192.0.2.10".parse().unwrap(), "nobody", "nopass", "0011223344556677")
//!     .await
//!     .unwrap();
//! assert_eq!(grant.verdict, AuthMethod::Trust);
//! # }
//! ```

pub mod access;
pub mod error;
pub mod policy;
pub mod users;

pub use access::{AccessList, AccessRule, Network, UserMatch};
pub use error::{AccessError, Denied, Result, UserResult, UserStoreError};
pub use policy::{AccessPolicy, Grant};
pub use users::{Credential, UserFile, UserRecord, UserRepository, UserStore};
