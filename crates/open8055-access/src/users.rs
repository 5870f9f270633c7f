#![allow(async_fn_in_trait)]

//! Users file and password verification.
//!
//! The users file holds one `name:admin:password` record per line. The
//! password field is normally `md5` followed by the 32 hex digits of the
//! md5 of the password. Any other value is a legacy clear-text password and
//! is hashed before it is compared.
//!
//! A client proves a password in one of two ways:
//!
//! - **md5**: it sends `md5` + hex(md5(salt + hex(md5(password)))), using
//!   the salt the server announced for this connection. A captured value
//!   is useless on another connection.
//! - **plain**: it sends the password itself.
//!
//! ```
//! use open8055_access::users::{UserRecord, salted_password};
//! use open8055_core::AuthMethod;
//!
//! let user = UserRecord::with_password("alice", false, "secret").unwrap();
//! let salt = "00112233deadbeef";
//!
//! let proof = salted_password(salt, "secret");
//! assert_eq!(user.verify(&proof, salt), Some(AuthMethod::Md5));
//! assert_eq!(user.verify("secret", salt), Some(AuthMethod::Plain));
//! assert_eq!(user.verify("wrong", salt), None);
//! ```

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use open8055_core::AuthMethod;
use open8055_core::constants::{MD5_HASH_LEN, MD5_PREFIX};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::error::{UserResult, UserStoreError};

/// Lowercase hex md5 digest of `data`.
#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Stored form of a password: `md5` + hex digest.
#[must_use]
pub fn hash_password(password: &str) -> String {
    format!("{MD5_PREFIX}{}", md5_hex(password.as_bytes()))
}

/// Value a client sends to prove `password` on a connection with `salt`.
#[must_use]
pub fn salted_password(salt: &str, password: &str) -> String {
    let inner = md5_hex(password.as_bytes());
    format!("{MD5_PREFIX}{}", md5_hex(format!("{salt}{inner}").as_bytes()))
}

/// Returns the hex part of `value` if it has the `md5` + 32 digits shape.
fn md5_digest(value: &str) -> Option<&str> {
    if value.len() != MD5_HASH_LEN {
        return None;
    }
    value.strip_prefix(MD5_PREFIX)
}

fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// One line of the users file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub is_admin: bool,
    /// Password field exactly as stored.
    password: String,
}

impl UserRecord {
    /// Create a record with an already stored password field.
    ///
    /// # Errors
    /// Returns `InvalidName` if `name` is empty, contains `:` or whitespace.
    pub fn new(
        name: impl Into<String>,
        is_admin: bool,
        stored_password: impl Into<String>,
    ) -> UserResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            is_admin,
            password: stored_password.into(),
        })
    }

    /// Create a record from a clear-text password, stored hashed.
    ///
    /// # Errors
    /// Returns `InvalidName` for names the file cannot hold.
    pub fn with_password(
        name: impl Into<String>,
        is_admin: bool,
        password: &str,
    ) -> UserResult<Self> {
        Self::new(name, is_admin, hash_password(password))
    }

    pub fn set_password(&mut self, password: &str) {
        self.password = hash_password(password);
    }

    /// Password field as it appears in the file.
    #[must_use]
    pub fn stored_password(&self) -> &str {
        &self.password
    }

    /// Hex md5 of the password. Legacy clear-text fields are hashed here.
    #[must_use]
    pub fn password_digest(&self) -> String {
        match md5_digest(&self.password) {
            Some(hex) => hex.to_string(),
            None => md5_hex(self.password.as_bytes()),
        }
    }

    /// Check `password` as sent by a client on a connection with `salt`.
    ///
    /// Returns the proven strength (`Md5` or `Plain`), or `None` on
    /// mismatch.
    #[must_use]
    pub fn verify(&self, password: &str, salt: &str) -> Option<AuthMethod> {
        let digest = self.password_digest();

        if let Some(given) = md5_digest(password) {
            let expected = md5_hex(format!("{salt}{digest}").as_bytes());
            if ct_eq(given, &expected) {
                return Some(AuthMethod::Md5);
            }
        }

        if ct_eq(&md5_hex(password.as_bytes()), &digest) {
            return Some(AuthMethod::Plain);
        }
        None
    }

    fn parse_line(line: usize, text: &str) -> UserResult<Self> {
        let fields: Vec<&str> = text.split(':').collect();
        let &[name, admin, password] = fields.as_slice() else {
            return Err(UserStoreError::MalformedRecord { line });
        };
        Self::new(name, parse_admin(admin), password)
            .map_err(|_| UserStoreError::MalformedRecord { line })
    }
}

impl fmt::Display for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let admin = if self.is_admin { "True" } else { "False" };
        write!(f, "{}:{}:{}", self.name, admin, self.password)
    }
}

fn parse_admin(field: &str) -> bool {
    matches!(
        field.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "1"
    )
}

fn validate_name(name: &str) -> UserResult<()> {
    if name.is_empty() || name.contains(':') || name.contains(char::is_whitespace) {
        return Err(UserStoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Outcome of a successful password check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub is_admin: bool,
    /// `Md5` or `Plain`.
    pub strength: AuthMethod,
}

/// Read access to user records.
pub trait UserRepository: Send + Sync {
    /// First record named `name`.
    async fn find_by_name(&self, name: &str) -> UserResult<Option<UserRecord>>;

    async fn find_all(&self) -> UserResult<Vec<UserRecord>>;

    /// Look up `user` and verify `password` against the connection `salt`.
    ///
    /// `Ok(None)` means unknown user or wrong password; the two are not
    /// distinguished.
    async fn authenticate(
        &self,
        user: &str,
        password: &str,
        salt: &str,
    ) -> UserResult<Option<Credential>> {
        let Some(record) = self.find_by_name(user).await? else {
            debug!(user, "unknown user");
            return Ok(None);
        };
        Ok(record.verify(password, salt).map(|strength| Credential {
            user: record.name.clone(),
            is_admin: record.is_admin,
            strength,
        }))
    }
}

/// In-memory users file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserStore {
    records: Vec<UserRecord>,
}

impl UserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse users file content. Blank lines are skipped.
    ///
    /// # Errors
    /// Returns `MalformedRecord` with the 1-based line number of the first
    /// bad line.
    pub fn parse(content: &str) -> UserResult<Self> {
        let records = content
            .lines()
            .enumerate()
            .map(|(idx, text)| (idx + 1, text.trim()))
            .filter(|(_, text)| !text.is_empty())
            .map(|(line, text)| UserRecord::parse_line(line, text))
            .collect::<UserResult<Vec<_>>>()?;
        Ok(Self { records })
    }

    /// Parse users file content, skipping bad lines with a warning.
    ///
    /// Used for lookups, where one broken record must not lock out every
    /// other user.
    #[must_use]
    pub fn parse_lenient(content: &str) -> Self {
        let records = content
            .lines()
            .enumerate()
            .map(|(idx, text)| (idx + 1, text.trim()))
            .filter(|(_, text)| !text.is_empty())
            .filter_map(|(line, text)| match UserRecord::parse_line(line, text) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "skipping users file record");
                    None
                }
            })
            .collect();
        Self { records }
    }

    /// Read a users file.
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be read, `MalformedRecord` if it
    /// cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> UserResult<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| UserStoreError::io(path, e))?;
        Self::parse(&content)
    }

    /// Like [`load`](Self::load), but a missing file is an empty store.
    ///
    /// # Errors
    /// Same as `load` for every other failure.
    pub fn load_or_default(path: impl AsRef<Path>) -> UserResult<Self> {
        match Self::load(path.as_ref()) {
            Err(UserStoreError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Replace the file at `path` with this store.
    ///
    /// The content goes to a temporary file in the same directory, readable
    /// by the owner only, which is then renamed over `path`.
    ///
    /// # Errors
    /// Returns `Io` if the temporary file cannot be written or renamed.
    pub fn save(&self, path: impl AsRef<Path>) -> UserResult<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| UserStoreError::io(&dir, e))?;
        tmp.write_all(self.to_string().as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| UserStoreError::io(tmp.path(), e))?;
        restrict_permissions(tmp.as_file()).map_err(|e| UserStoreError::io(tmp.path(), e))?;
        tmp.persist(path)
            .map_err(|e| UserStoreError::io(path, e.error))?;

        debug!(path = %path.display(), users = self.records.len(), "users file written");
        Ok(())
    }

    #[must_use]
    pub fn records(&self) -> &[UserRecord] {
        &self.records
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&UserRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Add a new user.
    ///
    /// # Errors
    /// Returns `UserExists` if the name is taken.
    pub fn add(&mut self, record: UserRecord) -> UserResult<()> {
        if self.find(&record.name).is_some() {
            return Err(UserStoreError::UserExists(record.name));
        }
        self.records.push(record);
        Ok(())
    }

    /// Change the admin flag and/or password of an existing user.
    ///
    /// # Errors
    /// Returns `UserNotFound` if there is no such user.
    pub fn update(
        &mut self,
        name: &str,
        is_admin: Option<bool>,
        password: Option<&str>,
    ) -> UserResult<()> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| UserStoreError::UserNotFound(name.to_string()))?;
        if let Some(admin) = is_admin {
            record.is_admin = admin;
        }
        if let Some(password) = password {
            record.set_password(password);
        }
        Ok(())
    }

    /// Update the user if it exists, add it otherwise.
    ///
    /// A new user is not an admin unless `is_admin` says so.
    ///
    /// # Errors
    /// Returns `PasswordRequired` when adding without a password and
    /// `InvalidName` for names the file cannot hold.
    pub fn upsert(
        &mut self,
        name: &str,
        is_admin: Option<bool>,
        password: Option<&str>,
    ) -> UserResult<()> {
        if self.find(name).is_some() {
            return self.update(name, is_admin, password);
        }
        let password = password.ok_or(UserStoreError::PasswordRequired)?;
        let record = UserRecord::with_password(name, is_admin.unwrap_or(false), password)?;
        self.records.push(record);
        Ok(())
    }

    /// Remove every record named `name`.
    ///
    /// # Errors
    /// Returns `UserNotFound` if there is no such user.
    pub fn remove(&mut self, name: &str) -> UserResult<()> {
        let before = self.records.len();
        self.records.retain(|r| r.name != name);
        if self.records.len() == before {
            return Err(UserStoreError::UserNotFound(name.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for UserStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for record in &self.records {
            writeln!(f, "{record}")?;
        }
        Ok(())
    }
}

impl UserRepository for UserStore {
    async fn find_by_name(&self, name: &str) -> UserResult<Option<UserRecord>> {
        Ok(self.find(name).cloned())
    }

    async fn find_all(&self) -> UserResult<Vec<UserRecord>> {
        Ok(self.records.clone())
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &std::fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &std::fs::File) -> io::Result<()> {
    Ok(())
}

/// Users file on disk, read again on every lookup so edits made with the
/// `user` command apply to the next login. Malformed records are skipped.
#[derive(Debug, Clone)]
pub struct UserFile {
    path: PathBuf,
}

impl UserFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> UserResult<UserStore> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| UserStoreError::io(&self.path, e))?;
        Ok(UserStore::parse_lenient(&content))
    }
}

impl UserRepository for UserFile {
    async fn find_by_name(&self, name: &str) -> UserResult<Option<UserRecord>> {
        Ok(self.read().await?.find(name).cloned())
    }

    async fn find_all(&self) -> UserResult<Vec<UserRecord>> {
        Ok(self.read().await?.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SALT: &str = "0123456789abcdef";

    fn sample() -> UserStore {
        UserStore::parse(
            "alice:True:md55ebe2294ecd0e0f08eab7690d2a6ee69\n\
             \n\
             bob:False:hunter2\n",
        )
        .unwrap()
    }

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(b"secret"), "5ebe2294ecd0e0f08eab7690d2a6ee69");
        assert_eq!(hash_password("secret"), "md55ebe2294ecd0e0f08eab7690d2a6ee69");
    }

    #[test]
    fn test_salted_password_shape() {
        let proof = salted_password(SALT, "secret");
        assert_eq!(proof.len(), MD5_HASH_LEN);
        assert!(proof.starts_with(MD5_PREFIX));
        assert_ne!(proof, salted_password("fedcba9876543210", "secret"));
    }

    #[test]
    fn test_parse() {
        let store = sample();
        assert_eq!(store.records().len(), 2);
        let alice = store.find("alice").unwrap();
        assert!(alice.is_admin);
        let bob = store.find("bob").unwrap();
        assert!(!bob.is_admin);
        assert_eq!(bob.stored_password(), "hunter2");
    }

    #[rstest]
    #[case("True", true)]
    #[case("true", true)]
    #[case("1", true)]
    #[case("False", false)]
    #[case("", false)]
    #[case("0", false)]
    fn test_admin_flag(#[case] field: &str, #[case] expected: bool) {
        let store = UserStore::parse(&format!("u:{field}:pw")).unwrap();
        assert_eq!(store.find("u").unwrap().is_admin, expected);
    }

    #[rstest]
    #[case("alice:True")]
    #[case("alice:True:pw:extra")]
    #[case(":False:pw")]
    fn test_malformed_record(#[case] line: &str) {
        let err = UserStore::parse(&format!("ok:False:pw\n{line}")).unwrap_err();
        assert!(matches!(err, UserStoreError::MalformedRecord { line: 2 }));
    }

    #[test]
    fn test_verify_md5_and_plain() {
        let store = sample();
        let alice = store.find("alice").unwrap();
        assert_eq!(
            alice.verify(&salted_password(SALT, "secret"), SALT),
            Some(AuthMethod::Md5)
        );
        assert_eq!(alice.verify("secret", SALT), Some(AuthMethod::Plain));
        assert_eq!(alice.verify("Secret", SALT), None);
    }

    #[test]
    fn test_verify_proof_for_other_salt_fails() {
        let alice = sample().find("alice").cloned().unwrap();
        let replayed = salted_password("ffffffffffffffff", "secret");
        assert_eq!(alice.verify(&replayed, SALT), None);
    }

    #[test]
    fn test_legacy_password_is_hashed() {
        let bob = sample().find("bob").cloned().unwrap();
        assert_eq!(bob.password_digest(), md5_hex(b"hunter2"));
        assert_eq!(bob.verify("hunter2", SALT), Some(AuthMethod::Plain));
        assert_eq!(
            bob.verify(&salted_password(SALT, "hunter2"), SALT),
            Some(AuthMethod::Md5)
        );
    }

    #[test]
    fn test_first_duplicate_wins() {
        let store = UserStore::parse("carol:False:one\ncarol:True:two").unwrap();
        assert_eq!(store.find("carol").unwrap().stored_password(), "one");
    }

    #[rstest]
    #[case("")]
    #[case("a:b")]
    #[case("with space")]
    fn test_invalid_names(#[case] name: &str) {
        assert!(matches!(
            UserRecord::with_password(name, false, "pw"),
            Err(UserStoreError::InvalidName(_))
        ));
    }

    #[test]
    fn test_add_update_remove() {
        let mut store = sample();

        let dup = UserRecord::with_password("bob", false, "x").unwrap();
        assert!(matches!(store.add(dup), Err(UserStoreError::UserExists(_))));

        store
            .add(UserRecord::with_password("dave", false, "pw").unwrap())
            .unwrap();
        store.update("dave", Some(true), Some("new")).unwrap();
        let dave = store.find("dave").unwrap();
        assert!(dave.is_admin);
        assert_eq!(dave.verify("new", SALT), Some(AuthMethod::Plain));

        store.remove("dave").unwrap();
        assert!(store.find("dave").is_none());
        assert!(matches!(
            store.remove("dave"),
            Err(UserStoreError::UserNotFound(_))
        ));
        assert!(matches!(
            store.update("dave", None, None),
            Err(UserStoreError::UserNotFound(_))
        ));
    }

    #[test]
    fn test_upsert() {
        let mut store = UserStore::new();
        assert!(matches!(
            store.upsert("erin", None, None),
            Err(UserStoreError::PasswordRequired)
        ));
        store.upsert("erin", None, Some("pw")).unwrap();
        assert!(!store.find("erin").unwrap().is_admin);

        // Existing user keeps the password when none is given.
        store.upsert("erin", Some(true), None).unwrap();
        let erin = store.find("erin").unwrap();
        assert!(erin.is_admin);
        assert_eq!(erin.verify("pw", SALT), Some(AuthMethod::Plain));
    }

    #[test]
    fn test_display_round_trips() {
        let store = sample();
        let text = store.to_string();
        assert!(text.starts_with("alice:True:md5"));
        assert!(text.contains("bob:False:hunter2\n"));
        assert_eq!(UserStore::parse(&text).unwrap(), store);
    }

    #[tokio::test]
    async fn test_authenticate_in_memory() {
        let store = sample();
        let cred = store
            .authenticate("alice", &salted_password(SALT, "secret"), SALT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.user, "alice");
        assert!(cred.is_admin);
        assert_eq!(cred.strength, AuthMethod::Md5);

        assert!(store.authenticate("nobody", "x", SALT).await.unwrap().is_none());
        assert!(store.authenticate("alice", "x", SALT).await.unwrap().is_none());
    }
}
