//! Secure credential container with automatic memory zeroing.
//!
//! Credentials reach the agent from the command line or the environment and
//! are never persisted. They live in `Zeroizing` containers so the memory is
//! cleared when the configuration is dropped at shutdown.

use zeroize::Zeroizing;

/// Database login that zeroes its memory on drop.
///
/// `Debug` output never includes the password.
///
/// # Example
///
/// ```rust
/// use dbinventory_core::Credentials;
///
/// let creds = Credentials::new("inventory".to_string(), "secret".to_string());
/// assert_eq!(creds.username(), "inventory");
/// assert!(!format!("{creds:?}").contains("secret"));
/// ```
#[derive(Clone)]
pub struct Credentials {
    username: Zeroizing<String>,
    password: Zeroizing<String>,
}

impl Credentials {
    /// Creates new credentials with automatic memory zeroing.
    pub fn new(username: String, password: String) -> Self {
        Self {
            username: Zeroizing::new(username),
            password: Zeroizing::new(password),
        }
    }

    /// Gets the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Gets the password for building a connection string.
    ///
    /// Callers must not log the returned value.
    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    /// Checks if a password is present without exposing it.
    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username.as_str())
            .field("password", &"****")
            .finish()
    }
}
