use std::fmt::Display;

use crate::error::LedgerError;

/// External account reference used to namespace remote backups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Result<Self, LedgerError> {
        let id = id.into();
        if !is_safe_identifier(&id) {
            return Err(LedgerError::validation(format!(
                "invalid identity '{}': must be alphanumeric",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identity ends up as a path segment of the remote document.
fn is_safe_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Per-session context handed to the components that need to know who is logged in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    identity: Option<Identity>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { identity: None }
    }

    pub fn logged_in(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_validation() {
        assert!(Identity::new("1234567").is_ok());
        assert!(Identity::new("octo-cat_42").is_ok());
        assert!(Identity::new("").is_err());
        assert!(Identity::new("../other").is_err());
        assert!(Identity::new("a/b").is_err());
    }

    #[test]
    fn test_session_identity() {
        assert!(Session::anonymous().identity().is_none());
        let session = Session::logged_in(Identity::new("42").unwrap());
        assert_eq!(session.identity().map(|i| i.as_str()), Some("42"));
    }
}
