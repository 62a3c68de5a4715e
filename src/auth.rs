//! Credentials and the auth scoping rule shared by both personalities.

use std::fmt;

use reqwest::Method;

/// A username/password pair sent as HTTP Basic authentication.
///
/// Bind one to the whole session with `auth_set`, or pass one as the
/// `auth` argument of a single call. Constructors never install
/// credentials implicitly.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    password: String,
}

impl Credential {
    /// Creates a credential for one call or for the session.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The username.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credential {
    // the password must never leak through logs or panic messages
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolves which credential, if any, one outgoing request carries.
///
/// Reads (`GET`) never authenticate. For every other method the per-call
/// credential wins over the session credential; with neither present the
/// request goes out unauthenticated.
pub(crate) fn effective_credential<'a>(
    method: &Method,
    per_call: Option<&'a Credential>,
    session: Option<&'a Credential>,
) -> Option<&'a Credential> {
    if *method == Method::GET {
        return None;
    }
    per_call.or(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_the_password() {
        let credential = Credential::new("user", "s3cret");
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn reads_never_carry_credentials() {
        let per_call = Credential::new("admin", "adminPass");
        let session = Credential::new("user", "userPass");
        let resolved = effective_credential(&Method::GET, Some(&per_call), Some(&session));
        assert!(resolved.is_none());
    }

    #[test]
    fn per_call_credential_wins_over_the_session() {
        let per_call = Credential::new("admin", "adminPass");
        let session = Credential::new("user", "userPass");

        let resolved = effective_credential(&Method::PUT, Some(&per_call), Some(&session));
        assert_eq!(resolved.map(Credential::username), Some("admin"));

        let resolved = effective_credential(&Method::PUT, None, Some(&session));
        assert_eq!(resolved.map(Credential::username), Some("user"));

        assert!(effective_credential(&Method::PUT, None, None).is_none());
    }
}
