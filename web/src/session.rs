//! Who is calling.
//!
//! Sign-in happens in front of this service. A [`SessionResolver`] turns
//! whatever the proxy forwards into an [`Identity`]; a request it cannot
//! resolve is anonymous.

use axum::http::{HeaderMap, HeaderName, header::InvalidHeaderName};
use office_hours_core::queue::Identity;

/// Resolves the caller of a request.
pub trait SessionResolver: Send + Sync {
    /// Identity behind `headers`, or `None` for an anonymous caller.
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Reads the identity from headers set by an authenticating proxy.
///
/// Emails are trimmed and lowercased. Without a name header the local part
/// of the email is used as the display name.
#[derive(Debug, Clone)]
pub struct ForwardedHeaders {
    email: HeaderName,
    name: HeaderName,
}

impl ForwardedHeaders {
    /// Header carrying the email unless configured otherwise.
    pub const DEFAULT_EMAIL_HEADER: &'static str = "x-forwarded-email";
    /// Header carrying the display name unless configured otherwise.
    pub const DEFAULT_NAME_HEADER: &'static str = "x-forwarded-preferred-username";

    /// Read the email and name from the given headers.
    ///
    /// # Errors
    ///
    /// Returns an error if either name is not a valid header name.
    pub fn new(email_header: &str, name_header: &str) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            email: HeaderName::try_from(email_header)?,
            name: HeaderName::try_from(name_header)?,
        })
    }
}

impl Default for ForwardedHeaders {
    fn default() -> Self {
        Self {
            email: HeaderName::from_static(Self::DEFAULT_EMAIL_HEADER),
            name: HeaderName::from_static(Self::DEFAULT_NAME_HEADER),
        }
    }
}

impl SessionResolver for ForwardedHeaders {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let email = headers
            .get(&self.email)?
            .to_str()
            .ok()?
            .trim()
            .to_lowercase();
        if email.is_empty() {
            return None;
        }

        let name = headers
            .get(&self.name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(
                || email.split('@').next().unwrap_or(&email).to_owned(),
                str::to_owned,
            );

        Some(Identity { email, name })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_anonymous_without_email() {
        let resolver = ForwardedHeaders::default();
        assert!(resolver.resolve(&HeaderMap::new()).is_none());
        assert!(
            resolver
                .resolve(&headers(&[("x-forwarded-email", "  ")]))
                .is_none()
        );
    }

    #[test]
    fn test_email_is_normalized() {
        let resolver = ForwardedHeaders::default();
        let identity = resolver
            .resolve(&headers(&[
                ("x-forwarded-email", " Ada@Example.EDU "),
                ("x-forwarded-preferred-username", "Ada Lovelace"),
            ]))
            .unwrap();
        assert_eq!(identity.email, "ada@example.edu");
        assert_eq!(identity.name, "Ada Lovelace");
    }

    #[test]
    fn test_name_defaults_to_local_part() {
        let resolver = ForwardedHeaders::default();
        let identity = resolver
            .resolve(&headers(&[("x-forwarded-email", "grace@example.edu")]))
            .unwrap();
        assert_eq!(identity.name, "grace");
    }

    #[test]
    fn test_custom_headers() {
        let resolver = ForwardedHeaders::new("x-user", "x-user-name").unwrap();
        let identity = resolver
            .resolve(&headers(&[("x-user", "alan@example.edu")]))
            .unwrap();
        assert_eq!(identity.email, "alan@example.edu");
        assert!(ForwardedHeaders::new("bad header", "x").is_err());
    }
}
