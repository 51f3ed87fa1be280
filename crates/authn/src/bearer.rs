//! `Authorization` header parsing.

use crate::error::{AuthError, Result};

/// The only accepted authorization scheme.
pub const BEARER_SCHEME: &str = "Bearer";

/// Extracts the token from an `Authorization: Bearer <token>` header value.
///
/// # Errors
///
/// - [`AuthError::AuthHeaderMissing`] if the header is absent or empty
/// - [`AuthError::AuthHeaderMalformed`] if it is not exactly two space-separated parts
/// - [`AuthError::AuthSchemeWrong`] if the scheme is not `Bearer`
///
/// # Examples
///
/// ```
/// use openid_authn::extract_bearer_token;
///
/// assert_eq!(extract_bearer_token(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
/// assert!(extract_bearer_token(Some("Basic dXNlcjpwYXNz")).is_err());
/// ```
pub fn extract_bearer_token(header: Option<&str>) -> Result<&str> {
    let header = header.filter(|value| !value.is_empty()).ok_or(AuthError::AuthHeaderMissing)?;

    let mut parts = header.split(' ');
    let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AuthError::AuthHeaderMalformed);
    };

    if scheme != BEARER_SCHEME {
        return Err(AuthError::auth_scheme_wrong(scheme));
    }
    Ok(token)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::assert_auth_error;

    #[test]
    fn test_extracts_token() {
        assert_eq!(extract_bearer_token(Some("Bearer a.b.c")).unwrap(), "a.b.c");
    }

    #[rstest]
    #[case::absent(None)]
    #[case::empty(Some(""))]
    fn test_missing(#[case] header: Option<&str>) {
        assert_auth_error!(extract_bearer_token(header), AuthHeaderMissing);
    }

    #[rstest]
    #[case::scheme_only("Bearer")]
    #[case::three_parts("Bearer a.b.c extra")]
    #[case::double_space("Bearer  a.b.c")]
    fn test_malformed(#[case] header: &str) {
        assert_auth_error!(extract_bearer_token(Some(header)), AuthHeaderMalformed);
    }

    #[rstest]
    #[case::basic("Basic dXNlcjpwYXNz")]
    #[case::lowercase("bearer a.b.c")]
    fn test_wrong_scheme(#[case] header: &str) {
        let result = extract_bearer_token(Some(header));
        assert_auth_error!(result, AuthSchemeWrong);
        assert_eq!(result.unwrap_err().http_status(), 400);
    }

    #[test]
    fn test_empty_token_part_is_passed_through() {
        assert_eq!(extract_bearer_token(Some("Bearer ")).unwrap(), "");
    }
}
