/// Extract the credential from an `Authorization` header value.
///
/// The scheme is matched case-insensitively; anything other than a non-empty
/// bearer credential yields `None`.
#[must_use]
pub fn bearer_token(authorization: Option<&str>) -> Option<&str> {
    let (scheme, credentials) = authorization?.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let credentials = credentials.trim();
    (!credentials.is_empty()).then_some(credentials)
}
