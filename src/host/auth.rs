//! Authorization header policy.
//!
//! The release host has accepted two header conventions over time: the older
//! `token X` form used by classic personal access tokens and app tokens, and
//! `Bearer X` required by fine-grained tokens and JWTs. The scheme is chosen
//! from the token's recognizable format.

/// Authorization header convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStyle {
    /// `Authorization: token X`
    Token,
    /// `Authorization: Bearer X`
    Bearer,
}

impl HeaderStyle {
    /// Full header value for `token`.
    #[must_use]
    pub fn header_value(self, token: &str) -> String {
        match self {
            Self::Token => format!("token {token}"),
            Self::Bearer => format!("Bearer {token}"),
        }
    }
}

/// Prefix of fine-grained personal access tokens.
const FINE_GRAINED_PREFIX: &str = "github_pat_";

/// Pick the header convention for `token`.
///
/// Fine-grained tokens (`github_pat_...`) and JWT-shaped tokens (three
/// non-empty `.`-separated segments) use `Bearer`; everything else
/// (`ghp_`, `gho_`, `ghs_`, legacy 40-hex tokens) uses `token`.
#[must_use]
pub fn choose_auth_scheme(token: &str) -> HeaderStyle {
    let token = token.trim();
    if token.starts_with(FINE_GRAINED_PREFIX) || is_jwt_like(token) {
        HeaderStyle::Bearer
    } else {
        HeaderStyle::Token
    }
}

/// Header value for `token` using the chosen convention.
#[must_use]
pub fn authorization_value(token: &str) -> String {
    choose_auth_scheme(token).header_value(token.trim())
}

fn is_jwt_like(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    segments.len() == 3
        && segments.iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '='))
        })
}
