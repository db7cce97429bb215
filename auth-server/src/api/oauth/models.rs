use oauth_core::{IssuedToken, TokenKey};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Form body of `POST /oauth/token`
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// `password` or `authorization_code`
    pub grant_type: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    /// Space-separated scopes
    pub scope: Option<String>,
    /// Used when no `Authorization: Basic` header is sent
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: i64,
    /// Granted scopes, space separated
    pub scope: String,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            access_token: issued.access_token,
            token_type: issued.token_type.to_string(),
            expires_in: issued.expires_in,
            scope: issued.scope.to_string(),
        }
    }
}

/// Key material resource servers use to verify access tokens
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenKeyResponse {
    /// `EdDSA` or `HS256`
    pub alg: String,
    pub kid: String,
    /// base64url public key; absent when tokens are signed with a shared secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl From<TokenKey> for TokenKeyResponse {
    fn from(key: TokenKey) -> Self {
        Self {
            alg: key.alg.to_string(),
            kid: key.kid,
            value: key.value,
        }
    }
}

/// Form body of `POST /oauth/authorize`
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentForm {
    pub consent: String,
    pub decision: String,
}
