use oauth_core::{Client, GrantType, ResourceOwner, ScopeSet, SecretHash};
use serde::Deserialize;

/// A `[[clients]]` entry of the config file
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEntry {
    pub client_id: String,
    /// `{noop}plain`, `{sha256}<hex>` or plain
    pub secret: String,
    pub grant_types: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

impl ClientEntry {
    pub fn to_client(&self) -> Result<Client, String> {
        let secret: SecretHash = self
            .secret
            .parse()
            .map_err(|e| format!("client '{}': {e}", self.client_id))?;
        let allowed_grant_types = self
            .grant_types
            .iter()
            .map(|grant| grant.parse::<GrantType>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("client '{}': {e}", self.client_id))?;
        for uri in &self.redirect_uris {
            url::Url::parse(uri)
                .map_err(|e| format!("client '{}': redirect URI '{uri}': {e}", self.client_id))?;
        }
        Ok(Client {
            client_id: self.client_id.clone(),
            secret,
            allowed_grant_types,
            allowed_scopes: self.scopes.iter().cloned().collect(),
            redirect_uris: self.redirect_uris.clone(),
        })
    }
}

/// A `[[users]]` entry of the config file
#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub username: String,
    /// `{noop}plain`, `{sha256}<hex>` or plain
    pub password: String,
    #[serde(default)]
    pub authorities: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl UserEntry {
    pub fn to_owner(&self) -> Result<ResourceOwner, String> {
        let credential_hash: SecretHash = self
            .password
            .parse()
            .map_err(|e| format!("user '{}': {e}", self.username))?;
        Ok(ResourceOwner {
            username: self.username.clone(),
            credential_hash,
            authorities: self.authorities.iter().cloned().collect(),
            allowed_scopes: self.scopes.iter().cloned().collect::<ScopeSet>(),
        })
    }
}
