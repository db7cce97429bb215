//! # oauth-core
//!
//! Shared building blocks for the authorization server, the resource server and the
//! SSO gateway.
//!
//! ## Components
//!
//! - **Codec:** issues and verifies compact signed access tokens (EdDSA or HS256).
//! - **Clients:** registry of OAuth clients, their secrets, grant types and scopes.
//! - **Grants:** the password and authorization-code grant state machines.
//! - **Codes:** single-use authorization code stores (in-memory and redis).
//! - **Guard:** bearer extraction, token verification and scope enforcement.
//! - **Store:** session cache backends shared by the HTTP services.

pub mod clients;
pub mod codec;
pub mod codes;
pub mod error;
pub mod grants;
pub mod guard;
pub mod headers;
pub mod html;
pub mod identity;
pub mod random;
pub mod retry;
pub mod scope;
pub mod secret;
pub mod store;

pub use crate::clients::{Client, ClientRegistry, GrantType, RegistryError, StaticClientRegistry};
pub use crate::codec::{
    AccessTokenClaims, Algorithm, KeyError, TokenCodec, TokenKey, TokenVerifier,
    VerificationError,
};
pub use crate::codes::{
    AuthorizationCode, CodeStore, ConsumeError, InMemoryCodeStore, RedisCodeStore, StoreError,
};
pub use crate::error::OAuthError;
pub use crate::grants::{
    AuthorizationCore, AuthorizeError, AuthorizeRequest, CodeExchange, GrantPolicy, IssuedToken,
    PasswordGrant, UserInfo, ValidatedAuthorization,
};
pub use crate::guard::{extract_bearer, ResourceGuard};
pub use crate::identity::{Principal, ResourceOwner, StaticUserDirectory, UserDirectory};
pub use crate::retry::Backoff;
pub use crate::scope::{ScopePolicy, ScopeSet};
pub use crate::secret::{SecretError, SecretHash};
pub use crate::store::{Cache, CacheBackend, CacheError, StoreKind};
