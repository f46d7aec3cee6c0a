use serde::{Deserialize, Serialize};

/// Claims carried by the bearer token issued by the authentication service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserClaims {
    pub sub: String, // User ID (Subject)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub exp: usize, // Expiration time (UNIX timestamp)
}

/// Identity attached to the request after successful verification.
#[derive(Clone, Debug)]
pub struct UserContext {
    pub user_id: String,
    pub claims: UserClaims,
}
