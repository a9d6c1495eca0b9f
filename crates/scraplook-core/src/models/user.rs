use serde::{Deserialize, Serialize};

use super::message::EmailAddress;
use super::token::TokenPair;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(rename = "emailAddresses", default, skip_serializing_if = "Option::is_none")]
    pub email_addresses: Option<Vec<EmailAddress>>,
}

/// The signed-in user as returned by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub token: TokenPair,
}

/// Body of `POST /user/`.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub name: String,
    pub password: String,
}
