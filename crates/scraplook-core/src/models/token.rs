use serde::Deserialize;

/// Tokens issued by `POST /auth/token`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

/// Body of a successful `POST /auth/refresh_access_token`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshedToken {
    pub access_token: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}
