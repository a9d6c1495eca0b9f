use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub id: String,
    pub address: String,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecipient {
    #[serde(rename = "emailId")]
    pub email_id: String,
    /// Recipient kind as stored by the backend ("to", "cc", ...)
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub email: Option<EmailAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub body: String,
    #[serde(rename = "fromId")]
    pub from_id: String,
    #[serde(rename = "fromEmail", default)]
    pub from_email: Option<EmailAddress>,
    #[serde(rename = "sentAt", default)]
    pub sent_at: Option<String>,
    #[serde(default)]
    pub recipients: Vec<MessageRecipient>,
}

impl Message {
    /// Subject line for display, with a placeholder for empty subjects
    pub fn subject_display(&self) -> &str {
        match self.subject.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => "(no subject)",
        }
    }

    pub fn sender_display(&self) -> &str {
        self.from_email
            .as_ref()
            .map(|e| e.address.as_str())
            .unwrap_or(&self.from_id)
    }
}

/// Body of `POST /messages/`.
#[derive(Debug, Clone, Serialize)]
pub struct MessageInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    #[serde(rename = "fromId")]
    pub from_id: String,
    pub recipients: Vec<RecipientInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipientInput {
    #[serde(rename = "emailId")]
    pub email_id: String,
    #[serde(rename = "type")]
    pub kind: String,
}
