//! Data models for scraplook backend payloads.
//!
//! Field names follow the backend's JSON, which mixes snake_case (token
//! responses) with camelCase (database records).

pub mod message;
pub mod token;
pub mod user;

pub use message::{EmailAddress, Message, MessageInput, MessageRecipient, RecipientInput};
pub use token::{RefreshedToken, TokenPair};
pub use user::{NewUser, User, UserProfile};
