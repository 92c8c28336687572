use thiserror::Error;

pub mod client;
pub mod server;

pub use client::OutgoingMessage;
pub use server::{
    ChatMessage, MessageKind, TokenPair, UserProfile, parse_chat_frame, parse_chat_value,
    parse_history,
};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Empty message")]
    EmptyMessage,
}
