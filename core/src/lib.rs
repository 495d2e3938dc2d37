/// CampusLink - client state layer for campus messaging
///
/// Cursor-paginated conversation and message state, a confirmed send path,
/// direct-conversation reuse, and a scroll-preserving message window on top
/// of a small REST client.

pub mod error;
pub mod config;
pub mod cursor;
pub mod model;
pub mod api;
pub mod state;
pub mod client;
pub mod throttle;
pub mod viewport;
pub mod compose;
pub mod new_conversation;
pub mod cli_app;

pub use error::{ChatError, Result};
pub use config::Config;
pub use api::{ChatApi, HttpChatApi};
pub use client::{ChatClient, Outcome};
pub use state::ChatState;
