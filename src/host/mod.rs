//! Attachment host adapters
//!
//! - [`AttachmentHost`] - the interface the vault is written against
//! - [`DiscordHost`] - Discord REST API (message attachments + refresh-urls)
//! - [`MemoryHost`] - in-process host for tests and demos

mod discord;
mod memory;
mod traits;

pub use discord::DiscordHost;
pub use memory::MemoryHost;
pub use traits::{AttachmentHost, BlobStream};
