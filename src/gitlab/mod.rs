mod client;
mod link_header;
mod types;

pub use client::Client;
pub use types::Project;
