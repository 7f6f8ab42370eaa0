mod backend;
mod client;
mod config;

pub use backend::{CONFIG_CREDENTIAL, CloudSyncBackend, split_remote_path};
pub use client::{ConfigWizard, InteractiveConfigWizard, RcloneClient};
pub use config::parse_remote_sections;
