//! Proxy orchestration core.
//!
//! Leaves first:
//! - `whitelist`: whitelist parsing and PAC generation
//! - `network`: per-service system proxy settings
//! - `tunnel`: SSH dynamic-forward process supervision
//! - `vault` / `settings`: credential and settings persistence
//! - `controller`: the state machine sequencing all of the above
//! - `service`: one worker thread serializing controller operations

pub mod controller;
pub mod error;
pub mod network;
pub mod service;
pub mod settings;
pub mod tunnel;
pub mod vault;
pub mod whitelist;

use std::path::{Path, PathBuf};

use crate::constants;

/// Locations of every per-user file inside the config directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub config_dir: PathBuf,
    pub whitelist: PathBuf,
    pub pac: PathBuf,
    pub ssh_settings: PathBuf,
    pub preferences: PathBuf,
    pub vault_key: PathBuf,
    pub vault_secret: PathBuf,
    pub logs_dir: PathBuf,
    pub run_dir: PathBuf,
}

impl Layout {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            whitelist: config_dir.join(constants::WHITELIST_FILE_NAME),
            pac: config_dir.join(constants::PAC_FILE_NAME),
            ssh_settings: config_dir.join(constants::SSH_SETTINGS_FILE_NAME),
            preferences: config_dir.join(constants::PREFERENCES_FILE_NAME),
            vault_key: config_dir.join(constants::VAULT_KEY_FILE_NAME),
            vault_secret: config_dir.join(constants::VAULT_SECRET_FILE_NAME),
            logs_dir: config_dir.join(constants::LOGS_DIR_NAME),
            run_dir: config_dir.join(constants::RUN_DIR_NAME),
        }
    }
}
