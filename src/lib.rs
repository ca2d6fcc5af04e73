//! Webex administration tools: bulk wholesale customer maintenance, device
//! activation and user housekeeping over the Webex REST API.

pub mod batch;
pub mod commands;
pub mod config;
pub mod logger;
pub mod records;
pub mod webex;
