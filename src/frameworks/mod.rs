// Frameworks layer: process bootstrap and environment configuration.

pub mod config;
pub mod kiosk;
