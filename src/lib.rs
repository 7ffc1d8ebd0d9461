//! Discord music bot that plays yt-dlp audio into many guilds at once.

pub mod audio;
pub mod bot;
pub mod cache;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
