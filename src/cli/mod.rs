//! CLI module for the opssat-tiles toolkit
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{
    format_size, main, AugmentArgs, Cli, Command, FetchArgs, SortArgs, TileArgs,
};
