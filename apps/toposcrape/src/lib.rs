//! # Toposcrape
//!
//! Library side of the `toposcrape` binary: CLI parsing and dispatch, the
//! TOML configuration, and the file-backed scraper.

pub mod cli;
pub mod config;
pub mod scraper;
