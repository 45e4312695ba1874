//! Vigil audits security relevant events and decides, for each of them,
//! whether and how it has to be reported.
//!
//! Decisions are taken by the [audit_filter] engine from rules loaded out of
//! YAML files ([rules]). This crate provides the `vigil` command line tool
//! around it:
//!
//! ```sh
//! # Show the filters and the policy table built from the rules
//! vigil --rules ./rules filters
//! vigil --rules ./rules policy
//!
//! # Evaluate recorded events
//! vigil --rules ./rules replay events.jsonl
//!
//! # Binary definition record of filter 12
//! vigil encode 12
//! ```
//!
//! Settings are read from an `INI` file, see [config::VigilConfig].

pub mod cli;
pub mod config;
pub mod replay;
pub mod rules;
mod term_print;
pub mod utils;

pub mod metadata {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Init logger. We log from info level and above.
/// If RUST_LOG is set, we assume the user wants to debug something
/// and use env_logger default behaviour.
pub fn init_logger(override_log_level: Option<log::LevelFilter>) {
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::init();
    } else {
        let level_filter = override_log_level.unwrap_or(log::LevelFilter::Info);

        env_logger::builder().filter_level(level_filter).init();
    }
}
