//! Bergelmir library crate
//!
//! Gemini capsule server with a built-in Tor onion service and a
//! self-managed TLS certificate.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface (run, init)
//! - [`config`] - Configuration loading and validation
//! - [`content`] - Path cleaning and content lookup under the data root
//! - [`crypto`] - Hidden service keys and onion addresses
//! - [`gemini`] - Gemini request validation and TLS listener
//! - [`gemtext`] - Gemtext parsing, HTML and feed rendering
//! - [`http`] - HTTP gateway
//! - [`scheduler`] - Start-up sequencing and task supervision
//! - [`state`] - Domain set and start-up context
//! - [`tls`] - Self-signed certificate lifecycle
//! - [`tor`] - Tor control port and managed daemon
//! - [`util`] - Listeners, filesystem, randomization helpers

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::format_push_string)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_borrows_for_generic_args)]
#![allow(clippy::unnecessary_debug_formatting)]
#![allow(clippy::new_without_default)]
#![allow(clippy::single_match_else)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::too_many_lines)]

pub mod cli;
pub mod config;
pub mod content;
pub mod crypto;
pub mod gemini;
pub mod gemtext;
pub mod http;
pub mod logging;
pub mod scheduler;
pub mod state;
pub mod tls;
pub mod tor;
pub mod util;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
