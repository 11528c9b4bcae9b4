//! Console Bridge CLI Library
//!
//! This crate provides the terminal front end for console-bridge: it takes
//! over the physical terminal, draws the console surface with crossterm, and
//! forwards key presses to an interactive shell session.
//!
//! # Architecture
//!
//! - [`cli_args`]: Command-line argument parsing
//! - [`script`]: Building the initial command from a script file and `-p` parameters
//! - [`terminal`]: Rendering, key classification and the event loop
//!
//! # Examples
//!
//! ```bash
//! # Interactive console using the configured shell
//! cb
//!
//! # Run a command first, then keep the prompt open
//! cb "ls -la"
//!
//! # Run a script with parameters, printing instantly
//! cb deploy.sh -p environment=prod -d 0
//! ```

pub mod cli_args;
pub mod script;
pub mod terminal;
