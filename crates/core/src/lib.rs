//! Console Bridge Core Library
//!
//! This crate embeds a command-interpreter engine inside a scrollable text
//! surface and makes the surface behave like a terminal: typed input after a
//! prompt marker, output streamed back character by character, and Ctrl-C to
//! interrupt the running command.
//!
//! # Key Features
//!
//! - **Surface**: a text buffer owned by one thread, mutated through a closure queue
//! - **Controller**: thread-safe writes, prompt-aware line reads and progress-line replacement
//! - **Host Adapter**: the callbacks an interpreter engine requires of its host
//! - **Session**: the serialized read-execute loop with cooperative cancellation
//! - **Shell Engine**: a concrete engine running commands through a system shell
//!
//! # Examples
//!
//! Writing to a headless surface and reading submitted input back:
//!
//! ```
//! use std::time::Duration;
//! use console_bridge_core::controller::TextSurfaceController;
//! use console_bridge_core::surface::Surface;
//!
//! let surface = Surface::headless(80, 25)?;
//! let controller = TextSurfaceController::new(surface.handle())?;
//! controller.set_print_delay(Duration::ZERO);
//!
//! controller.write_delayed("PS>")?;
//! assert_eq!(controller.read_line("PS>")?, "");
//! # Ok::<(), console_bridge_core::error::Error>(())
//! ```

pub mod color;
pub mod config;
pub mod control;
pub mod controller;
pub mod engine;
pub mod error;
pub mod host;
pub mod keys;
pub mod session;
pub mod status;
pub mod surface;
