//! Command-line argument parsing.
//!
//! This module defines the command-line interface of the `cb` binary using
//! the `clap` crate. Values given here override the configuration file.

use clap::Parser;

/// Command-line arguments for the console bridge.
///
/// # Examples
///
/// ```rust
/// use clap::Parser;
/// use console_bridge_cli::cli_args::Args;
///
/// let args = Args::parse_from(["cb", "-d", "0", "echo hello"]);
/// assert_eq!(args.delay, Some(0));
/// ```
#[derive(Parser, Debug)] // requires `derive` feature
#[command(term_width = 0)] // Just to make testing across clap features easier
pub struct Args {
    /// Path to the console configuration file YAML.
    ///
    /// If not provided, defaults to `~/.console-bridge/config.yml`.
    #[arg(long, short = 'c')]
    pub config_path: Option<String>,

    /// Delay between printed characters, in milliseconds.
    ///
    /// `0` prints every message at once.
    #[arg(long, short = 'd')]
    pub delay: Option<u64>,

    /// The shell that runs each command.
    #[arg(long, short = 's')]
    pub shell: Option<String>,

    /// Write log output to this file instead of stderr.
    ///
    /// The terminal is in raw mode while the session runs, so stderr logging
    /// would interleave with the console.
    #[arg(long)]
    pub log_file: Option<String>,

    /// Script parameters in the format key=value.
    ///
    /// Each becomes an assignment in front of the script. Multiple parameters
    /// can be provided with repeated `-p` flags.
    ///
    /// # Examples
    /// ```bash
    /// cb deploy.sh -p environment=prod -p region=us-west-2
    /// ```
    #[arg(long = "param", short = 'p', action = clap::ArgAction::Append)]
    pub parameters: Vec<String>,

    /// A script file to run, or command text, before the prompt appears.
    #[arg(num_args(1))]
    pub command_or_script: Option<String>,
}
