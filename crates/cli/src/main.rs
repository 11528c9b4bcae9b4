use std::fs::File;
use std::io::stdout;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use crossterm::terminal;
use log::{debug, info};

use console_bridge_cli::cli_args::Args;
use console_bridge_cli::script;
use console_bridge_cli::terminal::{run_event_loop, RawModeGuard, TerminalPanel, TerminalRenderer};
use console_bridge_core::color::{to_surface_color, Color};
use console_bridge_core::config::{self, ConsoleConfig};
use console_bridge_core::control::{ControlOptions, InteractiveControl};
use console_bridge_core::controller::TextSurfaceController;
use console_bridge_core::engine::shell::ShellEngine;
use console_bridge_core::engine::Engine;
use console_bridge_core::error::{Error, Result};
use console_bridge_core::session::SessionOptions;
use console_bridge_core::status::{MessageSink, ProgressSink, StatusSink};
use console_bridge_core::surface::{Surface, SurfaceBuffer};

const WINDOW_TITLE: &str = "Console Bridge";

fn init_logging(log_file: Option<&str>) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(path) = log_file {
        let file = File::create(path)
            .map_err(|e| Error::io_error("log".to_string(), path.to_string(), e))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

/// Loads the config file and applies command-line overrides.
fn initialize_config(args: &Args) -> Result<ConsoleConfig> {
    let config_path = config::get_config_path(&args.config_path);
    debug!("Config path: `{}`", config_path);

    let mut console_config = config::load_config(&config_path)?;
    if let Some(delay) = args.delay {
        console_config.print_delay_ms = delay;
    }
    if let Some(shell) = &args.shell {
        console_config.shell = Some(shell.clone());
    }
    Ok(console_config)
}

fn initial_command(args: &Args) -> Result<String> {
    match &args.command_or_script {
        Some(command_or_script) => {
            let parameters = script::parse_parameters(&args.parameters)?;
            script::build_command(command_or_script, &parameters)
        }
        None => Ok(String::new()),
    }
}

fn control_options(console_config: &ConsoleConfig) -> ControlOptions {
    ControlOptions {
        banner: console_config.banner,
        host_name: console_config.host_name.clone(),
        input_poll_interval: console_config.poll_interval(),
        session: SessionOptions {
            poll_interval: console_config.poll_interval(),
            profile: console_config.profile.clone(),
        },
    }
}

fn execute() -> Result<i32> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    let console_config = initialize_config(&args)?;
    let command = initial_command(&args)?;
    let text_color = to_surface_color(console_config.text_color);

    let (width, height) = terminal::size()?;
    let visible = Arc::new(AtomicBool::new(true));
    let panel = Arc::new(TerminalPanel::new(WINDOW_TITLE));

    let raw_mode_guard = RawModeGuard::enter()?;

    let surface = Surface::spawn(
        SurfaceBuffer::new(width, height, text_color, Color::BLACK),
        Box::new(TerminalRenderer::new(stdout(), visible.clone())),
    )?;

    let controller = Arc::new(TextSurfaceController::new(surface.handle())?);
    controller.set_print_delay(console_config.print_delay());
    controller.set_text_color(text_color);
    controller.set_status_vocabulary(console_config.status_vocabulary());
    let status_sink: Arc<dyn StatusSink> = panel.clone();
    let progress_sink: Arc<dyn ProgressSink> = panel.clone();
    controller.set_status_sink(Some(status_sink));
    controller.set_progress_sink(Some(progress_sink));
    controller.set_window_title(WINDOW_TITLE)?;

    let engine: Arc<dyn Engine> = Arc::new(ShellEngine::new(console_config.shell()));
    info!("Using shell {}", console_config.shell());

    let message_sink: Arc<dyn MessageSink> = panel.clone();
    let control = InteractiveControl::new(controller, engine, control_options(&console_config))
        .with_message_sink(message_sink);
    let events = control.subscribe_events();

    control.write_banner()?;
    control.execute_asynchronously(&command)?;
    let exit_code = run_event_loop(&control, &events, &visible)?;
    control.join();

    surface.shutdown();
    drop(raw_mode_guard);

    for message in panel.take_errors() {
        eprintln!("{message}");
    }
    Ok(exit_code)
}

fn main() -> ExitCode {
    match execute() {
        Ok(exit_code) => ExitCode::from(u8::try_from(exit_code).unwrap_or(1)),
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
