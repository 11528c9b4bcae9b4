//! Session and control behavior against a scripted engine.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{wait_until, Console, FakeEngine, RecordingMessages, POLL};
use console_bridge_core::control::{ControlEvent, ControlOptions, InteractiveControl};
use console_bridge_core::error::Error;
use console_bridge_core::keys::KeyInput;
use console_bridge_core::session::{InteractiveSession, SessionOptions, SessionPhase};
use console_bridge_core::status::MessageSink;

fn options() -> SessionOptions {
    SessionOptions {
        poll_interval: POLL,
        profile: Vec::new(),
    }
}

fn session(console: &Console, engine: &FakeEngine) -> InteractiveSession {
    InteractiveSession::new(engine, console.host(), None, options()).unwrap()
}

#[test]
fn test_execute_writes_output_then_prompt() {
    let console = Console::new();
    let engine = FakeEngine::new();
    let session = session(&console, &engine);

    session.execute("hello").unwrap();

    assert_eq!(console.text(), "ran hello\nPS>");
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert!(!session.has_current_handle());
    assert_eq!(*engine.calls.disposed.lock().unwrap(), 1);
}

#[test]
fn test_blank_command_is_ignored() {
    let console = Console::new();
    let engine = FakeEngine::new();
    let session = session(&console, &engine);

    session.execute("   ").unwrap();

    assert_eq!(console.text(), "");
    assert!(engine.calls.scripts.lock().unwrap().is_empty());
}

#[test]
fn test_runtime_fault_is_formatted_by_the_engine() {
    let console = Console::new();
    let engine = FakeEngine::new();
    let session = session(&console, &engine);

    session.execute("fail").unwrap();

    assert_eq!(console.text(), "formatted: it broke\nPS>");
    // The failed command and the formatting pipeline are both disposed.
    assert_eq!(*engine.calls.disposed.lock().unwrap(), 2);
}

#[test]
fn test_marker_appears_once_after_many_commands() {
    let console = Console::new();
    let engine = FakeEngine::new();
    let session = session(&console, &engine);

    for command in ["one", "two", "three"] {
        session.execute(command).unwrap();
    }

    let text = console.text();
    assert_eq!(text.matches("PS>").count(), 1);
    assert!(text.ends_with("ran three\nPS>"));
}

#[test]
fn test_pushed_context_prompt_names_the_host() {
    let console = Console::new();
    let mut engine = FakeEngine::new();
    engine.remote_name = Some("server01".to_string());
    let session = session(&console, &engine);

    assert_eq!(session.prompt_marker(), "[server01] PS>");
}

#[test]
fn test_profile_runs_at_construction() {
    let console = Console::new();
    let engine = FakeEngine::new();
    let session_options = SessionOptions {
        profile: vec!["setup".to_string()],
        ..options()
    };

    let session = InteractiveSession::new(&engine, console.host(), None, session_options).unwrap();

    assert_eq!(*engine.calls.scripts.lock().unwrap(), vec!["setup".to_string()]);
    assert!(!session.has_current_handle());
    assert_eq!(console.text(), "ran setup\n");
}

#[test]
fn test_profile_failure_goes_to_message_sink() {
    let console = Console::new();
    let engine = FakeEngine::new();
    let messages = Arc::new(RecordingMessages::default());
    let sink: Arc<dyn MessageSink> = messages.clone();
    let session_options = SessionOptions {
        profile: vec!["fail".to_string()],
        ..options()
    };

    let session =
        InteractiveSession::new(&engine, console.host(), Some(sink), session_options).unwrap();

    let shown = messages.shown.lock().unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].1, "it broke");
    assert!(!session.has_current_handle());
    assert_eq!(*engine.calls.disposed.lock().unwrap(), 1);
}

#[test]
fn test_cancel_stops_running_command() {
    let console = Console::new();
    let engine = FakeEngine::new();
    let session = Arc::new(session(&console, &engine));

    let worker = {
        let session = session.clone();
        thread::spawn(move || session.execute("sleep"))
    };
    wait_until(|| engine.calls.sleeping.load(Ordering::SeqCst));
    assert_eq!(session.phase(), SessionPhase::Executing);

    session.cancel_current();
    worker.join().unwrap().unwrap();

    assert!(session.state().should_exit());
    assert!(!session.has_current_handle());
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert!(console.text().contains("The pipeline has been stopped."));
}

#[test]
fn test_cancel_without_running_command_requests_exit() {
    let console = Console::new();
    let engine = FakeEngine::new();
    let session = session(&console, &engine);

    session.cancel_current();

    assert!(session.state().should_exit());
    assert_eq!(session.phase(), SessionPhase::Idle);
}

#[test]
fn test_run_loop_executes_submitted_lines_until_exit() {
    let console = Console::new();
    let engine = FakeEngine::new();
    let session = Arc::new(session(&console, &engine));

    let runner = {
        let session = session.clone();
        thread::spawn(move || session.run())
    };

    console.wait_for(|text| text.ends_with("PS>"));
    console.type_text("hello\n");
    console.wait_for(|text| text.contains("ran hello\nPS>"));

    console.type_text("\n");
    console.wait_for(|text| text.ends_with("PS>"));

    console.type_text("exit 4\n");
    assert_eq!(runner.join().unwrap(), 4);
    assert_eq!(session.phase(), SessionPhase::Terminated);
    assert_eq!(
        *engine.calls.scripts.lock().unwrap(),
        vec!["hello".to_string(), "exit 4".to_string()]
    );
}

#[test]
fn test_ctrl_c_ends_run_loop() {
    let console = Console::new();
    let engine = FakeEngine::new();
    let session = Arc::new(session(&console, &engine));

    let runner = {
        let session = session.clone();
        thread::spawn(move || session.run())
    };

    console.wait_for(|text| text.ends_with("PS>"));
    console.type_text("sleep\n");
    wait_until(|| engine.calls.sleeping.load(Ordering::SeqCst));

    console.controller.on_ctrl_c();

    assert_eq!(runner.join().unwrap(), 0);
    assert!(session.state().should_exit());
    assert!(!session.has_current_handle());
}

fn control(console: &Console) -> InteractiveControl {
    let options = ControlOptions {
        input_poll_interval: POLL,
        session: options(),
        ..ControlOptions::default()
    };
    InteractiveControl::new(console.controller.clone(), Arc::new(FakeEngine::new()), options)
}

#[test]
fn test_control_runs_initial_command_then_loop() {
    let console = Console::new();
    let control = control(&console);
    let events = control.subscribe_events();

    control.write_banner().unwrap();
    control.execute_asynchronously("hello").unwrap();
    assert_eq!(
        events.recv_timeout(Duration::from_secs(5)).unwrap(),
        ControlEvent::CommandsDone
    );
    assert!(matches!(
        control.execute_asynchronously("again"),
        Err(Error::SessionActive)
    ));

    console.wait_for(|text| text.ends_with("ran hello\nPS>"));
    for ch in "exit 2".chars() {
        control.handle_key(KeyInput::Char(ch)).unwrap();
    }
    control.handle_key(KeyInput::Enter).unwrap();

    assert_eq!(
        events.recv_timeout(Duration::from_secs(5)).unwrap(),
        ControlEvent::Finished(2)
    );
    control.join();
    assert!(!control.is_running());
    assert!(console.text().starts_with("       Console Bridge Interactive Host\n"));
}

#[test]
fn test_control_backspace_only_erases_typed_input() {
    let console = Console::new();
    let control = control(&console);
    console.controller.write_delayed("PS>").unwrap();

    control.handle_key(KeyInput::Char('l')).unwrap();
    control.handle_key(KeyInput::Backspace).unwrap();
    control.handle_key(KeyInput::Backspace).unwrap();

    assert_eq!(console.text(), "PS>");
}

#[test]
fn test_control_routes_keys_to_pending_key_read() {
    let console = Console::new();
    let control = control(&console);
    let controller = console.controller.clone();

    let reader = thread::spawn(move || {
        controller.wait_for_key(&Default::default(), Duration::from_millis(2))
    });
    wait_until(|| console.controller.is_waiting_for_key());

    control.handle_key(KeyInput::Char('q')).unwrap();

    assert_eq!(reader.join().unwrap().unwrap(), 'q');
    assert_eq!(console.text(), "");
}

#[test]
fn test_control_visibility_toggle() {
    let console = Console::new();
    let control = control(&console);
    let events = control.subscribe_events();

    assert!(!control.toggle_visibility());
    assert!(control.toggle_visibility());

    assert_eq!(
        events.try_iter().collect::<Vec<_>>(),
        vec![
            ControlEvent::VisibilityChanged(false),
            ControlEvent::VisibilityChanged(true)
        ]
    );
}
