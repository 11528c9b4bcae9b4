//! Integration tests for console-bridge-cli
//!
//! These tests follow the path from parsed arguments to the command the
//! session runs first.

use std::io::Write;
use std::process::Command;

use clap::Parser;
use console_bridge_cli::cli_args::Args;
use console_bridge_cli::script::{build_command, parse_parameters};
use tempfile::NamedTempFile;

fn initial_command(args: &Args) -> String {
    let parameters = parse_parameters(&args.parameters).unwrap();
    build_command(args.command_or_script.as_deref().unwrap(), &parameters).unwrap()
}

#[test]
fn test_script_file_from_arguments() {
    let mut script = NamedTempFile::new().unwrap();
    writeln!(script, "echo \"$greeting, $name\"").unwrap();
    let path = script.path().to_str().unwrap().to_string();

    let args = Args::parse_from([
        "cb",
        path.as_str(),
        "-p",
        "greeting=Hello",
        "-p",
        "name=World",
    ]);

    assert_eq!(
        initial_command(&args),
        "greeting='Hello';\nname='World';\necho \"$greeting, $name\"\n"
    );
}

#[test]
fn test_shell_sees_parameter_values_literally() {
    let mut script = NamedTempFile::new().unwrap();
    writeln!(script, "printf '%s|%s|%s' \"$dir\" \"$name\" \"$quote\"").unwrap();
    let path = script.path().to_str().unwrap().to_string();

    let args = Args::parse_from([
        "cb",
        path.as_str(),
        "-p",
        r"dir=C:\temp\",
        "-p",
        "name=$(echo INJECTED)",
        "-p",
        "quote=it's",
    ]);
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(initial_command(&args))
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        r"C:\temp\|$(echo INJECTED)|it's"
    );
}

#[test]
fn test_command_text_from_arguments() {
    let args = Args::parse_from(["cb", "ls -la"]);

    assert_eq!(initial_command(&args), "ls -la");
}

#[test]
fn test_malformed_parameter_is_rejected() {
    let args = Args::parse_from(["cb", "ls", "-p", "oops"]);

    let error = parse_parameters(&args.parameters).unwrap_err();

    assert_eq!(
        error.to_string(),
        "Invalid argument: Parameter `oops` must be in the format key=value"
    );
}

#[test]
fn test_missing_script_path_runs_as_text() {
    let args = Args::parse_from(["cb", "/definitely/not/a/script.sh", "-p", "a=1"]);

    assert_eq!(initial_command(&args), "/definitely/not/a/script.sh");
}
