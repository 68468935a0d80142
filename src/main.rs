use std::env;
use std::process::exit;

use spel::commands::{parse_command, ParseError};
use spel::connection::{ensure_daemon, send_command};
use spel::flags::parse_flags;
use spel::output::{print_response_with_opts, OutputOptions};
use spel::{color, daemon, help, session};

/// Hidden entry the client spawns itself with: `spel daemon --session <name>
/// [--headed]`. Stdout/stderr already point at the session log-file.
fn run_daemon_mode(args: &[String]) -> ! {
    let mut session_name = "default".to_string();
    let mut headless = true;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--session" => {
                if let Some(name) = args.get(i + 1) {
                    session_name = name.clone();
                    i += 1;
                }
            }
            "--headed" => headless = false,
            _ => {}
        }
        i += 1;
    }
    match daemon::run(&session_name, headless) {
        Ok(()) => exit(0),
        Err(e) => {
            eprintln!("daemon error: {:#}", e);
            exit(1);
        }
    }
}

fn print_parse_error(error: &ParseError, json_mode: bool) -> ! {
    if json_mode {
        let kind = match error {
            ParseError::UnknownCommand { .. } => "unknown_command",
            ParseError::UnknownSubcommand { .. } => "unknown_subcommand",
            ParseError::MissingArguments { .. } => "missing_arguments",
            ParseError::InvalidValue { .. } => "invalid_value",
        };
        println!(
            r#"{{"success":false,"error":{},"type":"{}"}}"#,
            serde_json::to_string(&error.format()).unwrap_or_default(),
            kind
        );
    } else {
        eprintln!("{}", color::red(&error.format()));
    }
    exit(1);
}

fn print_client_error(message: &str, json_mode: bool) -> ! {
    if json_mode {
        println!(
            r#"{{"success":false,"error":{}}}"#,
            serde_json::to_string(message).unwrap_or_default()
        );
    } else {
        eprintln!("{} {}", color::error_indicator(), message);
    }
    exit(1);
}

fn main() {
    // Default SIGPIPE disposition so piping into `head` doesn't panic.
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let args: Vec<String> = env::args().skip(1).collect();

    if args.first().map(|s| s.as_str()) == Some("daemon") {
        run_daemon_mode(&args[1..]);
    }

    let (flags, clean) = parse_flags(&args);

    let has_help = args.iter().any(|a| a == "--help" || a == "-h");
    let has_version = args.iter().any(|a| a == "--version" || a == "-V");

    if has_version {
        help::print_version();
        return;
    }
    if has_help {
        if let Some(command) = clean.first() {
            if help::print_command_help(command) {
                return;
            }
        }
        help::print_help();
        return;
    }
    if clean.is_empty() {
        help::print_help();
        return;
    }

    if !session::is_valid_session_name(&flags.session) {
        print_client_error(&session::session_name_error(&flags.session), flags.json);
    }
    if let Some(name) = &flags.session_name {
        if !session::is_valid_session_name(name) {
            print_client_error(&session::session_name_error(name), flags.json);
        }
    }

    // `session` and `session list` are answered from the filesystem; no
    // daemon gets spawned for them.
    if clean[0] == "session" {
        match clean.get(1).map(|s| s.as_str()) {
            None => {
                if flags.json {
                    println!(
                        r#"{{"success":true,"data":{{"session":{}}}}}"#,
                        serde_json::to_string(&flags.session).unwrap_or_default()
                    );
                } else {
                    println!("{}", flags.session);
                }
                return;
            }
            Some("list") => {
                let sessions = session::list_live_sessions();
                if flags.json {
                    println!(
                        r#"{{"success":true,"data":{{"sessions":{}}}}}"#,
                        serde_json::to_string(&sessions).unwrap_or_default()
                    );
                } else if sessions.is_empty() {
                    println!("No active sessions");
                } else {
                    println!("Active sessions:");
                    for name in &sessions {
                        let marker = if *name == flags.session {
                            color::cyan("→")
                        } else {
                            " ".to_string()
                        };
                        println!("{} {}", marker, name);
                    }
                }
                return;
            }
            _ => {}
        }
    }

    let cmd = match parse_command(&clean, &flags) {
        Ok(cmd) => cmd,
        Err(e) => print_parse_error(&e, flags.json),
    };
    let action = cmd.get("action").and_then(|v| v.as_str()).map(String::from);

    // Closing a session that has no daemon is a no-op, not a reason to
    // spawn one.
    if action.as_deref() == Some("close") && !session::daemon_running(&flags.session) {
        if flags.json {
            println!(r#"{{"success":true,"data":{{"closed":true}}}}"#);
        } else {
            println!("{} No daemon running", color::success_indicator());
        }
        return;
    }

    if let Err(e) = ensure_daemon(&flags) {
        print_client_error(&e.to_string(), flags.json);
    }

    let output_opts = OutputOptions {
        json: flags.json,
        content_boundaries: flags.content_boundaries,
        max_output: flags.max_output,
    };

    match send_command(&cmd, &flags) {
        Ok(resp) => {
            let success = resp.success;
            print_response_with_opts(&resp, action.as_deref(), &output_opts);
            if !success {
                exit(1);
            }
        }
        Err(e) => print_client_error(&e.to_string(), flags.json),
    }
}
