use std::env;
use std::io::IsTerminal;
use std::sync::OnceLock;

static COLOR_ENABLED: OnceLock<bool> = OnceLock::new();

/// Colors are on only when stdout is a tty and NO_COLOR is unset.
fn enabled() -> bool {
    *COLOR_ENABLED.get_or_init(|| {
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        std::io::stdout().is_terminal()
    })
}

fn wrap(code: &str, s: &str) -> String {
    if enabled() {
        format!("\x1b[{}m{}\x1b[0m", code, s)
    } else {
        s.to_string()
    }
}

pub fn bold(s: &str) -> String {
    wrap("1", s)
}

pub fn dim(s: &str) -> String {
    wrap("2", s)
}

pub fn red(s: &str) -> String {
    wrap("31", s)
}

pub fn green(s: &str) -> String {
    wrap("32", s)
}

pub fn yellow(s: &str) -> String {
    wrap("33", s)
}

pub fn cyan(s: &str) -> String {
    wrap("36", s)
}

pub fn success_indicator() -> String {
    green("✓")
}

pub fn error_indicator() -> String {
    red("✗")
}

pub fn warning_indicator() -> String {
    yellow("!")
}

/// Prefix for a console message line, colored by level.
pub fn console_level_prefix(level: &str) -> String {
    match level {
        "error" => red("[error]"),
        "warning" | "warn" => yellow("[warn]"),
        "info" => cyan("[info]"),
        "debug" => dim("[debug]"),
        _ => dim("[log]"),
    }
}
