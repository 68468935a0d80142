//! Global flag extraction. Runs before subcommand parsing: known global
//! flags are pulled out (with `SPEL_*` env defaults), everything else is
//! left for the subcommand grammar.

use std::env;

use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Default)]
pub struct Flags {
    pub session: String,
    pub json: bool,
    /// Headed browser requested (`--interactive`). A running headless
    /// daemon gets restarted headed.
    pub interactive: bool,
    pub debug: bool,
    pub profile: Option<String>,
    pub headers: Option<String>,
    pub executable_path: Option<String>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub proxy_bypass: Option<String>,
    pub ignore_https_errors: bool,
    pub args: Option<String>,
    pub cdp: Option<String>,
    pub timeout_ms: Option<u64>,
    pub session_name: Option<String>,
    pub max_output: Option<usize>,
    pub content_boundaries: bool,
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_bool(name: &str) -> bool {
    env_var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

impl Flags {
    fn from_env() -> Self {
        Self {
            session: env_var("SPEL_SESSION").unwrap_or_else(|| "default".to_string()),
            json: env_bool("SPEL_JSON"),
            interactive: false,
            debug: env_bool("SPEL_DEBUG"),
            profile: env_var("SPEL_PROFILE"),
            headers: env_var("SPEL_HEADERS"),
            executable_path: env_var("SPEL_EXECUTABLE_PATH"),
            user_agent: env_var("SPEL_USER_AGENT"),
            proxy: env_var("SPEL_PROXY"),
            proxy_bypass: env_var("SPEL_PROXY_BYPASS"),
            ignore_https_errors: env_bool("SPEL_IGNORE_HTTPS_ERRORS"),
            args: env_var("SPEL_ARGS"),
            cdp: env_var("SPEL_CDP"),
            timeout_ms: env_var("SPEL_TIMEOUT").and_then(|v| v.parse().ok()),
            session_name: None,
            max_output: None,
            content_boundaries: false,
        }
    }

    /// Launch-time flags forwarded to the daemon as `_flags`. The daemon
    /// captures them on first use and extends them on later invocations.
    pub fn to_launch_flags(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let mut put = |key: &str, value: Option<&String>| {
            if let Some(v) = value {
                map.insert(key.to_string(), json!(v));
            }
        };
        put("profile", self.profile.as_ref());
        put("headers", self.headers.as_ref());
        put("executable_path", self.executable_path.as_ref());
        put("user_agent", self.user_agent.as_ref());
        put("proxy", self.proxy.as_ref());
        put("proxy_bypass", self.proxy_bypass.as_ref());
        put("args", self.args.as_ref());
        put("cdp", self.cdp.as_ref());
        put("session_name", self.session_name.as_ref());
        if self.ignore_https_errors {
            map.insert("ignore_https_errors".into(), json!(true));
        }
        if let Some(timeout) = self.timeout_ms {
            map.insert("timeout".into(), json!(timeout));
        }
        map
    }
}

/// Split argv into (global flags, remaining subcommand tokens). Both
/// `--flag value` and `--flag=value` forms are accepted; unknown tokens pass
/// through untouched for the subcommand grammar.
pub fn parse_flags(args: &[String]) -> (Flags, Vec<String>) {
    let mut flags = Flags::from_env();
    let mut clean = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let (name, inline_value) = match arg.split_once('=') {
            Some((n, v)) if n.starts_with("--") => (n, Some(v.to_string())),
            _ => (arg.as_str(), None),
        };
        let mut value = |i: &mut usize| -> Option<String> {
            if let Some(v) = inline_value.clone() {
                return Some(v);
            }
            if *i + 1 < args.len() {
                *i += 1;
                return Some(args[*i].clone());
            }
            None
        };

        match name {
            "--session" => {
                if let Some(v) = value(&mut i) {
                    flags.session = v;
                }
            }
            "--json" => flags.json = true,
            "--interactive" | "--headed" => flags.interactive = true,
            "--debug" => flags.debug = true,
            "--profile" => flags.profile = value(&mut i),
            "--headers" => flags.headers = value(&mut i),
            "--executable-path" => flags.executable_path = value(&mut i),
            "--user-agent" => flags.user_agent = value(&mut i),
            "--proxy" => flags.proxy = value(&mut i),
            "--proxy-bypass" => flags.proxy_bypass = value(&mut i),
            "--ignore-https-errors" => flags.ignore_https_errors = true,
            "--args" => flags.args = value(&mut i),
            "--cdp" => flags.cdp = value(&mut i),
            "--timeout" => flags.timeout_ms = value(&mut i).and_then(|v| v.parse().ok()),
            "--session-name" => flags.session_name = value(&mut i),
            "--max-output" => flags.max_output = value(&mut i).and_then(|v| v.parse().ok()),
            "--content-boundaries" => flags.content_boundaries = true,
            _ => clean.push(arg.clone()),
        }
        i += 1;
    }

    (flags, clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_defaults() {
        let (flags, clean) = parse_flags(&args("open example.com"));
        assert!(!flags.json);
        assert!(!flags.interactive);
        assert_eq!(clean, args("open example.com"));
    }

    #[test]
    fn test_space_form() {
        let (flags, clean) = parse_flags(&args("--session work open example.com"));
        assert_eq!(flags.session, "work");
        assert_eq!(clean, args("open example.com"));
    }

    #[test]
    fn test_equals_form() {
        let (flags, clean) = parse_flags(&args("--session=work --timeout=5000 url"));
        assert_eq!(flags.session, "work");
        assert_eq!(flags.timeout_ms, Some(5000));
        assert_eq!(clean, args("url"));
    }

    #[test]
    fn test_boolean_flags() {
        let (flags, _) = parse_flags(&args("--json --interactive --ignore-https-errors url"));
        assert!(flags.json);
        assert!(flags.interactive);
        assert!(flags.ignore_https_errors);
    }

    #[test]
    fn test_unknown_flags_pass_through() {
        let (_, clean) = parse_flags(&args("snapshot -i --depth 3"));
        assert_eq!(clean, args("snapshot -i --depth 3"));
    }

    #[test]
    fn test_launch_flags_map() {
        let (flags, _) = parse_flags(&args("--proxy http://p:8080 --session-name auth open x.dev"));
        let map = flags.to_launch_flags();
        assert_eq!(map.get("proxy").unwrap(), "http://p:8080");
        assert_eq!(map.get("session_name").unwrap(), "auth");
        assert!(!map.contains_key("profile"));
    }
}
