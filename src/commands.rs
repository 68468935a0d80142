//! argv -> action record. The subcommand grammar; global flags have already
//! been stripped by `flags::parse_flags`.

use serde_json::{json, Value};

use crate::flags::Flags;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    UnknownCommand { command: String },
    UnknownSubcommand { command: String, subcommand: String },
    MissingArguments { usage: String },
    InvalidValue { message: String },
}

impl ParseError {
    pub fn format(&self) -> String {
        match self {
            ParseError::UnknownCommand { command } => {
                format!("Unknown command '{}'. Run 'spel --help' for the list.", command)
            }
            ParseError::UnknownSubcommand { command, subcommand } => {
                format!(
                    "Unknown subcommand '{} {}'. Run 'spel {} --help'.",
                    command, subcommand, command
                )
            }
            ParseError::MissingArguments { usage } => format!("Missing arguments. Usage: {}", usage),
            ParseError::InvalidValue { message } => message.clone(),
        }
    }
}

fn missing(usage: &str) -> ParseError {
    ParseError::MissingArguments {
        usage: usage.to_string(),
    }
}

fn need<'a>(rest: &'a [&str], index: usize, usage: &str) -> Result<&'a str, ParseError> {
    rest.get(index).copied().ok_or_else(|| missing(usage))
}

/// Option flag scan inside a subcommand: `--flag value` or nothing.
fn opt_value<'a>(rest: &'a [&str], flag: &str) -> Option<&'a str> {
    rest.iter()
        .position(|&s| s == flag)
        .and_then(|i| rest.get(i + 1).copied())
}

fn has_flag(rest: &[&str], short: &str, long: &str) -> bool {
    rest.iter().any(|&s| s == short || s == long)
}

pub fn parse_command(args: &[String], _flags: &Flags) -> Result<Value, ParseError> {
    let command = args
        .first()
        .map(|s| s.as_str())
        .ok_or_else(|| missing("spel <command> ..."))?;
    let rest: Vec<&str> = args[1..].iter().map(|s| s.as_str()).collect();

    match command {
        // === Navigation ===
        "open" | "goto" | "navigate" => {
            let url = need(&rest, 0, "open <url>")?;
            let url = if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{}", url)
            };
            Ok(json!({ "action": "navigate", "url": url }))
        }
        "back" => Ok(json!({ "action": "back" })),
        "forward" => Ok(json!({ "action": "forward" })),
        "reload" => Ok(json!({ "action": "reload" })),
        "url" => Ok(json!({ "action": "url" })),
        "title" => Ok(json!({ "action": "title" })),
        "html" | "content" => Ok(json!({ "action": "content" })),

        // === Snapshot / annotate ===
        "snapshot" => {
            let mut cmd = json!({ "action": "snapshot" });
            let obj = cmd.as_object_mut().expect("object literal");
            let mut i = 0;
            while i < rest.len() {
                match rest[i] {
                    "-i" | "--interactive" => {
                        obj.insert("interactive".into(), json!(true));
                    }
                    "-C" | "--cursor" => {
                        obj.insert("cursor".into(), json!(true));
                    }
                    "-c" | "--compact" => {
                        obj.insert("compact".into(), json!(true));
                    }
                    "-d" | "--depth" => {
                        let value = need(&rest, i + 1, "snapshot -d <depth>")?;
                        let depth: i64 = value.parse().map_err(|_| ParseError::InvalidValue {
                            message: format!("Invalid depth '{}'", value),
                        })?;
                        obj.insert("maxDepth".into(), json!(depth));
                        i += 1;
                    }
                    "-s" | "--selector" => {
                        let value = need(&rest, i + 1, "snapshot -s <selector>")?;
                        obj.insert("selector".into(), json!(value));
                        i += 1;
                    }
                    other => {
                        return Err(ParseError::UnknownSubcommand {
                            command: "snapshot".into(),
                            subcommand: other.into(),
                        })
                    }
                }
                i += 1;
            }
            Ok(cmd)
        }
        "annotate" => {
            let mut cmd = json!({ "action": "annotate" });
            if rest.contains(&"--no-boxes") {
                cmd["boxes"] = json!(false);
            }
            if has_flag(&rest, "-D", "--dimensions") {
                cmd["dimensions"] = json!(true);
            }
            Ok(cmd)
        }
        "unannotate" => Ok(json!({ "action": "unannotate" })),

        // === Interaction ===
        "click" => Ok(json!({ "action": "click", "selector": need(&rest, 0, "click <selector>")? })),
        "dblclick" => {
            Ok(json!({ "action": "dblclick", "selector": need(&rest, 0, "dblclick <selector>")? }))
        }
        "fill" => {
            let selector = need(&rest, 0, "fill <selector> <value>")?;
            if rest.len() < 2 {
                return Err(missing("fill <selector> <value>"));
            }
            Ok(json!({ "action": "fill", "selector": selector, "value": rest[1..].join(" ") }))
        }
        "type" => {
            let selector = need(&rest, 0, "type <selector> <text>")?;
            if rest.len() < 2 {
                return Err(missing("type <selector> <text>"));
            }
            Ok(json!({ "action": "type", "selector": selector, "text": rest[1..].join(" ") }))
        }
        "press" | "key" => {
            let key = need(&rest, 0, "press <key> [selector]")?;
            let mut cmd = json!({ "action": "press", "key": key });
            if let Some(selector) = rest.get(1) {
                cmd["selector"] = json!(selector);
            }
            Ok(cmd)
        }
        "keydown" => Ok(json!({ "action": "keydown", "key": need(&rest, 0, "keydown <key>")? })),
        "keyup" => Ok(json!({ "action": "keyup", "key": need(&rest, 0, "keyup <key>")? })),
        "hover" => Ok(json!({ "action": "hover", "selector": need(&rest, 0, "hover <selector>")? })),
        "check" => Ok(json!({ "action": "check", "selector": need(&rest, 0, "check <selector>")? })),
        "uncheck" => {
            Ok(json!({ "action": "uncheck", "selector": need(&rest, 0, "uncheck <selector>")? }))
        }
        "select" => Ok(json!({
            "action": "select",
            "selector": need(&rest, 0, "select <selector> <value>")?,
            "value": need(&rest, 1, "select <selector> <value>")?,
        })),
        "focus" => Ok(json!({ "action": "focus", "selector": need(&rest, 0, "focus <selector>")? })),
        "clear" => Ok(json!({ "action": "clear", "selector": need(&rest, 0, "clear <selector>")? })),
        "drag" => Ok(json!({
            "action": "drag",
            "source": need(&rest, 0, "drag <source> <target>")?,
            "target": need(&rest, 1, "drag <source> <target>")?,
        })),
        "upload" => {
            let selector = need(&rest, 0, "upload <selector> <file>...")?;
            if rest.len() < 2 {
                return Err(missing("upload <selector> <file>..."));
            }
            Ok(json!({ "action": "upload", "selector": selector, "files": rest[1..].to_vec() }))
        }
        "scroll" => {
            let direction = rest.first().copied().unwrap_or("down");
            if !matches!(direction, "up" | "down" | "left" | "right") {
                return Err(ParseError::InvalidValue {
                    message: format!("Invalid scroll direction '{}'", direction),
                });
            }
            let amount = rest
                .get(1)
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(300);
            let mut cmd = json!({ "action": "scroll", "direction": direction, "amount": amount });
            if let Some(selector) = rest.get(2) {
                cmd["selector"] = json!(selector);
            }
            Ok(cmd)
        }
        "scrollintoview" | "scrollinto" => Ok(json!({
            "action": "scrollintoview",
            "selector": need(&rest, 0, "scrollintoview <selector>")?,
        })),
        "highlight" => Ok(json!({
            "action": "highlight",
            "selector": need(&rest, 0, "highlight <selector>")?,
        })),

        // === Mouse ===
        "mouse" => {
            let sub = need(&rest, 0, "mouse <move|down|up|wheel> ...")?;
            match sub {
                "move" => {
                    let x: f64 = need(&rest, 1, "mouse move <x> <y>")?
                        .parse()
                        .map_err(|_| ParseError::InvalidValue {
                            message: "mouse move coordinates must be numbers".into(),
                        })?;
                    let y: f64 = need(&rest, 2, "mouse move <x> <y>")?
                        .parse()
                        .map_err(|_| ParseError::InvalidValue {
                            message: "mouse move coordinates must be numbers".into(),
                        })?;
                    Ok(json!({ "action": "mouse_move", "x": x, "y": y }))
                }
                "down" => Ok(json!({
                    "action": "mouse_down",
                    "button": rest.get(1).copied().unwrap_or("left"),
                })),
                "up" => Ok(json!({
                    "action": "mouse_up",
                    "button": rest.get(1).copied().unwrap_or("left"),
                })),
                "wheel" => {
                    let dy = rest.get(1).and_then(|s| s.parse::<f64>().ok()).unwrap_or(100.0);
                    let dx = rest.get(2).and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);
                    Ok(json!({ "action": "mouse_wheel", "deltaX": dx, "deltaY": dy }))
                }
                other => Err(ParseError::UnknownSubcommand {
                    command: "mouse".into(),
                    subcommand: other.into(),
                }),
            }
        }

        // === Capture ===
        "screenshot" => {
            let mut cmd = json!({ "action": "screenshot" });
            let mut i = 0;
            while i < rest.len() {
                match rest[i] {
                    "-f" | "--full" | "--full-page" => {
                        cmd["fullPage"] = json!(true);
                    }
                    "-s" | "--selector" => {
                        cmd["selector"] = json!(need(&rest, i + 1, "screenshot -s <selector>")?);
                        i += 1;
                    }
                    path if !path.starts_with('-') => {
                        cmd["path"] = json!(path);
                    }
                    other => {
                        return Err(ParseError::UnknownSubcommand {
                            command: "screenshot".into(),
                            subcommand: other.into(),
                        })
                    }
                }
                i += 1;
            }
            Ok(cmd)
        }
        "pdf" => {
            let mut cmd = json!({ "action": "pdf" });
            if let Some(path) = rest.first() {
                cmd["path"] = json!(path);
            }
            Ok(cmd)
        }

        // === JS ===
        "eval" | "evaluate" => {
            let encode = has_flag(&rest, "-b", "--encode");
            let script: Vec<&str> = rest
                .iter()
                .copied()
                .filter(|&s| s != "-b" && s != "--encode")
                .collect();
            if script.is_empty() {
                return Err(missing("eval <script>"));
            }
            let mut cmd = json!({ "action": "evaluate", "script": script.join(" ") });
            if encode {
                cmd["encode"] = json!(true);
            }
            Ok(cmd)
        }

        // === Getters ===
        "get" => {
            let sub = need(&rest, 0, "get <text|html|value|attr|count|box|url|title> ...")?;
            match sub {
                "text" => Ok(json!({
                    "action": "get_text",
                    "selector": need(&rest, 1, "get text <selector>")?,
                })),
                "html" => Ok(json!({
                    "action": "get_html",
                    "selector": need(&rest, 1, "get html <selector>")?,
                })),
                "value" => Ok(json!({
                    "action": "get_value",
                    "selector": need(&rest, 1, "get value <selector>")?,
                })),
                "attr" => Ok(json!({
                    "action": "get_attribute",
                    "selector": need(&rest, 1, "get attr <selector> <attribute>")?,
                    "attribute": need(&rest, 2, "get attr <selector> <attribute>")?,
                })),
                "count" => Ok(json!({
                    "action": "get_count",
                    "selector": need(&rest, 1, "get count <selector>")?,
                })),
                "box" => Ok(json!({
                    "action": "get_box",
                    "selector": need(&rest, 1, "get box <selector>")?,
                })),
                "url" => Ok(json!({ "action": "url" })),
                "title" => Ok(json!({ "action": "title" })),
                other => Err(ParseError::UnknownSubcommand {
                    command: "get".into(),
                    subcommand: other.into(),
                }),
            }
        }

        // === State checks ===
        "is" => {
            let sub = need(&rest, 0, "is <visible|enabled|checked> <selector>")?;
            let selector = need(&rest, 1, "is <visible|enabled|checked> <selector>")?;
            let action = match sub {
                "visible" => "is_visible",
                "enabled" => "is_enabled",
                "checked" => "is_checked",
                other => {
                    return Err(ParseError::UnknownSubcommand {
                        command: "is".into(),
                        subcommand: other.into(),
                    })
                }
            };
            Ok(json!({ "action": action, "selector": selector }))
        }

        // === Semantic find ===
        "find" => parse_find(&rest),

        // === Waits ===
        "wait" => parse_wait(&rest),

        // === Tabs ===
        "tab" => match rest.first().copied() {
            Some("new") => {
                let mut cmd = json!({ "action": "tab_new" });
                if let Some(url) = rest.get(1) {
                    cmd["url"] = json!(url);
                }
                Ok(cmd)
            }
            Some("list") | None => Ok(json!({ "action": "tab_list" })),
            Some("close") => {
                let mut cmd = json!({ "action": "tab_close" });
                if let Some(index) = rest.get(1).and_then(|s| s.parse::<i64>().ok()) {
                    cmd["index"] = json!(index);
                }
                Ok(cmd)
            }
            Some(n) if n.parse::<i64>().is_ok() => Ok(json!({
                "action": "tab_switch",
                "index": n.parse::<i64>().expect("checked above"),
            })),
            Some(other) => Err(ParseError::UnknownSubcommand {
                command: "tab".into(),
                subcommand: other.into(),
            }),
        },

        // === Settings ===
        "set" => parse_set(&rest),

        // === Cookies ===
        "cookies" => match rest.first().copied().unwrap_or("get") {
            "get" => Ok(json!({ "action": "cookies_get" })),
            "set" => Ok(json!({
                "action": "cookies_set",
                "cookies": [{
                    "name": need(&rest, 1, "cookies set <name> <value>")?,
                    "value": need(&rest, 2, "cookies set <name> <value>")?,
                }],
            })),
            "clear" => Ok(json!({ "action": "cookies_clear" })),
            other => Err(ParseError::UnknownSubcommand {
                command: "cookies".into(),
                subcommand: other.into(),
            }),
        },

        // === Web storage ===
        "storage" => {
            let kind = need(&rest, 0, "storage <local|session> [get|set|clear] ...")?;
            if kind != "local" && kind != "session" {
                return Err(ParseError::UnknownSubcommand {
                    command: "storage".into(),
                    subcommand: kind.into(),
                });
            }
            match rest.get(1).copied().unwrap_or("get") {
                "get" => {
                    let mut cmd = json!({ "action": "storage_get", "type": kind });
                    if let Some(key) = rest.get(2) {
                        cmd["key"] = json!(key);
                    }
                    Ok(cmd)
                }
                "set" => Ok(json!({
                    "action": "storage_set",
                    "type": kind,
                    "key": need(&rest, 2, "storage <type> set <key> <value>")?,
                    "value": need(&rest, 3, "storage <type> set <key> <value>")?,
                })),
                "clear" => Ok(json!({ "action": "storage_clear", "type": kind })),
                other => Err(ParseError::UnknownSubcommand {
                    command: "storage".into(),
                    subcommand: other.into(),
                }),
            }
        }

        // === Network ===
        "network" => parse_network(&rest),

        // === Frames ===
        "frame" => match rest.first().copied() {
            Some("list") | None => Ok(json!({ "action": "frame_list" })),
            Some(name) => Ok(json!({ "action": "frame_switch", "name": name })),
        },
        "frames" => Ok(json!({ "action": "frame_list" })),

        // === Dialogs ===
        "dialog" => match rest.first().copied() {
            Some("accept") => {
                let mut cmd = json!({ "action": "dialog_accept" });
                if rest.len() > 1 {
                    cmd["promptText"] = json!(rest[1..].join(" "));
                }
                Ok(cmd)
            }
            Some("dismiss") => Ok(json!({ "action": "dialog_dismiss" })),
            _ => Err(missing("dialog <accept [text]|dismiss>")),
        },

        // === Trace / logs ===
        "trace" => match rest.first().copied() {
            Some("start") => Ok(json!({ "action": "trace_start" })),
            Some("stop") => {
                let mut cmd = json!({ "action": "trace_stop" });
                if let Some(path) = rest.get(1) {
                    cmd["path"] = json!(path);
                }
                Ok(cmd)
            }
            _ => Err(missing("trace <start|stop [path]>")),
        },
        "console" => match rest.first().copied() {
            Some("--clear") | Some("clear") => Ok(json!({ "action": "console_clear" })),
            Some("--start") | Some("start") => Ok(json!({ "action": "console_start" })),
            None => Ok(json!({ "action": "console_get" })),
            Some(other) => Err(ParseError::UnknownSubcommand {
                command: "console".into(),
                subcommand: other.into(),
            }),
        },
        "errors" => match rest.first().copied() {
            Some("--clear") | Some("clear") => Ok(json!({ "action": "errors_clear" })),
            Some("--start") | Some("start") => Ok(json!({ "action": "errors_start" })),
            None => Ok(json!({ "action": "errors_get" })),
            Some(other) => Err(ParseError::UnknownSubcommand {
                command: "errors".into(),
                subcommand: other.into(),
            }),
        },

        // === Storage-state files ===
        "state" => parse_state(&rest),

        // === Session / connect / close ===
        "session" => match rest.first().copied() {
            Some("info") => Ok(json!({ "action": "session_info" })),
            Some("list") | None => Ok(json!({ "action": "session_list" })),
            Some(other) => Err(ParseError::UnknownSubcommand {
                command: "session".into(),
                subcommand: other.into(),
            }),
        },
        "connect" => Ok(json!({
            "action": "connect",
            "endpoint": need(&rest, 0, "connect <endpoint>")?,
        })),
        "close" | "quit" | "exit" => Ok(json!({ "action": "close" })),

        other => Err(ParseError::UnknownCommand {
            command: other.to_string(),
        }),
    }
}

fn parse_find(rest: &[&str]) -> Result<Value, ParseError> {
    const USAGE: &str =
        "find <role|text|label|placeholder|alt|title|testid|first|last|nth> <value> [action] [value]";
    let by = need(rest, 0, USAGE)?;

    let name = opt_value(rest, "--name");
    let exact = rest.iter().any(|&s| s == "--exact");
    // Positional args with option flags stripped.
    let positional: Vec<&str> = {
        let mut out = Vec::new();
        let mut i = 1;
        while i < rest.len() {
            match rest[i] {
                "--name" => i += 1,
                "--exact" => {}
                other => out.push(other),
            }
            i += 1;
        }
        out
    };

    let mut cmd = json!({ "action": "find", "by": by, "exact": exact });
    if let Some(name) = name {
        cmd["name"] = json!(name);
    }

    match by {
        "nth" => {
            let index: i64 = positional
                .first()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| missing("find nth <index> <selector> [action] [value]"))?;
            let selector = positional
                .get(1)
                .ok_or_else(|| missing("find nth <index> <selector> [action] [value]"))?;
            cmd["index"] = json!(index);
            cmd["value"] = json!(selector);
            if let Some(action) = positional.get(2) {
                cmd["find_action"] = json!(action);
            }
            if positional.len() > 3 {
                cmd["find_value"] = json!(positional[3..].join(" "));
            }
        }
        "role" | "text" | "label" | "placeholder" | "alt" | "title" | "testid" | "first"
        | "last" => {
            let value = positional.first().ok_or_else(|| missing(USAGE))?;
            cmd["value"] = json!(value);
            if let Some(action) = positional.get(1) {
                cmd["find_action"] = json!(action);
            }
            if positional.len() > 2 {
                cmd["find_value"] = json!(positional[2..].join(" "));
            }
        }
        other => {
            return Err(ParseError::UnknownSubcommand {
                command: "find".into(),
                subcommand: other.into(),
            })
        }
    }
    Ok(cmd)
}

fn parse_wait(rest: &[&str]) -> Result<Value, ParseError> {
    const USAGE: &str = "wait <selector|ms> | wait --text T | --url U | --fn JS | --state S";
    let mut cmd = json!({ "action": "wait" });

    if let Some(text) = opt_value(rest, "--text") {
        cmd["text"] = json!(text);
    } else if let Some(url) = opt_value(rest, "--url") {
        cmd["url"] = json!(url);
    } else if let Some(function) = opt_value(rest, "--fn") {
        cmd["function"] = json!(function);
    } else if let Some(state) = opt_value(rest, "--state") {
        cmd["state"] = json!(state);
    } else {
        let arg = need(rest, 0, USAGE)?;
        if let Ok(ms) = arg.parse::<u64>() {
            cmd["timeout"] = json!(ms);
        } else {
            cmd["selector"] = json!(arg);
        }
    }
    if let Some(timeout) = opt_value(rest, "--timeout").and_then(|v| v.parse::<u64>().ok()) {
        cmd["waitTimeout"] = json!(timeout);
    }
    Ok(cmd)
}

fn parse_set(rest: &[&str]) -> Result<Value, ParseError> {
    let sub = need(
        rest,
        0,
        "set <viewport|device|geo|offline|headers|media|credentials> ...",
    )?;
    match sub {
        "viewport" => {
            let width: i64 = need(rest, 1, "set viewport <width> <height>")?
                .parse()
                .map_err(|_| ParseError::InvalidValue {
                    message: "viewport dimensions must be integers".into(),
                })?;
            let height: i64 = need(rest, 2, "set viewport <width> <height>")?
                .parse()
                .map_err(|_| ParseError::InvalidValue {
                    message: "viewport dimensions must be integers".into(),
                })?;
            Ok(json!({ "action": "set_viewport", "width": width, "height": height }))
        }
        "device" => {
            if rest.len() < 2 {
                return Err(missing("set device <name>"));
            }
            Ok(json!({ "action": "set_device", "device": rest[1..].join(" ") }))
        }
        "geo" | "geolocation" => {
            let latitude: f64 = need(rest, 1, "set geo <lat> <lng>")?
                .parse()
                .map_err(|_| ParseError::InvalidValue {
                    message: "coordinates must be numbers".into(),
                })?;
            let longitude: f64 = need(rest, 2, "set geo <lat> <lng>")?
                .parse()
                .map_err(|_| ParseError::InvalidValue {
                    message: "coordinates must be numbers".into(),
                })?;
            Ok(json!({ "action": "set_geo", "latitude": latitude, "longitude": longitude }))
        }
        "offline" => {
            let offline = rest
                .get(1)
                .map(|&s| s != "off" && s != "false")
                .unwrap_or(true);
            Ok(json!({ "action": "set_offline", "offline": offline }))
        }
        "headers" => Ok(json!({
            "action": "set_headers",
            "headers": need(rest, 1, "set headers <json>")?,
        })),
        "media" => {
            let color = if rest.contains(&"dark") {
                Some("dark")
            } else if rest.contains(&"light") {
                Some("light")
            } else {
                None
            };
            let reduced = rest.contains(&"reduced-motion");
            let mut cmd = json!({ "action": "set_media", "reducedMotion": reduced });
            if let Some(color) = color {
                cmd["colorScheme"] = json!(color);
            }
            Ok(cmd)
        }
        "credentials" | "auth" => Ok(json!({
            "action": "set_credentials",
            "username": need(rest, 1, "set credentials <username> <password>")?,
            "password": need(rest, 2, "set credentials <username> <password>")?,
        })),
        other => Err(ParseError::UnknownSubcommand {
            command: "set".into(),
            subcommand: other.into(),
        }),
    }
}

fn parse_network(rest: &[&str]) -> Result<Value, ParseError> {
    let sub = need(rest, 0, "network <route|unroute|requests|clear> ...")?;
    match sub {
        "route" => {
            let url = need(rest, 1, "network route <pattern> [--abort|--body B]")?;
            let mut cmd = json!({ "action": "network_route", "url": url });
            if rest.contains(&"--abort") {
                cmd["abort"] = json!(true);
            }
            if let Some(body) = opt_value(rest, "--body") {
                cmd["body"] = json!(body);
            }
            if let Some(status) = opt_value(rest, "--status").and_then(|s| s.parse::<i64>().ok()) {
                cmd["status"] = json!(status);
            }
            if let Some(content_type) = opt_value(rest, "--content-type") {
                cmd["contentType"] = json!(content_type);
            }
            Ok(cmd)
        }
        "unroute" => {
            let mut cmd = json!({ "action": "network_unroute" });
            if let Some(url) = rest.get(1).filter(|s| !s.starts_with('-')) {
                cmd["url"] = json!(url);
            }
            Ok(cmd)
        }
        "requests" => {
            let mut cmd = json!({ "action": "network_requests" });
            if let Some(filter) = opt_value(rest, "--filter") {
                cmd["filter"] = json!(filter);
            }
            if let Some(kind) = opt_value(rest, "--type") {
                cmd["type"] = json!(kind);
            }
            if let Some(method) = opt_value(rest, "--method") {
                cmd["method"] = json!(method);
            }
            if let Some(status) = opt_value(rest, "--status") {
                cmd["status"] = json!(status);
            }
            Ok(cmd)
        }
        "clear" => Ok(json!({ "action": "network_clear" })),
        other => Err(ParseError::UnknownSubcommand {
            command: "network".into(),
            subcommand: other.into(),
        }),
    }
}

fn parse_state(rest: &[&str]) -> Result<Value, ParseError> {
    let sub = need(rest, 0, "state <save|load|list|show|rename|clear|clean> ...")?;
    match sub {
        "save" => {
            let mut cmd = json!({ "action": "state_save" });
            if let Some(name) = rest.get(1) {
                cmd["name"] = json!(name);
            }
            Ok(cmd)
        }
        "load" => {
            let mut cmd = json!({ "action": "state_load" });
            if let Some(name) = rest.get(1) {
                cmd["name"] = json!(name);
            }
            Ok(cmd)
        }
        "list" => Ok(json!({ "action": "state_list" })),
        "show" => Ok(json!({
            "action": "state_show",
            "name": need(rest, 1, "state show <name>")?,
        })),
        "rename" => Ok(json!({
            "action": "state_rename",
            "oldName": need(rest, 1, "state rename <old> <new>")?,
            "newName": need(rest, 2, "state rename <old> <new>")?,
        })),
        "clear" => {
            let mut cmd = json!({ "action": "state_clear" });
            if let Some(name) = rest.get(1) {
                cmd["name"] = json!(name);
            }
            Ok(cmd)
        }
        "clean" => {
            let mut cmd = json!({ "action": "state_clean" });
            if let Some(days) = opt_value(rest, "--days").and_then(|v| v.parse::<i64>().ok()) {
                cmd["days"] = json!(days);
            }
            Ok(cmd)
        }
        other => Err(ParseError::UnknownSubcommand {
            command: "state".into(),
            subcommand: other.into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Value, ParseError> {
        let args: Vec<String> = s.split_whitespace().map(String::from).collect();
        parse_command(&args, &Flags::default())
    }

    fn ok(s: &str) -> Value {
        parse(s).unwrap()
    }

    // === Navigation ===

    #[test]
    fn test_navigate_with_https() {
        let cmd = ok("open https://example.com");
        assert_eq!(cmd["action"], "navigate");
        assert_eq!(cmd["url"], "https://example.com");
    }

    #[test]
    fn test_navigate_without_protocol() {
        let cmd = ok("open example.com");
        assert_eq!(cmd["url"], "https://example.com");
    }

    #[test]
    fn test_navigate_aliases() {
        assert_eq!(ok("goto x.dev")["action"], "navigate");
        assert_eq!(ok("navigate x.dev")["action"], "navigate");
    }

    #[test]
    fn test_back_forward_reload() {
        assert_eq!(ok("back")["action"], "back");
        assert_eq!(ok("forward")["action"], "forward");
        assert_eq!(ok("reload")["action"], "reload");
    }

    // === Snapshot ===

    #[test]
    fn test_snapshot_plain() {
        assert_eq!(ok("snapshot")["action"], "snapshot");
    }

    #[test]
    fn test_snapshot_filters() {
        let cmd = ok("snapshot -i -c -C -d 3 -s #main");
        assert_eq!(cmd["interactive"], true);
        assert_eq!(cmd["compact"], true);
        assert_eq!(cmd["cursor"], true);
        assert_eq!(cmd["maxDepth"], 3);
        assert_eq!(cmd["selector"], "#main");
    }

    #[test]
    fn test_snapshot_bad_depth() {
        assert!(matches!(
            parse("snapshot -d abc"),
            Err(ParseError::InvalidValue { .. })
        ));
    }

    // === Interaction ===

    #[test]
    fn test_click_ref() {
        let cmd = ok("click @e5");
        assert_eq!(cmd["action"], "click");
        assert_eq!(cmd["selector"], "@e5");
    }

    #[test]
    fn test_fill_joins_value() {
        let cmd = ok("fill #input hello world");
        assert_eq!(cmd["action"], "fill");
        assert_eq!(cmd["value"], "hello world");
    }

    #[test]
    fn test_fill_missing_value() {
        assert!(matches!(
            parse("fill #input"),
            Err(ParseError::MissingArguments { .. })
        ));
    }

    #[test]
    fn test_press_page_and_element() {
        let page_level = ok("press Enter");
        assert_eq!(page_level["action"], "press");
        assert!(page_level.get("selector").is_none());
        let element_level = ok("press Enter @e3");
        assert_eq!(element_level["selector"], "@e3");
    }

    #[test]
    fn test_upload() {
        let cmd = ok("upload #file /tmp/a.txt /tmp/b.txt");
        assert_eq!(cmd["files"][1], "/tmp/b.txt");
    }

    #[test]
    fn test_scroll_defaults() {
        let cmd = ok("scroll");
        assert_eq!(cmd["direction"], "down");
        assert_eq!(cmd["amount"], 300);
    }

    #[test]
    fn test_scroll_invalid_direction() {
        assert!(matches!(
            parse("scroll sideways"),
            Err(ParseError::InvalidValue { .. })
        ));
    }

    // === Mouse ===

    #[test]
    fn test_mouse_move() {
        let cmd = ok("mouse move 100 200");
        assert_eq!(cmd["action"], "mouse_move");
        assert_eq!(cmd["x"], 100.0);
        assert_eq!(cmd["y"], 200.0);
    }

    #[test]
    fn test_mouse_wheel_defaults() {
        let cmd = ok("mouse wheel");
        assert_eq!(cmd["deltaY"], 100.0);
    }

    // === Capture ===

    #[test]
    fn test_screenshot_with_path_and_full() {
        let cmd = ok("screenshot /tmp/out.png -f");
        assert_eq!(cmd["path"], "/tmp/out.png");
        assert_eq!(cmd["fullPage"], true);
    }

    #[test]
    fn test_pdf() {
        assert_eq!(ok("pdf /tmp/out.pdf")["path"], "/tmp/out.pdf");
    }

    // === Getters ===

    #[test]
    fn test_get_text() {
        let cmd = ok("get text @e4");
        assert_eq!(cmd["action"], "get_text");
        assert_eq!(cmd["selector"], "@e4");
    }

    #[test]
    fn test_get_attr() {
        let cmd = ok("get attr #link href");
        assert_eq!(cmd["action"], "get_attribute");
        assert_eq!(cmd["attribute"], "href");
    }

    #[test]
    fn test_is_checks() {
        assert_eq!(ok("is visible #x")["action"], "is_visible");
        assert_eq!(ok("is enabled #x")["action"], "is_enabled");
        assert_eq!(ok("is checked #x")["action"], "is_checked");
    }

    // === Find ===

    #[test]
    fn test_find_role_with_name() {
        let cmd = ok("find role button click --name Submit --exact");
        assert_eq!(cmd["action"], "find");
        assert_eq!(cmd["by"], "role");
        assert_eq!(cmd["value"], "button");
        assert_eq!(cmd["find_action"], "click");
        assert_eq!(cmd["name"], "Submit");
        assert_eq!(cmd["exact"], true);
    }

    #[test]
    fn test_find_fill_value() {
        let cmd = ok("find label Email fill user@x.dev");
        assert_eq!(cmd["by"], "label");
        assert_eq!(cmd["find_action"], "fill");
        assert_eq!(cmd["find_value"], "user@x.dev");
    }

    #[test]
    fn test_find_nth() {
        let cmd = ok("find nth 2 .item click");
        assert_eq!(cmd["by"], "nth");
        assert_eq!(cmd["index"], 2);
        assert_eq!(cmd["value"], ".item");
        assert_eq!(cmd["find_action"], "click");
    }

    // === Wait ===

    #[test]
    fn test_wait_ms() {
        assert_eq!(ok("wait 500")["timeout"], 500);
    }

    #[test]
    fn test_wait_selector() {
        assert_eq!(ok("wait #spinner")["selector"], "#spinner");
    }

    #[test]
    fn test_wait_url_with_timeout() {
        let cmd = ok("wait --url **/done --timeout 5000");
        assert_eq!(cmd["url"], "**/done");
        assert_eq!(cmd["waitTimeout"], 5000);
    }

    // === Tabs ===

    #[test]
    fn test_tab_forms() {
        assert_eq!(ok("tab new")["action"], "tab_new");
        assert_eq!(ok("tab list")["action"], "tab_list");
        assert_eq!(ok("tab 2")["action"], "tab_switch");
        assert_eq!(ok("tab close")["action"], "tab_close");
    }

    // === Settings ===

    #[test]
    fn test_set_viewport() {
        let cmd = ok("set viewport 1920 1080");
        assert_eq!(cmd["width"], 1920);
        assert_eq!(cmd["height"], 1080);
    }

    #[test]
    fn test_set_device_multiword() {
        assert_eq!(ok("set device iPhone 13")["device"], "iPhone 13");
    }

    #[test]
    fn test_set_media_dark_reduced() {
        let cmd = ok("set media dark reduced-motion");
        assert_eq!(cmd["colorScheme"], "dark");
        assert_eq!(cmd["reducedMotion"], true);
    }

    // === Cookies / storage ===

    #[test]
    fn test_cookies_set() {
        let cmd = ok("cookies set token abc");
        assert_eq!(cmd["cookies"][0]["name"], "token");
        assert_eq!(cmd["cookies"][0]["value"], "abc");
    }

    #[test]
    fn test_cookies_set_missing_value() {
        assert!(matches!(
            parse("cookies set token"),
            Err(ParseError::MissingArguments { .. })
        ));
    }

    #[test]
    fn test_storage_local_set() {
        let cmd = ok("storage local set theme dark");
        assert_eq!(cmd["action"], "storage_set");
        assert_eq!(cmd["type"], "local");
        assert_eq!(cmd["key"], "theme");
        assert_eq!(cmd["value"], "dark");
    }

    #[test]
    fn test_storage_invalid_type() {
        assert!(matches!(
            parse("storage global get"),
            Err(ParseError::UnknownSubcommand { .. })
        ));
    }

    // === Network ===

    #[test]
    fn test_network_route_abort() {
        let cmd = ok("network route **/ads/** --abort");
        assert_eq!(cmd["action"], "network_route");
        assert_eq!(cmd["url"], "**/ads/**");
        assert_eq!(cmd["abort"], true);
    }

    #[test]
    fn test_network_route_fulfill() {
        let cmd = ok("network route **/api/** --body {} --status 418");
        assert_eq!(cmd["body"], "{}");
        assert_eq!(cmd["status"], 418);
    }

    #[test]
    fn test_network_requests_filters() {
        let cmd = ok("network requests --filter api --method POST --status 4");
        assert_eq!(cmd["filter"], "api");
        assert_eq!(cmd["method"], "POST");
        assert_eq!(cmd["status"], "4");
    }

    // === Frames / dialog / trace ===

    #[test]
    fn test_frame_switch_and_list() {
        assert_eq!(ok("frame checkout")["action"], "frame_switch");
        assert_eq!(ok("frame list")["action"], "frame_list");
        assert_eq!(ok("frame main")["name"], "main");
    }

    #[test]
    fn test_dialog() {
        let cmd = ok("dialog accept yes please");
        assert_eq!(cmd["action"], "dialog_accept");
        assert_eq!(cmd["promptText"], "yes please");
        assert_eq!(ok("dialog dismiss")["action"], "dialog_dismiss");
    }

    #[test]
    fn test_trace() {
        assert_eq!(ok("trace start")["action"], "trace_start");
        assert_eq!(ok("trace stop /tmp/t.zip")["path"], "/tmp/t.zip");
    }

    // === State ===

    #[test]
    fn test_state_forms() {
        assert_eq!(ok("state save auth")["name"], "auth");
        assert_eq!(ok("state load auth")["action"], "state_load");
        assert_eq!(ok("state list")["action"], "state_list");
        assert_eq!(ok("state rename a b")["newName"], "b");
        assert_eq!(ok("state clean --days 30")["days"], 30);
    }

    // === Close / unknown ===

    #[test]
    fn test_close_aliases() {
        assert_eq!(ok("close")["action"], "close");
        assert_eq!(ok("quit")["action"], "close");
        assert_eq!(ok("exit")["action"], "close");
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            parse("teleport"),
            Err(ParseError::UnknownCommand { .. })
        ));
    }

    #[test]
    fn test_empty_args() {
        assert!(parse("").is_err());
    }
}
