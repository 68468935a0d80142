//! Keyboard key descriptions for Input.dispatchKeyEvent.

pub struct KeyDescription {
    pub key: String,
    pub code: String,
    pub key_code: i64,
    pub text: Option<String>,
}

/// CDP modifier bitmask: Alt=1, Ctrl=2, Meta=4, Shift=8.
pub fn modifier_bit(name: &str) -> Option<i64> {
    match name {
        "Alt" => Some(1),
        "Control" | "Ctrl" => Some(2),
        "Meta" | "Cmd" | "Command" => Some(4),
        "Shift" => Some(8),
        _ => None,
    }
}

/// Split "Control+Shift+K" into (modifier mask, bare key).
pub fn split_combo(combo: &str) -> (i64, String) {
    let parts: Vec<&str> = combo.split('+').collect();
    if parts.len() < 2 {
        return (0, combo.to_string());
    }
    let mut modifiers = 0;
    for part in &parts[..parts.len() - 1] {
        if let Some(bit) = modifier_bit(part) {
            modifiers |= bit;
        }
    }
    (modifiers, parts[parts.len() - 1].to_string())
}

fn named(key: &str, code: &str, key_code: i64, text: Option<&str>) -> KeyDescription {
    KeyDescription {
        key: key.to_string(),
        code: code.to_string(),
        key_code,
        text: text.map(String::from),
    }
}

pub fn describe(key: &str) -> KeyDescription {
    match key {
        "Enter" | "Return" => named("Enter", "Enter", 13, Some("\r")),
        "Tab" => named("Tab", "Tab", 9, None),
        "Escape" | "Esc" => named("Escape", "Escape", 27, None),
        "Backspace" => named("Backspace", "Backspace", 8, None),
        "Delete" => named("Delete", "Delete", 46, None),
        "ArrowUp" | "Up" => named("ArrowUp", "ArrowUp", 38, None),
        "ArrowDown" | "Down" => named("ArrowDown", "ArrowDown", 40, None),
        "ArrowLeft" | "Left" => named("ArrowLeft", "ArrowLeft", 37, None),
        "ArrowRight" | "Right" => named("ArrowRight", "ArrowRight", 39, None),
        "Home" => named("Home", "Home", 36, None),
        "End" => named("End", "End", 35, None),
        "PageUp" => named("PageUp", "PageUp", 33, None),
        "PageDown" => named("PageDown", "PageDown", 34, None),
        "Space" | " " => named(" ", "Space", 32, Some(" ")),
        "Shift" => named("Shift", "ShiftLeft", 16, None),
        "Control" => named("Control", "ControlLeft", 17, None),
        "Alt" => named("Alt", "AltLeft", 18, None),
        "Meta" => named("Meta", "MetaLeft", 91, None),
        "F1" => named("F1", "F1", 112, None),
        "F2" => named("F2", "F2", 113, None),
        "F3" => named("F3", "F3", 114, None),
        "F4" => named("F4", "F4", 115, None),
        "F5" => named("F5", "F5", 116, None),
        "F12" => named("F12", "F12", 123, None),
        other => KeyDescription {
            key: other.to_string(),
            code: String::new(),
            key_code: other
                .chars()
                .next()
                .map(|c| c.to_ascii_uppercase() as i64)
                .unwrap_or(0),
            text: Some(other.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_combo() {
        assert_eq!(split_combo("Enter"), (0, "Enter".to_string()));
        assert_eq!(split_combo("Control+a"), (2, "a".to_string()));
        assert_eq!(split_combo("Control+Shift+K"), (10, "K".to_string()));
    }

    #[test]
    fn test_describe_named_and_char() {
        assert_eq!(describe("Enter").key_code, 13);
        assert_eq!(describe("a").text.as_deref(), Some("a"));
    }
}
