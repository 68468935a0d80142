//! Accessibility snapshot subsystem.
//!
//! A JS walker runs in the page, computes role/name/state for every visible
//! element, assigns `e<N>` refs to the ones worth addressing, and writes the
//! ref back onto the element as a DOM attribute. The daemon renders the
//! returned tree as an indented outline and keeps the ref table so later
//! commands can resolve `@eN` into a locator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Attribute written onto elements that received a ref.
pub const REF_ATTR: &str = "data-spel-ref";
/// Attribute marking overlay nodes injected by `annotate`, skipped by the
/// walker and removed by `unannotate`.
pub const ANNOTATION_ATTR: &str = "data-spel-annotation";

/// In-page walker. Invoked as `(__spelWalk)({scope, prefix, refAttr, skipAttr})`
/// and returns `{tree, refs, counter}`.
const WALKER_JS: &str = r#"
function __spelWalk(opts) {
  const REF_ATTR = opts.refAttr;
  const SKIP_ATTR = opts.skipAttr;
  const prefix = opts.prefix || 'e';
  const SKIP_TAGS = ['SCRIPT', 'STYLE', 'NOSCRIPT', 'LINK', 'META', 'BR', 'WBR', 'TEMPLATE'];
  const INTERACTIVE_TAGS = ['A', 'BUTTON', 'INPUT', 'SELECT', 'TEXTAREA', 'OPTION', 'SUMMARY'];
  const MEANINGFUL_ROLES = ['button', 'link', 'checkbox', 'radio', 'textbox', 'searchbox',
    'combobox', 'listbox', 'option', 'menuitem', 'menuitemcheckbox', 'menuitemradio',
    'tab', 'switch', 'slider', 'spinbutton', 'heading', 'img', 'dialog', 'alert',
    'progressbar', 'cell', 'columnheader', 'row'];
  const STRUCTURAL_ROLES = ['navigation', 'main', 'banner', 'contentinfo', 'complementary',
    'form', 'region', 'list', 'table', 'article', 'dialog', 'generic'];

  // Previous snapshot refs are stale the moment a new walk starts.
  document.querySelectorAll('[' + REF_ATTR + ']').forEach(function (el) {
    el.removeAttribute(REF_ATTR);
  });

  let counter = 0;
  const refs = {};

  function role(el) {
    const explicit = el.getAttribute('role');
    if (explicit) return explicit;
    const tag = el.tagName.toLowerCase();
    if (tag === 'input') {
      const t = (el.getAttribute('type') || 'text').toLowerCase();
      const m = { checkbox: 'checkbox', radio: 'radio', range: 'slider', number: 'spinbutton',
                  search: 'searchbox', button: 'button', submit: 'button', reset: 'button',
                  image: 'button', hidden: 'none' };
      return m[t] || 'textbox';
    }
    if (tag === 'a') return el.hasAttribute('href') ? 'link' : 'generic';
    if (/^h[1-6]$/.test(tag)) return 'heading';
    const m = { body: 'WebArea', button: 'button', select: 'combobox', textarea: 'textbox',
                img: 'img', nav: 'navigation', main: 'main', header: 'banner',
                footer: 'contentinfo', aside: 'complementary', form: 'form', table: 'table',
                ul: 'list', ol: 'list', li: 'listitem', option: 'option', dialog: 'dialog',
                article: 'article', section: 'region', p: 'paragraph', summary: 'button',
                figure: 'figure', blockquote: 'blockquote', hr: 'separator',
                iframe: 'iframe', td: 'cell', th: 'columnheader', tr: 'row' };
    return m[tag] || 'generic';
  }

  function ownText(el) {
    let out = '';
    for (const n of el.childNodes) {
      if (n.nodeType === Node.TEXT_NODE) out += n.textContent;
    }
    return out.trim();
  }

  function accName(el) {
    const aria = el.getAttribute('aria-label');
    if (aria) return aria.trim();
    const lb = el.getAttribute('aria-labelledby');
    if (lb) {
      const parts = lb.split(/\s+/).map(function (id) {
        const r = document.getElementById(id);
        return r ? (r.innerText || r.textContent || '').trim() : '';
      }).filter(Boolean);
      if (parts.length) return parts.join(' ');
    }
    if (el.labels && el.labels.length) {
      const t = (el.labels[0].innerText || el.labels[0].textContent || '').trim();
      if (t) return t;
    }
    const attr = el.getAttribute('alt') || el.getAttribute('title') || el.getAttribute('placeholder');
    if (attr) return attr.trim();
    if (el.children.length === 0) {
      const t = (el.innerText || el.textContent || '').trim();
      return t.length > 200 ? t.slice(0, 200) : t;
    }
    return '';
  }

  function visible(el) {
    if (el.getAttribute('aria-hidden') === 'true' || el.hidden) return false;
    const s = getComputedStyle(el);
    if (s.display === 'none' || s.visibility === 'hidden') return false;
    if (parseFloat(s.opacity) === 0) return false;
    return true;
  }

  function isInteractive(el, r) {
    if (INTERACTIVE_TAGS.includes(el.tagName)) return true;
    if (el.hasAttribute('tabindex') || el.hasAttribute('onclick')) return true;
    if (el.getAttribute('contenteditable') === 'true') return true;
    return MEANINGFUL_ROLES.includes(r) && r !== 'heading' && r !== 'img';
  }

  function hasPointerCursor(el) {
    try { return getComputedStyle(el).cursor === 'pointer'; } catch (e) { return false; }
  }

  function hasPseudoContent(el, which) {
    try {
      const c = getComputedStyle(el, which).content;
      return c && c !== 'none' && c !== 'normal' && c !== '""' && c !== "''";
    } catch (e) { return false; }
  }

  function smallDecorated(el) {
    const s = getComputedStyle(el);
    const r = el.getBoundingClientRect();
    if (r.width === 0 || r.height === 0 || r.width > 64 || r.height > 64) return false;
    if (s.backgroundImage && s.backgroundImage !== 'none') return true;
    return hasPseudoContent(el, null)
      || hasPseudoContent(el, '::before')
      || hasPseudoContent(el, '::after');
  }

  function stateAttrs(el, r) {
    const attrs = {};
    if (r === 'heading') {
      const m = el.tagName.match(/^H([1-6])$/);
      attrs.level = m ? parseInt(m[1], 10)
        : (parseInt(el.getAttribute('aria-level'), 10) || 2);
    }
    if (el.checked === true || el.getAttribute('aria-checked') === 'true') attrs.checked = true;
    if (el.disabled === true || el.getAttribute('aria-disabled') === 'true') attrs.disabled = true;
    if (el.required === true) attrs.required = true;
    if (el.readOnly === true) attrs.readonly = true;
    const expanded = el.getAttribute('aria-expanded');
    if (expanded !== null) attrs.expanded = expanded === 'true';
    if (el.selected === true || el.getAttribute('aria-selected') === 'true') attrs.selected = true;
    if (el.getAttribute('aria-pressed') === 'true') attrs.pressed = true;
    const current = el.getAttribute('aria-current');
    if (current !== null && current !== 'false') attrs.current = current;
    if (['textbox', 'searchbox', 'spinbutton', 'combobox', 'slider'].includes(r)
        && 'value' in el && el.value !== '' && el.value != null) {
      attrs.value = String(el.value).slice(0, 200);
    }
    const describedBy = el.getAttribute('aria-describedby');
    if (describedBy) {
      const parts = describedBy.split(/\s+/).map(function (id) {
        const d = document.getElementById(id);
        return d ? (d.innerText || d.textContent || '').trim() : '';
      }).filter(Boolean);
      if (parts.length) attrs.description = parts.join(' ').slice(0, 200);
    }
    return attrs;
  }

  function walk(el) {
    if (SKIP_TAGS.includes(el.tagName)) return null;
    if (el.hasAttribute(SKIP_ATTR)) return null;
    if (!visible(el)) return null;

    const r = role(el);
    if (r === 'none' || r === 'presentation') return null;
    const name = accName(el);
    const text = ownText(el);
    const interactive = isInteractive(el, r);
    const isLeaf = el.children.length === 0;
    const mixed = !isLeaf && text.length > 0;
    const meaningful = MEANINGFUL_ROLES.includes(r);

    const children = [];
    for (const child of el.children) {
      const node = walk(child);
      if (node) children.push(node);
    }

    const wantsRef = interactive
      || (meaningful && (name || text))
      || (isLeaf && text)
      || mixed
      || smallDecorated(el);

    const node = {
      role: r,
      name: name,
      tag: el.tagName.toLowerCase(),
      interactive: interactive,
      cursor: hasPointerCursor(el),
      attrs: stateAttrs(el, r),
      children: children,
    };
    if (mixed || (isLeaf && text && text !== name)) {
      node.text = text.length > 200 ? text.slice(0, 200) : text;
    }

    if (wantsRef) {
      counter += 1;
      const id = prefix + counter;
      el.setAttribute(REF_ATTR, id);
      node.ref = id;
      const rect = el.getBoundingClientRect();
      refs[id] = {
        role: r,
        name: name,
        tag: el.tagName.toLowerCase(),
        box: {
          x: Math.round(rect.x), y: Math.round(rect.y),
          width: Math.round(rect.width), height: Math.round(rect.height),
        },
        mixed: mixed,
      };
    }

    // Prune empty structural noise; collapse any non-contributing parent
    // with exactly one child into that child.
    if (!node.ref && !node.name && !node.text && children.length === 0
        && STRUCTURAL_ROLES.includes(r)) {
      return null;
    }
    if (!node.ref && !node.name && !node.text && children.length === 1) {
      return children[0];
    }
    return node;
  }

  let scope = document.body;
  if (opts.scope) {
    scope = document.querySelector(opts.scope);
    if (!scope) return { tree: null, refs: {}, counter: 0 };
  }
  return { tree: walk(scope), refs: refs, counter: counter };
}
"#;

/// Expression running the walker in a frame.
pub fn walker_expr(scope: Option<&str>, prefix: &str) -> String {
    let opts = json!({
        "scope": scope,
        "prefix": prefix,
        "refAttr": REF_ATTR,
        "skipAttr": ANNOTATION_ATTR,
    });
    format!("({})({})", WALKER_JS.trim(), opts)
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalkerResult {
    pub tree: Option<SnapshotNode>,
    #[serde(default)]
    pub refs: HashMap<String, RefEntry>,
    #[serde(default)]
    pub counter: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotNode {
    pub role: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub cursor: bool,
    #[serde(default, rename = "ref")]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub attrs: Map<String, Value>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefEntry {
    pub role: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(rename = "box")]
    pub bounds: Option<RefBox>,
    #[serde(default)]
    pub mixed: bool,
}

/// The daemon's live ref table. Replaced wholesale on every capture, cleared
/// on navigation and tab switches.
#[derive(Debug, Default)]
pub struct RefTable {
    entries: HashMap<String, RefEntry>,
    last_counter: u64,
}

impl RefTable {
    pub fn replace(&mut self, refs: HashMap<String, RefEntry>, counter: u64) {
        self.entries = refs;
        self.last_counter = counter;
    }

    pub fn merge(&mut self, refs: HashMap<String, RefEntry>) {
        self.entries.extend(refs);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_counter = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, id: &str) -> Option<&RefEntry> {
        self.entries.get(id)
    }

    pub fn entries(&self) -> &HashMap<String, RefEntry> {
        &self.entries
    }

    /// Normalize `@e3` / `e3` and verify it exists. The error names the live
    /// range so the caller knows to re-snapshot.
    pub fn resolve(&self, raw: &str) -> Result<String, String> {
        let id = raw.strip_prefix('@').unwrap_or(raw);
        if self.entries.contains_key(id) {
            return Ok(id.to_string());
        }
        if self.entries.is_empty() {
            return Err(format!(
                "Unknown ref '{}': no refs captured yet. Run 'snapshot' first.",
                id
            ));
        }
        Err(format!(
            "Unknown ref '{}'. Available refs: e1-e{}. The page may have changed; run 'snapshot' again.",
            id, self.last_counter
        ))
    }
}

/// `@e3` or bare `e3` / `f2_e7` counts as a ref, everything else is a
/// selector for the facade.
pub fn looks_like_ref(selector: &str) -> bool {
    let id = selector.strip_prefix('@').unwrap_or(selector);
    let id = match id.find('_') {
        // Frame-scoped refs: f<k>_e<n>
        Some(pos) if id.starts_with('f') => &id[pos + 1..],
        _ => id,
    };
    let Some(rest) = id.strip_prefix('e') else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// One rendered line plus the metadata the filters need.
#[derive(Debug, Clone)]
pub struct SnapshotLine {
    pub text: String,
    pub depth: usize,
    pub interactive: bool,
    pub cursor: bool,
    pub has_ref: bool,
    pub generic: bool,
}

pub fn render_lines(node: &SnapshotNode, depth: usize, out: &mut Vec<SnapshotLine>) {
    let mut line = format!("{}- {}", "  ".repeat(depth), node.role);
    if !node.name.is_empty() {
        line.push_str(&format!(" \"{}\"", node.name));
    }
    if let Some(ref_id) = &node.ref_id {
        line.push_str(&format!(" [@{}]", ref_id));
    }
    for (key, value) in &node.attrs {
        match value {
            Value::Bool(true) => line.push_str(&format!(" [{}]", key)),
            Value::Bool(false) => {}
            other => {
                let rendered = match other {
                    Value::String(s) => s.clone(),
                    v => v.to_string(),
                };
                line.push_str(&format!(" [{}={}]", key, rendered));
            }
        }
    }
    if let Some(text) = &node.text {
        if !text.is_empty() && *text != node.name {
            line.push_str(&format!(" : {}", text));
        }
    }
    out.push(SnapshotLine {
        text: line,
        depth,
        interactive: node.interactive,
        cursor: node.cursor,
        has_ref: node.ref_id.is_some(),
        generic: node.role == "generic",
    });
    for child in &node.children {
        render_lines(child, depth + 1, out);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotFilters {
    pub interactive: bool,
    pub cursor: bool,
    pub compact: bool,
    pub max_depth: Option<usize>,
}

/// Apply filters as line selections so every filtered output is a strict
/// line-subset of the full tree. `cursor` extends `interactive` with
/// pointer-cursor elements, in that order.
pub fn apply_filters(lines: &[SnapshotLine], filters: &SnapshotFilters) -> Vec<SnapshotLine> {
    let mut kept: Vec<SnapshotLine> = lines.to_vec();
    if filters.interactive || filters.cursor {
        kept.retain(|line| {
            let mut keep = line.interactive && line.has_ref;
            if filters.cursor {
                keep = keep || (line.cursor && line.has_ref);
            }
            keep
        });
    }
    if filters.compact {
        kept.retain(|line| {
            if !line.generic {
                return true;
            }
            // A generic line with nothing but its role contributes nothing.
            line.text.trim_start().trim_start_matches("- ").contains(' ')
        });
    }
    if let Some(max_depth) = filters.max_depth {
        kept.retain(|line| line.depth < max_depth);
    }
    kept
}

pub fn lines_to_string(lines: &[SnapshotLine]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Overlay injection for `annotate`: draws a numbered badge and box outline
/// over every element carrying a ref attribute. Returns the overlay count.
pub fn annotate_expr(show_boxes: bool, show_dims: bool) -> String {
    let opts = json!({
        "refAttr": REF_ATTR,
        "skipAttr": ANNOTATION_ATTR,
        "boxes": show_boxes,
        "dims": show_dims,
    });
    format!(
        r#"(function __spelAnnotate(opts) {{
  document.querySelectorAll('[' + opts.skipAttr + ']').forEach(function (el) {{ el.remove(); }});
  let count = 0;
  document.querySelectorAll('[' + opts.refAttr + ']').forEach(function (el) {{
    const rect = el.getBoundingClientRect();
    if (rect.width === 0 && rect.height === 0) return;
    count += 1;
    const id = el.getAttribute(opts.refAttr);
    if (opts.boxes) {{
      const box = document.createElement('div');
      box.setAttribute(opts.skipAttr, '1');
      box.style.cssText = 'position:fixed;pointer-events:none;z-index:2147483646;'
        + 'border:1px solid #e33;left:' + rect.x + 'px;top:' + rect.y + 'px;'
        + 'width:' + rect.width + 'px;height:' + rect.height + 'px;';
      document.body.appendChild(box);
    }}
    const badge = document.createElement('div');
    badge.setAttribute(opts.skipAttr, '1');
    badge.textContent = opts.dims
      ? id + ' ' + Math.round(rect.width) + 'x' + Math.round(rect.height)
      : id;
    badge.style.cssText = 'position:fixed;pointer-events:none;z-index:2147483647;'
      + 'background:#e33;color:#fff;font:10px monospace;padding:1px 3px;border-radius:2px;'
      + 'left:' + rect.x + 'px;top:' + Math.max(0, rect.y - 14) + 'px;';
    document.body.appendChild(badge);
  }});
  return count;
}})({})"#,
        opts
    )
}

pub fn unannotate_expr() -> String {
    format!(
        r#"(function () {{
  const nodes = document.querySelectorAll('[{attr}]');
  const count = nodes.length;
  nodes.forEach(function (el) {{ el.remove(); }});
  return count;
}})()"#,
        attr = ANNOTATION_ATTR
    )
}

/// Strip ref attributes from the live DOM without capturing a new snapshot.
pub fn clear_refs_expr() -> String {
    format!(
        r#"(function () {{
  const nodes = document.querySelectorAll('[{attr}]');
  const count = nodes.length;
  nodes.forEach(function (el) {{ el.removeAttribute('{attr}'); }});
  return count;
}})()"#,
        attr = REF_ATTR
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_result() -> WalkerResult {
        serde_json::from_value(json!({
            "tree": {
                "role": "WebArea",
                "name": "Example Domain",
                "tag": "body",
                "children": [
                    {
                        "role": "heading",
                        "name": "Example Domain",
                        "tag": "h1",
                        "ref": "e1",
                        "attrs": { "level": 1 },
                        "children": [],
                    },
                    {
                        "role": "paragraph",
                        "tag": "p",
                        "text": "This domain is for use in examples.",
                        "children": [],
                    },
                    {
                        "role": "link",
                        "name": "More information...",
                        "tag": "a",
                        "ref": "e2",
                        "interactive": true,
                        "cursor": true,
                        "children": [
                            { "role": "generic", "tag": "span", "children": [] },
                        ],
                    },
                ],
            },
            "refs": {
                "e1": { "role": "heading", "name": "Example Domain", "tag": "h1",
                        "box": { "x": 100, "y": 50, "width": 600, "height": 40 }, "mixed": false },
                "e2": { "role": "link", "name": "More information...", "tag": "a",
                        "box": { "x": 100, "y": 200, "width": 150, "height": 20 }, "mixed": false },
            },
            "counter": 2,
        }))
        .unwrap()
    }

    fn render(result: &WalkerResult) -> Vec<SnapshotLine> {
        let mut lines = Vec::new();
        render_lines(result.tree.as_ref().unwrap(), 0, &mut lines);
        lines
    }

    #[test]
    fn test_render_shape() {
        let result = sample_result();
        let lines = render(&result);
        let text = lines_to_string(&lines);
        assert!(text.starts_with("- WebArea \"Example Domain\""));
        assert!(text.contains("  - heading \"Example Domain\" [@e1] [level=1]"));
        assert!(text.contains("  - link \"More information...\" [@e2]"));
        assert!(text.contains(" : This domain is for use in examples."));
    }

    #[test]
    fn test_filters_are_line_subsets() {
        let result = sample_result();
        let lines = render(&result);
        let all: Vec<String> = lines.iter().map(|l| l.text.clone()).collect();

        for filters in [
            SnapshotFilters { interactive: true, ..Default::default() },
            SnapshotFilters { interactive: true, cursor: true, ..Default::default() },
            SnapshotFilters { compact: true, ..Default::default() },
            SnapshotFilters { max_depth: Some(1), ..Default::default() },
        ] {
            let filtered = apply_filters(&lines, &filters);
            for line in &filtered {
                assert!(all.contains(&line.text), "filtered line not in full tree");
            }
            assert!(filtered.len() <= all.len());
        }
    }

    #[test]
    fn test_interactive_filter_keeps_only_ref_lines() {
        let result = sample_result();
        let lines = render(&result);
        let filtered = apply_filters(
            &lines,
            &SnapshotFilters { interactive: true, ..Default::default() },
        );
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].text.contains("[@e2]"));
    }

    #[test]
    fn test_cursor_extends_interactive() {
        let mut lines = Vec::new();
        render_lines(
            &serde_json::from_value::<SnapshotNode>(json!({
                "role": "generic", "tag": "div", "ref": "e1", "cursor": true, "children": [],
            }))
            .unwrap(),
            0,
            &mut lines,
        );
        let interactive_only = apply_filters(
            &lines,
            &SnapshotFilters { interactive: true, ..Default::default() },
        );
        assert!(interactive_only.is_empty());
        let with_cursor = apply_filters(
            &lines,
            &SnapshotFilters { interactive: true, cursor: true, ..Default::default() },
        );
        assert_eq!(with_cursor.len(), 1);
    }

    #[test]
    fn test_max_depth_filter() {
        let result = sample_result();
        let lines = render(&result);
        let filtered = apply_filters(
            &lines,
            &SnapshotFilters { max_depth: Some(1), ..Default::default() },
        );
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].text.starts_with("- WebArea"));
    }

    #[test]
    fn test_ref_table_resolution() {
        let result = sample_result();
        let mut table = RefTable::default();
        table.replace(result.refs, result.counter);

        assert_eq!(table.resolve("@e1").unwrap(), "e1");
        assert_eq!(table.resolve("e2").unwrap(), "e2");
        let err = table.resolve("@e9").unwrap_err();
        assert!(err.contains("e1-e2"));
        assert!(err.contains("snapshot"));
    }

    #[test]
    fn test_ref_table_empty_hint() {
        let table = RefTable::default();
        let err = table.resolve("e1").unwrap_err();
        assert!(err.contains("no refs captured"));
    }

    #[test]
    fn test_looks_like_ref() {
        assert!(looks_like_ref("@e1"));
        assert!(looks_like_ref("e12"));
        assert!(looks_like_ref("f2_e7"));
        assert!(looks_like_ref("@f1_e3"));
        assert!(!looks_like_ref("#email"));
        assert!(!looks_like_ref("e"));
        assert!(!looks_like_ref("ebay"));
        assert!(!looks_like_ref(".e1"));
    }

    #[test]
    fn test_walker_expr_embeds_options() {
        let expr = walker_expr(Some("#main"), "f1_e");
        assert!(expr.contains("__spelWalk"));
        assert!(expr.contains("#main"));
        assert!(expr.contains("f1_e"));
        assert!(expr.contains(REF_ATTR));
    }

    #[test]
    fn test_empty_scope_result_deserializes() {
        let result: WalkerResult =
            serde_json::from_value(json!({ "tree": null, "refs": {}, "counter": 0 })).unwrap();
        assert!(result.tree.is_none());
        assert_eq!(result.counter, 0);
    }
}
