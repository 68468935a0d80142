//! JavaScript fragments evaluated in the page by the CDP adapter.
//!
//! The locator never holds element handles across calls; every operation
//! re-resolves its selector through the finder below, mirroring how lazy
//! locators behave in the big automation libraries.

use serde_json::{json, Value};

use crate::facade::Selector;

/// Shared element finder. Takes a selector spec object, returns an array of
/// matching elements (deepest-only for text matches).
const FINDER_JS: &str = r#"
(function (spec) {
  function textOf(el) { return (el.innerText || el.textContent || '').trim(); }
  function matchText(hay, needle, exact) {
    hay = (hay || '').trim();
    if (exact) return hay === needle;
    return hay.toLowerCase().includes(needle.toLowerCase());
  }
  function matchName(hay, needle, exact) {
    if (matchText(hay, needle, exact)) return true;
    if (exact) return false;
    try { return new RegExp(needle, 'i').test((hay || '').trim()); } catch (e) { return false; }
  }
  function implicitRole(el) {
    const explicit = el.getAttribute('role');
    if (explicit) return explicit;
    const tag = el.tagName.toLowerCase();
    if (tag === 'input') {
      const t = (el.getAttribute('type') || 'text').toLowerCase();
      const m = { checkbox: 'checkbox', radio: 'radio', range: 'slider', number: 'spinbutton',
                  search: 'searchbox', button: 'button', submit: 'button', reset: 'button',
                  image: 'button', email: 'textbox', password: 'textbox', tel: 'textbox',
                  url: 'textbox', text: 'textbox' };
      return m[t] || 'textbox';
    }
    if (tag === 'a') return el.hasAttribute('href') ? 'link' : 'generic';
    if (/^h[1-6]$/.test(tag)) return 'heading';
    const m = { button: 'button', select: 'combobox', textarea: 'textbox', img: 'img',
                nav: 'navigation', main: 'main', header: 'banner', footer: 'contentinfo',
                aside: 'complementary', form: 'form', table: 'table', ul: 'list', ol: 'list',
                li: 'listitem', option: 'option', dialog: 'dialog', article: 'article',
                section: 'region', summary: 'button', label: 'generic' };
    return m[tag] || 'generic';
  }
  function accName(el) {
    const aria = el.getAttribute('aria-label');
    if (aria) return aria.trim();
    const lb = el.getAttribute('aria-labelledby');
    if (lb) {
      const parts = lb.split(/\s+/).map(function (id) {
        const r = document.getElementById(id);
        return r ? textOf(r) : '';
      }).filter(Boolean);
      if (parts.length) return parts.join(' ');
    }
    if (el.labels && el.labels.length) return textOf(el.labels[0]);
    return (el.getAttribute('alt') || el.getAttribute('title')
      || el.getAttribute('placeholder') || textOf(el)).trim();
  }
  function find(spec) {
    const doc = document;
    switch (spec.kind) {
      case 'css':
        return Array.from(doc.querySelectorAll(spec.css));
      case 'testid':
        return Array.from(doc.querySelectorAll('[data-testid="' + CSS.escape(spec.value) + '"]'));
      case 'placeholder':
        return Array.from(doc.querySelectorAll('[placeholder]'))
          .filter(function (el) { return matchText(el.getAttribute('placeholder'), spec.value, spec.exact); });
      case 'alt':
        return Array.from(doc.querySelectorAll('[alt]'))
          .filter(function (el) { return matchText(el.getAttribute('alt'), spec.value, spec.exact); });
      case 'title':
        return Array.from(doc.querySelectorAll('[title]'))
          .filter(function (el) { return matchText(el.getAttribute('title'), spec.value, spec.exact); });
      case 'label': {
        const out = [];
        doc.querySelectorAll('label').forEach(function (l) {
          if (!matchText(textOf(l), spec.value, spec.exact)) return;
          const c = l.control || (l.htmlFor ? doc.getElementById(l.htmlFor) : null)
            || l.querySelector('input,select,textarea');
          if (c) out.push(c);
        });
        doc.querySelectorAll('[aria-label]').forEach(function (el) {
          if (matchText(el.getAttribute('aria-label'), spec.value, spec.exact)) out.push(el);
        });
        return out;
      }
      case 'text': {
        const matches = Array.from(doc.querySelectorAll('*')).filter(function (el) {
          if (['SCRIPT', 'STYLE', 'NOSCRIPT', 'HTML', 'HEAD', 'BODY'].includes(el.tagName)) return false;
          const t = textOf(el);
          return t && matchText(t, spec.value, spec.exact);
        });
        return matches.filter(function (el) {
          return !matches.some(function (o) { return o !== el && el.contains(o); });
        });
      }
      case 'role': {
        let els = Array.from(doc.querySelectorAll('*')).filter(function (el) {
          return implicitRole(el) === spec.role;
        });
        if (spec.name != null) {
          els = els.filter(function (el) { return matchName(accName(el), spec.name, spec.exact); });
        }
        return els;
      }
      case 'nth': {
        const base = find(spec.base);
        const i = spec.index < 0 ? base.length + spec.index : spec.index;
        return base[i] !== undefined ? [base[i]] : [];
      }
    }
    return [];
  }
  return find(spec);
})
"#;

fn selector_spec(selector: &Selector) -> Value {
    match selector {
        Selector::Css(css) => json!({ "kind": "css", "css": css }),
        Selector::Role { role, name, exact } => {
            json!({ "kind": "role", "role": role, "name": name, "exact": exact })
        }
        Selector::Text { text, exact } => json!({ "kind": "text", "value": text, "exact": exact }),
        Selector::Label { text, exact } => json!({ "kind": "label", "value": text, "exact": exact }),
        Selector::Placeholder { text, exact } => {
            json!({ "kind": "placeholder", "value": text, "exact": exact })
        }
        Selector::AltText { text, exact } => json!({ "kind": "alt", "value": text, "exact": exact }),
        Selector::Title { text, exact } => json!({ "kind": "title", "value": text, "exact": exact }),
        Selector::TestId(id) => json!({ "kind": "testid", "value": id }),
        Selector::Nth { base, index } => {
            json!({ "kind": "nth", "base": selector_spec(base), "index": index })
        }
    }
}

/// Human-readable selector description for error messages.
pub fn describe(selector: &Selector) -> String {
    selector.describe()
}

/// Expression evaluating to the array of elements matching `selector`.
pub fn finder_expr(selector: &Selector) -> String {
    format!("{}({})", FINDER_JS.trim(), selector_spec(selector))
}

/// Run `body` with the first match bound as `el`. The body must `return`.
/// Evaluates to `{"__missing": "<selector>"}` when nothing matches.
pub fn with_element(selector: &Selector, body: &str) -> String {
    format!(
        "(function () {{ const els = {finder}; const el = els[0]; \
         if (!el) return {{ __missing: {desc} }}; {body} }})()",
        finder = finder_expr(selector),
        desc = serde_json::to_string(&describe(selector)).unwrap_or_default(),
        body = body,
    )
}

/// Run `body` with all matches bound as `els`. The body must `return`.
pub fn with_elements(selector: &Selector, body: &str) -> String {
    format!(
        "(function () {{ const els = {finder}; {body} }})()",
        finder = finder_expr(selector),
        body = body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finder_expr_embeds_spec() {
        let expr = finder_expr(&Selector::Css("#login".into()));
        assert!(expr.contains(r##"{"css":"#login","kind":"css"}"##) || expr.contains(r##""kind":"css""##));
    }

    #[test]
    fn test_with_element_missing_marker() {
        let js = with_element(
            &Selector::Text {
                text: "Sign in".into(),
                exact: false,
            },
            "return el.tagName;",
        );
        assert!(js.contains("__missing"));
        assert!(js.contains("return el.tagName;"));
    }

    #[test]
    fn test_describe_nested_nth() {
        let sel = Selector::Nth {
            base: Box::new(Selector::Css(".item".into())),
            index: -1,
        };
        assert_eq!(describe(&sel), ".item >> nth=-1");
    }
}
