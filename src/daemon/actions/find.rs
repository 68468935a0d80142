use serde_json::json;

use super::page;
use crate::daemon::dispatch::{ActionResult, DaemonError};
use crate::daemon::state::DaemonState;
use crate::facade::{Locator as _, Page as _, Selector};
use crate::protocol::Request;

fn build_selector(req: &Request) -> Result<Selector, DaemonError> {
    let by = req.required_str("by").map_err(DaemonError::bad)?;
    let exact = req.bool_param("exact");
    let value = || {
        req.required_str("value")
            .map(String::from)
            .map_err(DaemonError::bad)
    };

    let selector = match by {
        "role" => Selector::Role {
            role: value()?,
            name: req.str_param("name").map(String::from),
            exact,
        },
        "text" => Selector::Text { text: value()?, exact },
        "label" => Selector::Label { text: value()?, exact },
        "placeholder" => Selector::Placeholder { text: value()?, exact },
        "alt" => Selector::AltText { text: value()?, exact },
        "title" => Selector::Title { text: value()?, exact },
        "testid" => Selector::TestId(value()?),
        "first" => Selector::Nth {
            base: Box::new(Selector::Css(value()?)),
            index: 0,
        },
        "last" => Selector::Nth {
            base: Box::new(Selector::Css(value()?)),
            index: -1,
        },
        "nth" => {
            let index = req
                .i64_param("index")
                .ok_or_else(|| DaemonError::bad("Missing required parameter 'index'"))?;
            Selector::Nth {
                base: Box::new(Selector::Css(value()?)),
                index,
            }
        }
        other => {
            return Err(DaemonError::bad(format!(
                "invalid find locator '{}' (role|text|label|placeholder|alt|title|testid|first|last|nth)",
                other
            )))
        }
    };
    Ok(selector)
}

pub async fn find(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = build_selector(req)?;
    let page = page(state)?;
    let locator = page.locator(selector.clone());

    let Some(action) = req.str_param("find_action") else {
        let count = locator.count().await?;
        return Ok(json!({
            "found": count > 0,
            "count": count,
            "selector": selector.describe(),
        }));
    };

    match action {
        "click" => {
            locator.click().await?;
            Ok(json!({ "clicked": true, "selector": selector.describe() }))
        }
        "fill" => {
            let value = req.required_str("find_value").map_err(DaemonError::bad)?;
            locator.fill(value).await?;
            Ok(json!({ "filled": true }))
        }
        "type" => {
            let value = req.required_str("find_value").map_err(DaemonError::bad)?;
            locator.type_text(value).await?;
            Ok(json!({ "typed": value.chars().count() }))
        }
        "check" => {
            locator.check().await?;
            Ok(json!({ "checked": true }))
        }
        "uncheck" => {
            locator.uncheck().await?;
            Ok(json!({ "checked": false }))
        }
        "hover" => {
            locator.hover().await?;
            Ok(json!({ "hovered": true }))
        }
        "focus" => {
            locator.focus().await?;
            Ok(json!({ "focused": true }))
        }
        "text" => Ok(json!({ "text": locator.text().await? })),
        "count" => Ok(json!({ "count": locator.count().await? })),
        "visible" => Ok(json!({ "visible": locator.is_visible().await? })),
        other => Err(DaemonError::bad(format!(
            "invalid find action '{}' (click|fill|type|check|uncheck|hover|focus|text|count|visible)",
            other
        ))),
    }
}
