//! The router outlet element.

use crate::host::{ComponentDefinition, PropSchema, PropShape, SetupApi};
use crate::reactive::{Get, Memo};
use crate::template::Template;

use super::bridge::consume_router_state;

/// Tag the outlet is usually defined under.
pub const OUTLET_TAG: &str = "router-outlet";

const DEFAULT_DEPTH: usize = 1;

/// Escape a value for use inside a double-quoted attribute. Not safe for
/// single-quoted or unquoted attributes: `'` and `>` pass through.
fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// An element rendering a `<slot>` named after the matched route at its
/// `depth` attribute (default 1, the first child of the root route).
///
/// Pages are slotted into the outlet under their route id, so whichever
/// route is matched at that depth is the one shown.
pub fn outlet_definition() -> ComponentDefinition {
    ComponentDefinition::new(|api: &SetupApi| {
        let state = consume_router_state(api.context());
        let props = api.props().clone();
        let name = Memo::new(move || {
            let depth = props
                .get("depth")
                .and_then(|d| d.trim().parse::<usize>().ok())
                .unwrap_or(DEFAULT_DEPTH);
            state
                .get()
                .and_then(|s| s.matches.get(depth).map(|m| m.route_id.clone()))
                .unwrap_or_default()
        });
        move || Template::html(format!("<slot name=\"{}\"></slot>", escape_attribute(&name.get())))
    })
    .with_props(PropSchema::new().prop("depth", PropShape::Number))
}
