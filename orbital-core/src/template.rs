//! Template results and DOM-style events.
//!
//! A [`Template`] is what a render function returns. The host never looks
//! inside it; it only hands it to a [`Surface`](crate::surface::Surface).
//! `Template::nothing()` is the empty-render sentinel: a surface treats it
//! as removal of all content, which is different from rendering `""`.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// An event listener attached to rendered markup.
#[derive(Clone)]
pub struct Listener {
    event: Arc<str>,
    handler: Handler,
}

impl Listener {
    /// Name of the event this listener handles.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Invoke the handler.
    pub fn call(&self, event: &Event) {
        (self.handler)(event);
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.event == other.event && Arc::ptr_eq(&self.handler, &other.handler)
    }
}

impl Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("event", &self.event).finish()
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
enum Kind {
    #[default]
    Nothing,
    Markup {
        html: String,
        listeners: Vec<Listener>,
    },
}

/// Opaque output of a render function.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Template {
    kind: Kind,
}

impl Template {
    /// The empty-render sentinel.
    pub fn nothing() -> Self {
        Self { kind: Kind::Nothing }
    }

    /// A template with the given markup and no listeners.
    pub fn html(markup: impl Into<String>) -> Self {
        Self {
            kind: Kind::Markup {
                html: markup.into(),
                listeners: Vec::new(),
            },
        }
    }

    /// Attach a listener. Has no effect on `nothing`.
    pub fn on(mut self, event: &str, handler: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        if let Kind::Markup { listeners, .. } = &mut self.kind {
            listeners.push(Listener {
                event: Arc::from(event),
                handler: Arc::new(handler),
            });
        }
        self
    }

    /// Concatenate templates. Parts that are `nothing` contribute nothing;
    /// if every part is `nothing` the result is `nothing` too.
    pub fn fragment(parts: impl IntoIterator<Item = Template>) -> Self {
        let mut result = Self::nothing();
        for part in parts {
            let Kind::Markup { html, listeners } = part.kind else {
                continue;
            };
            if let Kind::Markup {
                html: acc_html,
                listeners: acc_listeners,
            } = &mut result.kind
            {
                acc_html.push_str(&html);
                acc_listeners.extend(listeners);
            } else {
                result.kind = Kind::Markup { html, listeners };
            }
        }
        result
    }

    /// Check for the empty-render sentinel.
    pub fn is_nothing(&self) -> bool {
        matches!(self.kind, Kind::Nothing)
    }

    /// The markup, or `None` for `nothing`.
    pub fn markup(&self) -> Option<&str> {
        match &self.kind {
            Kind::Nothing => None,
            Kind::Markup { html, .. } => Some(html),
        }
    }

    /// Listeners attached to this template.
    pub fn listeners(&self) -> &[Listener] {
        match &self.kind {
            Kind::Nothing => &[],
            Kind::Markup { listeners, .. } => listeners,
        }
    }
}

/// A node on an event's composed path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventTarget {
    /// An `<a>` element with its resolved `href`.
    Anchor {
        /// Absolute URL the anchor points at.
        href: String,
    },
    /// Any other element.
    Element {
        /// Lowercase tag name.
        tag: String,
    },
    /// A shadow root boundary.
    ShadowRoot,
    /// The document.
    Document,
}

/// A dispatched event.
#[derive(Debug)]
pub struct Event {
    kind: String,
    composed_path: Vec<EventTarget>,
    default_prevented: AtomicBool,
}

impl Event {
    /// Create an event of the given type with an empty composed path.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            composed_path: Vec::new(),
            default_prevented: AtomicBool::new(false),
        }
    }

    /// Set the composed path, innermost target first.
    pub fn with_path(mut self, path: Vec<EventTarget>) -> Self {
        self.composed_path = path;
        self
    }

    /// The event type, e.g. `"click"`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Targets from the innermost outwards, crossing shadow boundaries.
    pub fn composed_path(&self) -> &[EventTarget] {
        &self.composed_path
    }

    /// Cancel the platform's default action.
    pub fn prevent_default(&self) {
        self.default_prevented.store(true, Ordering::SeqCst);
    }

    /// Whether [`Event::prevent_default`] was called.
    pub fn default_prevented(&self) -> bool {
        self.default_prevented.load(Ordering::SeqCst)
    }
}
