//! Conditional rendering.

use crate::reactive::{Get, Memo};
use crate::template::Template;

/// Render `children` while `when` is true, nothing otherwise.
///
/// `children` is not evaluated at all while the condition is false, and
/// the result only recomputes when the condition flips or something the
/// active branch read changes.
pub fn show<W, C>(when: W, children: C) -> Memo<Template>
where
    W: Fn() -> bool + Send + Sync + 'static,
    C: Fn() -> Template + Send + Sync + 'static,
{
    show_with_fallback(when, children, Template::nothing)
}

/// Like [`show`], rendering `fallback` while the condition is false.
pub fn show_with_fallback<W, C, F>(when: W, children: C, fallback: F) -> Memo<Template>
where
    W: Fn() -> bool + Send + Sync + 'static,
    C: Fn() -> Template + Send + Sync + 'static,
    F: Fn() -> Template + Send + Sync + 'static,
{
    let condition = Memo::new(when);
    Memo::new(move || {
        if condition.get() {
            children()
        } else {
            fallback()
        }
    })
}
