//! Integration Tests
//!
//! These tests drive components through the element registry the way a
//! document would, and check that the reactive core, the context channel,
//! the host and the router bridge work together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use orbital_core::channel::create_context;
use orbital_core::host::{show, ComponentDefinition, ElementRegistry, PropSchema, PropShape, SetupApi};
use orbital_core::reactive::{batch, run_in_scope, Effect, Get, Memo, Set, Signal};
use orbital_core::router::{
    consume_loader_data, consume_navigate, link_handler, outlet_definition, provide_router, Loader,
    MemoryRouter, MemoryRouterConfig, NavigateOptions, RouteDescriptor, Router, OUTLET_TAG,
};
use orbital_core::template::{Event, EventTarget, Template};

fn counter_definition() -> ComponentDefinition {
    ComponentDefinition::new(|_: &SetupApi| {
        let count = Signal::new(0);
        move || {
            let count = count.clone();
            Template::html(format!("<button>{}</button>", count.get()))
                .on("click", move |_| count.update(|n| n + 1))
        }
    })
}

/// A click re-renders the same instance into the same surface.
#[test]
fn counter_end_to_end() {
    let registry = ElementRegistry::new();
    registry.define("x-counter", counter_definition()).unwrap();

    let counter = registry.create("x-counter").unwrap();
    counter.connected();
    let surface = Arc::clone(counter.surface());
    assert_eq!(counter.content().as_deref(), Some("<button>0</button>"));

    assert_eq!(counter.dispatch(&Event::new("click")), 1);
    assert_eq!(counter.content().as_deref(), Some("<button>1</button>"));
    assert!(Arc::ptr_eq(&surface, counter.surface()));

    counter.dispatch(&Event::new("click"));
    assert_eq!(surface.content().as_deref(), Some("<button>2</button>"));
    assert_eq!(counter.render_count(), 3);
}

/// Mount and unmount callbacks both run in registration order.
#[test]
fn lifecycle_callbacks_run_in_registration_order() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::default();
    let registry = ElementRegistry::new();
    registry
        .define(
            "x-ordered",
            ComponentDefinition::new({
                let log = log.clone();
                move |api: &SetupApi| {
                    for (mount, unmount) in [("mount a", "cleanup a"), ("mount b", "cleanup b")] {
                        let (on_mount, on_unmount) = (log.clone(), log.clone());
                        api.on_mount(move || on_mount.lock().push(mount));
                        api.on_cleanup(move || on_unmount.lock().push(unmount));
                    }
                    Template::nothing
                }
            }),
        )
        .unwrap();

    let element = registry.create("x-ordered").unwrap();
    element.connected();
    element.disconnected();
    assert_eq!(*log.lock(), vec!["mount a", "mount b", "cleanup a", "cleanup b"]);
}

/// Attributes delivered before connection are visible to mount callbacks.
#[test]
fn mount_observes_earlier_attributes() {
    let seen: Arc<Mutex<Option<String>>> = Arc::default();
    let registry = ElementRegistry::new();
    registry
        .define(
            "x-labelled",
            ComponentDefinition::new({
                let seen = seen.clone();
                move |api: &SetupApi| {
                    let (props, seen) = (api.props().clone(), seen.clone());
                    api.on_mount(move || *seen.lock() = props.get("label"));
                    let props = api.props().clone();
                    move || Template::html(props.get("label").unwrap_or_default())
                }
            })
            .with_props(PropSchema::new().prop("label", PropShape::String)),
        )
        .unwrap();

    let element = registry.create("x-labelled").unwrap();
    element.attribute_changed("label", None, Some("ready"));
    element.connected();
    assert_eq!(seen.lock().as_deref(), Some("ready"));
    assert_eq!(element.content().as_deref(), Some("ready"));
}

/// Hidden children are never evaluated, and hiding removes the content.
#[test]
fn conditional_render_avoids_work() {
    let child_renders = Arc::new(AtomicUsize::new(0));
    let registry = ElementRegistry::new();
    registry
        .define(
            "x-toggle",
            ComponentDefinition::new({
                let child_renders = child_renders.clone();
                move |api: &SetupApi| {
                    let props = api.props().clone();
                    let child_renders = child_renders.clone();
                    let body = show(
                        move || props.get("open").is_some(),
                        move || {
                            child_renders.fetch_add(1, Ordering::SeqCst);
                            Template::html("<p>details</p>")
                        },
                    );
                    move || body.get()
                }
            })
            .with_props(PropSchema::new().prop("open", PropShape::Boolean)),
        )
        .unwrap();

    let element = registry.create("x-toggle").unwrap();
    assert_eq!(element.content(), None);
    assert_eq!(child_renders.load(Ordering::SeqCst), 0);

    element.attribute_changed("open", None, Some(""));
    assert_eq!(element.content().as_deref(), Some("<p>details</p>"));
    assert_eq!(child_renders.load(Ordering::SeqCst), 1);

    element.attribute_changed("open", Some(""), None);
    assert_eq!(element.content(), None);
    assert_eq!(child_renders.load(Ordering::SeqCst), 1);
}

/// A memo only listens to the signals of the branch it took last.
#[test]
fn dependency_minimality() {
    let use_left = Signal::new(true);
    let left = Signal::new(1);
    let right = Signal::new(2);
    let evaluations = Arc::new(AtomicUsize::new(0));

    let picked = Memo::new({
        let (use_left, left, right, evaluations) =
            (use_left.clone(), left.clone(), right.clone(), evaluations.clone());
        move || {
            evaluations.fetch_add(1, Ordering::SeqCst);
            if use_left.get() {
                left.get()
            } else {
                right.get()
            }
        }
    });
    let seen = Arc::new(AtomicUsize::new(0));
    let effect = Effect::new({
        let (picked, seen) = (picked.clone(), seen.clone());
        move || seen.store(picked.get() as usize, Ordering::SeqCst)
    });

    right.set(20);
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);

    use_left.set(false);
    assert_eq!(seen.load(Ordering::SeqCst), 20);
    left.set(10);
    assert_eq!(evaluations.load(Ordering::SeqCst), 2);
    assert_eq!(left.subscriber_count(), 0);
    effect.dispose();
}

/// Equal writes notify nobody; batched writes run an effect once.
#[test]
fn write_idempotence_and_batching() {
    let a = Signal::new(1);
    let b = Signal::new(1);
    let runs = Arc::new(AtomicUsize::new(0));
    let effect = Effect::new({
        let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
        move || {
            a.get();
            b.get();
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });

    a.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    batch(|| {
        a.set(2);
        b.set(2);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    effect.dispose();
}

/// After a scope is disposed its effects never run again.
#[test]
fn scope_disposal_cuts_propagation() {
    let source = Signal::new(0);
    let runs = Arc::new(AtomicUsize::new(0));
    let (_, scope) = run_in_scope(|| {
        let doubled = Memo::new({
            let source = source.clone();
            move || source.get() * 2
        });
        Effect::new({
            let runs = runs.clone();
            move || {
                doubled.get();
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });
    });

    scope.dispose();
    source.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(source.subscriber_count(), 0);
}

/// The nearest provider answers, and only it.
#[test]
fn context_exclusivity_across_elements() {
    let letter = create_context::<String>("letter");
    let registry = ElementRegistry::new();

    for (tag, value) in [("x-provide-a", "A"), ("x-provide-b", "B")] {
        registry
            .define(
                tag,
                ComponentDefinition::new(move |api: &SetupApi| {
                    api.context().provide(&letter, move || value.to_owned());
                    Template::nothing
                }),
            )
            .unwrap();
    }
    registry
        .define(
            "x-reader",
            ComponentDefinition::new(move |api: &SetupApi| {
                let value = api.context().consume(&letter);
                move || Template::html(value.get().unwrap_or_else(|| "none".into()))
            }),
        )
        .unwrap();

    let outer = registry.create("x-provide-a").unwrap();
    let inner = registry.create_within("x-provide-b", outer.context()).unwrap();
    let near = registry.create_within("x-reader", inner.context()).unwrap();
    let far = registry.create_within("x-reader", outer.context()).unwrap();
    let orphan = registry.create("x-reader").unwrap();

    assert_eq!(near.content().as_deref(), Some("B"));
    assert_eq!(far.content().as_deref(), Some("A"));
    assert_eq!(orphan.content().as_deref(), Some("none"));
}

/// Disposing a provider element stops updates to its consumers.
#[test]
fn provider_disposal_stops_consumer_updates() {
    let theme = create_context::<String>("theme");
    let source = Signal::new("light".to_owned());
    let registry = ElementRegistry::new();
    registry
        .define(
            "x-theme",
            ComponentDefinition::new({
                let source = source.clone();
                move |api: &SetupApi| {
                    let source = source.clone();
                    api.context().provide(&theme, move || source.get());
                    Template::nothing
                }
            }),
        )
        .unwrap();
    registry
        .define(
            "x-themed",
            ComponentDefinition::new(move |api: &SetupApi| {
                let value = api.context().consume(&theme);
                move || Template::html(value.get().unwrap_or_default())
            }),
        )
        .unwrap();

    let provider = registry.create("x-theme").unwrap();
    let consumer = registry.create_within("x-themed", provider.context()).unwrap();
    source.set("dark".into());
    assert_eq!(consumer.content().as_deref(), Some("dark"));

    provider.dispose();
    source.set("contrast".into());
    assert_eq!(consumer.content().as_deref(), Some("dark"));
    assert_eq!(consumer.render_count(), 2);
}

fn app_routes() -> Vec<RouteDescriptor> {
    vec![RouteDescriptor::new("root", "/")
        .child(RouteDescriptor::new("home", ""))
        .child(
            RouteDescriptor::new("users", "users")
                .child(RouteDescriptor::new("user", ":id").loader(Loader::sync(|args| {
                    Ok(json!({ "name": format!("user {}", args.params["id"]) }))
                }))),
        )]
}

/// The outlet renders a slot named after the matched route at its depth.
#[test]
fn outlet_follows_navigation() {
    let registry = ElementRegistry::new();
    registry.define(OUTLET_TAG, outlet_definition()).unwrap();
    let router = MemoryRouter::new(app_routes(), MemoryRouterConfig::default()).unwrap();
    let (_, _app) = run_in_scope(|| provide_router(registry.document(), router.clone()).unwrap());

    let outlet = registry.create(OUTLET_TAG).unwrap();
    let nested = registry.create(OUTLET_TAG).unwrap();
    nested.attribute_changed("depth", None, Some("2"));
    assert_eq!(outlet.content().as_deref(), Some(r#"<slot name="home"></slot>"#));
    assert_eq!(nested.content().as_deref(), Some(r#"<slot name=""></slot>"#));

    router.navigate("/users/3".into(), NavigateOptions::default()).unwrap();
    assert_eq!(outlet.content().as_deref(), Some(r#"<slot name="users"></slot>"#));
    assert_eq!(nested.content().as_deref(), Some(r#"<slot name="user"></slot>"#));
}

/// A link inside a component navigates the provided router.
#[test]
fn link_click_navigates() {
    let registry = ElementRegistry::new();
    let failures: Arc<Mutex<Vec<String>>> = Arc::default();
    registry
        .define(
            "x-nav",
            ComponentDefinition::new({
                let failures = failures.clone();
                move |api: &SetupApi| {
                    let navigate = consume_navigate(api.context());
                    let failures = failures.clone();
                    move || {
                        let (navigate, failures) = (navigate.clone(), failures.clone());
                        Template::html(r#"<a href="/users/9">nine</a>"#).on("click", move |event| {
                            if let Err(error) = link_handler(&navigate, event) {
                                failures.lock().push(error.to_string());
                            }
                        })
                    }
                }
            }),
        )
        .unwrap();
    let router = MemoryRouter::new(app_routes(), MemoryRouterConfig::default()).unwrap();
    let (_, _app) = run_in_scope(|| provide_router(registry.document(), router.clone()).unwrap());
    let nav = registry.create("x-nav").unwrap();

    let click = Event::new("click").with_path(vec![
        EventTarget::Anchor {
            href: "http://localhost/users/9".into(),
        },
        EventTarget::ShadowRoot,
        EventTarget::Document,
    ]);
    nav.dispatch(&click);
    assert!(click.default_prevented());
    assert_eq!(router.state().location.pathname, "/users/9");
    assert_eq!(router.state().loader_data("user"), Some(&json!({ "name": "user 9" })));

    nav.dispatch(&Event::new("click").with_path(vec![EventTarget::Document]));
    assert_eq!(failures.lock().len(), 1);
}

/// Async loader data reaches components once the loader completes.
#[tokio::test]
async fn async_loader_data_reaches_components() {
    let routes = vec![RouteDescriptor::new("root", "/")
        .child(RouteDescriptor::new("home", ""))
        .child(RouteDescriptor::new("profile", "profile").loader(Loader::future(|_| async {
            tokio::task::yield_now().await;
            Ok(json!("ada"))
        })))];
    let router = MemoryRouter::new(routes, MemoryRouterConfig::default()).unwrap();

    let registry = ElementRegistry::new();
    registry
        .define(
            "x-profile",
            ComponentDefinition::new(|api: &SetupApi| {
                let data = consume_loader_data(api.context(), "profile");
                move || match data.get() {
                    Some(name) => Template::html(format!("<p>{}</p>", name.as_str().unwrap_or("?"))),
                    None => Template::html("<p>loading</p>"),
                }
            }),
        )
        .unwrap();
    let (_, _app) = run_in_scope(|| provide_router(registry.document(), router.clone()).unwrap());
    let profile = registry.create("x-profile").unwrap();

    router.navigate("/profile".into(), NavigateOptions::default()).unwrap();
    assert!(router.state().is_loading());
    assert_eq!(profile.content().as_deref(), Some("<p>loading</p>"));

    router.idle().await;
    assert_eq!(profile.content().as_deref(), Some("<p>ada</p>"));
}
