//! Integration Tests for the Renderer
//!
//! These tests mount components into a `MemoryHost` and check the resulting
//! markup and the host operation log.

use std::cell::RefCell;
use std::rc::Rc;

use arbor_core::host::{HostNode, HostOp, MemoryHost};
use arbor_core::renderer::create_renderer;
use arbor_core::{
    scheduler, watch, Component, LifecycleHook, Record, Ref, Renderer, SetupResult, VNode, Value,
    WatchOptions,
};

type Log = Rc<RefCell<Vec<String>>>;

fn mount_point() -> (Renderer<MemoryHost>, HostNode) {
    let renderer = create_renderer(MemoryHost::new());
    let root = renderer.with_host_mut(|host| host.create_root("root"));
    (renderer, root)
}

fn markup(renderer: &Renderer<MemoryHost>, root: HostNode) -> String {
    renderer.with_host(|host| host.inner_markup(root))
}

fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

/// Test the counter end to end: one increment, one flush, one text update.
#[test]
fn counter_updates_text_once_per_flush() {
    let increment: Rc<RefCell<Option<Box<dyn Fn()>>>> = Rc::new(RefCell::new(None));

    let counter = Component::builder("Counter")
        .setup({
            let increment = increment.clone();
            move |_, _| {
                let count = Ref::new(0);
                *increment.borrow_mut() = Some(Box::new({
                    let count = count.clone();
                    move || count.update(|n| n + 1)
                }));
                SetupResult::render(move |_| VNode::text(count.get().to_string()))
            }
        })
        .build();

    let (renderer, root) = mount_point();
    renderer.render(VNode::component(&counter).build(), root);
    assert_eq!(markup(&renderer, root), "0");
    renderer.with_host_mut(MemoryHost::clear_ops);

    if let Some(increment) = increment.borrow().as_ref() {
        increment();
    }
    assert_eq!(markup(&renderer, root), "0");

    scheduler::flush_jobs();
    assert_eq!(markup(&renderer, root), "1");
    let set_text = renderer.with_host(|host| host.count_ops(|op| matches!(op, HostOp::SetText { .. })));
    assert_eq!(set_text, 1);
}

/// Test that two writes before a flush produce one render with both values.
#[test]
fn writes_are_batched_into_one_render() {
    let pair = Component::builder("Pair")
        .data(|_| Value::Object(Record::from_iter([("left", "a"), ("right", "b")])))
        .render(|ctx| {
            VNode::element("span")
                .text(format!("{}-{}", ctx.get("left"), ctx.get("right")))
                .build()
        })
        .build();

    let (renderer, root) = mount_point();
    let app = VNode::component(&pair).build();
    renderer.render(app.clone(), root);
    let instance = app.component_instance().unwrap();
    assert_eq!(instance.render_count(), 1);

    instance.state().set("left", "x");
    instance.state().set("right", "y");
    assert_eq!(scheduler::pending_job_count(), 1);

    scheduler::flush_jobs();
    assert_eq!(instance.render_count(), 2);
    assert_eq!(markup(&renderer, root), "<span>x-y</span>");
}

/// Test that a child re-renders only when its props change.
#[test]
fn child_updates_follow_props() {
    let label = Component::builder("Label")
        .props(["text"])
        .render(|ctx| VNode::element("b").text(ctx.get("text").to_string()).build())
        .build();

    let (renderer, root) = mount_point();
    let render_parent = |title: &str, text: &str| {
        VNode::element("div")
            .prop("title", title)
            .child(VNode::component(&label).prop("text", text).build())
            .build()
    };

    renderer.render(render_parent("t1", "hello"), root);
    let child = || {
        renderer
            .root(root)
            .and_then(|tree| tree.children().nodes().first().cloned())
            .and_then(|node| node.component_instance())
            .unwrap()
    };
    assert_eq!(child().render_count(), 1);

    renderer.render(render_parent("t2", "hello"), root);
    assert_eq!(child().render_count(), 1);

    renderer.render(render_parent("t2", "bye"), root);
    assert_eq!(child().render_count(), 2);
    assert_eq!(markup(&renderer, root), r#"<div title="t2"><b>bye</b></div>"#);
    assert!(!scheduler::has_pending_jobs());
}

/// Test that undeclared props become attrs and declared ones are readable.
#[test]
fn attrs_and_props_are_split() {
    let seen = Rc::new(RefCell::new(None));
    let tag = Component::builder("Tag")
        .props(["name"])
        .setup({
            let seen = seen.clone();
            move |_, ctx| {
                *seen.borrow_mut() = ctx.attrs().get("id");
                SetupResult::Empty
            }
        })
        .render(|ctx| VNode::element("i").text(ctx.get("name").to_string()).build())
        .build();

    let (renderer, root) = mount_point();
    renderer.render(
        VNode::component(&tag).prop("name", "n").prop("id", 7).build(),
        root,
    );
    assert_eq!(*seen.borrow(), Some(Value::from(7)));
    assert_eq!(markup(&renderer, root), "<i>n</i>");
}

/// Test hook ordering across a parent and a child.
#[test]
fn lifecycle_hooks_run_in_order() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    let hooked = |name: &'static str, log: &Log, child: Option<Rc<Component>>| {
        let log = log.clone();
        Component::builder(name)
            .data(|_| Value::Object(Record::from_iter([("n", 0)])))
            .setup(move |_, ctx| {
                for (phase, label) in [
                    (LifecycleHook::BeforeMount, "before_mount"),
                    (LifecycleHook::Mounted, "mounted"),
                    (LifecycleHook::BeforeUpdate, "before_update"),
                    (LifecycleHook::Updated, "updated"),
                    (LifecycleHook::BeforeUnmount, "before_unmount"),
                    (LifecycleHook::Unmounted, "unmounted"),
                ] {
                    let log = log.clone();
                    ctx.on(phase, move || push(&log, format!("{name} {label}")));
                }
                SetupResult::Empty
            })
            .render(move |ctx| {
                let text = VNode::text(ctx.get("n").to_string());
                match &child {
                    Some(child) => VNode::fragment([text, VNode::component(child).build()]),
                    None => text,
                }
            })
            .build()
    };

    let child = hooked("child", &log, None);
    let parent = hooked("parent", &log, Some(child));

    let (renderer, root) = mount_point();
    let app = VNode::component(&parent).build();
    renderer.render(app.clone(), root);
    assert_eq!(
        *log.borrow(),
        vec![
            "parent before_mount",
            "child before_mount",
            "child mounted",
            "parent mounted"
        ]
    );

    log.borrow_mut().clear();
    app.component_instance().unwrap().state().set("n", 1);
    scheduler::flush_jobs();
    assert_eq!(*log.borrow(), vec!["parent before_update", "parent updated"]);
    assert_eq!(markup(&renderer, root), "10");

    log.borrow_mut().clear();
    renderer.render(None, root);
    assert_eq!(
        *log.borrow(),
        vec![
            "parent before_unmount",
            "child before_unmount",
            "child unmounted",
            "parent unmounted"
        ]
    );
    assert_eq!(markup(&renderer, root), "");
}

/// Test that unmounting stops watchers created during setup.
#[test]
fn unmount_stops_setup_watchers() {
    let source = Ref::new(0);
    let calls = Rc::new(RefCell::new(0));

    let watcher = Component::builder("Watcher")
        .setup({
            let (source, calls) = (source.clone(), calls.clone());
            move |_, _| {
                let calls = calls.clone();
                let _handle = watch(
                    source.clone(),
                    move |_: &i32, _: Option<&i32>, _| *calls.borrow_mut() += 1,
                    WatchOptions::default(),
                );
                SetupResult::Empty
            }
        })
        .render(|_| VNode::element("div").build())
        .build();

    let (renderer, root) = mount_point();
    renderer.render(VNode::component(&watcher).build(), root);

    source.set(1);
    scheduler::flush_jobs();
    assert_eq!(*calls.borrow(), 1);

    renderer.render(None, root);
    source.set(2);
    scheduler::flush_jobs();
    assert_eq!(*calls.borrow(), 1);
}

/// Test that a queued update of an unmounted component never runs.
#[test]
fn pending_update_is_dropped_on_unmount() {
    let view = Component::builder("View")
        .data(|_| Value::Object(Record::from_iter([("n", 0)])))
        .render(|ctx| VNode::text(ctx.get("n").to_string()))
        .build();

    let (renderer, root) = mount_point();
    let app = VNode::component(&view).build();
    renderer.render(app.clone(), root);
    let instance = app.component_instance().unwrap();

    instance.state().set("n", 5);
    assert!(scheduler::has_pending_jobs());
    renderer.render(None, root);
    assert!(!scheduler::has_pending_jobs());
    assert_eq!(instance.render_count(), 1);
    assert!(instance.is_unmounted());
}

/// Test that keyed component rows keep their instances across a reorder.
#[test]
fn keyed_components_are_moved_not_remounted() {
    let row = Component::builder("Row")
        .props(["label"])
        .render(|ctx| VNode::element("li").text(ctx.get("label").to_string()).build())
        .build();
    let list = |labels: &[&str]| {
        VNode::element("ul")
            .children(
                labels
                    .iter()
                    .map(|l| VNode::component(&row).key(*l).prop("label", *l).build()),
            )
            .build()
    };

    let (renderer, root) = mount_point();
    renderer.render(list(&["a", "b", "c", "d"]), root);
    renderer.with_host_mut(MemoryHost::clear_ops);

    renderer.render(list(&["d", "b", "a", "c"]), root);
    assert_eq!(
        markup(&renderer, root),
        "<ul><li>d</li><li>b</li><li>a</li><li>c</li></ul>"
    );
    renderer.with_host(|host| {
        assert_eq!(host.created(), 0);
        assert_eq!(host.removed(), 0);
        assert_eq!(host.moved(), 2);
    });
}

/// Test that replacing a component with an element unmounts it in place.
#[test]
fn component_replaced_by_element_keeps_position() {
    let item = Component::builder("Item")
        .render(|_| VNode::element("em").text("c").build())
        .build();

    let (renderer, root) = mount_point();
    renderer.render(
        VNode::fragment([
            VNode::element("p").text("a").build(),
            VNode::component(&item).build(),
            VNode::element("p").text("z").build(),
        ]),
        root,
    );
    renderer.render(
        VNode::fragment([
            VNode::element("p").text("a").build(),
            VNode::element("strong").text("e").build(),
            VNode::element("p").text("z").build(),
        ]),
        root,
    );
    assert_eq!(markup(&renderer, root), "<p>a</p><strong>e</strong><p>z</p>");
}

/// Test slots and functional components together.
#[test]
fn slots_render_through_functional_components() {
    let frame = Component::functional("Frame", |props, slots| {
        VNode::element("section")
            .prop("class", props.get("class"))
            .children(slots.render("default"))
            .build()
    });

    let (renderer, root) = mount_point();
    renderer.render(
        VNode::component(&frame)
            .prop("class", "card")
            .default_slot(|| VNode::element("h1").text("title").build())
            .build(),
        root,
    );
    assert_eq!(
        markup(&renderer, root),
        r#"<section class="card"><h1>title</h1></section>"#
    );
}

/// Test that a state initializer given as a plain value degrades to empty
/// state instead of failing the render.
#[test]
fn static_state_degrades_gracefully() {
    let broken = Component::builder("Broken")
        .data_value(Record::from_iter([("n", 1)]))
        .render(|ctx| VNode::text(format!("[{}]", ctx.get("n"))))
        .build();

    let (renderer, root) = mount_point();
    renderer.render(VNode::component(&broken).build(), root);
    assert_eq!(markup(&renderer, root), "[]");
}

/// Test that keep-alive components keep their state while switched out.
#[test]
fn keep_alive_preserves_state() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let tab = |name: &'static str| {
        let log = log.clone();
        Component::builder(name)
            .data(|_| Value::Object(Record::from_iter([("clicks", 0)])))
            .setup(move |_, ctx| {
                let (a, d, u) = (log.clone(), log.clone(), log.clone());
                ctx.on_activated(move || push(&a, format!("{name} activated")));
                ctx.on_deactivated(move || push(&d, format!("{name} deactivated")));
                ctx.on_unmounted(move || push(&u, format!("{name} unmounted")));
                SetupResult::Empty
            })
            .render(move |ctx| VNode::element("p").text(format!("{name}:{}", ctx.get("clicks"))).build())
            .build()
    };
    let first = tab("first");
    let second = tab("second");
    let shell = |view: VNode| VNode::element("main").child(view).build();

    let (renderer, root) = mount_point();
    let first_view = VNode::component(&first).build();
    first_view.mark_keep_alive();
    renderer.render(shell(first_view.clone()), root);

    let first_instance = first_view.component_instance().unwrap();
    first_instance.state().set("clicks", 3);
    scheduler::flush_jobs();

    let second_view = VNode::component(&second).build();
    second_view.mark_keep_alive();
    renderer.render(shell(second_view.clone()), root);
    assert_eq!(markup(&renderer, root), "<main><p>second:0</p></main>");
    assert!(first_instance.is_deactivated());
    assert!(!first_instance.is_unmounted());

    let back = VNode::component(&first).build();
    assert!(back.adopt_kept_alive(&first_view));
    renderer.render(shell(back.clone()), root);
    assert_eq!(markup(&renderer, root), "<main><p>first:3</p></main>");
    assert!(Rc::ptr_eq(&back.component_instance().unwrap(), &first_instance));

    renderer.prune_cached(&second_view);
    assert_eq!(
        *log.borrow(),
        vec![
            "first activated",
            "first deactivated",
            "second activated",
            "second deactivated",
            "first activated",
            "second unmounted"
        ]
    );
}
