//! Component instances.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use super::lifecycle::{HookFn, LifecycleHook, LifecycleHooks};
use super::props::{split_props, update_props};
use super::{Component, DataOption, RenderFn, SetupResult};
use crate::host::HostNode;
use crate::reactive::{reactive, untracked, EffectScope, Reactive, ReactiveEffect};
use crate::renderer::{Children, Slots, VNode, WeakVNode};
use crate::scheduler::Job;
use crate::value::{Opaque, Record, Value};

/// The live state of one mounted component.
///
/// Instances are created by the reconciler when a component vnode is first
/// mounted and are shared by every later vnode that patches it.
pub struct ComponentInstance {
    uid: u64,
    def: Rc<Component>,
    parent: Option<Weak<ComponentInstance>>,
    vnode: RefCell<WeakVNode>,
    next: RefCell<Option<VNode>>,
    sub_tree: RefCell<Option<VNode>>,
    props: Reactive,
    attrs: Record,
    slots: RefCell<Slots>,
    state: RefCell<Reactive>,
    setup_state: RefCell<Option<Reactive>>,
    render: RefCell<Option<RenderFn>>,
    effect: RefCell<Option<ReactiveEffect<()>>>,
    job: RefCell<Option<Job>>,
    hooks: RefCell<LifecycleHooks>,
    scope: EffectScope,
    mounted: Cell<bool>,
    unmounted: Cell<bool>,
    deactivated: Cell<bool>,
    container: Cell<Option<HostNode>>,
    anchor: Cell<Option<HostNode>>,
    render_count: Cell<usize>,
}

fn slots_of(vnode: &VNode) -> Slots {
    match vnode.children() {
        Children::Slots(slots) => slots.clone(),
        Children::Nodes(nodes) => {
            let nodes = nodes.clone();
            let mut slots = Slots::new();
            slots.insert("default", move || VNode::fragment(nodes.clone()));
            slots
        }
        Children::Text(text) => {
            let text = text.clone();
            let mut slots = Slots::new();
            slots.insert("default", move || VNode::text(text.clone()));
            slots
        }
        Children::None => Slots::new(),
    }
}

impl ComponentInstance {
    pub(crate) fn new(
        vnode: &VNode,
        def: Rc<Component>,
        parent: Option<&Rc<ComponentInstance>>,
    ) -> Rc<Self> {
        static UID: AtomicU64 = AtomicU64::new(0);

        let (props, attrs) = split_props(&def, vnode.props());
        Rc::new(Self {
            uid: UID.fetch_add(1, Ordering::Relaxed),
            def,
            parent: parent.map(Rc::downgrade),
            vnode: RefCell::new(vnode.downgrade()),
            next: RefCell::new(None),
            sub_tree: RefCell::new(None),
            props: reactive(&props),
            attrs,
            slots: RefCell::new(slots_of(vnode)),
            state: RefCell::new(Reactive::new()),
            setup_state: RefCell::new(None),
            render: RefCell::new(None),
            effect: RefCell::new(None),
            job: RefCell::new(None),
            hooks: RefCell::new(LifecycleHooks::default()),
            scope: EffectScope::new(),
            mounted: Cell::new(false),
            unmounted: Cell::new(false),
            deactivated: Cell::new(false),
            container: Cell::new(None),
            anchor: Cell::new(None),
            render_count: Cell::new(0),
        })
    }

    /// Run setup and resolve state and the render function.
    ///
    /// Everything runs untracked inside the instance scope, so effects created
    /// here stop when the instance unmounts.
    pub(crate) fn setup(self: &Rc<Self>) {
        if self.def.is_functional() {
            return;
        }

        self.scope.run(|| {
            if let Some(setup) = self.def.setup_fn().cloned() {
                let ctx = SetupContext {
                    instance: self.clone(),
                };
                match untracked(|| setup(&self.props, &ctx)) {
                    SetupResult::Render(render) => {
                        self.render.replace(Some(render));
                    }
                    SetupResult::State(record) => {
                        self.setup_state.replace(Some(reactive(&record)));
                    }
                    SetupResult::Empty => {}
                }
            }

            let state = match self.def.data() {
                None => Reactive::new(),
                Some(DataOption::Factory(factory)) => match untracked(|| factory(&self.props)) {
                    Value::Object(record) => reactive(&record),
                    Value::Reactive(view) => view,
                    other => {
                        warn!(component = self.def.name(), ?other, "state initializer must return a record");
                        Reactive::new()
                    }
                },
                Some(DataOption::Static(_)) => {
                    warn!(
                        component = self.def.name(),
                        "state initializer must be a function; starting with empty state"
                    );
                    Reactive::new()
                }
            };
            self.state.replace(state);
        });

        if self.render.borrow().is_none() {
            match self.def.render_fn() {
                Some(render) => {
                    self.render.replace(Some(render.clone()));
                }
                None => warn!(component = self.def.name(), "component has no render function"),
            }
        }
        debug!(component = self.def.name(), uid = self.uid, "component set up");
    }

    /// Produce the next subtree. Reads made here are tracked by the render
    /// effect when called from it.
    pub(crate) fn render_root(self: &Rc<Self>) -> VNode {
        self.render_count.set(self.render_count.get() + 1);

        if let Some(functional) = self.def.functional_fn() {
            let slots = self.slots.borrow().clone();
            return functional(&self.props, &slots);
        }

        let render = self.render.borrow().clone();
        match render {
            Some(render) => render(&RenderContext { instance: self }),
            None => VNode::fragment(Vec::new()),
        }
    }

    /// Move pending vnode data (props, attrs, slots) into the instance.
    pub(crate) fn apply_next(&self, next: &VNode) {
        self.vnode.replace(next.downgrade());
        update_props(&self.def, &self.props, &self.attrs, next.props());
        self.slots.replace(slots_of(next));
    }

    pub(crate) fn install_render_effect(&self, effect: ReactiveEffect<()>, job: Job) {
        self.scope.add(Rc::new(effect.clone()));
        self.effect.replace(Some(effect));
        self.job.replace(Some(job));
    }

    /// Run the render effect if it is dirty, or unconditionally with `force`.
    pub(crate) fn run_render_effect(&self, force: bool) {
        let effect = self.effect.borrow().clone();
        let Some(effect) = effect else {
            return;
        };
        if !effect.is_active() {
            return;
        }
        if force {
            effect.mark_dirty();
        }
        if effect.dirty() {
            effect.run();
        }
    }

    pub(crate) fn call_hook(&self, phase: LifecycleHook) {
        let hooks = self.hooks.borrow().get(phase);
        for hook in hooks {
            untracked(|| hook());
        }
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn definition(&self) -> &Rc<Component> {
        &self.def
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn parent(&self) -> Option<Rc<ComponentInstance>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Declared props (every prop for functional components).
    pub fn props(&self) -> &Reactive {
        &self.props
    }

    /// Undeclared props. Not reactive.
    pub fn attrs(&self) -> &Record {
        &self.attrs
    }

    pub fn slots(&self) -> Slots {
        self.slots.borrow().clone()
    }

    /// State produced by the state initializer.
    pub fn state(&self) -> Reactive {
        self.state.borrow().clone()
    }

    /// Bindings returned from setup.
    pub fn setup_state(&self) -> Option<Reactive> {
        self.setup_state.borrow().clone()
    }

    /// The vnode this instance currently renders for.
    pub fn vnode(&self) -> Option<VNode> {
        self.vnode.borrow().upgrade()
    }

    pub(crate) fn set_vnode(&self, vnode: &VNode) {
        self.vnode.replace(vnode.downgrade());
    }

    pub fn sub_tree(&self) -> Option<VNode> {
        self.sub_tree.borrow().clone()
    }

    pub(crate) fn replace_sub_tree(&self, tree: Option<VNode>) -> Option<VNode> {
        self.sub_tree.replace(tree)
    }

    pub(crate) fn set_next(&self, next: VNode) {
        self.next.replace(Some(next));
    }

    pub(crate) fn take_next(&self) -> Option<VNode> {
        self.next.borrow_mut().take()
    }

    pub fn render_effect(&self) -> Option<ReactiveEffect<()>> {
        self.effect.borrow().clone()
    }

    pub fn update_job(&self) -> Option<Job> {
        self.job.borrow().clone()
    }

    pub fn scope(&self) -> &EffectScope {
        &self.scope
    }

    pub fn hook_count(&self, phase: LifecycleHook) -> usize {
        self.hooks.borrow().count(phase)
    }

    /// Number of times the render function ran.
    pub fn render_count(&self) -> usize {
        self.render_count.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    pub(crate) fn set_mounted(&self) {
        self.mounted.set(true);
    }

    pub fn is_unmounted(&self) -> bool {
        self.unmounted.get()
    }

    pub(crate) fn set_unmounted(&self) {
        self.unmounted.set(true);
    }

    pub fn is_deactivated(&self) -> bool {
        self.deactivated.get()
    }

    pub(crate) fn set_deactivated(&self, deactivated: bool) {
        self.deactivated.set(deactivated);
    }

    /// Where the subtree is mounted when it has no host entity to locate it
    /// by.
    pub(crate) fn mount_target(&self) -> (Option<HostNode>, Option<HostNode>) {
        (self.container.get(), self.anchor.get())
    }

    pub(crate) fn set_mount_target(&self, container: HostNode, anchor: Option<HostNode>) {
        self.container.set(Some(container));
        self.anchor.set(anchor);
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("uid", &self.uid)
            .field("name", &self.def.name())
            .field("mounted", &self.mounted.get())
            .field("unmounted", &self.unmounted.get())
            .field("deactivated", &self.deactivated.get())
            .field("render_count", &self.render_count.get())
            .finish()
    }
}

// ============================================================================
// Contexts
// ============================================================================

/// What a setup function can reach besides the props.
pub struct SetupContext {
    instance: Rc<ComponentInstance>,
}

impl SetupContext {
    pub fn attrs(&self) -> &Record {
        self.instance.attrs()
    }

    pub fn slots(&self) -> Slots {
        self.instance.slots()
    }

    pub fn uid(&self) -> u64 {
        self.instance.uid
    }

    /// Register a hook for any phase.
    pub fn on(&self, phase: LifecycleHook, hook: impl Fn() + 'static) {
        let hook: HookFn = Rc::new(hook);
        self.instance.hooks.borrow_mut().register(phase, hook);
    }

    pub fn on_before_mount(&self, hook: impl Fn() + 'static) {
        self.on(LifecycleHook::BeforeMount, hook);
    }

    pub fn on_mounted(&self, hook: impl Fn() + 'static) {
        self.on(LifecycleHook::Mounted, hook);
    }

    pub fn on_before_update(&self, hook: impl Fn() + 'static) {
        self.on(LifecycleHook::BeforeUpdate, hook);
    }

    pub fn on_updated(&self, hook: impl Fn() + 'static) {
        self.on(LifecycleHook::Updated, hook);
    }

    pub fn on_before_unmount(&self, hook: impl Fn() + 'static) {
        self.on(LifecycleHook::BeforeUnmount, hook);
    }

    pub fn on_unmounted(&self, hook: impl Fn() + 'static) {
        self.on(LifecycleHook::Unmounted, hook);
    }

    pub fn on_activated(&self, hook: impl Fn() + 'static) {
        self.on(LifecycleHook::Activated, hook);
    }

    pub fn on_deactivated(&self, hook: impl Fn() + 'static) {
        self.on(LifecycleHook::Deactivated, hook);
    }
}

/// The view a render function has of its instance.
///
/// [`get`](Self::get) resolves a name against state, then props, then setup
/// bindings, then the `$attrs`, `$props` and `$slots` specials. The last one
/// is an [`Opaque`] holding [`Slots`].
pub struct RenderContext<'a> {
    instance: &'a Rc<ComponentInstance>,
}

impl<'a> RenderContext<'a> {
    /// Tracked read of a name.
    ///
    /// Unknown names read as `Null`.
    pub fn get(&self, key: &str) -> Value {
        let instance = self.instance;
        let state = instance.state();
        if state.raw().contains_key(key) {
            return state.get(key);
        }
        if instance.props.raw().contains_key(key) {
            return instance.props.get(key);
        }
        if let Some(bindings) = instance.setup_state() {
            if bindings.raw().contains_key(key) {
                return bindings.get(key);
            }
        }
        match key {
            "$attrs" => Value::Object(instance.attrs.clone()),
            "$props" => Value::Reactive(instance.props.clone()),
            "$slots" => Value::Opaque(Opaque::new(instance.slots())),
            _ => Value::Null,
        }
    }

    /// Write a state field or setup binding. Returns whether it was written.
    ///
    /// Props are read-only: writing one logs a warning and changes nothing.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let instance = self.instance;
        let state = instance.state();
        if state.raw().contains_key(key) {
            state.set(key, value);
            return true;
        }
        if instance.props.raw().contains_key(key) {
            warn!(component = instance.name(), key, "props are read-only; write ignored");
            return false;
        }
        if let Some(bindings) = instance.setup_state() {
            if bindings.raw().contains_key(key) {
                bindings.set(key, value);
                return true;
            }
        }
        warn!(component = instance.name(), key, "write to unknown name ignored");
        false
    }

    pub fn props(&self) -> &Reactive {
        &self.instance.props
    }

    pub fn state(&self) -> Reactive {
        self.instance.state()
    }

    pub fn attrs(&self) -> &Record {
        &self.instance.attrs
    }

    pub fn slots(&self) -> Slots {
        self.instance.slots()
    }

    /// Render a slot, or an empty fragment when it was not passed.
    pub fn slot(&self, name: &str) -> VNode {
        self.slots()
            .render(name)
            .unwrap_or_else(|| VNode::fragment(Vec::new()))
    }

    pub fn instance(&self) -> &Rc<ComponentInstance> {
        self.instance
    }
}
