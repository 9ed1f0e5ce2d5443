//! The reconciler.
//!
//! A [`Renderer`] owns a [`HostAdapter`] and keeps the host tree in sync
//! with vnode trees. `render(vnode, container)` patches the previous tree of
//! `container` into the new one:
//!
//! 1. Identical vnodes (same `Rc`) are skipped.
//! 2. Vnodes that are not the *same* (type and key) are replaced: the old
//!    subtree is unmounted and the new one mounted where it was.
//! 3. Otherwise the node is patched in place by kind. Text compares content,
//!    elements diff props then children, fragments diff children against the
//!    container, components decide whether their props or slots changed and
//!    re-run their render effect if so.
//!
//! Children lists go through the keyed diff in [`children`], which uses a
//! longest increasing subsequence to move as few host entities as possible.
//!
//! Component render effects are eager, and their scheduler queues the
//! instance's update job on the [`scheduler`](crate::scheduler). However many
//! dependencies change before the next flush, each component renders once.
//!
//! # Example
//!
//! ```
//! use arbor_core::host::MemoryHost;
//! use arbor_core::renderer::{create_renderer, VNode};
//!
//! let renderer = create_renderer(MemoryHost::new());
//! let root = renderer.with_host_mut(|host| host.create_root("app"));
//!
//! renderer.render(VNode::element("p").text("hello").build(), root);
//! assert_eq!(renderer.with_host(|host| host.inner_markup(root)), "<p>hello</p>");
//! ```

mod children;
mod sequence;
mod vnode;

pub use sequence::longest_increasing_subsequence;
pub use vnode::{
    Children, Key, NodeType, Props, ShapeFlags, SlotFn, Slots, VNode, VNodeBuilder, WeakVNode,
};

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, error, instrument, trace};

use crate::component::{should_update_component, ComponentInstance, LifecycleHook};
use crate::config::RendererConfig;
use crate::error::{Error, Result};
use crate::host::{HostAdapter, HostNode};
use crate::reactive::ReactiveEffect;
use crate::scheduler::{self, Job};

/// Create a renderer with the default configuration.
pub fn create_renderer<H: HostAdapter + 'static>(host: H) -> Renderer<H> {
    create_renderer_with_config(host, RendererConfig::default())
}

pub fn create_renderer_with_config<H: HostAdapter + 'static>(
    host: H,
    config: RendererConfig,
) -> Renderer<H> {
    Renderer {
        inner: Rc::new(RendererInner {
            host: RefCell::new(host),
            roots: RefCell::new(HashMap::new()),
            config,
            depth: Cell::new(0),
            batch_depth: Cell::new(0),
            post_hooks: RefCell::new(Vec::new()),
            storage: Cell::new(None),
        }),
    }
}

/// Reconciles vnode trees onto a host. Cloning shares the renderer.
pub struct Renderer<H: HostAdapter + 'static> {
    inner: Rc<RendererInner<H>>,
}

struct RendererInner<H> {
    host: RefCell<H>,
    /// Mounted tree of each container.
    roots: RefCell<HashMap<HostNode, VNode>>,
    config: RendererConfig,
    depth: Cell<usize>,
    batch_depth: Cell<usize>,
    /// Hooks deferred until the outermost batch finishes.
    post_hooks: RefCell<Vec<(Rc<ComponentInstance>, LifecycleHook)>>,
    /// Parking element for deactivated keep-alive subtrees.
    storage: Cell<Option<HostNode>>,
}

impl<H: HostAdapter + 'static> Clone for Renderer<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl<H: HostAdapter + 'static> Renderer<H> {
    /// Render `vnode` into `container`, patching whatever was rendered there
    /// before. `None` unmounts the current tree.
    #[instrument(level = "debug", skip(self, vnode))]
    pub fn render(&self, vnode: impl Into<Option<VNode>>, container: HostNode) {
        let vnode = vnode.into();
        let prev = self.inner.roots.borrow().get(&container).cloned();

        self.batch(|| match vnode {
            Some(vnode) => {
                self.patch(prev.as_ref(), &vnode, container, None, None);
                self.inner.roots.borrow_mut().insert(container, vnode);
            }
            None => {
                if let Some(prev) = prev {
                    self.unmount(&prev, None, true);
                }
                self.inner.roots.borrow_mut().remove(&container);
            }
        });
    }

    /// Unmount the tree rendered into `container`.
    pub fn unmount_container(&self, container: HostNode) -> Result<()> {
        if !self.inner.roots.borrow().contains_key(&container) {
            return Err(Error::NotMounted(container));
        }
        self.render(None, container);
        Ok(())
    }

    /// The tree currently rendered into `container`.
    pub fn root(&self, container: HostNode) -> Option<VNode> {
        self.inner.roots.borrow().get(&container).cloned()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.inner.config
    }

    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&self.inner.host.borrow())
    }

    pub fn with_host_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.inner.host.borrow_mut())
    }

    /// Destroy a cached keep-alive component.
    ///
    /// A deactivated instance is unmounted right away. One that is currently
    /// shown only loses its keep-alive flags, so its next unmount destroys it.
    pub fn prune_cached(&self, cached: &VNode) {
        let Some(instance) = cached.component_instance() else {
            return;
        };
        cached.clear_keep_alive();
        if instance.is_deactivated() && !instance.is_unmounted() {
            debug!(component = instance.name(), "pruning cached component");
            self.batch(|| self.unmount_component(cached, true));
        }
    }

    /// Run `f`, then flush post hooks once the outermost batch is done.
    fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let depth = &self.inner.batch_depth;
        depth.set(depth.get() + 1);
        let result = f();
        depth.set(depth.get() - 1);
        if depth.get() == 0 {
            self.flush_post_hooks();
        }
        result
    }

    /// Run the hooks of `phase` now, or after the outermost batch for post
    /// phases.
    fn fire_hook(&self, instance: &Rc<ComponentInstance>, phase: LifecycleHook) {
        if instance.hook_count(phase) == 0 {
            return;
        }
        if phase.is_post() {
            self.inner.post_hooks.borrow_mut().push((instance.clone(), phase));
        } else {
            instance.call_hook(phase);
        }
    }

    fn flush_post_hooks(&self) {
        loop {
            let hooks = std::mem::take(&mut *self.inner.post_hooks.borrow_mut());
            if hooks.is_empty() {
                break;
            }
            trace!(count = hooks.len(), "flushing post hooks");
            for (instance, phase) in hooks {
                if !instance.is_unmounted() {
                    instance.call_hook(phase);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Patch
    // ------------------------------------------------------------------------

    fn patch(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&Rc<ComponentInstance>>,
    ) {
        if n1.is_some_and(|n1| n1.ptr_eq(n2)) {
            return;
        }

        let depth = self.inner.depth.get();
        if depth >= self.inner.config.depth_limit {
            error!(depth, limit = self.inner.config.depth_limit, "Depth limit reached");
            return;
        }
        self.inner.depth.set(depth + 1);
        let _depth = DepthGuard(&self.inner.depth);

        let mut n1 = n1;
        let mut anchor = anchor;
        if let Some(old) = n1 {
            if !old.is_same(n2) {
                trace!(old = ?old.node_type(), new = ?n2.node_type(), "replacing node");
                anchor = self.next_host_anchor(old).or(anchor);
                self.unmount(old, parent, true);
                n1 = None;
            }
        }

        match n2.node_type() {
            NodeType::Text => self.process_text(n1, n2, container, anchor),
            NodeType::Fragment => self.process_fragment(n1, n2, container, anchor, parent),
            NodeType::Element(_) => self.process_element(n1, n2, container, anchor, parent),
            NodeType::Component(_) => self.process_component(n1, n2, container, anchor, parent),
        }
    }

    fn process_text(&self, n1: Option<&VNode>, n2: &VNode, container: HostNode, anchor: Option<HostNode>) {
        match n1 {
            None => {
                let mut host = self.inner.host.borrow_mut();
                let el = host.create_text(n2.text_content());
                host.insert(el, container, anchor);
                n2.set_el(Some(el));
            }
            Some(n1) => {
                let el = n1.el();
                n2.set_el(el);
                if n1.text_content() != n2.text_content() {
                    if let Some(el) = el {
                        self.inner.host.borrow_mut().set_text(el, n2.text_content());
                    }
                }
            }
        }
    }

    fn process_fragment(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&Rc<ComponentInstance>>,
    ) {
        match n1 {
            None => self.mount_children(n2.children().nodes(), container, anchor, parent),
            Some(n1) => self.patch_children(n1, n2, container, anchor, parent),
        }
        n2.set_el(n2.first_host_node());
    }

    fn process_element(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&Rc<ComponentInstance>>,
    ) {
        let Some(n1) = n1 else {
            self.mount_element(n2, container, anchor, parent);
            return;
        };

        let Some(el) = n1.el() else {
            self.mount_element(n2, container, anchor, parent);
            return;
        };
        n2.set_el(Some(el));
        self.patch_props(el, n1.props(), n2.props());
        self.patch_children(n1, n2, el, None, parent);
    }

    fn mount_element(
        &self,
        vnode: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&Rc<ComponentInstance>>,
    ) {
        let NodeType::Element(tag) = vnode.node_type() else {
            return;
        };
        let el = {
            let mut host = self.inner.host.borrow_mut();
            let el = host.create_element(tag);
            for (key, value) in vnode.props() {
                host.patch_prop(el, key, None, Some(value));
            }
            el
        };
        vnode.set_el(Some(el));

        match vnode.children() {
            Children::Text(text) => self.inner.host.borrow_mut().set_element_text(el, text),
            Children::Nodes(nodes) => self.mount_children(nodes, el, None, parent),
            Children::None | Children::Slots(_) => {}
        }

        self.inner.host.borrow_mut().insert(el, container, anchor);
    }

    /// Send changed and removed props to the host.
    fn patch_props(&self, el: HostNode, prev: &Props, next: &Props) {
        let mut host = self.inner.host.borrow_mut();
        for (key, value) in next {
            let old = prev.get(key);
            if old.map_or(true, |old| !old.same_value(value)) {
                host.patch_prop(el, key, old, Some(value));
            }
        }
        for (key, old) in prev {
            if !next.contains_key(key) {
                host.patch_prop(el, key, Some(old), None);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------------

    fn process_component(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&Rc<ComponentInstance>>,
    ) {
        match n1 {
            None if n2.shape().contains(ShapeFlags::COMPONENT_KEPT_ALIVE) => {
                self.activate(n2, container, anchor);
            }
            None => self.mount_component(n2, container, anchor, parent),
            Some(n1) => self.update_component(n1, n2, container, anchor, parent),
        }
    }

    fn mount_component(
        &self,
        vnode: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&Rc<ComponentInstance>>,
    ) {
        let NodeType::Component(def) = vnode.node_type() else {
            return;
        };
        let instance = ComponentInstance::new(vnode, def.clone(), parent);
        vnode.set_component_instance(Some(instance.clone()));
        instance.set_mount_target(container, anchor);

        debug!(component = instance.name(), uid = instance.uid(), "mounting component");
        instance.setup();
        self.setup_render_effect(&instance);
    }

    /// Wrap the instance's update in an eager effect whose scheduler queues
    /// the instance's job, then run it for the first mount.
    fn setup_render_effect(&self, instance: &Rc<ComponentInstance>) {
        let weak_instance = Rc::downgrade(instance);
        let job = Job::new({
            let weak_instance = weak_instance.clone();
            move || {
                if let Some(instance) = weak_instance.upgrade() {
                    instance.run_render_effect(false);
                }
            }
        });

        let renderer: Weak<RendererInner<H>> = Rc::downgrade(&self.inner);
        let queued = job.clone();
        let effect = ReactiveEffect::new(
            move || {
                let (Some(inner), Some(instance)) = (renderer.upgrade(), weak_instance.upgrade()) else {
                    return;
                };
                let renderer = Renderer { inner };
                renderer.batch(|| renderer.component_update(&instance));
            },
            Some(Box::new(move || scheduler::queue_job(&queued))),
        );

        instance.install_render_effect(effect.clone(), job);
        effect.run();
    }

    /// Body of a component's render effect: first mount or update.
    fn component_update(&self, instance: &Rc<ComponentInstance>) {
        if instance.is_unmounted() {
            return;
        }

        if !instance.is_mounted() {
            self.fire_hook(instance, LifecycleHook::BeforeMount);
            let tree = instance.render_root();
            let (Some(container), anchor) = instance.mount_target() else {
                return;
            };
            instance.replace_sub_tree(Some(tree.clone()));
            self.patch(None, &tree, container, anchor, Some(instance));
            let keep_alive = instance.vnode().is_some_and(|vnode| {
                vnode.set_el(tree.first_host_node());
                vnode.shape().contains(ShapeFlags::COMPONENT_SHOULD_KEEP_ALIVE)
            });
            instance.set_mounted();
            debug!(component = instance.name(), uid = instance.uid(), "component mounted");
            self.fire_hook(instance, LifecycleHook::Mounted);
            if keep_alive {
                self.fire_hook(instance, LifecycleHook::Activated);
            }
            return;
        }

        if let Some(next) = instance.take_next() {
            instance.apply_next(&next);
        }
        self.fire_hook(instance, LifecycleHook::BeforeUpdate);

        let next_tree = instance.render_root();
        let prev_tree = instance.replace_sub_tree(Some(next_tree.clone()));

        let (stored_container, stored_anchor) = instance.mount_target();
        let container = {
            let host = self.inner.host.borrow();
            prev_tree
                .as_ref()
                .and_then(VNode::first_host_node)
                .and_then(|node| host.parent_node(node))
                .or(stored_container)
        };
        let Some(container) = container else {
            return;
        };
        let anchor = prev_tree
            .as_ref()
            .and_then(|tree| self.next_host_anchor(tree))
            .or_else(|| {
                let host = self.inner.host.borrow();
                stored_anchor.filter(|a| host.parent_node(*a) == Some(container))
            });
        instance.set_mount_target(container, anchor);

        self.patch(prev_tree.as_ref(), &next_tree, container, anchor, Some(instance));
        if let Some(vnode) = instance.vnode() {
            vnode.set_el(next_tree.first_host_node());
        }
        trace!(component = instance.name(), uid = instance.uid(), "component updated");
        self.fire_hook(instance, LifecycleHook::Updated);
    }

    fn update_component(
        &self,
        n1: &VNode,
        n2: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&Rc<ComponentInstance>>,
    ) {
        let Some(instance) = n1.component_instance() else {
            self.mount_component(n2, container, anchor, parent);
            return;
        };
        n2.set_component_instance(Some(instance.clone()));

        if should_update_component(n1, n2) {
            instance.set_next(n2.clone());
            // Already being re-rendered here; drop the queued copy.
            if let Some(job) = instance.update_job() {
                scheduler::invalidate_job(&job);
            }
            instance.run_render_effect(true);
        } else {
            n2.set_el(n1.el());
            instance.set_vnode(n2);
        }
    }

    fn unmount_component(&self, vnode: &VNode, do_remove: bool) {
        let Some(instance) = vnode.component_instance() else {
            return;
        };
        if instance.is_unmounted() {
            return;
        }

        self.fire_hook(&instance, LifecycleHook::BeforeUnmount);
        instance.scope().stop();
        if let Some(job) = instance.update_job() {
            scheduler::invalidate_job(&job);
        }
        if let Some(tree) = instance.sub_tree() {
            self.unmount(&tree, Some(&instance), do_remove);
        }
        instance.set_unmounted();
        self.fire_hook(&instance, LifecycleHook::Unmounted);
        debug!(component = instance.name(), uid = instance.uid(), "component unmounted");
    }

    // ------------------------------------------------------------------------
    // Keep-alive
    // ------------------------------------------------------------------------

    fn storage_container(&self) -> HostNode {
        if let Some(storage) = self.inner.storage.get() {
            return storage;
        }
        let storage = self.inner.host.borrow_mut().create_element("div");
        self.inner.storage.set(Some(storage));
        storage
    }

    fn deactivate(&self, vnode: &VNode) {
        let Some(instance) = vnode.component_instance() else {
            return;
        };
        let storage = self.storage_container();
        self.move_vnode(vnode, storage, None);
        instance.set_deactivated(true);
        debug!(component = instance.name(), uid = instance.uid(), "component deactivated");
        self.fire_hook(&instance, LifecycleHook::Deactivated);
    }

    fn activate(&self, vnode: &VNode, container: HostNode, anchor: Option<HostNode>) {
        let Some(instance) = vnode.component_instance() else {
            return;
        };
        self.move_vnode(vnode, container, anchor);
        instance.set_mount_target(container, anchor);

        match instance.vnode() {
            Some(prev) if !should_update_component(&prev, vnode) => instance.set_vnode(vnode),
            _ => {
                instance.set_next(vnode.clone());
                instance.run_render_effect(true);
            }
        }
        vnode.set_el(vnode.first_host_node());
        instance.set_deactivated(false);
        debug!(component = instance.name(), uid = instance.uid(), "component activated");
        self.fire_hook(&instance, LifecycleHook::Activated);
    }

    // ------------------------------------------------------------------------
    // Unmount and move
    // ------------------------------------------------------------------------

    fn unmount(&self, vnode: &VNode, parent: Option<&Rc<ComponentInstance>>, do_remove: bool) {
        if vnode.is_component() {
            if vnode.shape().contains(ShapeFlags::COMPONENT_SHOULD_KEEP_ALIVE) {
                self.deactivate(vnode);
            } else {
                self.unmount_component(vnode, do_remove);
            }
            return;
        }

        match vnode.node_type() {
            NodeType::Fragment => {
                for child in vnode.children().nodes() {
                    self.unmount(child, parent, do_remove);
                }
            }
            NodeType::Element(_) => {
                for child in vnode.children().nodes() {
                    self.unmount(child, parent, false);
                }
                if do_remove {
                    self.remove_el(vnode);
                }
            }
            NodeType::Text => {
                if do_remove {
                    self.remove_el(vnode);
                }
            }
            NodeType::Component(_) => {}
        }
    }

    fn remove_el(&self, vnode: &VNode) {
        if let Some(el) = vnode.el() {
            self.inner.host.borrow_mut().remove(el);
        }
    }

    fn unmount_children(&self, children: &[VNode], parent: Option<&Rc<ComponentInstance>>) {
        for child in children {
            self.unmount(child, parent, true);
        }
    }

    fn mount_children(
        &self,
        children: &[VNode],
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&Rc<ComponentInstance>>,
    ) {
        for child in children {
            self.patch(None, child, container, anchor, parent);
        }
    }

    /// Re-insert every host entity of `vnode` before `anchor`.
    fn move_vnode(&self, vnode: &VNode, container: HostNode, anchor: Option<HostNode>) {
        match vnode.node_type() {
            NodeType::Component(_) => {
                if let Some(tree) = vnode.component_instance().and_then(|i| i.sub_tree()) {
                    self.move_vnode(&tree, container, anchor);
                }
            }
            NodeType::Fragment => {
                for child in vnode.children().nodes() {
                    self.move_vnode(child, container, anchor);
                }
            }
            NodeType::Text | NodeType::Element(_) => {
                if let Some(el) = vnode.el() {
                    self.inner.host.borrow_mut().insert(el, container, anchor);
                }
            }
        }
    }

    /// The host entity right after `vnode`'s subtree.
    fn next_host_anchor(&self, vnode: &VNode) -> Option<HostNode> {
        let last = vnode.last_host_node()?;
        self.inner.host.borrow().next_sibling(last)
    }
}
