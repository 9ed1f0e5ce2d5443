//! Virtual nodes.
//!
//! A [`VNode`] describes one piece of the desired output tree: a text node,
//! an element, a fragment (a list of siblings with no wrapper), or a
//! component. Vnodes are cheap to clone and are immutable apart from the
//! bookkeeping the reconciler fills in while mounting: the host entity
//! (`el`), the component instance, and keep-alive flags.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use indexmap::IndexMap;

use crate::component::{Component, ComponentInstance};
use crate::host::HostNode;
use crate::value::Value;

bitflags! {
    /// Classification of a vnode and its children, computed at creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShapeFlags: u16 {
        const ELEMENT = 1;
        const FUNCTIONAL_COMPONENT = 1 << 1;
        const STATEFUL_COMPONENT = 1 << 2;
        const TEXT_CHILDREN = 1 << 3;
        const ARRAY_CHILDREN = 1 << 4;
        const SLOTS_CHILDREN = 1 << 5;
        /// Unmounting deactivates the component instead of destroying it.
        const COMPONENT_SHOULD_KEEP_ALIVE = 1 << 8;
        /// Mounting re-activates a cached instance instead of creating one.
        const COMPONENT_KEPT_ALIVE = 1 << 9;
        const COMPONENT = Self::FUNCTIONAL_COMPONENT.bits() | Self::STATEFUL_COMPONENT.bits();
    }
}

/// Identity of a child among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(Rc<str>),
}

impl From<i64> for Key {
    fn from(k: i64) -> Self {
        Key::Int(k)
    }
}

impl From<i32> for Key {
    fn from(k: i32) -> Self {
        Key::Int(k as i64)
    }
}

impl From<usize> for Key {
    fn from(k: usize) -> Self {
        Key::Int(k as i64)
    }
}

impl From<&str> for Key {
    fn from(k: &str) -> Self {
        Key::Str(k.into())
    }
}

impl From<String> for Key {
    fn from(k: String) -> Self {
        Key::Str(k.into())
    }
}

/// What a vnode renders as.
#[derive(Clone)]
pub enum NodeType {
    Text,
    Fragment,
    Element(Rc<str>),
    Component(Rc<Component>),
}

impl NodeType {
    /// Type equality: same tag, or the same component definition.
    pub fn same(&self, other: &NodeType) -> bool {
        match (self, other) {
            (NodeType::Text, NodeType::Text) => true,
            (NodeType::Fragment, NodeType::Fragment) => true,
            (NodeType::Element(a), NodeType::Element(b)) => a == b,
            (NodeType::Component(a), NodeType::Component(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Text => write!(f, "Text"),
            NodeType::Fragment => write!(f, "Fragment"),
            NodeType::Element(tag) => write!(f, "Element({tag})"),
            NodeType::Component(def) => write!(f, "Component({})", def.name()),
        }
    }
}

pub type Props = IndexMap<String, Value>;

/// Render function of one named slot.
pub type SlotFn = Rc<dyn Fn() -> VNode>;

/// Named slot functions passed to a component.
#[derive(Clone, Default)]
pub struct Slots {
    slots: IndexMap<String, SlotFn>,
}

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, slot: impl Fn() -> VNode + 'static) {
        self.slots.insert(name.into(), Rc::new(slot));
    }

    pub fn get(&self, name: &str) -> Option<SlotFn> {
        self.slots.get(name).cloned()
    }

    /// Render a slot, if present.
    pub fn render(&self, name: &str) -> Option<VNode> {
        self.slots.get(name).map(|slot| slot())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Slots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.slots.keys()).finish()
    }
}

/// Children of a vnode.
#[derive(Clone, Debug, Default)]
pub enum Children {
    #[default]
    None,
    Text(Rc<str>),
    Nodes(Vec<VNode>),
    /// Component children: named slot functions.
    Slots(Slots),
}

impl Children {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Children::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn nodes(&self) -> &[VNode] {
        match self {
            Children::Nodes(nodes) => nodes,
            _ => &[],
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Children::None)
    }

    fn shape(&self) -> ShapeFlags {
        match self {
            Children::None => ShapeFlags::empty(),
            Children::Text(_) => ShapeFlags::TEXT_CHILDREN,
            Children::Nodes(_) => ShapeFlags::ARRAY_CHILDREN,
            Children::Slots(_) => ShapeFlags::SLOTS_CHILDREN,
        }
    }
}

/// A node of the virtual tree. Cloning shares the node.
#[derive(Clone)]
pub struct VNode(Rc<VNodeData>);

struct VNodeData {
    node_type: NodeType,
    props: Props,
    children: Children,
    key: Option<Key>,
    shape: Cell<ShapeFlags>,
    el: Cell<Option<HostNode>>,
    component: RefCell<Option<Rc<ComponentInstance>>>,
}

/// Weak reference to a vnode, held by component instances.
#[derive(Clone, Default)]
pub struct WeakVNode(Weak<VNodeData>);

impl WeakVNode {
    pub fn upgrade(&self) -> Option<VNode> {
        self.0.upgrade().map(VNode)
    }
}

impl VNode {
    fn from_parts(node_type: NodeType, props: Props, children: Children, key: Option<Key>) -> Self {
        let type_shape = match &node_type {
            NodeType::Element(_) => ShapeFlags::ELEMENT,
            NodeType::Component(def) if def.is_functional() => ShapeFlags::FUNCTIONAL_COMPONENT,
            NodeType::Component(_) => ShapeFlags::STATEFUL_COMPONENT,
            NodeType::Text | NodeType::Fragment => ShapeFlags::empty(),
        };
        let shape = type_shape | children.shape();

        VNode(Rc::new(VNodeData {
            node_type,
            props,
            children,
            key,
            shape: Cell::new(shape),
            el: Cell::new(None),
            component: RefCell::new(None),
        }))
    }

    /// A text node.
    pub fn text(content: impl Into<Rc<str>>) -> Self {
        Self::from_parts(NodeType::Text, Props::new(), Children::Text(content.into()), None)
    }

    /// An unkeyed fragment.
    pub fn fragment(children: impl IntoIterator<Item = VNode>) -> Self {
        Self::from_parts(
            NodeType::Fragment,
            Props::new(),
            Children::Nodes(children.into_iter().collect()),
            None,
        )
    }

    /// Start building an element.
    pub fn element(tag: impl Into<Rc<str>>) -> VNodeBuilder {
        VNodeBuilder::new(NodeType::Element(tag.into()))
    }

    /// Start building a component vnode.
    pub fn component(def: &Rc<Component>) -> VNodeBuilder {
        VNodeBuilder::new(NodeType::Component(def.clone()))
    }

    /// Start building a fragment, e.g. a keyed one.
    pub fn fragment_builder() -> VNodeBuilder {
        VNodeBuilder::new(NodeType::Fragment)
    }

    pub fn node_type(&self) -> &NodeType {
        &self.0.node_type
    }

    pub fn props(&self) -> &Props {
        &self.0.props
    }

    pub fn children(&self) -> &Children {
        &self.0.children
    }

    pub fn key(&self) -> Option<&Key> {
        self.0.key.as_ref()
    }

    pub fn shape(&self) -> ShapeFlags {
        self.0.shape.get()
    }

    /// Text content of a text vnode.
    pub fn text_content(&self) -> &str {
        self.0.children.as_text().unwrap_or("")
    }

    /// The host entity this vnode is mounted as. For components and fragments
    /// this is the first host entity of the rendered subtree, if any.
    pub fn el(&self) -> Option<HostNode> {
        self.0.el.get()
    }

    pub(crate) fn set_el(&self, el: Option<HostNode>) {
        self.0.el.set(el);
    }

    pub fn component_instance(&self) -> Option<Rc<ComponentInstance>> {
        self.0.component.borrow().clone()
    }

    pub(crate) fn set_component_instance(&self, instance: Option<Rc<ComponentInstance>>) {
        self.0.component.replace(instance);
    }

    pub fn is_component(&self) -> bool {
        self.shape().intersects(ShapeFlags::COMPONENT)
    }

    /// Two vnodes describe the same node when their types and keys are equal.
    /// Only same nodes are patched in place; anything else is replaced.
    pub fn is_same(&self, other: &VNode) -> bool {
        self.0.node_type.same(&other.0.node_type) && self.0.key == other.0.key
    }

    pub fn ptr_eq(&self, other: &VNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakVNode {
        WeakVNode(Rc::downgrade(&self.0))
    }

    /// First host entity of this subtree in document order.
    pub fn first_host_node(&self) -> Option<HostNode> {
        match &self.0.node_type {
            NodeType::Text | NodeType::Element(_) => self.el(),
            NodeType::Fragment => self.0.children.nodes().iter().find_map(VNode::first_host_node),
            NodeType::Component(_) => self
                .component_instance()
                .and_then(|instance| instance.sub_tree())
                .and_then(|tree| tree.first_host_node()),
        }
    }

    /// Last host entity of this subtree in document order.
    pub fn last_host_node(&self) -> Option<HostNode> {
        match &self.0.node_type {
            NodeType::Text | NodeType::Element(_) => self.el(),
            NodeType::Fragment => self.0.children.nodes().iter().rev().find_map(VNode::last_host_node),
            NodeType::Component(_) => self
                .component_instance()
                .and_then(|instance| instance.sub_tree())
                .and_then(|tree| tree.last_host_node()),
        }
    }

    // ------------------------------------------------------------------------
    // Keep-alive
    // ------------------------------------------------------------------------

    /// Ask the reconciler to deactivate this component instead of destroying
    /// it when it is unmounted.
    pub fn mark_keep_alive(&self) {
        if self.is_component() {
            self.0.shape.set(self.shape() | ShapeFlags::COMPONENT_SHOULD_KEEP_ALIVE);
        }
    }

    /// Reuse the live instance of `cached` when this vnode is mounted.
    ///
    /// Returns false, and changes nothing, unless `cached` is a component
    /// vnode of the same type whose instance is still alive.
    pub fn adopt_kept_alive(&self, cached: &VNode) -> bool {
        if !self.is_component() || !self.0.node_type.same(&cached.0.node_type) {
            return false;
        }
        let Some(instance) = cached.component_instance() else {
            return false;
        };
        if instance.is_unmounted() {
            return false;
        }

        self.set_component_instance(Some(instance));
        self.0.shape.set(
            self.shape()
                | ShapeFlags::COMPONENT_KEPT_ALIVE
                | ShapeFlags::COMPONENT_SHOULD_KEEP_ALIVE,
        );
        true
    }

    pub(crate) fn clear_keep_alive(&self) {
        self.0.shape.set(
            self.shape()
                - ShapeFlags::COMPONENT_KEPT_ALIVE
                - ShapeFlags::COMPONENT_SHOULD_KEEP_ALIVE,
        );
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("VNode");
        s.field("type", &self.0.node_type);
        if let Some(key) = &self.0.key {
            s.field("key", key);
        }
        if !self.0.props.is_empty() {
            s.field("props", &self.0.props);
        }
        if !self.0.children.is_none() {
            s.field("children", &self.0.children);
        }
        s.finish()
    }
}

/// Builder for element, component and keyed fragment vnodes.
#[must_use = "call build() to get the vnode"]
pub struct VNodeBuilder {
    node_type: NodeType,
    props: Props,
    children: Children,
    key: Option<Key>,
}

impl VNodeBuilder {
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            props: Props::new(),
            children: Children::None,
            key: None,
        }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn props<K, V>(mut self, props: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.props.extend(props.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Plain text children. On a fragment this becomes a single text child.
    pub fn text(mut self, text: impl Into<Rc<str>>) -> Self {
        self.children = match self.node_type {
            NodeType::Fragment => Children::Nodes(vec![VNode::text(text)]),
            _ => Children::Text(text.into()),
        };
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        self.children = Children::Nodes(children.into_iter().collect());
        self
    }

    pub fn child(mut self, child: VNode) -> Self {
        match &mut self.children {
            Children::Nodes(nodes) => nodes.push(child),
            _ => self.children = Children::Nodes(vec![child]),
        }
        self
    }

    /// Add a named slot (component vnodes).
    pub fn slot(mut self, name: impl Into<String>, slot: impl Fn() -> VNode + 'static) -> Self {
        match &mut self.children {
            Children::Slots(slots) => slots.insert(name, slot),
            _ => {
                let mut slots = Slots::new();
                slots.insert(name, slot);
                self.children = Children::Slots(slots);
            }
        }
        self
    }

    /// Add the `default` slot.
    pub fn default_slot(self, slot: impl Fn() -> VNode + 'static) -> Self {
        self.slot("default", slot)
    }

    pub fn build(self) -> VNode {
        VNode::from_parts(self.node_type, self.props, self.children, self.key)
    }
}

impl From<VNodeBuilder> for VNode {
    fn from(builder: VNodeBuilder) -> Self {
        builder.build()
    }
}
