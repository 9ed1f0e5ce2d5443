//! An in-memory host.
//!
//! [`MemoryHost`] keeps a small tree of elements and text nodes and records
//! every operation the reconciler performs on it. Tests assert on the
//! resulting markup and on the operation log (how many entities were
//! created, moved or removed).

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use super::{HostAdapter, HostNode};
use crate::value::Value;

/// One recorded host operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    CreateElement { node: HostNode, tag: String },
    CreateText { node: HostNode, text: String },
    SetText { node: HostNode, text: String },
    SetElementText { node: HostNode, text: String },
    /// `moved` is true when the node already had a parent.
    Insert { node: HostNode, parent: HostNode, anchor: Option<HostNode>, moved: bool },
    Remove { node: HostNode },
    PatchProp { node: HostNode, key: String, value: Option<Value> },
}

#[derive(Debug)]
enum MemKind {
    Element { tag: String, props: IndexMap<String, Value>, text: String },
    Text(String),
}

#[derive(Debug)]
struct MemNode {
    kind: MemKind,
    parent: Option<HostNode>,
    children: Vec<HostNode>,
}

/// A host that renders into memory.
#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: Vec<MemNode>,
    ops: Vec<HostOp>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached element to render into. Not recorded.
    pub fn create_root(&mut self, tag: &str) -> HostNode {
        self.alloc(MemKind::Element {
            tag: tag.to_string(),
            props: IndexMap::new(),
            text: String::new(),
        })
    }

    fn alloc(&mut self, kind: MemKind) -> HostNode {
        let node = HostNode(self.nodes.len() as u64);
        self.nodes.push(MemNode {
            kind,
            parent: None,
            children: Vec::new(),
        });
        node
    }

    fn node(&self, node: HostNode) -> Option<&MemNode> {
        self.nodes.get(node.0 as usize)
    }

    fn node_mut(&mut self, node: HostNode) -> Option<&mut MemNode> {
        self.nodes.get_mut(node.0 as usize)
    }

    fn detach(&mut self, node: HostNode) -> bool {
        let Some(parent) = self.node_mut(node).and_then(|n| n.parent.take()) else {
            return false;
        };
        if let Some(parent) = self.node_mut(parent) {
            parent.children.retain(|c| *c != node);
        }
        true
    }

    /// Every operation recorded so far.
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Take the recorded operations, starting a fresh log.
    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// The operation log as JSON.
    pub fn ops_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.ops)
    }

    pub fn count_ops(&self, pred: impl Fn(&HostOp) -> bool) -> usize {
        self.ops.iter().filter(|op| pred(op)).count()
    }

    /// Number of entities created, elements and text nodes alike.
    pub fn created(&self) -> usize {
        self.count_ops(|op| matches!(op, HostOp::CreateElement { .. } | HostOp::CreateText { .. }))
    }

    pub fn removed(&self) -> usize {
        self.count_ops(|op| matches!(op, HostOp::Remove { .. }))
    }

    /// Inserts of entities that were already attached.
    pub fn moved(&self) -> usize {
        self.count_ops(|op| matches!(op, HostOp::Insert { moved: true, .. }))
    }

    pub fn text_updates(&self) -> usize {
        self.count_ops(|op| matches!(op, HostOp::SetText { .. } | HostOp::SetElementText { .. }))
    }

    pub fn children(&self, node: HostNode) -> Vec<HostNode> {
        self.node(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    pub fn tag(&self, node: HostNode) -> Option<&str> {
        match &self.node(node)?.kind {
            MemKind::Element { tag, .. } => Some(tag),
            MemKind::Text(_) => None,
        }
    }

    pub fn prop(&self, node: HostNode, key: &str) -> Option<Value> {
        match &self.node(node)?.kind {
            MemKind::Element { props, .. } => props.get(key).cloned(),
            MemKind::Text(_) => None,
        }
    }

    /// Text of a text node, or the plain-text content of an element.
    pub fn text(&self, node: HostNode) -> Option<&str> {
        match &self.node(node)?.kind {
            MemKind::Element { text, .. } => Some(text),
            MemKind::Text(text) => Some(text),
        }
    }

    /// Concatenated text of a subtree.
    pub fn text_content(&self, node: HostNode) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: HostNode, out: &mut String) {
        let Some(n) = self.node(node) else {
            return;
        };
        match &n.kind {
            MemKind::Text(text) => out.push_str(text),
            MemKind::Element { text, .. } => {
                out.push_str(text);
                for child in &n.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Serialize a subtree as markup, e.g. `<ul><li key="a">A</li></ul>`.
    pub fn markup(&self, node: HostNode) -> String {
        let mut out = String::new();
        self.write_markup(node, &mut out);
        out
    }

    /// Markup of the children only.
    pub fn inner_markup(&self, node: HostNode) -> String {
        let mut out = String::new();
        if let Some(MemKind::Element { text, .. }) = self.node(node).map(|n| &n.kind) {
            out.push_str(text);
        }
        for child in self.children(node) {
            self.write_markup(child, &mut out);
        }
        out
    }

    fn write_markup(&self, node: HostNode, out: &mut String) {
        let Some(n) = self.node(node) else {
            return;
        };
        match &n.kind {
            MemKind::Text(text) => out.push_str(text),
            MemKind::Element { tag, props, text } => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in props {
                    out.push_str(&format!(" {key}=\"{value}\""));
                }
                out.push('>');
                out.push_str(text);
                for child in &n.children {
                    self.write_markup(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

impl HostAdapter for MemoryHost {
    fn create_element(&mut self, tag: &str) -> HostNode {
        let node = self.create_root(tag);
        self.ops.push(HostOp::CreateElement {
            node,
            tag: tag.to_string(),
        });
        node
    }

    fn create_text(&mut self, text: &str) -> HostNode {
        let node = self.alloc(MemKind::Text(text.to_string()));
        self.ops.push(HostOp::CreateText {
            node,
            text: text.to_string(),
        });
        node
    }

    fn set_text(&mut self, node: HostNode, text: &str) {
        match self.node_mut(node).map(|n| &mut n.kind) {
            Some(MemKind::Text(content)) => *content = text.to_string(),
            _ => {
                warn!(?node, "set_text on something that is not a text node");
                return;
            }
        }
        self.ops.push(HostOp::SetText {
            node,
            text: text.to_string(),
        });
    }

    fn set_element_text(&mut self, node: HostNode, text: &str) {
        let children = match self.node_mut(node) {
            Some(MemNode {
                kind: MemKind::Element { text: content, .. },
                children,
                ..
            }) => {
                *content = text.to_string();
                std::mem::take(children)
            }
            _ => {
                warn!(?node, "set_element_text on something that is not an element");
                return;
            }
        };
        for child in children {
            if let Some(child) = self.node_mut(child) {
                child.parent = None;
            }
        }
        self.ops.push(HostOp::SetElementText {
            node,
            text: text.to_string(),
        });
    }

    fn insert(&mut self, node: HostNode, parent: HostNode, anchor: Option<HostNode>) {
        if self.node(node).is_none() || self.node(parent).is_none() {
            warn!(?node, ?parent, "insert with an unknown node");
            return;
        }
        let moved = self.detach(node);

        if let Some(p) = self.node_mut(parent) {
            let position = anchor.and_then(|a| p.children.iter().position(|c| *c == a));
            match position {
                Some(index) => p.children.insert(index, node),
                None => p.children.push(node),
            }
        }
        if let Some(n) = self.node_mut(node) {
            n.parent = Some(parent);
        }

        self.ops.push(HostOp::Insert {
            node,
            parent,
            anchor,
            moved,
        });
    }

    fn remove(&mut self, node: HostNode) {
        self.detach(node);
        self.ops.push(HostOp::Remove { node });
    }

    fn patch_prop(&mut self, node: HostNode, key: &str, _prev: Option<&Value>, next: Option<&Value>) {
        let Some(MemNode {
            kind: MemKind::Element { props, .. },
            ..
        }) = self.node_mut(node)
        else {
            warn!(?node, key, "patch_prop on something that is not an element");
            return;
        };
        match next {
            Some(value) => {
                props.insert(key.to_string(), value.clone());
            }
            None => {
                props.shift_remove(key);
            }
        }
        self.ops.push(HostOp::PatchProp {
            node,
            key: key.to_string(),
            value: next.cloned(),
        });
    }

    fn parent_node(&self, node: HostNode) -> Option<HostNode> {
        self.node(node)?.parent
    }

    fn next_sibling(&self, node: HostNode) -> Option<HostNode> {
        let parent = self.node(node)?.parent?;
        let siblings = &self.node(parent)?.children;
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index + 1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_markup() {
        let mut host = MemoryHost::new();
        let root = host.create_root("div");
        let list = host.create_element("ul");
        let item = host.create_element("li");
        let text = host.create_text("one");

        host.patch_prop(item, "class", None, Some(&Value::from("first")));
        host.insert(text, item, None);
        host.insert(item, list, None);
        host.insert(list, root, None);

        assert_eq!(host.markup(root), r#"<div><ul><li class="first">one</li></ul></div>"#);
        assert_eq!(host.created(), 3);
        assert_eq!(host.moved(), 0);
    }

    #[test]
    fn insert_before_anchor_and_move() {
        let mut host = MemoryHost::new();
        let root = host.create_root("div");
        let a = host.create_text("a");
        let b = host.create_text("b");
        let c = host.create_text("c");
        host.insert(a, root, None);
        host.insert(c, root, None);
        host.insert(b, root, Some(c));
        assert_eq!(host.inner_markup(root), "abc");

        host.insert(c, root, Some(a));
        assert_eq!(host.inner_markup(root), "cab");
        assert_eq!(host.moved(), 1);
        assert_eq!(host.next_sibling(a), Some(b));
        assert_eq!(host.next_sibling(b), None);
    }

    #[test]
    fn set_element_text_replaces_children() {
        let mut host = MemoryHost::new();
        let root = host.create_root("p");
        let child = host.create_text("old");
        host.insert(child, root, None);

        host.set_element_text(root, "new");
        assert_eq!(host.markup(root), "<p>new</p>");
        assert_eq!(host.parent_node(child), None);
    }

    #[test]
    fn remove_detaches() {
        let mut host = MemoryHost::new();
        let root = host.create_root("div");
        let child = host.create_element("span");
        host.insert(child, root, None);

        host.remove(child);
        assert!(host.children(root).is_empty());
        assert_eq!(host.removed(), 1);
    }

    #[test]
    fn removed_prop_disappears() {
        let mut host = MemoryHost::new();
        let el = host.create_element("a");
        host.patch_prop(el, "href", None, Some(&Value::from("/x")));
        host.patch_prop(el, "href", Some(&Value::from("/x")), None);
        assert_eq!(host.prop(el, "href"), None);
    }

    #[test]
    fn ops_serialize_as_tagged_json() {
        let mut host = MemoryHost::new();
        let root = host.create_root("div");
        let text = host.create_text("hi");
        host.insert(text, root, None);

        let json: serde_json::Value = serde_json::from_str(&host.ops_json().unwrap()).unwrap();
        assert_eq!(json[0]["op"], "create_text");
        assert_eq!(json[1]["op"], "insert");
        assert_eq!(json[1]["moved"], false);
    }
}
