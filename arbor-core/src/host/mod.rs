//! Host adapters.
//!
//! The reconciler never touches a real output tree directly. Every mutation
//! goes through a [`HostAdapter`], which owns the host entities and hands
//! out opaque [`HostNode`] handles for them. A DOM binding, a terminal UI or
//! the in-memory [`MemoryHost`] used in tests all plug in here.

mod memory;

pub use memory::{HostOp, MemoryHost};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Opaque handle to a host entity (an element or a text node).
///
/// Handles are minted by the adapter and only meaningful to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostNode(u64);

impl HostNode {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for HostNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The primitive operations the reconciler needs from a host.
///
/// `insert` doubles as *move*: inserting an entity that already has a parent
/// detaches it first. A `None` anchor appends.
pub trait HostAdapter {
    fn create_element(&mut self, tag: &str) -> HostNode;

    fn create_text(&mut self, text: &str) -> HostNode;

    /// Replace the content of a text entity.
    fn set_text(&mut self, node: HostNode, text: &str);

    /// Replace all children of an element with plain text.
    fn set_element_text(&mut self, node: HostNode, text: &str);

    fn insert(&mut self, node: HostNode, parent: HostNode, anchor: Option<HostNode>);

    /// Detach an entity from its parent.
    fn remove(&mut self, node: HostNode);

    /// Apply a prop change. `next == None` means the prop was removed.
    fn patch_prop(&mut self, node: HostNode, key: &str, prev: Option<&Value>, next: Option<&Value>);

    fn parent_node(&self, node: HostNode) -> Option<HostNode>;

    fn next_sibling(&self, node: HostNode) -> Option<HostNode>;
}
