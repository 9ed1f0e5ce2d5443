//! Children diffing.
//!
//! Lists without any key are patched position by position. Anything keyed
//! goes through the keyed diff:
//!
//! 1. Patch the common prefix and suffix of same nodes in place.
//! 2. If only new children remain, mount them; if only old ones remain,
//!    unmount them.
//! 3. Otherwise map the keys of the remaining new span, patch every old child
//!    whose key is found, unmount the rest, and record for each new position
//!    the old index plus one (zero for fresh mounts).
//! 4. The longest increasing subsequence of that record is the set of
//!    children already in relative order. Walking the span back to front,
//!    fresh children are mounted, children in the subsequence stay put, and
//!    the rest are moved before their successor.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{trace, warn};

use super::sequence::longest_increasing_subsequence;
use super::{Children, Key, Renderer, VNode};
use crate::component::ComponentInstance;
use crate::host::{HostAdapter, HostNode};

/// First host entity among `nodes`, or `fallback` when none has one.
fn anchor_of(nodes: &[VNode], fallback: Option<HostNode>) -> Option<HostNode> {
    nodes.iter().find_map(VNode::first_host_node).or(fallback)
}

fn has_keys(nodes: &[VNode]) -> bool {
    nodes.iter().any(|node| node.key().is_some())
}

impl<H: HostAdapter + 'static> Renderer<H> {
    /// Diff the children of `n1` into `n2`. `container` is the element (or,
    /// for fragments, the parent element) holding them.
    pub(super) fn patch_children(
        &self,
        n1: &VNode,
        n2: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&Rc<ComponentInstance>>,
    ) {
        match (n1.children(), n2.children()) {
            (Children::Nodes(old), Children::Nodes(new)) => {
                if has_keys(old) || has_keys(new) {
                    self.patch_keyed_children(old, new, container, anchor, parent);
                } else {
                    self.patch_unkeyed_children(old, new, container, anchor, parent);
                }
            }
            (old, Children::Nodes(new)) => {
                if old.as_text().is_some() {
                    self.inner.host.borrow_mut().set_element_text(container, "");
                }
                self.mount_children(new, container, anchor, parent);
            }
            (old, Children::Text(text)) => {
                if let Children::Nodes(nodes) = old {
                    self.unmount_children(nodes, parent);
                }
                if old.as_text() != Some(&**text) {
                    self.inner.host.borrow_mut().set_element_text(container, text);
                }
            }
            (old, Children::None | Children::Slots(_)) => match old {
                Children::Nodes(nodes) => self.unmount_children(nodes, parent),
                Children::Text(_) => self.inner.host.borrow_mut().set_element_text(container, ""),
                Children::None | Children::Slots(_) => {}
            },
        }
    }

    /// Patch pairwise, then mount or unmount the tail.
    fn patch_unkeyed_children(
        &self,
        old: &[VNode],
        new: &[VNode],
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&Rc<ComponentInstance>>,
    ) {
        let common = old.len().min(new.len());
        for (index, (prev, next)) in old.iter().zip(new).enumerate() {
            // Later old siblings are still in place, so they mark this node's end.
            let after = anchor_of(&old[index + 1..], anchor);
            self.patch(Some(prev), next, container, after, parent);
        }

        if old.len() > common {
            self.unmount_children(&old[common..], parent);
        } else {
            self.mount_children(&new[common..], container, anchor, parent);
        }
    }

    fn patch_keyed_children(
        &self,
        old: &[VNode],
        new: &[VNode],
        container: HostNode,
        parent_anchor: Option<HostNode>,
        parent: Option<&Rc<ComponentInstance>>,
    ) {
        let mut start = 0;
        // exclusive ends of the unresolved spans
        let mut old_end = old.len();
        let mut new_end = new.len();

        while start < old_end && start < new_end && old[start].is_same(&new[start]) {
            let after = anchor_of(&old[start + 1..], parent_anchor);
            self.patch(Some(&old[start]), &new[start], container, after, parent);
            start += 1;
        }

        while start < old_end && start < new_end && old[old_end - 1].is_same(&new[new_end - 1]) {
            let after = anchor_of(&new[new_end..], parent_anchor);
            self.patch(Some(&old[old_end - 1]), &new[new_end - 1], container, after, parent);
            old_end -= 1;
            new_end -= 1;
        }

        if start >= old_end {
            if start < new_end {
                let anchor = anchor_of(&new[new_end..], parent_anchor);
                for node in &new[start..new_end] {
                    self.patch(None, node, container, anchor, parent);
                }
            }
            return;
        }

        if start >= new_end {
            self.unmount_children(&old[start..old_end], parent);
            return;
        }

        let mut key_to_new: HashMap<&Key, usize> = HashMap::new();
        for (index, node) in new.iter().enumerate().take(new_end).skip(start) {
            if let Some(key) = node.key() {
                if key_to_new.insert(key, index).is_some() {
                    warn!(?key, "duplicate key among siblings");
                }
            }
        }

        let to_patch = new_end - start;
        let mut patched = 0;
        let span_anchor = anchor_of(&new[new_end..], parent_anchor);
        let mut new_to_old = vec![0usize; to_patch];
        let mut moved = false;
        let mut max_new_index = 0;

        for (old_index, prev) in old.iter().enumerate().take(old_end).skip(start) {
            if patched >= to_patch {
                self.unmount(prev, parent, true);
                continue;
            }

            // Unkeyed children in the middle span never match.
            let matched = prev.key().and_then(|key| key_to_new.get(key)).copied();
            let Some(new_index) = matched else {
                self.unmount(prev, parent, true);
                continue;
            };
            if new_to_old[new_index - start] != 0 {
                self.unmount(prev, parent, true);
                continue;
            }

            new_to_old[new_index - start] = old_index + 1;
            if new_index >= max_new_index {
                max_new_index = new_index;
            } else {
                moved = true;
            }
            // Nothing has moved yet; old siblings after `prev` are still mounted.
            let after = anchor_of(&old[old_index + 1..old_end], span_anchor);
            self.patch(Some(prev), &new[new_index], container, after, parent);
            patched += 1;
        }

        let stable = if moved {
            longest_increasing_subsequence(&new_to_old)
        } else {
            Vec::new()
        };
        trace!(span = to_patch, moved, stable = stable.len(), "keyed diff");

        let mut remaining = stable.len();
        for offset in (0..to_patch).rev() {
            let index = start + offset;
            let node = &new[index];
            let anchor = anchor_of(&new[index + 1..], parent_anchor);

            if new_to_old[offset] == 0 {
                self.patch(None, node, container, anchor, parent);
            } else if moved {
                if remaining > 0 && stable[remaining - 1] == offset {
                    remaining -= 1;
                } else {
                    self.move_vnode(node, container, anchor);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::create_renderer;
    use super::*;
    use crate::host::MemoryHost;

    fn item(key: &str) -> VNode {
        VNode::element("li").key(key).text(key).build()
    }

    fn list(keys: &[&str]) -> VNode {
        VNode::element("ul").children(keys.iter().map(|k| item(k))).build()
    }

    fn render_and_reset(keys: &[&str]) -> (Renderer<MemoryHost>, HostNode) {
        let renderer = create_renderer(MemoryHost::new());
        let root = renderer.with_host_mut(|host| host.create_root("root"));
        renderer.render(list(keys), root);
        renderer.with_host_mut(MemoryHost::clear_ops);
        (renderer, root)
    }

    fn texts(renderer: &Renderer<MemoryHost>, root: HostNode) -> String {
        renderer.with_host(|host| host.text_content(root))
    }

    #[test]
    fn reorder_moves_only_outside_the_stable_run() {
        let (renderer, root) = render_and_reset(&["a", "b", "c", "d"]);
        renderer.render(list(&["d", "b", "a", "c"]), root);

        assert_eq!(texts(&renderer, root), "dbac");
        renderer.with_host(|host| {
            assert_eq!(host.created(), 0);
            assert_eq!(host.removed(), 0);
            assert_eq!(host.moved(), 2);
        });
    }

    #[test]
    fn append_and_prepend_mount_in_place() {
        let (renderer, root) = render_and_reset(&["b", "c"]);
        renderer.render(list(&["a", "b", "c", "d"]), root);

        assert_eq!(texts(&renderer, root), "abcd");
        renderer.with_host(|host| {
            assert_eq!(host.created(), 2);
            assert_eq!(host.moved(), 0);
        });
    }

    #[test]
    fn removal_from_the_middle() {
        let (renderer, root) = render_and_reset(&["a", "b", "c", "d"]);
        renderer.render(list(&["a", "d"]), root);

        assert_eq!(texts(&renderer, root), "ad");
        renderer.with_host(|host| {
            assert_eq!(host.removed(), 2);
            assert_eq!(host.moved(), 0);
        });
    }

    #[test]
    fn mixed_insert_remove_and_move() {
        let (renderer, root) = render_and_reset(&["a", "b", "c", "d", "e"]);
        renderer.render(list(&["a", "e", "x", "c", "b"]), root);

        assert_eq!(texts(&renderer, root), "aexcb");
        renderer.with_host(|host| {
            assert_eq!(host.created(), 1);
            assert_eq!(host.removed(), 1);
        });
    }

    #[test]
    fn unmoved_middle_skips_moves() {
        let (renderer, root) = render_and_reset(&["a", "b", "c"]);
        renderer.render(list(&["a", "x", "c"]), root);

        assert_eq!(texts(&renderer, root), "axc");
        renderer.with_host(|host| assert_eq!(host.moved(), 0));
    }

    #[test]
    fn unkeyed_lists_patch_by_position() {
        let renderer = create_renderer(MemoryHost::new());
        let root = renderer.with_host_mut(|host| host.create_root("root"));
        let row = |t: &str| VNode::element("li").text(t).build();

        renderer.render(VNode::element("ul").children([row("1"), row("2"), row("3")]).build(), root);
        renderer.with_host_mut(MemoryHost::clear_ops);
        renderer.render(VNode::element("ul").children([row("3"), row("2"), row("1")]).build(), root);

        assert_eq!(texts(&renderer, root), "321");
        renderer.with_host(|host| {
            assert_eq!(host.moved(), 0);
            assert_eq!(host.created(), 0);
            assert_eq!(host.text_updates(), 2);
        });
    }

    #[test]
    fn text_children_swap_with_nodes() {
        let renderer = create_renderer(MemoryHost::new());
        let root = renderer.with_host_mut(|host| host.create_root("root"));

        renderer.render(VNode::element("p").text("plain").build(), root);
        renderer.render(VNode::element("p").child(VNode::text("node")).build(), root);
        assert_eq!(renderer.with_host(|host| host.inner_markup(root)), "<p>node</p>");

        renderer.render(VNode::element("p").text("plain again").build(), root);
        assert_eq!(renderer.with_host(|host| host.inner_markup(root)), "<p>plain again</p>");
    }

    #[test]
    fn empty_fragments_do_not_break_anchors() {
        let renderer = create_renderer(MemoryHost::new());
        let root = renderer.with_host_mut(|host| host.create_root("root"));
        let empty = |key: &str| VNode::fragment_builder().key(key).build();

        renderer.render(
            VNode::element("ul").children([item("a"), empty("gap"), item("c")]).build(),
            root,
        );
        renderer.render(
            VNode::element("ul")
                .children([item("a"), empty("gap"), item("b"), item("c")])
                .build(),
            root,
        );
        assert_eq!(texts(&renderer, root), "abc");
    }

    #[test]
    fn keyed_fragment_grows_before_its_next_sibling() {
        let renderer = create_renderer(MemoryHost::new());
        let root = renderer.with_host_mut(|host| host.create_root("root"));
        let group = |keys: &[&str]| {
            VNode::fragment_builder()
                .key("group")
                .children(keys.iter().map(|k| item(k)))
                .build()
        };

        renderer.render(VNode::element("ul").children([group(&["a"]), item("z")]).build(), root);
        renderer.render(
            VNode::element("ul").children([group(&["a", "b"]), item("z")]).build(),
            root,
        );
        assert_eq!(texts(&renderer, root), "abz");

        renderer.render(
            VNode::element("ul").children([item("y"), group(&["a", "b", "c"]), item("z")]).build(),
            root,
        );
        assert_eq!(texts(&renderer, root), "yabcz");
    }

    #[test]
    fn keyed_fragment_grows_inside_a_reordered_span() {
        let renderer = create_renderer(MemoryHost::new());
        let root = renderer.with_host_mut(|host| host.create_root("root"));
        let group = |keys: &[&str]| {
            VNode::fragment_builder()
                .key("group")
                .children(keys.iter().map(|k| item(k)))
                .build()
        };

        renderer.render(
            VNode::element("ul").children([item("x"), group(&["a"]), item("y")]).build(),
            root,
        );
        renderer.render(
            VNode::element("ul").children([item("y"), group(&["a", "b"]), item("x")]).build(),
            root,
        );
        assert_eq!(texts(&renderer, root), "yabx");
    }

    #[test]
    fn unkeyed_fragment_grows_before_its_next_sibling() {
        let renderer = create_renderer(MemoryHost::new());
        let root = renderer.with_host_mut(|host| host.create_root("root"));
        let row = |t: &str| VNode::element("li").text(t).build();

        renderer.render(
            VNode::element("ul").children([VNode::fragment([row("a")]), row("z")]).build(),
            root,
        );
        renderer.render(
            VNode::element("ul")
                .children([VNode::fragment([row("a"), row("b")]), row("z")])
                .build(),
            root,
        );
        assert_eq!(texts(&renderer, root), "abz");
    }

    #[test]
    fn replacing_an_empty_fragment_keeps_sibling_order() {
        let renderer = create_renderer(MemoryHost::new());
        let root = renderer.with_host_mut(|host| host.create_root("root"));
        let row = |t: &str| VNode::element("li").text(t).build();

        renderer.render(
            VNode::element("ul").children([VNode::fragment(Vec::<VNode>::new()), row("z")]).build(),
            root,
        );
        renderer.render(VNode::element("ul").children([row("a"), row("z")]).build(), root);
        assert_eq!(texts(&renderer, root), "az");
    }
}
