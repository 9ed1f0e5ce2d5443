//! Prop resolution.
//!
//! Raw vnode props are split into declared props, which live in a reactive
//! record, and attrs (everything undeclared), which live in a plain record.
//! Functional components declare nothing and receive every prop.

use crate::reactive::Reactive;
use crate::renderer::{Props, VNode};
use crate::value::{Record, Value};

use super::Component;

/// Split raw props into `(props, attrs)` for `def`.
///
/// Declared props that were not passed are present as `Null`, so reads of
/// them are tracked and a later value triggers an update.
pub(crate) fn split_props(def: &Component, raw: &Props) -> (Record, Record) {
    let props = Record::new();
    let attrs = Record::new();

    if def.is_functional() {
        for (key, value) in raw {
            props.insert(key.clone(), value.clone());
        }
        return (props, attrs);
    }

    for key in def.declared_props() {
        props.insert(key.clone(), raw.get(key).cloned().unwrap_or(Value::Null));
    }
    for (key, value) in raw {
        if !def.declares_prop(key) {
            attrs.insert(key.clone(), value.clone());
        }
    }
    (props, attrs)
}

/// Apply the next raw props to an instance's prop and attr records.
///
/// Only props whose value changed notify their readers.
pub(crate) fn update_props(def: &Component, props: &Reactive, attrs: &Record, raw: &Props) {
    let (next_props, next_attrs) = split_props(def, raw);

    for (key, value) in next_props.fields().iter() {
        props.set(key, value.clone());
    }
    for key in props.raw().keys() {
        if !next_props.contains_key(&key) {
            props.delete(&key);
        }
    }

    for key in attrs.keys() {
        attrs.remove(&key);
    }
    for (key, value) in next_attrs.fields().iter() {
        attrs.insert(key.clone(), value.clone());
    }
}

/// Whether two raw prop maps differ in any key or value.
pub(crate) fn has_props_changed(prev: &Props, next: &Props) -> bool {
    if prev.len() != next.len() {
        return true;
    }
    next.iter()
        .any(|(key, value)| prev.get(key).map_or(true, |old| !old.same_value(value)))
}

/// Whether patching `prev` into `next` must re-render the component.
///
/// True when the props changed, or when either vnode carries children
/// (slots). This is stricter than comparing only the presence of children:
/// slot content cannot be compared, so a parent re-render passing the same
/// slot shape still refreshes the child instead of leaving stale slots.
pub fn should_update_component(prev: &VNode, next: &VNode) -> bool {
    if !prev.children().is_none() || !next.children().is_none() {
        return true;
    }
    has_props_changed(prev.props(), next.props())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::VNode;

    fn raw(pairs: &[(&str, i64)]) -> Props {
        pairs.iter().map(|(k, v)| (k.to_string(), Value::from(*v))).collect()
    }

    #[test]
    fn undeclared_props_become_attrs() {
        let def = Component::builder("Tag").props(["size"]).build();
        let (props, attrs) = split_props(&def, &raw(&[("size", 2), ("id", 7)]));

        assert_eq!(props.keys(), vec!["size".to_string()]);
        assert_eq!(attrs.get("id"), Some(Value::from(7)));
    }

    #[test]
    fn missing_declared_props_are_null() {
        let def = Component::builder("Tag").props(["size"]).build();
        let (props, _) = split_props(&def, &Props::new());
        assert_eq!(props.get("size"), Some(Value::Null));
    }

    #[test]
    fn functional_components_take_everything() {
        let def = Component::functional("Plain", |_, _| VNode::text(""));
        let (props, attrs) = split_props(&def, &raw(&[("a", 1), ("b", 2)]));
        assert_eq!(props.len(), 2);
        assert!(attrs.is_empty());
    }

    #[test]
    fn props_change_detection() {
        assert!(!has_props_changed(&raw(&[("a", 1)]), &raw(&[("a", 1)])));
        assert!(has_props_changed(&raw(&[("a", 1)]), &raw(&[("a", 2)])));
        assert!(has_props_changed(&raw(&[("a", 1)]), &raw(&[("b", 1)])));
        assert!(has_props_changed(&raw(&[("a", 1)]), &raw(&[])));
    }

    #[test]
    fn update_only_notifies_changed_props() {
        let def = Component::builder("Tag").props(["a", "b"]).build();
        let (initial, attrs) = split_props(&def, &raw(&[("a", 1), ("b", 2)]));
        let props = crate::reactive::reactive(&initial);

        update_props(&def, &props, &attrs, &raw(&[("a", 1), ("b", 3), ("title", 9)]));
        assert_eq!(props.get_untracked("b"), Value::from(3));
        assert_eq!(attrs.get("title"), Some(Value::from(9)));
    }

    #[test]
    fn slots_force_an_update() {
        let def = Component::builder("Box").build();
        let prev = VNode::component(&def).default_slot(|| VNode::text("a")).build();
        let next = VNode::component(&def).default_slot(|| VNode::text("a")).build();
        assert!(should_update_component(&prev, &next));

        let bare_prev = VNode::component(&def).build();
        let bare_next = VNode::component(&def).build();
        assert!(!should_update_component(&bare_prev, &bare_next));
    }
}
