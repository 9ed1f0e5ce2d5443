//! Components.
//!
//! A [`Component`] is a definition: declared props, an optional state
//! initializer, an optional setup function and a render function. Mounting
//! a component vnode creates a [`ComponentInstance`] that owns the instance
//! state, an effect scope and the render effect that keeps its subtree up to
//! date.
//!
//! # Example
//!
//! ```
//! use arbor_core::{Component, Value, VNode};
//!
//! let counter = Component::builder("Counter")
//!     .props(["label"])
//!     .data(|_props| Value::from(serde_json::json!({ "count": 0 })))
//!     .render(|ctx| {
//!         VNode::element("span")
//!             .text(format!("{}: {}", ctx.get("label"), ctx.get("count")))
//!             .build()
//!     })
//!     .build();
//!
//! assert_eq!(counter.name(), "Counter");
//! assert!(counter.declares_prop("label"));
//! ```

mod instance;
mod lifecycle;
mod props;

pub use instance::{ComponentInstance, RenderContext, SetupContext};
pub use lifecycle::{HookFn, LifecycleHook, LifecycleHooks};
pub use props::should_update_component;

use std::fmt;
use std::rc::Rc;

use crate::reactive::Reactive;
use crate::renderer::{Slots, VNode};
use crate::value::{Record, Value};

/// Produces the component's subtree from its render context.
pub type RenderFn = Rc<dyn Fn(&RenderContext<'_>) -> VNode>;

/// Runs once per instance, before the first render.
pub type SetupFn = Rc<dyn Fn(&Reactive, &SetupContext) -> SetupResult>;

/// Renders a stateless component straight from its props and slots.
pub type FunctionalFn = Rc<dyn Fn(&Reactive, &Slots) -> VNode>;

/// Builds the initial state record from the props.
pub type DataFn = Rc<dyn Fn(&Reactive) -> Value>;

/// How a component declares its initial state.
#[derive(Clone)]
pub enum DataOption {
    /// A function producing a fresh record for each instance.
    Factory(DataFn),
    /// A shared value instead of a function. Rejected at setup with a
    /// warning; the instance gets empty state.
    Static(Value),
}

/// What a setup function hands back.
pub enum SetupResult {
    /// Use this render function instead of the definition's.
    Render(RenderFn),
    /// Expose these bindings to the render function.
    State(Record),
    Empty,
}

impl SetupResult {
    pub fn render(f: impl Fn(&RenderContext<'_>) -> VNode + 'static) -> Self {
        SetupResult::Render(Rc::new(f))
    }
}

/// A component definition. Shared by every instance through `Rc`.
pub struct Component {
    name: String,
    props: Vec<String>,
    data: Option<DataOption>,
    setup: Option<SetupFn>,
    render: Option<RenderFn>,
    functional: Option<FunctionalFn>,
}

impl Component {
    pub fn builder(name: impl Into<String>) -> ComponentBuilder {
        ComponentBuilder {
            def: Component {
                name: name.into(),
                props: Vec::new(),
                data: None,
                setup: None,
                render: None,
                functional: None,
            },
        }
    }

    /// A stateless component. It receives every prop and never owns state.
    pub fn functional(
        name: impl Into<String>,
        render: impl Fn(&Reactive, &Slots) -> VNode + 'static,
    ) -> Rc<Self> {
        let mut builder = Self::builder(name);
        builder.def.functional = Some(Rc::new(render));
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_functional(&self) -> bool {
        self.functional.is_some()
    }

    pub fn declared_props(&self) -> &[String] {
        &self.props
    }

    pub fn declares_prop(&self, key: &str) -> bool {
        self.props.iter().any(|p| p == key)
    }

    pub(crate) fn data(&self) -> Option<&DataOption> {
        self.data.as_ref()
    }

    pub(crate) fn setup_fn(&self) -> Option<&SetupFn> {
        self.setup.as_ref()
    }

    pub(crate) fn render_fn(&self) -> Option<&RenderFn> {
        self.render.as_ref()
    }

    pub(crate) fn functional_fn(&self) -> Option<&FunctionalFn> {
        self.functional.as_ref()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("props", &self.props)
            .field("functional", &self.is_functional())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Component`].
#[must_use = "call build() to get the component"]
pub struct ComponentBuilder {
    def: Component,
}

impl ComponentBuilder {
    /// Declare props. Undeclared props passed to the component become attrs.
    pub fn props<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.def.props.extend(names.into_iter().map(Into::into));
        self
    }

    /// Initial state, built per instance from the props.
    pub fn data(mut self, f: impl Fn(&Reactive) -> Value + 'static) -> Self {
        self.def.data = Some(DataOption::Factory(Rc::new(f)));
        self
    }

    /// Initial state given as a plain value rather than a function.
    ///
    /// Kept for definitions loaded from data; the instance logs a warning
    /// and starts with empty state.
    pub fn data_value(mut self, value: impl Into<Value>) -> Self {
        self.def.data = Some(DataOption::Static(value.into()));
        self
    }

    pub fn setup(mut self, f: impl Fn(&Reactive, &SetupContext) -> SetupResult + 'static) -> Self {
        self.def.setup = Some(Rc::new(f));
        self
    }

    pub fn render(mut self, f: impl Fn(&RenderContext<'_>) -> VNode + 'static) -> Self {
        self.def.render = Some(Rc::new(f));
        self
    }

    pub fn build(self) -> Rc<Component> {
        Rc::new(self.def)
    }
}
