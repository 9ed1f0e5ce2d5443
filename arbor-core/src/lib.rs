//! Arbor Core
//!
//! This crate provides the core runtime for the Arbor reactive UI framework.
//! It implements:
//!
//! - Reactive primitives (refs, reactive records, effects, computed values,
//!   watchers, effect scopes)
//! - A batched update scheduler
//! - Components with props, state, setup and lifecycle hooks
//! - A virtual tree reconciler with a keyed children diff
//!
//! The reconciler never touches an output tree directly: it drives a
//! [`HostAdapter`](host::HostAdapter), and [`MemoryHost`](host::MemoryHost)
//! is provided for tests and embedders that want a patch log.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Dependency store and reactive primitives
//! - `scheduler`: Job queue and flush drivers
//! - `component`: Component definitions and instances
//! - `renderer`: Virtual nodes and the reconciler
//! - `host`: Host adapter contract and the in-memory host
//! - `value`: Dynamic values stored in reactive records
//!
//! # Example
//!
//! ```
//! use arbor_core::host::MemoryHost;
//! use arbor_core::renderer::create_renderer;
//! use arbor_core::{scheduler, Component, Record, SetupResult, VNode};
//!
//! let counter = Component::builder("Counter")
//!     .setup(|_props, _ctx| SetupResult::State(Record::from_iter([("count", 0)])))
//!     .render(|ctx| VNode::text(ctx.get("count").to_string()))
//!     .build();
//!
//! let renderer = create_renderer(MemoryHost::new());
//! let root = renderer.with_host_mut(|host| host.create_root("app"));
//! let app = VNode::component(&counter).build();
//! renderer.render(app.clone(), root);
//!
//! let instance = app.component_instance().unwrap();
//! instance.setup_state().unwrap().set("count", 1);
//! scheduler::flush_jobs();
//!
//! assert_eq!(renderer.with_host(|host| host.text_content(root)), "1");
//! ```

pub mod component;
pub mod config;
pub mod error;
pub mod host;
pub mod reactive;
pub mod renderer;
pub mod scheduler;
pub mod value;

pub use component::{Component, ComponentInstance, LifecycleHook, RenderContext, SetupContext, SetupResult};
pub use config::{FlushDriver, RendererConfig, RuntimeConfig, SchedulerConfig};
pub use error::{Error, Result};
pub use reactive::{
    computed, computed_with_setter, effect, pause_tracking, reactive, ref_value, to_ref, to_refs,
    untracked, watch, watch_effect, Computed, EffectOptions, EffectScope, ObjectRef, Reactive,
    ReactiveEffect, Ref, WatchOptions,
};
pub use renderer::{create_renderer, create_renderer_with_config, Renderer, VNode};
pub use value::{Opaque, Record, Value};
