//! Reactive Primitives
//!
//! This module implements the reactive core: the dependency store, tracked
//! effects, refs, reactive records, computed values, watchers and effect
//! scopes. Together they let the renderer re-run exactly the components
//! whose state changed.
//!
//! # Concepts
//!
//! ## Refs and reactive records
//!
//! A [`Ref`] is a single reactive cell. A [`Reactive`] is a view over a
//! [`Record`](crate::Record) whose fields are tracked individually. Reading
//! either inside a running effect registers a dependency; writing a changed
//! value notifies every dependent.
//!
//! ## Effects
//!
//! A [`ReactiveEffect`] runs a function while collecting its dependencies.
//! On each run the previous dependency set is replaced, so branches no longer
//! taken stop notifying. When a dependency changes the effect's scheduler
//! decides what to do: re-run immediately, queue a job, or propagate.
//!
//! ## Computed values
//!
//! A [`Computed`] caches the result of a getter and recomputes only when
//! read after a dependency changed.
//!
//! ## Watchers
//!
//! [`watch`] and [`watch_effect`] run callbacks through the scheduler, so
//! many writes in one synchronous frame produce one callback.
//!
//! # Implementation Notes
//!
//! Tracking is automatic: a thread-local context stack records the running
//! effect, and every tracked read files an edge in the thread-local
//! dependency store. Edges carry the run tag of the run that created them,
//! which is how stale edges are recognized and pruned after each run.

pub(crate) mod dep;
pub(crate) mod proxy;
pub(crate) mod runtime;

mod computed;
mod context;
mod effect;
mod refs;
mod scope;
mod subscriber;
mod watch;

pub use computed::{computed, computed_with_setter, Computed};
pub use context::{pause_tracking, untracked, ReactiveContext};
pub use dep::{DepKey, TargetId};
pub use effect::{effect, EffectKind, EffectOptions, EffectRunner, ReactiveEffect, WeakEffect};
pub use proxy::{is_reactive, reactive, to_raw, to_reactive, Reactive};
pub use refs::{ref_value, to_ref, to_refs, ObjectRef, Ref};
pub use runtime::{Runtime, SubscriberHandle};
pub use scope::{current_scope, EffectScope, Stoppable};
pub use subscriber::{DirtyLevel, Subscriber, SubscriberId};
pub use watch::{
    watch, watch_effect, FlushTiming, OnCleanup, WatchDepth, WatchHandle, WatchOptions,
    WatchSource,
};
