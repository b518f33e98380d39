//! Built-in metric namespace catalog.
//!
//! Every metric the plugin can produce is declared here once, as a shape of fixed and
//! dynamic segments. The table is built on first use and never mutated afterwards, so it
//! can be shared by concurrent resolvers without locking.

#![forbid(unsafe_code)]

use once_cell::sync::Lazy;

use crate::{NamespaceShape, Segment, ShapeId};

pub const VENDOR: &str = "grafanalabs";
pub const PLUGIN: &str = "kubestate";

// Dynamic slot names (stable, host-visible)
pub const SLOT_NAMESPACE: &str = "namespace";
pub const SLOT_POD: &str = "pod";
pub const SLOT_PHASE: &str = "phase";
pub const SLOT_CONTAINER: &str = "container";

/// Schema version shared by every built-in shape.
pub const SHAPE_VERSION: u32 = 1;

static CATALOG: Lazy<Vec<NamespaceShape>> = Lazy::new(build);

/// All supported shapes, in dispatch order.
pub fn list_shapes() -> &'static [NamespaceShape] {
    CATALOG.as_slice()
}

/// Look up a built-in shape by id.
pub fn shape(id: ShapeId) -> &'static NamespaceShape {
    // build() emits exactly one shape per id, in ShapeId declaration order
    &CATALOG[id as usize]
}

fn fixed(v: &str) -> Segment {
    Segment::fixed(v)
}

fn dynamic(name: &str, description: &str) -> Segment {
    Segment::dynamic(name, description)
}

/// `grafanalabs/kubestate/pod/[namespace]/[pod]` followed by `tail`.
fn pod_shape(id: ShapeId, tail: &[&str]) -> NamespaceShape {
    let mut segments = vec![
        fixed(VENDOR),
        fixed(PLUGIN),
        fixed("pod"),
        dynamic(SLOT_NAMESPACE, "kubernetes namespace"),
        dynamic(SLOT_POD, "pod name"),
    ];
    segments.extend(tail.iter().map(|s| fixed(s)));
    NamespaceShape { id, version: SHAPE_VERSION, segments }
}

/// `grafanalabs/kubestate/pod/container/[namespace]/[pod]/[container]/status/<leaf>`.
fn container_shape(id: ShapeId, leaf: &str) -> NamespaceShape {
    let segments = vec![
        fixed(VENDOR),
        fixed(PLUGIN),
        fixed("pod"),
        fixed("container"),
        dynamic(SLOT_NAMESPACE, "kubernetes namespace"),
        dynamic(SLOT_POD, "pod name"),
        dynamic(SLOT_CONTAINER, "container name"),
        fixed("status"),
        fixed(leaf),
    ];
    NamespaceShape { id, version: SHAPE_VERSION, segments }
}

fn build() -> Vec<NamespaceShape> {
    let mut phase = pod_shape(ShapeId::PodPhase, &["status", "phase"]);
    phase.segments.push(dynamic(SLOT_PHASE, "current phase"));
    phase.segments.push(fixed("value"));

    vec![
        phase,
        pod_shape(ShapeId::PodConditionReady, &["status", "condition", "ready"]),
        pod_shape(ShapeId::PodConditionScheduled, &["status", "condition", "scheduled"]),
        container_shape(ShapeId::ContainerRestarts, "restarts"),
        container_shape(ShapeId::ContainerReady, "ready"),
        container_shape(ShapeId::ContainerWaiting, "waiting"),
        container_shape(ShapeId::ContainerRunning, "running"),
        container_shape(ShapeId::ContainerTerminated, "terminated"),
    ]
}
