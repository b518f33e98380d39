//! Kubestate core types: metric namespaces, pod snapshots and resolved metric values.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod catalog;
pub mod policy;
pub mod resolve;

pub use catalog::{list_shapes, shape};
pub use policy::{config_policy, CollectConfig, ConfigError, ConfigRule, ConfigValue};
pub use resolve::{ResolveError, ResolvePlan, Resolver, Unsupported};

/// Marker for a dynamic element the caller wants filled in.
pub const WILDCARD: &str = "*";

// ---------------- Namespace shapes ----------------

/// One position of a namespace shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    Fixed { value: String },
    Dynamic { name: String, description: String },
}

impl Segment {
    pub fn fixed(value: impl Into<String>) -> Self {
        Segment::Fixed { value: value.into() }
    }

    pub fn dynamic(name: impl Into<String>, description: impl Into<String>) -> Self {
        Segment::Dynamic { name: name.into(), description: description.into() }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Segment::Dynamic { .. })
    }
}

/// Stable identifier of a metric family; drives leaf value derivation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeId {
    #[serde(rename = "pod.phase")]
    PodPhase,
    #[serde(rename = "pod.condition.ready")]
    PodConditionReady,
    #[serde(rename = "pod.condition.scheduled")]
    PodConditionScheduled,
    #[serde(rename = "container.restarts")]
    ContainerRestarts,
    #[serde(rename = "container.ready")]
    ContainerReady,
    #[serde(rename = "container.waiting")]
    ContainerWaiting,
    #[serde(rename = "container.running")]
    ContainerRunning,
    #[serde(rename = "container.terminated")]
    ContainerTerminated,
}

impl ShapeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeId::PodPhase => "pod.phase",
            ShapeId::PodConditionReady => "pod.condition.ready",
            ShapeId::PodConditionScheduled => "pod.condition.scheduled",
            ShapeId::ContainerRestarts => "container.restarts",
            ShapeId::ContainerReady => "container.ready",
            ShapeId::ContainerWaiting => "container.waiting",
            ShapeId::ContainerRunning => "container.running",
            ShapeId::ContainerTerminated => "container.terminated",
        }
    }

    /// True for shapes that expand to one value per container.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            ShapeId::ContainerRestarts
                | ShapeId::ContainerReady
                | ShapeId::ContainerWaiting
                | ShapeId::ContainerRunning
                | ShapeId::ContainerTerminated
        )
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared layout of one metric family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamespaceShape {
    pub id: ShapeId,
    /// Bumped on incompatible layout changes.
    pub version: u32,
    pub segments: Vec<Segment>,
}

impl NamespaceShape {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Position of the named dynamic slot, if the shape declares it.
    pub fn dynamic_position(&self, slot: &str) -> Option<usize> {
        self.segments.iter().position(|s| matches!(s, Segment::Dynamic { name, .. } if name == slot))
    }

    /// Names of the dynamic slots in path order.
    pub fn dynamic_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Dynamic { name, .. } => Some(name.as_str()),
                Segment::Fixed { .. } => None,
            })
            .collect()
    }

    /// Structural match: same arity and every fixed position carries the fixed value.
    pub fn matches(&self, path: &NamespacePath) -> bool {
        if path.len() != self.len() {
            return false;
        }
        self.segments.iter().zip(path.elements()).all(|(seg, el)| match seg {
            Segment::Fixed { value } => value == el,
            Segment::Dynamic { .. } => true,
        })
    }

    /// The request meaning "every instance of this shape": all dynamic slots wildcarded.
    pub fn template(&self) -> NamespacePath {
        NamespacePath::new(self.segments.iter().map(|s| match s {
            Segment::Fixed { value } => value.clone(),
            Segment::Dynamic { .. } => WILDCARD.to_string(),
        }))
    }
}

impl fmt::Display for NamespaceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.segments {
            match seg {
                Segment::Fixed { value } => write!(f, "/{}", value)?,
                Segment::Dynamic { name, .. } => write!(f, "/[{}]", name)?,
            }
        }
        Ok(())
    }
}

// ---------------- Namespace paths ----------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("namespace path is empty")]
    Empty,
    #[error("namespace path has an empty segment at position {0}")]
    EmptySegment(usize),
}

/// A concrete namespace: one string per shape segment, `*` for an unbound dynamic slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct NamespacePath(SmallVec<[String; 9]>);

impl NamespacePath {
    pub fn new<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(elements.into_iter().map(Into::into).collect())
    }

    /// Parse the slash-delimited text form; a leading `/` is optional.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let body = s.strip_prefix('/').unwrap_or(s);
        if body.is_empty() {
            return Err(PathError::Empty);
        }
        let mut out = SmallVec::new();
        for (i, part) in body.split('/').enumerate() {
            if part.is_empty() {
                return Err(PathError::EmptySegment(i));
            }
            out.push(part.to_string());
        }
        Ok(Self(out))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).map(String::as_str)
    }

    pub fn elements(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_wildcard(&self, idx: usize) -> bool {
        self.get(idx) == Some(WILDCARD)
    }

    /// Overwrite one element; out-of-range positions are ignored.
    pub fn set(&mut self, idx: usize, value: impl Into<String>) {
        if let Some(slot) = self.0.get_mut(idx) {
            *slot = value.into();
        }
    }
}

impl fmt::Display for NamespacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for el in &self.0 {
            write!(f, "/{}", el)?;
        }
        Ok(())
    }
}

impl FromStr for NamespacePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------- Pod snapshots ----------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }

    /// Map the API server's phase string; anything unrecognised is `Unknown`.
    pub fn from_api(s: &str) -> Self {
        match s {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConditionType {
    Ready,
    PodScheduled,
    Initialized,
    ContainersReady,
    Other(String),
}

impl ConditionType {
    pub fn from_api(s: &str) -> Self {
        match s {
            "Ready" => ConditionType::Ready,
            "PodScheduled" => ConditionType::PodScheduled,
            "Initialized" => ConditionType::Initialized,
            "ContainersReady" => ConditionType::ContainersReady,
            other => ConditionType::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub satisfied: bool,
}

/// Runtime state of a container as last observed by the kubelet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RuntimePhase {
    Waiting,
    Running,
    Terminated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerState {
    pub name: String,
    pub restart_count: u32,
    pub ready: bool,
    /// None when the kubelet has not reported a state yet.
    pub runtime: Option<RuntimePhase>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodState {
    pub namespace: String,
    pub name: String,
    pub phase: PodPhase,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub containers: Vec<ContainerState>,
}

impl PodState {
    /// Presence check only; the condition's own status is not consulted.
    pub fn has_condition(&self, t: &ConditionType) -> bool {
        self.conditions.iter().any(|c| &c.type_ == t)
    }
}

// ---------------- Resolved values ----------------

/// One resolved metric instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricValue {
    pub shape: ShapeId,
    pub version: u32,
    /// Fully bound path (no wildcards left).
    pub path: NamespacePath,
    pub value: i64,
    pub timestamp: DateTime<Utc>,
}

impl MetricValue {
    /// Equality ignoring capture time.
    pub fn same_value(&self, other: &MetricValue) -> bool {
        self.shape == other.shape && self.version == other.version && self.path == other.path && self.value == other.value
    }
}

pub mod prelude {
    pub use super::{
        Condition, ConditionType, ContainerState, MetricValue, NamespacePath, NamespaceShape, PodPhase, PodState,
        RuntimePhase, Segment, ShapeId, WILDCARD,
    };
}
