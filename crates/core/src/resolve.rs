//! Resolver: match a requested namespace against the catalog and derive values from pod state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{self, SLOT_CONTAINER, SLOT_NAMESPACE, SLOT_PHASE, SLOT_POD};
use crate::{ConditionType, ContainerState, MetricValue, NamespacePath, NamespaceShape, PodState, RuntimePhase, ShapeId, WILDCARD};

/// Why a request could not be mapped to a shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unsupported {
    /// No declared shape has this many segments.
    Arity(usize),
    /// Shapes of this arity exist but none agrees on the fixed segments.
    NoMatch,
    /// More than one shape matches; the resolver refuses to pick.
    Ambiguous(Vec<ShapeId>),
}

impl std::fmt::Display for Unsupported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unsupported::Arity(n) => write!(f, "no shape with {} segments", n),
            Unsupported::NoMatch => f.write_str("fixed segments match no shape"),
            Unsupported::Ambiguous(ids) => {
                let names: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
                write!(f, "ambiguous between {}", names.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unsupported namespace {path}: {reason}")]
    UnsupportedNamespace { path: NamespacePath, reason: Unsupported },
}

/// Matches requests against a fixed set of shapes.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    shapes: &'a [NamespaceShape],
}

impl Resolver<'static> {
    /// Resolver over the built-in catalog.
    pub fn builtin() -> Self {
        Self { shapes: catalog::list_shapes() }
    }
}

impl Default for Resolver<'static> {
    fn default() -> Self {
        Self::builtin()
    }
}

impl<'a> Resolver<'a> {
    pub fn new(shapes: &'a [NamespaceShape]) -> Self {
        Self { shapes }
    }

    pub fn shapes(&self) -> &'a [NamespaceShape] {
        self.shapes
    }

    /// Find the single shape a request belongs to: arity first, then fixed segments.
    pub fn plan(&self, request: &NamespacePath) -> Result<ResolvePlan<'a>, ResolveError> {
        let unsupported = |reason| ResolveError::UnsupportedNamespace { path: request.clone(), reason };

        let same_arity: Vec<&'a NamespaceShape> = self.shapes.iter().filter(|s| s.len() == request.len()).collect();
        if same_arity.is_empty() {
            return Err(unsupported(Unsupported::Arity(request.len())));
        }
        let mut hits = same_arity.into_iter().filter(|s| s.matches(request));
        match (hits.next(), hits.next()) {
            (None, _) => Err(unsupported(Unsupported::NoMatch)),
            (Some(shape), None) => {
                debug!(shape = %shape.id, request = %request, "request planned");
                Ok(ResolvePlan { shape, request: request.clone() })
            }
            (Some(a), Some(b)) => {
                let mut ids = vec![a.id, b.id];
                ids.extend(hits.map(|s| s.id));
                Err(unsupported(Unsupported::Ambiguous(ids)))
            }
        }
    }

    /// Resolve one request against one pod, stamped with the current time.
    pub fn resolve(&self, request: &NamespacePath, pod: &PodState) -> Result<Vec<MetricValue>, ResolveError> {
        self.resolve_at(request, pod, Utc::now())
    }

    pub fn resolve_at(
        &self,
        request: &NamespacePath,
        pod: &PodState,
        at: DateTime<Utc>,
    ) -> Result<Vec<MetricValue>, ResolveError> {
        Ok(self.plan(request)?.extract(pod, at))
    }
}

/// A request bound to its shape, reusable across every pod of a snapshot.
#[derive(Debug, Clone)]
pub struct ResolvePlan<'a> {
    shape: &'a NamespaceShape,
    request: NamespacePath,
}

impl<'a> ResolvePlan<'a> {
    pub fn shape(&self) -> &'a NamespaceShape {
        self.shape
    }

    pub fn request(&self) -> &NamespacePath {
        &self.request
    }

    /// Derive every metric instance this request yields for `pod`.
    /// Empty when the pod has nothing to report (no conditions, no containers) or when a
    /// bound dynamic slot selects a different object.
    pub fn extract(&self, pod: &PodState, at: DateTime<Utc>) -> Vec<MetricValue> {
        let id = self.shape.id;
        if id.is_container() {
            return pod
                .containers
                .iter()
                .filter_map(|c| {
                    let path = self.bind(&[
                        (SLOT_NAMESPACE, pod.namespace.as_str()),
                        (SLOT_POD, pod.name.as_str()),
                        (SLOT_CONTAINER, c.name.as_str()),
                    ])?;
                    Some(self.emit(path, container_value(id, c), at))
                })
                .collect();
        }

        let out = match id {
            ShapeId::PodPhase => self
                .bind(&[(SLOT_NAMESPACE, pod.namespace.as_str()), (SLOT_POD, pod.name.as_str()), (SLOT_PHASE, pod.phase.as_str())])
                .map(|path| self.emit(path, 1, at)),
            ShapeId::PodConditionReady | ShapeId::PodConditionScheduled if pod.conditions.is_empty() => None,
            ShapeId::PodConditionReady => self
                .bind(&[(SLOT_NAMESPACE, pod.namespace.as_str()), (SLOT_POD, pod.name.as_str())])
                .map(|path| self.emit(path, bool_int(pod.has_condition(&ConditionType::Ready)), at)),
            ShapeId::PodConditionScheduled => self
                .bind(&[(SLOT_NAMESPACE, pod.namespace.as_str()), (SLOT_POD, pod.name.as_str())])
                .map(|path| self.emit(path, bool_int(pod.has_condition(&ConditionType::PodScheduled)), at)),
            _ => None,
        };
        out.into_iter().collect()
    }

    /// Fill dynamic slots from live values. A slot the request already binds must agree.
    fn bind(&self, values: &[(&str, &str)]) -> Option<NamespacePath> {
        let mut path = self.request.clone();
        for (slot, live) in values {
            let Some(pos) = self.shape.dynamic_position(slot) else { continue };
            let agrees = matches!(path.get(pos), Some(requested) if requested == WILDCARD || requested == *live);
            if !agrees {
                return None;
            }
            path.set(pos, *live);
        }
        Some(path)
    }

    fn emit(&self, path: NamespacePath, value: i64, at: DateTime<Utc>) -> MetricValue {
        MetricValue { shape: self.shape.id, version: self.shape.version, path, value, timestamp: at }
    }
}

fn container_value(id: ShapeId, c: &ContainerState) -> i64 {
    match id {
        ShapeId::ContainerRestarts => i64::from(c.restart_count),
        ShapeId::ContainerReady => bool_int(c.ready),
        ShapeId::ContainerWaiting => bool_int(c.runtime == Some(RuntimePhase::Waiting)),
        ShapeId::ContainerRunning => bool_int(c.runtime == Some(RuntimePhase::Running)),
        ShapeId::ContainerTerminated => bool_int(c.runtime == Some(RuntimePhase::Terminated)),
        _ => 0,
    }
}

fn bool_int(b: bool) -> i64 {
    if b { 1 } else { 0 }
}
