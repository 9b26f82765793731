//! In-process transactional property-graph engine.
//!
//! spec.md treats the graph engine as an external black box and specifies
//! only its contract: transactions, typed properties, tagged nodes/edges,
//! predicate iterators, secondary indexes (see SPEC_FULL.md §4.D.1). This
//! module is that contract made concrete, shaped like the teacher's
//! `Arc<parking_lot::Mutex<Store>>` shared-handle pattern
//! (`storage.rs::SharedStore`): a cheap-to-clone handle wrapping a single
//! lock around all mutable state, with one write-lock critical section per
//! commit so a transaction's mutations become visible atomically.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::model::PropertyValue;

use super::constraints::{BoolOp, ConstraintGroup, Op};

pub type NodeId = u64;
pub type EdgeId = u64;

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub tag: String,
    pub props: HashMap<String, PropertyValue>,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub tag: String,
    pub src: NodeId,
    pub dst: NodeId,
    pub props: HashMap<String, PropertyValue>,
}

/// `(tag, property key) -> sorted value -> node/edge ids`, built lazily on
/// first constrained query against that (tag, key) pair.
type Index = HashMap<(String, String), BTreeMap<OrdValue, HashSet<u64>>>;

/// A property value made totally-orderable so it can key a `BTreeMap`; we
/// fall back to a tag + string repr when values of different variants meet,
/// which only matters for ordering within an index bucket, never for
/// equality/range-predicate evaluation (that compares `PropertyValue`
/// directly).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct OrdValue(u8, String);

impl From<&PropertyValue> for OrdValue {
    fn from(v: &PropertyValue) -> Self {
        match v {
            PropertyValue::Bool(b) => OrdValue(0, b.to_string()),
            PropertyValue::Int(i) => OrdValue(1, format!("{:020}", i + i64::MAX / 2)),
            PropertyValue::Float(f) => OrdValue(2, format!("{:020}", (*f * 1e6) as i64 + i64::MAX / 2)),
            PropertyValue::String(s) => OrdValue(3, s.clone()),
            PropertyValue::Time(t) => OrdValue(4, t.clone()),
        }
    }
}

#[derive(Default)]
struct GraphInner {
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<EdgeId, Edge>,
    out_edges: HashMap<NodeId, Vec<EdgeId>>,
    in_edges: HashMap<NodeId, Vec<EdgeId>>,
    node_index: Index,
}

impl GraphInner {
    fn index_node(&mut self, node: &Node) {
        for (key, val) in &node.props {
            self.node_index
                .entry((node.tag.clone(), key.clone()))
                .or_default()
                .entry(OrdValue::from(val))
                .or_default()
                .insert(node.id);
        }
    }
}

/// Cheap-to-clone handle to the shared graph state.
#[derive(Clone)]
pub struct GraphEngine {
    inner: Arc<RwLock<GraphInner>>,
    next_node_id: Arc<AtomicU64>,
    next_edge_id: Arc<AtomicU64>,
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(GraphInner::default())),
            next_node_id: Arc::new(AtomicU64::new(1)),
            next_edge_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn begin(&self) -> Transaction {
        Transaction {
            engine: self.clone(),
            pending_nodes: Vec::new(),
            pending_edges: Vec::new(),
            node_updates: Vec::new(),
            edge_updates: Vec::new(),
        }
    }

    pub fn get_node(&self, id: NodeId) -> Option<Node> {
        self.inner.read().nodes.get(&id).cloned()
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<Edge> {
        self.inner.read().edges.get(&id).cloned()
    }

    /// All node ids carrying `tag`, via a full scan. Callers that already
    /// have a single-predicate constraint to apply should try
    /// `nodes_by_indexed_predicate` first, since that consults the
    /// secondary index instead of scanning every node.
    pub fn nodes_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.inner
            .read()
            .nodes
            .values()
            .filter(|n| n.tag == tag)
            .map(|n| n.id)
            .collect()
    }

    /// Node ids of the given `tag` satisfying `group` via the secondary
    /// index, without scanning every node of that tag. Returns `None` when
    /// `group` isn't a single equality/range predicate the index can
    /// answer directly (an OR group, more than one predicate, or a `!=`
    /// predicate) — callers should fall back to a full scan plus
    /// `ConstraintGroup::matches` in that case.
    pub fn nodes_by_indexed_predicate(&self, tag: &str, group: &ConstraintGroup) -> Option<Vec<NodeId>> {
        if group.predicates.len() != 1 || group.op == Some(BoolOp::Or) {
            return None;
        }
        let predicate = &group.predicates[0];
        if predicate.op == Op::Ne {
            return None;
        }

        let g = self.inner.read();
        let Some(bucket) = g.node_index.get(&(tag.to_string(), predicate.key.clone())) else {
            return Some(Vec::new());
        };

        use std::ops::Bound;
        let collect = |range: std::collections::btree_map::Range<'_, OrdValue, HashSet<u64>>| -> Vec<NodeId> {
            range.flat_map(|(_, ids)| ids.iter().copied()).collect()
        };

        let ids = match predicate.op {
            Op::Eq => bucket.get(&OrdValue::from(&predicate.v1)).into_iter().flatten().copied().collect(),
            Op::Gt => collect(bucket.range((Bound::Excluded(OrdValue::from(&predicate.v1)), Bound::Unbounded))),
            Op::Ge => collect(bucket.range((Bound::Included(OrdValue::from(&predicate.v1)), Bound::Unbounded))),
            Op::Lt => collect(bucket.range((Bound::Unbounded, Bound::Excluded(OrdValue::from(&predicate.v1))))),
            Op::Le => collect(bucket.range((Bound::Unbounded, Bound::Included(OrdValue::from(&predicate.v1))))),
            Op::GtLt | Op::GeLt | Op::GtLe | Op::GeLe => {
                let v2 = predicate.v2.as_ref()?;
                let lower_inclusive = matches!(predicate.op, Op::GeLt | Op::GeLe);
                let upper_inclusive = matches!(predicate.op, Op::GtLe | Op::GeLe);
                let lo = OrdValue::from(&predicate.v1);
                let hi = OrdValue::from(v2);
                let lower = if lower_inclusive { Bound::Included(lo) } else { Bound::Excluded(lo) };
                let upper = if upper_inclusive { Bound::Included(hi) } else { Bound::Excluded(hi) };
                collect(bucket.range((lower, upper)))
            }
            Op::Ne => unreachable!("handled above"),
        };
        Some(ids)
    }

    pub fn out_edges(&self, node: NodeId) -> Vec<Edge> {
        let g = self.inner.read();
        g.out_edges
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|id| g.edges.get(id).cloned())
            .collect()
    }

    pub fn in_edges(&self, node: NodeId) -> Vec<Edge> {
        let g = self.inner.read();
        g.in_edges
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|id| g.edges.get(id).cloned())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Remove nodes (and their incident edges) whose `_expiration` time
    /// property is before `now` (RFC3339 string comparison, same as the
    /// `Time` property ordering used everywhere else). Used by the
    /// autodelete background task (§5).
    pub fn sweep_expired(&self, now: &str) -> usize {
        let mut g = self.inner.write();
        let expired: Vec<NodeId> = g
            .nodes
            .values()
            .filter(|n| match n.props.get("VDMS_EXPIRATION") {
                Some(PropertyValue::Time(t)) => t.as_str() < now,
                _ => false,
            })
            .map(|n| n.id)
            .collect();
        for id in &expired {
            if let Some(node) = g.nodes.remove(id) {
                for (k, v) in &node.props {
                    if let Some(bucket) = g.node_index.get_mut(&(node.tag.clone(), k.clone())) {
                        if let Some(set) = bucket.get_mut(&OrdValue::from(v)) {
                            set.remove(id);
                        }
                    }
                }
            }
            let out: Vec<EdgeId> = g.out_edges.remove(id).unwrap_or_default();
            let inc: Vec<EdgeId> = g.in_edges.remove(id).unwrap_or_default();
            for eid in out.into_iter().chain(inc) {
                g.edges.remove(&eid);
            }
        }
        expired.len()
    }
}

/// Pending mutation recorded before commit, so `commit()` can apply the
/// whole batch under one write-lock critical section.
enum NodeUpdate {
    SetProps(NodeId, HashMap<String, PropertyValue>, Vec<String>),
}
enum EdgeUpdate {
    SetProps(EdgeId, HashMap<String, PropertyValue>, Vec<String>),
}

/// One command-list's worth of mutations. Nothing is visible to other
/// transactions until `commit()` runs; `rollback` (implicit on `Drop`
/// without `commit`) leaves the engine untouched, satisfying the
/// atomicity invariant (§3, §8).
pub struct Transaction {
    engine: GraphEngine,
    pending_nodes: Vec<Node>,
    pending_edges: Vec<Edge>,
    node_updates: Vec<NodeUpdate>,
    edge_updates: Vec<EdgeUpdate>,
}

impl Transaction {
    pub fn stage_node(&mut self, tag: String, props: HashMap<String, PropertyValue>) -> NodeId {
        let id = self.engine.next_node_id.fetch_add(1, Ordering::Relaxed);
        self.pending_nodes.push(Node { id, tag, props });
        id
    }

    pub fn stage_edge(&mut self, tag: String, src: NodeId, dst: NodeId, props: HashMap<String, PropertyValue>) -> EdgeId {
        let id = self.engine.next_edge_id.fetch_add(1, Ordering::Relaxed);
        self.pending_edges.push(Edge { id, tag, src, dst, props });
        id
    }

    pub fn stage_node_update(&mut self, id: NodeId, set: HashMap<String, PropertyValue>, remove: Vec<String>) {
        self.node_updates.push(NodeUpdate::SetProps(id, set, remove));
    }

    pub fn stage_edge_update(&mut self, id: EdgeId, set: HashMap<String, PropertyValue>, remove: Vec<String>) {
        self.edge_updates.push(EdgeUpdate::SetProps(id, set, remove));
    }

    /// Read access during the transaction sees only already-committed
    /// state, matching the spec's requirement that a transaction either
    /// commits wholly or not at all: staged-but-uncommitted nodes are not
    /// queryable mid-transaction except through the builder's own ref
    /// cache, which tracks them separately.
    pub fn engine(&self) -> &GraphEngine {
        &self.engine
    }

    /// Apply every staged mutation atomically and return the finalized
    /// node/edge records for anything this transaction created (keyed by
    /// the id assigned at `stage_*` time, which is already final).
    pub fn commit(self) {
        let mut g = self.engine.inner.write();
        for node in self.pending_nodes {
            g.index_node(&node);
            g.nodes.insert(node.id, node);
        }
        for edge in self.pending_edges {
            g.out_edges.entry(edge.src).or_default().push(edge.id);
            g.in_edges.entry(edge.dst).or_default().push(edge.id);
            g.edges.insert(edge.id, edge);
        }
        for update in self.node_updates {
            let NodeUpdate::SetProps(id, set, remove) = update;
            if let Some(node) = g.nodes.get_mut(&id) {
                for key in remove {
                    node.props.remove(&key);
                }
                for (k, v) in set {
                    node.props.insert(k, v);
                }
                let node = node.clone();
                g.index_node(&node);
            }
        }
        for update in self.edge_updates {
            let EdgeUpdate::SetProps(id, set, remove) = update;
            if let Some(edge) = g.edges.get_mut(&id) {
                for key in remove {
                    edge.props.remove(&key);
                }
                for (k, v) in set {
                    edge.props.insert(k, v);
                }
            }
        }
    }
}
