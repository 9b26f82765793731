//! Executes a `QueryBuilder` program against a `GraphEngine`, grounded on
//! spec.md §4.D's adapter contract: one transaction per envelope, a
//! per-transaction ref→iterator cache so a later command can refer back to
//! an earlier command's result set, and wire status codes matching PMGD's
//! `CommandResponse` codes (`parse_response` /
//! `original_source/src/PMGDQuery.cc`).

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::model::PropertyValue;

use super::builder::{GraphOp, Link, LinkDirection};
use super::engine::{EdgeId, GraphEngine, NodeId};
use super::results::{Projection, ResultSpec};

/// Wire status, matching PMGD's `CommandResponse` codes: `Success = 0`,
/// `Empty = 1` (query matched zero entities), `Exists = 2` (an `AddNode`
/// found a matching node and reused it instead of creating one),
/// `NotUnique = 3` (a `unique` query matched more than one entity),
/// `Error = -1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Empty,
    Exists,
    NotUnique,
    Error,
}

impl Status {
    pub fn code(self) -> i32 {
        match self {
            Status::Success => 0,
            Status::Empty => 1,
            Status::Exists => 2,
            Status::NotUnique => 3,
            Status::Error => -1,
        }
    }
}

pub struct OpResponse {
    pub status: Status,
    pub body: Value,
}

impl OpResponse {
    fn error(msg: impl Into<String>) -> Self {
        OpResponse { status: Status::Error, body: json!({ "info": msg.into() }) }
    }

    fn not_unique(msg: impl Into<String>) -> Self {
        OpResponse { status: Status::NotUnique, body: json!({ "info": msg.into() }) }
    }

    pub fn to_json(&self) -> Value {
        let mut body = self.body.clone();
        if let Value::Object(ref mut map) = body {
            map.insert("status".into(), json!(self.status.code()));
        }
        body
    }
}

#[derive(Clone)]
enum RefBinding {
    Nodes(Vec<NodeId>),
    Edges(Vec<EdgeId>),
}

/// Runs one envelope's worth of graph commands as a single transaction:
/// every staged mutation becomes visible together on commit, and nothing
/// is visible if any command in the list hits a hard error, matching the
/// atomicity invariant tested by the `query_pipeline` integration tests.
pub fn run(engine: &GraphEngine, ops: Vec<GraphOp>) -> Vec<Value> {
    let mut tx = engine.begin();
    let mut refs: HashMap<i64, RefBinding> = HashMap::new();
    let mut responses = Vec::with_capacity(ops.len());
    let mut hard_error = false;

    for op in ops {
        if hard_error {
            responses.push(OpResponse::error("aborted: prior command in this transaction failed").to_json());
            continue;
        }
        let resp = execute_one(engine, &mut tx, &mut refs, op);
        if resp.status == Status::Error || resp.status == Status::NotUnique {
            hard_error = true;
        }
        responses.push(resp.to_json());
    }

    if hard_error {
        // Drop the transaction without committing: none of this
        // envelope's mutations take effect.
        drop(tx);
    } else {
        tx.commit();
    }

    responses
}

fn execute_one(
    engine: &GraphEngine,
    tx: &mut super::engine::Transaction,
    refs: &mut HashMap<i64, RefBinding>,
    op: GraphOp,
) -> OpResponse {
    match op {
        GraphOp::AddNode { ref_id, tag, props, constraints } => add_node(engine, tx, refs, ref_id, tag, props, constraints),
        GraphOp::UpdateNode { ref_id, tag, set, remove, constraints, unique } => {
            update_node(engine, tx, refs, ref_id, tag, set, remove, constraints, unique)
        }
        GraphOp::AddEdge { ref_id, src, dst, tag, props } => add_edge(tx, refs, ref_id, src, dst, tag, props),
        GraphOp::UpdateEdge { ref_id, src, dst, tag, set, remove, constraints, unique } => {
            update_edge(engine, tx, refs, ref_id, src, dst, tag, set, remove, constraints, unique)
        }
        GraphOp::QueryNode { ref_id, tag, link, constraints, results, unique } => {
            query_node(engine, refs, ref_id, tag, link, constraints, results, unique)
        }
        GraphOp::QueryEdge { ref_id, src, dst, tag, constraints, results, unique } => {
            query_edge(engine, refs, ref_id, src, dst, tag, constraints, results, unique)
        }
    }
}

fn add_node(
    engine: &GraphEngine,
    tx: &mut super::engine::Transaction,
    refs: &mut HashMap<i64, RefBinding>,
    ref_id: i64,
    tag: String,
    props: HashMap<String, PropertyValue>,
    constraints: Option<super::constraints::ConstraintGroup>,
) -> OpResponse {
    if let Some(cg) = &constraints {
        let existing: Vec<NodeId> = match engine.nodes_by_indexed_predicate(&tag, cg) {
            Some(ids) => ids,
            None => engine
                .nodes_by_tag(&tag)
                .into_iter()
                .filter(|id| engine.get_node(*id).map(|n| cg.matches(&n.props)).unwrap_or(false))
                .collect(),
        };
        if let Some(&id) = existing.first() {
            refs.insert(ref_id, RefBinding::Nodes(vec![id]));
            return OpResponse { status: Status::Exists, body: json!({ "NodeID": id }) };
        }
    }
    let id = tx.stage_node(tag, props);
    refs.insert(ref_id, RefBinding::Nodes(vec![id]));
    OpResponse { status: Status::Success, body: json!({ "NodeID": id }) }
}

fn resolve_node_targets(
    engine: &GraphEngine,
    refs: &HashMap<i64, RefBinding>,
    ref_id: i64,
    tag: Option<&str>,
    constraints: Option<&super::constraints::ConstraintGroup>,
) -> Vec<NodeId> {
    if let Some(RefBinding::Nodes(ids)) = refs.get(&ref_id) {
        return ids.clone();
    }
    let Some(tag) = tag else { return Vec::new() };
    if let Some(cg) = constraints {
        if let Some(ids) = engine.nodes_by_indexed_predicate(tag, cg) {
            return ids;
        }
    }
    let candidates: Vec<NodeId> = engine.nodes_by_tag(tag);
    match constraints {
        Some(cg) => candidates
            .into_iter()
            .filter(|id| engine.get_node(*id).map(|n| cg.matches(&n.props)).unwrap_or(false))
            .collect(),
        None => candidates,
    }
}

#[allow(clippy::too_many_arguments)]
fn update_node(
    engine: &GraphEngine,
    tx: &mut super::engine::Transaction,
    refs: &mut HashMap<i64, RefBinding>,
    ref_id: i64,
    tag: Option<String>,
    set: HashMap<String, PropertyValue>,
    remove: Vec<String>,
    constraints: Option<super::constraints::ConstraintGroup>,
    unique: bool,
) -> OpResponse {
    let targets = resolve_node_targets(engine, refs, ref_id, tag.as_deref(), constraints.as_ref());
    if unique && targets.len() != 1 {
        return OpResponse::not_unique(format!("update_node: unique query matched {} nodes, expected 1", targets.len()));
    }
    if targets.is_empty() {
        return OpResponse { status: Status::Empty, body: json!({}) };
    }
    for &id in &targets {
        tx.stage_node_update(id, set.clone(), remove.clone());
    }
    refs.insert(ref_id, RefBinding::Nodes(targets.clone()));
    OpResponse { status: Status::Success, body: json!({ "NodeID": targets[0] }) }
}

fn resolve_node_ref(engine: &GraphEngine, refs: &HashMap<i64, RefBinding>, r: i64) -> Option<NodeId> {
    match refs.get(&r) {
        Some(RefBinding::Nodes(ids)) if ids.len() == 1 => Some(ids[0]),
        Some(RefBinding::Nodes(ids)) => ids.first().copied(),
        _ => {
            let as_id = u64::try_from(r).ok()?;
            engine.get_node(as_id).map(|n| n.id)
        }
    }
}

fn add_edge(
    tx: &mut super::engine::Transaction,
    refs: &mut HashMap<i64, RefBinding>,
    ref_id: i64,
    src: i64,
    dst: i64,
    tag: String,
    props: HashMap<String, PropertyValue>,
) -> OpResponse {
    let engine = tx.engine().clone();
    let Some(src_id) = resolve_node_ref(&engine, refs, src) else {
        return OpResponse::error(format!("add_edge: could not resolve source reference {src}"));
    };
    let Some(dst_id) = resolve_node_ref(&engine, refs, dst) else {
        return OpResponse::error(format!("add_edge: could not resolve destination reference {dst}"));
    };
    let id = tx.stage_edge(tag, src_id, dst_id, props);
    refs.insert(ref_id, RefBinding::Edges(vec![id]));
    OpResponse { status: Status::Success, body: json!({ "EdgeID": id }) }
}

#[allow(clippy::too_many_arguments)]
fn update_edge(
    engine: &GraphEngine,
    tx: &mut super::engine::Transaction,
    refs: &mut HashMap<i64, RefBinding>,
    ref_id: i64,
    src: i64,
    dst: i64,
    tag: Option<String>,
    set: HashMap<String, PropertyValue>,
    remove: Vec<String>,
    constraints: Option<super::constraints::ConstraintGroup>,
    unique: bool,
) -> OpResponse {
    let targets: Vec<EdgeId> = if let Some(RefBinding::Edges(ids)) = refs.get(&ref_id) {
        ids.clone()
    } else {
        let Some(src_id) = resolve_node_ref(engine, refs, src) else {
            return OpResponse::error(format!("update_edge: could not resolve source reference {src}"));
        };
        let Some(dst_id) = resolve_node_ref(engine, refs, dst) else {
            return OpResponse::error(format!("update_edge: could not resolve destination reference {dst}"));
        };
        engine
            .out_edges(src_id)
            .into_iter()
            .filter(|e| e.dst == dst_id)
            .filter(|e| tag.as_deref().map(|t| t == e.tag).unwrap_or(true))
            .filter(|e| constraints.as_ref().map(|cg| cg.matches(&e.props)).unwrap_or(true))
            .map(|e| e.id)
            .collect()
    };
    if unique && targets.len() != 1 {
        return OpResponse::not_unique(format!("update_edge: unique query matched {} edges, expected 1", targets.len()));
    }
    if targets.is_empty() {
        return OpResponse { status: Status::Empty, body: json!({}) };
    }
    for &id in &targets {
        tx.stage_edge_update(id, set.clone(), remove.clone());
    }
    refs.insert(ref_id, RefBinding::Edges(targets.clone()));
    OpResponse { status: Status::Success, body: json!({ "EdgeID": targets[0] }) }
}

fn neighbor_node_ids(engine: &GraphEngine, anchors: &[NodeId], link: &Link) -> Vec<NodeId> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for &anchor in anchors {
        let edges = match link.direction {
            LinkDirection::Out => engine.out_edges(anchor),
            LinkDirection::In => engine.in_edges(anchor),
            LinkDirection::Any => {
                let mut both = engine.out_edges(anchor);
                both.extend(engine.in_edges(anchor));
                both
            }
        };
        for edge in edges {
            if let Some(tag) = &link.tag {
                if &edge.tag != tag {
                    continue;
                }
            }
            let other = if edge.src == anchor { edge.dst } else { edge.src };
            if seen.insert(other) {
                out.push(other);
            }
        }
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn query_node(
    engine: &GraphEngine,
    refs: &mut HashMap<i64, RefBinding>,
    ref_id: i64,
    tag: Option<String>,
    link: Option<Link>,
    constraints: Option<super::constraints::ConstraintGroup>,
    results: ResultSpec,
    unique: bool,
) -> OpResponse {
    let mut candidates: Vec<NodeId> = if let Some(link) = &link {
        // `unique` on the anchor's own binding is independent of this
        // traversal: the downstream link always walks the full anchor
        // set as a neighbor union, never erroring on a non-unique anchor
        // (see SPEC_FULL.md §9, Open Question 2).
        let anchors = match refs.get(&link.ref_id) {
            Some(RefBinding::Nodes(ids)) => ids.clone(),
            _ => return OpResponse::error(format!("query_node: link references unbound ref {}", link.ref_id)),
        };
        neighbor_node_ids(engine, &anchors, link)
    } else {
        match &tag {
            Some(tag) => match constraints.as_ref().and_then(|cg| engine.nodes_by_indexed_predicate(tag, cg)) {
                Some(ids) => ids,
                None => engine.nodes_by_tag(tag),
            },
            None => Vec::new(),
        }
    };

    if let Some(tag) = &tag {
        candidates.retain(|id| engine.get_node(*id).map(|n| &n.tag == tag).unwrap_or(false));
    }
    if let Some(cg) = &constraints {
        candidates.retain(|id| engine.get_node(*id).map(|n| cg.matches(&n.props)).unwrap_or(false));
    }

    if unique && candidates.len() != 1 {
        return OpResponse::not_unique(format!("query_node: unique query matched {} nodes, expected 1", candidates.len()));
    }

    refs.insert(ref_id, RefBinding::Nodes(candidates.clone()));

    if candidates.is_empty() {
        return OpResponse { status: Status::Empty, body: json!({}) };
    }

    let nodes: Vec<_> = candidates.iter().filter_map(|id| engine.get_node(*id)).collect();
    let body = project_nodes(&nodes, &results);
    OpResponse { status: Status::Success, body }
}

#[allow(clippy::too_many_arguments)]
fn query_edge(
    engine: &GraphEngine,
    refs: &mut HashMap<i64, RefBinding>,
    ref_id: i64,
    src: i64,
    dst: i64,
    tag: Option<String>,
    constraints: Option<super::constraints::ConstraintGroup>,
    results: ResultSpec,
    unique: bool,
) -> OpResponse {
    let src_id = resolve_node_ref(engine, refs, src);
    let dst_id = resolve_node_ref(engine, refs, dst);

    let mut candidates: Vec<EdgeId> = match (src_id, dst_id) {
        (Some(s), None) => engine.out_edges(s).into_iter().map(|e| e.id).collect(),
        (None, Some(d)) => engine.in_edges(d).into_iter().map(|e| e.id).collect(),
        (Some(s), Some(d)) => engine.out_edges(s).into_iter().filter(|e| e.dst == d).map(|e| e.id).collect(),
        (None, None) => return OpResponse::error("query_edge: could not resolve src or dst reference"),
    };

    if let Some(tag) = &tag {
        candidates.retain(|id| engine.get_edge(*id).map(|e| &e.tag == tag).unwrap_or(false));
    }
    if let Some(cg) = &constraints {
        candidates.retain(|id| engine.get_edge(*id).map(|e| cg.matches(&e.props)).unwrap_or(false));
    }

    if unique && candidates.len() != 1 {
        return OpResponse::not_unique(format!("query_edge: unique query matched {} edges, expected 1", candidates.len()));
    }

    refs.insert(ref_id, RefBinding::Edges(candidates.clone()));

    if candidates.is_empty() {
        return OpResponse { status: Status::Empty, body: json!({}) };
    }

    let edges: Vec<_> = candidates.iter().filter_map(|id| engine.get_edge(*id)).collect();
    let body = project_edges(&edges, &results);
    OpResponse { status: Status::Success, body }
}

fn sort_and_limit<T>(items: &mut Vec<T>, key_of: impl Fn(&T) -> Option<PropertyValue>, results: &ResultSpec) {
    if let Some(sort_key) = &results.sort_key {
        let _ = sort_key;
        items.sort_by(|a, b| {
            let ka = key_of(a);
            let kb = key_of(b);
            ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
        });
        if results.sort_descending {
            items.reverse();
        }
    }
    if let Some(limit) = results.limit {
        items.truncate(limit);
    }
}

fn project_nodes(nodes: &[super::engine::Node], results: &ResultSpec) -> Value {
    let mut nodes: Vec<super::engine::Node> = nodes.to_vec();
    sort_and_limit(&mut nodes, |n| results.sort_key.as_ref().and_then(|k| n.props.get(k).cloned()), results);

    match &results.projection {
        None | Some(Projection::List(_)) => {
            let keys = match &results.projection {
                Some(Projection::List(keys)) => Some(keys),
                _ => None,
            };
            let entities: Vec<Value> = nodes
                .iter()
                .map(|n| {
                    let mut obj = serde_json::Map::new();
                    match keys {
                        Some(keys) if !keys.is_empty() => {
                            for k in keys {
                                if let Some(v) = n.props.get(k) {
                                    obj.insert(k.clone(), v.to_json());
                                }
                            }
                        }
                        _ => {
                            for (k, v) in &n.props {
                                obj.insert(k.clone(), v.to_json());
                            }
                        }
                    }
                    Value::Object(obj)
                })
                .collect();
            json!({ "returned": entities.len(), "entities": entities })
        }
        Some(Projection::Count) => json!({ "count": nodes.len() }),
        Some(Projection::Sum(keys)) => json!({ "sum": numeric_aggregate(nodes.iter().map(|n| &n.props), keys, false) }),
        Some(Projection::Average(keys)) => json!({ "average": numeric_aggregate(nodes.iter().map(|n| &n.props), keys, true) }),
    }
}

fn project_edges(edges: &[super::engine::Edge], results: &ResultSpec) -> Value {
    let mut edges: Vec<super::engine::Edge> = edges.to_vec();
    sort_and_limit(&mut edges, |e| results.sort_key.as_ref().and_then(|k| e.props.get(k).cloned()), results);

    match &results.projection {
        None | Some(Projection::List(_)) => {
            let keys = match &results.projection {
                Some(Projection::List(keys)) => Some(keys),
                _ => None,
            };
            let connections: Vec<Value> = edges
                .iter()
                .map(|e| {
                    let mut obj = serde_json::Map::new();
                    match keys {
                        Some(keys) if !keys.is_empty() => {
                            for k in keys {
                                if let Some(v) = e.props.get(k) {
                                    obj.insert(k.clone(), v.to_json());
                                }
                            }
                        }
                        _ => {
                            for (k, v) in &e.props {
                                obj.insert(k.clone(), v.to_json());
                            }
                        }
                    }
                    Value::Object(obj)
                })
                .collect();
            json!({ "returned": connections.len(), "connections": connections })
        }
        Some(Projection::Count) => json!({ "count": edges.len() }),
        Some(Projection::Sum(keys)) => json!({ "sum": numeric_aggregate(edges.iter().map(|e| &e.props), keys, false) }),
        Some(Projection::Average(keys)) => json!({ "average": numeric_aggregate(edges.iter().map(|e| &e.props), keys, true) }),
    }
}

/// Sum (or average, when `average` is true) the first named key's numeric
/// value across every entity, matching the original's single
/// `op_float_value` scalar result for `Sum`/`Average` responses.
fn numeric_aggregate<'a>(
    props_iter: impl Iterator<Item = &'a HashMap<String, PropertyValue>>,
    keys: &[String],
    average: bool,
) -> f64 {
    let Some(key) = keys.first() else { return 0.0 };
    let mut total = 0.0;
    let mut count = 0usize;
    for props in props_iter {
        if let Some(v) = props.get(key).and_then(|v| v.as_f64()) {
            total += v;
            count += 1;
        }
    }
    if average && count > 0 {
        total / count as f64
    } else {
        total
    }
}
