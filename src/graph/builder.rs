//! Query-group builder, ported from `PMGDQuery`
//! (`original_source/src/PMGDQuery.{h,cc}`).
//!
//! A `QueryBuilder` accumulates one group per JSON command in an envelope's
//! command list, exactly as `PMGDQuery::_cmds` accumulates one protobuf
//! command per call to `AddNode`/`QueryNode`/etc. `_current_ref` starts at
//! `REFERENCE_RANGE_START` so references the client supplies (small
//! integers named in the command list) never collide with references the
//! server allocates internally for constraint-driven updates that didn't
//! name one.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::AppError;
use crate::model::PropertyValue;

use super::constraints::ConstraintGroup;
use super::results::ResultSpec;

pub const REFERENCE_RANGE_START: i64 = 20000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    Any,
    Out,
    In,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub ref_id: i64,
    pub direction: LinkDirection,
    pub unique: bool,
    pub tag: Option<String>,
}

#[derive(Debug, Clone)]
pub enum GraphOp {
    AddNode {
        ref_id: i64,
        tag: String,
        props: HashMap<String, PropertyValue>,
        constraints: Option<ConstraintGroup>,
    },
    UpdateNode {
        ref_id: i64,
        tag: Option<String>,
        set: HashMap<String, PropertyValue>,
        remove: Vec<String>,
        constraints: Option<ConstraintGroup>,
        unique: bool,
    },
    AddEdge {
        ref_id: i64,
        src: i64,
        dst: i64,
        tag: String,
        props: HashMap<String, PropertyValue>,
    },
    UpdateEdge {
        ref_id: i64,
        src: i64,
        dst: i64,
        tag: Option<String>,
        set: HashMap<String, PropertyValue>,
        remove: Vec<String>,
        constraints: Option<ConstraintGroup>,
        unique: bool,
    },
    QueryNode {
        ref_id: i64,
        tag: Option<String>,
        link: Option<Link>,
        constraints: Option<ConstraintGroup>,
        results: ResultSpec,
        unique: bool,
    },
    QueryEdge {
        ref_id: i64,
        src: i64,
        dst: i64,
        tag: Option<String>,
        constraints: Option<ConstraintGroup>,
        results: ResultSpec,
        unique: bool,
    },
}

/// One command-list's worth of staged graph operations, one group per
/// JSON command so results can be matched back up positionally.
pub struct QueryBuilder {
    current_ref: i64,
    groups: Vec<GraphOp>,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder { current_ref: REFERENCE_RANGE_START, groups: Vec::new() }
    }

    pub fn get_available_reference(&mut self) -> i64 {
        let r = self.current_ref;
        self.current_ref += 1;
        r
    }

    pub fn into_groups(self) -> Vec<GraphOp> {
        self.groups
    }

    pub fn add_node(&mut self, ref_id: i64, tag: String, props: &Value, constraints: &Value) -> Result<(), AppError> {
        let props = parse_props(props)?;
        let constraints = parse_optional_constraints(constraints)?;
        self.groups.push(GraphOp::AddNode { ref_id, tag, props, constraints });
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_node(
        &mut self,
        ref_id: i64,
        tag: Option<String>,
        props: &Value,
        remove_props: &Value,
        constraints: &Value,
        unique: bool,
    ) -> Result<(), AppError> {
        let set = parse_props(props)?;
        let remove = parse_string_array(remove_props)?;
        let constraints = parse_optional_constraints(constraints)?;
        let ref_id = if ref_id < 0 { self.get_available_reference() } else { ref_id };
        self.groups.push(GraphOp::UpdateNode { ref_id, tag, set, remove, constraints, unique });
        Ok(())
    }

    pub fn add_edge(&mut self, ref_id: i64, src: i64, dst: i64, tag: String, props: &Value) -> Result<(), AppError> {
        let props = parse_props(props)?;
        self.groups.push(GraphOp::AddEdge { ref_id, src, dst, tag, props });
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_edge(
        &mut self,
        ref_id: i64,
        src: i64,
        dst: i64,
        tag: Option<String>,
        props: &Value,
        remove_props: &Value,
        constraints: &Value,
        unique: bool,
    ) -> Result<(), AppError> {
        let set = parse_props(props)?;
        let remove = parse_string_array(remove_props)?;
        let constraints = parse_optional_constraints(constraints)?;
        let ref_id = if ref_id < 0 { self.get_available_reference() } else { ref_id };
        self.groups.push(GraphOp::UpdateEdge { ref_id, src, dst, tag, set, remove, constraints, unique });
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn query_node(
        &mut self,
        ref_id: i64,
        tag: Option<String>,
        link: &Value,
        constraints: &Value,
        results: &Value,
        unique: bool,
    ) -> Result<(), AppError> {
        let link = parse_optional_link(link)?;
        let constraints = parse_optional_constraints(constraints)?;
        let results = if results.is_null() { ResultSpec::default() } else { ResultSpec::parse(results)? };
        self.groups.push(GraphOp::QueryNode { ref_id, tag, link, constraints, results, unique });
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn query_edge(
        &mut self,
        ref_id: i64,
        src: i64,
        dst: i64,
        tag: Option<String>,
        constraints: &Value,
        results: &Value,
        unique: bool,
    ) -> Result<(), AppError> {
        let constraints = parse_optional_constraints(constraints)?;
        let results = if results.is_null() { ResultSpec::default() } else { ResultSpec::parse(results)? };
        self.groups.push(GraphOp::QueryEdge { ref_id, src, dst, tag, constraints, results, unique });
        Ok(())
    }
}

fn parse_props(value: &Value) -> Result<HashMap<String, PropertyValue>, AppError> {
    let mut out = HashMap::new();
    if value.is_null() {
        return Ok(out);
    }
    let obj = value
        .as_object()
        .ok_or_else(|| AppError::command("malformed_properties", "properties must be an object".to_string()))?;
    for (k, v) in obj {
        let pv = PropertyValue::from_json(v).map_err(|e| AppError::command("bad_property_value", e))?;
        out.insert(k.clone(), pv);
    }
    Ok(out)
}

fn parse_string_array(value: &Value) -> Result<Vec<String>, AppError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    value
        .as_array()
        .ok_or_else(|| AppError::command("malformed_properties", "remove_props must be an array".to_string()))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| AppError::command("malformed_properties", "remove_props entries must be strings".to_string()))
        })
        .collect()
}

fn parse_optional_constraints(value: &Value) -> Result<Option<ConstraintGroup>, AppError> {
    if value.is_null() {
        Ok(None)
    } else {
        Ok(Some(ConstraintGroup::parse(value)?))
    }
}

fn parse_optional_link(value: &Value) -> Result<Option<Link>, AppError> {
    if value.is_null() {
        return Ok(None);
    }
    let ref_id = value
        .get("ref")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| AppError::command("malformed_link", "link requires an integer 'ref'".to_string()))?;
    let direction = match value.get("direction").and_then(|v| v.as_str()) {
        Some("out") => LinkDirection::Out,
        Some("in") => LinkDirection::In,
        _ => LinkDirection::Any,
    };
    let unique = value.get("unique").and_then(|v| v.as_bool()).unwrap_or(false);
    let tag = value.get("class").and_then(|v| v.as_str()).map(String::from);
    Ok(Some(Link { ref_id, direction, unique, tag }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_allocation_starts_at_range_start() {
        let mut b = QueryBuilder::new();
        assert_eq!(b.get_available_reference(), REFERENCE_RANGE_START);
        assert_eq!(b.get_available_reference(), REFERENCE_RANGE_START + 1);
    }

    #[test]
    fn add_node_stages_one_group() {
        let mut b = QueryBuilder::new();
        b.add_node(1, "Person".into(), &serde_json::json!({"Name": "Bob"}), &Value::Null).unwrap();
        assert_eq!(b.into_groups().len(), 1);
    }

    #[test]
    fn negative_ref_on_update_is_auto_allocated() {
        let mut b = QueryBuilder::new();
        b.update_node(-1, Some("Person".into()), &Value::Null, &Value::Null, &serde_json::json!({"Name": ["==", "Bob"]}), true).unwrap();
        match &b.into_groups()[0] {
            GraphOp::UpdateNode { ref_id, .. } => assert_eq!(*ref_id, REFERENCE_RANGE_START),
            _ => panic!("expected UpdateNode"),
        }
    }
}
