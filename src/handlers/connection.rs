//! Edge handlers (`AddEdge`/`UpdateEdge`/`FindEdge`), ported from
//! `RSCommand::AddConnection`/`UpdateConnection`/`QueryConnection`
//! (`original_source/src/RSCommand.cc`).

use serde_json::Value;

use crate::error::AppError;
use crate::graph::builder::QueryBuilder;

use super::{obj_or_null, ref_or_allocate, Pending, Staged};

fn required_ref(body: &Value, key: &str, kind: &str) -> Result<i64, AppError> {
    body.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::command("missing_field", format!("{kind}: '{key}' must be an integer reference")))
}

pub fn add_edge(builder: &mut QueryBuilder, body: &Value) -> Result<Staged, AppError> {
    let ref_id = ref_or_allocate(builder, body);
    let src = required_ref(body, "ref1", "AddEdge")?;
    let dst = required_ref(body, "ref2", "AddEdge")?;
    let class = body
        .get("class")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::command("missing_field", "AddEdge: 'class' must be a string"))?
        .to_string();
    let props = obj_or_null(body, "properties");
    builder.add_edge(ref_id, src, dst, class, &props)?;
    Ok(Staged::one(Pending::None))
}

pub fn update_edge(builder: &mut QueryBuilder, body: &Value) -> Result<Staged, AppError> {
    let ref_id = super::command_ref(body).unwrap_or(-1);
    let src = body.get("ref1").and_then(Value::as_i64).unwrap_or(-1);
    let dst = body.get("ref2").and_then(Value::as_i64).unwrap_or(-1);
    let class = body.get("class").and_then(Value::as_str).map(String::from);
    let props = obj_or_null(body, "properties");
    let remove = obj_or_null(body, "remove_props");
    let constraints = obj_or_null(body, "constraints");
    let unique = body.get("unique").and_then(Value::as_bool).unwrap_or(false);
    builder.update_edge(ref_id, src, dst, class, &props, &remove, &constraints, unique)?;
    Ok(Staged::one(Pending::None))
}

pub fn find_edge(builder: &mut QueryBuilder, body: &Value) -> Result<Staged, AppError> {
    let ref_id = ref_or_allocate(builder, body);
    let src = body.get("ref1").and_then(Value::as_i64).unwrap_or(-1);
    let dst = body.get("ref2").and_then(Value::as_i64).unwrap_or(-1);
    let class = body.get("class").and_then(Value::as_str).map(String::from);
    let constraints = obj_or_null(body, "constraints");
    let results = obj_or_null(body, "results");
    let unique = body.get("unique").and_then(Value::as_bool).unwrap_or(false);
    builder.query_edge(ref_id, src, dst, class, &constraints, &results, unique)?;
    Ok(Staged::one(Pending::None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::adapter::run;
    use crate::graph::engine::GraphEngine;
    use crate::handlers::entity::add_node;
    use serde_json::json;

    #[test]
    fn add_edge_links_two_new_nodes_in_one_transaction() {
        let engine = GraphEngine::new();
        let mut builder = QueryBuilder::new();
        add_node(&mut builder, &json!({"_ref": 1, "class": "Person", "properties": {"Name": "A"}})).unwrap();
        add_node(&mut builder, &json!({"_ref": 2, "class": "Person", "properties": {"Name": "B"}})).unwrap();
        add_edge(&mut builder, &json!({"ref1": 1, "ref2": 2, "class": "knows"})).unwrap();
        let responses = run(&engine, builder.into_groups());
        assert_eq!(responses[2]["status"], 0);
        assert!(responses[2]["EdgeID"].is_u64());
    }

    #[test]
    fn add_edge_requires_both_refs() {
        let mut builder = QueryBuilder::new();
        assert!(add_edge(&mut builder, &json!({"ref1": 1, "class": "knows"})).is_err());
    }
}
