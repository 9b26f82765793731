//! Node handlers (`AddNode`/`UpdateNode`/`FindNode`), ported from
//! `RSCommand::AddNode`/`UpdateNode`/`QueryNode`
//! (`original_source/src/RSCommand.cc`).

use serde_json::Value;

use crate::error::AppError;
use crate::graph::builder::QueryBuilder;

use super::{obj_or_null, ref_or_allocate, Pending, Staged};

pub fn add_node(builder: &mut QueryBuilder, body: &Value) -> Result<Staged, AppError> {
    let ref_id = ref_or_allocate(builder, body);
    let class = body
        .get("class")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::command("missing_field", "AddNode: 'class' must be a string"))?
        .to_string();
    let props = obj_or_null(body, "properties");
    let constraints = obj_or_null(body, "constraints");
    builder.add_node(ref_id, class, &props, &constraints)?;
    Ok(Staged::one(Pending::None))
}

pub fn update_node(builder: &mut QueryBuilder, body: &Value) -> Result<Staged, AppError> {
    let ref_id = super::command_ref(body).unwrap_or(-1);
    let class = body.get("class").and_then(Value::as_str).map(String::from);
    let props = obj_or_null(body, "properties");
    let remove = obj_or_null(body, "remove_props");
    let constraints = obj_or_null(body, "constraints");
    let unique = body.get("unique").and_then(Value::as_bool).unwrap_or(false);
    builder.update_node(ref_id, class, &props, &remove, &constraints, unique)?;
    Ok(Staged::one(Pending::None))
}

pub fn find_node(builder: &mut QueryBuilder, body: &Value) -> Result<Staged, AppError> {
    let ref_id = ref_or_allocate(builder, body);
    let class = body.get("class").and_then(Value::as_str).map(String::from);
    let link = obj_or_null(body, "link");
    let constraints = obj_or_null(body, "constraints");
    let results = obj_or_null(body, "results");
    let unique = body.get("unique").and_then(Value::as_bool).unwrap_or(false);
    builder.query_node(ref_id, class, &link, &constraints, &results, unique)?;
    Ok(Staged::one(Pending::None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::adapter::run;
    use crate::graph::engine::GraphEngine;
    use serde_json::json;

    #[test]
    fn add_then_find_round_trip() {
        let engine = GraphEngine::new();
        let mut builder = QueryBuilder::new();
        add_node(&mut builder, &json!({"class": "Person", "properties": {"Name": "Bob"}})).unwrap();
        let responses = run(&engine, builder.into_groups());
        assert_eq!(responses[0]["status"], 0);

        let mut builder = QueryBuilder::new();
        find_node(&mut builder, &json!({"class": "Person", "constraints": {"Name": ["==", "Bob"]}, "results": {"list": ["Name"]}})).unwrap();
        let responses = run(&engine, builder.into_groups());
        assert_eq!(responses[0]["returned"], 1);
    }

    #[test]
    fn add_node_requires_class() {
        let mut builder = QueryBuilder::new();
        assert!(add_node(&mut builder, &json!({})).is_err());
    }
}
