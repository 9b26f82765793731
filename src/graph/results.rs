//! Result-projection language parsing.
//!
//! Ported from `PMGDQuery::parse_query_results` / `get_response_type`
//! (`original_source/src/PMGDQuery.cc`): `list`, `count`, `sum`, `average`
//! select what a query returns; `sort` and `limit` are independent
//! modifiers applied after the projection is chosen. The original sets a
//! single protobuf `r_type` field, so when a results object names more than
//! one of `list`/`count`/`sum`/`average` the last one encountered during
//! object iteration wins — we keep that by just overwriting `projection`
//! each time one is seen.

use serde_json::Value;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    List(Vec<String>),
    Count,
    Sum(Vec<String>),
    Average(Vec<String>),
}

#[derive(Debug, Clone, Default)]
pub struct ResultSpec {
    pub projection: Option<Projection>,
    pub sort_key: Option<String>,
    pub sort_descending: bool,
    pub limit: Option<usize>,
}

impl ResultSpec {
    pub fn parse(value: &Value) -> Result<ResultSpec, AppError> {
        let mut spec = ResultSpec::default();
        let Some(obj) = value.as_object() else {
            return Ok(spec);
        };
        for (key, v) in obj {
            match key.as_str() {
                "list" => spec.projection = Some(Projection::List(string_array(v)?)),
                "count" => spec.projection = Some(Projection::Count),
                "sum" => spec.projection = Some(Projection::Sum(string_array(v)?)),
                "average" => spec.projection = Some(Projection::Average(string_array(v)?)),
                "sort" => {
                    if let Some(sort_obj) = v.as_object() {
                        spec.sort_key = sort_obj.get("key").and_then(|k| k.as_str()).map(String::from);
                        spec.sort_descending = sort_obj.get("order").and_then(|o| o.as_str()) == Some("descending");
                    } else if let Some(s) = v.as_str() {
                        spec.sort_key = Some(s.to_string());
                        spec.sort_descending = false;
                    }
                }
                "limit" => spec.limit = v.as_u64().map(|n| n as usize),
                _ => {}
            }
        }
        Ok(spec)
    }
}

fn string_array(v: &Value) -> Result<Vec<String>, AppError> {
    v.as_array()
        .ok_or_else(|| AppError::command("malformed_results", "expected an array of property keys".to_string()))?
        .iter()
        .map(|item| {
            item.as_str()
                .map(String::from)
                .ok_or_else(|| AppError::command("malformed_results", "property key must be a string".to_string()))
        })
        .collect()
}
