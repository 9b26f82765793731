//! Constraint-language parsing and evaluation.
//!
//! Ported from `PMGDQuery::parse_query_constraints`
//! (`original_source/src/PMGDQuery.cc`): each constraint is keyed by a
//! property name and carries either a 2-element `[op, value]` predicate, a
//! 2-element predicate whose value is itself an array (which turns the
//! *whole* constraint group into an OR over one predicate per array
//! element), or a 4-element `[op1, v1, op2, v2]` range predicate.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use crate::error::AppError;
use crate::model::PropertyValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    GtLt,
    GeLt,
    GtLe,
    GeLe,
}

impl Op {
    fn from_str(s: &str) -> Option<Op> {
        match s {
            ">" => Some(Op::Gt),
            ">=" => Some(Op::Ge),
            "<" => Some(Op::Lt),
            "<=" => Some(Op::Le),
            "==" => Some(Op::Eq),
            "!=" => Some(Op::Ne),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Predicate {
    pub key: String,
    pub op: Op,
    pub v1: PropertyValue,
    pub v2: Option<PropertyValue>,
}

impl Predicate {
    pub fn matches(&self, value: Option<&PropertyValue>) -> bool {
        let Some(value) = value else { return false };
        match self.op {
            Op::Gt => value.partial_cmp(&self.v1) == Some(Ordering::Greater),
            Op::Ge => matches!(value.partial_cmp(&self.v1), Some(Ordering::Greater) | Some(Ordering::Equal)),
            Op::Lt => value.partial_cmp(&self.v1) == Some(Ordering::Less),
            Op::Le => matches!(value.partial_cmp(&self.v1), Some(Ordering::Less) | Some(Ordering::Equal)),
            Op::Eq => value == &self.v1,
            Op::Ne => value != &self.v1,
            Op::GtLt => self.in_range(value, false, false),
            Op::GeLt => self.in_range(value, true, false),
            Op::GtLe => self.in_range(value, false, true),
            Op::GeLe => self.in_range(value, true, true),
        }
    }

    fn in_range(&self, value: &PropertyValue, lower_inclusive: bool, upper_inclusive: bool) -> bool {
        let v2 = self.v2.as_ref().expect("range predicate always carries v2");
        let lower_ok = match value.partial_cmp(&self.v1) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => lower_inclusive,
            _ => false,
        };
        let upper_ok = match value.partial_cmp(v2) {
            Some(Ordering::Less) => true,
            Some(Ordering::Equal) => upper_inclusive,
            _ => false,
        };
        lower_ok && upper_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// A set of predicates combined with a single boolean operator. The
/// two-element-array-value form (`{"key": [">", [1, 2, 3]]}`) is the only
/// way the wire format expresses OR; every other form is an implicit AND,
/// matching the original's `qc->set_p_op(And)` default.
#[derive(Debug, Clone, Default)]
pub struct ConstraintGroup {
    pub op: Option<BoolOp>,
    pub predicates: Vec<Predicate>,
}

impl ConstraintGroup {
    pub fn matches(&self, props: &HashMap<String, PropertyValue>) -> bool {
        if self.predicates.is_empty() {
            return true;
        }
        match self.op.unwrap_or(BoolOp::And) {
            BoolOp::And => self.predicates.iter().all(|p| p.matches(props.get(&p.key))),
            BoolOp::Or => self.predicates.iter().any(|p| p.matches(props.get(&p.key))),
        }
    }

    pub fn parse(value: &Value) -> Result<ConstraintGroup, AppError> {
        let mut group = ConstraintGroup::default();
        let Some(obj) = value.as_object() else {
            return Ok(group);
        };
        for (key, predicate) in obj {
            let arr = predicate
                .as_array()
                .ok_or_else(|| AppError::command("malformed_constraints", format!("constraint for '{key}' must be an array")))?;
            match arr.len() {
                2 if arr[1].is_array() => {
                    group.op = Some(BoolOp::Or);
                    let op = op_from_value(&arr[0])?;
                    for value in arr[1].as_array().unwrap() {
                        let v1 = PropertyValue::from_json(value).map_err(|e| AppError::command("bad_property_value", e))?;
                        group.predicates.push(Predicate { key: key.clone(), op, v1, v2: None });
                    }
                }
                2 => {
                    let op = op_from_value(&arr[0])?;
                    let v1 = PropertyValue::from_json(&arr[1]).map_err(|e| AppError::command("bad_property_value", e))?;
                    group.predicates.push(Predicate { key: key.clone(), op, v1, v2: None });
                }
                4 => {
                    let pred1 = arr[0].as_str().unwrap_or_default();
                    let pred2 = arr[2].as_str().unwrap_or_default();
                    let op = match (pred1, pred2) {
                        (">", "<") => Op::GtLt,
                        (">=", "<") => Op::GeLt,
                        (">", "<=") => Op::GtLe,
                        (">=", "<=") => Op::GeLe,
                        _ => {
                            return Err(AppError::command(
                                "malformed_constraints",
                                format!("unsupported range operator pair ({pred1}, {pred2})"),
                            ))
                        }
                    };
                    let v1 = PropertyValue::from_json(&arr[1]).map_err(|e| AppError::command("bad_property_value", e))?;
                    let v2 = PropertyValue::from_json(&arr[3]).map_err(|e| AppError::command("bad_property_value", e))?;
                    group.predicates.push(Predicate { key: key.clone(), op, v1, v2: Some(v2) });
                }
                n => {
                    return Err(AppError::command(
                        "malformed_constraints",
                        format!("constraint for '{key}' has {n} elements, expected 2 or 4"),
                    ))
                }
            }
        }
        Ok(group)
    }
}

fn op_from_value(value: &Value) -> Result<Op, AppError> {
    let s = value
        .as_str()
        .ok_or_else(|| AppError::command("malformed_constraints", "operator must be a string".to_string()))?;
    Op::from_str(s).ok_or_else(|| AppError::command("malformed_constraints", format!("unknown operator '{s}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, PropertyValue)]) -> HashMap<String, PropertyValue> {
        pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn simple_equality() {
        let cg = ConstraintGroup::parse(&serde_json::json!({"Name": ["==", "Bob"]})).unwrap();
        assert!(cg.matches(&props(&[("Name", PropertyValue::String("Bob".into()))])));
        assert!(!cg.matches(&props(&[("Name", PropertyValue::String("Alice".into()))])));
    }

    #[test]
    fn range_predicate() {
        let cg = ConstraintGroup::parse(&serde_json::json!({"Age": [">=", 18, "<", 65]})).unwrap();
        assert!(cg.matches(&props(&[("Age", PropertyValue::Int(18))])));
        assert!(!cg.matches(&props(&[("Age", PropertyValue::Int(65))])));
        assert!(!cg.matches(&props(&[("Age", PropertyValue::Int(17))])));
    }

    #[test]
    fn or_expansion_over_array_value() {
        let cg = ConstraintGroup::parse(&serde_json::json!({"Color": ["==", ["red", "blue"]]})).unwrap();
        assert!(cg.matches(&props(&[("Color", PropertyValue::String("blue".into()))])));
        assert!(!cg.matches(&props(&[("Color", PropertyValue::String("green".into()))])));
    }

    #[test]
    fn rejects_bad_arity() {
        let err = ConstraintGroup::parse(&serde_json::json!({"Age": [">=", 18, "<"]}));
        assert!(err.is_err());
    }
}
