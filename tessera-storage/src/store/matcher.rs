//! Filter evaluation, projection, sorting and modifier application over
//! in-memory documents.

use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;

use tessera_core::{is_operator_key, Document, FilterOperator, SortDirection, SortKey};

/// Error text for a filter or modifier the matcher cannot evaluate.
pub type MatchError = String;

/// Resolve a dotted path inside a document.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Evaluate a filter document against a document.
pub fn matches(doc: &Document, filter: &Document) -> Result<bool, MatchError> {
    for (key, condition) in filter {
        let ok = if is_operator_key(key) {
            matches_logical(doc, key, condition)?
        } else {
            matches_condition(lookup(doc, key), condition)?
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_logical(doc: &Document, key: &str, condition: &Value) -> Result<bool, MatchError> {
    let op = FilterOperator::from_token(key).ok_or_else(|| format!("unknown operator {key}"))?;
    match op {
        FilterOperator::And | FilterOperator::Or => {
            let clauses = condition
                .as_array()
                .ok_or_else(|| format!("{key} expects an array of filters"))?;
            let mut results = Vec::with_capacity(clauses.len());
            for clause in clauses {
                let clause = clause
                    .as_object()
                    .ok_or_else(|| format!("{key} clauses must be documents"))?;
                results.push(matches(doc, clause)?);
            }
            Ok(if op == FilterOperator::And {
                results.iter().all(|r| *r)
            } else {
                results.iter().any(|r| *r)
            })
        }
        FilterOperator::Not => {
            let inner = condition
                .as_object()
                .ok_or_else(|| "$not expects a document".to_string())?;
            Ok(!matches(doc, inner)?)
        }
        _ => Err(format!("{key} is not valid at the top level")),
    }
}

fn is_operator_document(condition: &Value) -> Option<&Document> {
    condition
        .as_object()
        .filter(|map| !map.is_empty() && map.keys().all(|k| is_operator_key(k)))
}

fn matches_condition(value: Option<&Value>, condition: &Value) -> Result<bool, MatchError> {
    let Some(ops) = is_operator_document(condition) else {
        return Ok(equals(value, condition));
    };
    for (token, operand) in ops {
        let op = FilterOperator::from_token(token)
            .ok_or_else(|| format!("unknown operator {token}"))?;
        let ok = match op {
            FilterOperator::Eq => equals(value, operand),
            FilterOperator::Ne => !equals(value, operand),
            FilterOperator::Gt => compare_any(value, operand, |o| o == Ordering::Greater),
            FilterOperator::Gte => compare_any(value, operand, |o| o != Ordering::Less),
            FilterOperator::Lt => compare_any(value, operand, |o| o == Ordering::Less),
            FilterOperator::Lte => compare_any(value, operand, |o| o != Ordering::Greater),
            FilterOperator::In => in_list(value, operand, token)?,
            FilterOperator::Nin => !in_list(value, operand, token)?,
            FilterOperator::Exists => {
                let wanted = operand
                    .as_bool()
                    .ok_or_else(|| "$exists expects a boolean".to_string())?;
                value.is_some() == wanted
            }
            FilterOperator::Regex => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| "$regex expects a string".to_string())?;
                let re = Regex::new(pattern).map_err(|e| format!("bad $regex: {e}"))?;
                value
                    .and_then(Value::as_str)
                    .map(|s| re.is_match(s))
                    .unwrap_or(false)
            }
            FilterOperator::Not => !matches_condition(value, operand)?,
            FilterOperator::And | FilterOperator::Or => {
                return Err(format!("{token} is only valid at the top level"))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(value: Option<&Value>, operand: &Value, token: &str) -> Result<bool, MatchError> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| format!("{token} expects an array"))?;
    Ok(candidates.iter().any(|c| equals(value, c)))
}

/// Equality with array-membership semantics; missing equals null.
fn equals(value: Option<&Value>, target: &Value) -> bool {
    match value {
        None => target.is_null(),
        Some(v) => {
            values_equal(v, target)
                || matches!(v, Value::Array(items) if items.iter().any(|i| values_equal(i, target)))
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_any(value: Option<&Value>, operand: &Value, pred: impl Fn(Ordering) -> bool) -> bool {
    match value {
        None => false,
        Some(Value::Array(items)) => items
            .iter()
            .any(|i| compare_same_type(i, operand).map(&pred).unwrap_or(false)),
        Some(v) => compare_same_type(v, operand).map(pred).unwrap_or(false),
    }
}

fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used for sorting: type rank first, then value.
pub fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(x), Some(y)) => compare_same_type(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Stable multi-key sort.
pub fn sort_documents(docs: &mut [Document], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for key in keys {
            let ord = compare_for_sort(lookup(a, &key.field), lookup(b, &key.field));
            let ord = match key.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

/// Apply a projection. Inclusion mode keeps `always` fields unless excluded explicitly.
pub fn project(doc: &Document, select: &Document, always: &[&str]) -> Document {
    if select.is_empty() {
        return doc.clone();
    }
    let inclusive = select.values().any(is_truthy);
    if inclusive {
        let mut out = Document::new();
        for (field, value) in doc {
            let explicit = select.get(field);
            let keep = match explicit {
                Some(flag) => is_truthy(flag),
                None => always.contains(&field.as_str()),
            };
            if keep {
                out.insert(field.clone(), value.clone());
            }
        }
        out
    } else {
        let mut out = doc.clone();
        for (field, flag) in select {
            if !is_truthy(flag) {
                out.remove(field);
            }
        }
        out
    }
}

fn set_path(doc: &mut Document, path: &str, value: Value) -> Result<(), MatchError> {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            match child {
                Value::Object(map) => set_path(map, rest, value),
                _ => Err(format!("cannot set {path}: {head} is not a document")),
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(map)) = doc.get_mut(head) {
                remove_path(map, rest);
            }
        }
    }
}

/// Apply an update modifier in place. Returns whether the document changed.
pub fn apply_modifier(doc: &mut Document, modifier: &Document) -> Result<bool, MatchError> {
    let before = doc.clone();
    for (op, fields) in modifier {
        let fields = fields
            .as_object()
            .ok_or_else(|| format!("{op} expects a document of fields"))?;
        for (path, operand) in fields {
            match op.as_str() {
                "$set" => set_path(doc, path, operand.clone())?,
                "$unset" => remove_path(doc, path),
                "$inc" => {
                    let delta = operand
                        .as_f64()
                        .ok_or_else(|| format!("$inc on {path} expects a number"))?;
                    let next = match lookup(doc, path) {
                        None | Some(Value::Null) => operand.clone(),
                        Some(Value::Number(current)) => {
                            match (current.as_i64(), operand.as_i64()) {
                                (Some(c), Some(d)) => Value::from(c.saturating_add(d)),
                                _ => Value::from(current.as_f64().unwrap_or(0.0) + delta),
                            }
                        }
                        Some(other) => {
                            return Err(format!("$inc on {path}: {other} is not a number"))
                        }
                    };
                    set_path(doc, path, next)?;
                }
                "$push" => {
                    let next = match lookup(doc, path) {
                        None | Some(Value::Null) => Value::Array(vec![operand.clone()]),
                        Some(Value::Array(items)) => {
                            let mut items = items.clone();
                            items.push(operand.clone());
                            Value::Array(items)
                        }
                        Some(other) => {
                            return Err(format!("$push on {path}: {other} is not an array"))
                        }
                    };
                    set_path(doc, path, next)?;
                }
                other => return Err(format!("unsupported modifier {other}")),
            }
        }
    }
    Ok(*doc != before)
}
