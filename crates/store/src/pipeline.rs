//! Aggregation pipelines.
//!
//! The gateway hands client pipelines to the store untouched. Shape checking
//! happens here, inside the store layer: a pipeline must be a JSON array of
//! objects. Beyond that, [`MongoStore`](crate::MongoStore) leaves stage
//! validation to the server while [`InMemoryStore`](crate::InMemoryStore)
//! evaluates the subset implemented by [`evaluate`]:
//!
//! | Stage | Supported form |
//! |-------|----------------|
//! | `$match` | field equality, `$eq` `$ne` `$gt` `$gte` `$lt` `$lte` `$in` `$nin` `$exists`, `$and` `$or`, dotted paths |
//! | `$sort` | `{field: 1 \| -1, ...}` |
//! | `$skip` / `$limit` | non-negative / positive integers |
//! | `$project` | top-level inclusion or exclusion with `0/1/true/false` |
//! | `$count` | `"<field>"` |

use crate::document::{bson_from_json, ID_FIELD};
use crate::error::{StoreError, StoreResult};
use bson::{Bson, Document};
use serde_json::Value;
use std::cmp::Ordering;

/// Split a client pipeline into BSON stage documents.
pub fn stages_from_json(pipeline: Value) -> StoreResult<Vec<Document>> {
    let Value::Array(items) = pipeline else {
        return Err(StoreError::invalid_pipeline(format!(
            "expected an array of stages, got {}",
            json_kind(&pipeline)
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| match bson_from_json(item)? {
            Bson::Document(stage) => Ok(stage),
            other => Err(StoreError::invalid_pipeline(format!(
                "stage {position} must be an object, got {:?}",
                other.element_type()
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A single stage understood by the in-memory evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Document),
    Sort(Vec<(String, SortOrder)>),
    Skip(u64),
    Limit(u64),
    Project(Projection),
    Count(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    fields: Vec<String>,
    include: bool,
    keep_id: bool,
}

impl Stage {
    /// Interpret a stage document.
    pub fn parse(stage: &Document) -> StoreResult<Self> {
        if stage.len() != 1 {
            return Err(StoreError::invalid_pipeline(format!(
                "a pipeline stage must have exactly one field, found {}",
                stage.len()
            )));
        }
        let Some((name, spec)) = stage.iter().next() else {
            return Err(StoreError::invalid_pipeline("empty stage"));
        };

        match name.as_str() {
            "$match" => match spec {
                Bson::Document(filter) => Ok(Stage::Match(filter.clone())),
                _ => Err(StoreError::invalid_pipeline("$match requires an object")),
            },
            "$sort" => parse_sort(spec),
            "$skip" => Ok(Stage::Skip(non_negative(spec, "$skip")?)),
            "$limit" => match non_negative(spec, "$limit")? {
                0 => Err(StoreError::invalid_pipeline("$limit must be positive")),
                n => Ok(Stage::Limit(n)),
            },
            "$project" => parse_projection(spec),
            "$count" => match spec {
                Bson::String(field)
                    if !field.is_empty() && !field.starts_with('$') && !field.contains('.') =>
                {
                    Ok(Stage::Count(field.clone()))
                }
                _ => Err(StoreError::invalid_pipeline(
                    "$count requires a non-empty field name without '$' or '.'",
                )),
            },
            other if other.starts_with('$') => Err(StoreError::UnsupportedStage(other.to_string())),
            other => Err(StoreError::invalid_pipeline(format!(
                "unrecognized pipeline stage name `{other}`"
            ))),
        }
    }
}

fn parse_sort(spec: &Bson) -> StoreResult<Stage> {
    let Bson::Document(keys) = spec else {
        return Err(StoreError::invalid_pipeline("$sort requires an object"));
    };
    if keys.is_empty() {
        return Err(StoreError::invalid_pipeline("$sort requires at least one key"));
    }
    keys.iter()
        .map(|(field, direction)| {
            let order = match as_i64(direction) {
                Some(1) => SortOrder::Ascending,
                Some(-1) => SortOrder::Descending,
                _ => {
                    return Err(StoreError::invalid_pipeline(format!(
                        "$sort key `{field}` must be 1 or -1"
                    )))
                }
            };
            Ok((field.clone(), order))
        })
        .collect::<StoreResult<Vec<_>>>()
        .map(Stage::Sort)
}

fn parse_projection(spec: &Bson) -> StoreResult<Stage> {
    let Bson::Document(fields) = spec else {
        return Err(StoreError::invalid_pipeline("$project requires an object"));
    };
    if fields.is_empty() {
        return Err(StoreError::invalid_pipeline(
            "$project requires at least one output field",
        ));
    }

    let mut keep_id = true;
    let mut mode: Option<bool> = None;
    let mut listed = Vec::new();
    for (field, flag) in fields {
        let include = match flag {
            Bson::Boolean(b) => *b,
            other => match as_i64(other) {
                Some(0) => false,
                Some(_) => true,
                None => {
                    return Err(StoreError::UnsupportedStage(format!(
                        "$project expression for `{field}`"
                    )))
                }
            },
        };
        if field == ID_FIELD {
            keep_id = include;
            continue;
        }
        match mode {
            Some(existing) if existing != include => {
                return Err(StoreError::invalid_pipeline(
                    "$project cannot mix inclusion and exclusion",
                ))
            }
            _ => mode = Some(include),
        }
        listed.push(field.clone());
    }

    Ok(Stage::Project(Projection {
        fields: listed,
        // only `_id` listed: `{_id: 0}` is an exclusion, `{_id: 1}` keeps just the id
        include: mode.unwrap_or(keep_id),
        keep_id,
    }))
}

fn non_negative(spec: &Bson, stage: &str) -> StoreResult<u64> {
    match as_i64(spec) {
        Some(n) if n >= 0 => Ok(n as u64),
        _ => Err(StoreError::invalid_pipeline(format!(
            "{stage} requires a non-negative integer"
        ))),
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.fract() == 0.0 => Some(*f as i64),
        _ => None,
    }
}

/// Run `stages` over `docs` in order.
pub fn evaluate(docs: Vec<Document>, stages: &[Document]) -> StoreResult<Vec<Document>> {
    let parsed = stages
        .iter()
        .map(Stage::parse)
        .collect::<StoreResult<Vec<_>>>()?;

    parsed.iter().try_fold(docs, |docs, stage| apply(docs, stage))
}

fn apply(docs: Vec<Document>, stage: &Stage) -> StoreResult<Vec<Document>> {
    match stage {
        Stage::Match(filter) => {
            let mut kept = Vec::with_capacity(docs.len());
            for doc in docs {
                if matches_filter(&doc, filter)? {
                    kept.push(doc);
                }
            }
            Ok(kept)
        }
        Stage::Sort(keys) => {
            let mut docs = docs;
            docs.sort_by(|a, b| {
                for (field, order) in keys {
                    let ord = sort_cmp(lookup(a, field), lookup(b, field));
                    let ord = match order {
                        SortOrder::Ascending => ord,
                        SortOrder::Descending => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
            Ok(docs)
        }
        Stage::Skip(n) => Ok(docs.into_iter().skip(*n as usize).collect()),
        Stage::Limit(n) => Ok(docs.into_iter().take(*n as usize).collect()),
        Stage::Project(projection) => Ok(docs.into_iter().map(|d| project(d, projection)).collect()),
        Stage::Count(field) => {
            if docs.is_empty() {
                return Ok(Vec::new());
            }
            let mut out = Document::new();
            match i32::try_from(docs.len()) {
                Ok(n) => out.insert(field.clone(), n),
                Err(_) => out.insert(field.clone(), docs.len() as i64),
            };
            Ok(vec![out])
        }
    }
}

fn project(doc: Document, projection: &Projection) -> Document {
    if projection.include {
        let mut out = Document::new();
        for (key, value) in doc {
            let listed = projection.fields.iter().any(|f| f == &key);
            if listed || (key == ID_FIELD && projection.keep_id) {
                out.insert(key, value);
            }
        }
        out
    } else {
        doc.into_iter()
            .filter(|(key, _)| {
                if key == ID_FIELD {
                    projection.keep_id
                } else {
                    !projection.fields.iter().any(|f| f == key)
                }
            })
            .collect()
    }
}

/// Resolve a dotted path through nested documents.
fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut current = doc;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        let value = current.get(part)?;
        if parts.peek().is_none() {
            return Some(value);
        }
        match value {
            Bson::Document(inner) => current = inner,
            _ => return None,
        }
    }
    None
}

fn matches_filter(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => logical(doc, condition, "$and")?.iter().all(|m| *m),
            "$or" => logical(doc, condition, "$or")?.iter().any(|m| *m),
            op if op.starts_with('$') => {
                return Err(StoreError::UnsupportedStage(format!("$match operator {op}")))
            }
            path => matches_condition(lookup(doc, path), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn logical(doc: &Document, clauses: &Bson, op: &str) -> StoreResult<Vec<bool>> {
    let Bson::Array(clauses) = clauses else {
        return Err(StoreError::invalid_pipeline(format!("{op} requires an array")));
    };
    if clauses.is_empty() {
        return Err(StoreError::invalid_pipeline(format!(
            "{op} requires a non-empty array"
        )));
    }
    clauses
        .iter()
        .map(|clause| match clause {
            Bson::Document(sub) => matches_filter(doc, sub),
            _ => Err(StoreError::invalid_pipeline(format!(
                "{op} entries must be objects"
            ))),
        })
        .collect()
}

fn is_operator_doc(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
            Some(ops)
        }
        _ => None,
    }
}

fn matches_condition(field: Option<&Bson>, condition: &Bson) -> StoreResult<bool> {
    let Some(ops) = is_operator_doc(condition) else {
        return Ok(equals(field, condition));
    };

    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(field, operand),
            "$ne" => !equals(field, operand),
            "$gt" => compares(field, operand, |o| o == Ordering::Greater),
            "$gte" => compares(field, operand, |o| o != Ordering::Less),
            "$lt" => compares(field, operand, |o| o == Ordering::Less),
            "$lte" => compares(field, operand, |o| o != Ordering::Greater),
            "$in" => in_list(field, operand, op)?,
            "$nin" => !in_list(field, operand, op)?,
            "$exists" => {
                let want = match operand {
                    Bson::Boolean(b) => *b,
                    other => as_i64(other).map(|n| n != 0).unwrap_or(true),
                };
                field.is_some() == want
            }
            other => {
                return Err(StoreError::UnsupportedStage(format!(
                    "$match operator {other}"
                )))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(field: Option<&Bson>, operand: &Bson, op: &str) -> StoreResult<bool> {
    let Bson::Array(candidates) = operand else {
        return Err(StoreError::invalid_pipeline(format!("{op} needs an array")));
    };
    Ok(candidates.iter().any(|c| equals(field, c)))
}

/// Equality with array membership: `{tags: "x"}` matches `tags: ["x", "y"]`.
fn equals(field: Option<&Bson>, expected: &Bson) -> bool {
    match field {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| value_eq(item, expected))
        }
        Some(value) => value_eq(value, expected),
    }
}

fn compares(field: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match field {
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| same_type_cmp(item, operand).is_some_and(&accept)),
        Some(value) => same_type_cmp(value, operand).is_some_and(accept),
        None => false,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

fn value_eq(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Ordering between values of the same type class, `None` across classes.
fn same_type_cmp(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Rank used to order values of different types when sorting.
fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => 0,
        Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) => 1,
        Some(Bson::String(_)) | Some(Bson::Symbol(_)) => 2,
        Some(Bson::Document(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::Binary(_)) => 5,
        Some(Bson::ObjectId(_)) => 6,
        Some(Bson::Boolean(_)) => 7,
        Some(Bson::DateTime(_)) => 8,
        Some(Bson::Timestamp(_)) => 9,
        Some(_) => 10,
    }
}

fn sort_cmp(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    type_rank(a).cmp(&type_rank(b)).then_with(|| match (a, b) {
        (Some(x), Some(y)) => same_type_cmp(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    fn library() -> Vec<Document> {
        vec![
            doc! { "_id": 1, "title": "Dune", "year": 1965, "tags": ["scifi", "classic"], "meta": { "pages": 412 } },
            doc! { "_id": 2, "title": "Emma", "year": 1815, "tags": ["romance"], "meta": { "pages": 474 } },
            doc! { "_id": 3, "title": "Neuromancer", "year": 1984, "tags": ["scifi"], "meta": { "pages": 271 } },
            doc! { "_id": 4, "title": "Ulysses", "year": 1922.0 },
        ]
    }

    fn run(pipeline: Value) -> StoreResult<Vec<Document>> {
        let stages = stages_from_json(pipeline)?;
        evaluate(library(), &stages)
    }

    fn ids(docs: &[Document]) -> Vec<i32> {
        docs.iter().map(|d| d.get_i32("_id").unwrap()).collect()
    }

    #[test]
    fn empty_pipeline_returns_everything() {
        assert_eq!(run(json!([])).unwrap(), library());
    }

    #[test]
    fn non_array_pipeline_is_rejected() {
        let err = stages_from_json(json!({ "$match": {} })).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPipeline(_)));
        assert!(err.to_string().contains("object"));
    }

    #[test]
    fn non_object_stage_is_rejected() {
        assert!(matches!(
            stages_from_json(json!([{ "$limit": 1 }, 5])),
            Err(StoreError::InvalidPipeline(_))
        ));
    }

    #[test]
    fn stage_with_two_operators_is_rejected() {
        assert!(matches!(
            run(json!([{ "$limit": 1, "$skip": 1 }])),
            Err(StoreError::InvalidPipeline(_))
        ));
    }

    #[test]
    fn unknown_stage_is_unsupported() {
        assert!(matches!(
            run(json!([{ "$lookup": { "from": "authors" } }])),
            Err(StoreError::UnsupportedStage(name)) if name == "$lookup"
        ));
    }

    #[test]
    fn match_equality_and_array_membership() {
        assert_eq!(ids(&run(json!([{ "$match": { "title": "Emma" } }])).unwrap()), vec![2]);
        assert_eq!(ids(&run(json!([{ "$match": { "tags": "scifi" } }])).unwrap()), vec![1, 3]);
    }

    #[test]
    fn match_numeric_comparison_across_int_and_double() {
        let docs = run(json!([{ "$match": { "year": { "$gte": 1900, "$lt": 1970 } } }])).unwrap();
        assert_eq!(ids(&docs), vec![1, 4]);
    }

    #[test]
    fn match_dotted_path_and_in() {
        let docs = run(json!([{ "$match": { "meta.pages": { "$in": [271, 474] } } }])).unwrap();
        assert_eq!(ids(&docs), vec![2, 3]);
    }

    #[test]
    fn match_exists_and_or() {
        let docs = run(json!([{ "$match": { "tags": { "$exists": false } } }])).unwrap();
        assert_eq!(ids(&docs), vec![4]);

        let docs = run(json!([{ "$match": { "$or": [ { "title": "Dune" }, { "year": 1815 } ] } }]))
            .unwrap();
        assert_eq!(ids(&docs), vec![1, 2]);
    }

    #[test]
    fn match_unknown_operator_is_unsupported() {
        assert!(matches!(
            run(json!([{ "$match": { "title": { "$regex": "^D" } } }])),
            Err(StoreError::UnsupportedStage(_))
        ));
    }

    #[test]
    fn sort_skip_limit() {
        let docs = run(json!([
            { "$sort": { "year": -1 } },
            { "$skip": 1 },
            { "$limit": 2 }
        ]))
        .unwrap();
        assert_eq!(ids(&docs), vec![1, 4]);
    }

    #[test]
    fn sort_places_missing_fields_first() {
        let docs = run(json!([{ "$sort": { "tags": 1, "_id": 1 } }])).unwrap();
        assert_eq!(ids(&docs)[0], 4);
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert!(matches!(
            run(json!([{ "$limit": 0 }])),
            Err(StoreError::InvalidPipeline(_))
        ));
    }

    #[test]
    fn project_inclusion_keeps_id() {
        let docs = run(json!([{ "$project": { "title": 1 } }])).unwrap();
        assert_eq!(docs[0], doc! { "_id": 1, "title": "Dune" });
    }

    #[test]
    fn project_exclusion_can_drop_id() {
        let docs = run(json!([
            { "$match": { "_id": 2 } },
            { "$project": { "_id": 0, "tags": 0, "meta": 0 } }
        ]))
        .unwrap();
        assert_eq!(docs, vec![doc! { "title": "Emma", "year": 1815 }]);
    }

    #[test]
    fn project_mixed_modes_is_rejected() {
        assert!(matches!(
            run(json!([{ "$project": { "title": 1, "year": 0 } }])),
            Err(StoreError::InvalidPipeline(_))
        ));
    }

    #[test]
    fn count_reports_matching_documents() {
        let docs = run(json!([
            { "$match": { "tags": "scifi" } },
            { "$count": "total" }
        ]))
        .unwrap();
        assert_eq!(docs, vec![doc! { "total": 2 }]);
    }

    #[test]
    fn count_over_nothing_yields_no_document() {
        let docs = run(json!([
            { "$match": { "title": "Missing" } },
            { "$count": "total" }
        ]))
        .unwrap();
        assert!(docs.is_empty());
    }
}
