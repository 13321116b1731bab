//! Local evaluation of the query DSL subset the gateway issues.
//!
//! Supported queries: `match_all`, `match`, `term`, `terms`, `wildcard`,
//! `ids`, `exists`, `range`, `query_string` and `bool` (`must`, `filter`,
//! `should`, `must_not`). Supported aggregations: `terms`, `multi_terms`
//! and `filter`, each with nested sub-aggregations.
//!
//! Anything else is rejected the way the real engine rejects a malformed
//! body, with a 400.

use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{StoreError, StoreResult};
use crate::models::value_to_key;

/// A document as seen by the evaluator.
pub(crate) type DocRef<'a> = (&'a str, &'a Value);

fn unsupported(what: impl Into<String>) -> StoreError {
    StoreError::Rejected {
        status: 400,
        reason: what.into(),
    }
}

/// Resolves a possibly dotted field path. `.keyword` sub-fields map to the
/// base field; arrays are flattened.
pub(crate) fn field_values<'a>(source: &'a Value, field: &str) -> Vec<&'a Value> {
    let field = field.strip_suffix(".keyword").unwrap_or(field);
    let mut current = vec![source];
    for segment in field.split('.') {
        let mut next = Vec::new();
        for v in current {
            match v {
                Value::Object(map) => {
                    if let Some(child) = map.get(segment) {
                        next.push(child);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(child) = item.get(segment) {
                            next.push(child);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    let mut out = Vec::new();
    for v in current {
        match v {
            Value::Array(items) => out.extend(items.iter().filter(|i| !i.is_null())),
            Value::Null => {}
            other => out.push(other),
        }
    }
    out
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn scalar_text(v: &Value) -> String {
    value_to_key(v)
}

/// Glob match with `*` and `?`, on chars.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Splits `{field: spec}` into the single field and its spec.
fn single_field<'a>(kind: &str, body: &'a Value) -> StoreResult<(&'a str, &'a Value)> {
    let map = body
        .as_object()
        .ok_or_else(|| unsupported(format!("[{}] query must be an object", kind)))?;
    let mut iter = map.iter();
    match (iter.next(), iter.next()) {
        (Some((field, spec)), None) => Ok((field.as_str(), spec)),
        _ => Err(unsupported(format!(
            "[{}] query requires exactly one field",
            kind
        ))),
    }
}

/// Unwraps the short form `{field: v}` and the long form `{field: {key: v}}`.
fn inner_value<'a>(spec: &'a Value, key: &str) -> &'a Value {
    match spec {
        Value::Object(m) => m.get(key).unwrap_or(&Value::Null),
        other => other,
    }
}

fn clauses(v: Option<&Value>) -> Vec<&Value> {
    match v {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}

/// Evaluates a query clause against one document.
pub(crate) fn matches(query: &Value, doc: DocRef<'_>) -> StoreResult<bool> {
    let (id, source) = doc;
    let map = match query {
        Value::Object(m) => m,
        Value::Null => return Ok(true),
        _ => return Err(unsupported("query must be an object")),
    };
    if map.is_empty() {
        return Ok(true);
    }
    if map.len() != 1 {
        return Err(unsupported(
            "query malformed, expected a single query type per clause",
        ));
    }
    let Some((kind, body)) = map.iter().next() else {
        return Ok(true);
    };
    match kind.as_str() {
        "match_all" => Ok(true),
        "match_none" => Ok(false),
        "match" => {
            let (field, spec) = single_field(kind, body)?;
            let wanted = tokenize(&scalar_text(inner_value(spec, "query")));
            if wanted.is_empty() {
                return Ok(false);
            }
            let have: Vec<String> = field_values(source, field)
                .into_iter()
                .flat_map(|v| tokenize(&scalar_text(v)))
                .collect();
            Ok(wanted.iter().any(|w| have.contains(w)))
        }
        "term" => {
            let (field, spec) = single_field(kind, body)?;
            let wanted = scalar_text(inner_value(spec, "value"));
            Ok(field_values(source, field)
                .into_iter()
                .any(|v| scalar_text(v) == wanted))
        }
        "terms" => {
            let (field, spec) = single_field(kind, body)?;
            let wanted: Vec<String> = spec
                .as_array()
                .ok_or_else(|| unsupported("[terms] values must be an array"))?
                .iter()
                .map(scalar_text)
                .collect();
            Ok(field_values(source, field)
                .into_iter()
                .any(|v| wanted.contains(&scalar_text(v))))
        }
        "wildcard" => {
            let (field, spec) = single_field(kind, body)?;
            let pattern = scalar_text(inner_value(spec, "value")).to_lowercase();
            Ok(field_values(source, field).into_iter().any(|v| {
                let text = scalar_text(v).to_lowercase();
                glob_match(&pattern, &text) || tokenize(&text).iter().any(|t| glob_match(&pattern, t))
            }))
        }
        "ids" => {
            let values = body
                .get("values")
                .and_then(Value::as_array)
                .ok_or_else(|| unsupported("[ids] requires a values array"))?;
            Ok(values.iter().any(|v| v.as_str() == Some(id)))
        }
        "exists" => {
            let field = body
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| unsupported("[exists] requires a field"))?;
            Ok(!field_values(source, field).is_empty())
        }
        "range" => {
            let (field, spec) = single_field(kind, body)?;
            Ok(field_values(source, field)
                .into_iter()
                .any(|v| in_range(v, spec)))
        }
        "query_string" => {
            let text = body
                .get("query")
                .and_then(Value::as_str)
                .ok_or_else(|| unsupported("[query_string] requires a query"))?;
            Ok(query_string_matches(text, source))
        }
        "bool" => bool_matches(body, doc),
        other => Err(unsupported(format!("unknown query [{}]", other))),
    }
}

fn bool_matches(body: &Value, doc: DocRef<'_>) -> StoreResult<bool> {
    if !body.is_object() {
        return Err(unsupported("[bool] query must be an object"));
    }
    let must = clauses(body.get("must"));
    let filter = clauses(body.get("filter"));
    let should = clauses(body.get("should"));
    let must_not = clauses(body.get("must_not"));

    for clause in must.iter().chain(filter.iter()) {
        if !matches(clause, doc)? {
            return Ok(false);
        }
    }
    for clause in &must_not {
        if matches(clause, doc)? {
            return Ok(false);
        }
    }
    if should.is_empty() {
        return Ok(true);
    }
    let required = match body.get("minimum_should_match").and_then(Value::as_u64) {
        Some(n) => n as usize,
        None if must.is_empty() && filter.is_empty() => 1,
        None => 0,
    };
    let mut hits = 0usize;
    for clause in &should {
        if matches(clause, doc)? {
            hits += 1;
        }
    }
    Ok(hits >= required)
}

fn in_range(v: &Value, spec: &Value) -> bool {
    let bounds = match spec.as_object() {
        Some(b) => b,
        None => return false,
    };
    bounds.iter().all(|(op, bound)| {
        let ord = compare_values(v, bound);
        match op.as_str() {
            "gt" => ord == Ordering::Greater,
            "gte" => ord != Ordering::Less,
            "lt" => ord == Ordering::Less,
            "lte" => ord != Ordering::Greater,
            _ => true,
        }
    })
}

/// `field:value` terms and bare terms, OR-ed unless `AND` appears.
fn query_string_matches(text: &str, source: &Value) -> bool {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let conjunctive = tokens.iter().any(|t| *t == "AND");
    let mut results = tokens
        .iter()
        .filter(|t| **t != "AND" && **t != "OR")
        .map(|t| {
            let t = t.trim_matches('"');
            match t.split_once(':') {
                Some((field, value)) => {
                    let pattern = value.trim_matches('"').to_lowercase();
                    field_values(source, field)
                        .into_iter()
                        .any(|v| term_like(&pattern, &scalar_text(v)))
                }
                None => {
                    let pattern = t.to_lowercase();
                    any_leaf(source, &|leaf| term_like(&pattern, &scalar_text(leaf)))
                }
            }
        });
    if conjunctive {
        results.all(|r| r)
    } else {
        results.any(|r| r)
    }
}

fn term_like(pattern: &str, text: &str) -> bool {
    let text = text.to_lowercase();
    if pattern.contains('*') || pattern.contains('?') {
        glob_match(pattern, &text) || tokenize(&text).iter().any(|t| glob_match(pattern, t))
    } else {
        text == pattern || tokenize(&text).iter().any(|t| t == pattern)
    }
}

fn any_leaf(v: &Value, pred: &dyn Fn(&Value) -> bool) -> bool {
    match v {
        Value::Object(m) => m.values().any(|c| any_leaf(c, pred)),
        Value::Array(items) => items.iter().any(|c| any_leaf(c, pred)),
        Value::Null => false,
        leaf => pred(leaf),
    }
}

/// Numbers compare numerically, everything else by its text.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (number_of(a), number_of(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => scalar_text(a).cmp(&scalar_text(b)),
    }
}

fn number_of(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// Parsed `sort` entry.
struct SortKey {
    field: String,
    descending: bool,
}

fn parse_sort(sort: &Value) -> StoreResult<Vec<SortKey>> {
    let mut keys = Vec::new();
    for entry in clauses(Some(sort)) {
        match entry {
            Value::String(field) => keys.push(SortKey {
                field: field.clone(),
                descending: false,
            }),
            Value::Object(m) => {
                for (field, spec) in m {
                    let order = match spec {
                        Value::String(o) => o.as_str(),
                        Value::Object(o) => o.get("order").and_then(Value::as_str).unwrap_or("asc"),
                        _ => "asc",
                    };
                    keys.push(SortKey {
                        field: field.clone(),
                        descending: order.eq_ignore_ascii_case("desc"),
                    });
                }
            }
            _ => return Err(unsupported("malformed sort entry")),
        }
    }
    Ok(keys)
}

/// Sorts documents in place. Documents missing a sort field go last.
pub(crate) fn sort_docs(docs: &mut [DocRef<'_>], sort: &Value) -> StoreResult<()> {
    let keys = parse_sort(sort)?;
    if keys.is_empty() {
        return Ok(());
    }
    docs.sort_by(|(_, a), (_, b)| {
        for key in &keys {
            let av = field_values(a, &key.field).into_iter().next();
            let bv = field_values(b, &key.field).into_iter().next();
            let ord = match (av, bv) {
                (Some(x), Some(y)) => {
                    let o = compare_values(x, y);
                    if key.descending {
                        o.reverse()
                    } else {
                        o
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

/// Computes an `aggs` object over the matched documents.
pub(crate) fn aggregate(aggs: &Value, docs: &[DocRef<'_>]) -> StoreResult<Value> {
    let defs = aggs
        .as_object()
        .ok_or_else(|| unsupported("aggregations must be an object"))?;
    let mut out = Map::new();
    for (name, def) in defs {
        out.insert(name.clone(), aggregate_one(def, docs)?);
    }
    Ok(Value::Object(out))
}

fn sub_aggs(def: &Value) -> Option<&Value> {
    def.get("aggs").or_else(|| def.get("aggregations"))
}

fn aggregate_one(def: &Value, docs: &[DocRef<'_>]) -> StoreResult<Value> {
    let sub = sub_aggs(def);
    if let Some(query) = def.get("filter") {
        let mut kept = Vec::new();
        for doc in docs {
            if matches(query, *doc)? {
                kept.push(*doc);
            }
        }
        let mut result = Map::new();
        result.insert("doc_count".into(), json!(kept.len()));
        if let Some(sub) = sub {
            if let Value::Object(children) = aggregate(sub, &kept)? {
                result.extend(children);
            }
        }
        return Ok(Value::Object(result));
    }
    if let Some(spec) = def.get("terms") {
        let field = spec
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| unsupported("[terms] aggregation requires a field"))?;
        let size = spec.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
        return bucketize(docs, size, sub, |source| {
            let mut keys: Vec<Value> = Vec::new();
            for v in field_values(source, field) {
                if !keys.contains(v) {
                    keys.push(v.clone());
                }
            }
            keys
        });
    }
    if let Some(spec) = def.get("multi_terms") {
        let fields: Vec<&str> = spec
            .get("terms")
            .and_then(Value::as_array)
            .ok_or_else(|| unsupported("[multi_terms] requires a terms array"))?
            .iter()
            .filter_map(|t| t.get("field").and_then(Value::as_str))
            .collect();
        if fields.len() < 2 {
            return Err(unsupported("[multi_terms] requires at least two fields"));
        }
        let size = spec.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
        return bucketize(docs, size, sub, |source| {
            let mut combos: Vec<Vec<Value>> = vec![Vec::new()];
            for field in &fields {
                let values = field_values(source, field);
                let mut next = Vec::new();
                for combo in &combos {
                    for v in &values {
                        let mut c = combo.clone();
                        c.push((*v).clone());
                        next.push(c);
                    }
                }
                combos = next;
            }
            let mut keys: Vec<Value> = Vec::new();
            for combo in combos {
                let key = Value::Array(combo);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            keys
        });
    }
    Err(unsupported("unsupported aggregation type"))
}

/// Groups documents by the keys `keys_of` yields, ordered by count
/// descending then key ascending, truncated to `size`.
fn bucketize<'a, F>(
    docs: &[DocRef<'a>],
    size: usize,
    sub: Option<&Value>,
    keys_of: F,
) -> StoreResult<Value>
where
    F: Fn(&Value) -> Vec<Value>,
{
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (Value, Vec<DocRef<'a>>)> = HashMap::new();
    for doc in docs {
        for key in keys_of(doc.1) {
            let id = key.to_string();
            let entry = groups.entry(id.clone()).or_insert_with(|| {
                order.push(id.clone());
                (key.clone(), Vec::new())
            });
            entry.1.push(*doc);
        }
    }
    let mut ranked: Vec<&(Value, Vec<DocRef<'a>>)> =
        order.iter().filter_map(|k| groups.get(k)).collect();
    ranked.sort_by(|a, b| {
        b.1.len()
            .cmp(&a.1.len())
            .then_with(|| key_text(&a.0).cmp(&key_text(&b.0)))
    });
    let total: usize = ranked.iter().map(|(_, d)| d.len()).sum();
    let mut buckets = Vec::new();
    let mut shown = 0usize;
    for (key, members) in ranked.into_iter().take(size) {
        shown += members.len();
        let mut bucket = Map::new();
        bucket.insert("key".into(), key.clone());
        if let Value::Array(parts) = key {
            let joined: Vec<String> = parts.iter().map(scalar_text).collect();
            bucket.insert("key_as_string".into(), json!(joined.join("|")));
        }
        bucket.insert("doc_count".into(), json!(members.len()));
        if let Some(sub) = sub {
            if let Value::Object(children) = aggregate(sub, members)? {
                bucket.extend(children);
            }
        }
        buckets.push(Value::Object(bucket));
    }
    Ok(json!({
        "doc_count_error_upper_bound": 0,
        "sum_other_doc_count": total - shown,
        "buckets": buckets,
    }))
}

fn key_text(key: &Value) -> String {
    match key {
        Value::Array(parts) => parts.iter().map(scalar_text).collect::<Vec<_>>().join("|"),
        other => scalar_text(other),
    }
}
