//! Process-local index evaluating the query DSL subset the service emits

use crate::search::backend::{
    BackendIndexStats, BulkItem, BulkOperation, BulkResponse, ClusterInfo, RefreshPolicy,
    SearchBackend,
};
use crate::search::error::{SearchError, SearchResult};
use crate::search::schema::{fields, EXACT_SUBFIELD, NORMALIZED_KEYWORDS};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

/// Fields mapped as numbers; documents carrying anything else there are rejected
const NUMERIC_FIELDS: [&str; 4] = [
    fields::CHAT_ID,
    fields::MESSAGE_ID,
    fields::SENDER_ID,
    fields::TIMESTAMP,
];

const DEFAULT_SEARCH_SIZE: usize = 10;
const DEFAULT_TOP_HITS_SIZE: usize = 3;

/// In-memory search backend (for testing and development)
pub struct InMemoryBackend {
    index: String,
    created: AtomicBool,
    documents: DashMap<String, Value>,
}

type Document = (String, Value);

impl InMemoryBackend {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            created: AtomicBool::new(false),
            documents: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn matching(&self, query: &Value) -> SearchResult<Vec<Document>> {
        let mut matched = Vec::new();
        for entry in self.documents.iter() {
            if matches(query, entry.key(), entry.value())? {
                matched.push((entry.key().clone(), entry.value().clone()));
            }
        }
        Ok(matched)
    }

    fn store(&self, id: &str, document: &Value) -> Result<(), SearchError> {
        check_document(document).map_err(|reason| SearchError::Backend {
            status: 400,
            error_type: "mapper_parsing_exception".to_string(),
            reason,
        })?;
        self.documents.insert(id.to_string(), document.clone());
        Ok(())
    }
}

fn query_of(body: &Value) -> &Value {
    static MATCH_ALL: std::sync::OnceLock<Value> = std::sync::OnceLock::new();
    match body.get("query") {
        Some(query) if !query.is_null() => query,
        _ => MATCH_ALL.get_or_init(|| json!({ "match_all": {} })),
    }
}

fn check_document(document: &Value) -> Result<(), String> {
    let object = document
        .as_object()
        .ok_or_else(|| "document must be a JSON object".to_string())?;
    for field in NUMERIC_FIELDS {
        if let Some(value) = object.get(field) {
            if !value.is_null() && value.as_i64().is_none() {
                return Err(format!("failed to parse field [{}] of type [long]", field));
            }
        }
    }
    Ok(())
}

fn unsupported(what: impl Into<String>) -> SearchError {
    SearchError::UnsupportedQuery(what.into())
}

/// The only key of a single-entry object such as `{"term": {...}}`
fn single_entry(value: &Value) -> SearchResult<(&str, &Value)> {
    let object = value
        .as_object()
        .ok_or_else(|| unsupported(format!("expected an object, got {}", value)))?;
    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some((key, inner)), None) => Ok((key.as_str(), inner)),
        _ => Err(unsupported(format!("expected exactly one key in {}", value))),
    }
}

/// Clause lists may be a single object or an array
fn clauses(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}

/// Values found at a dotted path, flattening arrays along the way
fn field_values<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    if path == "_id" {
        return Vec::new();
    }
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value.get(segment) {
                Some(Value::Array(items)) => next.extend(items.iter()),
                Some(Value::Null) | None => {}
                Some(found) => next.push(found),
            }
        }
        current = next;
    }
    current
}

fn matches(query: &Value, id: &str, doc: &Value) -> SearchResult<bool> {
    let (kind, body) = single_entry(query)?;
    match kind {
        "match_all" => Ok(true),
        "match_none" => Ok(false),
        "bool" => matches_bool(body, id, doc),
        "term" => {
            let (field, expected) = single_entry(body)?;
            let expected = expected.get("value").unwrap_or(expected);
            Ok(term_matches(doc, field, expected))
        }
        "terms" => {
            let (field, expected) = single_entry(body)?;
            let expected = expected
                .as_array()
                .ok_or_else(|| unsupported("terms expects an array of values"))?;
            Ok(expected.iter().any(|value| term_matches(doc, field, value)))
        }
        "range" => {
            let (field, bounds) = single_entry(body)?;
            Ok(range_matches(doc, field, bounds))
        }
        "exists" => {
            let field = body["field"]
                .as_str()
                .ok_or_else(|| unsupported("exists requires a field"))?;
            Ok(!field_values(doc, field).is_empty())
        }
        "ids" => Ok(body["values"]
            .as_array()
            .map(|values| values.iter().any(|value| value.as_str() == Some(id)))
            .unwrap_or(false)),
        "match" | "match_phrase" => {
            let (field, spec) = single_entry(body)?;
            let (text, require_all) = match_text(spec)?;
            Ok(text_matches(doc, field, text, require_all, kind == "match_phrase"))
        }
        "multi_match" => {
            let text = body["query"]
                .as_str()
                .ok_or_else(|| unsupported("multi_match requires a string query"))?;
            let phrase = body["type"].as_str() == Some("phrase");
            let require_all = body["operator"]
                .as_str()
                .is_some_and(|op| op.eq_ignore_ascii_case("and"));
            let targets = body["fields"]
                .as_array()
                .ok_or_else(|| unsupported("multi_match requires fields"))?;
            Ok(targets.iter().filter_map(Value::as_str).any(|field| {
                // Strip per-field boosts such as "text^2"
                let field = field.split('^').next().unwrap_or(field);
                text_matches(doc, field, text, require_all, phrase)
            }))
        }
        "nested" => {
            let path = body["path"]
                .as_str()
                .ok_or_else(|| unsupported("nested requires a path"))?;
            let inner = &body["query"];
            for element in field_values(doc, path) {
                if matches(inner, id, &scope(path, element))? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(unsupported(format!("query type '{}'", other))),
    }
}

fn matches_bool(body: &Value, id: &str, doc: &Value) -> SearchResult<bool> {
    for clause in clauses(body.get("must"))
        .into_iter()
        .chain(clauses(body.get("filter")))
    {
        if !matches(clause, id, doc)? {
            return Ok(false);
        }
    }
    for clause in clauses(body.get("must_not")) {
        if matches(clause, id, doc)? {
            return Ok(false);
        }
    }

    let should = clauses(body.get("should"));
    if should.is_empty() {
        return Ok(true);
    }
    let has_required = body.get("must").is_some() || body.get("filter").is_some();
    let minimum = match body.get("minimum_should_match").and_then(Value::as_u64) {
        Some(minimum) => minimum as usize,
        None if has_required => 0,
        None => 1,
    };
    let mut satisfied = 0;
    for clause in should {
        if matches(clause, id, doc)? {
            satisfied += 1;
        }
    }
    Ok(satisfied >= minimum)
}

/// Wrap a nested element back under its path so dotted field names resolve
fn scope(path: &str, element: &Value) -> Value {
    path.rsplit('.')
        .fold(element.clone(), |inner, segment| json!({ segment: inner }))
}

fn match_text(spec: &Value) -> SearchResult<(&str, bool)> {
    match spec {
        Value::String(text) => Ok((text.as_str(), false)),
        Value::Object(options) => {
            let text = options
                .get("query")
                .and_then(Value::as_str)
                .ok_or_else(|| unsupported("match requires a string query"))?;
            let require_all = options
                .get("operator")
                .and_then(Value::as_str)
                .is_some_and(|op| op.eq_ignore_ascii_case("and"));
            Ok((text, require_all))
        }
        other => Err(unsupported(format!("match query {}", other))),
    }
}

fn text_matches(doc: &Value, field: &str, query: &str, require_all: bool, phrase: bool) -> bool {
    let suffix = format!(".{}", EXACT_SUBFIELD);
    let (source, exact) = match field.strip_suffix(suffix.as_str()) {
        Some(base) => (base, true),
        None => (field, false),
    };

    if exact {
        let wanted = exact_token(query);
        return field_values(doc, source)
            .into_iter()
            .filter_map(Value::as_str)
            .any(|text| exact_token(text) == wanted);
    }

    let wanted = bigram_tokens(query);
    if wanted.is_empty() {
        return false;
    }
    field_values(doc, source)
        .into_iter()
        .filter_map(Value::as_str)
        .any(|text| {
            let tokens = bigram_tokens(text);
            if phrase {
                tokens.windows(wanted.len()).any(|window| window == wanted.as_slice())
            } else if require_all {
                wanted.iter().all(|token| tokens.contains(token))
            } else {
                wanted.iter().any(|token| tokens.contains(token))
            }
        })
}

fn term_matches(doc: &Value, field: &str, expected: &Value) -> bool {
    let normalize = NORMALIZED_KEYWORDS.contains(&field);
    field_values(doc, field)
        .into_iter()
        .any(|actual| values_equal(actual, expected, normalize))
}

fn values_equal(actual: &Value, expected: &Value, normalize: bool) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) if normalize => a.to_lowercase() == b.to_lowercase(),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Bool(a), Value::String(b)) => b.parse::<bool>().map_or(false, |b| *a == b),
        _ => match (as_i64(actual), as_i64(expected)) {
            (Some(a), Some(b)) => a == b,
            _ => match (as_f64(actual), as_f64(expected)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        },
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn as_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn range_matches(doc: &Value, field: &str, bounds: &Value) -> bool {
    field_values(doc, field)
        .into_iter()
        .filter_map(as_f64)
        .any(|value| {
            let check = |key: &str, accept: fn(f64, f64) -> bool| {
                bounds
                    .get(key)
                    .and_then(as_f64)
                    .map_or(true, |bound| accept(value, bound))
            };
            check("gte", |v, b| v >= b)
                && check("gt", |v, b| v > b)
                && check("lte", |v, b| v <= b)
                && check("lt", |v, b| v < b)
        })
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF      // Hiragana, Katakana
        | 0x3400..=0x4DBF    // CJK Extension A
        | 0x4E00..=0x9FFF    // CJK Unified Ideographs
        | 0xAC00..=0xD7AF    // Hangul syllables
        | 0xF900..=0xFAFF    // CJK Compatibility Ideographs
        | 0x20000..=0x2FA1F)
}

/// Fold full-width ASCII variants to their basic Latin forms
fn fold_width(c: char) -> char {
    match c as u32 {
        0xFF01..=0xFF5E => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        0x3000 => ' ',
        _ => c,
    }
}

/// Whole-value token produced by the keyword + lowercase analyzer
pub fn exact_token(text: &str) -> String {
    text.to_lowercase()
}

/// Tokens produced by the standard tokenizer followed by width folding,
/// lowercasing and CJK bigram formation.
///
/// Runs of CJK characters become overlapping bigrams, an isolated CJK character
/// stays a unigram, and any other alphanumeric run is one token.
pub fn bigram_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut cjk_run: Vec<char> = Vec::new();
    let mut word = String::new();

    fn flush_cjk(run: &mut Vec<char>, tokens: &mut Vec<String>) {
        match run.len() {
            0 => {}
            1 => tokens.push(run[0].to_string()),
            _ => tokens.extend(run.windows(2).map(|pair| pair.iter().collect::<String>())),
        }
        run.clear();
    }

    fn flush_word(word: &mut String, tokens: &mut Vec<String>) {
        if !word.is_empty() {
            tokens.push(std::mem::take(word));
        }
    }

    for c in text.chars().map(fold_width) {
        if is_cjk(c) {
            flush_word(&mut word, &mut tokens);
            cjk_run.push(c);
        } else if c.is_alphanumeric() || c == '_' {
            flush_cjk(&mut cjk_run, &mut tokens);
            word.extend(c.to_lowercase());
        } else {
            flush_cjk(&mut cjk_run, &mut tokens);
            flush_word(&mut word, &mut tokens);
        }
    }
    flush_cjk(&mut cjk_run, &mut tokens);
    flush_word(&mut word, &mut tokens);
    tokens
}

/// `(field, descending)` pairs from a sort clause
fn sort_keys(sort: Option<&Value>) -> SearchResult<Vec<(String, bool)>> {
    let mut keys = Vec::new();
    for spec in clauses(sort) {
        match spec {
            Value::String(field) => keys.push((field.clone(), false)),
            Value::Object(_) => {
                let (field, order) = single_entry(spec)?;
                let order = order.get("order").unwrap_or(order);
                keys.push((field.to_string(), order.as_str() == Some("desc")));
            }
            other => return Err(unsupported(format!("sort clause {}", other))),
        }
    }
    Ok(keys)
}

fn compare_field(a: &Document, b: &Document, field: &str) -> Option<Ordering> {
    if field == "_id" {
        return Some(a.0.cmp(&b.0));
    }
    let left = field_values(&a.1, field).into_iter().next();
    let right = field_values(&b.1, field).into_iter().next();
    match (left, right) {
        (None, None) => Some(Ordering::Equal),
        // Missing values sort last in either direction
        (None, Some(_)) | (Some(_), None) => None,
        (Some(l), Some(r)) => Some(compare_values(l, r)),
    }
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::String(l), Value::String(r)) => l.cmp(r),
        _ => match (as_f64(left), as_f64(right)) {
            (Some(l), Some(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
            _ => left.to_string().cmp(&right.to_string()),
        },
    }
}

fn sort_documents(docs: &mut [Document], sort: Option<&Value>) -> SearchResult<()> {
    let keys = sort_keys(sort)?;
    docs.sort_by(|a, b| {
        for (field, descending) in &keys {
            if field == "_score" || field == "_doc" {
                continue;
            }
            let ordering = match compare_field(a, b, field) {
                Some(ordering) if *descending => ordering.reverse(),
                Some(ordering) => ordering,
                None => {
                    let a_missing = field_values(&a.1, field).is_empty();
                    if a_missing {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.0.cmp(&b.0)
    });
    Ok(())
}

/// Apply `_source` includes (top-level keys only)
fn filter_source(source: &Value, includes: Option<&Value>) -> Value {
    match includes {
        Some(Value::Array(keep)) => {
            let keep: HashSet<&str> = keep.iter().filter_map(Value::as_str).collect();
            let filtered: Map<String, Value> = source
                .as_object()
                .map(|object| {
                    object
                        .iter()
                        .filter(|(key, _)| keep.contains(key.as_str()))
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect()
                })
                .unwrap_or_default();
            Value::Object(filtered)
        }
        Some(Value::Bool(false)) => json!({}),
        _ => source.clone(),
    }
}

fn hits_json(index: &str, docs: &[Document], total: usize, body: &Value, score: Option<f64>) -> Value {
    let hits: Vec<Value> = docs
        .iter()
        .map(|(id, source)| {
            json!({
                "_index": index,
                "_id": id,
                "_score": score,
                "_source": filter_source(source, body.get("_source")),
            })
        })
        .collect();

    json!({
        "total": { "value": total, "relation": "eq" },
        "max_score": if docs.is_empty() { None } else { score },
        "hits": hits,
    })
}

/// Sortable composite bucket key component
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum KeyPart {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl KeyPart {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(KeyPart::Bool(*b)),
            Value::Number(n) => n.as_i64().map(KeyPart::Int),
            Value::String(s) => Some(KeyPart::Text(s.clone())),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            KeyPart::Bool(b) => json!(b),
            KeyPart::Int(i) => json!(i),
            KeyPart::Text(s) => json!(s),
        }
    }
}

fn aggregate_all(aggs: &Value, index: &str, docs: &[Document]) -> SearchResult<Value> {
    let specs = aggs
        .as_object()
        .ok_or_else(|| unsupported("aggregations must be an object"))?;
    let mut results = Map::new();
    for (name, spec) in specs {
        results.insert(name.clone(), aggregate(spec, index, docs)?);
    }
    Ok(Value::Object(results))
}

fn aggregate(spec: &Value, index: &str, docs: &[Document]) -> SearchResult<Value> {
    let object = spec
        .as_object()
        .ok_or_else(|| unsupported("aggregation must be an object"))?;
    let sub_aggs = object.get("aggs").or_else(|| object.get("aggregations"));
    let (kind, body) = object
        .iter()
        .find(|(key, _)| key.as_str() != "aggs" && key.as_str() != "aggregations")
        .ok_or_else(|| unsupported("aggregation without a type"))?;

    match kind.as_str() {
        "composite" => composite(body, sub_aggs, index, docs),
        "top_hits" => {
            let size = body["size"].as_u64().map_or(DEFAULT_TOP_HITS_SIZE, |s| s as usize);
            let mut sorted = docs.to_vec();
            sort_documents(&mut sorted, body.get("sort"))?;
            sorted.truncate(size);
            Ok(json!({ "hits": hits_json(index, &sorted, docs.len(), body, None) }))
        }
        "cardinality" => {
            let field = agg_field(body)?;
            let distinct: HashSet<KeyPart> = docs
                .iter()
                .flat_map(|(_, doc)| field_values(doc, field))
                .filter_map(KeyPart::from_value)
                .collect();
            Ok(json!({ "value": distinct.len() }))
        }
        "min" | "max" => {
            let field = agg_field(body)?;
            let values = docs
                .iter()
                .flat_map(|(_, doc)| field_values(doc, field))
                .filter_map(as_f64);
            let value = if kind == "min" {
                values.fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
            } else {
                values.fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            };
            Ok(json!({ "value": value }))
        }
        other => Err(unsupported(format!("aggregation type '{}'", other))),
    }
}

fn agg_field(body: &Value) -> SearchResult<&str> {
    body["field"]
        .as_str()
        .ok_or_else(|| unsupported("aggregation requires a field"))
}

fn composite(
    body: &Value,
    sub_aggs: Option<&Value>,
    index: &str,
    docs: &[Document],
) -> SearchResult<Value> {
    let size = body["size"].as_u64().map_or(DEFAULT_SEARCH_SIZE, |s| s as usize);
    let mut sources = Vec::new();
    for source in body["sources"]
        .as_array()
        .ok_or_else(|| unsupported("composite requires sources"))?
    {
        let (name, spec) = single_entry(source)?;
        let field = spec["terms"]["field"]
            .as_str()
            .ok_or_else(|| unsupported("composite supports terms sources only"))?;
        sources.push((name.to_string(), field.to_string()));
    }

    let mut groups: BTreeMap<Vec<KeyPart>, Vec<Document>> = BTreeMap::new();
    for doc in docs {
        let key: Option<Vec<KeyPart>> = sources
            .iter()
            .map(|(_, field)| {
                field_values(&doc.1, field)
                    .into_iter()
                    .next()
                    .and_then(KeyPart::from_value)
            })
            .collect();
        if let Some(key) = key {
            groups.entry(key).or_default().push(doc.clone());
        }
    }

    let lower = match body.get("after") {
        Some(after) => {
            let key: Option<Vec<KeyPart>> = sources
                .iter()
                .map(|(name, _)| after.get(name).and_then(KeyPart::from_value))
                .collect();
            Bound::Excluded(key.ok_or_else(|| unsupported("after key does not match sources"))?)
        }
        None => Bound::Unbounded,
    };

    let mut buckets = Vec::new();
    let mut last_key = None;
    for (key, members) in groups.range((lower, Bound::Unbounded)).take(size) {
        let mut key_json = Map::new();
        for ((name, _), part) in sources.iter().zip(key) {
            key_json.insert(name.clone(), part.to_value());
        }
        let key_json = Value::Object(key_json);

        let mut bucket = Map::new();
        bucket.insert("key".to_string(), key_json.clone());
        bucket.insert("doc_count".to_string(), json!(members.len()));
        if let Some(sub_aggs) = sub_aggs {
            if let Value::Object(results) = aggregate_all(sub_aggs, index, members)? {
                bucket.extend(results);
            }
        }
        buckets.push(Value::Object(bucket));
        last_key = Some(key_json);
    }

    let mut result = json!({ "buckets": buckets });
    if let Some(after_key) = last_key {
        result["after_key"] = after_key;
    }
    Ok(result)
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    fn index_name(&self) -> &str {
        &self.index
    }

    async fn index_exists(&self) -> SearchResult<bool> {
        Ok(self.created.load(AtomicOrdering::SeqCst))
    }

    async fn create_index(&self, _definition: &Value) -> SearchResult<()> {
        self.created.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn put_document(
        &self,
        id: &str,
        document: &Value,
        _refresh: RefreshPolicy,
    ) -> SearchResult<()> {
        self.store(id, document)
    }

    async fn update_document(
        &self,
        id: &str,
        partial: &Value,
        _refresh: RefreshPolicy,
    ) -> SearchResult<()> {
        let mut entry = self
            .documents
            .get_mut(id)
            .ok_or_else(|| SearchError::NotFound(format!("message {}", id)))?;
        if let (Value::Object(target), Value::Object(changes)) = (entry.value_mut(), partial) {
            for (key, value) in changes {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn bulk(
        &self,
        operations: Vec<BulkOperation>,
        _refresh: RefreshPolicy,
    ) -> SearchResult<BulkResponse> {
        let items = operations
            .into_iter()
            .map(|operation| match operation {
                BulkOperation::Index { id, document } => match self.store(&id, &document) {
                    Ok(()) => BulkItem {
                        id,
                        status: 201,
                        error: None,
                    },
                    Err(e) => BulkItem {
                        id,
                        status: 400,
                        error: Some(match e {
                            SearchError::Backend {
                                error_type, reason, ..
                            } => format!("{}: {}", error_type, reason),
                            other => other.to_string(),
                        }),
                    },
                },
                BulkOperation::Delete { id } => {
                    let status = if self.documents.remove(&id).is_some() {
                        200
                    } else {
                        404
                    };
                    BulkItem {
                        id,
                        status,
                        error: None,
                    }
                }
            })
            .collect();

        Ok(BulkResponse { items, took_ms: 0 })
    }

    async fn search(&self, body: &Value) -> SearchResult<Value> {
        let mut matched = self.matching(query_of(body))?;
        let total = matched.len();

        let aggregations = match body.get("aggs").or_else(|| body.get("aggregations")) {
            Some(aggs) => Some(aggregate_all(aggs, &self.index, &matched)?),
            None => None,
        };

        sort_documents(&mut matched, body.get("sort"))?;
        let from = body["from"].as_u64().unwrap_or(0) as usize;
        let size = body["size"].as_u64().map_or(DEFAULT_SEARCH_SIZE, |s| s as usize);
        let page: Vec<Document> = matched.into_iter().skip(from).take(size).collect();

        let mut response = json!({
            "took": 0,
            "timed_out": false,
            "hits": hits_json(&self.index, &page, total, body, Some(1.0)),
        });
        if let Some(aggregations) = aggregations {
            response["aggregations"] = aggregations;
        }
        Ok(response)
    }

    async fn count(&self, body: &Value) -> SearchResult<u64> {
        Ok(self.matching(query_of(body))?.len() as u64)
    }

    async fn update_by_query(&self, body: &Value) -> SearchResult<u64> {
        let changes = body["script"]["params"]["fields"]
            .as_object()
            .ok_or_else(|| unsupported("update_by_query supports params.fields scripts only"))?;

        let mut updated = 0;
        for (id, _) in self.matching(query_of(body))? {
            if let Some(mut entry) = self.documents.get_mut(&id) {
                if let Value::Object(target) = entry.value_mut() {
                    for (key, value) in changes {
                        target.insert(key.clone(), value.clone());
                    }
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn delete_by_query(&self, body: &Value) -> SearchResult<u64> {
        let mut deleted = 0;
        for (id, _) in self.matching(query_of(body))? {
            if self.documents.remove(&id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn index_stats(&self) -> SearchResult<BackendIndexStats> {
        let store_size_bytes = self
            .documents
            .iter()
            .map(|entry| entry.value().to_string().len() as u64)
            .sum();
        Ok(BackendIndexStats {
            document_count: self.documents.len() as u64,
            store_size_bytes,
        })
    }

    async fn cluster_info(&self) -> SearchResult<ClusterInfo> {
        Ok(ClusterInfo {
            engine: "in-memory".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(chat_id: i64, message_id: i64, text: &str, timestamp: i64) -> Value {
        json!({
            "chatID": chat_id,
            "messageID": message_id,
            "text": text,
            "senderType": "user",
            "senderID": 7,
            "senderUsername": "Alice",
            "timestamp": timestamp,
            "isDeleted": false,
            "entities": [{"type": "text_mention", "offset": 0, "length": 2, "userID": 42}]
        })
    }

    async fn seeded() -> InMemoryBackend {
        let backend = InMemoryBackend::new("messages");
        backend
            .put_document("100-1", &doc(100, 1, "你好世界", 10), RefreshPolicy::False)
            .await
            .unwrap();
        backend
            .put_document("100-2", &doc(100, 2, "Hello World", 20), RefreshPolicy::False)
            .await
            .unwrap();
        backend
            .put_document("200-1", &doc(200, 1, "世界和平", 30), RefreshPolicy::False)
            .await
            .unwrap();
        backend
    }

    async fn ids(backend: &InMemoryBackend, query: Value) -> Vec<String> {
        let response = backend
            .search(&json!({ "query": query, "sort": [{"timestamp": {"order": "asc"}}] }))
            .await
            .unwrap();
        response["hits"]["hits"]
            .as_array()
            .unwrap()
            .iter()
            .map(|hit| hit["_id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_bigram_tokens() {
        assert_eq!(bigram_tokens("你好世界"), vec!["你好", "好世", "世界"]);
        assert_eq!(bigram_tokens("你"), vec!["你"]);
        assert_eq!(bigram_tokens("Hello, 世界!"), vec!["hello", "世界"]);
        assert_eq!(bigram_tokens("ＡＢＣ"), vec!["abc"]);
        assert!(bigram_tokens("  ,, ").is_empty());
    }

    #[tokio::test]
    async fn test_fuzzy_and_exact_matching() {
        let backend = seeded().await;

        let fuzzy = json!({"multi_match": {"query": "你好", "fields": ["text", "caption"]}});
        assert_eq!(ids(&backend, fuzzy).await, vec!["100-1"]);

        let exact_partial =
            json!({"multi_match": {"query": "你好", "type": "phrase", "fields": ["text.exact"]}});
        assert!(ids(&backend, exact_partial).await.is_empty());

        let exact_full =
            json!({"multi_match": {"query": "你好世界", "type": "phrase", "fields": ["text.exact"]}});
        assert_eq!(ids(&backend, exact_full).await, vec!["100-1"]);

        let case_folded = json!({"match_phrase": {"text.exact": "hello world"}});
        assert_eq!(ids(&backend, case_folded).await, vec!["100-2"]);
    }

    #[tokio::test]
    async fn test_bool_filters_and_normalized_terms() {
        let backend = seeded().await;
        let query = json!({
            "bool": {
                "filter": [
                    {"term": {"senderUsername": "alice"}},
                    {"range": {"timestamp": {"gte": 15}}}
                ],
                "must_not": [{"term": {"chatID": 200}}]
            }
        });
        assert_eq!(ids(&backend, query).await, vec!["100-2"]);

        let either = json!({
            "bool": {
                "should": [{"term": {"chatID": 200}}, {"term": {"messageID": 2}}],
                "minimum_should_match": 1
            }
        });
        assert_eq!(ids(&backend, either).await, vec!["100-2", "200-1"]);
    }

    #[tokio::test]
    async fn test_nested_query_keeps_entity_fields_correlated() {
        let backend = seeded().await;
        let matching = json!({"nested": {"path": "entities", "query": {"bool": {"filter": [
            {"term": {"entities.type": "text_mention"}},
            {"term": {"entities.userID": 42}}
        ]}}}});
        assert_eq!(ids(&backend, matching).await.len(), 3);

        let crossed = json!({"nested": {"path": "entities", "query": {"bool": {"filter": [
            {"term": {"entities.type": "mention"}},
            {"term": {"entities.userID": 42}}
        ]}}}});
        assert!(ids(&backend, crossed).await.is_empty());
    }

    #[tokio::test]
    async fn test_sort_and_paging() {
        let backend = seeded().await;
        let response = backend
            .search(&json!({
                "query": {"match_all": {}},
                "sort": [{"timestamp": {"order": "desc"}}],
                "from": 1,
                "size": 1
            }))
            .await
            .unwrap();
        assert_eq!(response["hits"]["total"]["value"], 3);
        assert_eq!(response["hits"]["hits"][0]["_id"], "100-2");
    }

    #[tokio::test]
    async fn test_composite_pages_with_after_key() {
        let backend = seeded().await;
        backend
            .put_document("legacy-100-1", &doc(100, 1, "你好世界", 5), RefreshPolicy::False)
            .await
            .unwrap();

        let body = |after: Option<Value>| {
            let mut composite = json!({
                "size": 2,
                "sources": [
                    {"chat": {"terms": {"field": "chatID"}}},
                    {"message": {"terms": {"field": "messageID"}}}
                ]
            });
            if let Some(after) = after {
                composite["after"] = after;
            }
            json!({
                "size": 0,
                "aggs": {"groups": {
                    "composite": composite,
                    "aggs": {"latest": {"top_hits": {"size": 5, "sort": [{"timestamp": {"order": "desc"}}]}}}
                }}
            })
        };

        let first = backend.search(&body(None)).await.unwrap();
        let groups = &first["aggregations"]["groups"];
        assert_eq!(groups["buckets"][0]["key"], json!({"chat": 100, "message": 1}));
        assert_eq!(groups["buckets"][0]["doc_count"], 2);
        assert_eq!(
            groups["buckets"][0]["latest"]["hits"]["hits"][0]["_id"],
            "100-1"
        );
        assert!(first["hits"]["hits"].as_array().unwrap().is_empty());

        let second = backend
            .search(&body(Some(groups["after_key"].clone())))
            .await
            .unwrap();
        let buckets = second["aggregations"]["groups"]["buckets"].as_array().unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0]["key"], json!({"chat": 200, "message": 1}));

        let third = backend
            .search(&body(Some(second["aggregations"]["groups"]["after_key"].clone())))
            .await
            .unwrap();
        assert!(third["aggregations"]["groups"]["after_key"].is_null());
    }

    #[tokio::test]
    async fn test_update_and_delete_by_query() {
        let backend = seeded().await;
        let updated = backend
            .update_by_query(&json!({
                "query": {"term": {"chatID": 100}},
                "script": {"source": "...", "params": {"fields": {"isDeleted": true, "deletedAt": 99}}}
            }))
            .await
            .unwrap();
        assert_eq!(updated, 2);
        assert_eq!(
            backend.count(&json!({"query": {"term": {"isDeleted": true}}})).await.unwrap(),
            2
        );

        let deleted = backend
            .delete_by_query(&json!({"query": {"match_all": {}}}))
            .await
            .unwrap();
        assert_eq!(deleted, 3);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_rejects_unparseable_documents() {
        let backend = InMemoryBackend::new("messages");
        let response = backend
            .bulk(
                vec![
                    BulkOperation::Index {
                        id: "1-1".to_string(),
                        document: doc(1, 1, "ok", 1),
                    },
                    BulkOperation::Index {
                        id: "1-2".to_string(),
                        document: json!({"chatID": 1, "messageID": 2, "timestamp": "yesterday"}),
                    },
                    BulkOperation::Delete {
                        id: "9-9".to_string(),
                    },
                ],
                RefreshPolicy::True,
            )
            .await
            .unwrap();

        assert_eq!(response.items[0].status, 201);
        assert!(response.items[1]
            .error
            .as_deref()
            .unwrap()
            .contains("timestamp"));
        assert_eq!(response.items[2].status, 404);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_document_is_not_found() {
        let backend = InMemoryBackend::new("messages");
        let result = backend
            .update_document("1-1", &json!({"isDeleted": true}), RefreshPolicy::False)
            .await;
        assert!(matches!(result, Err(SearchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unsupported_query_is_reported() {
        let backend = seeded().await;
        let result = backend
            .search(&json!({"query": {"fuzzy": {"text": "hello"}}}))
            .await;
        assert!(matches!(result, Err(SearchError::UnsupportedQuery(_))));
    }
}
