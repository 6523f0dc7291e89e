//! GitHub GraphQL request building and response decoding for batched lookups.
//!
//! Each query becomes an aliased `object(expression:)` field named `q<index>`.
//! Aliases never leave this module: decoding maps them straight back to the
//! query index.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{
    BatchQuery, BatchResult, QueryKind, RemoteBlob, RemoteError, RemoteObject, RemoteTreeEntry,
};
use crate::store::EntryKind;
use crate::types::Namespace;

const BLOB_FRAGMENT: &str = "fragment BlobFields on Blob { oid text }";
const TREE_FRAGMENT: &str =
    "fragment TreeFields on Tree { entries { name path type object { ...BlobFields } } }";

fn alias(index: usize) -> String {
    format!("q{}", index)
}

/// Builds the JSON request body (`query` + `variables`) for a batch.
///
/// Only the fields for each query's expected kind are selected. An object of
/// the other kind still reports its `__typename` and decodes to no result.
pub fn build_request(ns: &Namespace, queries: &[BatchQuery]) -> Value {
    let mut declarations = vec!["$owner: String!".to_string(), "$name: String!".to_string()];
    let mut fields = Vec::with_capacity(queries.len());
    let mut variables = Map::new();
    variables.insert("owner".to_string(), json!(ns.owner()));
    variables.insert("name".to_string(), json!(ns.repo()));

    for query in queries {
        let var = format!("e{}", query.index);
        let selection = match query.kind {
            QueryKind::Tree => "...TreeFields",
            QueryKind::Blob => "...BlobFields",
        };
        declarations.push(format!("${}: String!", var));
        fields.push(format!(
            "{}: object(expression: ${}) {{ __typename {} }}",
            alias(query.index),
            var,
            selection
        ));
        variables.insert(var, json!(query.expression));
    }

    // GraphQL rejects unused fragments. TreeFields spreads BlobFields, so the
    // blob fragment is always used.
    let mut fragments = vec![BLOB_FRAGMENT];
    if queries.iter().any(|q| q.kind == QueryKind::Tree) {
        fragments.push(TREE_FRAGMENT);
    }

    let query = format!(
        "query({}) {{ repository(owner: $owner, name: $name) {{ {} }} }}\n{}",
        declarations.join(", "),
        fields.join(" "),
        fragments.join("\n")
    );

    json!({ "query": query, "variables": variables })
}

#[derive(Debug, Deserialize)]
struct Response {
    data: Option<Data>,
    #[serde(default)]
    errors: Vec<ErrorNode>,
}

#[derive(Debug, Deserialize)]
struct ErrorNode {
    message: String,
    /// Response path of the failing field, e.g. `["repository", "q1"]`.
    #[serde(default)]
    path: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Data {
    repository: Option<HashMap<String, Option<ObjectNode>>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum ObjectNode {
    Tree {
        #[serde(default)]
        entries: Vec<EntryNode>,
    },
    Blob(BlobNode),
    #[serde(other)]
    Other,
}

/// `oid` is absent when a tree query resolved to a blob.
#[derive(Debug, Deserialize)]
struct BlobNode {
    oid: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntryNode {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    object: Option<EntryObject>,
}

/// Tree children only carry blob fields; for subtrees the object is `{}`.
#[derive(Debug, Deserialize)]
struct EntryObject {
    oid: Option<String>,
    text: Option<String>,
}

fn convert_entry(entry: EntryNode) -> Option<RemoteTreeEntry> {
    let Some(kind) = EntryKind::from_git_type(&entry.kind) else {
        log::debug!("skipping {} entry {}", entry.kind, entry.path);
        return None;
    };

    let blob = match (kind, entry.object) {
        (EntryKind::Blob, Some(EntryObject { oid: Some(oid), text })) => {
            Some(RemoteBlob { text, oid })
        }
        _ => None,
    };

    Some(RemoteTreeEntry {
        name: entry.name,
        path: entry.path,
        kind,
        blob,
    })
}

/// Names the failing query in an error message when the error carries an
/// alias path.
fn describe_error(error: ErrorNode, queries: &[BatchQuery]) -> String {
    let expression = error
        .path
        .iter()
        .filter_map(Value::as_str)
        .find_map(|segment| queries.iter().find(|q| alias(q.index) == segment))
        .map(|q| q.expression.as_str());
    match expression {
        Some(expression) => format!("{}: {}", expression, error.message),
        None => error.message,
    }
}

fn convert_object(kind: QueryKind, node: Option<ObjectNode>) -> Option<RemoteObject> {
    match (kind, node?) {
        (QueryKind::Tree, ObjectNode::Tree { entries }) => Some(RemoteObject::Tree(
            entries.into_iter().filter_map(convert_entry).collect(),
        )),
        (QueryKind::Blob, ObjectNode::Blob(BlobNode { oid: Some(oid), text })) => {
            Some(RemoteObject::Blob(RemoteBlob { text, oid }))
        }
        _ => None,
    }
}

/// Decodes a response body into one result per query, in query order.
///
/// Any error entry fails the whole batch, even when `data` is partially
/// filled in. A path that does not exist resolves to `null` without an
/// error and decodes to a result with no object.
pub fn parse_response(
    ns: &Namespace,
    queries: &[BatchQuery],
    body: &str,
) -> Result<Vec<BatchResult>, RemoteError> {
    let response: Response =
        serde_json::from_str(body).map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

    let Some(data) = response.data else {
        if response.errors.is_empty() {
            return Err(RemoteError::InvalidResponse("missing data".to_string()));
        }
        return Err(RemoteError::Query(
            response.errors.into_iter().map(|e| e.message).collect(),
        ));
    };

    let Some(mut objects) = data.repository else {
        return Err(RemoteError::RepositoryNotFound(ns.key.to_string()));
    };

    if !response.errors.is_empty() {
        return Err(RemoteError::Query(
            response
                .errors
                .into_iter()
                .map(|e| describe_error(e, queries))
                .collect(),
        ));
    }

    Ok(queries
        .iter()
        .map(|query| BatchResult {
            index: query.index,
            object: convert_object(query.kind, objects.remove(&alias(query.index)).flatten()),
        })
        .collect())
}
