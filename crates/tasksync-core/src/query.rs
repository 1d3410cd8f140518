//! Query statements and results
//!
//! A [`Query`] is a statement string plus named parameters, referenced in the
//! statement as `:name`. Results carry raw JSON documents; callers decode
//! them into their own types.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Named query parameters
pub type Params = Map<String, Value>;

/// A statement with its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    statement: String,
    params: Params,
}

impl Query {
    /// Create a query with no parameters
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Params::new(),
        }
    }

    /// Bind a parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Bind all parameters from a map
    pub fn with_params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

/// One document returned by a query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryItem {
    value: Value,
}

impl QueryItem {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// The raw document
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// A top-level field of the document
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.value.get(field)
    }

    /// The document's `_id`, if it is a string
    pub fn id(&self) -> Option<&str> {
        self.get("_id").and_then(Value::as_str)
    }

    /// Decode the document into a typed value
    pub fn deserialize_value<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value.clone())
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl From<Map<String, Value>> for QueryItem {
    fn from(map: Map<String, Value>) -> Self {
        Self::new(Value::Object(map))
    }
}

/// Result of executing a query
///
/// Selects fill `items`; inserts and updates fill `mutated_document_ids`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    items: Vec<QueryItem>,
    mutated_document_ids: Vec<String>,
}

impl QueryResult {
    /// Result of a select
    pub fn from_items(items: Vec<QueryItem>) -> Self {
        Self {
            items,
            mutated_document_ids: Vec::new(),
        }
    }

    /// Result of an insert or update
    pub fn from_mutation(mutated_document_ids: Vec<String>) -> Self {
        Self {
            items: Vec::new(),
            mutated_document_ids,
        }
    }

    pub fn items(&self) -> &[QueryItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<QueryItem> {
        self.items
    }

    pub fn first(&self) -> Option<&QueryItem> {
        self.items.first()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids of documents written by an insert or update
    pub fn mutated_document_ids(&self) -> &[String] {
        &self.mutated_document_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_query_params() {
        let query = Query::new("UPDATE tasks SET done = :done WHERE _id = :id")
            .param("done", true)
            .param("id", "abc");

        assert_eq!(query.params().get("done"), Some(&json!(true)));
        assert_eq!(query.params().get("id"), Some(&json!("abc")));
        assert!(query.statement().starts_with("UPDATE"));
    }

    #[test]
    fn test_item_accessors() {
        let item = QueryItem::new(json!({"_id": "t1", "title": "Walk dog"}));

        assert_eq!(item.id(), Some("t1"));
        assert_eq!(item.get("title"), Some(&json!("Walk dog")));
        assert!(item.get("missing").is_none());
    }

    #[test]
    fn test_item_deserialize() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(rename = "_id")]
            id: String,
            title: String,
        }

        let item = QueryItem::new(json!({"_id": "t1", "title": "Walk dog", "extra": 1}));
        let row: Row = item.deserialize_value().unwrap();
        assert_eq!(row.id, "t1");
        assert_eq!(row.title, "Walk dog");

        let bad = QueryItem::new(json!({"_id": 5}));
        assert!(bad.deserialize_value::<Row>().is_err());
    }

    #[test]
    fn test_result_kinds() {
        let select = QueryResult::from_items(vec![QueryItem::new(json!({"_id": "a"}))]);
        assert_eq!(select.len(), 1);
        assert_eq!(select.first().and_then(QueryItem::id), Some("a"));
        assert!(select.mutated_document_ids().is_empty());

        let mutation = QueryResult::from_mutation(vec!["a".to_string()]);
        assert!(mutation.is_empty());
        assert_eq!(mutation.mutated_document_ids(), ["a".to_string()]);
    }
}
