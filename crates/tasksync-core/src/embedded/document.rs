//! Automerge-backed document collections
//!
//! Layout of the Automerge document:
//!
//! ```text
//! ROOT
//! ├── schema_version: 1
//! └── collections
//!     └── <collection name>
//!         └── <_id>: { _id, ...fields }
//! ```
//!
//! Documents cross this boundary as JSON objects; objects map to Automerge
//! maps, arrays to lists and everything else to scalars.

use automerge::{
    transaction::Transactable, AutoCommit, ObjId, ObjType, ReadDoc, ScalarValue,
    Value as AmValue, ROOT,
};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::StoreError;

/// Errors that can occur during document operations
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Automerge error: {0}")]
    Automerge(#[from] automerge::AutomergeError),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field type for {0}")]
    InvalidType(String),

    #[error("Document '{id}' already exists in collection '{collection}'")]
    AlreadyExists { collection: String, id: String },
}

impl From<DocumentError> for StoreError {
    fn from(error: DocumentError) -> Self {
        match error {
            DocumentError::Automerge(e) => StoreError::Automerge(e),
            DocumentError::AlreadyExists { collection, id } => {
                StoreError::DocumentExists { collection, id }
            }
            other => StoreError::InvalidDocument(other.to_string()),
        }
    }
}

mod keys {
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const COLLECTIONS: &str = "collections";
    pub const ID: &str = "_id";
}

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: u64 = 1;

/// Named collections of JSON-like documents stored in one Automerge document
pub struct CollectionsDocument {
    doc: AutoCommit,
}

impl CollectionsDocument {
    /// Create an empty document
    pub fn new() -> Result<Self, DocumentError> {
        let mut doc = AutoCommit::new();
        doc.put(ROOT, keys::SCHEMA_VERSION, CURRENT_SCHEMA_VERSION)?;
        doc.put_object(ROOT, keys::COLLECTIONS, ObjType::Map)?;
        Ok(Self { doc })
    }

    /// Load a document from Automerge bytes
    pub fn load(bytes: &[u8]) -> Result<Self, DocumentError> {
        let doc = AutoCommit::load(bytes)?;
        let loaded = Self { doc };
        // Reject byte streams that decode but don't have our layout
        loaded.collections_id()?;
        Ok(loaded)
    }

    /// Save the document to bytes
    pub fn save(&mut self) -> Vec<u8> {
        self.doc.save()
    }

    /// Copy of this document, with the same actor, for staging a change
    ///
    /// The copy replaces the original once the change is saved; if it is
    /// dropped instead, the original is untouched.
    pub fn fork(&mut self) -> Self {
        let actor = self.doc.get_actor().clone();
        let mut doc = self.doc.fork();
        doc.set_actor(actor);
        Self { doc }
    }

    /// Names of all collections that have ever held a document
    pub fn collection_names(&self) -> Result<Vec<String>, DocumentError> {
        let collections = self.collections_id()?;
        Ok(self.doc.keys(&collections).collect())
    }

    /// All documents in a collection, in `_id` order
    ///
    /// An unknown collection is empty, not an error.
    pub fn documents(&self, collection: &str) -> Result<Vec<Map<String, Value>>, DocumentError> {
        let Some(collection_id) = self.collection_id(collection)? else {
            return Ok(Vec::new());
        };

        let mut documents = Vec::new();
        for key in self.doc.keys(&collection_id) {
            if let Some((_, doc_id)) = self.doc.get(&collection_id, &key)? {
                documents.push(self.read_map(&doc_id)?);
            }
        }
        Ok(documents)
    }

    /// Get a single document by id
    pub fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Map<String, Value>>, DocumentError> {
        let Some(collection_id) = self.collection_id(collection)? else {
            return Ok(None);
        };

        match self.doc.get(&collection_id, id)? {
            Some((_, doc_id)) => Ok(Some(self.read_map(&doc_id)?)),
            None => Ok(None),
        }
    }

    /// Check whether a document exists
    pub fn contains(&self, collection: &str, id: &str) -> Result<bool, DocumentError> {
        let Some(collection_id) = self.collection_id(collection)? else {
            return Ok(false);
        };
        Ok(self.doc.get(&collection_id, id)?.is_some())
    }

    /// Insert a new document; its `_id` field must be a string
    pub fn insert(
        &mut self,
        collection: &str,
        document: &Map<String, Value>,
    ) -> Result<String, DocumentError> {
        let id = match document.get(keys::ID) {
            Some(Value::String(id)) => id.clone(),
            Some(_) => return Err(DocumentError::InvalidType(keys::ID.to_string())),
            None => return Err(DocumentError::MissingField(keys::ID.to_string())),
        };

        let collection_id = self.collection_id_or_create(collection)?;
        if self.doc.get(&collection_id, id.as_str())?.is_some() {
            return Err(DocumentError::AlreadyExists {
                collection: collection.to_string(),
                id,
            });
        }

        let doc_id = self
            .doc
            .put_object(&collection_id, id.as_str(), ObjType::Map)?;
        self.put_fields(&doc_id, document)?;
        Ok(id)
    }

    /// Overwrite top-level fields of an existing document
    ///
    /// Returns `false` if the document does not exist.
    pub fn update(
        &mut self,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<bool, DocumentError> {
        let Some(collection_id) = self.collection_id(collection)? else {
            return Ok(false);
        };
        let Some((_, doc_id)) = self.doc.get(&collection_id, id)? else {
            return Ok(false);
        };

        self.put_fields(&doc_id, fields)?;
        Ok(true)
    }

    // ==================== Private helpers ====================

    fn collections_id(&self) -> Result<ObjId, DocumentError> {
        self.doc
            .get(ROOT, keys::COLLECTIONS)?
            .map(|(_, id)| id)
            .ok_or_else(|| DocumentError::MissingField(keys::COLLECTIONS.to_string()))
    }

    fn collection_id(&self, name: &str) -> Result<Option<ObjId>, DocumentError> {
        let collections = self.collections_id()?;
        Ok(self.doc.get(&collections, name)?.map(|(_, id)| id))
    }

    fn collection_id_or_create(&mut self, name: &str) -> Result<ObjId, DocumentError> {
        if let Some(id) = self.collection_id(name)? {
            return Ok(id);
        }
        let collections = self.collections_id()?;
        Ok(self.doc.put_object(&collections, name, ObjType::Map)?)
    }

    fn put_fields(&mut self, obj: &ObjId, fields: &Map<String, Value>) -> Result<(), DocumentError> {
        for (key, value) in fields {
            self.put_value(obj, key, value)?;
        }
        Ok(())
    }

    fn put_value(&mut self, obj: &ObjId, key: &str, value: &Value) -> Result<(), DocumentError> {
        match value {
            Value::Object(map) => {
                let child = self.doc.put_object(obj, key, ObjType::Map)?;
                self.put_fields(&child, map)
            }
            Value::Array(items) => {
                let list = self.doc.put_object(obj, key, ObjType::List)?;
                self.insert_items(&list, items)
            }
            scalar => {
                self.doc.put(obj, key, json_to_scalar(scalar))?;
                Ok(())
            }
        }
    }

    fn insert_items(&mut self, list: &ObjId, items: &[Value]) -> Result<(), DocumentError> {
        for (index, item) in items.iter().enumerate() {
            match item {
                Value::Object(map) => {
                    let child = self.doc.insert_object(list, index, ObjType::Map)?;
                    self.put_fields(&child, map)?;
                }
                Value::Array(nested) => {
                    let child = self.doc.insert_object(list, index, ObjType::List)?;
                    self.insert_items(&child, nested)?;
                }
                scalar => self.doc.insert(list, index, json_to_scalar(scalar))?,
            }
        }
        Ok(())
    }

    fn read_map(&self, obj: &ObjId) -> Result<Map<String, Value>, DocumentError> {
        let mut map = Map::new();
        for key in self.doc.keys(obj) {
            if let Some((value, child)) = self.doc.get(obj, &key)? {
                let value = self.read_value(value, &child)?;
                map.insert(key, value);
            }
        }
        Ok(map)
    }

    fn read_list(&self, list: &ObjId) -> Result<Vec<Value>, DocumentError> {
        let len = self.doc.length(list);
        let mut items = Vec::with_capacity(len);
        for index in 0..len {
            if let Some((value, child)) = self.doc.get(list, index)? {
                items.push(self.read_value(value, &child)?);
            }
        }
        Ok(items)
    }

    fn read_value(&self, value: AmValue<'_>, id: &ObjId) -> Result<Value, DocumentError> {
        match value {
            AmValue::Object(ObjType::List) => Ok(Value::Array(self.read_list(id)?)),
            AmValue::Object(ObjType::Text) => Ok(Value::String(self.doc.text(id)?)),
            AmValue::Object(_) => Ok(Value::Object(self.read_map(id)?)),
            AmValue::Scalar(scalar) => Ok(scalar_to_json(scalar.as_ref())),
        }
    }
}

fn json_to_scalar(value: &Value) -> ScalarValue {
    match value {
        Value::Bool(b) => ScalarValue::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ScalarValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                ScalarValue::Uint(u)
            } else {
                n.as_f64().map(ScalarValue::F64).unwrap_or(ScalarValue::Null)
            }
        }
        Value::String(s) => ScalarValue::from(s.as_str()),
        _ => ScalarValue::Null,
    }
}

fn scalar_to_json(scalar: &ScalarValue) -> Value {
    match scalar {
        ScalarValue::Str(s) => Value::String(s.to_string()),
        ScalarValue::Int(i) => Value::from(*i),
        ScalarValue::Uint(u) => Value::from(*u),
        ScalarValue::F64(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ScalarValue::Timestamp(t) => Value::from(*t),
        ScalarValue::Boolean(b) => Value::Bool(*b),
        ScalarValue::Bytes(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        _ => Value::Null,
    }
}
