//! The unit of data flowing between nodes.
//!
//! An item is a JSON object with optional binary attachments and lineage
//! pointers recording which input item(s) produced it. Lineage is fixed at
//! construction: nodes either pair an item explicitly (`Item::derive`) or
//! leave it empty for the output router to complete.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// A JSON object, the payload of every item.
pub type JsonObject = serde_json::Map<String, JsonValue>;

/// Points at the input item an output item was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairedItem {
    /// Index of the input pin.
    #[serde(default)]
    pub input: usize,
    /// Index of the item within that pin's data.
    pub item: usize,
}

impl PairedItem {
    /// Pairs with item `item` of the first input pin.
    #[must_use]
    pub const fn new(item: usize) -> Self {
        Self { input: 0, item }
    }

    #[must_use]
    pub const fn from_input(input: usize, item: usize) -> Self {
        Self { input, item }
    }
}

/// A named binary attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryData {
    /// Base64 encoded content.
    pub data: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// A single data item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    json: JsonObject,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    binary: BTreeMap<String, BinaryData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    paired_item: Vec<PairedItem>,
}

impl Item {
    /// Creates an item without lineage.
    ///
    /// Nodes with inputs may return such items when their output maps 1:1
    /// onto a single input pin; the router fills in the lineage.
    #[must_use]
    pub fn new(json: JsonObject) -> Self {
        Self {
            json,
            binary: BTreeMap::new(),
            paired_item: Vec::new(),
        }
    }

    /// Creates an item from any JSON value.
    ///
    /// Objects are used as-is; other values are wrapped as `{ "data": value }`.
    #[must_use]
    pub fn from_value(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(json) => Self::new(json),
            other => {
                let mut json = JsonObject::new();
                json.insert("data".to_string(), other);
                Self::new(json)
            }
        }
    }

    /// Creates an item produced from input item `index` of the first pin.
    #[must_use]
    pub fn derive(json: JsonObject, index: usize) -> Self {
        Self::derive_from(json, vec![PairedItem::new(index)])
    }

    /// Creates an item produced from several input items, e.g. by a merge.
    #[must_use]
    pub fn derive_from(json: JsonObject, parents: Vec<PairedItem>) -> Self {
        Self {
            json,
            binary: BTreeMap::new(),
            paired_item: parents,
        }
    }

    /// Copies `source`'s data into a new item paired with input item `index`.
    #[must_use]
    pub fn passthrough(source: &Item, index: usize) -> Self {
        Self {
            json: source.json.clone(),
            binary: source.binary.clone(),
            paired_item: vec![PairedItem::new(index)],
        }
    }

    /// Attaches a binary property.
    #[must_use]
    pub fn with_binary(mut self, name: impl Into<String>, data: BinaryData) -> Self {
        self.binary.insert(name.into(), data);
        self
    }

    #[must_use]
    pub fn json(&self) -> &JsonObject {
        &self.json
    }

    #[must_use]
    pub fn into_json(self) -> JsonObject {
        self.json
    }

    /// Returns a top-level json property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.json.get(key)
    }

    #[must_use]
    pub fn binary(&self) -> &BTreeMap<String, BinaryData> {
        &self.binary
    }

    #[must_use]
    pub fn paired_item(&self) -> &[PairedItem] {
        &self.paired_item
    }

    #[must_use]
    pub fn has_lineage(&self) -> bool {
        !self.paired_item.is_empty()
    }

    /// Sets lineage on an item that has none. Existing lineage is never replaced.
    pub(crate) fn inherit_lineage(&mut self, paired: PairedItem) {
        if self.paired_item.is_empty() {
            self.paired_item.push(paired);
        }
    }
}

/// Copies the named json properties of an item; missing properties become `null`.
#[must_use]
pub fn copy_properties<S: AsRef<str>>(item: &Item, properties: &[S]) -> JsonObject {
    properties
        .iter()
        .map(|property| {
            let property = property.as_ref();
            let value = item.get(property).cloned().unwrap_or(JsonValue::Null);
            (property.to_string(), value)
        })
        .collect()
}

/// Copies json properties into renamed columns.
///
/// `columns` lists `(column, source property)` pairs.
#[must_use]
pub fn copy_columns<C: AsRef<str>, P: AsRef<str>>(item: &Item, columns: &[(C, P)]) -> JsonObject {
    columns
        .iter()
        .map(|(column, property)| {
            let value = item
                .get(property.as_ref())
                .cloned()
                .unwrap_or(JsonValue::Null);
            (column.as_ref().to_string(), value)
        })
        .collect()
}

/// Applies [`copy_properties`] to every item.
#[must_use]
pub fn items_copy<S: AsRef<str>>(items: &[Item], properties: &[S]) -> Vec<JsonObject> {
    items
        .iter()
        .map(|item| copy_properties(item, properties))
        .collect()
}

/// Turns plain objects into lineage-less items for the router to complete.
#[must_use]
pub fn wrap_data(objects: Vec<JsonObject>) -> Vec<Item> {
    objects.into_iter().map(Item::new).collect()
}
