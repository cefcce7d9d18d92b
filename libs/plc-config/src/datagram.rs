//! Datagram: a named, ordered batch of data items read or written together

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::item::DataItem;

/// Datagram declaration as written in configuration files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatagramConfig {
    pub id: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub items: Vec<DataItem>,
}

/// Ordered batch of items with a code index
///
/// Declaration order is preserved for request assembly and logging. The code
/// index keeps the first position of each code; later duplicates are still
/// part of `items()` and are reported by validation.
#[derive(Debug, Clone)]
pub struct Datagram {
    id: String,
    comment: String,
    items: Vec<DataItem>,
    index: HashMap<String, usize>,
}

impl Datagram {
    pub fn new(id: impl Into<String>, comment: impl Into<String>, items: Vec<DataItem>) -> Self {
        let id = id.into();
        let mut items = items;
        for item in &mut items {
            item.set_datagram_id(Some(id.clone()));
        }

        let mut index = HashMap::with_capacity(items.len());
        for (pos, item) in items.iter().enumerate() {
            index.entry(item.code().to_string()).or_insert(pos);
        }

        Self {
            id,
            comment: comment.into(),
            items,
            index,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Items in declaration order
    pub fn items(&self) -> &[DataItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up an item by its exact code
    pub fn item(&self, code: &str) -> Option<&DataItem> {
        self.index.get(code).map(|&pos| &self.items[pos])
    }

    /// Items that resolve to a transport tag, in declaration order
    pub fn resolvable_items(&self) -> impl Iterator<Item = &DataItem> {
        self.items.iter().filter(|item| item.is_resolvable())
    }

    /// Codes declared more than once, each reported once
    pub fn duplicate_codes(&self) -> Vec<&str> {
        let mut duplicates = Vec::new();
        for (pos, item) in self.items.iter().enumerate() {
            let first = self.index.get(item.code()).copied();
            if first != Some(pos) && !duplicates.contains(&item.code()) {
                duplicates.push(item.code());
            }
        }
        duplicates
    }

    /// `<comment><id>` label used in log titles
    pub fn label(&self) -> String {
        format!("{}{}", self.comment, self.id)
    }
}

impl From<DatagramConfig> for Datagram {
    fn from(config: DatagramConfig) -> Self {
        Self::new(config.id, config.comment, config.items)
    }
}
