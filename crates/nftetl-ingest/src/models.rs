//! Collection records

use nftetl_db::{Row, SqlValue};
use serde::{Deserialize, Serialize};

/// A validated collection, ready to be inserted.
///
/// `id` and `created_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCollection {
    /// Marketplace slug
    pub collection: String,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub owner: Option<String>,
    pub twitter_username: Option<String>,
    /// Contract descriptors exactly as the marketplace returned them
    pub contracts: serde_json::Value,
}

impl NewCollection {
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("collection".to_string(), SqlValue::from(self.collection.as_str()));
        row.insert("name".to_string(), SqlValue::from(self.name.as_str()));
        row.insert("description".to_string(), SqlValue::from(self.description.clone()));
        row.insert("image_url".to_string(), SqlValue::from(self.image_url.clone()));
        row.insert("owner".to_string(), SqlValue::from(self.owner.clone()));
        row.insert(
            "twitter_username".to_string(),
            SqlValue::from(self.twitter_username.clone()),
        );
        row.insert("contracts".to_string(), SqlValue::Json(self.contracts.clone()));
        row
    }
}
