//! Raw collection object → [`NewCollection`]

use serde_json::{Map, Value};

use crate::error::{EtlError, Result};
use crate::models::NewCollection;

/// Descriptions are cut to this many characters.
pub const MAX_DESCRIPTION_CHARS: usize = 5000;

/// Map one raw marketplace object to a collection row.
///
/// Fails with [`EtlError::Transform`] when `collection` or `name` is missing,
/// empty or not a string. Optional fields that are absent, empty or of the
/// wrong type become `None`; `contracts` is kept exactly as received.
pub fn transform(raw: &Value) -> Result<NewCollection> {
    let object = raw
        .as_object()
        .ok_or_else(|| EtlError::transform("record", "is not a JSON object"))?;

    let collection = required_string(object, "collection")?;
    let name = required_string(object, "name")?;

    let description = optional_string(object, "description").map(|d| truncate_chars(d, MAX_DESCRIPTION_CHARS));

    let image_url = optional_string(object, "image_url")
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"));

    let owner = optional_string(object, "owner");

    let twitter_username = optional_string(object, "twitter_username")
        .map(|handle| handle.trim_start_matches('@').trim().to_string())
        .filter(|handle| !handle.is_empty());

    let contracts = match object.get("contracts") {
        None | Some(Value::Null) => Value::Array(Vec::new()),
        Some(contracts) => contracts.clone(),
    };

    Ok(NewCollection {
        collection,
        name,
        description,
        image_url,
        owner,
        twitter_username,
        contracts,
    })
}

fn required_string(object: &Map<String, Value>, field: &str) -> Result<String> {
    match object.get(field) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        None | Some(Value::Null) | Some(Value::String(_)) => {
            Err(EtlError::transform(field, "is missing or empty"))
        },
        Some(_) => Err(EtlError::transform(field, "must be a string")),
    }
}

/// Trimmed, non-empty string value of `field`
fn optional_string(object: &Map<String, Value>, field: &str) -> Option<String> {
    object
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn truncate_chars(value: String, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((byte_index, _)) => value[..byte_index].to_string(),
        None => value,
    }
}
