use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::models::ShopItem;

/// Distinguishes an explicit `null` (clear the column) from an absent field
/// (keep the current value) on update payloads.
fn nullable_update<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateItemRequest {
    pub name: String,
    pub description: Option<String>,
    /// Price in cents.
    pub price: i64,
    pub category: String,
    pub stock: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    pub image_url: Option<String>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable_update")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub price: Option<i64>,
    pub category: Option<String>,
    pub stock: Option<i32>,
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "nullable_update")]
    #[schema(value_type = Option<String>)]
    pub image_url: Option<Option<String>>,
}

#[derive(Serialize, ToSchema)]
pub struct ItemList {
    pub items: Vec<ShopItem>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct CategoryInfo {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryList {
    pub items: Vec<CategoryInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_request_distinguishes_null_from_absent() {
        let absent: UpdateItemRequest = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
        assert_eq!(absent.description, None);

        let cleared: UpdateItemRequest =
            serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));

        let set: UpdateItemRequest =
            serde_json::from_str(r#"{"description": "silk lining"}"#).unwrap();
        assert_eq!(set.description, Some(Some("silk lining".to_string())));
    }
}
