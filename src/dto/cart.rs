use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_variant_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartList {
    pub items: Vec<CartLineDto>,
}

/// A cart line joined with the live product and variant it points at.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineDto {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_variant_id: Uuid,
    pub name: String,
    pub color: String,
    pub size: String,
    pub price: i64,
    pub stock: i32,
    pub image_url: Option<String>,
    pub quantity: i32,
}
