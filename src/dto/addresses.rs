use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::UserAddress;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SaveAddressRequest {
    pub label: String,
    pub full_name: String,
    pub phone: String,
    pub address_line: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AddressList {
    pub items: Vec<UserAddress>,
}
