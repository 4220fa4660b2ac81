use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::{
    dto::addresses::{AddressList, SaveAddressRequest},
    entity::user_addresses::{
        ActiveModel as AddressActive, Column as AddressCol, Entity as UserAddresses,
        Model as AddressModel,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::UserAddress,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn list_addresses(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<AddressList>> {
    let items = UserAddresses::find()
        .filter(AddressCol::UserId.eq(user.user_id))
        .order_by_desc(AddressCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(address_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        AddressList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_address(
    state: &AppState,
    user: &AuthUser,
    payload: SaveAddressRequest,
) -> AppResult<ApiResponse<UserAddress>> {
    validate(&payload)?;

    let address = AddressActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        label: Set(payload.label),
        full_name: Set(payload.full_name),
        phone: Set(payload.phone),
        address_line: Set(payload.address_line),
        city: Set(payload.city),
        province: Set(payload.province),
        postal_code: Set(payload.postal_code),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(ApiResponse::success(
        "Address saved",
        address_from_entity(address),
        Some(Meta::empty()),
    ))
}

pub async fn update_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: SaveAddressRequest,
) -> AppResult<ApiResponse<UserAddress>> {
    validate(&payload)?;

    let existing = UserAddresses::find()
        .filter(
            Condition::all()
                .add(AddressCol::Id.eq(id))
                .add(AddressCol::UserId.eq(user.user_id)),
        )
        .one(&state.orm)
        .await?;
    let existing = match existing {
        Some(a) => a,
        None => return Err(AppError::NotFound),
    };

    let mut active: AddressActive = existing.into();
    active.label = Set(payload.label);
    active.full_name = Set(payload.full_name);
    active.phone = Set(payload.phone);
    active.address_line = Set(payload.address_line);
    active.city = Set(payload.city);
    active.province = Set(payload.province);
    active.postal_code = Set(payload.postal_code);
    let address = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Address updated",
        address_from_entity(address),
        Some(Meta::empty()),
    ))
}

pub async fn delete_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = UserAddresses::delete_many()
        .filter(
            Condition::all()
                .add(AddressCol::Id.eq(id))
                .add(AddressCol::UserId.eq(user.user_id)),
        )
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn validate(payload: &SaveAddressRequest) -> AppResult<()> {
    let required = [
        ("label", &payload.label),
        ("full_name", &payload.full_name),
        ("phone", &payload.phone),
        ("address_line", &payload.address_line),
        ("city", &payload.city),
        ("province", &payload.province),
        ("postal_code", &payload.postal_code),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("{field} is required")));
        }
    }
    Ok(())
}

fn address_from_entity(model: AddressModel) -> UserAddress {
    UserAddress {
        id: model.id,
        user_id: model.user_id,
        label: model.label,
        full_name: model.full_name,
        phone: model.phone,
        address_line: model.address_line,
        city: model.city,
        province: model.province,
        postal_code: model.postal_code,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SaveAddressRequest {
        SaveAddressRequest {
            label: "Home".into(),
            full_name: "Jamie Doe".into(),
            phone: "08123".into(),
            address_line: "1 Main St".into(),
            city: "Springfield".into(),
            province: "Central".into(),
            postal_code: "12345".into(),
        }
    }

    #[test]
    fn complete_address_passes_validation() {
        assert!(validate(&request()).is_ok());
    }

    #[test]
    fn blank_required_field_is_rejected() {
        let mut req = request();
        req.city = "   ".into();
        let err = validate(&req).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("city")));
    }
}
