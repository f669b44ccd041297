use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{
    Address, CartEntry, Category, Condition, Item, Location, PaymentStatus, Rental, RentalStatus, User,
};

// ---- request bodies ----

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub address: Option<Address>,
    #[serde(default)]
    pub is_seller: bool,
}

#[derive(Debug, Deserialize)]
pub struct SignInInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price_per_day: Option<f64>,
    pub images: Option<Vec<String>>,
    pub location: Option<Location>,
    pub availability: Option<bool>,
    pub condition: Option<String>,
    pub deposit: Option<f64>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatchInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price_per_day: Option<f64>,
    pub images: Option<Vec<String>>,
    pub location: Option<Location>,
    pub availability: Option<bool>,
    pub condition: Option<String>,
    pub deposit: Option<f64>,
}

/// Raw `GET /items` query. Kept as strings so blank form fields mean "no filter".
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartInput {
    pub item_id: Option<String>,
    pub quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct QuantityInput {
    pub quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRentalInput {
    pub item_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusInput {
    pub status: String,
}

/// Trimmed, non-empty value of a required text field.
pub fn required(value: Option<&str>, field: &str) -> Result<String, AppError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::validation(format!("{} is required", field))),
    }
}

/// Like `required`, but only checked when the field is present.
pub fn non_blank(value: Option<&str>, field: &str) -> Result<Option<String>, AppError> {
    value.map(|v| required(Some(v), field)).transpose()
}

// ---- responses ----

/// A reference that is either a bare id or the joined document.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Ref<T> {
    Id(String),
    Populated(T),
}

#[cfg(test)]
impl<T> Ref<T> {
    pub fn populated(&self) -> Option<&T> {
        match self {
            Ref::Populated(doc) => Some(doc),
            Ref::Id(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Option<Address>,
    pub is_admin: bool,
    pub is_seller: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        PublicUser {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            address: user.address.clone(),
            is_admin: user.is_admin,
            is_seller: user.is_seller,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl UserSummary {
    pub fn of(user: &User) -> Self {
        UserSummary {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            phone: None,
        }
    }

    pub fn with_phone(user: &User) -> Self {
        UserSummary {
            phone: Some(user.phone.clone()),
            ..UserSummary::of(user)
        }
    }
}

/// Relative image names are served from `<base>/uploads/`.
pub fn image_url(base_url: &str, image: &str) -> String {
    if image.starts_with("http") {
        image.to_string()
    } else {
        format!("{}/uploads/{}", base_url.trim_end_matches('/'), image)
    }
}

fn image_urls(base_url: &str, images: &[String]) -> Vec<String> {
    images.iter().map(|img| image_url(base_url, img)).collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub price_per_day: f64,
    pub images: Vec<String>,
    pub owner: Ref<UserSummary>,
    pub location: Option<Location>,
    pub availability: bool,
    pub condition: Condition,
    pub deposit: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemView {
    pub fn new(item: &Item, owner: Ref<UserSummary>, base_url: &str) -> Self {
        ItemView {
            id: item.id.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            category: item.category,
            price_per_day: item.price_per_day,
            images: image_urls(base_url, &item.images),
            owner,
            location: item.location.clone(),
            availability: item.availability,
            condition: item.condition,
            deposit: item.deposit,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub price_per_day: f64,
    pub images: Vec<String>,
}

impl ItemSummary {
    pub fn new(item: &Item, base_url: &str) -> Self {
        ItemSummary {
            id: item.id.clone(),
            title: item.title.clone(),
            price_per_day: item.price_per_day,
            images: image_urls(base_url, &item.images),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartEntryView {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub item_id: String,
    pub quantity: i64,
    /// `None` when the listing no longer resolves.
    pub item: Option<ItemSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartEntryView {
    pub fn new(entry: &CartEntry, item: Option<ItemSummary>) -> Self {
        CartEntryView {
            id: entry.id.clone(),
            user_id: entry.user_id.clone(),
            item_id: entry.item_id.clone(),
            quantity: entry.quantity,
            item,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

/// Outcome of `PUT /cart/{id}`.
#[derive(Debug, Clone)]
pub enum CartUpdate {
    Updated(CartEntryView),
    Removed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalView {
    #[serde(rename = "_id")]
    pub id: String,
    pub item: Ref<ItemSummary>,
    pub renter: Ref<UserSummary>,
    pub owner: Ref<UserSummary>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_cost: f64,
    pub status: RentalStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RentalView {
    pub fn new(
        rental: &Rental,
        item: Ref<ItemSummary>,
        renter: Ref<UserSummary>,
        owner: Ref<UserSummary>,
    ) -> Self {
        RentalView {
            id: rental.id.clone(),
            item,
            renter,
            owner,
            start_date: rental.start_date,
            end_date: rental.end_date,
            total_cost: rental.total_cost,
            status: rental.status,
            payment_status: rental.payment_status,
            created_at: rental.created_at,
            updated_at: rental.updated_at,
        }
    }
}
