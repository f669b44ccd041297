use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Address, CartEntry, Category, Condition, Item, Location, Rental, RentalStatus, User};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Catalog query, already validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    pub category: Option<Category>,
    pub search: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Restrict to one owner's listings, including ones marked unavailable.
    pub owner: Option<String>,
}

impl ItemFilter {
    pub fn matches(&self, item: &Item) -> bool {
        if item.deleted {
            return false;
        }
        let visible = match &self.owner {
            Some(owner) => &item.owner == owner,
            None => item.availability,
        };
        if !visible {
            return false;
        }
        if let Some(category) = self.category {
            if item.category != category {
                return false;
            }
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            if !item.title.to_lowercase().contains(&term) && !item.description.to_lowercase().contains(&term) {
                return false;
            }
        }
        self.min_price.map_or(true, |min| item.price_per_day >= min)
            && self.max_price.map_or(true, |max| item.price_per_day <= max)
    }
}

/// Validated partial update of a listing.
#[derive(Debug, Clone, Default)]
pub struct ItemChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub price_per_day: Option<f64>,
    pub images: Option<Vec<String>>,
    pub location: Option<Location>,
    pub availability: Option<bool>,
    pub condition: Option<Condition>,
    pub deposit: Option<f64>,
}

impl ItemChanges {
    pub fn apply(&self, item: &mut Item) {
        if let Some(title) = &self.title {
            item.title = title.clone();
        }
        if let Some(description) = &self.description {
            item.description = description.clone();
        }
        if let Some(category) = self.category {
            item.category = category;
        }
        if let Some(price) = self.price_per_day {
            item.price_per_day = price;
        }
        if let Some(images) = &self.images {
            item.images = images.clone();
        }
        if let Some(location) = &self.location {
            item.location = Some(location.clone());
        }
        if let Some(availability) = self.availability {
            item.availability = availability;
        }
        if let Some(condition) = self.condition {
            item.condition = condition;
        }
        if let Some(deposit) = self.deposit {
            item.deposit = deposit;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    /// Already hashed.
    pub password: Option<String>,
}

impl UserChanges {
    pub fn apply(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(phone) = &self.phone {
            user.phone = phone.clone();
        }
        if let Some(address) = &self.address {
            user.address = Some(address.clone());
        }
        if let Some(password) = &self.password {
            user.password = password.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RentalParty {
    Renter,
    Owner,
}

/// Persistence for users, listings, cart entries and rentals.
///
/// Each method is a single document operation; callers get no cross-document
/// atomicity. `increment_cart` and `transition_rental` are the only
/// read-modify-write operations and must be atomic in every implementation.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with a validation error when the email is taken.
    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn find_user(&self, id: &str) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn update_user(&self, id: &str, changes: &UserChanges) -> Result<Option<User>>;

    async fn insert_item(&self, item: &Item) -> Result<()>;
    /// Also returns soft-deleted items.
    async fn find_item(&self, id: &str) -> Result<Option<Item>>;
    /// Matching items in creation order.
    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>>;
    /// `None` when the item is absent or deleted.
    async fn update_item(&self, id: &str, changes: &ItemChanges) -> Result<Option<Item>>;
    /// Marks the item deleted and unavailable. `false` when there was nothing to delete.
    async fn soft_delete_item(&self, id: &str) -> Result<bool>;

    /// Adds `quantity` to the (user, item) entry, creating it when missing.
    async fn increment_cart(&self, user_id: &str, item_id: &str, quantity: i64) -> Result<CartEntry>;
    async fn list_cart(&self, user_id: &str) -> Result<Vec<CartEntry>>;
    async fn set_cart_quantity(&self, id: &str, user_id: &str, quantity: i64) -> Result<Option<CartEntry>>;
    async fn delete_cart_entry(&self, id: &str, user_id: &str) -> Result<bool>;

    async fn insert_rental(&self, rental: &Rental) -> Result<()>;
    async fn find_rental(&self, id: &str) -> Result<Option<Rental>>;
    /// Newest first.
    async fn list_rentals(&self, party: RentalParty, user_id: &str) -> Result<Vec<Rental>>;
    /// Compare-and-set on status. `None` when the rental is absent or no longer in `from`.
    async fn transition_rental(&self, id: &str, from: RentalStatus, to: RentalStatus) -> Result<Option<Rental>>;
}
