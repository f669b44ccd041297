use async_trait::async_trait;
use chrono::Utc;
use futures::stream::StreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::{Collection, Cursor, Database};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::{ItemChanges, ItemFilter, RentalParty, Store, UserChanges};
use crate::error::{AppError, Result};
use crate::models::{CartEntry, Item, Rental, RentalStatus, User};

pub const USERS: &str = "users";
pub const ITEMS: &str = "items";
pub const CARTS: &str = "carts";
pub const RENTALS: &str = "rentals";

#[derive(Clone)]
pub struct MongoStore {
    users: Collection<User>,
    items: Collection<Item>,
    carts: Collection<CartEntry>,
    rentals: Collection<Rental>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        MongoStore {
            users: db.collection(USERS),
            items: db.collection(ITEMS),
            carts: db.collection(CARTS),
            rentals: db.collection(RENTALS),
        }
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == 11000,
        ErrorKind::Command(e) => e.code == 11000,
        _ => false,
    }
}

fn to_bson<T: Serialize>(value: &T) -> Result<Bson> {
    bson::to_bson(value).map_err(|e| AppError::Internal(format!("Failed to encode document field: {}", e)))
}

fn now() -> bson::DateTime {
    bson::DateTime::from_chrono(Utc::now())
}

fn after() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

async fn collect<T>(mut cursor: Cursor<T>) -> Result<Vec<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let mut docs = Vec::new();
    while let Some(result) = cursor.next().await {
        docs.push(result?);
    }
    Ok(docs)
}

/// Escapes regex metacharacters so search terms match literally.
fn escape_regex(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn item_filter_document(filter: &ItemFilter) -> Document {
    let mut query = doc! { "deleted": { "$ne": true } };
    match &filter.owner {
        Some(owner) => query.insert("owner", owner.as_str()),
        None => query.insert("availability", true),
    };
    if let Some(category) = filter.category {
        query.insert("category", category.as_str());
    }
    if let Some(term) = &filter.search {
        let pattern = escape_regex(term);
        query.insert(
            "$or",
            vec![
                doc! { "title": { "$regex": pattern.as_str(), "$options": "i" } },
                doc! { "description": { "$regex": pattern.as_str(), "$options": "i" } },
            ],
        );
    }
    let mut price = Document::new();
    if let Some(min) = filter.min_price {
        price.insert("$gte", min);
    }
    if let Some(max) = filter.max_price {
        price.insert("$lte", max);
    }
    if !price.is_empty() {
        query.insert("pricePerDay", price);
    }
    query
}

fn item_set_document(changes: &ItemChanges) -> Result<Document> {
    let mut set = doc! { "updatedAt": now() };
    if let Some(title) = &changes.title {
        set.insert("title", title.as_str());
    }
    if let Some(description) = &changes.description {
        set.insert("description", description.as_str());
    }
    if let Some(category) = changes.category {
        set.insert("category", to_bson(&category)?);
    }
    if let Some(price) = changes.price_per_day {
        set.insert("pricePerDay", price);
    }
    if let Some(images) = &changes.images {
        set.insert("images", images.clone());
    }
    if let Some(location) = &changes.location {
        set.insert("location", to_bson(location)?);
    }
    if let Some(availability) = changes.availability {
        set.insert("availability", availability);
    }
    if let Some(condition) = changes.condition {
        set.insert("condition", to_bson(&condition)?);
    }
    if let Some(deposit) = changes.deposit {
        set.insert("deposit", deposit);
    }
    Ok(set)
}

fn user_set_document(changes: &UserChanges) -> Result<Document> {
    let mut set = doc! { "updatedAt": now() };
    if let Some(name) = &changes.name {
        set.insert("name", name.as_str());
    }
    if let Some(phone) = &changes.phone {
        set.insert("phone", phone.as_str());
    }
    if let Some(address) = &changes.address {
        set.insert("address", to_bson(address)?);
    }
    if let Some(password) = &changes.password {
        set.insert("password", password.as_str());
    }
    Ok(set)
}

#[async_trait]
impl Store for MongoStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        match self.users.insert_one(user, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(AppError::validation("Email already registered")),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users.find_one(doc! { "email": email }, None).await?)
    }

    async fn update_user(&self, id: &str, changes: &UserChanges) -> Result<Option<User>> {
        let update = doc! { "$set": user_set_document(changes)? };
        Ok(self
            .users
            .find_one_and_update(doc! { "_id": id }, update, after())
            .await?)
    }

    async fn insert_item(&self, item: &Item) -> Result<()> {
        self.items.insert_one(item, None).await?;
        Ok(())
    }

    async fn find_item(&self, id: &str) -> Result<Option<Item>> {
        Ok(self.items.find_one(doc! { "_id": id }, None).await?)
    }

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>> {
        let options = FindOptions::builder().sort(doc! { "createdAt": 1 }).build();
        let cursor = self.items.find(item_filter_document(filter), options).await?;
        collect(cursor).await
    }

    async fn update_item(&self, id: &str, changes: &ItemChanges) -> Result<Option<Item>> {
        let filter = doc! { "_id": id, "deleted": { "$ne": true } };
        let update = doc! { "$set": item_set_document(changes)? };
        Ok(self.items.find_one_and_update(filter, update, after()).await?)
    }

    async fn soft_delete_item(&self, id: &str) -> Result<bool> {
        let filter = doc! { "_id": id, "deleted": { "$ne": true } };
        let update = doc! { "$set": { "deleted": true, "availability": false, "updatedAt": now() } };
        let result = self.items.update_one(filter, update, None).await?;
        Ok(result.matched_count == 1)
    }

    async fn increment_cart(&self, user_id: &str, item_id: &str, quantity: i64) -> Result<CartEntry> {
        let filter = doc! { "userId": user_id, "itemId": item_id };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        // Two first-time adds can both try to insert; the unique (userId, itemId)
        // index rejects one, and the second attempt then hits the existing entry.
        let mut attempts = 0;
        loop {
            attempts += 1;
            let stamp = now();
            let update = doc! {
                "$inc": { "quantity": quantity },
                "$set": { "updatedAt": stamp },
                "$setOnInsert": { "_id": Uuid::new_v4().to_string(), "createdAt": stamp },
            };
            match self
                .carts
                .find_one_and_update(filter.clone(), update, options.clone())
                .await
            {
                Ok(Some(entry)) => return Ok(entry),
                Ok(None) => return Err(AppError::Internal("Cart upsert returned no document".into())),
                Err(e) if attempts < 2 && is_duplicate_key(&e) => {
                    log::debug!("Cart upsert raced for user {} item {}, retrying", user_id, item_id);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn list_cart(&self, user_id: &str) -> Result<Vec<CartEntry>> {
        let options = FindOptions::builder().sort(doc! { "createdAt": 1 }).build();
        let cursor = self.carts.find(doc! { "userId": user_id }, options).await?;
        collect(cursor).await
    }

    async fn set_cart_quantity(&self, id: &str, user_id: &str, quantity: i64) -> Result<Option<CartEntry>> {
        let update = doc! { "$set": { "quantity": quantity, "updatedAt": now() } };
        Ok(self
            .carts
            .find_one_and_update(doc! { "_id": id, "userId": user_id }, update, after())
            .await?)
    }

    async fn delete_cart_entry(&self, id: &str, user_id: &str) -> Result<bool> {
        let result = self
            .carts
            .delete_one(doc! { "_id": id, "userId": user_id }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn insert_rental(&self, rental: &Rental) -> Result<()> {
        self.rentals.insert_one(rental, None).await?;
        Ok(())
    }

    async fn find_rental(&self, id: &str) -> Result<Option<Rental>> {
        Ok(self.rentals.find_one(doc! { "_id": id }, None).await?)
    }

    async fn list_rentals(&self, party: RentalParty, user_id: &str) -> Result<Vec<Rental>> {
        let filter = match party {
            RentalParty::Renter => doc! { "renter": user_id },
            RentalParty::Owner => doc! { "owner": user_id },
        };
        let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
        let cursor = self.rentals.find(filter, options).await?;
        collect(cursor).await
    }

    async fn transition_rental(&self, id: &str, from: RentalStatus, to: RentalStatus) -> Result<Option<Rental>> {
        let filter = doc! { "_id": id, "status": from.as_str() };
        let update = doc! { "$set": { "status": to.as_str(), "updatedAt": now() } };
        Ok(self.rentals.find_one_and_update(filter, update, after()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    #[test]
    fn search_terms_are_escaped() {
        assert_eq!(escape_regex("a+b (c)"), "a\\+b \\(c\\)");
        assert_eq!(escape_regex("plain"), "plain");
    }

    #[test]
    fn public_listing_requires_availability() {
        let query = item_filter_document(&ItemFilter::default());
        assert_eq!(query.get_bool("availability").unwrap(), true);
        assert!(query.get("owner").is_none());
    }

    #[test]
    fn owner_listing_drops_availability() {
        let query = item_filter_document(&ItemFilter {
            owner: Some("o1".into()),
            ..Default::default()
        });
        assert_eq!(query.get_str("owner").unwrap(), "o1");
        assert!(query.get("availability").is_none());
    }

    #[test]
    fn price_and_category_bounds() {
        let query = item_filter_document(&ItemFilter {
            category: Some(Category::Tools),
            min_price: Some(10.0),
            max_price: Some(20.0),
            ..Default::default()
        });
        assert_eq!(query.get_str("category").unwrap(), "Tools");
        let price = query.get_document("pricePerDay").unwrap();
        assert_eq!(price.get_f64("$gte").unwrap(), 10.0);
        assert_eq!(price.get_f64("$lte").unwrap(), 20.0);
    }

    #[test]
    fn set_document_only_has_changed_fields() {
        let set = item_set_document(&ItemChanges {
            availability: Some(false),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(set.get_bool("availability").unwrap(), false);
        assert!(set.contains_key("updatedAt"));
        assert!(!set.contains_key("title"));
        assert!(!set.contains_key("pricePerDay"));
    }
}
