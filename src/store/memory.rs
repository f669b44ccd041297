use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{ItemChanges, ItemFilter, RentalParty, Store, UserChanges};
use crate::error::{AppError, Result};
use crate::models::{CartEntry, Item, Rental, RentalStatus, User};

/// In-memory `Store` for tests and for running without a database.
/// Vectors keep insertion order, which stands in for creation order.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    users: Arc<Mutex<Vec<User>>>,
    items: Arc<Mutex<Vec<Item>>>,
    carts: Arc<Mutex<Vec<CartEntry>>>,
    rentals: Arc<Mutex<Vec<Rental>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut users = lock(&self.users);
        if users.iter().any(|u| u.email == user.email) {
            return Err(AppError::validation("Email already registered"));
        }
        users.push(user.clone());
        Ok(())
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>> {
        Ok(lock(&self.users).iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(lock(&self.users).iter().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, id: &str, changes: &UserChanges) -> Result<Option<User>> {
        let mut users = lock(&self.users);
        Ok(users.iter_mut().find(|u| u.id == id).map(|user| {
            changes.apply(user);
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn insert_item(&self, item: &Item) -> Result<()> {
        lock(&self.items).push(item.clone());
        Ok(())
    }

    async fn find_item(&self, id: &str) -> Result<Option<Item>> {
        Ok(lock(&self.items).iter().find(|i| i.id == id).cloned())
    }

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>> {
        Ok(lock(&self.items).iter().filter(|i| filter.matches(i)).cloned().collect())
    }

    async fn update_item(&self, id: &str, changes: &ItemChanges) -> Result<Option<Item>> {
        let mut items = lock(&self.items);
        Ok(items.iter_mut().find(|i| i.id == id && !i.deleted).map(|item| {
            changes.apply(item);
            item.updated_at = Utc::now();
            item.clone()
        }))
    }

    async fn soft_delete_item(&self, id: &str) -> Result<bool> {
        let mut items = lock(&self.items);
        match items.iter_mut().find(|i| i.id == id && !i.deleted) {
            Some(item) => {
                item.deleted = true;
                item.availability = false;
                item.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment_cart(&self, user_id: &str, item_id: &str, quantity: i64) -> Result<CartEntry> {
        // The guard spans lookup and write, so concurrent adds cannot lose an increment.
        let mut carts = lock(&self.carts);
        let now = Utc::now();
        if let Some(entry) = carts.iter_mut().find(|c| c.user_id == user_id && c.item_id == item_id) {
            entry.quantity = entry
                .quantity
                .checked_add(quantity)
                .ok_or_else(|| AppError::validation("quantity is too large"))?;
            entry.updated_at = now;
            return Ok(entry.clone());
        }
        let entry = CartEntry {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            item_id: item_id.to_string(),
            quantity,
            created_at: now,
            updated_at: now,
        };
        carts.push(entry.clone());
        Ok(entry)
    }

    async fn list_cart(&self, user_id: &str) -> Result<Vec<CartEntry>> {
        Ok(lock(&self.carts).iter().filter(|c| c.user_id == user_id).cloned().collect())
    }

    async fn set_cart_quantity(&self, id: &str, user_id: &str, quantity: i64) -> Result<Option<CartEntry>> {
        let mut carts = lock(&self.carts);
        Ok(carts
            .iter_mut()
            .find(|c| c.id == id && c.user_id == user_id)
            .map(|entry| {
                entry.quantity = quantity;
                entry.updated_at = Utc::now();
                entry.clone()
            }))
    }

    async fn delete_cart_entry(&self, id: &str, user_id: &str) -> Result<bool> {
        let mut carts = lock(&self.carts);
        let before = carts.len();
        carts.retain(|c| !(c.id == id && c.user_id == user_id));
        Ok(carts.len() != before)
    }

    async fn insert_rental(&self, rental: &Rental) -> Result<()> {
        lock(&self.rentals).push(rental.clone());
        Ok(())
    }

    async fn find_rental(&self, id: &str) -> Result<Option<Rental>> {
        Ok(lock(&self.rentals).iter().find(|r| r.id == id).cloned())
    }

    async fn list_rentals(&self, party: RentalParty, user_id: &str) -> Result<Vec<Rental>> {
        let rentals = lock(&self.rentals);
        let mut found: Vec<Rental> = rentals
            .iter()
            .rev()
            .filter(|r| match party {
                RentalParty::Renter => r.renter == user_id,
                RentalParty::Owner => r.owner == user_id,
            })
            .cloned()
            .collect();
        // Stable sort: equal timestamps keep reverse insertion order.
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn transition_rental(&self, id: &str, from: RentalStatus, to: RentalStatus) -> Result<Option<Rental>> {
        let mut rentals = lock(&self.rentals);
        Ok(rentals
            .iter_mut()
            .find(|r| r.id == id && r.status == from)
            .map(|rental| {
                rental.status = to;
                rental.updated_at = Utc::now();
                rental.clone()
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn increment_merges_per_user_and_item() {
        let store = MemoryStore::new();
        let first = store.increment_cart("u1", "i1", 1).await.unwrap();
        let second = store.increment_cart("u1", "i1", 2).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, 3);

        store.increment_cart("u2", "i1", 1).await.unwrap();
        store.increment_cart("u1", "i2", 1).await.unwrap();
        assert_eq!(store.list_cart("u1").await.unwrap().len(), 2);
        assert_eq!(store.list_cart("u2").await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn increment_refuses_to_overflow() {
        let store = MemoryStore::new();
        store.increment_cart("u1", "i1", i64::MAX).await.unwrap();
        let err = store.increment_cart("u1", "i1", 1).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.list_cart("u1").await.unwrap()[0].quantity, i64::MAX);
    }

    #[actix_web::test]
    async fn cart_entries_are_scoped_to_their_user() {
        let store = MemoryStore::new();
        let entry = store.increment_cart("u1", "i1", 1).await.unwrap();
        assert!(store.set_cart_quantity(&entry.id, "u2", 5).await.unwrap().is_none());
        assert!(!store.delete_cart_entry(&entry.id, "u2").await.unwrap());
        assert!(store.delete_cart_entry(&entry.id, "u1").await.unwrap());
        assert!(store.list_cart("u1").await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn concurrent_increments_are_not_lost() {
        let store = MemoryStore::new();
        let adds = (0..50).map(|_| {
            let store = store.clone();
            async move { store.increment_cart("u1", "i1", 1).await }
        });
        for result in futures::future::join_all(adds).await {
            result.unwrap();
        }
        let cart = store.list_cart("u1").await.unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, 50);
    }
}
