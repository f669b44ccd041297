use std::collections::HashMap;

use crate::auth::Identity;
use crate::error::{AppError, Result};
use crate::models::CartEntry;
use crate::payloads::{required, AddToCartInput, CartEntryView, CartUpdate, ItemSummary};
use crate::state::AppState;

/// Largest quantity a single add or update may carry.
pub const MAX_QUANTITY: i64 = 1_000;

fn check_quantity(quantity: i64) -> Result<()> {
    if quantity > MAX_QUANTITY {
        return Err(AppError::validation(format!("quantity must be at most {}", MAX_QUANTITY)));
    }
    Ok(())
}

async fn item_summary(state: &AppState, item_id: &str) -> Result<Option<ItemSummary>> {
    Ok(state
        .store
        .find_item(item_id)
        .await?
        .map(|item| ItemSummary::new(&item, &state.base_url)))
}

async fn view(state: &AppState, entry: &CartEntry) -> Result<CartEntryView> {
    Ok(CartEntryView::new(entry, item_summary(state, &entry.item_id).await?))
}

pub async fn add(state: &AppState, identity: &Identity, input: AddToCartInput) -> Result<CartEntryView> {
    let item_id = required(input.item_id.as_deref(), "itemId")?;
    let quantity = input.quantity.unwrap_or(1);
    if quantity < 1 {
        return Err(AppError::validation("quantity must be at least 1"));
    }
    check_quantity(quantity)?;
    match state.store.find_item(&item_id).await? {
        Some(item) if !item.deleted => {}
        _ => return Err(AppError::not_found("Item not found")),
    }

    let entry = state
        .store
        .increment_cart(&identity.user_id, &item_id, quantity)
        .await?;
    log::debug!(
        "Cart of {} now holds {} x {}",
        identity.user_id,
        entry.quantity,
        entry.item_id
    );
    view(state, &entry).await
}

pub async fn list(state: &AppState, identity: &Identity) -> Result<Vec<CartEntryView>> {
    let entries = state.store.list_cart(&identity.user_id).await?;
    let mut items: HashMap<String, Option<ItemSummary>> = HashMap::new();
    let mut views = Vec::with_capacity(entries.len());
    for entry in &entries {
        if !items.contains_key(&entry.item_id) {
            let summary = item_summary(state, &entry.item_id).await?;
            items.insert(entry.item_id.clone(), summary);
        }
        let summary = items.get(&entry.item_id).cloned().flatten();
        views.push(CartEntryView::new(entry, summary));
    }
    Ok(views)
}

/// Sets the quantity of one of the caller's entries; zero or less removes it.
pub async fn set_quantity(state: &AppState, identity: &Identity, entry_id: &str, quantity: i64) -> Result<CartUpdate> {
    if quantity <= 0 {
        remove(state, identity, entry_id).await?;
        return Ok(CartUpdate::Removed);
    }
    check_quantity(quantity)?;
    let entry = state
        .store
        .set_cart_quantity(entry_id, &identity.user_id, quantity)
        .await?
        .ok_or_else(|| AppError::not_found("Cart item not found"))?;
    Ok(CartUpdate::Updated(view(state, &entry).await?))
}

pub async fn remove(state: &AppState, identity: &Identity, entry_id: &str) -> Result<()> {
    if !state.store.delete_cart_entry(entry_id, &identity.user_id).await? {
        return Err(AppError::not_found("Cart item not found"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{add_user, listed};
    use crate::state::testing;

    fn add_input(item_id: &str, quantity: Option<i64>) -> AddToCartInput {
        AddToCartInput {
            item_id: Some(item_id.to_string()),
            quantity,
        }
    }

    #[actix_web::test]
    async fn adding_twice_merges_into_one_entry() {
        let state = testing::state();
        add_user(&state, "o1").await;
        let item = listed(&state, "o1", "Drill", "Tools", 15.0).await;
        let renter = testing::caller("u1");

        add(&state, &renter, add_input(&item.id, Some(1))).await.unwrap();
        let merged = add(&state, &renter, add_input(&item.id, Some(2))).await.unwrap();
        assert_eq!(merged.quantity, 3);

        let cart = list(&state, &renter).await.unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].item_id, item.id);
        assert_eq!(cart[0].quantity, 3);
        let summary = cart[0].item.as_ref().expect("item joined");
        assert_eq!(summary.title, "Drill");
        assert_eq!(summary.price_per_day, 15.0);
    }

    #[actix_web::test]
    async fn quantity_defaults_to_one() {
        let state = testing::state();
        add_user(&state, "o1").await;
        let item = listed(&state, "o1", "Drill", "Tools", 15.0).await;
        let renter = testing::caller("u1");

        add(&state, &renter, add_input(&item.id, None)).await.unwrap();
        add(&state, &renter, add_input(&item.id, None)).await.unwrap();
        let cart = list(&state, &renter).await.unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, 2);
    }

    #[actix_web::test]
    async fn add_validates_request() {
        let state = testing::state();
        let renter = testing::caller("u1");
        let err = add(&state, &renter, AddToCartInput::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = add(&state, &renter, add_input("ghost", Some(1))).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        add_user(&state, "o1").await;
        let item = listed(&state, "o1", "Drill", "Tools", 15.0).await;
        let err = add(&state, &renter, add_input(&item.id, Some(0))).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[actix_web::test]
    async fn oversized_quantities_are_rejected() {
        let state = testing::state();
        add_user(&state, "o1").await;
        let item = listed(&state, "o1", "Drill", "Tools", 15.0).await;
        let renter = testing::caller("u1");

        let err = add(&state, &renter, add_input(&item.id, Some(i64::MAX))).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(list(&state, &renter).await.unwrap().is_empty());

        let entry = add(&state, &renter, add_input(&item.id, Some(MAX_QUANTITY))).await.unwrap();
        assert!(matches!(
            set_quantity(&state, &renter, &entry.id, MAX_QUANTITY + 1).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(list(&state, &renter).await.unwrap()[0].quantity, MAX_QUANTITY);
    }

    #[actix_web::test]
    async fn zero_quantity_removes_entry() {
        let state = testing::state();
        add_user(&state, "o1").await;
        let item = listed(&state, "o1", "Drill", "Tools", 15.0).await;
        let renter = testing::caller("u1");
        let entry = add(&state, &renter, add_input(&item.id, Some(1))).await.unwrap();

        match set_quantity(&state, &renter, &entry.id, 4).await.unwrap() {
            CartUpdate::Updated(updated) => assert_eq!(updated.quantity, 4),
            CartUpdate::Removed => panic!("entry should remain"),
        }
        assert!(matches!(
            set_quantity(&state, &renter, &entry.id, 0).await.unwrap(),
            CartUpdate::Removed
        ));
        assert!(list(&state, &renter).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn other_users_entries_are_not_found() {
        let state = testing::state();
        add_user(&state, "o1").await;
        let item = listed(&state, "o1", "Drill", "Tools", 15.0).await;
        let renter = testing::caller("u1");
        let stranger = testing::caller("u2");
        let entry = add(&state, &renter, add_input(&item.id, Some(1))).await.unwrap();

        assert!(matches!(
            set_quantity(&state, &stranger, &entry.id, 5).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            set_quantity(&state, &stranger, &entry.id, 0).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(remove(&state, &stranger, &entry.id).await, Err(AppError::NotFound(_))));
        assert_eq!(list(&state, &renter).await.unwrap()[0].quantity, 1);

        remove(&state, &renter, &entry.id).await.unwrap();
        assert!(matches!(remove(&state, &renter, &entry.id).await, Err(AppError::NotFound(_))));
    }
}
