use chrono::Utc;
use uuid::Uuid;

use crate::accounts::current_user;
use crate::auth::Identity;
use crate::error::{AppError, Result};
use crate::models::{Category, Condition, Item};
use crate::payloads::{non_blank, required, ItemPatchInput, ItemQuery, ItemView, NewItem, Ref, UserSummary};
use crate::roles::{authorize, Capability};
use crate::state::AppState;
use crate::store::{ItemChanges, ItemFilter};

fn parse_category(raw: &str) -> Result<Category> {
    raw.trim().parse().map_err(AppError::Validation)
}

fn parse_condition(raw: &str) -> Result<Condition> {
    raw.trim().parse().map_err(AppError::Validation)
}

fn non_negative(value: f64, field: &str) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::validation(format!("{} must be zero or more", field)));
    }
    Ok(value)
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_price(raw: Option<String>, field: &str) -> Result<Option<f64>> {
    blank_to_none(raw)
        .map(|v| {
            v.parse::<f64>()
                .ok()
                .filter(|p| p.is_finite())
                .ok_or_else(|| AppError::validation(format!("{} must be a number", field)))
        })
        .transpose()
}

/// Turns the raw query string into a filter. Blank parameters mean "no filter".
pub fn parse_filter(query: ItemQuery) -> Result<ItemFilter> {
    Ok(ItemFilter {
        category: blank_to_none(query.category).map(|c| parse_category(&c)).transpose()?,
        search: blank_to_none(query.search),
        min_price: parse_price(query.min_price, "minPrice")?,
        max_price: parse_price(query.max_price, "maxPrice")?,
        owner: blank_to_none(query.owner),
    })
}

pub async fn list(state: &AppState, query: ItemQuery) -> Result<Vec<ItemView>> {
    let filter = parse_filter(query)?;
    let items = state.store.list_items(&filter).await?;
    Ok(items
        .iter()
        .map(|item| ItemView::new(item, Ref::Id(item.owner.clone()), &state.base_url))
        .collect())
}

async fn find_listed(state: &AppState, id: &str) -> Result<Item> {
    match state.store.find_item(id).await? {
        Some(item) if !item.deleted => Ok(item),
        _ => Err(AppError::not_found("Item not found")),
    }
}

async fn view_with_owner(state: &AppState, item: &Item) -> Result<ItemView> {
    let owner = match state.store.find_user(&item.owner).await? {
        Some(user) => Ref::Populated(UserSummary::with_phone(&user)),
        None => Ref::Id(item.owner.clone()),
    };
    Ok(ItemView::new(item, owner, &state.base_url))
}

pub async fn get(state: &AppState, id: &str) -> Result<ItemView> {
    let item = find_listed(state, id).await?;
    view_with_owner(state, &item).await
}

pub async fn create(state: &AppState, identity: &Identity, input: NewItem) -> Result<ItemView> {
    authorize(identity, Capability::Seller)?;

    let title = required(input.title.as_deref(), "title")?;
    let description = required(input.description.as_deref(), "description")?;
    let category = parse_category(&required(input.category.as_deref(), "category")?)?;
    let price_per_day = non_negative(
        input
            .price_per_day
            .ok_or_else(|| AppError::validation("pricePerDay is required"))?,
        "pricePerDay",
    )?;
    let deposit = non_negative(input.deposit.unwrap_or(0.0), "deposit")?;
    let condition = match input.condition.as_deref() {
        Some(raw) => parse_condition(raw)?,
        None => Condition::default(),
    };

    let owner = current_user(state, identity).await?;
    let now = Utc::now();
    let item = Item {
        id: Uuid::new_v4().to_string(),
        title,
        description,
        category,
        price_per_day,
        images: input.images.unwrap_or_default(),
        owner: owner.id,
        location: input.location,
        availability: input.availability.unwrap_or(true),
        condition,
        deposit,
        deleted: false,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_item(&item).await?;
    log::info!("User {} listed item {} ({})", item.owner, item.id, item.category);

    view_with_owner(state, &item).await
}

fn validate_patch(input: ItemPatchInput) -> Result<ItemChanges> {
    Ok(ItemChanges {
        title: non_blank(input.title.as_deref(), "title")?,
        description: non_blank(input.description.as_deref(), "description")?,
        category: input.category.as_deref().map(parse_category).transpose()?,
        price_per_day: input
            .price_per_day
            .map(|p| non_negative(p, "pricePerDay"))
            .transpose()?,
        images: input.images,
        location: input.location,
        availability: input.availability,
        condition: input.condition.as_deref().map(parse_condition).transpose()?,
        deposit: input.deposit.map(|d| non_negative(d, "deposit")).transpose()?,
    })
}

pub async fn update(state: &AppState, identity: &Identity, id: &str, input: ItemPatchInput) -> Result<ItemView> {
    let item = find_listed(state, id).await?;
    authorize(identity, Capability::OwnerOf(&item.owner))?;
    let changes = validate_patch(input)?;

    let updated = state
        .store
        .update_item(id, &changes)
        .await?
        .ok_or_else(|| AppError::not_found("Item not found"))?;
    view_with_owner(state, &updated).await
}

pub async fn delete(state: &AppState, identity: &Identity, id: &str) -> Result<()> {
    let item = find_listed(state, id).await?;
    authorize(identity, Capability::OwnerOf(&item.owner))?;

    if !state.store.soft_delete_item(id).await? {
        return Err(AppError::not_found("Item not found"));
    }
    log::info!("User {} deleted item {}", identity.user_id, id);
    Ok(())
}
