use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{AppError, Result};
use crate::models::{Item, PaymentStatus, Rental, RentalStatus, User};
use crate::payloads::{required, ItemSummary, NewRentalInput, Ref, RentalView, UserSummary};
use crate::roles::{authorize, Capability};
use crate::state::AppState;
use crate::store::RentalParty;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| AppError::validation(format!("{} is not a valid date", field)))
}

/// Whole days billed for the range, rounding any partial day up. Zero or
/// negative when `end` is not after `start`.
pub fn billable_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let ms = (end - start).num_milliseconds();
    if ms <= 0 {
        return ms.signum();
    }
    (ms + DAY_MS - 1) / DAY_MS
}

/// Caches joined documents while building a batch of views.
#[derive(Default)]
struct Joins {
    items: HashMap<String, Option<Item>>,
    users: HashMap<String, Option<User>>,
}

impl Joins {
    async fn item(&mut self, state: &AppState, id: &str) -> Result<Ref<ItemSummary>> {
        if !self.items.contains_key(id) {
            let found = state.store.find_item(id).await?;
            self.items.insert(id.to_string(), found);
        }
        Ok(match self.items.get(id) {
            Some(Some(item)) => Ref::Populated(ItemSummary::new(item, &state.base_url)),
            _ => Ref::Id(id.to_string()),
        })
    }

    async fn user(&mut self, state: &AppState, id: &str) -> Result<Ref<UserSummary>> {
        if !self.users.contains_key(id) {
            let found = state.store.find_user(id).await?;
            self.users.insert(id.to_string(), found);
        }
        Ok(match self.users.get(id) {
            Some(Some(user)) => Ref::Populated(UserSummary::of(user)),
            _ => Ref::Id(id.to_string()),
        })
    }

    async fn view(&mut self, state: &AppState, rental: &Rental) -> Result<RentalView> {
        let item = self.item(state, &rental.item).await?;
        let renter = self.user(state, &rental.renter).await?;
        let owner = self.user(state, &rental.owner).await?;
        Ok(RentalView::new(rental, item, renter, owner))
    }
}

pub async fn create(state: &AppState, identity: &Identity, input: NewRentalInput) -> Result<RentalView> {
    let item_id = required(input.item_id.as_deref(), "itemId")?;
    let start = parse_date(&required(input.start_date.as_deref(), "startDate")?, "startDate")?;
    let end = parse_date(&required(input.end_date.as_deref(), "endDate")?, "endDate")?;

    let item = match state.store.find_item(&item_id).await? {
        Some(item) if !item.deleted => item,
        _ => return Err(AppError::not_found("Item not found")),
    };
    if !item.availability {
        return Err(AppError::unavailable("Item is not available"));
    }
    let days = billable_days(start, end);
    if days <= 0 {
        return Err(AppError::validation("endDate must be after startDate"));
    }

    let now = Utc::now();
    let rental = Rental {
        id: Uuid::new_v4().to_string(),
        item: item.id.clone(),
        renter: identity.user_id.clone(),
        owner: item.owner.clone(),
        start_date: start,
        end_date: end,
        total_cost: days as f64 * item.price_per_day,
        status: RentalStatus::Pending,
        payment_status: PaymentStatus::Pending,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_rental(&rental).await?;
    log::info!(
        "Rental {} requested by {} for item {} ({} days, {})",
        rental.id,
        rental.renter,
        rental.item,
        days,
        rental.total_cost
    );

    Joins::default().view(state, &rental).await
}

async fn list_for(state: &AppState, party: RentalParty, user_id: &str) -> Result<Vec<RentalView>> {
    let rentals = state.store.list_rentals(party, user_id).await?;
    let mut joins = Joins::default();
    let mut views = Vec::with_capacity(rentals.len());
    for rental in &rentals {
        views.push(joins.view(state, rental).await?);
    }
    Ok(views)
}

pub async fn list_for_renter(state: &AppState, identity: &Identity) -> Result<Vec<RentalView>> {
    list_for(state, RentalParty::Renter, &identity.user_id).await
}

pub async fn list_for_owner(state: &AppState, identity: &Identity) -> Result<Vec<RentalView>> {
    list_for(state, RentalParty::Owner, &identity.user_id).await
}

/// Moves a rental along its lifecycle. Only the item owner may do so, and only
/// along the transitions `RentalStatus::can_become` allows.
pub async fn set_status(state: &AppState, identity: &Identity, rental_id: &str, status: &str) -> Result<RentalView> {
    let rental = state
        .store
        .find_rental(rental_id)
        .await?
        .ok_or_else(|| AppError::not_found("Rental not found"))?;
    authorize(identity, Capability::OwnerOf(&rental.owner))?;

    let next: RentalStatus = status.trim().parse().map_err(AppError::Validation)?;
    if rental.status.is_terminal() {
        return Err(AppError::validation(format!("Rental is already {}", rental.status)));
    }
    if !rental.status.can_become(next) {
        return Err(AppError::validation(format!(
            "Cannot change rental status from {} to {}",
            rental.status, next
        )));
    }

    let updated = state
        .store
        .transition_rental(rental_id, rental.status, next)
        .await?
        .ok_or_else(|| AppError::unavailable("Rental status changed, reload and try again"))?;
    log::info!("Rental {} moved {} -> {}", updated.id, rental.status, next);

    Joins::default().view(state, &updated).await
}
