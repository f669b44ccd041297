use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::auth::Identity;
use crate::error::{AppError, Result};
use crate::payloads::{
    AddToCartInput, CartUpdate, ItemPatchInput, ItemQuery, NewItem, NewRentalInput, ProfileUpdate, QuantityInput,
    SignInInput, SignUpInput, StatusInput,
};
use crate::state::AppState;
use crate::{accounts, cart, catalog, rentals};

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

// ---- auth ----

async fn register(state: web::Data<AppState>, body: web::Json<SignUpInput>) -> Result<HttpResponse> {
    let resp = accounts::register(&state, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(resp))
}

async fn login(state: web::Data<AppState>, body: web::Json<SignInInput>) -> Result<HttpResponse> {
    let resp = accounts::login(&state, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(resp))
}

async fn me(state: web::Data<AppState>, identity: Identity) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(accounts::me(&state, &identity).await?))
}

async fn update_profile(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<ProfileUpdate>,
) -> Result<HttpResponse> {
    let user = accounts::update_profile(&state, &identity, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

// ---- items ----

async fn list_items(state: web::Data<AppState>, query: web::Query<ItemQuery>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(catalog::list(&state, query.into_inner()).await?))
}

async fn get_item(state: web::Data<AppState>, id: web::Path<String>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(catalog::get(&state, &id).await?))
}

async fn create_item(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<NewItem>,
) -> Result<HttpResponse> {
    let item = catalog::create(&state, &identity, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(item))
}

async fn update_item(
    state: web::Data<AppState>,
    identity: Identity,
    id: web::Path<String>,
    body: web::Json<ItemPatchInput>,
) -> Result<HttpResponse> {
    let item = catalog::update(&state, &identity, &id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(item))
}

async fn delete_item(state: web::Data<AppState>, identity: Identity, id: web::Path<String>) -> Result<HttpResponse> {
    catalog::delete(&state, &identity, &id).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Item deleted successfully" })))
}

// ---- cart ----

async fn get_cart(state: web::Data<AppState>, identity: Identity) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(cart::list(&state, &identity).await?))
}

async fn add_to_cart(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<AddToCartInput>,
) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(cart::add(&state, &identity, body.into_inner()).await?))
}

async fn update_cart_entry(
    state: web::Data<AppState>,
    identity: Identity,
    entry_id: web::Path<String>,
    body: web::Json<QuantityInput>,
) -> Result<HttpResponse> {
    match cart::set_quantity(&state, &identity, &entry_id, body.quantity).await? {
        CartUpdate::Updated(entry) => Ok(HttpResponse::Ok().json(entry)),
        CartUpdate::Removed => Ok(HttpResponse::Ok().json(json!({ "message": "Item removed from cart" }))),
    }
}

async fn remove_from_cart(
    state: web::Data<AppState>,
    identity: Identity,
    entry_id: web::Path<String>,
) -> Result<HttpResponse> {
    cart::remove(&state, &identity, &entry_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Item removed from cart" })))
}

// ---- rentals ----

async fn create_rental(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<NewRentalInput>,
) -> Result<HttpResponse> {
    let rental = rentals::create(&state, &identity, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(rental))
}

async fn my_rentals(state: web::Data<AppState>, identity: Identity) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(rentals::list_for_renter(&state, &identity).await?))
}

async fn my_items(state: web::Data<AppState>, identity: Identity) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(rentals::list_for_owner(&state, &identity).await?))
}

async fn update_rental_status(
    state: web::Data<AppState>,
    identity: Identity,
    id: web::Path<String>,
    body: web::Json<StatusInput>,
) -> Result<HttpResponse> {
    let rental = rentals::set_status(&state, &identity, &id, &body.status).await?;
    Ok(HttpResponse::Ok().json(rental))
}

/// Malformed bodies and query strings get the same 400 shape as validation errors.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| AppError::validation(err.to_string()).into())
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| AppError::validation(err.to_string()).into())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/me", web::get().to(me))
                    .route("/profile", web::put().to(update_profile)),
            )
            .service(
                web::scope("/items")
                    .route("", web::get().to(list_items))
                    .route("", web::post().to(create_item))
                    .route("/{id}", web::get().to(get_item))
                    .route("/{id}", web::put().to(update_item))
                    .route("/{id}", web::delete().to(delete_item)),
            )
            .service(
                web::scope("/cart")
                    .route("", web::get().to(get_cart))
                    .route("/add", web::post().to(add_to_cart))
                    .route("/{entry_id}", web::put().to(update_cart_entry))
                    .route("/{entry_id}", web::delete().to(remove_from_cart)),
            )
            .service(
                web::scope("/rentals")
                    .route("", web::post().to(create_rental))
                    .route("/my-rentals", web::get().to(my_rentals))
                    .route("/my-items", web::get().to(my_items))
                    .route("/{id}/status", web::put().to(update_rental_status)),
            ),
    );
}
