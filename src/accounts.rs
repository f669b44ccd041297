use chrono::Utc;
use uuid::Uuid;

use crate::auth::{hash_password, verify_password, Identity};
use crate::error::{AppError, AuthError, Result};
use crate::models::User;
use crate::payloads::{non_blank, required, AuthResponse, ProfileUpdate, PublicUser, SignInInput, SignUpInput};
use crate::state::AppState;
use crate::store::UserChanges;

const MIN_PASSWORD_LEN: usize = 6;

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub async fn register(state: &AppState, input: SignUpInput) -> Result<AuthResponse> {
    let name = required(input.name.as_deref(), "name")?;
    let email = normalize_email(&required(input.email.as_deref(), "email")?);
    let phone = required(input.phone.as_deref(), "phone")?;
    let password = input.password.unwrap_or_default();
    if !email.contains('@') {
        return Err(AppError::validation("email is not valid"));
    }
    check_password(&password)?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::validation("Email already registered"));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        name,
        email,
        phone,
        password: hash_password(&password)?,
        address: input.address,
        is_admin: false,
        is_seller: input.is_seller,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_user(&user).await?;
    log::info!("Registered user {} (seller: {})", user.id, user.is_seller);

    Ok(AuthResponse {
        token: state.tokens.issue(&user)?,
        user: PublicUser::from(&user),
    })
}

pub async fn login(state: &AppState, input: SignInInput) -> Result<AuthResponse> {
    let email = normalize_email(&input.email);
    let user = match state.store.find_user_by_email(&email).await? {
        Some(user) if verify_password(&user.password, &input.password) => user,
        _ => return Err(AuthError::BadLogin.into()),
    };
    Ok(AuthResponse {
        token: state.tokens.issue(&user)?,
        user: PublicUser::from(&user),
    })
}

pub async fn me(state: &AppState, identity: &Identity) -> Result<PublicUser> {
    state
        .store
        .find_user(&identity.user_id)
        .await?
        .map(|user| PublicUser::from(&user))
        .ok_or_else(|| AppError::not_found("User not found"))
}

pub async fn update_profile(state: &AppState, identity: &Identity, input: ProfileUpdate) -> Result<PublicUser> {
    let password = match input.password.as_deref() {
        Some(password) => {
            check_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };
    let changes = UserChanges {
        name: non_blank(input.name.as_deref(), "name")?,
        phone: non_blank(input.phone.as_deref(), "phone")?,
        address: input.address,
        password,
    };
    state
        .store
        .update_user(&identity.user_id, &changes)
        .await?
        .map(|user| PublicUser::from(&user))
        .ok_or_else(|| AppError::not_found("User not found"))
}

/// Loads the caller's user record; a token for a user that no longer exists is not valid.
pub async fn current_user(state: &AppState, identity: &Identity) -> Result<User> {
    state
        .store
        .find_user(&identity.user_id)
        .await?
        .ok_or(AppError::Unauthenticated(AuthError::InvalidCredential))
}
