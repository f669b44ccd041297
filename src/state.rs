use std::sync::Arc;

use crate::auth::TokenService;
use crate::store::Store;

/// Shared by every handler. Holds no per-request data.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: TokenService,
    /// Public origin used to expand relative image names.
    pub base_url: String,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, tokens: TokenService, base_url: impl Into<String>) -> Self {
        AppState {
            store,
            tokens,
            base_url: base_url.into(),
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Arc;

    use super::AppState;
    use crate::auth::{Identity, TokenService};
    use crate::store::MemoryStore;

    pub const SECRET: &str = "test-secret";
    pub const BASE_URL: &str = "http://localhost:5000";

    pub fn state() -> AppState {
        AppState::new(Arc::new(MemoryStore::new()), TokenService::new(SECRET, 1), BASE_URL)
    }

    pub fn caller(id: &str) -> Identity {
        Identity {
            user_id: id.to_string(),
            email: None,
            is_seller: false,
            is_admin: false,
        }
    }

    pub fn seller(id: &str) -> Identity {
        Identity {
            is_seller: true,
            ..caller(id)
        }
    }
}
