use crate::auth::Identity;
use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
pub enum Capability<'a> {
    Seller,
    Admin,
    /// Caller must be the stored owner of the resource.
    OwnerOf(&'a str),
}

/// Allows or refuses `identity` the given capability. Admins count as sellers
/// but get no bypass on ownership.
pub fn authorize(identity: &Identity, capability: Capability<'_>) -> Result<(), AppError> {
    if allows(identity, capability) {
        return Ok(());
    }
    let msg = match capability {
        Capability::Seller => "Access denied: sellers only",
        Capability::Admin => "Access denied: admins only",
        Capability::OwnerOf(_) => "Not authorized",
    };
    Err(AppError::forbidden(msg))
}

fn allows(identity: &Identity, capability: Capability<'_>) -> bool {
    match capability {
        Capability::Seller => identity.is_seller || allows(identity, Capability::Admin),
        Capability::Admin => identity.is_admin,
        Capability::OwnerOf(owner) => same_id(owner, &identity.user_id),
    }
}

/// Ids are compared in their string form, ignoring surrounding whitespace.
pub fn same_id(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(seller: bool, admin: bool) -> Identity {
        Identity {
            user_id: "abc123".into(),
            email: None,
            is_seller: seller,
            is_admin: admin,
        }
    }

    #[test]
    fn seller_gate() {
        assert!(authorize(&caller(true, false), Capability::Seller).is_ok());
        assert!(authorize(&caller(false, true), Capability::Seller).is_ok());
        assert!(matches!(
            authorize(&caller(false, false), Capability::Seller),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn admin_gate() {
        assert!(authorize(&caller(false, true), Capability::Admin).is_ok());
        assert!(authorize(&caller(true, false), Capability::Admin).is_err());
    }

    #[test]
    fn ownership_is_string_equality() {
        assert!(authorize(&caller(false, false), Capability::OwnerOf("abc123")).is_ok());
        assert!(authorize(&caller(false, false), Capability::OwnerOf(" abc123 ")).is_ok());
        assert!(authorize(&caller(false, false), Capability::OwnerOf("ABC123")).is_err());
        assert!(authorize(&caller(false, false), Capability::OwnerOf("abc124")).is_err());
        assert!(authorize(&caller(false, true), Capability::OwnerOf("someone-else")).is_err());
        assert!(!same_id("", ""));
    }
}
