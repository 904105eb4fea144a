use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

use crate::error::{ApiError, ApiResult};
use crate::model::role::Role;

/// Role sets allowed to write in each area.
pub const HR_STAFF: &[Role] = &[Role::Admin, Role::Hr];
pub const SUPPLY_STAFF: &[Role] = &[Role::Admin, Role::Supply];
pub const FINANCE_STAFF: &[Role] = &[Role::Admin, Role::Accounting];
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// Authenticated caller, placed in request extensions by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,

    /// Identifies the presented access token, used to revoke it on logout.
    pub jti: String,
    pub exp: usize,
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or(ApiError::Unauthenticated),
        )
    }
}

impl AuthUser {
    pub fn has_any(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    pub fn require_any(&self, roles: &[Role]) -> ApiResult<()> {
        if self.has_any(roles) {
            Ok(())
        } else {
            tracing::info!(user_id = self.user_id, role = self.role.as_ref(), "Forbidden");
            Err(ApiError::forbidden())
        }
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        self.require_any(ADMIN_ONLY)
    }

    /// Staff may act for anyone; others only for their own employee record.
    pub fn require_self_or(&self, employee_id: u64, staff: &[Role]) -> ApiResult<()> {
        if self.has_any(staff) || self.employee_id == Some(employee_id) {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, employee_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 1,
            email: "someone@agency.gov".to_string(),
            role,
            employee_id,
            jti: "jti".to_string(),
            exp: 0,
        }
    }

    #[test]
    fn role_sets_gate_writes() {
        assert!(user(Role::Hr, None).require_any(HR_STAFF).is_ok());
        assert!(user(Role::Supply, None).require_any(HR_STAFF).is_err());
        assert!(user(Role::Accounting, None).require_any(FINANCE_STAFF).is_ok());
        assert!(user(Role::Supply, None).require_admin().is_err());
        assert!(user(Role::Admin, None).require_any(SUPPLY_STAFF).is_ok());
    }

    #[test]
    fn employees_act_only_for_themselves() {
        let me = user(Role::Employee, Some(5));
        assert!(me.require_self_or(5, HR_STAFF).is_ok());
        assert!(me.require_self_or(6, HR_STAFF).is_err());
        assert!(user(Role::Hr, None).require_self_or(6, HR_STAFF).is_ok());
    }
}
