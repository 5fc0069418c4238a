use crate::auth::jwt::{Claims, verify_token};
use crate::config::Config;
use crate::error::EngineError;
use crate::model::role::{Actor, Role, can_decide_approvals};
use actix_web::{
    FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized, web::Data,
};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

impl AuthUser {
    pub fn from_claims(claims: Claims) -> Result<Self, &'static str> {
        let role = Role::from_id(claims.role).ok_or("Invalid role")?;
        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            employee_id: claims.employee_id,
        })
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.employee_id, self.role)
    }

    /// The caller's own employee id; check-in and movement endpoints act on it.
    pub fn require_employee(&self) -> Result<u64, EngineError> {
        self.employee_id
            .ok_or_else(|| EngineError::Unauthorized("No employee profile".into()))
    }

    /// Own records, or anyone's for roles that review attendance.
    pub fn require_view_of(&self, employee_id: u64) -> Result<(), EngineError> {
        if self.employee_id == Some(employee_id) || can_decide_approvals(self.role) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized(
                "cannot view another employee's attendance".into(),
            ))
        }
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // already verified by auth_middleware
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(ErrorUnauthorized("Missing token"))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => {
                return ready(Err(actix_web::error::ErrorInternalServerError(
                    "Config missing",
                )));
            }
        };

        let claims = match verify_token(token, &config.jwt_secret) {
            Ok(c) => c,
            Err(_) => return ready(Err(ErrorUnauthorized("Invalid token"))),
        };

        ready(AuthUser::from_claims(claims).map_err(ErrorUnauthorized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, employee_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "someone".into(),
            role,
            employee_id,
        }
    }

    #[test]
    fn test_view_scope() {
        assert!(user(Role::Employee, Some(10)).require_view_of(10).is_ok());
        assert!(user(Role::Employee, Some(10)).require_view_of(11).is_err());
        assert!(user(Role::Manager, Some(20)).require_view_of(10).is_ok());
        assert!(user(Role::ApiUser, None).require_employee().is_err());
    }
}
