use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Employee = 3,
    System = 4,
    ApiUser = 5,
    Manager = 6,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hr),
            3 => Some(Role::Employee),
            4 => Some(Role::System),
            5 => Some(Role::ApiUser),
            6 => Some(Role::Manager),
            _ => None,
        }
    }
}

/// Authenticated caller as seen by the engine. `employee_id` is absent for
/// service accounts that are not employees.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Actor {
    pub user_id: u64,
    pub employee_id: Option<u64>,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: u64, employee_id: Option<u64>, role: Role) -> Self {
        Self {
            user_id,
            employee_id,
            role,
        }
    }

    pub fn is_employee(&self, employee_id: u64) -> bool {
        self.employee_id == Some(employee_id)
    }
}

/// Single capability check for deciding attendance exceptions.
pub fn can_decide_approvals(role: Role) -> bool {
    matches!(role, Role::Admin | Role::Hr | Role::Manager)
}

/// HR/Admin may scope decisions to any employee; managers only to direct reports.
pub fn can_decide_for_anyone(role: Role) -> bool {
    matches!(role, Role::Admin | Role::Hr)
}

pub fn can_manage_reimbursements(role: Role) -> bool {
    matches!(role, Role::Admin | Role::Hr | Role::System)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_role_parses_from_identity_strings() {
        assert_eq!(Role::from_str("ADMIN").ok(), Some(Role::Admin));
        assert_eq!(Role::from_str("hr").ok(), Some(Role::Hr));
        assert_eq!(Role::from_str("MANAGER").ok(), Some(Role::Manager));
        assert_eq!(Role::from_str("API_USER").ok(), Some(Role::ApiUser));
        assert!(Role::from_str("JANITOR").is_err());
    }

    #[test]
    fn test_only_privileged_roles_decide() {
        assert!(can_decide_approvals(Role::Admin));
        assert!(can_decide_approvals(Role::Hr));
        assert!(can_decide_approvals(Role::Manager));
        assert!(!can_decide_approvals(Role::Employee));
        assert!(!can_decide_approvals(Role::ApiUser));
        assert!(!can_decide_for_anyone(Role::Manager));
    }

    #[test]
    fn test_role_ids_round_trip() {
        for id in 1..=6u8 {
            let role = Role::from_id(id).unwrap();
            assert_eq!(role as u8, id);
        }
        assert_eq!(Role::from_id(0), None);
    }
}
