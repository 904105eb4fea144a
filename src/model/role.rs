use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, AsRefStr, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Employee = 3,
    Supply = 4,
    Accounting = 5,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hr),
            3 => Some(Role::Employee),
            4 => Some(Role::Supply),
            5 => Some(Role::Accounting),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn ids_round_trip() {
        for role in Role::iter() {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(6), None);
    }

    #[test]
    fn names_match_the_wire_format() {
        for role in Role::iter() {
            let json = serde_json::to_value(role).unwrap();
            assert_eq!(json, role.as_ref());
            let back: Role = serde_json::from_value(json).unwrap();
            assert_eq!(back, role);
        }
        assert!(serde_json::from_str::<Role>("\"superuser\"").is_err());
    }
}
