//! ABOUTME: The fixed CEO → VP → Director → Manager → Staff role ladder

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Ceo,
    Vp,
    Director,
    Manager,
    Staff,
}

impl Role {
    /// Depth in the hierarchy; root (CEO) is 0.
    pub fn depth(self) -> u32 {
        match self {
            Role::Ceo => 0,
            Role::Vp => 1,
            Role::Director => 2,
            Role::Manager => 3,
            Role::Staff => 4,
        }
    }

    /// A cell may only spawn children of strictly lower role.
    pub fn next_lower(self) -> Option<Role> {
        match self {
            Role::Ceo => Some(Role::Vp),
            Role::Vp => Some(Role::Director),
            Role::Director => Some(Role::Manager),
            Role::Manager => Some(Role::Staff),
            Role::Staff => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Ceo => "ceo",
            Role::Vp => "vp",
            Role::Director => "director",
            Role::Manager => "manager",
            Role::Staff => "staff",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_matches_hierarchy_order() {
        assert!(Role::Ceo.depth() < Role::Vp.depth());
        assert!(Role::Vp.depth() < Role::Director.depth());
        assert!(Role::Director.depth() < Role::Manager.depth());
        assert!(Role::Manager.depth() < Role::Staff.depth());
    }

    #[test]
    fn staff_cannot_spawn_further() {
        assert_eq!(Role::Staff.next_lower(), None);
    }
}
