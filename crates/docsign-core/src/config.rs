//! Placement and signing-link policy

use chrono::Duration;
use serde::{Deserialize, Serialize};
use shared_types::Coordinates;

use crate::coords::SizeBounds;
use crate::gesture::LeavePolicy;

/// Default lifetime of a public signing link (7 days)
pub const DEFAULT_LINK_TTL_HOURS: i64 = 168;

/// Tunables shared by the placement engine and the stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementPolicy {
    pub size_bounds: SizeBounds,
    /// Applied once, when a signature is created without coordinates
    pub default_placement: Coordinates,
    pub link_ttl_hours: i64,
    pub leave_policy: LeavePolicy,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            size_bounds: SizeBounds::default(),
            default_placement: Coordinates::DEFAULT_PLACEMENT,
            link_ttl_hours: DEFAULT_LINK_TTL_HOURS,
            leave_policy: LeavePolicy::default(),
        }
    }
}

impl PlacementPolicy {
    pub fn link_ttl(&self) -> Duration {
        Duration::hours(self.link_ttl_hours)
    }

    pub fn with_link_ttl_hours(mut self, hours: i64) -> Self {
        self.link_ttl_hours = hours;
        self
    }

    /// Reject settings no placement could ever satisfy
    pub fn validate(&self) -> Result<(), String> {
        let b = &self.size_bounds;
        if !(b.min_width > 0.0 && b.min_width <= b.max_width) {
            return Err(format!(
                "invalid width bounds {}..={}",
                b.min_width, b.max_width
            ));
        }
        if !(b.min_height > 0.0 && b.min_height <= b.max_height) {
            return Err(format!(
                "invalid height bounds {}..={}",
                b.min_height, b.max_height
            ));
        }
        if self.link_ttl_hours <= 0 {
            return Err(format!(
                "link TTL must be positive, got {} hours",
                self.link_ttl_hours
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = PlacementPolicy::default();
        assert_eq!(policy.default_placement, Coordinates::new(80.0, 80.0, 220.0, 110.0));
        assert_eq!(policy.link_ttl(), Duration::days(7));
        assert_eq!(policy.leave_policy, LeavePolicy::Commit);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let policy: PlacementPolicy =
            serde_json::from_str(r#"{"leave_policy":"revert","size_bounds":{"min_width":120}}"#)
                .unwrap();
        assert_eq!(policy.leave_policy, LeavePolicy::Revert);
        assert_eq!(policy.size_bounds.min_width, 120.0);
        assert_eq!(policy.size_bounds.max_width, 500.0);
        assert_eq!(policy.link_ttl_hours, DEFAULT_LINK_TTL_HOURS);
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut policy = PlacementPolicy::default();
        policy.size_bounds.min_height = 300.0;
        assert!(policy.validate().is_err());

        let policy = PlacementPolicy::default().with_link_ttl_hours(0);
        assert!(policy.validate().is_err());
    }
}
