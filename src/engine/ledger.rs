// Capacity Ledger - per-group capacity, denormalized member count and status

use serde::Serialize;

use crate::error::ConflictKind;
use crate::models::{Group, GroupStatus};

/// The `(capacity, current_count, status)` triple of one group.
///
/// Invariants: `current_count <= capacity`, and while the group is live its
/// status is FULL exactly when `current_count >= capacity`. Terminal states
/// are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapacityLedger {
    pub capacity: u32,
    pub current_count: u32,
    pub status: GroupStatus,
}

impl CapacityLedger {
    /// Ledger of a freshly created group: the creator occupies one slot
    pub fn for_new_group(capacity: u32) -> Self {
        Self {
            capacity,
            current_count: 1,
            status: Self::live_status(1, capacity),
        }
    }

    pub fn of(group: &Group) -> Self {
        Self {
            capacity: group.capacity,
            current_count: group.current_count,
            status: group.status,
        }
    }

    /// Status of a live group holding `count` members
    pub fn live_status(count: u32, capacity: u32) -> GroupStatus {
        if count >= capacity {
            GroupStatus::Full
        } else {
            GroupStatus::Open
        }
    }

    pub fn has_free_slot(&self) -> bool {
        self.current_count < self.capacity
    }

    /// Occupy one slot
    pub fn admit(&mut self) -> Result<(), ConflictKind> {
        if self.status.is_terminal() {
            return Err(ConflictKind::NotOpen);
        }
        if self.status == GroupStatus::Full || !self.has_free_slot() {
            return Err(ConflictKind::GroupFull);
        }
        self.current_count += 1;
        self.status = Self::live_status(self.current_count, self.capacity);
        Ok(())
    }

    /// Free one slot. Leaving always reopens the group.
    pub fn release(&mut self) -> Result<(), ConflictKind> {
        if self.status.is_terminal() {
            return Err(ConflictKind::NotOpen);
        }
        if self.current_count == 0 {
            return Err(ConflictKind::NotMember);
        }
        self.current_count -= 1;
        self.status = GroupStatus::Open;
        Ok(())
    }

    /// Organizers may call off any live group, full ones included
    pub fn cancel(&mut self) -> Result<(), ConflictKind> {
        if self.status.is_terminal() {
            return Err(ConflictKind::NotOpen);
        }
        self.status = GroupStatus::Cancelled;
        Ok(())
    }

    /// Expire a live group; returns false when it was already terminal
    pub fn complete(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = GroupStatus::Completed;
        true
    }

    pub fn is_consistent(&self) -> bool {
        if self.current_count > self.capacity || self.capacity == 0 {
            return false;
        }
        match self.status {
            GroupStatus::Open => self.current_count < self.capacity,
            GroupStatus::Full => self.current_count >= self.capacity,
            GroupStatus::Cancelled | GroupStatus::Completed => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_group_status_depends_on_capacity() {
        let solo = CapacityLedger::for_new_group(1);
        assert_eq!(solo.status, GroupStatus::Full);
        assert_eq!(solo.current_count, 1);

        let team = CapacityLedger::for_new_group(4);
        assert_eq!(team.status, GroupStatus::Open);
        assert!(team.is_consistent());
    }

    #[test]
    fn admit_fills_then_rejects() {
        let mut ledger = CapacityLedger::for_new_group(3);
        ledger.admit().unwrap();
        assert_eq!(ledger.status, GroupStatus::Open);
        ledger.admit().unwrap();
        assert_eq!(ledger.status, GroupStatus::Full);
        assert_eq!(ledger.current_count, 3);
        assert_eq!(ledger.admit(), Err(ConflictKind::GroupFull));
        assert_eq!(ledger.current_count, 3);
    }

    #[test]
    fn release_reopens_and_promotion_refills() {
        let mut ledger = CapacityLedger::for_new_group(2);
        ledger.admit().unwrap();
        assert_eq!(ledger.status, GroupStatus::Full);

        ledger.release().unwrap();
        assert_eq!(ledger.status, GroupStatus::Open);
        assert_eq!(ledger.current_count, 1);

        ledger.admit().unwrap();
        assert_eq!(ledger.status, GroupStatus::Full);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn full_group_can_be_cancelled() {
        let mut ledger = CapacityLedger::for_new_group(1);
        assert_eq!(ledger.status, GroupStatus::Full);
        ledger.cancel().unwrap();
        assert_eq!(ledger.status, GroupStatus::Cancelled);
        assert_eq!(ledger.current_count, 1);
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut ledger = CapacityLedger::for_new_group(5);
        ledger.cancel().unwrap();
        assert_eq!(ledger.admit(), Err(ConflictKind::NotOpen));
        assert_eq!(ledger.release(), Err(ConflictKind::NotOpen));
        assert_eq!(ledger.cancel(), Err(ConflictKind::NotOpen));
        assert!(!ledger.complete());

        let mut ledger = CapacityLedger::for_new_group(5);
        assert!(ledger.complete());
        assert_eq!(ledger.status, GroupStatus::Completed);
        assert!(!ledger.complete());
    }

    #[test]
    fn inconsistent_ledgers_are_detected() {
        let over = CapacityLedger {
            capacity: 2,
            current_count: 3,
            status: GroupStatus::Full,
        };
        assert!(!over.is_consistent());

        let open_but_full = CapacityLedger {
            capacity: 2,
            current_count: 2,
            status: GroupStatus::Open,
        };
        assert!(!open_but_full.is_consistent());
    }
}
