//! Client complaints about collection stops

use crate::types::TransitionError;

string_enum! {
    pub enum ComplaintType {
        MissedCollection => "missed_collection",
        IncompleteCollection => "incomplete_collection",
        Delay => "delay",
        Damage => "damage",
        AgentBehaviour => "agent_behaviour",
        ServiceQuality => "service_quality",
        Other => "other",
    }
}

string_enum! {
    pub enum ComplaintPriority {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

impl Default for ComplaintPriority {
    fn default() -> Self {
        ComplaintPriority::Normal
    }
}

string_enum! {
    pub enum ComplaintStatus {
        Open => "open",
        InProgress => "in_progress",
        Resolved => "resolved",
        Closed => "closed",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplaintAction {
    /// Hand the complaint to a staff member
    Assign,
    Resolve,
    Close,
}

impl ComplaintAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintAction::Assign => "assign",
            ComplaintAction::Resolve => "resolve",
            ComplaintAction::Close => "close",
        }
    }
}

impl ComplaintStatus {
    pub fn apply(self, action: ComplaintAction) -> Result<ComplaintStatus, TransitionError> {
        use ComplaintStatus::*;

        let next = match (self, action) {
            // Reassigning a complaint already being handled is allowed
            (Open | InProgress, ComplaintAction::Assign) => InProgress,
            (Open | InProgress, ComplaintAction::Resolve) => Resolved,
            (Open | InProgress | Resolved, ComplaintAction::Close) => Closed,
            _ => {
                return Err(TransitionError {
                    entity: "complaint",
                    from: self.as_str(),
                    action: action.as_str(),
                })
            }
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complaint_lifecycle() {
        let s = ComplaintStatus::Open.apply(ComplaintAction::Assign).unwrap();
        assert_eq!(s, ComplaintStatus::InProgress);
        assert_eq!(s.apply(ComplaintAction::Assign), Ok(ComplaintStatus::InProgress));
        let s = s.apply(ComplaintAction::Resolve).unwrap();
        assert!(s.apply(ComplaintAction::Assign).is_err());
        let s = s.apply(ComplaintAction::Close).unwrap();
        assert!(s.apply(ComplaintAction::Close).is_err());
    }

    #[test]
    fn test_default_priority() {
        assert_eq!(ComplaintPriority::default(), ComplaintPriority::Normal);
    }
}
