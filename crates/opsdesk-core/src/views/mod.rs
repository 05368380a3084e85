//! Views the core keeps fresh. Each mounted view owns its subscriptions
//! and its loader; unmounting (dropping) it revokes both.

pub mod audit;
pub mod live;

pub use audit::AuditLogView;
pub use live::LiveView;

use crate::constants::paths;
use crate::events::Topic;
use crate::models::SecurityNotice;

/// Surface for notices the user must acknowledge (security alerts).
pub trait NoticeSink: Send + Sync {
    fn show_blocking(&self, notice: SecurityNotice);
}

/// A pulled resource and the push topics that invalidate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSpec {
    pub name: &'static str,
    pub path: &'static str,
    pub topics: &'static [Topic],
}

pub mod catalog {
    use super::*;

    pub const PROJECTS: ViewSpec = ViewSpec {
        name: "projects",
        path: paths::PROJECTS,
        topics: &[Topic::ProjectAssigned, Topic::ProjectUnassigned],
    };

    /// Employee-facing leave list
    pub const MY_LEAVES: ViewSpec = ViewSpec {
        name: "my-leaves",
        path: paths::MY_LEAVES,
        topics: &[Topic::LeaveStatus],
    };

    /// Reviewer-facing queue of leave requests
    pub const LEAVE_REVIEWS: ViewSpec = ViewSpec {
        name: "leave-reviews",
        path: paths::LEAVE_REVIEWS,
        topics: &[Topic::LeaveCreated],
    };

    pub const ATTENDANCE: ViewSpec = ViewSpec {
        name: "attendance",
        path: paths::ATTENDANCE_SUMMARY,
        topics: &[Topic::AttendanceCheckin, Topic::AttendanceCheckout],
    };

    pub const DASHBOARD_STATS: ViewSpec = ViewSpec {
        name: "dashboard-stats",
        path: paths::DASHBOARD_STATS,
        topics: &[
            Topic::ProjectAssigned,
            Topic::ProjectUnassigned,
            Topic::LeaveStatus,
            Topic::LeaveCreated,
            Topic::AttendanceCheckin,
            Topic::AttendanceCheckout,
        ],
    };

    pub const ALL: [ViewSpec; 5] = [PROJECTS, MY_LEAVES, LEAVE_REVIEWS, ATTENDANCE, DASHBOARD_STATS];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_refresh_topic_has_a_view() {
        let covered: HashSet<Topic> = catalog::ALL
            .iter()
            .flat_map(|spec| spec.topics.iter().copied())
            .collect();
        let handled_elsewhere = [Topic::NotificationNew, Topic::AuditLog, Topic::AuditAlert];

        for topic in Topic::ALL {
            assert!(
                covered.contains(&topic) || handled_elsewhere.contains(&topic),
                "{} has no consumer",
                topic
            );
        }
    }

    #[test]
    fn test_view_names_unique() {
        let names: HashSet<_> = catalog::ALL.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), catalog::ALL.len());
    }
}
