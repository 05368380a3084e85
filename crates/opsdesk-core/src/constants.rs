//! Application-wide constants
//!
//! Centralized location for endpoint paths and tuning values shared by the
//! session, the views and the CLI.

/// Default REST API base URL
pub const API_BASE_URL: &str = "http://localhost:5000/api";

/// Default push channel address (newline-delimited JSON over TCP)
pub const PUSH_ADDR: &str = "127.0.0.1:5001";

/// Nominal playback volume of the alert chime
pub const ALERT_VOLUME: f32 = 0.6;

/// Default location of the alert chime
pub const ALERT_ASSET: &str = "assets/notification.mp3";

pub const POLL_INTERVAL_SECS: u64 = 30;
pub const INITIAL_PULL_DELAY_MS: u64 = 1000;
pub const RECONNECT_DELAY_SECS: u64 = 2;
pub const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Entries requested per audit log pull
pub const AUDIT_PAGE_SIZE: usize = 50;

/// Capacity of the inbound frame channel between transport and router
pub const INBOUND_CHANNEL_CAPACITY: usize = 256;

// REST endpoints consumed by the core
pub mod paths {
    pub const NOTIFICATIONS: &str = "/notifications";
    pub const NOTIFICATIONS_READ_ALL: &str = "/notifications/read-all";
    pub const AUDIT_LOGS: &str = "/audit-logs";
    pub const PROJECTS: &str = "/projects";
    pub const MY_LEAVES: &str = "/leaves/mine";
    pub const LEAVE_REVIEWS: &str = "/leaves";
    pub const ATTENDANCE_SUMMARY: &str = "/attendance/summary";
    pub const DASHBOARD_STATS: &str = "/dashboard/stats";

    pub fn notification_read(id: &str) -> String {
        format!("/notifications/{}/read", id)
    }
}
