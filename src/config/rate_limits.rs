use serde::Serialize;

/// Public actions that are throttled per client IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicAction {
    Register,
    Cancel,
    Autocomplete,
    Search,
}

impl PublicAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Cancel => "cancel",
            Self::Autocomplete => "autocomplete",
            Self::Search => "search",
        }
    }

    pub fn window(&self) -> RateWindow {
        match self {
            Self::Register | Self::Cancel => RateWindow::Hour,
            Self::Autocomplete | Self::Search => RateWindow::Minute,
        }
    }

    /// Resolve the throttled action for a request, if any.
    pub fn for_request(method: &str, path: &str) -> Option<Self> {
        match (method, path) {
            ("POST", p) if p.starts_with("/masterclasses/") && p.ends_with("/registrations") => {
                Some(Self::Register)
            }
            ("POST", p)
                if p.starts_with("/masterclasses/") && p.ends_with("/registrations/cancel") =>
            {
                Some(Self::Cancel)
            }
            ("GET", "/api/autocomplete") => Some(Self::Autocomplete),
            ("GET", "/search") => Some(Self::Search),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub registrations_per_hour: u32,
    pub cancellations_per_hour: u32,
    pub autocomplete_per_minute: u32,
    pub search_per_minute: u32,
}

impl RateLimits {
    pub fn limit_for(&self, action: PublicAction) -> u32 {
        match action {
            PublicAction::Register => self.registrations_per_hour,
            PublicAction::Cancel => self.cancellations_per_hour,
            PublicAction::Autocomplete => self.autocomplete_per_minute,
            PublicAction::Search => self.search_per_minute,
        }
    }
}

/// Time window for rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    Minute,
    Hour,
}

impl RateWindow {
    pub fn seconds(&self) -> u64 {
        match self {
            RateWindow::Minute => 60,
            RateWindow::Hour => 3600,
        }
    }
}

/// Calculate current window timestamp for rate limiting
pub fn current_window(window_seconds: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    now / window_seconds
}
