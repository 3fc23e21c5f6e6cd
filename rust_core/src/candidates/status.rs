//! Providers spell "not started yet" several ways; all of them count as
//! scheduled.

/// Normalised spellings accepted as scheduled.
pub const SCHEDULED_STATUSES: &[&str] = &[
    "scheduled",
    "pre",
    "pregame",
    "pre_game",
    "not_started",
    "upcoming",
];

/// Lowercase, `-`/space to `_`, provider `status_` prefix removed.
pub fn normalise_status(status: &str) -> String {
    let lower = status.trim().to_lowercase().replace(['-', ' '], "_");
    lower
        .strip_prefix("status_")
        .map(str::to_string)
        .unwrap_or(lower)
}

pub fn is_scheduled_status(status: &str) -> bool {
    let normalised = normalise_status(status);
    SCHEDULED_STATUSES.contains(&normalised.as_str())
}
