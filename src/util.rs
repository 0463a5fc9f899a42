use chrono::Duration;

/// Rough age for display e.g. "3d", "5h12m", "40s"
pub fn format_age(age: Duration) -> String {
    let total_seconds = age.num_seconds().max(0);
    let days = total_seconds / 86_400;
    let hours = total_seconds / 3600 % 24;
    let minutes = total_seconds / 60 % 60;
    if days > 0 {
        format!("{}d", days)
    } else if hours > 0 {
        format!("{}h{:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", total_seconds)
    }
}
