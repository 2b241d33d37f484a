use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::tracker::PresenceTracker;

/// Render the Markdown status block for the online `players`
pub fn render_status(
    players: &[String],
    tracker: &PresenceTracker,
    now: DateTime<Utc>,
    utc_offset_hours: i32,
) -> String {
    let block = if players.is_empty() {
        "— nobody online —".to_string()
    } else {
        players
            .iter()
            .map(|name| {
                let minutes = tracker
                    .session(name)
                    .map(|session| session.played(now).num_minutes())
                    .unwrap_or_default();
                format!("• {} ({})", escape_markdown(name), play_time(minutes))
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "👥 *Online:* {}\n\n🟢 *Players:*\n{}\n\n🕒 _Updated {} (UTC{:+})_",
        players.len(),
        block,
        local_time(now, utc_offset_hours),
        utc_offset_hours
    )
}

fn play_time(total_minutes: i64) -> String {
    let total_minutes = total_minutes.max(0);
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    match (hours, minutes) {
        (0, 0) => "playing recently".to_string(),
        (0, m) => format!("playing {} min", m),
        (h, m) => format!("playing {}h {} min", h, m),
    }
}

fn local_time(now: DateTime<Utc>, utc_offset_hours: i32) -> String {
    let offset = FixedOffset::east_opt(utc_offset_hours.saturating_mul(3600)).unwrap_or(Utc.fix());
    now.with_timezone(&offset).format("%H:%M").to_string()
}

// Legacy Telegram Markdown entities
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
