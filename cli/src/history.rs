// Terminal rendering for room history and nearby sightings

use bluechat_core::{Message, MessageKind, ProximityReport, SignalQuality};
use chrono::{DateTime, Utc};
use colored::*;

pub fn formatted_time(timestamp_ms: u64) -> String {
    let dt = DateTime::from_timestamp_millis(timestamp_ms as i64).unwrap_or_else(Utc::now);
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// One line per message; our own messages are highlighted
pub fn render_message(message: &Message, own_id: &str) -> String {
    let time = formatted_time(message.timestamp).dimmed();
    match message.kind {
        MessageKind::System => format!("{} {}", time, message.content.italic()),
        MessageKind::Text if message.user_id == own_id => format!(
            "{} {} {}",
            time,
            format!("{}:", message.username).bright_green().bold(),
            message.content
        ),
        MessageKind::Text => format!(
            "{} {} {}",
            time,
            format!("{}:", message.username).bright_cyan(),
            message.content
        ),
    }
}

pub fn render_report(report: &ProximityReport) -> String {
    let quality = report.signal_quality();
    let quality = match quality {
        SignalQuality::Excellent | SignalQuality::Good => quality.to_string().green(),
        SignalQuality::Fair => quality.to_string().yellow(),
        SignalQuality::Poor => quality.to_string().red(),
    };
    let room = match &report.room_id {
        Some(room_id) => format!(" in {}", room_id.bright_blue()),
        None => String::new(),
    };
    format!(
        "  {} {} {:.0}m away, signal {:.0}% ({}){}",
        "📡".dimmed(),
        report.username.bold(),
        report.distance,
        report.signal_strength,
        quality,
        room
    )
}
