// Roster export: stored records -> tab-separated text for the clipboard.

use chrono::DateTime;
use thiserror::Error;

use crate::player::PlayerRecord;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write roster row: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to flush roster export: {0}")]
    Flush(String),

    #[error("roster export is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

const HEADER: &[&str] = &[
    "Name",
    "Rating",
    "Position",
    "Chem Style",
    "Untradeable",
    "First Owner",
    "Active Squad",
    "Bought For",
    "Obtained",
    "Nation",
    "League",
    "Club",
    "Discard Value",
    "Resource ID",
    "ID",
];

/// Render the roster as tab-separated text with a header row.
///
/// Rows are ordered by rating (highest first), then name. An empty roster
/// renders as an empty string so callers can treat "no text" as "no data".
pub fn roster_text(players: &[PlayerRecord]) -> Result<String, ExportError> {
    if players.is_empty() {
        return Ok(String::new());
    }

    let mut sorted: Vec<&PlayerRecord> = players.iter().collect();
    sorted.sort_by(|a, b| {
        b.rating
            .total_cmp(&a.rating)
            .then_with(|| a.display_name().cmp(b.display_name()))
    });

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());
    writer.write_record(HEADER)?;

    for p in sorted {
        writer.write_record([
            p.display_name().to_string(),
            format_number(p.rating),
            p.preferred_position.clone().unwrap_or_default(),
            p.chem_style.clone(),
            yes_no(p.untradeable),
            yes_no(p.first_owner),
            yes_no(p.active_squad),
            p.bought_for.map(format_number).unwrap_or_default(),
            p.obtained_timestamp.map(format_date).unwrap_or_default(),
            p.nation_name.clone().unwrap_or_default(),
            p.league_name.clone().unwrap_or_default(),
            p.club_name.clone().unwrap_or_default(),
            p.discard_value.map(format_number).unwrap_or_default(),
            p.resource_id.to_string(),
            p.id.clone(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Flush(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Epoch seconds -> `YYYY-MM-DD` (UTC). Unrepresentable values print raw.
fn format_date(secs: f64) -> String {
    DateTime::from_timestamp(secs as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| format_number(secs))
}
