//! Plain-text rendering of session state.

use weatherly_weather::{FetchState, Rejection, SearchHistory, Snapshot, WeatherReport};

pub fn render_report(report: &WeatherReport) -> String {
    let c = &report.current;
    let mut out = String::new();
    out.push_str(&report.place.display_name());
    out.push('\n');
    out.push_str(&format!(
        "  Temperature: {:.1} °C / {:.1} °F\n",
        c.temperature_c, c.temperature_f
    ));
    out.push_str(&format!("  Condition:   {}", c.condition));
    if !c.icon_url.is_empty() {
        out.push_str(&format!(" ({})", c.icon_url));
    }
    out.push('\n');
    out.push_str(&format!("  Humidity:    {} %\n", c.humidity));
    out.push_str(&format!("  Pressure:    {} mb\n", c.pressure_mb));
    out.push_str(&format!("  Visibility:  {} km\n", c.visibility_km));
    out.push_str(&format!(
        "  Updated:     {}",
        report.fetched_at.format("%Y-%m-%d %H:%M UTC")
    ));
    out
}

/// Numbered list, oldest first; the numbers are what `:N` selects.
pub fn render_history(history: &SearchHistory) -> String {
    if history.is_empty() {
        return "No recent searches.".to_string();
    }
    let mut out = String::from("Recent searches:");
    for (i, place) in history.entries().iter().enumerate() {
        out.push_str(&format!("\n  :{}  {}", i + 1, place));
    }
    out
}

/// The single display region: status line, last good report, recent list.
pub fn render_snapshot(snapshot: &Snapshot) -> String {
    let mut sections = Vec::new();

    match &snapshot.state {
        FetchState::Idle => {}
        FetchState::Loading(pending) => sections.push(format!("Loading {}...", pending.query)),
        FetchState::Success(_) => {}
        FetchState::Failed(reason) => sections.push(format!("Error: {}", reason)),
    }

    if let Some(report) = &snapshot.displayed {
        sections.push(render_report(report));
    }

    sections.push(render_history(&snapshot.history));
    sections.join("\n\n")
}

pub fn render_rejection(rejection: &Rejection) -> Option<String> {
    match rejection {
        // Pressing enter on an empty line is not worth a message.
        Rejection::EmptyQuery => None,
        Rejection::Busy { in_flight } => Some(format!(
            "Still looking up {}; try again when it finishes.",
            in_flight
        )),
        Rejection::NoSuchHistoryEntry(index) => {
            Some(format!("There is no recent search :{}.", index))
        }
    }
}
