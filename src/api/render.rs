//! HTML rendering of the status page

use std::fmt::Write;

use crate::snapshot::Snapshot;
use crate::{DiscoveredDevice, RelayState};

const HEADER: &str = concat!(
    "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"/>",
    "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"/>",
    "<meta name=\"description\" content=\"displays current state of Relay for Aircompressor ",
    "and status about machines in need for compressed air.\"/>",
    "<title>Pressure Server</title>",
    "<style>body{font-family:\"MS Trebuchet\",Verdana,Arial,sans-serif;}",
    "tr:nth-child(odd){background:#ddd;}tr:nth-child(even){background:#fff;}",
    "td{padding:0px 8px;}</style></head><body>"
);

const FOOTER: &str = "</body></html>";

pub const NO_DEVICES: &str = "No Devices connected!";

pub fn status_page(snapshot: &Snapshot, host_name: &str) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str(HEADER);

    html.push_str("<h2>Relay status</h2>");
    let color = match snapshot.relay_state {
        RelayState::On => "#027a00",
        RelayState::Off => "#c92703",
    };
    let _ = write!(
        html,
        "<p style=\"color:{color};font-weight:bold;\">{}</p>",
        snapshot.relay_state
    );

    html.push_str("<h2>Active Devices in watchlist:</h2>");
    device_table(&mut html, &snapshot.watchlist_devices, false);

    html.push_str("<h2>All active Devices:</h2>");
    device_table(&mut html, &snapshot.all_devices, true);

    html.push_str("<p><small>");
    match snapshot.published_at {
        Some(published_at) => {
            let _ = write!(
                html,
                "cycle {} at {}",
                snapshot.cycle,
                published_at.format("%d-%m-%Y %H:%M:%S")
            );
        }
        None => html.push_str("waiting for first scan"),
    }
    if let Some(error) = &snapshot.scan_error {
        let _ = write!(html, " &middot; last scan failed: {}", escape(error));
    }
    let _ = write!(html, " &middot; {}</small></p>", escape(host_name));

    html.push_str(FOOTER);
    html
}

fn device_table(html: &mut String, devices: &[DiscoveredDevice], mark_watchlist: bool) {
    html.push_str("<table><tbody>");

    if devices.is_empty() {
        let _ = write!(html, "<tr><td>{NO_DEVICES}</td></tr>");
    }

    for device in devices {
        let suffix = if mark_watchlist && device.in_watchlist {
            " in watchlist"
        } else {
            ""
        };
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}{suffix}</td></tr>",
            device.address,
            escape(&device.hostname)
        );
    }

    html.push_str("</tbody></table>");
}

/// Escapes text for use in element content and attribute values
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
