use crate::storage::DetectionSummary;

const REFRESH_SECS: u32 = 5;

pub(super) fn render_index(summary: &DetectionSummary) -> String {
    let last = summary.last_detection_time.as_deref().unwrap_or("N/A");
    let mut rows = String::new();
    for detection in &summary.detections {
        rows.push_str(&format!(
            "      <tr><td>{}</td><td class=\"plate\">{}</td><td>{:.2}</td></tr>\n",
            escape(&detection.timestamp),
            escape(&detection.plate_text),
            detection.confidence
        ));
    }
    if summary.detections.is_empty() {
        rows.push_str("      <tr><td colspan=\"3\">No detections yet</td></tr>\n");
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta http-equiv="refresh" content="{refresh}">
  <title>OpenParking LPR</title>
  <style>
    body {{ font-family: sans-serif; margin: 2rem; }}
    table {{ border-collapse: collapse; min-width: 32rem; }}
    th, td {{ border-bottom: 1px solid #ddd; padding: 0.4rem 0.8rem; text-align: left; }}
    .plate {{ font-family: monospace; font-size: 1.1rem; }}
  </style>
</head>
<body>
  <h1>OpenParking LPR</h1>
  <p>Total detections: <strong id="total">{total}</strong></p>
  <p>Last detection: <strong id="last">{last}</strong></p>
  <table>
    <thead><tr><th>Timestamp (UTC)</th><th>Plate</th><th>Confidence</th></tr></thead>
    <tbody>
{rows}    </tbody>
  </table>
</body>
</html>
"#,
        refresh = REFRESH_SECS,
        total = summary.total_detections,
        last = escape(last),
        rows = rows
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
