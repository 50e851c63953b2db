//! iCalendar (RFC 5545) export of a built schedule: one `VCALENDAR` envelope, one `VEVENT` per
//! [`ScheduledInstance`].

use crate::scheduler::ScheduledInstance;

/// Produces a complete `VCALENDAR` document for `instances`, titled `calendar_name`. Lines are
/// joined with CRLF and the output ends with a trailing CRLF, per RFC 5545.
pub fn to_ical(instances: &[ScheduledInstance], calendar_name: &str) -> String {
    let mut lines = Vec::with_capacity(6 + instances.len() * 8);
    lines.push("BEGIN:VCALENDAR".to_string());
    lines.push("VERSION:2.0".to_string());
    lines.push("PRODID:-//VirtualDate//Scheduler//EN".to_string());
    lines.push("CALSCALE:GREGORIAN".to_string());
    lines.push("METHOD:PUBLISH".to_string());
    lines.push(format!("X-WR-CALNAME:{}", escape_text(calendar_name)));

    for instance in instances {
        lines.extend(event_lines(instance));
    }

    lines.push("END:VCALENDAR".to_string());

    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

fn event_lines(instance: &ScheduledInstance) -> Vec<String> {
    let stamp = chrono::Utc::now();

    let mut flags: Vec<&str> = instance.flags.iter().map(String::as_str).collect();
    flags.sort_unstable();
    let flags_joined = if flags.is_empty() { "(none)".to_string() } else { flags.join(", ") };
    let flags_line = format!("Flags: {flags_joined}");
    let description = format!("{}\n{}", instance.explanation.to_text(), flags_line);

    let mut lines = vec![
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}-{}@virtualdate", instance.task_id, instance.start.timestamp()),
        format!("DTSTAMP:{}", format_ical_instant(stamp)),
        format!("DTSTART:{}", format_ical_instant(instance.start)),
        format!("DTEND:{}", format_ical_instant(instance.finish)),
        format!("SUMMARY:{}", escape_text(&instance.task_id)),
        format!("DESCRIPTION:{}", escape_text(&description)),
    ];
    if !flags.is_empty() {
        let categories = flags.iter().map(|f| escape_text(f)).collect::<Vec<_>>().join(",");
        lines.push(format!("CATEGORIES:{categories}"));
    }
    lines.push("END:VEVENT".to_string());
    lines
}

fn format_ical_instant(instant: chrono::DateTime<chrono::Utc>) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}

/// RFC 5545 §3.3.11 text escaping: backslash, comma, semicolon, and newline are escaped.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explanation::Explanation;
    use chrono::TimeZone;
    use chrono::Utc;
    use std::collections::HashSet;

    fn sample_instance() -> ScheduledInstance {
        let mut explanation = Explanation::new();
        explanation.push("accepted at 2020-01-01T09:00:00Z");
        ScheduledInstance {
            task_id: "demo".to_string(),
            start: Utc.with_ymd_and_hms(2020, 1, 1, 9, 0, 0).unwrap(),
            finish: Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 0).unwrap(),
            explanation,
            flags: HashSet::new(),
        }
    }

    fn flagged_instance() -> ScheduledInstance {
        let mut instance = sample_instance();
        instance.flags = HashSet::from(["crew-a".to_string(), "site-1".to_string()]);
        instance
    }

    #[test]
    fn envelope_has_the_required_calendar_properties() {
        let ical = to_ical(&[], "Test Calendar");
        assert!(ical.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ical.contains("VERSION:2.0\r\n"));
        assert!(ical.contains("PRODID:-//VirtualDate//Scheduler//EN\r\n"));
        assert!(ical.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn event_dates_use_the_basic_utc_form() {
        let ical = to_ical(&[sample_instance()], "Test Calendar");
        assert!(ical.contains("DTSTART:20200101T090000Z"));
        assert!(ical.contains("DTEND:20200101T100000Z"));
        assert!(ical.contains("UID:demo-1577869200@virtualdate"));
    }

    #[test]
    fn commas_and_semicolons_in_text_fields_are_escaped() {
        let escaped = escape_text("a, b; c\\d\ne");
        assert_eq!(escaped, "a\\, b\\; c\\\\d\\ne");
    }

    #[test]
    fn categories_line_is_only_emitted_when_flags_are_non_empty() {
        let without_flags = to_ical(&[sample_instance()], "Test Calendar");
        assert!(!without_flags.contains("CATEGORIES:"));
        assert!(without_flags.contains("Flags: (none)"));

        let with_flags = to_ical(&[flagged_instance()], "Test Calendar");
        assert!(with_flags.contains("CATEGORIES:crew-a,site-1"));
        assert!(with_flags.contains("Flags: crew-a, site-1"));
    }
}
