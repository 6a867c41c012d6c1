use anyhow::Result;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::domain::masterclass::Masterclass;
use crate::infra::mailer::EmailAttachment;

/// Assumed length of a session, used for DTEND.
pub const SESSION_LENGTH: Duration = Duration::hours(2);

const LINE_LIMIT: usize = 75;
const PRODID: &str = "-//Masterclass Portal//Registration//EN";

/// Build an iCalendar REQUEST with one event for the given masterclass.
pub fn invite(
    masterclass: &Masterclass,
    organizer: &str,
    organizer_email: &str,
    now: OffsetDateTime,
) -> Result<String> {
    let start = masterclass.date_time;
    let end = start + SESSION_LENGTH;

    let lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{}", PRODID),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:REQUEST".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:masterclass-{}@masterclass-portal", masterclass.id),
        format!("DTSTAMP:{}", utc_stamp(now)?),
        format!("DTSTART:{}", utc_stamp(start)?),
        format!("DTEND:{}", utc_stamp(end)?),
        format!("SUMMARY:{}", escape_text(&masterclass.title)),
        format!(
            "DESCRIPTION:{}",
            escape_text(masterclass.description.as_deref().unwrap_or(""))
        ),
        "LOCATION:Online".to_string(),
        format!("ORGANIZER;CN={}:mailto:{}", quote_param(organizer), organizer_email),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ];

    let mut output = String::new();
    for line in lines {
        output.push_str(&fold_line(&line));
        output.push_str("\r\n");
    }
    Ok(output)
}

pub fn invite_attachment(
    masterclass: &Masterclass,
    organizer: &str,
    organizer_email: &str,
    now: OffsetDateTime,
) -> Result<EmailAttachment> {
    Ok(EmailAttachment {
        filename: format!("masterclass_{}.ics", masterclass.id),
        content_type: "text/calendar; charset=utf-8; method=REQUEST".to_string(),
        content: invite(masterclass, organizer, organizer_email, now)?,
    })
}

fn utc_stamp(value: OffsetDateTime) -> Result<String> {
    let format = format_description!("[year][month][day]T[hour][minute][second]Z");
    Ok(value.to_offset(UtcOffset::UTC).format(&format)?)
}

fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            other => escaped.push(other),
        }
    }
    escaped
}

/// Parameter values with separators must be quoted; quotes themselves are not allowed.
fn quote_param(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|ch| *ch != '"' && !ch.is_control())
        .collect();
    if cleaned.contains([':', ';', ',']) {
        format!("\"{}\"", cleaned)
    } else {
        cleaned
    }
}

/// Fold a content line at 75 octets without splitting a UTF-8 sequence.
fn fold_line(line: &str) -> String {
    if line.len() <= LINE_LIMIT {
        return line.to_string();
    }

    let mut folded = String::with_capacity(line.len() + line.len() / LINE_LIMIT * 3);
    let mut current = 0;
    let mut limit = LINE_LIMIT;
    for ch in line.chars() {
        let width = ch.len_utf8();
        if current + width > limit {
            folded.push_str("\r\n ");
            current = 0;
            // continuation lines carry a leading space
            limit = LINE_LIMIT - 1;
        }
        folded.push(ch);
        current += width;
    }
    folded
}
