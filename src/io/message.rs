use chrono::{Local, SecondsFormat};
use mailparse::{MailHeaderMap, ParsedMail};

use crate::core::error::WatchError;
use crate::core::signal::MailMessage;

const UNKNOWN_SENDER: &str = "Unknown Sender";

/// Decodes a raw RFC 822 message into the fields an email artifact needs.
pub fn parse_message(id: &str, raw: &[u8]) -> Result<MailMessage, WatchError> {
    let parsed = mailparse::parse_mail(raw).map_err(|e| WatchError::malformed(id, e.to_string()))?;

    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
    let sender = parsed
        .headers
        .get_first_value("From")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
    let received = parsed
        .headers
        .get_first_value("Date")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Local::now().to_rfc3339_opts(SecondsFormat::Secs, false));

    let body = extract_body(&parsed).map_err(|e| WatchError::malformed(id, e.to_string()))?;

    Ok(MailMessage {
        id: id.to_string(),
        sender,
        subject,
        received,
        body,
    })
}

/// First non-empty `text/plain` part in depth-first order; a single-part message yields its payload.
fn extract_body(mail: &ParsedMail) -> Result<String, mailparse::MailParseError> {
    if !is_multipart(mail) {
        return mail.get_body();
    }
    Ok(first_plain_body(mail)?.unwrap_or_default())
}

fn is_multipart(mail: &ParsedMail) -> bool {
    mail.ctype.mimetype.starts_with("multipart/")
}

fn first_plain_body(mail: &ParsedMail) -> Result<Option<String>, mailparse::MailParseError> {
    if mail.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
        let body = mail.get_body()?;
        return Ok((!body.trim().is_empty()).then_some(body));
    }
    for part in &mail.subparts {
        if let Some(body) = first_plain_body(part)? {
            return Ok(Some(body));
        }
    }
    Ok(None)
}
