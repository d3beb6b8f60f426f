//! Helper functions used by the bot handlers

use chrono::{DateTime, Utc};
use url::Url;

use crate::utils::errors::{CastpodError, Result};

/// Format a timestamp for display
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Truncate text to `max_length` characters, ending with an ellipsis
pub fn truncate_text(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_length.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Escape text for messages sent with the HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Parse a feed URL given by a user. Only http(s) URLs with a host are
/// accepted.
pub fn parse_feed_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(CastpodError::InvalidInput(format!(
            "Not a http(s) feed URL: {}",
            raw
        )));
    }
    Ok(url)
}

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 8), "hello...");
        assert_eq!(truncate_text("播客播客播客", 5), "播客...");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<b>Tom & \"Jerry\"</b>"),
            "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_parse_feed_url() {
        assert!(parse_feed_url(" https://feeds.example.com/podcast.xml ").is_ok());
        assert!(parse_feed_url("ftp://feeds.example.com/podcast.xml").is_err());
        assert!(parse_feed_url("not a url").is_err());
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n b\tc "), "a b c");
    }
}
