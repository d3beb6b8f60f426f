//! Default values applied to outgoing calls

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};

use crate::types::ParseMode;

/// Values used for any option a call leaves unset
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub parse_mode: Option<ParseMode>,
    pub disable_notification: Option<bool>,
    pub disable_web_page_preview: Option<bool>,
    pub protect_content: Option<bool>,
    pub allow_sending_without_reply: Option<bool>,
    /// Offset used to interpret naive datetimes
    pub tz: FixedOffset,
    /// Whether handlers block the update loop unless they say otherwise
    pub block: bool,
}

fn utc() -> FixedOffset {
    Utc.fix()
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            parse_mode: None,
            disable_notification: None,
            disable_web_page_preview: None,
            protect_content: None,
            allow_sending_without_reply: None,
            tz: utc(),
            block: true,
        }
    }
}

impl Defaults {
    pub fn with_tz(mut self, tz: FixedOffset) -> Self {
        self.tz = tz;
        self
    }

    pub fn with_parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = Some(parse_mode);
        self
    }
}

/// A point in time accepted by methods such as `ban_chat_member`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeInput {
    /// Unix timestamp in seconds
    Timestamp(i64),
    /// Timezone-aware datetime
    Aware(DateTime<FixedOffset>),
    /// Naive datetime, interpreted in the configured offset
    Naive(NaiveDateTime),
    /// Offset from now
    Delta(Duration),
}

impl TimeInput {
    /// Converts to a Unix timestamp, reading naive values in `tz`
    pub fn to_timestamp(&self, tz: FixedOffset) -> i64 {
        self.to_timestamp_at(tz, Utc::now())
    }

    pub(crate) fn to_timestamp_at(&self, tz: FixedOffset, now: DateTime<Utc>) -> i64 {
        match self {
            TimeInput::Timestamp(ts) => *ts,
            TimeInput::Aware(dt) => dt.timestamp(),
            TimeInput::Naive(naive) => match tz.from_local_datetime(naive).single() {
                Some(dt) => dt.timestamp(),
                None => naive.and_utc().timestamp(),
            },
            TimeInput::Delta(delta) => (now + *delta).timestamp(),
        }
    }
}

impl From<DateTime<Utc>> for TimeInput {
    fn from(dt: DateTime<Utc>) -> Self {
        TimeInput::Aware(dt.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for TimeInput {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        TimeInput::Aware(dt)
    }
}

impl From<NaiveDateTime> for TimeInput {
    fn from(naive: NaiveDateTime) -> Self {
        TimeInput::Naive(naive)
    }
}

impl From<Duration> for TimeInput {
    fn from(delta: Duration) -> Self {
        TimeInput::Delta(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naive(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 7, 22)
            .and_then(|d| d.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    #[test]
    fn test_naive_uses_configured_offset() {
        let utc_ts = TimeInput::Naive(naive(12)).to_timestamp(utc());
        let shanghai = FixedOffset::east_opt(8 * 3600).unwrap();
        let local_ts = TimeInput::Naive(naive(12)).to_timestamp(shanghai);
        assert_eq!(utc_ts - local_ts, 8 * 3600);
    }

    #[test]
    fn test_aware_and_timestamp_ignore_offset() {
        let shanghai = FixedOffset::east_opt(8 * 3600).unwrap();
        let aware = shanghai.from_local_datetime(&naive(20)).single().unwrap();
        assert_eq!(
            TimeInput::Aware(aware).to_timestamp(utc()),
            TimeInput::Aware(aware).to_timestamp(shanghai)
        );
        assert_eq!(TimeInput::Timestamp(1690000000).to_timestamp(shanghai), 1690000000);
    }

    #[test]
    fn test_delta_is_relative_to_now() {
        let now = Utc.timestamp_opt(1690000000, 0).single().unwrap();
        let ts = TimeInput::Delta(Duration::minutes(5)).to_timestamp_at(utc(), now);
        assert_eq!(ts, 1690000300);
    }

    #[test]
    fn test_defaults_block_by_default() {
        let defaults = Defaults::default();
        assert!(defaults.block);
        assert_eq!(defaults.tz.local_minus_utc(), 0);
        assert_eq!(
            defaults.with_parse_mode(ParseMode::Html).parse_mode,
            Some(ParseMode::Html)
        );
    }
}
