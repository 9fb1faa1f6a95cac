use std::time::Duration;

/// Default look-back of the event window when `rangeStart` is absent.
pub const DEFAULT_WINDOW_PAST_DAYS: i64 = 7;

/// Default look-ahead of the event window when `rangeEnd` is absent.
pub const DEFAULT_WINDOW_FUTURE_DAYS: i64 = 30;

/// Title given to feed entries without a SUMMARY.
pub const UNTITLED: &str = "Untitled";

/// PRODID written into exported feeds.
pub const PRODID: &str = "-//WeTime//WeTime Calendar//EN";

/// Upper bound on instances materialized for one template in one window.
pub const MAX_INSTANCES_PER_WINDOW: u16 = u16::MAX;

/// Feed fetch timeout when the configuration does not set one.
pub const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(30);

/// Reminders fire when their reminder instant falls within this much of "now".
pub const REMINDER_TOLERANCE_SECS: i64 = 60;

/// Header carrying the shared secret for the internal cron endpoints.
pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-cron-token";

/// Alphabet for couple join codes (no 0/O, 1/I).
pub const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const JOIN_CODE_LEN: usize = 8;

/// Duration given to assistant-created events that carry no end.
pub const ASSISTANT_DEFAULT_DURATION_MINUTES: i64 = 60;
