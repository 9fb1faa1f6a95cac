//! Event reminders.
//!
//! Run once a minute. A reminder is due when `start - lead` falls in
//! `(now - 1 min, now]`, so each instant is hit by exactly one run. A sent-marker
//! per (occurrence, instance start, user, lead) is claimed before delivery and
//! stops repeats from overlapping runs.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::Calendar;
use crate::constants::REMINDER_TOLERANCE_SECS;
use crate::date_range::DateRange;
use crate::error::WeTimeResult;
use crate::event::{Occurrence, OccurrenceId, UserId};
use crate::query::materialize;
use crate::store::Store;
use crate::user::{Notification, NotificationPreference, User};

/// Identity of one delivered reminder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderKey {
    pub occurrence_id: OccurrenceId,
    /// Start of the instance, so each recurrence instance is reminded separately
    pub starts_at: DateTime<Utc>,
    pub user_id: UserId,
    pub lead_minutes: u32,
}

/// One reminder that should go out now.
#[derive(Debug, Clone)]
pub struct DueReminder {
    pub user: User,
    pub occurrence: Occurrence,
    pub preference: NotificationPreference,
    pub lead_minutes: u32,
}

impl DueReminder {
    pub fn key(&self) -> ReminderKey {
        ReminderKey {
            occurrence_id: self.occurrence.id,
            starts_at: self.occurrence.start_utc,
            user_id: self.user.id,
            lead_minutes: self.lead_minutes,
        }
    }

    pub fn subject(&self) -> String {
        format!("Reminder: {}", self.occurrence.title)
    }

    pub fn body(&self) -> String {
        format!(
            "Upcoming: {} at {}",
            self.occurrence.title,
            self.user.local_time(self.occurrence.start_utc)
        )
    }
}

/// Email delivery. SMTP itself lives outside this crate.
#[async_trait]
pub trait ReminderNotifier: Send + Sync {
    async fn send_email(&self, user: &User, subject: &str, body: &str) -> WeTimeResult<()>;
}

/// Notifier that only logs. Used when no mail transport is configured.
pub struct LogNotifier;

#[async_trait]
impl ReminderNotifier for LogNotifier {
    async fn send_email(&self, user: &User, subject: &str, _body: &str) -> WeTimeResult<()> {
        tracing::info!(to = %user.email, subject, "Reminder email (no transport configured)");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRun {
    pub due: usize,
    pub sent: usize,
    /// Already delivered by an earlier run
    pub skipped: usize,
    pub failed: usize,
    /// Delivery markers dropped because their instance has passed
    pub pruned: usize,
}

/// Calendars whose events a user is reminded of: their own and the shared one.
/// The partner's calendars are visible but do not trigger reminders.
async fn reminder_calendars(store: &dyn Store, user: &User) -> WeTimeResult<Vec<Calendar>> {
    let mut calendars = store.calendars_owned_by(user.id).await?;
    if let Some(couple_id) = user.couple_id
        && let Some(shared) = store.shared_calendar(couple_id).await?
    {
        calendars.push(shared);
    }
    Ok(calendars)
}

/// Every reminder due at `now`. A user whose data cannot be read is logged
/// and skipped; the others are still collected.
pub async fn due_reminders(store: &dyn Store, now: DateTime<Utc>) -> WeTimeResult<Vec<DueReminder>> {
    let mut due = Vec::new();

    for (user_id, preference) in store.notification_preferences().await? {
        if !preference.is_enabled() {
            continue;
        }
        match due_for_user(store, user_id, &preference, now).await {
            Ok(reminders) => due.extend(reminders),
            Err(e) => {
                tracing::warn!(user = %user_id, error = %e, "Skipping reminders for user");
            }
        }
    }

    Ok(due)
}

async fn due_for_user(
    store: &dyn Store,
    user_id: UserId,
    preference: &NotificationPreference,
    now: DateTime<Utc>,
) -> WeTimeResult<Vec<DueReminder>> {
    let Some(lead_minutes) = preference.reminder_minutes_before else {
        return Ok(Vec::new());
    };
    let Some(user) = store.user(user_id).await? else {
        tracing::warn!(user = %user_id, "Reminder preference for unknown user");
        return Ok(Vec::new());
    };

    // start - lead in (now - tolerance, now]  <=>  start in (lo, hi]
    let hi = now + Duration::minutes(i64::from(lead_minutes));
    let lo = hi - Duration::seconds(REMINDER_TOLERANCE_SECS);
    let window = DateRange::new(lo, hi + Duration::seconds(1))?;

    let calendar_ids: Vec<_> = reminder_calendars(store, &user)
        .await?
        .iter()
        .map(|c| c.id)
        .collect();
    if calendar_ids.is_empty() {
        return Ok(Vec::new());
    }

    let stored = store.occurrences_for_window(&calendar_ids, &window).await?;
    Ok(materialize(stored, &window)
        .into_iter()
        .filter(|o| o.start_utc > lo && o.start_utc <= hi)
        .map(|occurrence| DueReminder {
            user: user.clone(),
            occurrence,
            preference: preference.clone(),
            lead_minutes,
        })
        .collect())
}

/// Deliver every reminder due at `now`. Per-reminder failures are logged and
/// counted; the run continues.
pub async fn send_reminders(
    store: &dyn Store,
    notifier: &dyn ReminderNotifier,
    now: DateTime<Utc>,
) -> WeTimeResult<ReminderRun> {
    let due = due_reminders(store, now).await?;
    let mut run = ReminderRun {
        due: due.len(),
        ..Default::default()
    };

    for reminder in &due {
        match deliver(store, notifier, reminder, now).await {
            Ok(true) => run.sent += 1,
            Ok(false) => run.skipped += 1,
            Err(e) => {
                tracing::warn!(
                    user = %reminder.user.id,
                    occurrence = %reminder.occurrence.id,
                    error = %e,
                    "Failed to deliver reminder"
                );
                run.failed += 1;
            }
        }
    }

    // No instance starting at or before the cutoff can become due again
    let cutoff = now - Duration::seconds(REMINDER_TOLERANCE_SECS);
    match store.prune_reminders_sent(cutoff).await {
        Ok(pruned) => run.pruned = pruned,
        Err(e) => tracing::warn!(error = %e, "Failed to prune reminder markers"),
    }

    tracing::info!(
        due = run.due,
        sent = run.sent,
        skipped = run.skipped,
        failed = run.failed,
        pruned = run.pruned,
        "Reminder run finished"
    );

    Ok(run)
}

/// Returns false when the reminder had already been claimed.
async fn deliver(
    store: &dyn Store,
    notifier: &dyn ReminderNotifier,
    reminder: &DueReminder,
    now: DateTime<Utc>,
) -> WeTimeResult<bool> {
    if !store.mark_reminder_sent(reminder.key()).await? {
        return Ok(false);
    }

    let subject = reminder.subject();
    let body = reminder.body();

    if reminder.preference.notify_web {
        store
            .add_notification(Notification::new(reminder.user.id, &subject, &body, now))
            .await?;
    }

    if reminder.preference.notify_email {
        notifier.send_email(&reminder.user, &subject, &body).await?;
    }

    Ok(true)
}
