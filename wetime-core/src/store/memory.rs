//! In-memory store with an optional JSON snapshot on disk.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::Store;
use crate::attendance::Attendee;
use crate::calendar::{Calendar, CalendarKind};
use crate::date_range::DateRange;
use crate::error::{WeTimeError, WeTimeResult};
use crate::event::{CalendarId, CoupleId, Occurrence, OccurrenceId, UserId};
use crate::reminders::ReminderKey;
use crate::user::{Couple, Notification, NotificationPreference, User};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Data {
    users: BTreeMap<UserId, User>,
    couples: BTreeMap<CoupleId, Couple>,
    calendars: BTreeMap<CalendarId, Calendar>,
    /// Insertion order is creation order
    occurrences: Vec<Occurrence>,
    attendees: Vec<Attendee>,
    preferences: BTreeMap<UserId, NotificationPreference>,
    reminders_sent: BTreeSet<ReminderKey>,
    notifications: Vec<Notification>,
}

impl Data {
    fn remove_occurrences(&mut self, ids: &[OccurrenceId]) -> usize {
        let before = self.occurrences.len();
        self.occurrences.retain(|o| !ids.contains(&o.id));
        self.attendees.retain(|a| !ids.contains(&a.event_id));
        before - self.occurrences.len()
    }
}

/// All state behind one lock.
///
/// With a snapshot path, a write is applied to a copy, the copy is written to
/// disk, and only then does it replace the live state. Readers are not blocked
/// while the file is written, and a failed write changes nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Data>,
    /// Serializes writers so no change is lost between copy and swap
    writer: Mutex<()>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the snapshot at `path` if it exists, and keep writing to it.
    pub async fn open(path: &Path) -> WeTimeResult<Self> {
        let data = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                WeTimeError::Store(format!("Corrupt snapshot {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Data::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), "Opened data snapshot");

        Ok(MemoryStore {
            data: RwLock::new(data),
            writer: Mutex::new(()),
            snapshot: Some(path.to_path_buf()),
        })
    }

    /// Apply `change` atomically. An error from `change` or from the snapshot
    /// write leaves the state as it was.
    async fn write<T, F>(&self, change: F) -> WeTimeResult<T>
    where
        F: FnOnce(&mut Data) -> WeTimeResult<T> + Send,
        T: Send,
    {
        let _writer = self.writer.lock().await;

        let Some(path) = &self.snapshot else {
            let mut data = self.data.write().await;
            let mut next = data.clone();
            let out = change(&mut next)?;
            *data = next;
            return Ok(out);
        };

        let mut next = self.data.read().await.clone();
        let out = change(&mut next)?;
        persist(path, &next).await?;
        *self.data.write().await = next;
        Ok(out)
    }
}

async fn persist(path: &Path, data: &Data) -> WeTimeResult<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let content = serde_json::to_vec(data)
        .map_err(|e| WeTimeError::Store(format!("Failed to encode snapshot: {}", e)))?;

    let temp = path.with_extension("json.tmp");
    tokio::fs::write(&temp, content).await?;
    tokio::fs::rename(&temp, path).await?;
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn user(&self, id: UserId) -> WeTimeResult<Option<User>> {
        Ok(self.data.read().await.users.get(&id).cloned())
    }

    async fn users(&self) -> WeTimeResult<Vec<User>> {
        let mut users: Vec<User> = self.data.read().await.users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn save_user(&self, user: User) -> WeTimeResult<()> {
        self.write(|data| {
            data.users.insert(user.id, user);
            Ok(())
        })
        .await
    }

    async fn couple(&self, id: CoupleId) -> WeTimeResult<Option<Couple>> {
        Ok(self.data.read().await.couples.get(&id).cloned())
    }

    async fn couples(&self) -> WeTimeResult<Vec<Couple>> {
        let mut couples: Vec<Couple> = self.data.read().await.couples.values().cloned().collect();
        couples.sort_by_key(|c| c.created_at);
        Ok(couples)
    }

    async fn couple_by_code(&self, code: &str) -> WeTimeResult<Option<Couple>> {
        let data = self.data.read().await;
        Ok(data
            .couples
            .values()
            .find(|c| c.join_code == code)
            .cloned())
    }

    async fn couple_members(&self, id: CoupleId) -> WeTimeResult<Vec<User>> {
        let data = self.data.read().await;
        let mut members: Vec<User> = data
            .users
            .values()
            .filter(|u| u.couple_id == Some(id))
            .cloned()
            .collect();
        members.sort_by_key(|u| u.created_at);
        Ok(members)
    }

    async fn create_couple(
        &self,
        couple: Couple,
        shared: Calendar,
        creator: UserId,
    ) -> WeTimeResult<()> {
        self.write(|data| {
            let user = data
                .users
                .get_mut(&creator)
                .ok_or_else(|| WeTimeError::NotFound(format!("User {}", creator)))?;
            if user.couple_id.is_some() {
                return Err(WeTimeError::Couple("already_in_couple".to_string()));
            }
            user.couple_id = Some(couple.id);

            if data.couples.values().any(|c| c.join_code == couple.join_code) {
                return Err(WeTimeError::Couple("join code already in use".to_string()));
            }

            data.calendars.insert(shared.id, shared);
            data.couples.insert(couple.id, couple);
            Ok(())
        })
        .await
    }

    async fn join_couple(&self, couple: CoupleId, user: UserId) -> WeTimeResult<()> {
        self.write(|data| {
            if !data.couples.contains_key(&couple) {
                return Err(WeTimeError::NotFound(format!("Couple {}", couple)));
            }

            let members = data
                .users
                .values()
                .filter(|u| u.couple_id == Some(couple))
                .count();

            let joiner = data
                .users
                .get_mut(&user)
                .ok_or_else(|| WeTimeError::NotFound(format!("User {}", user)))?;

            if joiner.couple_id.is_some() {
                return Err(WeTimeError::Couple("already_in_couple".to_string()));
            }
            if members >= 2 {
                return Err(WeTimeError::Couple("couple_full".to_string()));
            }

            joiner.couple_id = Some(couple);
            Ok(())
        })
        .await
    }

    async fn calendar(&self, id: CalendarId) -> WeTimeResult<Option<Calendar>> {
        Ok(self.data.read().await.calendars.get(&id).cloned())
    }

    async fn calendars(&self) -> WeTimeResult<Vec<Calendar>> {
        let mut calendars: Vec<Calendar> =
            self.data.read().await.calendars.values().cloned().collect();
        calendars.sort_by_key(|c| c.created_at);
        Ok(calendars)
    }

    async fn calendars_owned_by(&self, user: UserId) -> WeTimeResult<Vec<Calendar>> {
        let data = self.data.read().await;
        let mut calendars: Vec<Calendar> = data
            .calendars
            .values()
            .filter(|c| c.is_owned_by(user))
            .cloned()
            .collect();
        calendars.sort_by_key(|c| c.created_at);
        Ok(calendars)
    }

    async fn shared_calendar(&self, couple: CoupleId) -> WeTimeResult<Option<Calendar>> {
        let data = self.data.read().await;
        Ok(data
            .calendars
            .values()
            .filter(|c| c.kind == CalendarKind::Shared && c.couple_id() == Some(couple))
            .min_by_key(|c| c.created_at)
            .cloned())
    }

    async fn external_calendars(&self) -> WeTimeResult<Vec<Calendar>> {
        let data = self.data.read().await;
        let mut calendars: Vec<Calendar> = data
            .calendars
            .values()
            .filter(|c| c.kind == CalendarKind::External)
            .cloned()
            .collect();
        calendars.sort_by_key(|c| c.created_at);
        Ok(calendars)
    }

    async fn save_calendar(&self, calendar: Calendar) -> WeTimeResult<()> {
        self.write(|data| {
            data.calendars.insert(calendar.id, calendar);
            Ok(())
        })
        .await
    }

    async fn delete_calendar(&self, id: CalendarId) -> WeTimeResult<bool> {
        self.write(|data| {
            let existed = data.calendars.remove(&id).is_some();
            let ids: Vec<OccurrenceId> = data
                .occurrences
                .iter()
                .filter(|o| o.calendar_id == id)
                .map(|o| o.id)
                .collect();
            data.remove_occurrences(&ids);
            Ok(existed)
        })
        .await
    }

    async fn occurrence(&self, id: OccurrenceId) -> WeTimeResult<Option<Occurrence>> {
        let data = self.data.read().await;
        Ok(data.occurrences.iter().find(|o| o.id == id).cloned())
    }

    async fn occurrences_for_window(
        &self,
        calendar_ids: &[CalendarId],
        window: &DateRange,
    ) -> WeTimeResult<Vec<Occurrence>> {
        let data = self.data.read().await;
        Ok(data
            .occurrences
            .iter()
            .filter(|o| calendar_ids.contains(&o.calendar_id))
            .filter(|o| o.overlaps(window) || (o.is_template() && o.start_utc < window.end))
            .cloned()
            .collect())
    }

    async fn occurrences_in_calendar(
        &self,
        calendar: CalendarId,
    ) -> WeTimeResult<Vec<Occurrence>> {
        let data = self.data.read().await;
        Ok(data
            .occurrences
            .iter()
            .filter(|o| o.calendar_id == calendar)
            .cloned()
            .collect())
    }

    async fn all_occurrences(&self) -> WeTimeResult<Vec<Occurrence>> {
        Ok(self.data.read().await.occurrences.clone())
    }

    async fn find_by_external_uid(
        &self,
        calendar: CalendarId,
        uid: &str,
    ) -> WeTimeResult<Option<Occurrence>> {
        let data = self.data.read().await;
        Ok(data
            .occurrences
            .iter()
            .find(|o| o.calendar_id == calendar && o.external_uid.as_deref() == Some(uid))
            .cloned())
    }

    async fn save_occurrence(&self, occurrence: Occurrence) -> WeTimeResult<()> {
        self.save_occurrences(vec![occurrence]).await
    }

    async fn save_occurrences(&self, occurrences: Vec<Occurrence>) -> WeTimeResult<()> {
        if occurrences.is_empty() {
            return Ok(());
        }

        self.write(|data| {
            let mut positions: HashMap<OccurrenceId, usize> = data
                .occurrences
                .iter()
                .enumerate()
                .map(|(i, o)| (o.id, i))
                .collect();

            for occurrence in occurrences {
                match positions.get(&occurrence.id) {
                    Some(&i) => data.occurrences[i] = occurrence,
                    None => {
                        positions.insert(occurrence.id, data.occurrences.len());
                        data.occurrences.push(occurrence);
                    }
                }
            }
            Ok(())
        })
        .await
    }

    async fn delete_occurrences(&self, ids: &[OccurrenceId]) -> WeTimeResult<usize> {
        self.write(|data| Ok(data.remove_occurrences(ids))).await
    }

    async fn save_attendee(&self, attendee: Attendee) -> WeTimeResult<()> {
        self.write(|data| {
            match data
                .attendees
                .iter_mut()
                .find(|a| a.event_id == attendee.event_id && a.user_id == attendee.user_id)
            {
                Some(existing) => *existing = attendee,
                None => data.attendees.push(attendee),
            }
            Ok(())
        })
        .await
    }

    async fn attendees_for(&self, event: OccurrenceId) -> WeTimeResult<Vec<Attendee>> {
        let data = self.data.read().await;
        Ok(data
            .attendees
            .iter()
            .filter(|a| a.event_id == event)
            .cloned()
            .collect())
    }

    async fn notification_preferences(
        &self,
    ) -> WeTimeResult<Vec<(UserId, NotificationPreference)>> {
        let data = self.data.read().await;
        Ok(data
            .preferences
            .iter()
            .map(|(user, pref)| (*user, pref.clone()))
            .collect())
    }

    async fn notification_preference(&self, user: UserId) -> WeTimeResult<NotificationPreference> {
        let data = self.data.read().await;
        Ok(data.preferences.get(&user).cloned().unwrap_or_default())
    }

    async fn save_notification_preference(
        &self,
        user: UserId,
        preference: NotificationPreference,
    ) -> WeTimeResult<()> {
        self.write(|data| {
            data.preferences.insert(user, preference);
            Ok(())
        })
        .await
    }

    async fn mark_reminder_sent(&self, key: ReminderKey) -> WeTimeResult<bool> {
        if self.data.read().await.reminders_sent.contains(&key) {
            return Ok(false);
        }
        self.write(|data| Ok(data.reminders_sent.insert(key))).await
    }

    async fn prune_reminders_sent(&self, before: DateTime<Utc>) -> WeTimeResult<usize> {
        let stale = self
            .data
            .read()
            .await
            .reminders_sent
            .iter()
            .filter(|k| k.starts_at <= before)
            .count();
        if stale == 0 {
            return Ok(0);
        }

        self.write(|data| {
            let count = data.reminders_sent.len();
            data.reminders_sent.retain(|k| k.starts_at > before);
            Ok(count - data.reminders_sent.len())
        })
        .await
    }

    async fn add_notification(&self, notification: Notification) -> WeTimeResult<()> {
        self.write(|data| {
            data.notifications.push(notification);
            Ok(())
        })
        .await
    }

    async fn notifications_for(&self, user: UserId) -> WeTimeResult<Vec<Notification>> {
        let data = self.data.read().await;
        let mut notifications: Vec<Notification> = data
            .notifications
            .iter()
            .filter(|n| n.user_id == user)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn set_notification_read(
        &self,
        user: UserId,
        id: Uuid,
        read: bool,
    ) -> WeTimeResult<bool> {
        self.write(|data| {
            let Some(notification) = data
                .notifications
                .iter_mut()
                .find(|n| n.id == id && n.user_id == user)
            else {
                return Ok(false);
            };
            notification.read = read;
            Ok(true)
        })
        .await
    }
}
