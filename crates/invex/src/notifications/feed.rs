//! Notification feed with an in-memory cache, optional SQLite persistence
//! and a broadcast channel for live subscribers.
//!
//! Database writes never run on the caller's thread: they are queued, in
//! order, to a dedicated writer thread so progress callbacks inside the
//! batch never block a runtime worker on disk I/O.

use std::collections::HashMap;
use std::sync::{mpsc, Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

use super::{NewNotification, Notification, NotificationStore, NotificationUpdate};
use crate::db::notification_repo::{self, NotificationRow};
use crate::db::{Database, DatabaseError};

/// Change to the feed, sent to every subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    Added { notification: Notification },
    Updated { notification: Notification },
    Removed { id: String },
}

/// Notification store backed by a cache and, optionally, the database.
///
/// Cloning is cheap; clones share the same cache and channel.
#[derive(Clone)]
pub struct NotificationFeed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    db: Option<Database>,
    writer: Option<PersistWriter>,
    cache: RwLock<HashMap<String, Notification>>,
    sender: broadcast::Sender<NotificationEvent>,
}

impl Drop for FeedInner {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.close();
        }
    }
}

/// Queued database change, applied by the writer thread in submission order.
enum WriteOp {
    Upsert(NotificationRow),
    Delete(String),
    DeleteAll,
    Flush(oneshot::Sender<()>),
}

impl WriteOp {
    fn apply(self, db: &Database) {
        let result = match self {
            WriteOp::Upsert(row) => notification_repo::upsert(db, &row)
                .map_err(|e| format!("persist notification {}: {}", row.id, e)),
            WriteOp::Delete(id) => notification_repo::delete(db, &id)
                .map(|_| ())
                .map_err(|e| format!("delete notification {}: {}", id, e)),
            WriteOp::DeleteAll => notification_repo::delete_all(db)
                .map(|_| ())
                .map_err(|e| format!("clear notifications: {}", e)),
            WriteOp::Flush(done) => {
                let _ = done.send(());
                Ok(())
            }
        };
        if let Err(message) = result {
            log::error!("Failed to {}", message);
        }
    }
}

/// Owns the writer thread; dropping the sender lets it drain and exit.
struct PersistWriter {
    tx: mpsc::Sender<WriteOp>,
    handle: JoinHandle<()>,
}

impl PersistWriter {
    fn spawn(db: Database) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<WriteOp>();
        let handle = std::thread::Builder::new()
            .name("invex-notifications".to_string())
            .spawn(move || {
                for op in rx {
                    op.apply(&db);
                }
            })?;
        Ok(Self { tx, handle })
    }

    /// Hands `op` to the thread, returning it when the thread is gone.
    fn submit(&self, op: WriteOp) -> Result<(), WriteOp> {
        self.tx.send(op).map_err(|e| e.0)
    }

    /// Waits until every queued write has been applied.
    fn close(self) {
        drop(self.tx);
        if self.handle.join().is_err() {
            log::error!("Notification writer thread panicked");
        }
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new(100)
    }
}

impl NotificationFeed {
    /// Creates an in-memory feed with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self::build(None, capacity)
    }

    /// Creates a feed that persists every change to `db`.
    pub fn with_database(db: Database, capacity: usize) -> Self {
        Self::build(Some(db), capacity)
    }

    fn build(db: Option<Database>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let writer = db.clone().and_then(|db| match PersistWriter::spawn(db) {
            Ok(writer) => Some(writer),
            Err(e) => {
                log::warn!("No notification writer thread ({}), writing inline", e);
                None
            }
        });
        Self {
            inner: Arc::new(FeedInner {
                db,
                writer,
                cache: RwLock::new(HashMap::new()),
                sender,
            }),
        }
    }

    /// Creates a new subscriber for feed events.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.inner.sender.subscribe()
    }

    /// Populates the cache from the database, returning how many
    /// notifications were loaded. Rows with unreadable payloads are skipped.
    pub fn load_from_database(&self) -> Result<usize, DatabaseError> {
        let Some(db) = &self.inner.db else {
            return Ok(0);
        };

        let rows = notification_repo::list_all(db)?;
        let mut cache = self.write_cache();
        let mut loaded = 0;
        for row in rows {
            match serde_json::from_str::<Notification>(&row.payload) {
                Ok(mut notification) => {
                    notification.read = row.read;
                    cache.insert(notification.id.clone(), notification);
                    loaded += 1;
                }
                Err(e) => log::warn!("Skipping notification {} with bad payload: {}", row.id, e),
            }
        }
        log::debug!("Loaded {} notification(s) from database", loaded);
        Ok(loaded)
    }

    /// All notifications, newest first.
    pub fn list(&self) -> Vec<Notification> {
        let mut all: Vec<Notification> = self.read_cache().values().cloned().collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.read_cache().get(id).cloned()
    }

    pub fn unread_count(&self) -> usize {
        self.read_cache().values().filter(|n| !n.read).count()
    }

    /// Marks one notification read. Returns false for unknown ids.
    pub fn mark_read(&self, id: &str) -> bool {
        let update = NotificationUpdate {
            read: Some(true),
            ..Default::default()
        };
        self.apply_update(id, update).is_some()
    }

    /// Marks every notification read, returning how many changed.
    pub fn mark_all_read(&self) -> usize {
        let changed: Vec<Notification> = {
            let mut cache = self.write_cache();
            cache
                .values_mut()
                .filter(|n| !n.read)
                .map(|n| {
                    n.read = true;
                    n.clone()
                })
                .collect()
        };
        for notification in &changed {
            self.persist(notification);
            self.send(NotificationEvent::Updated {
                notification: notification.clone(),
            });
        }
        changed.len()
    }

    /// Removes one notification. Returns false for unknown ids.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.write_cache().remove(id).is_some();
        if !removed {
            return false;
        }
        self.write(WriteOp::Delete(id.to_string()));
        self.send(NotificationEvent::Removed { id: id.to_string() });
        true
    }

    /// Removes every notification.
    pub fn clear(&self) {
        let ids: Vec<String> = self.write_cache().drain().map(|(id, _)| id).collect();
        self.write(WriteOp::DeleteAll);
        for id in ids {
            self.send(NotificationEvent::Removed { id });
        }
    }

    /// Applies an update as one read-modify-write over the cached value.
    fn apply_update(&self, id: &str, update: NotificationUpdate) -> Option<Notification> {
        let updated = {
            let mut cache = self.write_cache();
            let notification = cache.get_mut(id)?;
            notification.apply(update);
            notification.clone()
        };
        self.persist(&updated);
        self.send(NotificationEvent::Updated {
            notification: updated.clone(),
        });
        Some(updated)
    }

    /// Waits until every change made so far has reached the database.
    pub async fn flush(&self) {
        let (done, flushed) = oneshot::channel();
        self.write(WriteOp::Flush(done));
        // A dropped sender means the op was applied inline or there is no database.
        let _ = flushed.await;
    }

    fn persist(&self, notification: &Notification) {
        if self.inner.db.is_none() {
            return;
        }
        match to_row(notification) {
            Ok(row) => self.write(WriteOp::Upsert(row)),
            Err(e) => log::error!("Failed to persist notification {}: {}", notification.id, e),
        }
    }

    /// Queues `op` for the writer thread, or applies it inline without one.
    fn write(&self, op: WriteOp) {
        let Some(db) = &self.inner.db else {
            return;
        };
        let op = match &self.inner.writer {
            Some(writer) => match writer.submit(op) {
                Ok(()) => return,
                Err(op) => op,
            },
            None => op,
        };
        op.apply(db);
    }

    fn send(&self, event: NotificationEvent) {
        // No active receivers is fine.
        let _ = self.inner.sender.send(event);
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<String, Notification>> {
        match self.inner.cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Notification cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<String, Notification>> {
        match self.inner.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Notification cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl NotificationStore for NotificationFeed {
    fn add_notification(&self, input: NewNotification) -> String {
        let id = Uuid::new_v4().to_string();
        let notification = Notification::create(id.clone(), input);

        self.write_cache()
            .insert(id.clone(), notification.clone());
        self.persist(&notification);
        self.send(NotificationEvent::Added { notification });
        id
    }

    fn update_notification(&self, id: &str, update: NotificationUpdate) {
        if self.apply_update(id, update).is_none() {
            log::debug!("Ignoring update for unknown notification {}", id);
        }
    }
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn to_row(notification: &Notification) -> Result<NotificationRow, DatabaseError> {
    let payload = serde_json::to_string(notification).map_err(|e| DatabaseError::Json {
        column: "payload",
        source: e,
    })?;
    Ok(NotificationRow {
        id: notification.id.clone(),
        payload,
        read: notification.read,
        created_at: format_timestamp(notification.timestamp),
        updated_at: format_timestamp(Utc::now()),
    })
}
