//! In-app inbox.

use crate::{
    error::{Error, Result},
    models::{NewNotification, Notification, NotificationKind},
    store::DynStore,
};
use chrono::Utc;
use tracing::instrument;

/// An unread notification row, not yet written.
pub fn draft(
    user_id: i32,
    kind: NotificationKind,
    title: impl Into<String>,
    message: impl Into<String>,
    related_id: Option<i32>,
) -> NewNotification {
    NewNotification {
        user_id,
        kind,
        title: title.into(),
        message: message.into(),
        related_id,
        is_read: false,
        created_at: Utc::now(),
    }
}

pub async fn notify(
    store: &DynStore,
    user_id: i32,
    kind: NotificationKind,
    title: &str,
    message: &str,
    related_id: Option<i32>,
) -> Result<Notification> {
    store
        .insert_notification(draft(user_id, kind, title, message, related_id))
        .await
}

pub async fn list(store: &DynStore, user_id: i32) -> Result<Vec<Notification>> {
    store.list_notifications(user_id).await
}

async fn owned(store: &DynStore, actor: i32, id: i32) -> Result<Notification> {
    let notification = store
        .find_notification(id)
        .await?
        .ok_or(Error::NotFound("notification"))?;
    if notification.user_id != actor {
        return Err(Error::forbidden("not your notification"));
    }
    Ok(notification)
}

pub async fn get(store: &DynStore, actor: i32, id: i32) -> Result<Notification> {
    owned(store, actor, id).await
}

#[instrument(skip(store))]
pub async fn mark_read(store: &DynStore, actor: i32, id: i32) -> Result<Notification> {
    let notification = owned(store, actor, id).await?;
    if notification.is_read {
        return Ok(notification);
    }
    store.mark_notification_read(id).await
}

#[instrument(skip(store))]
pub async fn mark_all_read(store: &DynStore, user_id: i32) -> Result<usize> {
    store.mark_all_notifications_read(user_id).await
}
