//! Announcements and their notification fan-out.

use crate::{
    error::{Error, Result},
    membership,
    models::{Announcement, ClubMember, NewAnnouncement, NotificationKind, Role, TargetGroup},
    notifications,
    store::DynStore,
    validate,
};
use chrono::Utc;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Who an announcement is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Audience {
    All,
    Members,
    Officers,
    Custom { recipients: Vec<i32> },
}

impl Default for Audience {
    fn default() -> Self {
        Audience::All
    }
}

impl Audience {
    fn target_group(&self) -> TargetGroup {
        match self {
            Audience::All => TargetGroup::All,
            Audience::Members => TargetGroup::Members,
            Audience::Officers => TargetGroup::Officers,
            Audience::Custom { .. } => TargetGroup::Custom,
        }
    }

    /// Recipients among the club's rows, deduplicated and without the author.
    fn resolve(&self, members: &[ClubMember], author: i32) -> Vec<i32> {
        let ids: Vec<i32> = match self {
            Audience::Custom { recipients } => recipients.clone(),
            Audience::All => members
                .iter()
                .filter(|m| m.is_active())
                .map(|m| m.user_id)
                .collect(),
            Audience::Members => members
                .iter()
                .filter(|m| m.is_active() && m.role == Role::Member)
                .map(|m| m.user_id)
                .collect(),
            Audience::Officers => members
                .iter()
                .filter(|m| m.can_act_as(Role::Officer))
                .map(|m| m.user_id)
                .collect(),
        };
        ids.into_iter().filter(|&id| id != author).unique().collect()
    }
}

/// Hand-picked recipients must be real users, and active members when the
/// announcement belongs to a club.
async fn check_recipients(
    store: &DynStore,
    club_id: Option<i32>,
    members: &[ClubMember],
    recipients: &[i32],
) -> Result<()> {
    for &user_id in recipients {
        let known = match club_id {
            Some(_) => members
                .iter()
                .any(|m| m.user_id == user_id && m.is_active()),
            None => store.find_user(user_id).await?.is_some(),
        };
        if !known {
            return Err(Error::validation(match club_id {
                Some(_) => format!("recipient {user_id} is not an active member of the club"),
                None => format!("recipient {user_id} does not exist"),
            }));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnouncement {
    pub club_id: Option<i32>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub audience: Audience,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementQuery {
    pub club_id: Option<i32>,
}

/// Writes the announcement and one notification per recipient together.
#[instrument(skip(store, req), fields(club_id = ?req.club_id))]
pub async fn post(store: &DynStore, author: i32, req: CreateAnnouncement) -> Result<Announcement> {
    let title = validate::required("title", &req.title)?;
    let content = validate::required("content", &req.content)?;

    let members = match req.club_id {
        Some(club_id) => {
            store
                .find_club(club_id)
                .await?
                .ok_or(Error::NotFound("club"))?;
            membership::require_role(store, club_id, author, Role::Officer).await?;
            store.list_members(club_id).await?
        }
        None if matches!(req.audience, Audience::Custom { .. }) => Vec::new(),
        None => {
            return Err(Error::validation(
                "announcements without a club need explicit recipients",
            ))
        }
    };
    let recipients = req.audience.resolve(&members, author);
    if let Audience::Custom { .. } = req.audience {
        check_recipients(store, req.club_id, &members, &recipients).await?;
    }

    let drafts = recipients
        .iter()
        .map(|&user_id| {
            notifications::draft(
                user_id,
                NotificationKind::Announcement,
                title.clone(),
                content.clone(),
                None,
            )
        })
        .collect();
    let announcement = store
        .insert_announcement(
            NewAnnouncement {
                club_id: req.club_id,
                title,
                content,
                created_by: author,
                target_group: req.audience.target_group(),
                recipients,
                created_at: Utc::now(),
            },
            drafts,
        )
        .await?;
    tracing::info!(
        announcement_id = announcement.id,
        recipients = announcement.recipients.len(),
        "announcement posted"
    );
    Ok(announcement)
}

/// Club announcements are visible to the club's active members. Platform
/// announcements only to their author and recipients.
pub async fn list(
    store: &DynStore,
    viewer: i32,
    query: AnnouncementQuery,
) -> Result<Vec<Announcement>> {
    match query.club_id {
        Some(club_id) => {
            membership::require_role(store, club_id, viewer, Role::Member).await?;
            store.list_announcements(Some(club_id)).await
        }
        None => Ok(store
            .list_announcements(None)
            .await?
            .into_iter()
            .filter(|a| a.created_by == viewer || a.recipients.contains(&viewer))
            .collect()),
    }
}
