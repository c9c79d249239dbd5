//! Club roles and the membership rows behind them.
//!
//! Officers manage day-to-day content, admins configure the club and its
//! roster. Only `active` rows grant anything.

use crate::{
    error::{Error, Result},
    models::{ClubMember, MemberChanges, MemberStatus, NewClubMember, Role},
    store::DynStore,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMember {
    pub user_id: i32,
    pub role: Option<Role>,
    pub status: Option<MemberStatus>,
}

pub async fn get_role(store: &DynStore, club_id: i32, user_id: i32) -> Result<Option<ClubMember>> {
    store.find_member(club_id, user_id).await
}

/// The caller's membership, if it is active and at least `minimum`.
pub async fn require_role(
    store: &DynStore,
    club_id: i32,
    user_id: i32,
    minimum: Role,
) -> Result<ClubMember> {
    match store.find_member(club_id, user_id).await? {
        Some(member) if member.can_act_as(minimum) => Ok(member),
        _ => Err(Error::forbidden(format!(
            "requires an active {minimum} role in this club"
        ))),
    }
}

pub async fn list_members(store: &DynStore, club_id: i32) -> Result<Vec<ClubMember>> {
    store
        .find_club(club_id)
        .await?
        .ok_or(Error::NotFound("club"))?;
    store.list_members(club_id).await
}

#[instrument(skip(store))]
pub async fn add_member(
    store: &DynStore,
    actor: i32,
    club_id: i32,
    req: AddMember,
) -> Result<ClubMember> {
    store
        .find_club(club_id)
        .await?
        .ok_or(Error::NotFound("club"))?;
    require_role(store, club_id, actor, Role::Admin).await?;
    store
        .find_user(req.user_id)
        .await?
        .ok_or(Error::NotFound("user"))?;

    let member = store
        .insert_member(NewClubMember {
            club_id,
            user_id: req.user_id,
            role: req.role.unwrap_or(Role::Member),
            status: req.status.unwrap_or(MemberStatus::Active),
            joined_at: Utc::now(),
        })
        .await?;
    tracing::info!(member_id = member.id, role = %member.role, "member added");
    Ok(member)
}

/// Any admin may change any row, their own included, as long as an active
/// admin remains.
#[instrument(skip(store))]
pub async fn update_member(
    store: &DynStore,
    actor: i32,
    member_id: i32,
    changes: MemberChanges,
) -> Result<ClubMember> {
    let member = store
        .find_member_by_id(member_id)
        .await?
        .ok_or(Error::NotFound("club member"))?;
    require_role(store, member.club_id, actor, Role::Admin).await?;
    store.update_member(member_id, changes).await
}

/// Admins remove anyone; members may remove themselves.
#[instrument(skip(store))]
pub async fn remove_member(store: &DynStore, actor: i32, member_id: i32) -> Result<ClubMember> {
    let member = store
        .find_member_by_id(member_id)
        .await?
        .ok_or(Error::NotFound("club member"))?;
    if member.user_id != actor {
        require_role(store, member.club_id, actor, Role::Admin).await?;
    }
    let removed = store.delete_member(member_id).await?;
    tracing::info!(club_id = removed.club_id, user_id = removed.user_id, "member removed");
    Ok(removed)
}
