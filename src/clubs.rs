use crate::{
    error::{Error, Result},
    membership,
    models::{ApplicationStatus, Club, ClubChanges, ClubMember, MemberStatus, NewClub, Role},
    store::{CampaignFilter, ClubFilter, DynStore, EventFilter},
    validate,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClub {
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub logo: Option<String>,
    pub banner: Option<String>,
    pub max_members: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubStats {
    pub total_members: usize,
    pub pending_applications: usize,
    pub upcoming_events: usize,
    pub active_campaigns: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub club: Club,
    pub member: ClubMember,
}

fn max_members(value: Option<i32>) -> Result<Option<i32>> {
    value.map(|n| validate::positive("maxMembers", n)).transpose()
}

/// The creator is written as the club's first active admin in the same commit.
#[instrument(skip(store, req), fields(name = %req.name))]
pub async fn create(store: &DynStore, creator: i32, req: CreateClub) -> Result<(Club, ClubMember)> {
    let club = NewClub {
        name: validate::required("name", &req.name)?,
        description: req.description.trim().to_string(),
        category: req.category.filter(|c| !c.trim().is_empty()),
        logo: validate::url("logo", req.logo)?,
        banner: validate::url("banner", req.banner)?,
        max_members: max_members(req.max_members)?,
        is_active: true,
        created_by: creator,
        created_at: Utc::now(),
    };
    let (club, admin) = store.insert_club(club).await?;
    tracing::info!(club_id = club.id, "club created");
    Ok((club, admin))
}

pub async fn get(store: &DynStore, club_id: i32) -> Result<Club> {
    store
        .find_club(club_id)
        .await?
        .ok_or(Error::NotFound("club"))
}

pub async fn list(store: &DynStore, filter: ClubFilter) -> Result<Vec<Club>> {
    store.list_clubs(filter).await
}

#[instrument(skip(store))]
pub async fn update(
    store: &DynStore,
    actor: i32,
    club_id: i32,
    changes: ClubChanges,
) -> Result<Club> {
    get(store, club_id).await?;
    membership::require_role(store, club_id, actor, Role::Admin).await?;
    let changes = ClubChanges {
        name: changes
            .name
            .map(|n| validate::required("name", &n))
            .transpose()?,
        logo: validate::url("logo", changes.logo)?,
        banner: validate::url("banner", changes.banner)?,
        max_members: max_members(changes.max_members)?,
        ..changes
    };
    store.update_club(club_id, changes).await
}

pub async fn stats(store: &DynStore, club_id: i32) -> Result<ClubStats> {
    get(store, club_id).await?;
    let members = store.list_members(club_id).await?;
    let pending = store
        .list_club_applications(club_id, Some(ApplicationStatus::Pending))
        .await?;
    let upcoming = store
        .list_events(EventFilter {
            club_id: Some(club_id),
            after: Some(Utc::now()),
        })
        .await?;
    let campaigns = store
        .list_campaigns(CampaignFilter {
            club_id: Some(club_id),
            active: Some(true),
        })
        .await?;

    Ok(ClubStats {
        total_members: members
            .iter()
            .filter(|m| m.status == MemberStatus::Active)
            .count(),
        pending_applications: pending.len(),
        upcoming_events: upcoming.len(),
        active_campaigns: campaigns.len(),
    })
}

/// Clubs the user belongs to, active memberships only.
pub async fn for_user(store: &DynStore, user_id: i32) -> Result<Vec<Membership>> {
    let mut clubs = Vec::new();
    for member in store.list_memberships(user_id).await? {
        if !member.is_active() {
            continue;
        }
        if let Some(club) = store.find_club(member.club_id).await? {
            clubs.push(Membership { club, member });
        }
    }
    Ok(clubs)
}
