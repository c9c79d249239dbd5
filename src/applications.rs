//! Join applications: pending until an officer or admin decides, once.

use crate::{
    error::{Error, Result},
    models::{
        ApplicationStatus, ClubApplication, MemberStatus, NewClubApplication, NewClubMember,
        NotificationKind, Role,
    },
    membership, notifications,
    store::{DynStore, ReviewCommit, ReviewOutcome},
};
use chrono::Utc;
use tracing::instrument;

#[instrument(skip(store, cover_letter))]
pub async fn apply(
    store: &DynStore,
    club_id: i32,
    user_id: i32,
    cover_letter: String,
) -> Result<ClubApplication> {
    let club = store
        .find_club(club_id)
        .await?
        .ok_or(Error::NotFound("club"))?;
    if !club.is_active {
        return Err(Error::invalid_state("club is not accepting applications"));
    }

    let application = store
        .insert_application(NewClubApplication {
            club_id,
            user_id,
            cover_letter: cover_letter.trim().to_string(),
            status: ApplicationStatus::Pending,
            submitted_at: Utc::now(),
        })
        .await?;
    tracing::info!(application_id = application.id, "application submitted");
    Ok(application)
}

/// Accepting adds the applicant as an active member; either way the applicant
/// gets one notification. Everything lands in one store commit.
#[instrument(skip(store))]
pub async fn review(
    store: &DynStore,
    application_id: i32,
    decision: ApplicationStatus,
    reviewer_id: i32,
) -> Result<ReviewOutcome> {
    if decision == ApplicationStatus::Pending {
        return Err(Error::validation("decision must be accepted or rejected"));
    }
    let application = store
        .find_application(application_id)
        .await?
        .ok_or(Error::NotFound("application"))?;
    membership::require_role(store, application.club_id, reviewer_id, Role::Officer).await?;
    if application.status != ApplicationStatus::Pending {
        return Err(Error::AlreadyReviewed);
    }

    let club_name = store
        .find_club(application.club_id)
        .await?
        .map(|c| c.name)
        .unwrap_or_else(|| "the club".to_string());
    let now = Utc::now();
    let (membership, title, message) = match decision {
        ApplicationStatus::Accepted => (
            Some(NewClubMember {
                club_id: application.club_id,
                user_id: application.user_id,
                role: Role::Member,
                status: MemberStatus::Active,
                joined_at: now,
            }),
            "Application accepted",
            format!("Welcome to {club_name}! Your application was accepted."),
        ),
        _ => (
            None,
            "Application declined",
            format!("Your application to {club_name} was not accepted this time."),
        ),
    };

    let outcome = store
        .commit_review(ReviewCommit {
            application_id,
            decision,
            reviewer_id,
            reviewed_at: now,
            membership,
            notification: notifications::draft(
                application.user_id,
                NotificationKind::Application,
                title,
                message,
                Some(application_id),
            ),
        })
        .await?;
    tracing::info!(status = %decision, "application reviewed");
    Ok(outcome)
}

#[instrument(skip(store))]
pub async fn withdraw(store: &DynStore, application_id: i32, requester_id: i32) -> Result<()> {
    let application = store
        .find_application(application_id)
        .await?
        .ok_or(Error::NotFound("application"))?;
    if application.user_id != requester_id {
        return Err(Error::forbidden("only the applicant can withdraw"));
    }
    if application.status != ApplicationStatus::Pending {
        return Err(Error::invalid_state(
            "only pending applications can be withdrawn",
        ));
    }
    store.delete_pending_application(application_id).await
}

pub async fn list_for_user(store: &DynStore, user_id: i32) -> Result<Vec<ClubApplication>> {
    store.list_user_applications(user_id).await
}

pub async fn list_for_club(
    store: &DynStore,
    club_id: i32,
    actor: i32,
    status: Option<ApplicationStatus>,
) -> Result<Vec<ClubApplication>> {
    membership::require_role(store, club_id, actor, Role::Officer).await?;
    store.list_club_applications(club_id, status).await
}
