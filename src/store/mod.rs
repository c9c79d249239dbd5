//! Persistence behind a single trait.
//!
//! Every method that has to be atomic (an insert plus the derived writes it
//! implies) is one call here, so each backend can make it atomic on its own
//! terms: a transaction for Postgres, one lock scope for the in-memory store.

use crate::{error::{Error, Result}, models::*};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumString};

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::{connect_to_db, DbPool, PgStore};

pub type DynStore = Arc<dyn Store>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubFilter {
    pub category: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub club_id: Option<i32>,
    pub after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct CampaignFilter {
    pub club_id: Option<i32>,
    pub active: Option<bool>,
}

/// Everything a review writes, applied all-or-nothing.
#[derive(Debug, Clone)]
pub struct ReviewCommit {
    pub application_id: i32,
    pub decision: ApplicationStatus,
    pub reviewer_id: i32,
    pub reviewed_at: DateTime<Utc>,
    pub membership: Option<NewClubMember>,
    pub notification: NewNotification,
}

#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub application: ClubApplication,
    pub member: Option<ClubMember>,
    pub notification: Notification,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentKind {
    Rsvp,
    Donation,
    DuesPayment,
}

/// Points at one payable row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRef {
    pub kind: PaymentKind,
    pub record_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub reference: PaymentRef,
    pub amount: i32,
    pub status: PaymentStatus,
    pub intent_id: Option<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // users
    async fn insert_user(&self, user: NewUser) -> Result<User>;
    async fn find_user(&self, id: i32) -> Result<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn update_user(&self, id: i32, changes: UserChanges) -> Result<User>;

    // sessions
    async fn insert_session(&self, session: Session) -> Result<()>;
    async fn find_session(&self, id: &str) -> Result<Option<Session>>;
    async fn delete_session(&self, id: &str) -> Result<()>;

    // clubs; the creator's admin membership is written with the club
    async fn insert_club(&self, club: NewClub) -> Result<(Club, ClubMember)>;
    async fn find_club(&self, id: i32) -> Result<Option<Club>>;
    async fn list_clubs(&self, filter: ClubFilter) -> Result<Vec<Club>>;
    async fn update_club(&self, id: i32, changes: ClubChanges) -> Result<Club>;

    // members
    async fn find_member(&self, club_id: i32, user_id: i32) -> Result<Option<ClubMember>>;
    async fn find_member_by_id(&self, id: i32) -> Result<Option<ClubMember>>;
    async fn list_members(&self, club_id: i32) -> Result<Vec<ClubMember>>;
    async fn list_memberships(&self, user_id: i32) -> Result<Vec<ClubMember>>;
    /// Conflict when an active row exists; an inactive or pending row is reinstated.
    async fn insert_member(&self, member: NewClubMember) -> Result<ClubMember>;
    /// Fails with `LastAdmin` instead of leaving the club without an active admin.
    async fn update_member(&self, id: i32, changes: MemberChanges) -> Result<ClubMember>;
    /// Same guard as `update_member`.
    async fn delete_member(&self, id: i32) -> Result<ClubMember>;

    // applications
    /// `AlreadyMember` / `DuplicatePending` are decided inside the same transaction.
    async fn insert_application(&self, application: NewClubApplication) -> Result<ClubApplication>;
    async fn find_application(&self, id: i32) -> Result<Option<ClubApplication>>;
    async fn list_club_applications(
        &self,
        club_id: i32,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ClubApplication>>;
    async fn list_user_applications(&self, user_id: i32) -> Result<Vec<ClubApplication>>;
    /// `AlreadyReviewed` unless the application is still pending.
    async fn commit_review(&self, review: ReviewCommit) -> Result<ReviewOutcome>;
    /// `InvalidState` unless the application is still pending.
    async fn delete_pending_application(&self, id: i32) -> Result<()>;

    // events
    async fn insert_event(&self, event: NewEvent) -> Result<Event>;
    async fn find_event(&self, id: i32) -> Result<Option<Event>>;
    async fn list_events(&self, filter: EventFilter) -> Result<Vec<Event>>;
    async fn update_event(&self, id: i32, changes: EventChanges) -> Result<Event>;
    async fn delete_event(&self, id: i32) -> Result<()>;
    async fn insert_rsvp(&self, rsvp: NewRsvp) -> Result<Rsvp>;
    async fn list_rsvps(&self, event_id: i32) -> Result<Vec<Rsvp>>;

    // fundraising
    async fn insert_campaign(&self, campaign: NewCampaign) -> Result<Campaign>;
    async fn find_campaign(&self, id: i32) -> Result<Option<Campaign>>;
    async fn list_campaigns(&self, filter: CampaignFilter) -> Result<Vec<Campaign>>;
    async fn update_campaign(&self, id: i32, changes: CampaignChanges) -> Result<Campaign>;
    /// Inserts and bumps the campaign total in one step.
    async fn insert_donation(&self, donation: NewDonation) -> Result<Donation>;
    async fn list_donations(&self, campaign_id: i32) -> Result<Vec<Donation>>;

    // dues
    async fn insert_dues(&self, dues: NewClubDues) -> Result<ClubDues>;
    async fn find_dues(&self, id: i32) -> Result<Option<ClubDues>>;
    async fn list_dues(&self, club_id: i32, active_only: bool) -> Result<Vec<ClubDues>>;
    async fn update_dues(&self, id: i32, changes: DuesChanges) -> Result<ClubDues>;
    async fn insert_dues_payment(&self, payment: NewDuesPayment) -> Result<DuesPayment>;
    async fn list_dues_payments(&self, dues_id: i32) -> Result<Vec<DuesPayment>>;
    async fn list_user_dues_payments(&self, user_id: i32) -> Result<Vec<DuesPayment>>;

    // announcements and notifications
    async fn insert_announcement(
        &self,
        announcement: NewAnnouncement,
        notifications: Vec<NewNotification>,
    ) -> Result<Announcement>;
    async fn list_announcements(&self, club_id: Option<i32>) -> Result<Vec<Announcement>>;
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification>;
    async fn find_notification(&self, id: i32) -> Result<Option<Notification>>;
    async fn list_notifications(&self, user_id: i32) -> Result<Vec<Notification>>;
    async fn mark_notification_read(&self, id: i32) -> Result<Notification>;
    async fn mark_all_notifications_read(&self, user_id: i32) -> Result<usize>;

    // payments
    async fn find_payment(&self, reference: PaymentRef) -> Result<Option<PaymentRecord>>;
    /// Stores `intent_id` unless the record already carries an intent, and
    /// returns whichever intent id the record holds afterwards.
    async fn attach_payment_intent(
        &self,
        reference: PaymentRef,
        intent_id: &str,
    ) -> Result<String>;
    /// Writes the new status and returns the previous one. The transition is
    /// checked against the row as locked for the write. Donation transitions
    /// into and out of `failed` move the campaign total.
    async fn set_payment_status(
        &self,
        reference: PaymentRef,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<PaymentStatus>;
}

/// Whether applying `after` (or deleting, when `None`) takes away one of the
/// club's active admins. The caller still has to check whether another one
/// remains.
pub(crate) fn drops_admin(member: &ClubMember, after: Option<(Role, MemberStatus)>) -> bool {
    let is_admin = |role, status| role == Role::Admin && status == MemberStatus::Active;
    is_admin(member.role, member.status)
        && !after.map_or(false, |(role, status)| is_admin(role, status))
}

/// Whether a payment may move from `from` to `to`. Repeating the current
/// status is allowed and changes nothing; `completed` is terminal.
pub fn can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    use PaymentStatus::*;
    from == to
        || matches!(
            (from, to),
            (Pending, Completed) | (Pending, Failed) | (Failed, Completed)
        )
}

pub(crate) fn check_transition(from: PaymentStatus, to: PaymentStatus) -> Result<()> {
    if !can_transition(from, to) {
        return Err(Error::invalid_state(format!(
            "payment cannot move from {from} to {to}"
        )));
    }
    Ok(())
}

/// A campaign total after `delta`; totals stay within `INT4`.
pub(crate) fn adjusted_total(current: i32, delta: i32) -> Result<i32> {
    current
        .checked_add(delta)
        .ok_or_else(|| Error::validation("campaign total would overflow"))
}

/// How a donation status change moves its campaign total.
pub(crate) fn donation_adjustment(from: PaymentStatus, to: PaymentStatus, amount: i32) -> i32 {
    match (from, to) {
        (PaymentStatus::Failed, PaymentStatus::Failed) => 0,
        (_, PaymentStatus::Failed) => -amount,
        (PaymentStatus::Failed, _) => amount,
        _ => 0,
    }
}
