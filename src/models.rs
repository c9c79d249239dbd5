use crate::schema::*;
use chrono::{DateTime, Utc};
use diesel::{
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    pg::{Pg, PgValue},
    prelude::*,
    serialize::{self, IsNull, Output, ToSql},
    sql_types::{Jsonb, Text},
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use strum::{AsRefStr, Display, EnumString};

/// Maps a string-backed enum onto a `Text` column.
macro_rules! text_column {
    ($($ty:ty),+ $(,)?) => {$(
        impl ToSql<Text, Pg> for $ty {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_ref().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $ty {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                Ok(std::str::from_utf8(bytes.as_bytes())?.parse()?)
            }
        }
    )+};
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    AsExpression, FromSqlRow, EnumString, AsRefStr, Display,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Member,
    Officer,
    Admin,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
    EnumString, AsRefStr, Display,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemberStatus {
    Active,
    Inactive,
    Pending,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
    EnumString, AsRefStr, Display,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
    EnumString, AsRefStr, Display,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Free records need no provider confirmation.
    pub fn initial_for(amount: i32) -> PaymentStatus {
        if amount == 0 {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Pending
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
    EnumString, AsRefStr, Display,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DuesFrequency {
    Monthly,
    Semester,
    Yearly,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
    EnumString, AsRefStr, Display,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    Announcement,
    Application,
    Event,
    Campaign,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
    EnumString, AsRefStr, Display,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TargetGroup {
    All,
    Members,
    Officers,
    Custom,
}

text_column!(
    Role,
    MemberStatus,
    ApplicationStatus,
    PaymentStatus,
    DuesFrequency,
    NotificationKind,
    TargetGroup,
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignTier {
    pub id: String,
    pub name: String,
    pub amount: i32,
    pub description: String,
    #[serde(default)]
    pub perks: Vec<String>,
}

/// Donation tiers, stored as a `jsonb` array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Jsonb)]
#[serde(transparent)]
pub struct Tiers(pub Vec<CampaignTier>);

impl Tiers {
    pub fn find(&self, id: &str) -> Option<&CampaignTier> {
        self.0.iter().find(|t| t.id == id)
    }
}

impl ToSql<Jsonb, Pg> for Tiers {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        // jsonb wire format version
        out.write_all(&[1])?;
        serde_json::to_writer(out, &self.0)?;
        Ok(IsNull::No)
    }
}

impl FromSql<Jsonb, Pg> for Tiers {
    fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
        match value.as_bytes().split_first() {
            Some((&1, json)) => Ok(Tiers(serde_json::from_slice(json)?)),
            _ => Err("unsupported jsonb encoding".into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Queryable)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What other users get to see of a profile.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            avatar: user.avatar,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = users)]
#[serde(rename_all = "camelCase")]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = sessions)]
pub struct Session {
    pub id: String,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable)]
#[serde(rename_all = "camelCase")]
pub struct Club {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub logo: Option<String>,
    pub banner: Option<String>,
    pub max_members: Option<i32>,
    pub is_active: bool,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = clubs)]
pub struct NewClub {
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub logo: Option<String>,
    pub banner: Option<String>,
    pub max_members: Option<i32>,
    pub is_active: bool,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = clubs)]
#[serde(rename_all = "camelCase")]
pub struct ClubChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub logo: Option<String>,
    pub banner: Option<String>,
    pub max_members: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable)]
#[serde(rename_all = "camelCase")]
pub struct ClubMember {
    pub id: i32,
    pub club_id: i32,
    pub user_id: i32,
    pub role: Role,
    pub status: MemberStatus,
    pub joined_at: DateTime<Utc>,
}

impl ClubMember {
    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }

    /// Active and at least `minimum` in the member < officer < admin order.
    pub fn can_act_as(&self, minimum: Role) -> bool {
        self.is_active() && self.role >= minimum
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = club_members)]
pub struct NewClubMember {
    pub club_id: i32,
    pub user_id: i32,
    pub role: Role,
    pub status: MemberStatus,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, AsChangeset)]
#[diesel(table_name = club_members)]
pub struct MemberChanges {
    pub role: Option<Role>,
    pub status: Option<MemberStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable)]
#[serde(rename_all = "camelCase")]
pub struct ClubApplication {
    pub id: i32,
    pub club_id: i32,
    pub user_id: i32,
    pub cover_letter: String,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<i32>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = club_applications)]
pub struct NewClubApplication {
    pub club_id: i32,
    pub user_id: i32,
    pub cover_letter: String,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i32,
    pub club_id: Option<i32>,
    pub title: String,
    pub description: String,
    pub banner: Option<String>,
    pub date: DateTime<Utc>,
    pub location: Option<String>,
    pub capacity: Option<i32>,
    pub price: i32,
    pub requires_payment: bool,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Server-side ticket total; the client's figure is never used.
    pub fn ticket_total(&self, tickets: i32) -> Option<i32> {
        if self.requires_payment {
            self.price.checked_mul(tickets)
        } else {
            Some(0)
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = events)]
pub struct NewEvent {
    pub club_id: Option<i32>,
    pub title: String,
    pub description: String,
    pub banner: Option<String>,
    pub date: DateTime<Utc>,
    pub location: Option<String>,
    pub capacity: Option<i32>,
    pub price: i32,
    pub requires_payment: bool,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = events)]
#[serde(rename_all = "camelCase")]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub banner: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub capacity: Option<i32>,
    pub price: Option<i32>,
    pub requires_payment: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Queryable)]
#[serde(rename_all = "camelCase")]
pub struct Rsvp {
    pub id: i32,
    pub event_id: i32,
    pub user_id: Option<i32>,
    pub attendee_name: String,
    pub attendee_email: String,
    pub tickets_purchased: i32,
    pub total_amount: i32,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = rsvps)]
pub struct NewRsvp {
    pub event_id: i32,
    pub user_id: Option<i32>,
    pub attendee_name: String,
    pub attendee_email: String,
    pub tickets_purchased: i32,
    pub total_amount: i32,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: i32,
    pub club_id: Option<i32>,
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub goal_amount: i32,
    pub current_amount: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub tiers: Tiers,
    pub is_active: bool,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = campaigns)]
pub struct NewCampaign {
    pub club_id: Option<i32>,
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub goal_amount: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub tiers: Tiers,
    pub is_active: bool,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
}

/// `current_amount` is deliberately absent: only donations move it.
#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = campaigns)]
#[serde(rename_all = "camelCase")]
pub struct CampaignChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub goal_amount: Option<i32>,
    pub deadline: Option<DateTime<Utc>>,
    pub tiers: Option<Tiers>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Queryable)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: i32,
    pub campaign_id: i32,
    pub user_id: Option<i32>,
    pub donor_name: String,
    pub donor_email: String,
    pub amount: i32,
    pub tier_id: Option<String>,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = donations)]
pub struct NewDonation {
    pub campaign_id: i32,
    pub user_id: Option<i32>,
    pub donor_name: String,
    pub donor_email: String,
    pub amount: i32,
    pub tier_id: Option<String>,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable)]
#[serde(rename_all = "camelCase")]
pub struct ClubDues {
    pub id: i32,
    pub club_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub amount: i32,
    pub due_date: DateTime<Utc>,
    pub is_recurring: bool,
    pub frequency: Option<DuesFrequency>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = club_dues)]
pub struct NewClubDues {
    pub club_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub amount: i32,
    pub due_date: DateTime<Utc>,
    pub is_recurring: bool,
    pub frequency: Option<DuesFrequency>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = club_dues)]
#[serde(rename_all = "camelCase")]
pub struct DuesChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub amount: Option<i32>,
    pub due_date: Option<DateTime<Utc>>,
    pub is_recurring: Option<bool>,
    pub frequency: Option<DuesFrequency>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Queryable)]
#[serde(rename_all = "camelCase")]
pub struct DuesPayment {
    pub id: i32,
    pub dues_id: i32,
    pub user_id: i32,
    pub amount: i32,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = dues_payments)]
pub struct NewDuesPayment {
    pub dues_id: i32,
    pub user_id: i32,
    pub amount: i32,
    pub payment_status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: i32,
    pub club_id: Option<i32>,
    pub title: String,
    pub content: String,
    pub created_by: i32,
    pub target_group: TargetGroup,
    pub recipients: Vec<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = announcements)]
pub struct NewAnnouncement {
    pub club_id: Option<i32>,
    pub title: String,
    pub content: String,
    pub created_by: i32,
    pub target_group: TargetGroup,
    pub recipients: Vec<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: Option<i32>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub user_id: i32,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: Option<i32>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_ordered_by_privilege() {
        assert!(Role::Admin > Role::Officer);
        assert!(Role::Officer > Role::Member);
    }

    #[test]
    fn enums_round_trip_through_text() {
        assert_eq!("officer".parse::<Role>().unwrap(), Role::Officer);
        assert_eq!(PaymentStatus::Completed.as_ref(), "completed");
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn free_records_start_completed() {
        assert_eq!(PaymentStatus::initial_for(0), PaymentStatus::Completed);
        assert_eq!(PaymentStatus::initial_for(500), PaymentStatus::Pending);
    }

    #[test]
    fn inactive_admins_cannot_act() {
        let member = ClubMember {
            id: 1,
            club_id: 1,
            user_id: 1,
            role: Role::Admin,
            status: MemberStatus::Inactive,
            joined_at: Utc::now(),
        };
        assert!(!member.can_act_as(Role::Member));
    }
}
