use super::{
    adjusted_total, check_transition, donation_adjustment, drops_admin, CampaignFilter,
    ClubFilter, EventFilter, PaymentKind, PaymentRecord, PaymentRef, ReviewCommit,
    ReviewOutcome, Store,
};
use crate::{
    error::{Error, Result, StoreError},
    models::*,
    retry::{self, RetryPolicy},
    schema::*,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
};
use diesel_async::{
    pooled_connection::{
        deadpool::{Object, Pool},
        AsyncDieselConnectionManager,
    },
    scoped_futures::ScopedFutureExt,
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
};

pub type DbPool = Pool<AsyncPgConnection>;
type Conn = Object<AsyncPgConnection>;

pub fn connect_to_db(db_url: &str) -> anyhow::Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);
    Pool::builder(manager)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build database pool: {e}"))
}

/// Maps a unique-constraint violation onto the domain error it stands for.
fn unique_violation(err: DieselError) -> Error {
    let known = match &err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            match info.constraint_name() {
                Some("users_username_key") => Some(Error::conflict("username has been taken")),
                Some("users_email_key") => Some(Error::conflict("email is already registered")),
                Some("clubs_name_key") => Some(Error::conflict("club name has been taken")),
                Some("club_members_club_user_key") => Some(Error::AlreadyMember),
                Some("club_applications_one_pending") => Some(Error::DuplicatePending),
                _ => None,
            }
        }
        _ => None,
    };
    known.unwrap_or_else(|| err.into())
}

/// An update with nothing to set is a lookup.
fn is_empty_changeset(result: &Result<impl Sized, DieselError>) -> bool {
    matches!(result, Err(DieselError::QueryBuilderError(_)))
}

/// Locks the club row; membership changes that can drop an admin serialize on it.
async fn lock_club(conn: &mut Conn, club_id: i32) -> Result<()> {
    clubs::table
        .find(club_id)
        .select(clubs::id)
        .for_update()
        .first::<i32>(conn)
        .await
        .optional()?
        .ok_or(Error::NotFound("club"))?;
    Ok(())
}

async fn has_other_admin(conn: &mut Conn, member: &ClubMember) -> Result<bool> {
    let admins: Vec<i32> = club_members::table
        .filter(club_members::club_id.eq(member.club_id))
        .filter(club_members::role.eq(Role::Admin))
        .filter(club_members::status.eq(MemberStatus::Active))
        .filter(club_members::id.ne(member.id))
        .select(club_members::id)
        .for_update()
        .load(conn)
        .await?;
    Ok(!admins.is_empty())
}

/// Loads a member, then locks its club before re-reading it.
async fn locked_member(conn: &mut Conn, id: i32) -> Result<ClubMember> {
    let club_id: i32 = club_members::table
        .find(id)
        .select(club_members::club_id)
        .first(conn)
        .await
        .optional()?
        .ok_or(Error::NotFound("club member"))?;
    lock_club(conn, club_id).await?;
    club_members::table
        .find(id)
        .first::<ClubMember>(conn)
        .await
        .optional()?
        .ok_or(Error::NotFound("club member"))
}

/// Locks the (club, user) membership row, if there is one.
async fn locked_pair(conn: &mut Conn, club_id: i32, user_id: i32) -> Result<Option<ClubMember>> {
    Ok(club_members::table
        .filter(club_members::club_id.eq(club_id))
        .filter(club_members::user_id.eq(user_id))
        .for_update()
        .first(conn)
        .await
        .optional()?)
}

async fn upsert_member(conn: &mut Conn, new: NewClubMember) -> Result<ClubMember> {
    match locked_pair(conn, new.club_id, new.user_id).await? {
        Some(member) if member.is_active() => Err(Error::AlreadyMember),
        existing => write_member(conn, existing, new).await,
    }
}

/// Reinstates `existing` with the new role and status, or inserts a fresh row.
async fn write_member(
    conn: &mut Conn,
    existing: Option<ClubMember>,
    new: NewClubMember,
) -> Result<ClubMember> {
    match existing {
        Some(member) => Ok(diesel::update(club_members::table.find(member.id))
            .set((
                club_members::role.eq(new.role),
                club_members::status.eq(new.status),
                club_members::joined_at.eq(new.joined_at),
            ))
            .get_result(conn)
            .await?),
        None => diesel::insert_into(club_members::table)
            .values(&new)
            .get_result(conn)
            .await
            .map_err(unique_violation),
    }
}

async fn load_payment(conn: &mut Conn, reference: PaymentRef) -> Result<Option<PaymentRecord>> {
    let id = reference.record_id;
    let found: Option<(i32, PaymentStatus, Option<String>)> = match reference.kind {
        PaymentKind::Rsvp => rsvps::table
            .find(id)
            .select((rsvps::total_amount, rsvps::payment_status, rsvps::payment_intent_id))
            .first(conn)
            .await
            .optional()?,
        PaymentKind::Donation => donations::table
            .find(id)
            .select((
                donations::amount,
                donations::payment_status,
                donations::payment_intent_id,
            ))
            .first(conn)
            .await
            .optional()?,
        PaymentKind::DuesPayment => dues_payments::table
            .find(id)
            .select((
                dues_payments::amount,
                dues_payments::payment_status,
                dues_payments::payment_intent_id,
            ))
            .first(conn)
            .await
            .optional()?,
    };
    Ok(found.map(|(amount, status, intent_id)| PaymentRecord {
        reference,
        amount,
        status,
        intent_id,
    }))
}

/// PostgreSQL store over a diesel-async connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    retry: RetryPolicy,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    async fn conn(&self) -> Result<Conn> {
        let pool = &self.pool;
        let conn = retry::with_backoff(&self.retry, move || async move {
            pool.get()
                .await
                .map_err(|e| StoreError::Pool(e.to_string()))
        })
        .await?;
        Ok(conn)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, new: NewUser) -> Result<User> {
        let conn = &mut self.conn().await?;
        diesel::insert_into(users::table)
            .values(&new)
            .get_result(conn)
            .await
            .map_err(unique_violation)
    }

    async fn find_user(&self, id: i32) -> Result<Option<User>> {
        let conn = &mut self.conn().await?;
        Ok(users::table.find(id).first(conn).await.optional()?)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = &mut self.conn().await?;
        Ok(users::table
            .filter(users::username.eq(username))
            .first(conn)
            .await
            .optional()?)
    }

    async fn update_user(&self, id: i32, changes: UserChanges) -> Result<User> {
        let conn = &mut self.conn().await?;
        let updated = diesel::update(users::table.find(id))
            .set(&changes)
            .get_result::<User>(conn)
            .await;
        let user = if is_empty_changeset(&updated) {
            users::table.find(id).first(conn).await.optional()?
        } else {
            updated.optional()?
        };
        user.ok_or(Error::NotFound("user"))
    }

    async fn insert_session(&self, session: Session) -> Result<()> {
        let conn = &mut self.conn().await?;
        diesel::insert_into(sessions::table)
            .values(&session)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn find_session(&self, id: &str) -> Result<Option<Session>> {
        let conn = &mut self.conn().await?;
        Ok(sessions::table.find(id).first(conn).await.optional()?)
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        let conn = &mut self.conn().await?;
        diesel::delete(sessions::table.find(id)).execute(conn).await?;
        Ok(())
    }

    async fn insert_club(&self, new: NewClub) -> Result<(Club, ClubMember)> {
        let conn = &mut self.conn().await?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let club: Club = diesel::insert_into(clubs::table)
                    .values(&new)
                    .get_result(conn)
                    .await
                    .map_err(unique_violation)?;
                let admin = upsert_member(
                    conn,
                    NewClubMember {
                        club_id: club.id,
                        user_id: club.created_by,
                        role: Role::Admin,
                        status: MemberStatus::Active,
                        joined_at: club.created_at,
                    },
                )
                .await?;
                Ok((club, admin))
            }
            .scope_boxed()
        })
        .await
    }

    async fn find_club(&self, id: i32) -> Result<Option<Club>> {
        let conn = &mut self.conn().await?;
        Ok(clubs::table.find(id).first(conn).await.optional()?)
    }

    async fn list_clubs(&self, filter: ClubFilter) -> Result<Vec<Club>> {
        let conn = &mut self.conn().await?;
        let mut query = clubs::table.into_boxed();
        if let Some(category) = filter.category {
            query = query.filter(clubs::category.eq(category));
        }
        if let Some(active) = filter.active {
            query = query.filter(clubs::is_active.eq(active));
        }
        Ok(query.order(clubs::name.asc()).load(conn).await?)
    }

    async fn update_club(&self, id: i32, changes: ClubChanges) -> Result<Club> {
        let conn = &mut self.conn().await?;
        let updated = diesel::update(clubs::table.find(id))
            .set(&changes)
            .get_result::<Club>(conn)
            .await;
        let club = if is_empty_changeset(&updated) {
            clubs::table.find(id).first(conn).await.optional()?
        } else {
            updated.optional().map_err(unique_violation)?
        };
        club.ok_or(Error::NotFound("club"))
    }

    async fn find_member(&self, club_id: i32, user_id: i32) -> Result<Option<ClubMember>> {
        let conn = &mut self.conn().await?;
        Ok(club_members::table
            .filter(club_members::club_id.eq(club_id))
            .filter(club_members::user_id.eq(user_id))
            .first(conn)
            .await
            .optional()?)
    }

    async fn find_member_by_id(&self, id: i32) -> Result<Option<ClubMember>> {
        let conn = &mut self.conn().await?;
        Ok(club_members::table.find(id).first(conn).await.optional()?)
    }

    async fn list_members(&self, club_id: i32) -> Result<Vec<ClubMember>> {
        let conn = &mut self.conn().await?;
        Ok(club_members::table
            .filter(club_members::club_id.eq(club_id))
            .order(club_members::id.asc())
            .load(conn)
            .await?)
    }

    async fn list_memberships(&self, user_id: i32) -> Result<Vec<ClubMember>> {
        let conn = &mut self.conn().await?;
        Ok(club_members::table
            .filter(club_members::user_id.eq(user_id))
            .order(club_members::id.asc())
            .load(conn)
            .await?)
    }

    async fn insert_member(&self, new: NewClubMember) -> Result<ClubMember> {
        let conn = &mut self.conn().await?;
        conn.transaction::<_, Error, _>(|conn| upsert_member(conn, new).scope_boxed())
            .await
            .map_err(|e| match e {
                Error::AlreadyMember => Error::conflict("user is already an active member"),
                e => e,
            })
    }

    async fn update_member(&self, id: i32, changes: MemberChanges) -> Result<ClubMember> {
        let conn = &mut self.conn().await?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let member = locked_member(conn, id).await?;
                let role = changes.role.unwrap_or(member.role);
                let status = changes.status.unwrap_or(member.status);
                if drops_admin(&member, Some((role, status)))
                    && !has_other_admin(conn, &member).await?
                {
                    return Err(Error::LastAdmin);
                }
                Ok(diesel::update(club_members::table.find(id))
                    .set((club_members::role.eq(role), club_members::status.eq(status)))
                    .get_result(conn)
                    .await?)
            }
            .scope_boxed()
        })
        .await
    }

    async fn delete_member(&self, id: i32) -> Result<ClubMember> {
        let conn = &mut self.conn().await?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let member = locked_member(conn, id).await?;
                if drops_admin(&member, None) && !has_other_admin(conn, &member).await? {
                    return Err(Error::LastAdmin);
                }
                diesel::delete(club_members::table.find(id))
                    .execute(conn)
                    .await?;
                Ok(member)
            }
            .scope_boxed()
        })
        .await
    }

    async fn insert_application(&self, new: NewClubApplication) -> Result<ClubApplication> {
        let conn = &mut self.conn().await?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let active: i64 = club_members::table
                    .filter(club_members::club_id.eq(new.club_id))
                    .filter(club_members::user_id.eq(new.user_id))
                    .filter(club_members::status.eq(MemberStatus::Active))
                    .count()
                    .get_result(conn)
                    .await?;
                if active > 0 {
                    return Err(Error::AlreadyMember);
                }
                let pending: i64 = club_applications::table
                    .filter(club_applications::club_id.eq(new.club_id))
                    .filter(club_applications::user_id.eq(new.user_id))
                    .filter(club_applications::status.eq(ApplicationStatus::Pending))
                    .count()
                    .get_result(conn)
                    .await?;
                if pending > 0 {
                    return Err(Error::DuplicatePending);
                }
                // a concurrent insert still trips the partial unique index
                diesel::insert_into(club_applications::table)
                    .values(&new)
                    .get_result(conn)
                    .await
                    .map_err(unique_violation)
            }
            .scope_boxed()
        })
        .await
    }

    async fn find_application(&self, id: i32) -> Result<Option<ClubApplication>> {
        let conn = &mut self.conn().await?;
        Ok(club_applications::table
            .find(id)
            .first(conn)
            .await
            .optional()?)
    }

    async fn list_club_applications(
        &self,
        club_id: i32,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ClubApplication>> {
        let conn = &mut self.conn().await?;
        let mut query = club_applications::table
            .filter(club_applications::club_id.eq(club_id))
            .into_boxed();
        if let Some(status) = status {
            query = query.filter(club_applications::status.eq(status));
        }
        Ok(query
            .order(club_applications::id.desc())
            .load(conn)
            .await?)
    }

    async fn list_user_applications(&self, user_id: i32) -> Result<Vec<ClubApplication>> {
        let conn = &mut self.conn().await?;
        Ok(club_applications::table
            .filter(club_applications::user_id.eq(user_id))
            .order(club_applications::id.desc())
            .load(conn)
            .await?)
    }

    async fn commit_review(&self, review: ReviewCommit) -> Result<ReviewOutcome> {
        let conn = &mut self.conn().await?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let current: ClubApplication = club_applications::table
                    .find(review.application_id)
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?
                    .ok_or(Error::NotFound("application"))?;
                if current.status != ApplicationStatus::Pending {
                    return Err(Error::AlreadyReviewed);
                }

                let member = match review.membership {
                    Some(new) => match locked_pair(conn, new.club_id, new.user_id).await? {
                        // added directly while the application waited
                        Some(member) if member.is_active() => Some(member),
                        existing => Some(write_member(conn, existing, new).await?),
                    },
                    None => None,
                };

                let application = diesel::update(club_applications::table.find(current.id))
                    .set((
                        club_applications::status.eq(review.decision),
                        club_applications::reviewed_at.eq(review.reviewed_at),
                        club_applications::reviewed_by.eq(review.reviewer_id),
                    ))
                    .get_result(conn)
                    .await?;

                let notification = diesel::insert_into(notifications::table)
                    .values(&review.notification)
                    .get_result(conn)
                    .await?;

                Ok(ReviewOutcome {
                    application,
                    member,
                    notification,
                })
            }
            .scope_boxed()
        })
        .await
    }

    async fn delete_pending_application(&self, id: i32) -> Result<()> {
        let conn = &mut self.conn().await?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let status: ApplicationStatus = club_applications::table
                    .find(id)
                    .select(club_applications::status)
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?
                    .ok_or(Error::NotFound("application"))?;
                if status != ApplicationStatus::Pending {
                    return Err(Error::invalid_state(
                        "only pending applications can be withdrawn",
                    ));
                }
                diesel::delete(club_applications::table.find(id))
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn insert_event(&self, new: NewEvent) -> Result<Event> {
        let conn = &mut self.conn().await?;
        Ok(diesel::insert_into(events::table)
            .values(&new)
            .get_result(conn)
            .await?)
    }

    async fn find_event(&self, id: i32) -> Result<Option<Event>> {
        let conn = &mut self.conn().await?;
        Ok(events::table.find(id).first(conn).await.optional()?)
    }

    async fn list_events(&self, filter: EventFilter) -> Result<Vec<Event>> {
        let conn = &mut self.conn().await?;
        let mut query = events::table.into_boxed();
        if let Some(club_id) = filter.club_id {
            query = query.filter(events::club_id.eq(club_id));
        }
        if let Some(after) = filter.after {
            query = query.filter(events::date.gt(after));
        }
        Ok(query.order(events::date.asc()).load(conn).await?)
    }

    async fn update_event(&self, id: i32, changes: EventChanges) -> Result<Event> {
        let conn = &mut self.conn().await?;
        let updated = diesel::update(events::table.find(id))
            .set(&changes)
            .get_result::<Event>(conn)
            .await;
        let event = if is_empty_changeset(&updated) {
            events::table.find(id).first(conn).await.optional()?
        } else {
            updated.optional()?
        };
        event.ok_or(Error::NotFound("event"))
    }

    async fn delete_event(&self, id: i32) -> Result<()> {
        let conn = &mut self.conn().await?;
        let deleted = diesel::delete(events::table.find(id))
            .execute(conn)
            .await?;
        if deleted == 0 {
            return Err(Error::NotFound("event"));
        }
        Ok(())
    }

    async fn insert_rsvp(&self, new: NewRsvp) -> Result<Rsvp> {
        let conn = &mut self.conn().await?;
        Ok(diesel::insert_into(rsvps::table)
            .values(&new)
            .get_result(conn)
            .await?)
    }

    async fn list_rsvps(&self, event_id: i32) -> Result<Vec<Rsvp>> {
        let conn = &mut self.conn().await?;
        Ok(rsvps::table
            .filter(rsvps::event_id.eq(event_id))
            .order(rsvps::id.asc())
            .load(conn)
            .await?)
    }

    async fn insert_campaign(&self, new: NewCampaign) -> Result<Campaign> {
        let conn = &mut self.conn().await?;
        Ok(diesel::insert_into(campaigns::table)
            .values(&new)
            .get_result(conn)
            .await?)
    }

    async fn find_campaign(&self, id: i32) -> Result<Option<Campaign>> {
        let conn = &mut self.conn().await?;
        Ok(campaigns::table.find(id).first(conn).await.optional()?)
    }

    async fn list_campaigns(&self, filter: CampaignFilter) -> Result<Vec<Campaign>> {
        let conn = &mut self.conn().await?;
        let mut query = campaigns::table.into_boxed();
        if let Some(club_id) = filter.club_id {
            query = query.filter(campaigns::club_id.eq(club_id));
        }
        if let Some(active) = filter.active {
            query = query.filter(campaigns::is_active.eq(active));
        }
        Ok(query.order(campaigns::id.desc()).load(conn).await?)
    }

    async fn update_campaign(&self, id: i32, changes: CampaignChanges) -> Result<Campaign> {
        let conn = &mut self.conn().await?;
        let updated = diesel::update(campaigns::table.find(id))
            .set(&changes)
            .get_result::<Campaign>(conn)
            .await;
        let campaign = if is_empty_changeset(&updated) {
            campaigns::table.find(id).first(conn).await.optional()?
        } else {
            updated.optional()?
        };
        campaign.ok_or(Error::NotFound("campaign"))
    }

    async fn insert_donation(&self, new: NewDonation) -> Result<Donation> {
        let conn = &mut self.conn().await?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let current: i32 = campaigns::table
                    .find(new.campaign_id)
                    .select(campaigns::current_amount)
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?
                    .ok_or(Error::NotFound("campaign"))?;
                diesel::update(campaigns::table.find(new.campaign_id))
                    .set(campaigns::current_amount.eq(adjusted_total(current, new.amount)?))
                    .execute(conn)
                    .await?;
                Ok(diesel::insert_into(donations::table)
                    .values(&new)
                    .get_result(conn)
                    .await?)
            }
            .scope_boxed()
        })
        .await
    }

    async fn list_donations(&self, campaign_id: i32) -> Result<Vec<Donation>> {
        let conn = &mut self.conn().await?;
        Ok(donations::table
            .filter(donations::campaign_id.eq(campaign_id))
            .order(donations::id.desc())
            .load(conn)
            .await?)
    }

    async fn insert_dues(&self, new: NewClubDues) -> Result<ClubDues> {
        let conn = &mut self.conn().await?;
        Ok(diesel::insert_into(club_dues::table)
            .values(&new)
            .get_result(conn)
            .await?)
    }

    async fn find_dues(&self, id: i32) -> Result<Option<ClubDues>> {
        let conn = &mut self.conn().await?;
        Ok(club_dues::table.find(id).first(conn).await.optional()?)
    }

    async fn list_dues(&self, club_id: i32, active_only: bool) -> Result<Vec<ClubDues>> {
        let conn = &mut self.conn().await?;
        let mut query = club_dues::table
            .filter(club_dues::club_id.eq(club_id))
            .into_boxed();
        if active_only {
            query = query.filter(club_dues::is_active.eq(true));
        }
        Ok(query.order(club_dues::due_date.asc()).load(conn).await?)
    }

    async fn update_dues(&self, id: i32, changes: DuesChanges) -> Result<ClubDues> {
        let conn = &mut self.conn().await?;
        let updated = diesel::update(club_dues::table.find(id))
            .set(&changes)
            .get_result::<ClubDues>(conn)
            .await;
        let dues = if is_empty_changeset(&updated) {
            club_dues::table.find(id).first(conn).await.optional()?
        } else {
            updated.optional()?
        };
        dues.ok_or(Error::NotFound("dues"))
    }

    async fn insert_dues_payment(&self, new: NewDuesPayment) -> Result<DuesPayment> {
        let conn = &mut self.conn().await?;
        Ok(diesel::insert_into(dues_payments::table)
            .values(&new)
            .get_result(conn)
            .await?)
    }

    async fn list_dues_payments(&self, dues_id: i32) -> Result<Vec<DuesPayment>> {
        let conn = &mut self.conn().await?;
        Ok(dues_payments::table
            .filter(dues_payments::dues_id.eq(dues_id))
            .order(dues_payments::id.desc())
            .load(conn)
            .await?)
    }

    async fn list_user_dues_payments(&self, user_id: i32) -> Result<Vec<DuesPayment>> {
        let conn = &mut self.conn().await?;
        Ok(dues_payments::table
            .filter(dues_payments::user_id.eq(user_id))
            .order(dues_payments::id.desc())
            .load(conn)
            .await?)
    }

    async fn insert_announcement(
        &self,
        new: NewAnnouncement,
        notifications: Vec<NewNotification>,
    ) -> Result<Announcement> {
        let conn = &mut self.conn().await?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let announcement: Announcement = diesel::insert_into(announcements::table)
                    .values(&new)
                    .get_result(conn)
                    .await?;
                let rows: Vec<NewNotification> = notifications
                    .into_iter()
                    .map(|n| NewNotification {
                        related_id: Some(announcement.id),
                        ..n
                    })
                    .collect();
                if !rows.is_empty() {
                    diesel::insert_into(notifications::table)
                        .values(&rows)
                        .execute(conn)
                        .await?;
                }
                Ok(announcement)
            }
            .scope_boxed()
        })
        .await
    }

    async fn list_announcements(&self, club_id: Option<i32>) -> Result<Vec<Announcement>> {
        let conn = &mut self.conn().await?;
        let query = match club_id {
            Some(club_id) => announcements::table
                .filter(announcements::club_id.eq(club_id))
                .into_boxed(),
            None => announcements::table
                .filter(announcements::club_id.is_null())
                .into_boxed(),
        };
        Ok(query.order(announcements::id.desc()).load(conn).await?)
    }

    async fn insert_notification(&self, new: NewNotification) -> Result<Notification> {
        let conn = &mut self.conn().await?;
        Ok(diesel::insert_into(notifications::table)
            .values(&new)
            .get_result(conn)
            .await?)
    }

    async fn find_notification(&self, id: i32) -> Result<Option<Notification>> {
        let conn = &mut self.conn().await?;
        Ok(notifications::table
            .find(id)
            .first(conn)
            .await
            .optional()?)
    }

    async fn list_notifications(&self, user_id: i32) -> Result<Vec<Notification>> {
        let conn = &mut self.conn().await?;
        Ok(notifications::table
            .filter(notifications::user_id.eq(user_id))
            .order(notifications::id.desc())
            .load(conn)
            .await?)
    }

    async fn mark_notification_read(&self, id: i32) -> Result<Notification> {
        let conn = &mut self.conn().await?;
        diesel::update(notifications::table.find(id))
            .set(notifications::is_read.eq(true))
            .get_result(conn)
            .await
            .optional()?
            .ok_or(Error::NotFound("notification"))
    }

    async fn mark_all_notifications_read(&self, user_id: i32) -> Result<usize> {
        let conn = &mut self.conn().await?;
        Ok(diesel::update(
            notifications::table
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::is_read.eq(false)),
        )
        .set(notifications::is_read.eq(true))
        .execute(conn)
        .await?)
    }

    async fn find_payment(&self, reference: PaymentRef) -> Result<Option<PaymentRecord>> {
        let conn = &mut self.conn().await?;
        load_payment(conn, reference).await
    }

    async fn attach_payment_intent(
        &self,
        reference: PaymentRef,
        intent_id: &str,
    ) -> Result<String> {
        let conn = &mut self.conn().await?;
        let id = reference.record_id;
        // first intent wins; later ones leave the row alone
        let attached = match reference.kind {
            PaymentKind::Rsvp => {
                diesel::update(rsvps::table.find(id).filter(rsvps::payment_intent_id.is_null()))
                    .set(rsvps::payment_intent_id.eq(intent_id))
                    .execute(conn)
                    .await?
            }
            PaymentKind::Donation => {
                diesel::update(
                    donations::table
                        .find(id)
                        .filter(donations::payment_intent_id.is_null()),
                )
                .set(donations::payment_intent_id.eq(intent_id))
                .execute(conn)
                .await?
            }
            PaymentKind::DuesPayment => {
                diesel::update(
                    dues_payments::table
                        .find(id)
                        .filter(dues_payments::payment_intent_id.is_null()),
                )
                .set(dues_payments::payment_intent_id.eq(intent_id))
                .execute(conn)
                .await?
            }
        };
        if attached == 1 {
            return Ok(intent_id.to_string());
        }
        let record = load_payment(conn, reference)
            .await?
            .ok_or(Error::NotFound("payment record"))?;
        record
            .intent_id
            .ok_or_else(|| Error::invalid_state("payment intent could not be attached"))
    }

    async fn set_payment_status(
        &self,
        reference: PaymentRef,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<PaymentStatus> {
        let conn = &mut self.conn().await?;
        let id = reference.record_id;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                match reference.kind {
                    PaymentKind::Rsvp => {
                        let previous: PaymentStatus = rsvps::table
                            .find(id)
                            .select(rsvps::payment_status)
                            .for_update()
                            .first(conn)
                            .await
                            .optional()?
                            .ok_or(Error::NotFound("rsvp"))?;
                        check_transition(previous, status)?;
                        diesel::update(rsvps::table.find(id))
                            .set(rsvps::payment_status.eq(status))
                            .execute(conn)
                            .await?;
                        Ok(previous)
                    }
                    PaymentKind::Donation => {
                        let (previous, amount, campaign_id): (PaymentStatus, i32, i32) =
                            donations::table
                                .find(id)
                                .select((
                                    donations::payment_status,
                                    donations::amount,
                                    donations::campaign_id,
                                ))
                                .for_update()
                                .first(conn)
                                .await
                                .optional()?
                                .ok_or(Error::NotFound("donation"))?;
                        check_transition(previous, status)?;
                        let delta = donation_adjustment(previous, status, amount);
                        if delta != 0 {
                            let total: i32 = campaigns::table
                                .find(campaign_id)
                                .select(campaigns::current_amount)
                                .for_update()
                                .first(conn)
                                .await?;
                            diesel::update(campaigns::table.find(campaign_id))
                                .set(campaigns::current_amount.eq(adjusted_total(total, delta)?))
                                .execute(conn)
                                .await?;
                        }
                        diesel::update(donations::table.find(id))
                            .set(donations::payment_status.eq(status))
                            .execute(conn)
                            .await?;
                        Ok(previous)
                    }
                    PaymentKind::DuesPayment => {
                        let previous: PaymentStatus = dues_payments::table
                            .find(id)
                            .select(dues_payments::payment_status)
                            .for_update()
                            .first(conn)
                            .await
                            .optional()?
                            .ok_or(Error::NotFound("dues payment"))?;
                        check_transition(previous, status)?;
                        if previous == status {
                            return Ok(previous);
                        }
                        let paid_at = (status == PaymentStatus::Completed).then_some(at);
                        diesel::update(dues_payments::table.find(id))
                            .set((
                                dues_payments::payment_status.eq(status),
                                dues_payments::paid_at.eq(paid_at),
                            ))
                            .execute(conn)
                            .await?;
                        Ok(previous)
                    }
                }
            }
            .scope_boxed()
        })
        .await
    }
}
