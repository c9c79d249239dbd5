//! In-memory implementation of [`Store`] for tests and local runs.
//!
//! All tables sit behind one `RwLock`, so every compound write happens inside
//! a single critical section. Data is lost when the store is dropped.

use super::{
    adjusted_total, check_transition, donation_adjustment, drops_admin, CampaignFilter,
    ClubFilter, EventFilter, PaymentKind, PaymentRecord, PaymentRef, ReviewCommit,
    ReviewOutcome, Store,
};
use crate::{
    error::{Error, Result},
    models::*,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    last_id: i32,
    users: BTreeMap<i32, User>,
    sessions: HashMap<String, Session>,
    clubs: BTreeMap<i32, Club>,
    members: BTreeMap<i32, ClubMember>,
    applications: BTreeMap<i32, ClubApplication>,
    events: BTreeMap<i32, Event>,
    rsvps: BTreeMap<i32, Rsvp>,
    campaigns: BTreeMap<i32, Campaign>,
    donations: BTreeMap<i32, Donation>,
    dues: BTreeMap<i32, ClubDues>,
    dues_payments: BTreeMap<i32, DuesPayment>,
    announcements: BTreeMap<i32, Announcement>,
    notifications: BTreeMap<i32, Notification>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn has_other_admin(&self, member: &ClubMember) -> bool {
        self.members.values().any(|m| {
            m.club_id == member.club_id && m.id != member.id && m.can_act_as(Role::Admin)
        })
    }

    fn upsert_member(&mut self, new: NewClubMember) -> Result<ClubMember> {
        let existing = self
            .members
            .values_mut()
            .find(|m| m.club_id == new.club_id && m.user_id == new.user_id);

        match existing {
            Some(member) if member.is_active() => Err(Error::AlreadyMember),
            Some(member) => {
                member.role = new.role;
                member.status = new.status;
                member.joined_at = new.joined_at;
                Ok(member.clone())
            }
            None => {
                let id = self.next_id();
                let member = ClubMember {
                    id,
                    club_id: new.club_id,
                    user_id: new.user_id,
                    role: new.role,
                    status: new.status,
                    joined_at: new.joined_at,
                };
                self.members.insert(id, member.clone());
                Ok(member)
            }
        }
    }

    fn push_notification(&mut self, new: NewNotification) -> Notification {
        let id = self.next_id();
        let notification = Notification {
            id,
            user_id: new.user_id,
            kind: new.kind,
            title: new.title,
            message: new.message,
            related_id: new.related_id,
            is_read: new.is_read,
            created_at: new.created_at,
        };
        self.notifications.insert(id, notification.clone());
        notification
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn set_some<T>(field: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *field = value;
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, new: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == new.username) {
            return Err(Error::conflict("username has been taken"));
        }
        if tables.users.values().any(|u| u.email == new.email) {
            return Err(Error::conflict("email is already registered"));
        }
        let id = tables.next_id();
        let user = User {
            id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            bio: None,
            avatar: None,
            created_at: new.created_at,
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: i32) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn update_user(&self, id: i32, changes: UserChanges) -> Result<User> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&id).ok_or(Error::NotFound("user"))?;
        set(&mut user.first_name, changes.first_name);
        set(&mut user.last_name, changes.last_name);
        set_some(&mut user.bio, changes.bio);
        set_some(&mut user.avatar, changes.avatar);
        Ok(user.clone())
    }

    async fn insert_session(&self, session: Session) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn find_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.tables.read().await.sessions.get(id).cloned())
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        self.tables.write().await.sessions.remove(id);
        Ok(())
    }

    async fn insert_club(&self, new: NewClub) -> Result<(Club, ClubMember)> {
        let mut tables = self.tables.write().await;
        if tables.clubs.values().any(|c| c.name == new.name) {
            return Err(Error::conflict("club name has been taken"));
        }
        let id = tables.next_id();
        let club = Club {
            id,
            name: new.name,
            description: new.description,
            category: new.category,
            logo: new.logo,
            banner: new.banner,
            max_members: new.max_members,
            is_active: new.is_active,
            created_by: new.created_by,
            created_at: new.created_at,
        };
        tables.clubs.insert(id, club.clone());
        let admin = tables.upsert_member(NewClubMember {
            club_id: id,
            user_id: club.created_by,
            role: Role::Admin,
            status: MemberStatus::Active,
            joined_at: club.created_at,
        })?;
        Ok((club, admin))
    }

    async fn find_club(&self, id: i32) -> Result<Option<Club>> {
        Ok(self.tables.read().await.clubs.get(&id).cloned())
    }

    async fn list_clubs(&self, filter: ClubFilter) -> Result<Vec<Club>> {
        let tables = self.tables.read().await;
        let mut clubs: Vec<Club> = tables
            .clubs
            .values()
            .filter(|c| {
                filter
                    .category
                    .as_ref()
                    .map_or(true, |cat| c.category.as_ref() == Some(cat))
            })
            .filter(|c| filter.active.map_or(true, |active| c.is_active == active))
            .cloned()
            .collect();
        clubs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clubs)
    }

    async fn update_club(&self, id: i32, changes: ClubChanges) -> Result<Club> {
        let mut tables = self.tables.write().await;
        if let Some(name) = &changes.name {
            if tables.clubs.values().any(|c| c.id != id && &c.name == name) {
                return Err(Error::conflict("club name has been taken"));
            }
        }
        let club = tables.clubs.get_mut(&id).ok_or(Error::NotFound("club"))?;
        set(&mut club.name, changes.name);
        set(&mut club.description, changes.description);
        set_some(&mut club.category, changes.category);
        set_some(&mut club.logo, changes.logo);
        set_some(&mut club.banner, changes.banner);
        set_some(&mut club.max_members, changes.max_members);
        set(&mut club.is_active, changes.is_active);
        Ok(club.clone())
    }

    async fn find_member(&self, club_id: i32, user_id: i32) -> Result<Option<ClubMember>> {
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .values()
            .find(|m| m.club_id == club_id && m.user_id == user_id)
            .cloned())
    }

    async fn find_member_by_id(&self, id: i32) -> Result<Option<ClubMember>> {
        Ok(self.tables.read().await.members.get(&id).cloned())
    }

    async fn list_members(&self, club_id: i32) -> Result<Vec<ClubMember>> {
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .values()
            .filter(|m| m.club_id == club_id)
            .cloned()
            .collect())
    }

    async fn list_memberships(&self, user_id: i32) -> Result<Vec<ClubMember>> {
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_member(&self, new: NewClubMember) -> Result<ClubMember> {
        let mut tables = self.tables.write().await;
        tables.upsert_member(new).map_err(|e| match e {
            Error::AlreadyMember => Error::conflict("user is already an active member"),
            e => e,
        })
    }

    async fn update_member(&self, id: i32, changes: MemberChanges) -> Result<ClubMember> {
        let mut tables = self.tables.write().await;
        let member = tables
            .members
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound("club member"))?;
        let role = changes.role.unwrap_or(member.role);
        let status = changes.status.unwrap_or(member.status);
        if drops_admin(&member, Some((role, status))) && !tables.has_other_admin(&member) {
            return Err(Error::LastAdmin);
        }
        let member = tables
            .members
            .get_mut(&id)
            .ok_or(Error::NotFound("club member"))?;
        member.role = role;
        member.status = status;
        Ok(member.clone())
    }

    async fn delete_member(&self, id: i32) -> Result<ClubMember> {
        let mut tables = self.tables.write().await;
        let member = tables
            .members
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound("club member"))?;
        if drops_admin(&member, None) && !tables.has_other_admin(&member) {
            return Err(Error::LastAdmin);
        }
        tables.members.remove(&id);
        Ok(member)
    }

    async fn insert_application(&self, new: NewClubApplication) -> Result<ClubApplication> {
        let mut tables = self.tables.write().await;
        let is_member = tables
            .members
            .values()
            .any(|m| m.club_id == new.club_id && m.user_id == new.user_id && m.is_active());
        if is_member {
            return Err(Error::AlreadyMember);
        }
        let has_pending = tables.applications.values().any(|a| {
            a.club_id == new.club_id
                && a.user_id == new.user_id
                && a.status == ApplicationStatus::Pending
        });
        if has_pending {
            return Err(Error::DuplicatePending);
        }
        let id = tables.next_id();
        let application = ClubApplication {
            id,
            club_id: new.club_id,
            user_id: new.user_id,
            cover_letter: new.cover_letter,
            status: new.status,
            submitted_at: new.submitted_at,
            reviewed_at: None,
            reviewed_by: None,
        };
        tables.applications.insert(id, application.clone());
        Ok(application)
    }

    async fn find_application(&self, id: i32) -> Result<Option<ClubApplication>> {
        Ok(self.tables.read().await.applications.get(&id).cloned())
    }

    async fn list_club_applications(
        &self,
        club_id: i32,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ClubApplication>> {
        let tables = self.tables.read().await;
        Ok(tables
            .applications
            .values()
            .rev()
            .filter(|a| a.club_id == club_id && status.map_or(true, |s| a.status == s))
            .cloned()
            .collect())
    }

    async fn list_user_applications(&self, user_id: i32) -> Result<Vec<ClubApplication>> {
        let tables = self.tables.read().await;
        Ok(tables
            .applications
            .values()
            .rev()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn commit_review(&self, review: ReviewCommit) -> Result<ReviewOutcome> {
        let mut tables = self.tables.write().await;
        let current = tables
            .applications
            .get(&review.application_id)
            .cloned()
            .ok_or(Error::NotFound("application"))?;
        if current.status != ApplicationStatus::Pending {
            return Err(Error::AlreadyReviewed);
        }

        // membership first: if it fails nothing has been written yet
        let member = match review.membership {
            Some(new) => {
                let admitted = tables
                    .members
                    .values()
                    .find(|m| {
                        m.club_id == new.club_id && m.user_id == new.user_id && m.is_active()
                    })
                    .cloned();
                // added directly while the application waited
                match admitted {
                    Some(member) => Some(member),
                    None => Some(tables.upsert_member(new)?),
                }
            }
            None => None,
        };

        let application = ClubApplication {
            status: review.decision,
            reviewed_at: Some(review.reviewed_at),
            reviewed_by: Some(review.reviewer_id),
            ..current
        };
        tables
            .applications
            .insert(application.id, application.clone());
        let notification = tables.push_notification(review.notification);

        Ok(ReviewOutcome {
            application,
            member,
            notification,
        })
    }

    async fn delete_pending_application(&self, id: i32) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.applications.get(&id) {
            None => Err(Error::NotFound("application")),
            Some(a) if a.status != ApplicationStatus::Pending => Err(Error::invalid_state(
                "only pending applications can be withdrawn",
            )),
            Some(_) => {
                tables.applications.remove(&id);
                Ok(())
            }
        }
    }

    async fn insert_event(&self, new: NewEvent) -> Result<Event> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let event = Event {
            id,
            club_id: new.club_id,
            title: new.title,
            description: new.description,
            banner: new.banner,
            date: new.date,
            location: new.location,
            capacity: new.capacity,
            price: new.price,
            requires_payment: new.requires_payment,
            created_by: new.created_by,
            created_at: new.created_at,
        };
        tables.events.insert(id, event.clone());
        Ok(event)
    }

    async fn find_event(&self, id: i32) -> Result<Option<Event>> {
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn list_events(&self, filter: EventFilter) -> Result<Vec<Event>> {
        let tables = self.tables.read().await;
        let mut events: Vec<Event> = tables
            .events
            .values()
            .filter(|e| filter.club_id.map_or(true, |club| e.club_id == Some(club)))
            .filter(|e| filter.after.map_or(true, |after| e.date > after))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.date);
        Ok(events)
    }

    async fn update_event(&self, id: i32, changes: EventChanges) -> Result<Event> {
        let mut tables = self.tables.write().await;
        let event = tables.events.get_mut(&id).ok_or(Error::NotFound("event"))?;
        set(&mut event.title, changes.title);
        set(&mut event.description, changes.description);
        set_some(&mut event.banner, changes.banner);
        set(&mut event.date, changes.date);
        set_some(&mut event.location, changes.location);
        set_some(&mut event.capacity, changes.capacity);
        set(&mut event.price, changes.price);
        set(&mut event.requires_payment, changes.requires_payment);
        Ok(event.clone())
    }

    async fn delete_event(&self, id: i32) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .events
            .remove(&id)
            .ok_or(Error::NotFound("event"))?;
        tables.rsvps.retain(|_, r| r.event_id != id);
        Ok(())
    }

    async fn insert_rsvp(&self, new: NewRsvp) -> Result<Rsvp> {
        let mut tables = self.tables.write().await;
        if !tables.events.contains_key(&new.event_id) {
            return Err(Error::NotFound("event"));
        }
        let id = tables.next_id();
        let rsvp = Rsvp {
            id,
            event_id: new.event_id,
            user_id: new.user_id,
            attendee_name: new.attendee_name,
            attendee_email: new.attendee_email,
            tickets_purchased: new.tickets_purchased,
            total_amount: new.total_amount,
            payment_status: new.payment_status,
            payment_intent_id: None,
            created_at: new.created_at,
        };
        tables.rsvps.insert(id, rsvp.clone());
        Ok(rsvp)
    }

    async fn list_rsvps(&self, event_id: i32) -> Result<Vec<Rsvp>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rsvps
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn insert_campaign(&self, new: NewCampaign) -> Result<Campaign> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let campaign = Campaign {
            id,
            club_id: new.club_id,
            title: new.title,
            description: new.description,
            image: new.image,
            goal_amount: new.goal_amount,
            current_amount: 0,
            deadline: new.deadline,
            tiers: new.tiers,
            is_active: new.is_active,
            created_by: new.created_by,
            created_at: new.created_at,
        };
        tables.campaigns.insert(id, campaign.clone());
        Ok(campaign)
    }

    async fn find_campaign(&self, id: i32) -> Result<Option<Campaign>> {
        Ok(self.tables.read().await.campaigns.get(&id).cloned())
    }

    async fn list_campaigns(&self, filter: CampaignFilter) -> Result<Vec<Campaign>> {
        let tables = self.tables.read().await;
        Ok(tables
            .campaigns
            .values()
            .rev()
            .filter(|c| filter.club_id.map_or(true, |club| c.club_id == Some(club)))
            .filter(|c| filter.active.map_or(true, |active| c.is_active == active))
            .cloned()
            .collect())
    }

    async fn update_campaign(&self, id: i32, changes: CampaignChanges) -> Result<Campaign> {
        let mut tables = self.tables.write().await;
        let campaign = tables
            .campaigns
            .get_mut(&id)
            .ok_or(Error::NotFound("campaign"))?;
        set(&mut campaign.title, changes.title);
        set(&mut campaign.description, changes.description);
        set_some(&mut campaign.image, changes.image);
        set(&mut campaign.goal_amount, changes.goal_amount);
        set_some(&mut campaign.deadline, changes.deadline);
        set(&mut campaign.tiers, changes.tiers);
        set(&mut campaign.is_active, changes.is_active);
        Ok(campaign.clone())
    }

    async fn insert_donation(&self, new: NewDonation) -> Result<Donation> {
        let mut tables = self.tables.write().await;
        let campaign = tables
            .campaigns
            .get_mut(&new.campaign_id)
            .ok_or(Error::NotFound("campaign"))?;
        campaign.current_amount = adjusted_total(campaign.current_amount, new.amount)?;

        let id = tables.next_id();
        let donation = Donation {
            id,
            campaign_id: new.campaign_id,
            user_id: new.user_id,
            donor_name: new.donor_name,
            donor_email: new.donor_email,
            amount: new.amount,
            tier_id: new.tier_id,
            is_anonymous: new.is_anonymous,
            message: new.message,
            payment_status: new.payment_status,
            payment_intent_id: None,
            created_at: new.created_at,
        };
        tables.donations.insert(id, donation.clone());
        Ok(donation)
    }

    async fn list_donations(&self, campaign_id: i32) -> Result<Vec<Donation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .donations
            .values()
            .rev()
            .filter(|d| d.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn insert_dues(&self, new: NewClubDues) -> Result<ClubDues> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let dues = ClubDues {
            id,
            club_id: new.club_id,
            name: new.name,
            description: new.description,
            amount: new.amount,
            due_date: new.due_date,
            is_recurring: new.is_recurring,
            frequency: new.frequency,
            is_active: new.is_active,
            created_at: new.created_at,
        };
        tables.dues.insert(id, dues.clone());
        Ok(dues)
    }

    async fn find_dues(&self, id: i32) -> Result<Option<ClubDues>> {
        Ok(self.tables.read().await.dues.get(&id).cloned())
    }

    async fn list_dues(&self, club_id: i32, active_only: bool) -> Result<Vec<ClubDues>> {
        let tables = self.tables.read().await;
        let mut dues: Vec<ClubDues> = tables
            .dues
            .values()
            .filter(|d| d.club_id == club_id && (!active_only || d.is_active))
            .cloned()
            .collect();
        dues.sort_by_key(|d| d.due_date);
        Ok(dues)
    }

    async fn update_dues(&self, id: i32, changes: DuesChanges) -> Result<ClubDues> {
        let mut tables = self.tables.write().await;
        let dues = tables.dues.get_mut(&id).ok_or(Error::NotFound("dues"))?;
        set(&mut dues.name, changes.name);
        set_some(&mut dues.description, changes.description);
        set(&mut dues.amount, changes.amount);
        set(&mut dues.due_date, changes.due_date);
        set(&mut dues.is_recurring, changes.is_recurring);
        set_some(&mut dues.frequency, changes.frequency);
        set(&mut dues.is_active, changes.is_active);
        Ok(dues.clone())
    }

    async fn insert_dues_payment(&self, new: NewDuesPayment) -> Result<DuesPayment> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let payment = DuesPayment {
            id,
            dues_id: new.dues_id,
            user_id: new.user_id,
            amount: new.amount,
            payment_status: new.payment_status,
            payment_intent_id: None,
            paid_at: new.paid_at,
            created_at: new.created_at,
        };
        tables.dues_payments.insert(id, payment.clone());
        Ok(payment)
    }

    async fn list_dues_payments(&self, dues_id: i32) -> Result<Vec<DuesPayment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .dues_payments
            .values()
            .rev()
            .filter(|p| p.dues_id == dues_id)
            .cloned()
            .collect())
    }

    async fn list_user_dues_payments(&self, user_id: i32) -> Result<Vec<DuesPayment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .dues_payments
            .values()
            .rev()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_announcement(
        &self,
        new: NewAnnouncement,
        notifications: Vec<NewNotification>,
    ) -> Result<Announcement> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let announcement = Announcement {
            id,
            club_id: new.club_id,
            title: new.title,
            content: new.content,
            created_by: new.created_by,
            target_group: new.target_group,
            recipients: new.recipients,
            created_at: new.created_at,
        };
        tables.announcements.insert(id, announcement.clone());
        for notification in notifications {
            tables.push_notification(NewNotification {
                related_id: Some(id),
                ..notification
            });
        }
        Ok(announcement)
    }

    async fn list_announcements(&self, club_id: Option<i32>) -> Result<Vec<Announcement>> {
        let tables = self.tables.read().await;
        Ok(tables
            .announcements
            .values()
            .rev()
            .filter(|a| a.club_id == club_id)
            .cloned()
            .collect())
    }

    async fn insert_notification(&self, new: NewNotification) -> Result<Notification> {
        Ok(self.tables.write().await.push_notification(new))
    }

    async fn find_notification(&self, id: i32) -> Result<Option<Notification>> {
        Ok(self.tables.read().await.notifications.get(&id).cloned())
    }

    async fn list_notifications(&self, user_id: i32) -> Result<Vec<Notification>> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .values()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, id: i32) -> Result<Notification> {
        let mut tables = self.tables.write().await;
        let notification = tables
            .notifications
            .get_mut(&id)
            .ok_or(Error::NotFound("notification"))?;
        notification.is_read = true;
        Ok(notification.clone())
    }

    async fn mark_all_notifications_read(&self, user_id: i32) -> Result<usize> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for notification in tables.notifications.values_mut() {
            if notification.user_id == user_id && !notification.is_read {
                notification.is_read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn find_payment(&self, reference: PaymentRef) -> Result<Option<PaymentRecord>> {
        let tables = self.tables.read().await;
        let id = reference.record_id;
        let found = match reference.kind {
            PaymentKind::Rsvp => tables
                .rsvps
                .get(&id)
                .map(|r| (r.total_amount, r.payment_status, r.payment_intent_id.clone())),
            PaymentKind::Donation => tables
                .donations
                .get(&id)
                .map(|d| (d.amount, d.payment_status, d.payment_intent_id.clone())),
            PaymentKind::DuesPayment => tables
                .dues_payments
                .get(&id)
                .map(|p| (p.amount, p.payment_status, p.payment_intent_id.clone())),
        };
        Ok(found.map(|(amount, status, intent_id)| PaymentRecord {
            reference,
            amount,
            status,
            intent_id,
        }))
    }

    async fn attach_payment_intent(
        &self,
        reference: PaymentRef,
        intent_id: &str,
    ) -> Result<String> {
        let mut tables = self.tables.write().await;
        let id = reference.record_id;
        let slot = match reference.kind {
            PaymentKind::Rsvp => tables.rsvps.get_mut(&id).map(|r| &mut r.payment_intent_id),
            PaymentKind::Donation => tables
                .donations
                .get_mut(&id)
                .map(|d| &mut d.payment_intent_id),
            PaymentKind::DuesPayment => tables
                .dues_payments
                .get_mut(&id)
                .map(|p| &mut p.payment_intent_id),
        };
        let slot = slot.ok_or(Error::NotFound("payment record"))?;
        Ok(slot.get_or_insert_with(|| intent_id.to_string()).clone())
    }

    async fn set_payment_status(
        &self,
        reference: PaymentRef,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<PaymentStatus> {
        let mut tables = self.tables.write().await;
        let id = reference.record_id;
        match reference.kind {
            PaymentKind::Rsvp => {
                let rsvp = tables
                    .rsvps
                    .get_mut(&id)
                    .ok_or(Error::NotFound("rsvp"))?;
                check_transition(rsvp.payment_status, status)?;
                Ok(std::mem::replace(&mut rsvp.payment_status, status))
            }
            PaymentKind::Donation => {
                let donation = tables
                    .donations
                    .get(&id)
                    .cloned()
                    .ok_or(Error::NotFound("donation"))?;
                check_transition(donation.payment_status, status)?;
                let delta = donation_adjustment(donation.payment_status, status, donation.amount);
                if let Some(campaign) = tables.campaigns.get_mut(&donation.campaign_id) {
                    campaign.current_amount = adjusted_total(campaign.current_amount, delta)?;
                }
                if let Some(row) = tables.donations.get_mut(&id) {
                    row.payment_status = status;
                }
                Ok(donation.payment_status)
            }
            PaymentKind::DuesPayment => {
                let payment = tables
                    .dues_payments
                    .get_mut(&id)
                    .ok_or(Error::NotFound("dues payment"))?;
                check_transition(payment.payment_status, status)?;
                if status == PaymentStatus::Completed && payment.payment_status != status {
                    payment.paid_at = Some(at);
                }
                Ok(std::mem::replace(&mut payment.payment_status, status))
            }
        }
    }
}
