//! Events and RSVPs.
//!
//! Club events are managed by the club's officers; an event without a club
//! belongs to whoever created it.

use crate::{
    error::{Error, Result},
    membership,
    models::{Event, EventChanges, NewEvent, NewRsvp, PaymentStatus, Role, Rsvp},
    store::{DynStore, EventFilter},
    validate,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvent {
    pub club_id: Option<i32>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub banner: Option<String>,
    pub date: DateTime<Utc>,
    pub location: Option<String>,
    pub capacity: Option<i32>,
    #[serde(default)]
    pub price: i32,
    #[serde(default)]
    pub requires_payment: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    pub club_id: Option<i32>,
    #[serde(default)]
    pub upcoming: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRsvp {
    pub event_id: i32,
    pub attendee_name: String,
    pub attendee_email: String,
    #[serde(default = "one")]
    pub tickets_purchased: i32,
}

fn one() -> i32 {
    1
}

/// Creator of the event, or an officer of its club.
async fn require_manager(store: &DynStore, event: &Event, actor: i32) -> Result<()> {
    if event.created_by == actor {
        return Ok(());
    }
    match event.club_id {
        Some(club_id) => membership::require_role(store, club_id, actor, Role::Officer)
            .await
            .map(|_| ()),
        None => Err(Error::forbidden("only the creator can manage this event")),
    }
}

#[instrument(skip(store, req), fields(title = %req.title))]
pub async fn create(store: &DynStore, actor: i32, req: CreateEvent) -> Result<Event> {
    if let Some(club_id) = req.club_id {
        store
            .find_club(club_id)
            .await?
            .ok_or(Error::NotFound("club"))?;
        membership::require_role(store, club_id, actor, Role::Officer).await?;
    }
    if let Some(capacity) = req.capacity {
        validate::positive("capacity", capacity)?;
    }
    let event = store
        .insert_event(NewEvent {
            club_id: req.club_id,
            title: validate::required("title", &req.title)?,
            description: req.description.trim().to_string(),
            banner: validate::url("banner", req.banner)?,
            date: req.date,
            location: req.location,
            capacity: req.capacity,
            price: validate::non_negative("price", req.price)?,
            requires_payment: req.requires_payment,
            created_by: actor,
            created_at: Utc::now(),
        })
        .await?;
    tracing::info!(event_id = event.id, "event created");
    Ok(event)
}

pub async fn get(store: &DynStore, id: i32) -> Result<Event> {
    store.find_event(id).await?.ok_or(Error::NotFound("event"))
}

pub async fn list(store: &DynStore, query: EventQuery) -> Result<Vec<Event>> {
    store
        .list_events(EventFilter {
            club_id: query.club_id,
            after: query.upcoming.then(Utc::now),
        })
        .await
}

#[instrument(skip(store))]
pub async fn update(store: &DynStore, actor: i32, id: i32, changes: EventChanges) -> Result<Event> {
    let event = get(store, id).await?;
    require_manager(store, &event, actor).await?;
    let changes = EventChanges {
        title: changes
            .title
            .map(|t| validate::required("title", &t))
            .transpose()?,
        banner: validate::url("banner", changes.banner)?,
        price: changes
            .price
            .map(|p| validate::non_negative("price", p))
            .transpose()?,
        capacity: changes
            .capacity
            .map(|c| validate::positive("capacity", c))
            .transpose()?,
        ..changes
    };
    store.update_event(id, changes).await
}

#[instrument(skip(store))]
pub async fn delete(store: &DynStore, actor: i32, id: i32) -> Result<()> {
    let event = get(store, id).await?;
    require_manager(store, &event, actor).await?;
    store.delete_event(id).await
}

/// Open to anyone. The total is always computed here from the event price.
#[instrument(skip(store, req), fields(event_id = req.event_id))]
pub async fn rsvp(store: &DynStore, user_id: Option<i32>, req: CreateRsvp) -> Result<Rsvp> {
    let event = get(store, req.event_id).await?;
    if req.tickets_purchased < 1 {
        return Err(Error::validation("ticketsPurchased must be at least 1"));
    }
    let total = event
        .ticket_total(req.tickets_purchased)
        .ok_or_else(|| Error::validation("ticket total is too large"))?;

    store
        .insert_rsvp(NewRsvp {
            event_id: event.id,
            user_id,
            attendee_name: validate::required("attendeeName", &req.attendee_name)?,
            attendee_email: validate::email(&req.attendee_email)?,
            tickets_purchased: req.tickets_purchased,
            total_amount: total,
            payment_status: PaymentStatus::initial_for(total),
            created_at: Utc::now(),
        })
        .await
}

pub async fn list_rsvps(store: &DynStore, actor: i32, event_id: i32) -> Result<Vec<Rsvp>> {
    let event = get(store, event_id).await?;
    require_manager(store, &event, actor).await?;
    store.list_rsvps(event_id).await
}
