use crate::{
    error::{Error, Result},
    membership,
    models::{
        ClubDues, DuesChanges, DuesFrequency, DuesPayment, NewClubDues, NewDuesPayment,
        PaymentStatus, Role,
    },
    store::DynStore,
    validate,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDues {
    pub name: String,
    pub description: Option<String>,
    pub amount: i32,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub is_recurring: bool,
    pub frequency: Option<DuesFrequency>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuesQuery {
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayDues {
    pub dues_id: i32,
}

fn check_schedule(is_recurring: bool, frequency: Option<DuesFrequency>) -> Result<()> {
    if is_recurring && frequency.is_none() {
        return Err(Error::validation("recurring dues need a frequency"));
    }
    Ok(())
}

pub async fn get(store: &DynStore, id: i32) -> Result<ClubDues> {
    store.find_dues(id).await?.ok_or(Error::NotFound("dues"))
}

/// Visible to the club's active members.
pub async fn list(
    store: &DynStore,
    actor: i32,
    club_id: i32,
    query: DuesQuery,
) -> Result<Vec<ClubDues>> {
    membership::require_role(store, club_id, actor, Role::Member).await?;
    store.list_dues(club_id, query.active).await
}

#[instrument(skip(store, req), fields(name = %req.name))]
pub async fn create(
    store: &DynStore,
    actor: i32,
    club_id: i32,
    req: CreateDues,
) -> Result<ClubDues> {
    store
        .find_club(club_id)
        .await?
        .ok_or(Error::NotFound("club"))?;
    membership::require_role(store, club_id, actor, Role::Admin).await?;
    check_schedule(req.is_recurring, req.frequency)?;

    let dues = store
        .insert_dues(NewClubDues {
            club_id,
            name: validate::required("name", &req.name)?,
            description: req.description,
            amount: validate::non_negative("amount", req.amount)?,
            due_date: req.due_date,
            is_recurring: req.is_recurring,
            frequency: req.frequency,
            is_active: true,
            created_at: Utc::now(),
        })
        .await?;
    tracing::info!(dues_id = dues.id, "dues created");
    Ok(dues)
}

#[instrument(skip(store))]
pub async fn update(
    store: &DynStore,
    actor: i32,
    id: i32,
    changes: DuesChanges,
) -> Result<ClubDues> {
    let dues = get(store, id).await?;
    membership::require_role(store, dues.club_id, actor, Role::Admin).await?;
    check_schedule(
        changes.is_recurring.unwrap_or(dues.is_recurring),
        changes.frequency.or(dues.frequency),
    )?;
    let changes = DuesChanges {
        name: changes
            .name
            .map(|n| validate::required("name", &n))
            .transpose()?,
        amount: changes
            .amount
            .map(|a| validate::non_negative("amount", a))
            .transpose()?,
        ..changes
    };
    store.update_dues(id, changes).await
}

/// An active member records a payment for themselves; the amount comes from
/// the dues definition.
#[instrument(skip(store))]
pub async fn pay(store: &DynStore, actor: i32, dues_id: i32) -> Result<DuesPayment> {
    let dues = get(store, dues_id).await?;
    membership::require_role(store, dues.club_id, actor, Role::Member).await?;
    if !dues.is_active {
        return Err(Error::invalid_state("dues are no longer collected"));
    }

    let now = Utc::now();
    let status = PaymentStatus::initial_for(dues.amount);
    store
        .insert_dues_payment(NewDuesPayment {
            dues_id,
            user_id: actor,
            amount: dues.amount,
            payment_status: status,
            paid_at: (status == PaymentStatus::Completed).then_some(now),
            created_at: now,
        })
        .await
}

pub async fn list_payments(store: &DynStore, actor: i32, dues_id: i32) -> Result<Vec<DuesPayment>> {
    let dues = get(store, dues_id).await?;
    membership::require_role(store, dues.club_id, actor, Role::Officer).await?;
    store.list_dues_payments(dues_id).await
}

pub async fn list_own_payments(store: &DynStore, user_id: i32) -> Result<Vec<DuesPayment>> {
    store.list_user_dues_payments(user_id).await
}
