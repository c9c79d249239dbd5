//! Campaigns and donations.

use crate::{
    error::{Error, Result},
    membership,
    models::{
        Campaign, CampaignChanges, CampaignTier, Donation, NewCampaign, NewDonation,
        PaymentStatus, Role, Tiers,
    },
    store::{CampaignFilter, DynStore},
    validate,
};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaign {
    pub club_id: Option<i32>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image: Option<String>,
    pub goal_amount: i32,
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tiers: Vec<CampaignTier>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignQuery {
    pub club_id: Option<i32>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDonation {
    pub campaign_id: i32,
    pub donor_name: String,
    pub donor_email: String,
    pub amount: i32,
    pub tier_id: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub message: Option<String>,
}

/// A donation as shown to the public.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicDonation {
    pub id: i32,
    pub campaign_id: i32,
    pub donor_name: String,
    pub amount: i32,
    pub tier_id: Option<String>,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Donation> for PublicDonation {
    fn from(d: Donation) -> Self {
        Self {
            id: d.id,
            campaign_id: d.campaign_id,
            donor_name: if d.is_anonymous {
                "Anonymous".to_string()
            } else {
                d.donor_name
            },
            amount: d.amount,
            tier_id: d.tier_id,
            is_anonymous: d.is_anonymous,
            message: d.message,
            payment_status: d.payment_status,
            created_at: d.created_at,
        }
    }
}

fn check_tiers(tiers: Vec<CampaignTier>) -> Result<Tiers> {
    if !tiers.iter().map(|t| t.id.as_str()).all_unique() {
        return Err(Error::validation("tier ids must be unique"));
    }
    for tier in &tiers {
        validate::required("tier id", &tier.id)?;
        validate::required("tier name", &tier.name)?;
        validate::positive("tier amount", tier.amount)?;
    }
    Ok(Tiers(tiers))
}

async fn require_manager(store: &DynStore, campaign: &Campaign, actor: i32) -> Result<()> {
    if campaign.created_by == actor {
        return Ok(());
    }
    match campaign.club_id {
        Some(club_id) => membership::require_role(store, club_id, actor, Role::Officer)
            .await
            .map(|_| ()),
        None => Err(Error::forbidden("only the creator can manage this campaign")),
    }
}

#[instrument(skip(store, req), fields(title = %req.title))]
pub async fn create(store: &DynStore, actor: i32, req: CreateCampaign) -> Result<Campaign> {
    if let Some(club_id) = req.club_id {
        store
            .find_club(club_id)
            .await?
            .ok_or(Error::NotFound("club"))?;
        membership::require_role(store, club_id, actor, Role::Officer).await?;
    }
    let campaign = store
        .insert_campaign(NewCampaign {
            club_id: req.club_id,
            title: validate::required("title", &req.title)?,
            description: req.description.trim().to_string(),
            image: validate::url("image", req.image)?,
            goal_amount: validate::positive("goalAmount", req.goal_amount)?,
            deadline: req.deadline,
            tiers: check_tiers(req.tiers)?,
            is_active: true,
            created_by: actor,
            created_at: Utc::now(),
        })
        .await?;
    tracing::info!(campaign_id = campaign.id, "campaign created");
    Ok(campaign)
}

pub async fn get(store: &DynStore, id: i32) -> Result<Campaign> {
    store
        .find_campaign(id)
        .await?
        .ok_or(Error::NotFound("campaign"))
}

pub async fn list(store: &DynStore, query: CampaignQuery) -> Result<Vec<Campaign>> {
    store
        .list_campaigns(CampaignFilter {
            club_id: query.club_id,
            active: query.active,
        })
        .await
}

#[instrument(skip(store))]
pub async fn update(
    store: &DynStore,
    actor: i32,
    id: i32,
    changes: CampaignChanges,
) -> Result<Campaign> {
    let campaign = get(store, id).await?;
    require_manager(store, &campaign, actor).await?;
    let changes = CampaignChanges {
        title: changes
            .title
            .map(|t| validate::required("title", &t))
            .transpose()?,
        image: validate::url("image", changes.image)?,
        goal_amount: changes
            .goal_amount
            .map(|g| validate::positive("goalAmount", g))
            .transpose()?,
        tiers: changes.tiers.map(|t| check_tiers(t.0)).transpose()?,
        ..changes
    };
    store.update_campaign(id, changes).await
}

/// Open to anyone. The campaign total moves with the insert.
#[instrument(skip(store, req), fields(campaign_id = req.campaign_id, amount = req.amount))]
pub async fn donate(
    store: &DynStore,
    user_id: Option<i32>,
    req: CreateDonation,
) -> Result<Donation> {
    let amount = validate::positive("amount", req.amount)?;
    let campaign = get(store, req.campaign_id).await?;
    if !campaign.is_active {
        return Err(Error::invalid_state("campaign is not accepting donations"));
    }
    // the store checks again against the locked total
    if campaign.current_amount.checked_add(amount).is_none() {
        return Err(Error::validation("campaign total would overflow"));
    }
    if let Some(tier_id) = &req.tier_id {
        let tier = campaign
            .tiers
            .find(tier_id)
            .ok_or_else(|| Error::validation("unknown donation tier"))?;
        if amount < tier.amount {
            return Err(Error::validation("amount is below the tier amount"));
        }
    }

    let donation = store
        .insert_donation(NewDonation {
            campaign_id: campaign.id,
            user_id,
            donor_name: validate::required("donorName", &req.donor_name)?,
            donor_email: validate::email(&req.donor_email)?,
            amount,
            tier_id: req.tier_id,
            is_anonymous: req.is_anonymous,
            message: req.message.filter(|m| !m.trim().is_empty()),
            payment_status: PaymentStatus::initial_for(amount),
            created_at: Utc::now(),
        })
        .await?;
    tracing::info!(donation_id = donation.id, "donation recorded");
    Ok(donation)
}

pub async fn list_donations(store: &DynStore, campaign_id: i32) -> Result<Vec<PublicDonation>> {
    get(store, campaign_id).await?;
    Ok(store
        .list_donations(campaign_id)
        .await?
        .into_iter()
        .map(PublicDonation::from)
        .collect())
}
