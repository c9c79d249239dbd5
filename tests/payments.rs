mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use univo::{
    error::{Error, Result},
    events::{self, CreateEvent, CreateRsvp},
    fundraising::{self, CreateCampaign, CreateDonation},
    models::{Campaign, PaymentStatus, User},
    payments::{
        self, CreateIntentRequest, Intent, PaymentProvider, PaymentRelay, WebhookVerifier,
    },
    store::{DynStore, PaymentKind, PaymentRef},
};

const WEBHOOK_SECRET: &str = "whsec_test";

#[derive(Default)]
struct FakeProvider {
    issued: AtomicUsize,
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_intent(
        &self,
        _amount: i32,
        _description: &str,
        _target: Option<PaymentRef>,
    ) -> Result<Intent> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Intent {
            id: format!("pi_{n}"),
            client_secret: format!("pi_{n}_secret"),
        })
    }

    async fn retrieve_intent(&self, id: &str) -> Result<Intent> {
        Ok(Intent {
            id: id.to_string(),
            client_secret: format!("{id}_secret"),
        })
    }
}

fn relay() -> PaymentRelay {
    PaymentRelay::new(
        Some(Arc::new(FakeProvider::default())),
        Some(WebhookVerifier::new(WEBHOOK_SECRET)),
    )
}

fn signed(event: serde_json::Value) -> (String, Vec<u8>) {
    let body = serde_json::to_vec(&event).unwrap();
    let ts = Utc::now().timestamp();
    let sig = WebhookVerifier::new(WEBHOOK_SECRET).sign(ts, &body).unwrap();
    (format!("t={ts},v1={sig}"), body)
}

fn intent_event(kind: &str, intent_id: &str, target: PaymentRef) -> serde_json::Value {
    json!({
        "type": kind,
        "data": {
            "object": {
                "id": intent_id,
                "metadata": {
                    "kind": target.kind.to_string(),
                    "record_id": target.record_id.to_string(),
                }
            }
        }
    })
}

async fn campaign(store: &DynStore, owner: &User) -> Campaign {
    fundraising::create(
        store,
        owner.id,
        CreateCampaign {
            club_id: None,
            title: "New uniforms".into(),
            description: String::new(),
            image: None,
            goal_amount: 10_000,
            deadline: None,
            tiers: vec![],
        },
    )
    .await
    .unwrap()
}

fn donation(campaign_id: i32, amount: i32) -> CreateDonation {
    CreateDonation {
        campaign_id,
        donor_name: "Dana Donor".into(),
        donor_email: "dana@campus.edu".into(),
        amount,
        tier_id: None,
        is_anonymous: false,
        message: None,
    }
}

async fn current_amount(store: &DynStore, id: i32) -> i32 {
    fundraising::get(store, id).await.unwrap().current_amount
}

async fn status_of(store: &DynStore, target: PaymentRef) -> PaymentStatus {
    store.find_payment(target).await.unwrap().unwrap().status
}

#[tokio::test]
async fn a_donation_moves_the_campaign_total() {
    let store = common::store();
    let owner = common::user(&store, "ada").await;
    let campaign = campaign(&store, &owner).await;

    let made = fundraising::donate(&store, None, donation(campaign.id, 500))
        .await
        .unwrap();
    assert_eq!(made.payment_status, PaymentStatus::Pending);
    assert_eq!(current_amount(&store, campaign.id).await, 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_donations_all_count() {
    let store = common::store();
    let owner = common::user(&store, "ada").await;
    let campaign_id = campaign(&store, &owner).await.id;

    const N: i32 = 25;
    let tasks: Vec<_> = (0..N)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                fundraising::donate(&store, None, donation(campaign_id, 100)).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(current_amount(&store, campaign_id).await, 100 * N);
}

#[tokio::test]
async fn anonymous_donors_are_masked_in_public_listings() {
    let store = common::store();
    let owner = common::user(&store, "ada").await;
    let campaign = campaign(&store, &owner).await;
    fundraising::donate(
        &store,
        None,
        CreateDonation {
            is_anonymous: true,
            ..donation(campaign.id, 250)
        },
    )
    .await
    .unwrap();

    let listed = fundraising::list_donations(&store, campaign.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].donor_name, "Anonymous");
}

#[tokio::test]
async fn closed_campaigns_refuse_donations() {
    let store = common::store();
    let owner = common::user(&store, "ada").await;
    let campaign = campaign(&store, &owner).await;
    fundraising::update(
        &store,
        owner.id,
        campaign.id,
        univo::models::CampaignChanges {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let err = fundraising::donate(&store, None, donation(campaign.id, 100))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "{err:?}");
    let err = fundraising::donate(&store, None, donation(campaign.id, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err:?}");
}

#[tokio::test]
async fn webhook_success_completes_the_donation() {
    let store = common::store();
    let relay = relay();
    let owner = common::user(&store, "ada").await;
    let campaign = campaign(&store, &owner).await;
    let made = fundraising::donate(&store, None, donation(campaign.id, 500))
        .await
        .unwrap();
    let target = PaymentRef {
        kind: PaymentKind::Donation,
        record_id: made.id,
    };

    let intent = payments::create_payment_intent(
        &store,
        &relay,
        CreateIntentRequest {
            amount: 500,
            description: "donation".into(),
            target: Some(target),
        },
    )
    .await
    .unwrap();
    assert_eq!(intent.client_secret, "pi_1_secret");

    let (header, body) = signed(intent_event("payment_intent.succeeded", "pi_1", target));
    payments::handle_webhook(&store, &relay, Some(&header), &body)
        .await
        .unwrap();
    assert_eq!(status_of(&store, target).await, PaymentStatus::Completed);
    assert_eq!(current_amount(&store, campaign.id).await, 500);

    // a late failure cannot undo a completed payment
    let (header, body) = signed(intent_event("payment_intent.payment_failed", "pi_1", target));
    payments::handle_webhook(&store, &relay, Some(&header), &body)
        .await
        .unwrap();
    assert_eq!(status_of(&store, target).await, PaymentStatus::Completed);
    assert_eq!(current_amount(&store, campaign.id).await, 500);
}

#[tokio::test]
async fn failed_donations_drop_out_of_the_total_until_paid() {
    let store = common::store();
    let relay = relay();
    let owner = common::user(&store, "ada").await;
    let campaign = campaign(&store, &owner).await;
    let made = fundraising::donate(&store, None, donation(campaign.id, 300))
        .await
        .unwrap();
    let target = PaymentRef {
        kind: PaymentKind::Donation,
        record_id: made.id,
    };
    payments::create_payment_intent(
        &store,
        &relay,
        CreateIntentRequest {
            amount: 300,
            description: String::new(),
            target: Some(target),
        },
    )
    .await
    .unwrap();

    let (header, body) = signed(intent_event("payment_intent.payment_failed", "pi_1", target));
    payments::handle_webhook(&store, &relay, Some(&header), &body)
        .await
        .unwrap();
    assert_eq!(status_of(&store, target).await, PaymentStatus::Failed);
    assert_eq!(current_amount(&store, campaign.id).await, 0);

    let (header, body) = signed(intent_event("payment_intent.succeeded", "pi_1", target));
    payments::handle_webhook(&store, &relay, Some(&header), &body)
        .await
        .unwrap();
    assert_eq!(status_of(&store, target).await, PaymentStatus::Completed);
    assert_eq!(current_amount(&store, campaign.id).await, 300);
}

#[tokio::test]
async fn webhooks_must_be_signed_and_match_the_record() {
    let store = common::store();
    let relay = relay();
    let owner = common::user(&store, "ada").await;
    let campaign = campaign(&store, &owner).await;
    let made = fundraising::donate(&store, None, donation(campaign.id, 300))
        .await
        .unwrap();
    let target = PaymentRef {
        kind: PaymentKind::Donation,
        record_id: made.id,
    };
    payments::create_payment_intent(
        &store,
        &relay,
        CreateIntentRequest {
            amount: 300,
            description: String::new(),
            target: Some(target),
        },
    )
    .await
    .unwrap();

    let (_, body) = signed(intent_event("payment_intent.succeeded", "pi_1", target));
    let err = payments::handle_webhook(&store, &relay, None, &body)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err:?}");

    let stale = Utc::now() - Duration::minutes(10);
    let sig = WebhookVerifier::new(WEBHOOK_SECRET)
        .sign(stale.timestamp(), &body)
        .unwrap();
    let header = format!("t={},v1={sig}", stale.timestamp());
    let err = payments::handle_webhook(&store, &relay, Some(&header), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err:?}");

    // acknowledged, but a foreign intent never settles the record
    let (header, body) = signed(intent_event("payment_intent.succeeded", "pi_other", target));
    payments::handle_webhook(&store, &relay, Some(&header), &body)
        .await
        .unwrap();

    assert_eq!(status_of(&store, target).await, PaymentStatus::Pending);

    let (header, body) = signed(json!({
        "type": "charge.refunded",
        "data": { "object": { "id": "ch_1" } }
    }));
    payments::handle_webhook(&store, &relay, Some(&header), &body)
        .await
        .unwrap();
}

#[tokio::test]
async fn a_campaign_total_never_overflows() {
    let store = common::store();
    let owner = common::user(&store, "ada").await;
    let campaign = campaign(&store, &owner).await;

    fundraising::donate(&store, None, donation(campaign.id, i32::MAX))
        .await
        .unwrap();
    let err = fundraising::donate(&store, None, donation(campaign.id, 100))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err:?}");
    assert_eq!(current_amount(&store, campaign.id).await, i32::MAX);
    assert_eq!(
        fundraising::list_donations(&store, campaign.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn the_store_keeps_completed_payments_terminal() {
    let store = common::store();
    let owner = common::user(&store, "ada").await;
    let campaign = campaign(&store, &owner).await;
    let made = fundraising::donate(&store, None, donation(campaign.id, 400))
        .await
        .unwrap();
    let target = PaymentRef {
        kind: PaymentKind::Donation,
        record_id: made.id,
    };

    let previous = store
        .set_payment_status(target, PaymentStatus::Completed, Utc::now())
        .await
        .unwrap();
    assert_eq!(previous, PaymentStatus::Pending);
    let err = store
        .set_payment_status(target, PaymentStatus::Failed, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "{err:?}");

    assert_eq!(status_of(&store, target).await, PaymentStatus::Completed);
    assert_eq!(current_amount(&store, campaign.id).await, 400);
}

#[tokio::test]
async fn asking_twice_reuses_the_first_intent() {
    let store = common::store();
    let relay = relay();
    let owner = common::user(&store, "ada").await;
    let campaign = campaign(&store, &owner).await;
    let made = fundraising::donate(&store, None, donation(campaign.id, 700))
        .await
        .unwrap();
    let target = PaymentRef {
        kind: PaymentKind::Donation,
        record_id: made.id,
    };
    let request = || CreateIntentRequest {
        amount: 700,
        description: String::new(),
        target: Some(target),
    };

    let first = payments::create_payment_intent(&store, &relay, request())
        .await
        .unwrap();
    let second = payments::create_payment_intent(&store, &relay, request())
        .await
        .unwrap();
    assert_eq!(first.client_secret, "pi_1_secret");
    assert_eq!(second.client_secret, first.client_secret);

    let (header, body) = signed(intent_event("payment_intent.succeeded", "pi_1", target));
    payments::handle_webhook(&store, &relay, Some(&header), &body)
        .await
        .unwrap();
    assert_eq!(status_of(&store, target).await, PaymentStatus::Completed);
}

#[tokio::test]
async fn intents_need_a_provider_and_the_record_amount() {
    let store = common::store();
    let owner = common::user(&store, "ada").await;
    let campaign = campaign(&store, &owner).await;
    let made = fundraising::donate(&store, None, donation(campaign.id, 300))
        .await
        .unwrap();
    let target = PaymentRef {
        kind: PaymentKind::Donation,
        record_id: made.id,
    };
    let request = |amount| CreateIntentRequest {
        amount,
        description: String::new(),
        target: Some(target),
    };

    let err = payments::create_payment_intent(&store, &PaymentRelay::disabled(), request(300))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProviderUnavailable), "{err:?}");

    let relay = relay();
    let err = payments::create_payment_intent(&store, &relay, request(299))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err:?}");

    let err = payments::create_payment_intent(&store, &relay, request(0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err:?}");

    let (header, body) = signed(intent_event("payment_intent.succeeded", "pi_1", target));
    let err = payments::handle_webhook(&store, &PaymentRelay::disabled(), Some(&header), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProviderUnavailable), "{err:?}");
}

#[tokio::test]
async fn free_rsvps_complete_immediately() {
    let store = common::store();
    let host = common::user(&store, "ada").await;
    let event = |price| CreateEvent {
        club_id: None,
        title: "Game night".into(),
        description: String::new(),
        banner: None,
        date: Utc::now() + Duration::days(3),
        location: Some("Student union".into()),
        capacity: None,
        price,
        requires_payment: price > 0,
    };
    let rsvp = |event_id, tickets| CreateRsvp {
        event_id,
        attendee_name: "Sam".into(),
        attendee_email: "sam@campus.edu".into(),
        tickets_purchased: tickets,
    };

    let free = events::create(&store, host.id, event(0)).await.unwrap();
    let ticket = events::rsvp(&store, None, rsvp(free.id, 2)).await.unwrap();
    assert_eq!(ticket.total_amount, 0);
    assert_eq!(ticket.payment_status, PaymentStatus::Completed);

    let paid = events::create(&store, host.id, event(1500)).await.unwrap();
    let ticket = events::rsvp(&store, Some(host.id), rsvp(paid.id, 3))
        .await
        .unwrap();
    assert_eq!(ticket.total_amount, 4500);
    assert_eq!(ticket.payment_status, PaymentStatus::Pending);

    let err = events::rsvp(&store, None, rsvp(paid.id, 0)).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err:?}");
}
