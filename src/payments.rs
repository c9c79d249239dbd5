//! Payment intents and the webhook that settles them.
//!
//! Records with a positive amount start `pending` and only the provider's
//! signed webhook moves them on. `completed` is terminal.

use crate::{
    error::{Error, Result},
    models::PaymentStatus,
    store::{DynStore, PaymentKind, PaymentRef},
};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::instrument;

type HmacSha256 = Hmac<Sha256>;

pub const CURRENCY: &str = "usd";
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Intent {
    pub id: String,
    pub client_secret: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_intent(
        &self,
        amount: i32,
        description: &str,
        target: Option<PaymentRef>,
    ) -> Result<Intent>;

    async fn retrieve_intent(&self, id: &str) -> Result<Intent>;
}

/// Stripe's REST API, form-encoded as it expects.
#[derive(Debug, Clone)]
pub struct StripeProvider {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeProvider {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| Error::Provider(e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    #[instrument(skip(self, description))]
    async fn create_intent(
        &self,
        amount: i32,
        description: &str,
        target: Option<PaymentRef>,
    ) -> Result<Intent> {
        let mut form = vec![
            ("amount", amount.to_string()),
            ("currency", CURRENCY.to_string()),
            ("description", description.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];
        if let Some(target) = target {
            form.push(("metadata[kind]", target.kind.to_string()));
            form.push(("metadata[record_id]", target.record_id.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Provider(e.to_string()))?;
        read_intent(response).await
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, id: &str) -> Result<Intent> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{id}", self.api_base))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| Error::Provider(e.to_string()))?;
        read_intent(response).await
    }
}

async fn read_intent(response: reqwest::Response) -> Result<Intent> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%status, %body, "payment intent rejected");
        return Err(Error::Provider(format!("provider answered {status}")));
    }
    response
        .json::<Intent>()
        .await
        .map_err(|e| Error::Provider(e.to_string()))
}

/// Checks `Stripe-Signature` headers: `t=<unix>,v1=<hex hmac>` over `"{t}.{body}"`.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn sign(&self, timestamp: i64, body: &[u8]) -> Result<String> {
        Ok(hex::encode(self.mac(timestamp, body)?.finalize().into_bytes()))
    }

    fn mac(&self, timestamp: i64, body: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| anyhow::anyhow!("webhook secret rejected: {e}"))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac)
    }

    pub fn verify(&self, header: &str, body: &[u8], now: i64) -> Result<()> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
                Some(("v1", sig)) => signatures.push(sig),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| Error::validation("malformed webhook signature"))?;
        if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(Error::validation("webhook signature is too old"));
        }

        let expected = self.mac(timestamp, body)?;
        let valid = signatures.iter().any(|sig| match hex::decode(sig) {
            Ok(bytes) => expected.clone().verify_slice(&bytes).is_ok(),
            Err(_) => false,
        });
        if !valid {
            return Err(Error::validation("webhook signature mismatch"));
        }
        Ok(())
    }
}

/// What the HTTP layer needs to take payments. Either half may be missing
/// when the deployment has no provider configured.
#[derive(Clone, Default)]
pub struct PaymentRelay {
    provider: Option<Arc<dyn PaymentProvider>>,
    verifier: Option<WebhookVerifier>,
}

impl PaymentRelay {
    pub fn new(
        provider: Option<Arc<dyn PaymentProvider>>,
        verifier: Option<WebhookVerifier>,
    ) -> Self {
        Self { provider, verifier }
    }

    pub fn disabled() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub amount: i32,
    #[serde(default)]
    pub description: String,
    pub target: Option<PaymentRef>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentResponse {
    pub client_secret: String,
}

/// One intent per record: asking again for a record that already has one
/// hands back the same client secret.
#[instrument(skip(store, relay))]
pub async fn create_payment_intent(
    store: &DynStore,
    relay: &PaymentRelay,
    req: CreateIntentRequest,
) -> Result<CreateIntentResponse> {
    let provider = relay.provider.as_ref().ok_or(Error::ProviderUnavailable)?;
    if req.amount <= 0 {
        return Err(Error::validation("amount must be positive"));
    }

    let Some(target) = req.target else {
        let intent = provider.create_intent(req.amount, &req.description, None).await?;
        tracing::info!(intent_id = %intent.id, "payment intent created");
        return Ok(CreateIntentResponse {
            client_secret: intent.client_secret,
        });
    };

    let record = store
        .find_payment(target)
        .await?
        .ok_or(Error::NotFound("payment record"))?;
    if record.amount != req.amount {
        return Err(Error::validation("amount does not match the record"));
    }
    if record.status == PaymentStatus::Completed {
        return Err(Error::invalid_state("record is already paid"));
    }
    if let Some(existing) = record.intent_id {
        let intent = provider.retrieve_intent(&existing).await?;
        tracing::debug!(intent_id = %intent.id, "reusing payment intent");
        return Ok(CreateIntentResponse {
            client_secret: intent.client_secret,
        });
    }

    let intent = provider
        .create_intent(req.amount, &req.description, Some(target))
        .await?;
    let attached = store.attach_payment_intent(target, &intent.id).await?;
    if attached != intent.id {
        tracing::warn!(intent_id = %intent.id, %attached, "record took another intent first");
        let intent = provider.retrieve_intent(&attached).await?;
        return Ok(CreateIntentResponse {
            client_secret: intent.client_secret,
        });
    }
    tracing::info!(intent_id = %intent.id, "payment intent created");
    Ok(CreateIntentResponse {
        client_secret: intent.client_secret,
    })
}

/// Moves a record to `status`; the store checks the transition on the row it
/// writes.
#[instrument(skip(store))]
pub async fn set_status(
    store: &DynStore,
    reference: PaymentRef,
    status: PaymentStatus,
) -> Result<PaymentStatus> {
    let previous = store.set_payment_status(reference, status, Utc::now()).await?;
    if previous != status {
        tracing::info!(from = %previous, to = %status, "payment status changed");
    }
    Ok(status)
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    kind: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: IntentObject,
}

#[derive(Debug, Deserialize)]
struct IntentObject {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl IntentObject {
    fn target(&self) -> Option<PaymentRef> {
        let kind = self.metadata.get("kind")?.parse::<PaymentKind>().ok()?;
        let record_id = self.metadata.get("record_id")?.parse().ok()?;
        Some(PaymentRef { kind, record_id })
    }
}

/// Verifies and applies one webhook delivery. Events this service does not
/// act on are acknowledged and dropped.
#[instrument(skip_all)]
pub async fn handle_webhook(
    store: &DynStore,
    relay: &PaymentRelay,
    signature: Option<&str>,
    body: &[u8],
) -> Result<()> {
    let verifier = relay.verifier.as_ref().ok_or(Error::ProviderUnavailable)?;
    let signature = signature.ok_or_else(|| Error::validation("missing webhook signature"))?;
    verifier.verify(signature, body, Utc::now().timestamp())?;

    let event: WebhookEvent = serde_json::from_slice(body)
        .map_err(|e| Error::validation(format!("malformed webhook payload: {e}")))?;
    let status = match event.kind.as_str() {
        "payment_intent.succeeded" => PaymentStatus::Completed,
        "payment_intent.payment_failed" => PaymentStatus::Failed,
        other => {
            tracing::debug!(event = other, "ignoring webhook event");
            return Ok(());
        }
    };

    let intent = event.data.object;
    let Some(target) = intent.target() else {
        tracing::warn!(intent_id = %intent.id, "webhook intent has no record metadata");
        return Ok(());
    };
    let record = store
        .find_payment(target)
        .await?
        .ok_or(Error::NotFound("payment record"))?;
    if record.intent_id.as_deref() != Some(intent.id.as_str()) {
        // acknowledged so the provider stops redelivering; needs a manual look
        tracing::error!(
            intent_id = %intent.id,
            stored = ?record.intent_id,
            "webhook intent does not match the record"
        );
        return Ok(());
    }

    match set_status(store, target, status).await {
        Err(Error::InvalidState(reason)) => {
            // late or replayed deliveries must not make the provider retry forever
            tracing::warn!(%reason, "ignoring stale payment event");
            Ok(())
        }
        other => other.map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_verify_within_tolerance() {
        let verifier = WebhookVerifier::new("whsec_test");
        let body = br#"{"type":"payment_intent.succeeded"}"#;
        let header = format!("t=1000,v1={}", verifier.sign(1000, body).unwrap());

        assert!(verifier.verify(&header, body, 1100).is_ok());
        assert!(verifier.verify(&header, body, 1000 + 301).is_err());
        assert!(verifier.verify(&header, b"{}", 1100).is_err());
        assert!(verifier.verify("v1=abc", body, 1100).is_err());
        assert!(WebhookVerifier::new("other").verify(&header, body, 1100).is_err());
    }

    #[test]
    fn intent_metadata_names_the_record() {
        let object = IntentObject {
            id: "pi_1".into(),
            metadata: HashMap::from([
                ("kind".to_string(), "dues_payment".to_string()),
                ("record_id".to_string(), "12".to_string()),
            ]),
        };
        assert_eq!(
            object.target(),
            Some(PaymentRef {
                kind: PaymentKind::DuesPayment,
                record_id: 12
            })
        );
    }
}
