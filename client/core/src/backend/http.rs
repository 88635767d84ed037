//! HTTP Ledger Gateway
//!
//! Talks to a ledger gateway over JSON/HTTP.
//!
//! # Gateway API
//!
//! - `GET  /capabilities` - `{"initHooks": ["initializeAccessControl", ...]}`
//! - `POST /call/{method}` - body `{"args": [...]}`, reply `{"ok": value}` or `{"err": "message"}`
//!
//! The caller's principal travels in the `X-Ledger-Principal` header; it is
//! omitted for anonymous handles.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::traits::{ConnectionFactory, InitHook, LedgerService};
use crate::identity::IdentityScope;
use crate::models::{
    CategoryTotal, ExchangeRate, Expense, ExpenseDraft, ExpenseId, Timestamp, Trip, TripDraft,
    TripId, TripSummary,
};

/// Header carrying the caller's principal
pub const PRINCIPAL_HEADER: &str = "X-Ledger-Principal";

/// Reply envelope of `POST /call/{method}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Envelope<T> {
    Ok(T),
    Err(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Capabilities {
    #[serde(default)]
    init_hooks: Vec<String>,
}

fn decode_envelope<T: DeserializeOwned>(method: &str, body: Value) -> anyhow::Result<T> {
    let envelope: Envelope<T> = serde_json::from_value(body)
        .with_context(|| format!("Malformed reply to {method}"))?;
    match envelope {
        Envelope::Ok(value) => Ok(value),
        Envelope::Err(message) => bail!(message),
    }
}

fn decode_hooks(body: Value) -> anyhow::Result<Vec<InitHook>> {
    let caps: Capabilities = serde_json::from_value(body).context("Malformed capabilities")?;
    // Hooks this client does not know are ignored.
    Ok(caps
        .init_hooks
        .iter()
        .filter_map(|name| InitHook::from_method_name(name))
        .collect())
}

/// Opens [`HttpLedger`] handles against one gateway
#[derive(Clone)]
pub struct HttpLedgerFactory {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpLedgerFactory {
    /// Create a factory for the gateway at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn capabilities_url(&self) -> String {
        format!("{}/capabilities", self.base_url)
    }
}

#[async_trait]
impl ConnectionFactory for HttpLedgerFactory {
    async fn connect(&self, identity: &IdentityScope) -> anyhow::Result<Arc<dyn LedgerService>> {
        let mut request = self.http_client.get(self.capabilities_url());
        if let Some(principal) = identity.principal() {
            request = request.header(PRINCIPAL_HEADER, principal.as_str());
        }
        let body: Value = request
            .send()
            .await
            .context("Ledger gateway unreachable")?
            .error_for_status()?
            .json()
            .await?;
        let hooks = decode_hooks(body)?;

        tracing::debug!(identity = %identity, hooks = ?hooks, "Opened HTTP ledger handle");

        Ok(Arc::new(HttpLedger {
            base_url: self.base_url.clone(),
            http_client: self.http_client.clone(),
            principal: identity.principal().map(|p| p.as_str().to_string()),
            hooks,
        }))
    }
}

/// Ledger handle bound to one identity
pub struct HttpLedger {
    base_url: String,
    http_client: reqwest::Client,
    principal: Option<String>,
    hooks: Vec<InitHook>,
}

impl HttpLedger {
    fn call_url(&self, method: &str) -> String {
        format!("{}/call/{method}", self.base_url)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, args: Value) -> anyhow::Result<T> {
        let mut request = self
            .http_client
            .post(self.call_url(method))
            .json(&json!({ "args": args }));
        if let Some(ref principal) = self.principal {
            request = request.header(PRINCIPAL_HEADER, principal);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {method}"))?;
        if !response.status().is_success() {
            bail!("{method} returned HTTP {}", response.status());
        }
        let body: Value = response.json().await?;
        decode_envelope(method, body)
    }
}

#[async_trait]
impl LedgerService for HttpLedger {
    fn name(&self) -> &str {
        "http"
    }

    fn supports(&self, hook: InitHook) -> bool {
        self.hooks.contains(&hook)
    }

    async fn initialize(&self, hook: InitHook, secret: &str) -> anyhow::Result<()> {
        let args = match hook {
            InitHook::InitializeAccessControl => json!([]),
            InitHook::InitializeAccessControlWithSecret => json!([secret]),
        };
        self.call::<Value>(hook.method_name(), args).await?;
        Ok(())
    }

    async fn get_all_trips(&self) -> anyhow::Result<Vec<Trip>> {
        self.call("getAllTrips", json!([])).await
    }

    async fn get_active_trip(&self) -> anyhow::Result<Option<Trip>> {
        self.call("getActiveTrip", json!([])).await
    }

    async fn get_trip(&self, id: TripId) -> anyhow::Result<Option<Trip>> {
        self.call("getTrip", json!([id])).await
    }

    async fn create_trip(&self, draft: &TripDraft) -> anyhow::Result<TripId> {
        self.call("createTrip", json!([draft])).await
    }

    async fn update_trip(&self, id: TripId, draft: &TripDraft) -> anyhow::Result<Trip> {
        self.call("updateTrip", json!([id, draft])).await
    }

    async fn delete_trip(&self, id: TripId) -> anyhow::Result<bool> {
        self.call("deleteTrip", json!([id])).await
    }

    async fn set_active_trip(&self, id: TripId) -> anyhow::Result<Trip> {
        self.call("setActiveTrip", json!([id])).await
    }

    async fn get_expenses_for_trip(&self, trip_id: TripId) -> anyhow::Result<Vec<Expense>> {
        self.call("getExpensesForTrip", json!([trip_id])).await
    }

    async fn get_expense(&self, id: ExpenseId) -> anyhow::Result<Option<Expense>> {
        self.call("getExpense", json!([id])).await
    }

    async fn add_expense(
        &self,
        trip_id: TripId,
        draft: &ExpenseDraft,
    ) -> anyhow::Result<ExpenseId> {
        self.call("addExpense", json!([trip_id, draft])).await
    }

    async fn update_expense(&self, id: ExpenseId, draft: &ExpenseDraft) -> anyhow::Result<Expense> {
        self.call("updateExpense", json!([id, draft])).await
    }

    async fn delete_expense(&self, id: ExpenseId) -> anyhow::Result<bool> {
        self.call("deleteExpense", json!([id])).await
    }

    async fn get_expenses_by_category(
        &self,
        trip_id: TripId,
    ) -> anyhow::Result<Vec<CategoryTotal>> {
        self.call("getExpensesByCategory", json!([trip_id])).await
    }

    async fn get_trip_summary(&self, trip_id: TripId) -> anyhow::Result<TripSummary> {
        self.call("getTripSummary", json!([trip_id])).await
    }

    async fn get_exchange_rates(&self) -> anyhow::Result<Vec<ExchangeRate>> {
        self.call("getExchangeRates", json!([])).await
    }

    async fn fetch_and_store_exchange_rates(&self) -> anyhow::Result<bool> {
        self.call("fetchAndStoreExchangeRates", json!([])).await
    }

    async fn get_last_rate_update(&self) -> anyhow::Result<Timestamp> {
        self.call("getLastRateUpdate", json!([])).await
    }

    async fn update_exchange_rates(&self, rates: &[(String, f64)]) -> anyhow::Result<bool> {
        self.call("updateExchangeRates", json!([rates])).await
    }

    async fn get_api_key(&self) -> anyhow::Result<Option<String>> {
        self.call("getApiKey", json!([])).await
    }

    async fn set_api_key(&self, key: &str) -> anyhow::Result<bool> {
        self.call("setApiKey", json!([key])).await
    }

    async fn delete_api_key(&self) -> anyhow::Result<bool> {
        self.call("deleteApiKey", json!([])).await
    }

    async fn get_expenses_enabled(&self) -> anyhow::Result<bool> {
        self.call("getExpensesEnabled", json!([])).await
    }

    async fn get_available_currencies(&self) -> anyhow::Result<Vec<String>> {
        self.call("getAvailableCurrencies", json!([])).await
    }
}
