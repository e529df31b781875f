use std::sync::Arc;

use reqwest::StatusCode;
use tracing::debug;
use uuid::Uuid;

use crate::api::envelope::{parse_payload, unwrap_envelope};
use crate::api::{AcceptRequest, LocationUpdateRequest, OrderPayload, StageUpdateRequest};
use crate::engine::stage::{BackendStage, Stage, is_valid_transition, to_internal};
use crate::error::DispatchError;
use crate::models::location::LocationSample;
use crate::models::order::Order;
use crate::observability::metrics::Metrics;
use crate::session::SessionManager;

/// Issues accept/transition/read requests against the authoritative backend.
/// Reads are retried once on transient failure; stage writes are absolute
/// sets and therefore also safe to resend once; accepts are never retried —
/// a non-success accept is a lost race, not a fault.
pub struct DispatchClient {
    session: Arc<SessionManager>,
    metrics: Arc<Metrics>,
}

impl DispatchClient {
    pub fn new(session: Arc<SessionManager>, metrics: Arc<Metrics>) -> Self {
        Self { session, metrics }
    }

    /// Orders currently visible to the driver: unassigned queued orders in
    /// the driver's district plus the driver's own in-progress orders.
    pub async fn visible_orders(
        &self,
        driver_id: Uuid,
        district: Option<&str>,
    ) -> Result<Vec<Order>, DispatchError> {
        let url = format!("{}/orders", self.session.base_url());
        let url = url.as_str();

        let fetch = move || async move {
            let response = self
                .session
                .execute(|http| {
                    let mut request = http.get(url).query(&[("driver_id", driver_id.to_string())]);
                    if let Some(district) = district {
                        request = request.query(&[("district", district)]);
                    }
                    request
                })
                .await?;

            self.expect_ok(&response, "order list")?;
            let payloads: Vec<OrderPayload> = parse_payload(response).await?;
            Ok(payloads.into_iter().map(OrderPayload::into_order).collect())
        };

        retry_once_if_transient(fetch).await
    }

    pub async fn order_detail(&self, order_id: Uuid) -> Result<Order, DispatchError> {
        let url = format!("{}/orders/{order_id}", self.session.base_url());
        let url = url.as_str();

        let fetch = move || async move {
            let response = self.session.execute(|http| http.get(url)).await?;
            self.expect_ok(&response, "order detail")?;
            let payload: OrderPayload = parse_payload(response).await?;
            Ok(payload.into_order())
        };

        retry_once_if_transient(fetch).await
    }

    /// Claim a queued, unassigned order. The server applies the conditional
    /// assign atomically; any non-success answer means another driver got
    /// there first and is reported as [`DispatchError::Conflict`]. Never
    /// retried: the client cannot distinguish "lost the race" from "would
    /// lose it again".
    pub async fn accept_order(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> Result<(), DispatchError> {
        let url = format!("{}/orders/{order_id}/accept", self.session.base_url());

        let response = self
            .session
            .execute(|http| http.post(&url).json(&AcceptRequest { driver_id }))
            .await
            .inspect_err(|_| {
                self.metrics
                    .accepts_total
                    .with_label_values(&["error"])
                    .inc();
            })?;

        if !response.status().is_success() {
            self.metrics.accepts_total.with_label_values(&["lost"]).inc();
            return Err(DispatchError::Conflict);
        }

        // Some deployments signal the lost race in the envelope instead of
        // the status line.
        let value: serde_json::Value = response.json().await?;
        if unwrap_envelope(value).is_err() {
            self.metrics.accepts_total.with_label_values(&["lost"]).inc();
            return Err(DispatchError::Conflict);
        }

        self.metrics
            .accepts_total
            .with_label_values(&["assigned"])
            .inc();
        debug!(order_id = %order_id, driver_id = %driver_id, "order accepted");
        Ok(())
    }

    /// Write a stage transition. Validated locally against the lifecycle
    /// table before anything is sent; the write itself is an absolute set of
    /// the canonical internal stage, so a resend after a timeout cannot
    /// double-advance.
    pub async fn update_stage(
        &self,
        order_id: Uuid,
        last_known: Stage,
        to: Stage,
    ) -> Result<(), DispatchError> {
        if !is_valid_transition(last_known, to) {
            return Err(DispatchError::InvalidTransition {
                from: last_known,
                to,
            });
        }

        let internal = to_internal(to);
        let result = retry_once_if_transient(|| self.send_stage(order_id, internal)).await;

        let outcome = if result.is_ok() { "success" } else { "error" };
        self.metrics
            .stage_updates_total
            .with_label_values(&[outcome])
            .inc();
        result
    }

    async fn send_stage(&self, order_id: Uuid, stage: BackendStage) -> Result<(), DispatchError> {
        let url = format!("{}/orders/{order_id}/stage", self.session.base_url());

        let response = self
            .session
            .execute(|http| http.put(&url).json(&StageUpdateRequest { stage }))
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Err(DispatchError::Conflict);
        }
        self.expect_ok(&response, "stage update")?;

        let value: serde_json::Value = response.json().await?;
        unwrap_envelope(value)?;
        Ok(())
    }

    /// Dispatch-relevant position write; the tracker is the only caller.
    pub async fn push_location(
        &self,
        driver_id: Uuid,
        sample: &LocationSample,
    ) -> Result<(), DispatchError> {
        let url = format!("{}/drivers/{driver_id}/location", self.session.base_url());
        let body = LocationUpdateRequest::new(driver_id, sample);

        let response = self
            .session
            .execute(|http| http.post(&url).json(&body))
            .await?;
        self.expect_ok(&response, "location update")?;
        Ok(())
    }

    fn expect_ok(
        &self,
        response: &reqwest::Response,
        what: &str,
    ) -> Result<(), DispatchError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() {
            Err(DispatchError::Transient(format!("{what} failed: {status}")))
        } else {
            Err(DispatchError::Internal(format!("{what} failed: {status}")))
        }
    }
}

async fn retry_once_if_transient<T, F, Fut>(attempt: F) -> Result<T, DispatchError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, DispatchError>>,
{
    match attempt().await {
        Err(DispatchError::Transient(reason)) => {
            debug!(reason = %reason, "retrying after transient failure");
            attempt().await
        }
        other => other,
    }
}
