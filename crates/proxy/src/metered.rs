//! The metered proxy state machine.
//!
//! Per request: `RESOLVE_MODEL → DEBIT → BUILD_CONTEXT → DISPATCH →
//! {NON_STREAM_DONE | STREAM_START | FAIL_REFUNDED}`.
//!
//! Pre-debit failures (unknown model, disabled model, insufficient
//! credit) never touch the ledger. Post-debit upstream failures trigger
//! exactly one refund before the error is surfaced. For streams, the
//! refund guard decides based on how much of the response was observed:
//! once a single content line has been delivered the request counts as
//! serviced and is never refunded, even if the stream truncates later.

use crate::upstream::UpstreamClient;
use futures::StreamExt;
use powergate_context::{ContextAssembler, Tokenizer, compile};
use powergate_core::error::{Error, ProxyError, Result};
use powergate_core::frame::ContextFrame;
use powergate_core::ledger::{CreditLedger, LedgerReason, ModelStore};
use powergate_core::message::ChatRequest;
use powergate_core::model::ModelConfig;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// The result of one accepted chat request.
#[derive(Debug)]
pub enum ChatOutcome {
    /// Non-streaming: the upstream completion object, passed through.
    Complete(serde_json::Value),
    /// Streaming: raw passthrough lines from upstream. Failures appear
    /// in-band as a single synthetic `data: {"error": ...}` line.
    Stream(mpsc::Receiver<String>),
}

/// Orchestrates one chat request against the ledger and an upstream.
pub struct MeteredProxy {
    ledger: Arc<dyn CreditLedger>,
    models: Arc<dyn ModelStore>,
    upstream: UpstreamClient,
}

impl MeteredProxy {
    pub fn new(
        ledger: Arc<dyn CreditLedger>,
        models: Arc<dyn ModelStore>,
        upstream: UpstreamClient,
    ) -> Self {
        Self {
            ledger,
            models,
            upstream,
        }
    }

    /// Run one metered chat request for `user_id`.
    pub async fn chat(&self, user_id: i64, request: ChatRequest) -> Result<ChatOutcome> {
        // RESOLVE_MODEL: no charge for unknown or disabled models.
        let model = self.resolve_model(&request.model).await?;

        // DEBIT: pre-flight charge; nothing to refund on failure.
        let cost = model.power_cost;
        let debited = self
            .ledger
            .debit(user_id, cost, LedgerReason::Chat, Some(model.id))
            .await?;
        if !debited {
            let balance = self.ledger.balance_of(user_id).await?;
            return Err(ProxyError::InsufficientCredit {
                required: cost,
                balance,
            }
            .into());
        }

        // BUILD_CONTEXT + DISPATCH.
        let request_id = Uuid::new_v4().to_string();
        let stream = request.stream;
        let payload = build_payload(&model, request);

        if stream {
            Ok(self.dispatch_stream(model, payload, user_id, cost, request_id))
        } else {
            self.dispatch_complete(&model, &payload, user_id, cost, &request_id)
                .await
        }
    }

    async fn resolve_model(&self, model: &str) -> Result<ModelConfig> {
        let id: i64 = model
            .parse()
            .map_err(|_| ProxyError::ModelNotFound(model.to_string()))?;
        let config = self
            .models
            .get_model_by_id(id)
            .await?
            .ok_or_else(|| ProxyError::ModelNotFound(model.to_string()))?;
        if !config.enabled {
            return Err(ProxyError::ModelDisabled(config.name).into());
        }
        Ok(config)
    }

    /// Non-streaming dispatch. Any upstream failure refunds once.
    async fn dispatch_complete(
        &self,
        model: &ModelConfig,
        payload: &serde_json::Value,
        user_id: i64,
        cost: i64,
        request_id: &str,
    ) -> Result<ChatOutcome> {
        let response = match self.upstream.post(model, payload).await {
            Ok(r) => r,
            Err(e) => {
                self.refund(user_id, cost, LedgerReason::RefundError, request_id)
                    .await?;
                return Err(ProxyError::UpstreamTransport(e.to_string()).into());
            }
        };

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "Upstream error, refunding");
            self.refund(user_id, cost, LedgerReason::RefundError, request_id)
                .await?;
            return Err(ProxyError::UpstreamHttp { status, body }.into());
        }

        match response.json::<serde_json::Value>().await {
            Ok(value) => Ok(ChatOutcome::Complete(value)),
            Err(e) => {
                // A 200 with an unreadable body is a provider failure too.
                self.refund(user_id, cost, LedgerReason::RefundError, request_id)
                    .await?;
                Err(ProxyError::UpstreamTransport(format!("response parse: {e}")).into())
            }
        }
    }

    /// Streaming dispatch. The guard task owns the ledger reconciliation
    /// so a caller disconnect can never leave a debited-but-unresolved
    /// balance.
    fn dispatch_stream(
        &self,
        model: ModelConfig,
        payload: serde_json::Value,
        user_id: i64,
        cost: i64,
        request_id: String,
    ) -> ChatOutcome {
        let (tx, rx) = mpsc::channel(64);
        let ledger = self.ledger.clone();
        let upstream = self.upstream.clone();

        tokio::spawn(async move {
            stream_with_refund_guard(upstream, model, payload, ledger, user_id, cost, request_id, tx)
                .await;
        });

        ChatOutcome::Stream(rx)
    }

    /// Reverse the pre-flight debit.
    ///
    /// A refund write failure leaves an un-reconciled balance; it is
    /// surfaced, never swallowed.
    async fn refund(
        &self,
        user_id: i64,
        amount: i64,
        reason: LedgerReason,
        request_id: &str,
    ) -> Result<()> {
        match self
            .ledger
            .credit(user_id, amount, reason, Some(request_id))
            .await
        {
            Ok(balance) => {
                debug!(user_id, amount, balance, reason = reason.as_str(), "Refunded");
                Ok(())
            }
            Err(e) => {
                error!(
                    user_id,
                    amount,
                    reason = reason.as_str(),
                    error = %e,
                    "Refund write failed, balance left un-reconciled"
                );
                Err(e.into())
            }
        }
    }
}

/// Compile the request into the upstream payload.
///
/// Context budget is half the model's window, reserving the rest as
/// generation headroom.
fn build_payload(model: &ModelConfig, request: ChatRequest) -> serde_json::Value {
    let tokenizer = Tokenizer::for_model(&model.model_id);
    let assembler = ContextAssembler::new(tokenizer);

    let mut frame = ContextFrame::from_messages(request.messages);
    let report = assembler.assemble(&mut frame, model.context_budget());
    debug!(
        model = %model.model_id,
        tokens = report.total_tokens(),
        budget = report.budget,
        history_dropped = report.history_dropped,
        overflow = report.overflow,
        "Context assembled"
    );

    serde_json::json!({
        "model": model.model_id,
        "messages": compile(frame),
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "presence_penalty": request.presence_penalty,
        "frequency_penalty": request.frequency_penalty,
        "stream": request.stream,
    })
}

/// One synthetic in-band error event.
fn error_line(message: &str) -> String {
    format!("data: {}", serde_json::json!({ "error": message }))
}

/// Best-effort-but-never-skipped refund from inside the stream guard.
/// Failures can only be alerted on here; the error event still reaches
/// the caller.
async fn refund_in_stream(
    ledger: &dyn CreditLedger,
    user_id: i64,
    amount: i64,
    reason: LedgerReason,
    request_id: &str,
) {
    match ledger.credit(user_id, amount, reason, Some(request_id)).await {
        Ok(balance) => {
            debug!(user_id, amount, balance, reason = reason.as_str(), "Refunded");
        }
        Err(e) => {
            error!(
                user_id,
                amount,
                reason = reason.as_str(),
                error = %e,
                "Refund write failed, balance left un-reconciled"
            );
        }
    }
}

/// Consume the upstream stream, forwarding raw lines and reconciling the
/// ledger by outcome. Exactly one refund path can fire:
///
/// - header-level non-200: `refund_stream_start`
/// - transport/stream failure before the first content line:
///   `refund_stream_crash`
/// - after the first content line: serviced, no refund.
///
/// Every refund is committed before the synthetic error event is sent.
#[allow(clippy::too_many_arguments)]
async fn stream_with_refund_guard(
    upstream: UpstreamClient,
    model: ModelConfig,
    payload: serde_json::Value,
    ledger: Arc<dyn CreditLedger>,
    user_id: i64,
    cost: i64,
    request_id: String,
    tx: mpsc::Sender<String>,
) {
    let response = match upstream.post(&model, &payload).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Stream connect failed");
            refund_in_stream(&*ledger, user_id, cost, LedgerReason::RefundStreamCrash, &request_id)
                .await;
            let _ = tx.send(error_line(&e.to_string())).await;
            return;
        }
    };

    let status = response.status().as_u16();
    if status != 200 {
        let body = response.text().await.unwrap_or_default();
        warn!(status, body = %body, "Stream start failed");
        refund_in_stream(&*ledger, user_id, cost, LedgerReason::RefundStreamStart, &request_id)
            .await;
        let _ = tx.send(error_line(&body)).await;
        return;
    }

    let mut has_started = false;
    let mut byte_stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk) = byte_stream.next().await {
        let bytes = match chunk {
            Ok(b) => b,
            Err(e) => {
                if has_started {
                    // Service rendered; truncation is the caller's to see.
                    warn!(error = %e, "Stream truncated after content, not refunding");
                } else {
                    warn!(error = %e, "Stream crashed before first content line");
                    refund_in_stream(
                        &*ledger,
                        user_id,
                        cost,
                        LedgerReason::RefundStreamCrash,
                        &request_id,
                    )
                    .await;
                    let _ = tx.send(error_line(&e.to_string())).await;
                }
                return;
            }
        };

        buffer.push_str(&String::from_utf8_lossy(&bytes));

        while let Some(line_end) = buffer.find('\n') {
            let line = buffer[..line_end].trim_end_matches('\r').to_string();
            buffer = buffer[line_end + 1..].to_string();
            if line.is_empty() {
                continue;
            }

            // Any content line means the model has worked; the ledger
            // decision is locked in before the line is forwarded.
            has_started = true;
            if tx.send(line).await.is_err() {
                // Caller went away after content: nothing left to decide.
                return;
            }
        }
    }

    if !buffer.trim().is_empty() {
        let _ = tx.send(buffer.trim_end().to_string()).await;
        has_started = true;
    }

    if !has_started {
        // 200 with an empty stream: the model never produced anything.
        refund_in_stream(&*ledger, user_id, cost, LedgerReason::RefundStreamCrash, &request_id)
            .await;
        let _ = tx
            .send(error_line("upstream stream ended before any content"))
            .await;
    }
}
