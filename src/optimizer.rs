/// Optimizer Contract
///
/// The optimizer is an external HTTP service. A round trip is:
///
/// 1. build an [`OptimizerRequest`] from a snapshot of the table state
/// 2. POST it as JSON to `{base_url}/api/optimize`
/// 3. decode an [`OptimizerResponse`]; anything but `status == "success"` is
///    an error
/// 4. hand the response to [`crate::merge::plan_merge`]
///
/// Failures never touch the table state. The HTTP client lives behind the
/// `optimizer` feature; the request/response types are always available.

use crate::catalog;
use crate::row::{Row, TableState};
use crate::workbook::RawRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const OPTIMIZE_PATH: &str = "/api/optimize";
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;

const DEFAULT_FAILURE_MESSAGE: &str = "Optimization failed";

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("optimizer unreachable: {0}")]
    Transport(String),

    #[error("optimizer timed out after {0}s")]
    Timeout(u64),

    #[error("optimizer returned HTTP {0}")]
    BadStatus(u16),

    #[error("optimizer response could not be decoded: {0}")]
    Decode(String),

    #[error("{0}")]
    Rejected(String),
}

/// Margin percentages sent alongside the tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub refurbishment: f64,
    pub harvesting_module: f64,
    pub harvesting_parts: f64,
    pub total: f64,
}

impl Default for Margins {
    fn default() -> Self {
        Margins {
            refurbishment: 20.0,
            harvesting_module: 25.0,
            harvesting_parts: 30.0,
            total: 22.0,
        }
    }
}

/// Read margins off the buy-back valuation rows.
///
/// A row's metric label picks the slot by substring, checked in the order
/// refurbishment, module, parts, total; later rows win. A missing or zero
/// margin keeps the default.
pub fn extract_margins(max_buyback: &[Row]) -> Margins {
    let defaults = Margins::default();
    let mut found: [Option<f64>; 4] = [None; 4];
    for row in max_buyback {
        let metric = row.text("metric").to_lowercase();
        let margin = row.number("required_margin");
        let slot = if metric.contains("refurbishment") {
            0
        } else if metric.contains("module") {
            1
        } else if metric.contains("parts") {
            2
        } else if metric.contains("total") {
            3
        } else {
            continue;
        };
        found[slot] = Some(margin);
    }
    let pick = |v: Option<f64>, default: f64| v.filter(|m| *m != 0.0).unwrap_or(default);
    Margins {
        refurbishment: pick(found[0], defaults.refurbishment),
        harvesting_module: pick(found[1], defaults.harvesting_module),
        harvesting_parts: pick(found[2], defaults.harvesting_parts),
        total: pick(found[3], defaults.total),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerRequest {
    pub system_recommendation: Vec<Row>,
    pub max_buyback: Vec<Row>,
    pub systems: Vec<Row>,
    pub modules: Vec<Row>,
    pub parts: Vec<Row>,
    pub refurbishment_margin: f64,
    pub harvesting_module_margin: f64,
    pub harvesting_parts_margin: f64,
    pub total_margin: f64,
}

impl OptimizerRequest {
    /// Build a request from a state snapshot. Missing tables send empty.
    pub fn from_state(state: &TableState) -> Self {
        let table = |id: &str| state.get(id).cloned().unwrap_or_default();
        let max_buyback = table(catalog::MAX_BUYBACK);
        let margins = extract_margins(&max_buyback);
        OptimizerRequest {
            system_recommendation: table(catalog::MACHINE_RECOMMENDATION),
            max_buyback,
            systems: table(catalog::SYSTEMS),
            modules: table(catalog::MODULES),
            parts: table(catalog::PARTS),
            refurbishment_margin: margins.refurbishment,
            harvesting_module_margin: margins.harvesting_module,
            harvesting_parts_margin: margins.harvesting_parts,
            total_margin: margins.total,
        }
    }
}

/// Decoded optimizer reply. Result sets are loose records keyed by the
/// optimizer's own column headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input1_data: Option<Vec<RawRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbase_data: Option<Vec<RawRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input2_data: Option<Vec<RawRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outprofit_data: Option<Vec<RawRecord>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<RawRecord>,
}

impl OptimizerResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Turn a non-success reply into an error carrying its message.
    pub fn into_result(self) -> Result<Self, OptimizerError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(OptimizerError::Rejected(
                self.message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            ))
        }
    }
}

/// `{base}/api/optimize`, or the bare path when no base is configured.
pub fn optimize_url(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.is_empty() {
        OPTIMIZE_PATH.to_string()
    } else {
        format!("{}{}", base, OPTIMIZE_PATH)
    }
}

#[cfg(feature = "optimizer")]
pub use client::{optimize, OptimizerClient};

#[cfg(feature = "optimizer")]
mod client {
    use super::*;
    use crate::merge::plan_merge;
    use crate::store::TableStore;
    use std::time::Duration;

    /// HTTP client for the optimizer service.
    #[derive(Debug, Clone)]
    pub struct OptimizerClient {
        http: reqwest::Client,
        url: String,
        timeout_secs: u64,
    }

    impl OptimizerClient {
        pub fn new(base_url: &str) -> Result<Self, OptimizerError> {
            Self::with_timeout(base_url, DEFAULT_TIMEOUT_SECS)
        }

        pub fn with_timeout(base_url: &str, timeout_secs: u64) -> Result<Self, OptimizerError> {
            let http = reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .map_err(|e| OptimizerError::Transport(e.to_string()))?;
            Ok(OptimizerClient {
                http,
                url: optimize_url(base_url),
                timeout_secs,
            })
        }

        pub fn url(&self) -> &str {
            &self.url
        }

        /// POST the request and decode the reply.
        ///
        /// Error bodies are still decoded when possible so the service's own
        /// message reaches the user.
        pub async fn submit(
            &self,
            request: &OptimizerRequest,
        ) -> Result<OptimizerResponse, OptimizerError> {
            log::info!("posting optimizer request to {}", self.url);
            let response = self
                .http
                .post(&self.url)
                .json(request)
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;

            let status = response.status();
            let body = response.text().await.map_err(|e| self.transport_error(e))?;

            let decoded = match serde_json::from_str::<OptimizerResponse>(&body) {
                Ok(decoded) => decoded,
                Err(_) if !status.is_success() => {
                    return Err(OptimizerError::BadStatus(status.as_u16()))
                }
                Err(e) => return Err(OptimizerError::Decode(e.to_string())),
            };
            if !status.is_success() && decoded.is_success() {
                return Err(OptimizerError::BadStatus(status.as_u16()));
            }

            let decoded = decoded.into_result()?;
            for warning in &decoded.warnings {
                log::warn!("optimizer warning: {}", serde_json::Value::Object(warning.clone()));
            }
            Ok(decoded)
        }

        fn transport_error(&self, e: reqwest::Error) -> OptimizerError {
            if e.is_timeout() {
                OptimizerError::Timeout(self.timeout_secs)
            } else {
                OptimizerError::Transport(e.to_string())
            }
        }
    }

    /// Full round trip against a store: snapshot, submit, merge.
    ///
    /// On any failure the store is left exactly as it was.
    pub async fn optimize(
        store: &mut TableStore,
        client: &OptimizerClient,
    ) -> Result<OptimizerResponse, OptimizerError> {
        let request = OptimizerRequest::from_state(store.state());
        let response = client.submit(&request).await?;
        let plan = plan_merge(store.state(), &response);
        store.apply_merge(plan);
        Ok(response)
    }
}
