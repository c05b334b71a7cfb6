use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::error::{EngineError, Result};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlatformFee {
    pub amount: String,
    #[serde(rename = "feeBps")]
    pub fee_bps: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DynamicSlippage {
    #[serde(rename = "minBps")]
    pub min_bps: i32,
    #[serde(rename = "maxBps")]
    pub max_bps: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SwapInfo {
    #[serde(rename = "ammKey")]
    pub amm_key: String,
    pub label: Option<String>,
    #[serde(rename = "inputMint")]
    pub input_mint: String,
    #[serde(rename = "outputMint")]
    pub output_mint: String,
    #[serde(rename = "inAmount")]
    pub in_amount: String,
    #[serde(rename = "outAmount")]
    pub out_amount: String,
    #[serde(rename = "feeAmount")]
    pub fee_amount: String,
    #[serde(rename = "feeMint")]
    pub fee_mint: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoutePlan {
    #[serde(rename = "swapInfo")]
    pub swap_info: SwapInfo,
    pub percent: i32,
}

/// A route quote returned by the aggregator. Immutable once returned: a
/// stale quote is re-fetched, never patched up and reused.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QuoteResponse {
    #[serde(rename = "inputMint")]
    pub input_mint: String,
    #[serde(rename = "inAmount")]
    pub in_amount: String,
    #[serde(rename = "outputMint")]
    pub output_mint: String,
    #[serde(rename = "outAmount")]
    pub out_amount: String,
    #[serde(rename = "otherAmountThreshold")]
    pub other_amount_threshold: String,
    #[serde(rename = "swapMode")]
    pub swap_mode: String,
    #[serde(rename = "slippageBps")]
    pub slippage_bps: i32,
    #[serde(rename = "platformFee")]
    pub platform_fee: Option<PlatformFee>,
    #[serde(rename = "priceImpactPct")]
    pub price_impact_pct: String,
    #[serde(rename = "routePlan")]
    pub route_plan: Vec<RoutePlan>,
    #[serde(rename = "contextSlot")]
    pub context_slot: u64,
    #[serde(rename = "timeTaken")]
    pub time_taken: Option<f64>,
}

impl QuoteResponse {
    /// Output amount in the output mint's smallest unit.
    pub fn out_amount_raw(&self) -> Result<u64> {
        self.out_amount.parse::<u64>().map_err(|e| {
            EngineError::QuoteFailed(format!(
                "aggregator returned unparseable outAmount '{}': {}",
                self.out_amount, e
            ))
        })
    }

    pub fn in_amount_raw(&self) -> Result<u64> {
        self.in_amount.parse::<u64>().map_err(|e| {
            EngineError::QuoteFailed(format!(
                "aggregator returned unparseable inAmount '{}': {}",
                self.in_amount, e
            ))
        })
    }
}

#[derive(Serialize, Debug)]
struct SwapRequest {
    #[serde(rename = "userPublicKey")]
    user_public_key: String,
    #[serde(rename = "wrapAndUnwrapSol")]
    wrap_and_unwrap_sol: bool,
    #[serde(rename = "feeAccount")]
    fee_account: Option<String>,
    #[serde(rename = "prioritizationFeeLamports")]
    prioritization_fee_lamports: Option<u64>,
    #[serde(rename = "asLegacyTransaction")]
    as_legacy_transaction: bool,
    #[serde(rename = "dynamicComputeUnitLimit")]
    dynamic_compute_unit_limit: bool,
    #[serde(rename = "dynamicSlippage")]
    dynamic_slippage: Option<DynamicSlippage>,
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponse,
}

/// The swap endpoint's answer: an opaque pre-built transaction plus the
/// lookup tables it references. Decoding is the `decoder` module's job.
#[derive(Deserialize, Debug, Clone)]
pub struct SwapTransactionPayload {
    #[serde(rename = "swapTransaction")]
    pub swap_transaction: String,
    #[serde(rename = "lastValidBlockHeight")]
    pub last_valid_block_height: Option<u64>,
    #[serde(rename = "lookupTableAddresses", default)]
    pub lookup_table_addresses: Vec<String>,
}

/// HTTP client for the swap aggregator's quote and swap endpoints.
#[derive(Clone)]
pub struct AggregatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl AggregatorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Requests a route quote. Never retried here: the caller decides whether
    /// a fresh quote is worth asking for, because a stale one is worse than a
    /// failed one.
    pub async fn quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
        platform_fee_bps: Option<u64>,
    ) -> Result<QuoteResponse> {
        let mut url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.base_url, input_mint, output_mint, amount, slippage_bps,
        );
        if let Some(fee_bps) = platform_fee_bps {
            url.push_str(&format!("&platformFeeBps={}", fee_bps));
        }

        debug!(%input_mint, %output_mint, amount, slippage_bps, "Requesting quote");
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            // Surface the aggregator's reported reason verbatim
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error body".to_string());
            return Err(EngineError::QuoteFailed(body));
        }

        Ok(response.json::<QuoteResponse>().await?)
    }

    /// Exchanges a quote for a pre-built swap transaction. The quote is
    /// consumed here; callers must fetch a new one per attempt.
    pub async fn swap_transaction(
        &self,
        quote: QuoteResponse,
        user: &Pubkey,
        fee_account: Option<Pubkey>,
        prioritization_fee_lamports: Option<u64>,
    ) -> Result<SwapTransactionPayload> {
        let request = SwapRequest {
            user_public_key: user.to_string(),
            wrap_and_unwrap_sol: true,
            fee_account: fee_account.map(|k| k.to_string()),
            prioritization_fee_lamports,
            as_legacy_transaction: false,
            dynamic_compute_unit_limit: true,
            dynamic_slippage: None,
            quote_response: quote,
        };

        let response = self
            .http
            .post(format!("{}/swap", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error body".to_string());
            return Err(EngineError::QuoteFailed(format!(
                "swap endpoint rejected the quote: {}",
                body
            )));
        }

        Ok(response.json::<SwapTransactionPayload>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_quote(out_amount: &str) -> QuoteResponse {
        QuoteResponse {
            input_mint: "So11111111111111111111111111111111111111112".to_string(),
            in_amount: "1000000000".to_string(),
            output_mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
            out_amount: out_amount.to_string(),
            other_amount_threshold: "0".to_string(),
            swap_mode: "ExactIn".to_string(),
            slippage_bps: 50,
            platform_fee: None,
            price_impact_pct: "0.01".to_string(),
            route_plan: vec![],
            context_slot: 1234,
            time_taken: Some(0.05),
        }
    }

    #[test]
    fn test_amount_parsing() {
        let quote = sample_quote("250000000");
        assert_eq!(quote.out_amount_raw().unwrap(), 250_000_000);
        assert_eq!(quote.in_amount_raw().unwrap(), 1_000_000_000);
    }

    #[test]
    fn test_garbage_amount_is_a_quote_failure() {
        let quote = sample_quote("not-a-number");
        assert!(matches!(
            quote.out_amount_raw(),
            Err(EngineError::QuoteFailed(_))
        ));
    }

    #[test]
    fn test_payload_defaults_lookup_tables() {
        let payload: SwapTransactionPayload =
            serde_json::from_str(r#"{"swapTransaction": "AAEC"}"#).unwrap();
        assert!(payload.lookup_table_addresses.is_empty());
        assert_eq!(payload.swap_transaction, "AAEC");
    }
}
