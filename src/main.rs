use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use solana_sdk::pubkey::Pubkey;
use tracing::info;

use traderoom::config::Settings;
use traderoom::monitoring::init_logging;
use traderoom::{
    ChannelRecorder, KeypairSigner, SwapEngine, TradeOutcome, TradeRequest, TradeSide,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first
    dotenv().ok();

    let log_dir = "./logs";
    let file_level = "debug";
    let console_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _guard = init_logging(log_dir, file_level, &console_level)?;

    info!("Starting traderoom swap engine...");

    let settings = Settings::from_env().context("failed to load configuration")?;
    let validated = settings.validate().context("invalid configuration")?;

    info!(rpc_endpoints = validated.rpc_urls.len(),
        aggregator = %validated.aggregator_url,
        platform_fee_bps = validated.platform_fee_bps,
        "Configuration loaded");

    let signer = Arc::new(
        KeypairSigner::from_base58(&settings.wallet_private_key)
            .context("failed to load wallet keypair")?,
    );
    let recorder = Arc::new(ChannelRecorder::new(256));
    let mut events = recorder.subscribe();

    let engine =
        SwapEngine::new(validated, signer, recorder).context("failed to initialize swap engine")?;

    // Mirror recorded trades onto the console; the web layer subscribes the
    // same way per room.
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(trade_id = %event.trade_id, room = %event.room_mint,
                side = ?event.side, signature = %event.signature,
                status = ?event.status, "Trade recorded");
        }
    });

    let request = trade_request_from_env().context("invalid TRADE_* variables")?;
    match engine.execute_trade(request).await? {
        TradeOutcome::Confirmed { event, .. } => {
            info!(signature = %event.signature, output_amount = event.output_amount,
                fee_lamports = event.fee_lamports, "Trade confirmed");
        }
        TradeOutcome::Unconfirmed { signature, elapsed, .. } => {
            info!(%signature, elapsed_ms = elapsed.as_millis() as u64,
                "Trade unconfirmed, check explorer");
        }
        TradeOutcome::Cancelled => {
            info!("Trade cancelled");
        }
    }

    Ok(())
}

/// One-shot trade parameters: `TRADE_MINT`, `TRADE_SIDE` (buy|sell),
/// `TRADE_AMOUNT` in base units, optional `TRADE_SLIPPAGE_BPS` and
/// `TRADE_MEMO`.
fn trade_request_from_env() -> anyhow::Result<TradeRequest> {
    let room_mint = Pubkey::from_str(&std::env::var("TRADE_MINT").context("TRADE_MINT not set")?)
        .context("TRADE_MINT is not a valid pubkey")?;
    let side = match std::env::var("TRADE_SIDE")
        .context("TRADE_SIDE not set")?
        .to_lowercase()
        .as_str()
    {
        "buy" => TradeSide::Buy,
        "sell" => TradeSide::Sell,
        other => anyhow::bail!("TRADE_SIDE must be buy or sell, got {other:?}"),
    };
    let amount = std::env::var("TRADE_AMOUNT")
        .context("TRADE_AMOUNT not set")?
        .parse::<u64>()
        .context("TRADE_AMOUNT is not a valid amount")?;
    let slippage_bps = match std::env::var("TRADE_SLIPPAGE_BPS") {
        Ok(raw) => Some(raw.parse::<u16>().context("invalid TRADE_SLIPPAGE_BPS")?),
        Err(_) => None,
    };
    let memo = std::env::var("TRADE_MEMO").ok();

    Ok(TradeRequest {
        room_mint,
        side,
        amount,
        slippage_bps,
        memo,
    })
}
