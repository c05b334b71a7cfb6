use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use spl_associated_token_account::get_associated_token_address;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use traderoom_types::{TradeEvent, TradeSide, TradeStatus};

use crate::aggregator::AggregatorClient;
use crate::assembler;
use crate::blockhash::{BlockhashProvider, RpcPool};
use crate::classifier;
use crate::config::ValidatedSettings;
use crate::confirmation::{ConfirmationResult, ConfirmationTracker};
use crate::decoder;
use crate::error::{EngineError, Result};
use crate::fee_account::FeeAccountCache;
use crate::instructions;
use crate::submitter::{Submitter, TradeSigner};

/// Wrapped SOL, the native leg of every room pair.
pub const WSOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

/// One trade as the room UI phrases it: buy or sell the room's token
/// against SOL, with an optional chat message riding along on chain.
#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub room_mint: Pubkey,
    pub side: TradeSide,
    /// Input amount in base units: lamports for a buy, token units for a sell.
    pub amount: u64,
    pub slippage_bps: Option<u16>,
    pub memo: Option<String>,
}

/// What the caller gets back. `Unconfirmed` means the window closed with
/// the transaction still in flight; `Cancelled` is the silent outcome of a
/// wallet rejection and produces no chat bubble.
#[derive(Debug, Clone)]
pub enum TradeOutcome {
    Confirmed {
        event: TradeEvent,
        confirmation: ConfirmationResult,
    },
    Unconfirmed {
        event: TradeEvent,
        signature: Signature,
        elapsed: Duration,
    },
    Cancelled,
}

/// Sink for finished trades; the chat layer renders these as bubbles in
/// the token's room. Delivery is best-effort from the engine's point of
/// view: a sink error never fails a trade that already landed.
#[async_trait]
pub trait TradeRecorder: Send + Sync {
    async fn record(&self, event: TradeEvent) -> Result<()>;
}

/// Fan-out recorder over a broadcast channel, one subscription per room
/// consumer.
pub struct ChannelRecorder {
    sender: broadcast::Sender<TradeEvent>,
}

impl ChannelRecorder {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TradeEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl TradeRecorder for ChannelRecorder {
    async fn record(&self, event: TradeEvent) -> Result<()> {
        // A send error only means no room is currently listening.
        if let Err(e) = self.sender.send(event) {
            debug!(error = %e, "trade event dropped, no subscribers");
        }
        Ok(())
    }
}

pub struct SwapEngine {
    settings: ValidatedSettings,
    aggregator: AggregatorClient,
    pool: Arc<RpcPool>,
    blockhash: BlockhashProvider,
    fee_accounts: FeeAccountCache,
    submitter: Submitter,
    confirmation: ConfirmationTracker,
    signer: Arc<dyn TradeSigner>,
    recorder: Arc<dyn TradeRecorder>,
}

impl SwapEngine {
    pub fn new(
        settings: ValidatedSettings,
        signer: Arc<dyn TradeSigner>,
        recorder: Arc<dyn TradeRecorder>,
    ) -> Result<Self> {
        let pool = Arc::new(RpcPool::new(
            &settings.rpc_urls,
            CommitmentConfig::confirmed(),
        )?);
        Ok(Self {
            aggregator: AggregatorClient::new(settings.aggregator_url.clone()),
            blockhash: BlockhashProvider::new(Arc::clone(&pool)),
            fee_accounts: FeeAccountCache::new(settings.fee_recipient),
            submitter: Submitter::new(),
            confirmation: ConfirmationTracker::new(settings.ws_url.clone()),
            pool,
            settings,
            signer,
            recorder,
        })
    }

    /// Runs one trade end to end: quote, build, sign, submit, confirm.
    /// Every stage short-circuits on error except the auxiliary fee/memo
    /// send and the event recording, which are best-effort.
    pub async fn execute_trade(&self, request: TradeRequest) -> Result<TradeOutcome> {
        let trade_id = Uuid::new_v4();
        let payer = self.signer.pubkey();
        let (input_mint, output_mint) = trade_mints(request.side, &request.room_mint);
        let slippage_bps = request
            .slippage_bps
            .unwrap_or(self.settings.default_slippage_bps);

        info!(%trade_id, room_mint = %request.room_mint, side = ?request.side,
            amount = request.amount, slippage_bps, "Executing trade");

        // A resolved fee account lets the aggregator collect the platform
        // fee on-route; otherwise we fall back to a native-lamport transfer
        // prepended to the swap. The fee token is the trade's output mint.
        let fee_account = if self.settings.platform_fee_bps > 0 {
            self.fee_accounts
                .resolve(&self.pool.client(), &output_mint)
                .await
        } else {
            None
        };

        let quote = self
            .aggregator
            .quote(
                &input_mint,
                &output_mint,
                request.amount,
                slippage_bps,
                fee_account.map(|_| self.settings.platform_fee_bps),
            )
            .await?;
        let output_amount = quote.out_amount_raw()?;
        // The quote echoes a platformFee block back only when the aggregator
        // accepted the fee account and will collect on-route.
        let aggregator_collects = quote.platform_fee.is_some();

        // The native leg the fee is charged against: lamports in on a buy,
        // quoted lamports out on a sell.
        let native_leg = match request.side {
            TradeSide::Buy => request.amount,
            TradeSide::Sell => output_amount,
        };
        let fee_lamports =
            instructions::platform_fee_amount(native_leg, self.settings.platform_fee_bps);

        let payload = self
            .aggregator
            .swap_transaction(
                quote,
                &payer,
                fee_account,
                self.settings.prioritization_fee_lamports,
            )
            .await?;

        let rpc = self.pool.client();
        let decoded = decoder::decode(&rpc, &payload).await?;

        let fee_instruction = build_fee_leg(
            &payer,
            &self.settings.fee_recipient,
            fee_account,
            aggregator_collects,
            &output_mint,
            fee_lamports,
            instructions::platform_fee_amount(output_amount, self.settings.platform_fee_bps),
        )?;
        let memo_instruction = request
            .memo
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .map(|text| instructions::memo(text, &payer));

        let (blockhash, send_rpc) = self.blockhash.latest().await?;
        let mut assembled = assembler::assemble(
            &decoded,
            fee_instruction,
            memo_instruction,
            &payer,
            blockhash,
        )?;

        // The hash may have aged out between assembly and signing.
        if self.blockhash.is_stale() {
            let (fresh, _) = self.blockhash.latest().await?;
            assembled.refresh_blockhash(fresh);
        }

        let submitted = match self
            .submitter
            .submit(&send_rpc, self.signer.as_ref(), &assembled)
            .await
        {
            Ok(submitted) => submitted,
            Err(EngineError::UserCancelled) => {
                debug!(%trade_id, "trade cancelled by the user");
                return Ok(TradeOutcome::Cancelled);
            }
            Err(e) => return Err(e),
        };

        let confirmation = self
            .confirmation
            .wait_for_confirmation(&send_rpc, &submitted.primary)
            .await?;

        if let Some(on_chain_error) = &confirmation.on_chain_error {
            return Err(classifier::classify(on_chain_error, None).into_engine_error());
        }

        let status = if confirmation.landed {
            TradeStatus::Confirmed
        } else {
            TradeStatus::Unconfirmed
        };
        let event = TradeEvent {
            trade_id,
            room_mint: request.room_mint.to_string(),
            side: request.side,
            signature: submitted.primary.to_string(),
            input_amount: request.amount,
            output_amount,
            fee_lamports,
            status,
            timestamp: Utc::now(),
        };

        if let Err(e) = self.recorder.record(event.clone()).await {
            warn!(%trade_id, error = %e, "failed to record trade event");
        }

        if confirmation.landed {
            info!(%trade_id, signature = %confirmation.signature,
                elapsed_ms = confirmation.elapsed.as_millis() as u64, "Trade confirmed");
            Ok(TradeOutcome::Confirmed {
                event,
                confirmation,
            })
        } else {
            info!(%trade_id, signature = %confirmation.signature,
                "Trade unconfirmed after timeout, check explorer");
            Ok(TradeOutcome::Unconfirmed {
                event,
                signature: confirmation.signature,
                elapsed: confirmation.elapsed,
            })
        }
    }
}

/// Input and output mints for a side: buys spend SOL for the room token,
/// sells do the reverse. The output mint doubles as the fee token.
fn trade_mints(side: TradeSide, room_mint: &Pubkey) -> (Pubkey, Pubkey) {
    match side {
        TradeSide::Buy => (WSOL_MINT, *room_mint),
        TradeSide::Sell => (*room_mint, WSOL_MINT),
    }
}

/// Picks the fee delivery path for one trade:
/// - no resolved fee account: native-lamport transfer to the recipient;
/// - fee account resolved and the aggregator took it: no extra instruction;
/// - fee account resolved but the quote carries no platformFee echo: the
///   aggregator ignored the fee, so transfer the output-leg fee amount
///   from the payer's token account ourselves.
fn build_fee_leg(
    payer: &Pubkey,
    recipient: &Pubkey,
    fee_account: Option<Pubkey>,
    aggregator_collects: bool,
    output_mint: &Pubkey,
    fee_lamports: u64,
    output_fee_amount: u64,
) -> Result<Option<Instruction>> {
    match fee_account {
        None => Ok(instructions::fee_transfer(payer, recipient, fee_lamports)),
        Some(_) if aggregator_collects => Ok(None),
        Some(destination) => {
            let source = get_associated_token_address(payer, output_mint);
            instructions::spl_fee_transfer(&source, &destination, payer, output_fee_amount)
        }
    }
}
