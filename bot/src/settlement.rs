//! The settlement engine: one state machine per inbound tip.
//!
//! `Validating -> Playing -> Reporting -> Paying -> {Settled, RolledBack}`,
//! with a deferred-claim delivery mode that parks winnings as a pending
//! credit instead of entering `Paying`. Whole batches are serialized
//! through a per-pool mutex so two tips cannot interleave their playing
//! phases against the same balance.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use reelpot_engine::math::fee_split;
use reelpot_engine::{
    BatchTotals, GameResult, Purchase, Spin, OPERATOR_FEE_PCT,
};

use crate::config::{BotConfig, PayoutDelivery};
use crate::errors::BotError;
use crate::events::{Messenger, PaymentExecutor, TipEvent, Transfer};
use crate::ledger::JackpotLedger;
use crate::messages;
use crate::oracle::PriceOracle;
use crate::retry::retry_with_backoff;

/// Terminal disposition of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Winnings paid out.
    Settled,
    /// Payment failed; the ledger was compensated with the batch gross.
    RolledBack,
    /// Payment failed under the external-mirror policy; nothing to roll
    /// back.
    PaymentFailed,
    /// Winnings parked as a pending credit for a later claim.
    Deferred,
    /// Nothing was won.
    NoPayout,
}

/// Everything one tip produced, for logging and tests.
#[derive(Debug)]
pub struct BatchReport {
    pub purchase: Purchase,
    pub games: Vec<GameResult>,
    pub totals: BatchTotals,
    pub state: BatchState,
}

pub struct SettlementEngine {
    cfg: BotConfig,
    oracle: PriceOracle,
    ledger: JackpotLedger,
    payments: Arc<dyn PaymentExecutor>,
    messenger: Arc<dyn Messenger>,
    /// Serializes whole settlement batches for this pool.
    batch_lock: Mutex<()>,
}

impl SettlementEngine {
    pub fn new(
        cfg: BotConfig,
        oracle: PriceOracle,
        ledger: JackpotLedger,
        payments: Arc<dyn PaymentExecutor>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        SettlementEngine {
            cfg,
            oracle,
            ledger,
            payments,
            messenger,
            batch_lock: Mutex::new(()),
        }
    }

    /// Handle one inbound tip end to end. Tips addressed to someone
    /// else return `Ok(None)` without touching anything.
    pub async fn handle_tip(&self, event: &TipEvent) -> Result<Option<BatchReport>, BotError> {
        let mut rng = StdRng::from_entropy();
        self.handle_tip_with_rng(event, &mut rng).await
    }

    /// Same as [`handle_tip`] with an injected RNG so tests can pin the
    /// reels.
    ///
    /// [`handle_tip`]: SettlementEngine::handle_tip
    pub async fn handle_tip_with_rng<R: Rng + Send>(
        &self,
        event: &TipEvent,
        rng: &mut R,
    ) -> Result<Option<BatchReport>, BotError> {
        if event.receiver != self.cfg.receive_address {
            log::debug!(
                "ignoring tip to {} (we receive at {})",
                event.receiver,
                self.cfg.receive_address
            );
            return Ok(None);
        }

        let channel = match &event.channel_id {
            Some(channel) => channel.clone(),
            None => {
                let err = BotError::MissingRoutingInfo {
                    event_id: event.user_id.clone(),
                };
                log::error!("{err}; cannot notify the sender");
                return Err(err);
            }
        };
        if event.message_id.is_none() {
            // Best-effort fallback: we at least have a channel to say so.
            let err = BotError::MissingRoutingInfo {
                event_id: event.user_id.clone(),
            };
            log::error!("{err}");
            self.say(
                &channel,
                "Something went wrong routing your tip; please contact support.",
                None,
            );
            return Err(err);
        }
        let thread = event.message_id.as_deref();

        let _guard = self.batch_lock.lock().await;

        // Validating: price, entry fee, purchase size. Nothing mutates
        // on this path.
        let price = if self.cfg.fee_mode.needs_price() {
            match self.oracle.fetch_price().await {
                Ok(price) => Some(price),
                Err(err) => {
                    self.say(&channel, &messages::price_unavailable_message(), thread);
                    return Err(err);
                }
            }
        } else {
            None
        };
        let entry_fee = match self.cfg.fee_mode.entry_fee_units(price, self.cfg.unit_scale) {
            Ok(fee) => fee,
            Err(err) => {
                self.say(&channel, &messages::price_unavailable_message(), thread);
                return Err(BotError::InvalidTip(err));
            }
        };
        let purchase = match self.cfg.fee_mode.size_purchase(event.amount, entry_fee) {
            Ok(purchase) => purchase,
            Err(err) => {
                log::info!("rejected tip of {} from {}: {err}", event.amount, event.sender);
                self.say(
                    &channel,
                    &messages::invalid_tip_message(
                        &err,
                        entry_fee,
                        self.cfg.unit_scale,
                        &self.cfg.ticker,
                    ),
                    thread,
                );
                return Err(BotError::InvalidTip(err));
            }
        };

        // The entry fees join the pool before any game resolves.
        self.ledger.credit(event.amount)?;

        // Playing: each game snapshots the pool, spins, resolves and
        // debits before the next game runs.
        let mut games = Vec::with_capacity(purchase.num_games as usize);
        let mut totals = BatchTotals::default();
        for _ in 0..purchase.num_games {
            let game = self.play_one(rng, purchase.entry_fee)?;
            totals.record(&game);
            games.push(game);
        }

        // Reporting: one message per game in order, then a summary when
        // more than one game was played.
        for (i, game) in games.iter().enumerate() {
            self.say(
                &channel,
                &messages::game_message(
                    i as u32 + 1,
                    purchase.num_games,
                    game,
                    self.cfg.unit_scale,
                    &self.cfg.ticker,
                ),
                thread,
            );
        }
        if purchase.num_games > 1 {
            self.say(
                &channel,
                &messages::summary_message(&totals, self.cfg.unit_scale, &self.cfg.ticker),
                thread,
            );
        }

        // Paying, or deferring to a claim.
        let state = if totals.net == 0 {
            BatchState::NoPayout
        } else {
            match self.cfg.delivery {
                PayoutDelivery::Claim => {
                    let pending = self.ledger.add_pending(&event.user_id, totals.net)?;
                    self.say(
                        &channel,
                        &messages::pending_credit_message(
                            pending,
                            self.cfg.unit_scale,
                            &self.cfg.ticker,
                        ),
                        thread,
                    );
                    BatchState::Deferred
                }
                PayoutDelivery::Auto => self.pay(event, &totals, &channel, thread).await?,
            }
        };

        log::info!(
            "settled tip of {} from {}: {} game(s), gross {}, net {}, {:?}",
            event.amount,
            event.sender,
            totals.games,
            totals.gross,
            totals.net,
            state
        );
        Ok(Some(BatchReport {
            purchase,
            games,
            totals,
            state,
        }))
    }

    /// Resolve one game against the current pool. Percentage payouts
    /// cannot exceed the snapshot; fixed multiples and stale mirror
    /// reads are clamped to it.
    fn play_one<R: Rng>(&self, rng: &mut R, entry_fee: u64) -> Result<GameResult, BotError> {
        let pool = self.ledger.current_balance()?;
        let spin = Spin::draw(rng);
        let tier = spin.tier();
        let gross = match self.cfg.payout_table.rule_for(tier) {
            Some(rule) => rule.gross(pool, entry_fee).min(pool),
            None => 0,
        };
        let (net, fee) = if self.cfg.operator_address.is_some() {
            fee_split(gross, OPERATOR_FEE_PCT)
        } else {
            (gross, 0)
        };
        if gross > 0 {
            self.ledger.debit(gross)?;
        }
        Ok(GameResult {
            spin,
            tier,
            pool_before: pool,
            gross,
            fee,
            net,
        })
    }

    /// The `Paying` state: one atomic multi-transfer for the player net
    /// and any accrued operator fee, retried with backoff. The batch
    /// does not conclude until retries exhaust.
    async fn pay(
        &self,
        event: &TipEvent,
        totals: &BatchTotals,
        channel: &str,
        thread: Option<&str>,
    ) -> Result<BatchState, BotError> {
        let mut transfers = vec![Transfer {
            recipient: event.sender.clone(),
            amount: totals.net,
        }];
        if totals.fee > 0 {
            if let Some(operator) = &self.cfg.operator_address {
                transfers.push(Transfer {
                    recipient: operator.clone(),
                    amount: totals.fee,
                });
            }
        }

        let payments = &self.payments;
        let outcome = retry_with_backoff(
            self.cfg.retry.attempts,
            Duration::from_millis(self.cfg.retry.base_delay_ms),
            || payments.transfer(&transfers).map_err(|e| format!("{e:#}")),
        )
        .await;

        match outcome.result {
            Ok(tx_ref) => {
                self.say(
                    channel,
                    &messages::payment_success_message(
                        totals.net,
                        &tx_ref,
                        self.cfg.unit_scale,
                        &self.cfg.ticker,
                    ),
                    thread,
                );
                Ok(BatchState::Settled)
            }
            Err(reason) => {
                let err = BotError::PaymentFailure {
                    attempts: outcome.attempts_used,
                    reason,
                };
                log::error!("{err}");
                let rolled_back = self.ledger.supports_rollback();
                if rolled_back {
                    // Compensating credit of the full gross, restoring
                    // what the playing phase debited.
                    self.ledger.credit(totals.gross)?;
                }
                self.say(channel, &messages::payment_failure_message(rolled_back), thread);
                Ok(if rolled_back {
                    BatchState::RolledBack
                } else {
                    BatchState::PaymentFailed
                })
            }
        }
    }

    /// Claim a pending payout. Idempotent: the pending balance is
    /// swapped to zero before the transfer; a zero balance is a no-op
    /// reported as "nothing to claim"; a failed transfer restores the
    /// balance.
    pub async fn claim(
        &self,
        user_id: &str,
        recipient: &str,
        channel: Option<&str>,
    ) -> Result<u64, BotError> {
        let _guard = self.batch_lock.lock().await;

        let pending = self.ledger.take_pending(user_id)?;
        if pending == 0 {
            if let Some(channel) = channel {
                self.say(channel, &messages::nothing_to_claim_message(), None);
            }
            return Ok(0);
        }

        let transfers = [Transfer {
            recipient: recipient.to_string(),
            amount: pending,
        }];
        let payments = &self.payments;
        let outcome = retry_with_backoff(
            self.cfg.retry.attempts,
            Duration::from_millis(self.cfg.retry.base_delay_ms),
            || payments.transfer(&transfers).map_err(|e| format!("{e:#}")),
        )
        .await;

        match outcome.result {
            Ok(tx_ref) => {
                if let Some(channel) = channel {
                    self.say(
                        channel,
                        &messages::claim_paid_message(
                            pending,
                            &tx_ref,
                            self.cfg.unit_scale,
                            &self.cfg.ticker,
                        ),
                        None,
                    );
                }
                Ok(pending)
            }
            Err(reason) => {
                self.ledger.restore_pending(user_id, pending)?;
                if let Some(channel) = channel {
                    self.say(channel, &messages::claim_failed_message(), None);
                }
                Err(BotError::PaymentFailure {
                    attempts: outcome.attempts_used,
                    reason,
                })
            }
        }
    }

    pub fn ledger(&self) -> &JackpotLedger {
        &self.ledger
    }

    /// Message delivery is best effort; a failed send is logged, never
    /// fatal to the batch.
    fn say(&self, channel: &str, body: &str, thread: Option<&str>) {
        if let Err(err) = self.messenger.send(channel, body, thread) {
            log::warn!("failed to deliver message to {channel}: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use anyhow::Result;
    use rand::RngCore;
    use tempfile::TempDir;

    use reelpot_engine::{FeeMode, PayoutRule, PayoutTable, Tier};

    use crate::config::LedgerPolicyConfig;
    use crate::storage::StateStore;

    const FEE: u64 = 1_000;

    #[derive(Default)]
    struct RecordingMessenger {
        sent: StdMutex<Vec<(String, String, Option<String>)>>,
    }

    impl Messenger for RecordingMessenger {
        fn send(&self, channel: &str, body: &str, thread: Option<&str>) -> Result<()> {
            self.sent.lock().unwrap().push((
                channel.to_string(),
                body.to_string(),
                thread.map(str::to_string),
            ));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakePayments {
        fail: bool,
        calls: StdMutex<Vec<Vec<Transfer>>>,
    }

    impl FakePayments {
        fn failing() -> Self {
            FakePayments {
                fail: true,
                calls: StdMutex::default(),
            }
        }
    }

    impl PaymentExecutor for FakePayments {
        fn transfer(&self, transfers: &[Transfer]) -> Result<String> {
            self.calls.lock().unwrap().push(transfers.to_vec());
            if self.fail {
                anyhow::bail!("wallet unreachable")
            }
            Ok("tx-fake".to_string())
        }
    }

    /// RNG that repeats one word forever: every reel lands on the same
    /// symbol, so every spin is a triple (Cherry for word 0).
    struct ConstRng(u64);

    impl RngCore for ConstRng {
        fn next_u32(&mut self) -> u32 {
            self.0 as u32
        }

        fn next_u64(&mut self) -> u64 {
            self.0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            dest.fill(0);
            Ok(())
        }
    }

    struct Fixture {
        engine: SettlementEngine,
        messenger: Arc<RecordingMessenger>,
        payments: Arc<FakePayments>,
        _dir: TempDir,
    }

    fn fixture(mut cfg: BotConfig, payments: FakePayments) -> Fixture {
        let dir = TempDir::new().expect("tempdir");
        cfg.state_path = dir.path().join("state.json");
        cfg.retry.base_delay_ms = 0;
        assert_eq!(cfg.ledger, LedgerPolicyConfig::Local);
        let ledger = JackpotLedger::local(StateStore::open(&cfg.state_path));
        let messenger = Arc::new(RecordingMessenger::default());
        let payments = Arc::new(payments);
        let oracle = cfg.build_oracle();
        let engine = SettlementEngine::new(
            cfg,
            oracle,
            ledger,
            payments.clone() as Arc<dyn PaymentExecutor>,
            messenger.clone() as Arc<dyn Messenger>,
        );
        Fixture {
            engine,
            messenger,
            payments,
            _dir: dir,
        }
    }

    fn tip(amount: u64) -> TipEvent {
        TipEvent {
            sender: "alice-wallet".to_string(),
            receiver: "reelpot-bank".to_string(),
            amount,
            channel_id: Some("lobby".to_string()),
            message_id: Some("msg-1".to_string()),
            user_id: "alice".to_string(),
            space_id: None,
        }
    }

    #[tokio::test]
    async fn ignores_tips_for_other_receivers() {
        let f = fixture(BotConfig::dev(), FakePayments::default());
        let mut event = tip(FEE);
        event.receiver = "someone-else".to_string();
        let report = f.engine.handle_tip(&event).await.expect("ok");
        assert!(report.is_none());
        assert!(f.messenger.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_channel_is_fatal() {
        let f = fixture(BotConfig::dev(), FakePayments::default());
        let mut event = tip(FEE);
        event.channel_id = None;
        let err = f.engine.handle_tip(&event).await.expect_err("fatal");
        assert!(matches!(err, BotError::MissingRoutingInfo { .. }));
        assert_eq!(f.engine.ledger().current_balance().expect("balance"), 0);
    }

    #[tokio::test]
    async fn invalid_tip_mutates_nothing() {
        let mut cfg = BotConfig::dev();
        cfg.fee_mode = FeeMode::Exact { fee_units: FEE };
        let f = fixture(cfg, FakePayments::default());
        f.engine.ledger().credit(10_000).expect("seed pool");

        let err = f.engine.handle_tip(&tip(FEE + 1)).await.expect_err("rejected");
        assert!(matches!(err, BotError::InvalidTip(_)));
        assert_eq!(f.engine.ledger().current_balance().expect("balance"), 10_000);
        let sent = f.messenger.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("rejected"));
    }

    #[tokio::test]
    async fn four_game_batch_reports_exact_totals() {
        let mut cfg = BotConfig::dev();
        cfg.fee_mode = FeeMode::Exact { fee_units: FEE };
        cfg.operator_address = Some("operator".to_string());
        let f = fixture(cfg, FakePayments::default());
        f.engine.ledger().credit(100_000).expect("seed pool");

        let mut rng = ConstRng(0);
        let report = f
            .engine
            .handle_tip_with_rng(&tip(4 * FEE), &mut rng)
            .await
            .expect("handled")
            .expect("processed");

        assert_eq!(report.purchase.num_games, 4);
        assert_eq!(report.games.len(), 4);
        assert_eq!(
            report.totals.gross,
            report.games.iter().map(|g| g.gross).sum::<u64>()
        );
        assert_eq!(
            report.totals.net,
            report.games.iter().map(|g| g.net).sum::<u64>()
        );
        assert_eq!(report.totals.net + report.totals.fee, report.totals.gross);
        assert_eq!(report.state, BatchState::Settled);

        // Every constant-RNG spin is a triple and drains 50% of the
        // running pool, so each game saw a strictly smaller snapshot.
        for pair in report.games.windows(2) {
            assert_eq!(pair[0].tier, Tier::Triple);
            assert!(pair[1].pool_before < pair[0].pool_before);
        }

        // 4 game messages + 1 summary + 1 payment confirmation, all in
        // the tip's thread.
        let sent = f.messenger.sent.lock().unwrap();
        assert_eq!(sent.len(), 6);
        assert!(sent.iter().all(|(_, _, thread)| thread.as_deref() == Some("msg-1")));

        // One atomic multi-transfer: player net plus operator fee.
        let calls = f.payments.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2);
        assert_eq!(calls[0][0].amount, report.totals.net);
        assert_eq!(calls[0][1].amount, report.totals.fee);
    }

    #[tokio::test]
    async fn failed_payment_rolls_the_pool_back() {
        let mut cfg = BotConfig::dev();
        cfg.fee_mode = FeeMode::Exact { fee_units: FEE };
        cfg.payout_table = PayoutTable {
            triple: PayoutRule::Percentage(20),
            pair: PayoutRule::Percentage(5),
        };
        let f = fixture(cfg, FakePayments::failing());
        f.engine.ledger().credit(9_000).expect("seed pool");

        // Tip brings the pool to 10,000; the constant-RNG triple pays
        // 20% = 2,000, debiting to 8,000; the payment then fails.
        let mut rng = ConstRng(0);
        let report = f
            .engine
            .handle_tip_with_rng(&tip(FEE), &mut rng)
            .await
            .expect("handled")
            .expect("processed");

        assert_eq!(report.games.len(), 1);
        assert_eq!(report.games[0].pool_before, 10_000);
        assert_eq!(report.totals.gross, 2_000);
        assert_eq!(report.state, BatchState::RolledBack);

        // Retries exhausted, then the gross was credited back.
        assert_eq!(f.payments.calls.lock().unwrap().len(), 3);
        assert_eq!(f.engine.ledger().current_balance().expect("balance"), 10_000);

        let sent = f.messenger.sent.lock().unwrap();
        assert!(sent.iter().any(|(_, body, _)| body.contains("returned to the jackpot pool")));
    }

    #[tokio::test]
    async fn claim_is_idempotent() {
        let mut cfg = BotConfig::dev();
        cfg.delivery = PayoutDelivery::Claim;
        let f = fixture(cfg, FakePayments::default());
        f.engine.ledger().add_pending("alice", 5_000).expect("pending");

        let paid = f
            .engine
            .claim("alice", "alice-wallet", Some("lobby"))
            .await
            .expect("claimed");
        assert_eq!(paid, 5_000);
        {
            let calls = f.payments.calls.lock().unwrap();
            assert_eq!(calls.len(), 1);
            assert_eq!(
                calls[0],
                vec![Transfer {
                    recipient: "alice-wallet".to_string(),
                    amount: 5_000
                }]
            );
        }

        // Second claim: pending is already zero, no transfer attempted.
        let paid = f
            .engine
            .claim("alice", "alice-wallet", Some("lobby"))
            .await
            .expect("no-op");
        assert_eq!(paid, 0);
        assert_eq!(f.payments.calls.lock().unwrap().len(), 1);
        let sent = f.messenger.sent.lock().unwrap();
        assert!(sent.iter().any(|(_, body, _)| body.contains("Nothing to claim")));
    }

    #[tokio::test]
    async fn failed_claim_restores_the_pending_balance() {
        let mut cfg = BotConfig::dev();
        cfg.delivery = PayoutDelivery::Claim;
        let f = fixture(cfg, FakePayments::failing());
        f.engine.ledger().add_pending("alice", 5_000).expect("pending");

        let err = f
            .engine
            .claim("alice", "alice-wallet", Some("lobby"))
            .await
            .expect_err("payment down");
        assert!(matches!(err, BotError::PaymentFailure { attempts: 3, .. }));
        assert_eq!(f.engine.ledger().take_pending("alice").expect("restored"), 5_000);
    }

    #[tokio::test]
    async fn deferred_delivery_parks_winnings_as_pending() {
        let mut cfg = BotConfig::dev();
        cfg.fee_mode = FeeMode::Exact { fee_units: FEE };
        cfg.delivery = PayoutDelivery::Claim;
        let f = fixture(cfg, FakePayments::default());
        f.engine.ledger().credit(100_000).expect("seed pool");

        let mut rng = ConstRng(0);
        let report = f
            .engine
            .handle_tip_with_rng(&tip(FEE), &mut rng)
            .await
            .expect("handled")
            .expect("processed");

        assert_eq!(report.state, BatchState::Deferred);
        assert!(f.payments.calls.lock().unwrap().is_empty());
        assert_eq!(
            f.engine.ledger().take_pending("alice").expect("pending"),
            report.totals.net
        );
    }
}
