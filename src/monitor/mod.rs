//! Evaluation cycle orchestration
//!
//! One cycle fans out over the tracked symbols with at most
//! `concurrency_limit` pipelines in flight. Each pipeline is
//! fetch → detect → state decision. Allowed alerts are handed to separate
//! dispatch tasks (interpret → notify) so a slow LLM or webhook never holds a
//! pipeline slot. The cycle waits for its dispatches before reporting.


use crate::config::{Config, MonitorConfig};
use crate::data::{BinanceFuturesClient, MarketDataSource};
use crate::detector::{default_detectors, SignalDetector};
use crate::error::Result;
use crate::interpret::{self, Interpreter};
use crate::notify::{format_alert, DeliveryReport, Notifier};
use crate::state::AlertStateManager;
use crate::types::Finding;
use chrono::Utc;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Counters for one evaluation cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub symbols_checked: usize,
    pub symbols_skipped: usize,
    pub findings: usize,
    pub alerts_dispatched: usize,
    pub alerts_suppressed: usize,
    pub deliveries_failed: usize,
    /// The fan-out hit `cycle_timeout_secs`; unfinished pipelines were aborted
    pub timed_out: bool,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked={} skipped={} findings={} dispatched={} suppressed={} delivery_failures={}{}",
            self.symbols_checked,
            self.symbols_skipped,
            self.findings,
            self.alerts_dispatched,
            self.alerts_suppressed,
            self.deliveries_failed,
            if self.timed_out { " (timed out)" } else { "" }
        )
    }
}

#[derive(Default)]
struct SymbolOutcome {
    skipped: bool,
    findings: usize,
    suppressed: usize,
    dispatches: Vec<JoinHandle<DeliveryReport>>,
}

#[derive(Clone)]
pub struct Monitor {
    source: Arc<dyn MarketDataSource>,
    detectors: Arc<Vec<Box<dyn SignalDetector>>>,
    state: Arc<AlertStateManager>,
    interpreter: Arc<dyn Interpreter>,
    notifier: Arc<Notifier>,
    config: MonitorConfig,
    dispatch_slots: Arc<Semaphore>,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        detectors: Vec<Box<dyn SignalDetector>>,
        state: Arc<AlertStateManager>,
        interpreter: Arc<dyn Interpreter>,
        notifier: Arc<Notifier>,
        config: MonitorConfig,
    ) -> Self {
        let dispatch_slots = Arc::new(Semaphore::new(config.dispatch_concurrency.max(1)));
        Self {
            source,
            detectors: Arc::new(detectors),
            state,
            interpreter,
            notifier,
            config,
            dispatch_slots,
        }
    }

    /// Production wiring: Binance futures data, configured interpreter and
    /// notification channels
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = Arc::new(BinanceFuturesClient::new(&config.exchange)?);
        let interpreter = interpret::from_config(config.llm.as_ref())?;
        let notifier = Arc::new(Notifier::from_config(&config.notify)?);

        info!(
            "[Monitor] source={} interpreter={} channels={:?}",
            source.name(),
            interpreter.name(),
            notifier.channel_names()
        );

        Ok(Self::new(
            source,
            default_detectors(&config.thresholds),
            Arc::new(AlertStateManager::new(&config.state)),
            interpreter,
            notifier,
            config.monitor.clone(),
        ))
    }

    pub fn state(&self) -> &AlertStateManager {
        &self.state
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Symbols for this cycle: top-N by liquidity when dynamic discovery is
    /// on and succeeds, the static list otherwise
    pub async fn resolve_symbols(&self) -> Vec<String> {
        if !self.config.dynamic_symbols {
            return self.config.symbols.clone();
        }

        match self.source.top_symbols(self.config.top_n_symbols).await {
            Ok(symbols) if !symbols.is_empty() => symbols,
            Ok(_) => {
                warn!("[Monitor] Dynamic symbol list is empty, using static list");
                self.config.symbols.clone()
            }
            Err(e) => {
                warn!("[Monitor] Dynamic symbol discovery failed ({}), using static list", e);
                self.config.symbols.clone()
            }
        }
    }

    /// Run a cycle every `cycle_interval_secs` until `shutdown` resolves and
    /// return how many cycles completed. The first cycle starts immediately.
    /// Shutdown is honored mid-cycle: the running cycle is aborted.
    pub async fn run_until<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.config.cycle_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut completed = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => {
                    info!("[Monitor] Shutdown requested, stopping");
                    break;
                }
            }

            // A panic inside the cycle surfaces as a join error and the loop continues
            let this = self.clone();
            let mut cycle = tokio::spawn(async move { this.run_cycle().await });

            tokio::select! {
                joined = &mut cycle => match joined {
                    Ok(_) => completed += 1,
                    Err(e) => error!("[Monitor] Evaluation cycle failed: {}", e),
                },
                _ = &mut shutdown => {
                    info!("[Monitor] Shutdown requested mid-cycle, aborting it");
                    cycle.abort();
                    break;
                }
            }
        }

        completed
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let symbols = self.resolve_symbols().await;
        self.run_cycle_for(&symbols).await
    }

    /// Run one cycle over `symbols`. Never fails: per-symbol errors are
    /// counted as skips.
    pub async fn run_cycle_for(&self, symbols: &[String]) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", cycle_id = %cycle_id);

        async move {
            info!("[Monitor] Cycle started for {} symbols: {}", symbols.len(), symbols.join(", "));

            let mut report = CycleReport {
                cycle_id,
                ..Default::default()
            };
            let mut dispatches = Vec::new();

            let slots = Arc::new(Semaphore::new(self.config.concurrency_limit.max(1)));
            let mut pipelines = JoinSet::new();

            for symbol in symbols {
                let this = self.clone();
                let slots = slots.clone();
                let symbol = symbol.clone();
                let span = info_span!("symbol", symbol = %symbol);

                pipelines.spawn(
                    async move {
                        let Ok(_permit) = slots.acquire_owned().await else {
                            return SymbolOutcome {
                                skipped: true,
                                ..Default::default()
                            };
                        };
                        this.evaluate_symbol(&symbol).await
                    }
                    .instrument(span),
                );
            }

            let fan_out = async {
                while let Some(joined) = pipelines.join_next().await {
                    report.symbols_checked += 1;
                    match joined {
                        Ok(outcome) => {
                            if outcome.skipped {
                                report.symbols_skipped += 1;
                            }
                            report.findings += outcome.findings;
                            report.alerts_suppressed += outcome.suppressed;
                            report.alerts_dispatched += outcome.dispatches.len();
                            dispatches.extend(outcome.dispatches);
                        }
                        Err(e) => {
                            error!("[Monitor] Symbol pipeline panicked: {}", e);
                            report.symbols_skipped += 1;
                        }
                    }
                }
            };

            if tokio::time::timeout(self.config.cycle_timeout(), fan_out).await.is_err() {
                let unfinished = pipelines.len();
                warn!("[Monitor] Cycle timed out, aborting {} unfinished pipelines", unfinished);
                pipelines.abort_all();
                report.symbols_checked += unfinished;
                report.symbols_skipped += unfinished;
                report.timed_out = true;
            }

            for handle in dispatches {
                match handle.await {
                    Ok(delivery) => report.deliveries_failed += delivery.failed,
                    Err(e) => {
                        error!("[Monitor] Alert dispatch task failed: {}", e);
                        report.deliveries_failed += 1;
                    }
                }
            }

            let pruned = self.state.prune(Utc::now());
            if pruned > 0 {
                debug!("[Monitor] Pruned {} stale alert records", pruned);
            }

            info!("[Monitor] Cycle finished: {}", report);
            report
        }
        .instrument(span)
        .await
    }

    async fn evaluate_symbol(&self, symbol: &str) -> SymbolOutcome {
        debug!("[Monitor] Checking {}", symbol);

        let fetch = self
            .source
            .fetch(symbol, &self.config.interval, self.config.fetch_limit);
        let table = match tokio::time::timeout(self.config.fetch_timeout(), fetch).await {
            Ok(Ok(table)) => table,
            Ok(Err(e)) => {
                if e.is_skippable() {
                    warn!("[Monitor] Skipping {}: {}", symbol, e);
                } else {
                    error!("[Monitor] Skipping {} after unexpected error: {}", symbol, e);
                }
                return SymbolOutcome {
                    skipped: true,
                    ..Default::default()
                };
            }
            Err(_) => {
                warn!("[Monitor] Skipping {}: fetch timed out", symbol);
                return SymbolOutcome {
                    skipped: true,
                    ..Default::default()
                };
            }
        };

        let mut outcome = SymbolOutcome::default();

        for detector in self.detectors.iter() {
            let Some(finding) = detector.check(&table) else {
                continue;
            };
            outcome.findings += 1;
            info!(
                "[Monitor] {} {} {}: {:?}",
                symbol,
                finding.indicator(),
                finding.signal_type(),
                finding.primary_signal.fields
            );

            let decision = self.state.decide(symbol, &finding);
            if !decision.allow {
                outcome.suppressed += 1;
                continue;
            }

            outcome
                .dispatches
                .push(self.dispatch(symbol.to_string(), finding, decision.previous));
        }

        outcome
    }

    /// Interpret and notify on a separate task, bounded by `dispatch_concurrency`
    fn dispatch(&self, symbol: String, finding: Finding, previous: Option<Finding>) -> JoinHandle<DeliveryReport> {
        let interpreter = self.interpreter.clone();
        let notifier = self.notifier.clone();
        let slots = self.dispatch_slots.clone();
        let interval = self.config.interval.clone();

        tokio::spawn(
            async move {
                let Ok(_permit) = slots.acquire_owned().await else {
                    return DeliveryReport::default();
                };

                let text = interpret::interpret_or_template(
                    interpreter.as_ref(),
                    &symbol,
                    &interval,
                    &finding,
                    previous.as_ref(),
                )
                .await;

                let (title, body) = format_alert(&symbol, &finding, &text);
                let delivery = notifier.send(&title, &body).await;
                info!(
                    "[Monitor] Alert {} {}: delivered={} failed={}",
                    finding.indicator(),
                    finding.signal_type(),
                    delivery.delivered,
                    delivery.failed
                );
                delivery
            }
            .in_current_span(),
        )
    }
}
