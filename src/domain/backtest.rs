//! Bar-by-bar simulation of one symbol under one parameterization.
//!
//! Each run starts from a fresh portfolio. On every bar open positions are
//! marked and checked for exits first, then a new entry is considered. Fills
//! happen at the bar's close; positions still open after the last bar are
//! closed there with `EndOfData`.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::bar::Bar;
use crate::domain::error::BtoptError;
use crate::domain::exits::{
    evaluate_options_exit, EquityExitRules, ExitDecision, ExitReason, ExitRules, OptionsMark,
};
use crate::domain::fill::{FillOutcome, FillSimulator, OrderSide, Quote, RejectReason};
use crate::domain::metrics::{Rollup, TradeStats};
use crate::domain::patterns::ContextKey;
use crate::domain::portfolio::{Portfolio, PortfolioError};
use crate::domain::position::{
    ExitFill, FilledLeg, Position, PositionId, PositionKind, Trade, CONTRACT_MULTIPLIER,
};
use crate::domain::series::IndicatorSeries;
use crate::domain::settings::ExecutionSettings;
use crate::domain::signal::{generate_signals, Signal};
use crate::domain::sizing::calc_qty;
use crate::domain::strategy::{LegSide, OptionType, TemplateSpec};
use crate::ports::option_chain_port::OptionChainPort;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamSet {
    Equity(EquityExitRules),
    Options(ExitRules),
}

impl ParamSet {
    pub fn take_profit_pct(&self) -> Option<f64> {
        match self {
            ParamSet::Equity(r) => Some(r.take_profit_pct),
            ParamSet::Options(_) => None,
        }
    }

    pub fn stop_loss_pct(&self) -> Option<f64> {
        match self {
            ParamSet::Equity(r) => Some(r.stop_loss_pct),
            ParamSet::Options(_) => None,
        }
    }

    pub fn max_bars(&self) -> Option<usize> {
        match self {
            ParamSet::Equity(r) => Some(r.max_bars),
            ParamSet::Options(_) => None,
        }
    }

    /// Short label for logs and summaries, e.g. `tp=0.01 sl=0.005 mb=20`.
    pub fn label(&self) -> String {
        match self {
            ParamSet::Equity(r) => format!(
                "tp={} sl={} mb={}",
                r.take_profit_pct, r.stop_loss_pct, r.max_bars
            ),
            ParamSet::Options(r) => format!(
                "pt={} ml={} ts={}",
                r.profit_target_pct, r.max_loss_mult_credit, r.time_stop_days_before_expiry
            ),
        }
    }
}

/// Entries that were considered but not taken.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipCounts {
    pub liquidity_rejected: usize,
    pub sizing_zero: usize,
    pub capacity_exceeded: usize,
    pub insufficient_cash: usize,
    pub chain_unavailable: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.liquidity_rejected
            + self.sizing_zero
            + self.capacity_exceeded
            + self.insufficient_cash
            + self.chain_unavailable
    }

    fn record_open_error(&mut self, err: &PortfolioError) {
        match err {
            PortfolioError::CapacityExceeded { .. } => self.capacity_exceeded += 1,
            PortfolioError::InsufficientCash { .. } => self.insufficient_cash += 1,
            PortfolioError::UnknownPosition(_) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamRun {
    pub params: ParamSet,
    pub trades: Vec<Trade>,
    pub stats: Vec<TradeStats>,
    pub rollup: Rollup,
    pub skips: SkipCounts,
    pub valid: bool,
}

impl ParamRun {
    pub fn new(params: ParamSet, trades: Vec<Trade>, skips: SkipCounts, min_trades: usize) -> Self {
        let stats: Vec<TradeStats> = trades.iter().map(TradeStats::from_trade).collect();
        let rollup = Rollup::from_stats(&stats);
        let valid = rollup.meets_min_trades(min_trades);
        ParamRun {
            params,
            trades,
            stats,
            rollup,
            skips,
            valid,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolResult {
    pub symbol: String,
    pub strategy: String,
    pub bars: usize,
    pub runs: Vec<ParamRun>,
}

impl SymbolResult {
    pub fn trade_count(&self) -> usize {
        self.runs.iter().map(|r| r.trades.len()).sum()
    }

    pub fn valid_runs(&self) -> usize {
        self.runs.iter().filter(|r| r.valid).count()
    }
}

pub struct Simulator<'a> {
    pub execution: &'a ExecutionSettings,
    pub fill: FillSimulator,
    pub timeframe: &'a str,
}

impl<'a> Simulator<'a> {
    pub fn new(execution: &'a ExecutionSettings, timeframe: &'a str) -> Self {
        Simulator {
            execution,
            fill: FillSimulator::new(execution.gates, execution.slip_frac_of_half),
            timeframe,
        }
    }

    fn equity_quote(&self, bar: &Bar) -> Quote {
        Quote::from_bar(bar, self.execution.equity_spread_pct)
    }

    /// Long-only equity run: Buy opens, Sell closes held longs.
    pub fn simulate_equity(
        &self,
        series: &IndicatorSeries,
        rules: &EquityExitRules,
    ) -> (Vec<Trade>, SkipCounts) {
        let signals = generate_signals(series);
        let mut portfolio =
            Portfolio::new(self.execution.paper_equity, self.execution.max_positions);
        let mut trades = Vec::new();
        let mut skips = SkipCounts::default();

        for (i, bar) in series.bars.iter().enumerate() {
            let ids: Vec<PositionId> = portfolio.holdings().iter().map(|h| h.id).collect();
            for id in ids {
                let Some(pos) = portfolio.get_position(id) else {
                    continue;
                };
                let (qty, entry_price, entry_index) =
                    (pos.quantity as f64, pos.entry_price, pos.entry_index);

                let low = qty * (bar.low - entry_price);
                let high = qty * (bar.high - entry_price);
                if portfolio.mark(id, low.min(high), low.max(high)).is_err() {
                    continue;
                }

                let decision = match rules.evaluate(entry_price, bar.close, i - entry_index) {
                    ExitDecision::Hold if signals[i] == Signal::Sell => {
                        ExitDecision::Close(ExitReason::OppositeSignal)
                    }
                    d => d,
                };
                if let ExitDecision::Close(reason) = decision {
                    let exit = self.equity_exit(bar, i, qty, reason);
                    if let Ok(trade) = portfolio.close_position(id, exit) {
                        trades.push(trade);
                    }
                }
            }

            if signals[i] == Signal::Buy {
                let marks = equity_marks(&portfolio, bar.close);
                let equity = portfolio.equity(&marks);
                match self.equity_entry(series, i, equity) {
                    Ok(position) => {
                        if let Err(e) = portfolio.open_position(position) {
                            debug!(symbol = %series.symbol, index = i, error = %e, "entry skipped");
                            skips.record_open_error(&e);
                        }
                    }
                    Err(EntrySkip::Liquidity(reason)) => {
                        debug!(symbol = %series.symbol, index = i, %reason, "entry rejected");
                        skips.liquidity_rejected += 1;
                    }
                    Err(EntrySkip::SizingZero) => skips.sizing_zero += 1,
                    Err(EntrySkip::ChainUnavailable) => skips.chain_unavailable += 1,
                }
            }
        }

        if let Some((last_index, last_bar)) = series.bars.iter().enumerate().last() {
            let ids: Vec<PositionId> = portfolio.holdings().iter().map(|h| h.id).collect();
            for id in ids {
                let Some(qty) = portfolio.get_position(id).map(|p| p.quantity as f64) else {
                    continue;
                };
                let exit = self.equity_exit(last_bar, last_index, qty, ExitReason::EndOfData);
                if let Ok(trade) = portfolio.close_position(id, exit) {
                    trades.push(trade);
                }
            }
        }

        (trades, skips)
    }

    fn equity_entry(
        &self,
        series: &IndicatorSeries,
        index: usize,
        equity: f64,
    ) -> Result<Position, EntrySkip> {
        let bar = &series.bars[index];
        let (price, slippage) = match self.fill.fill(&self.equity_quote(bar), OrderSide::Buy) {
            FillOutcome::Filled { price, slippage } => (price, slippage),
            FillOutcome::Rejected(reason) => return Err(EntrySkip::Liquidity(reason)),
        };

        let quantity = calc_qty(price, equity, self.execution.risk_pct);
        if quantity == 0 {
            return Err(EntrySkip::SizingZero);
        }
        let qty = quantity as f64;
        let entry_value = qty * price;

        Ok(Position {
            symbol: series.symbol.clone(),
            kind: PositionKind::Equity,
            quantity,
            entry_time: bar.timestamp,
            entry_index: index,
            entry_value,
            entry_price: price,
            reserve: 0.0,
            risk_capital: entry_value,
            entry_fees: self.execution.fee_per_share * qty,
            entry_slippage: slippage * qty,
            context: ContextKey::at(series, index, self.timeframe).to_string(),
            mae: 0.0,
            mfe: 0.0,
        })
    }

    fn equity_exit(&self, bar: &Bar, index: usize, qty: f64, reason: ExitReason) -> ExitFill {
        let quote = self.equity_quote(bar);
        let (price, slippage) = match self.fill.exit_fill(&quote, OrderSide::Sell) {
            FillOutcome::Filled { price, slippage } => (price, slippage),
            FillOutcome::Rejected(_) => (bar.close, 0.0),
        };
        ExitFill {
            time: bar.timestamp,
            index,
            value: qty * price,
            price,
            fees: self.execution.fee_per_share * qty,
            slippage: slippage * qty,
            reason,
        }
    }

    /// Options run for one template. Chain failures on entry are counted as
    /// skips. A bar where some leg has no quote still runs the time stop,
    /// valuing the structure at its last known quotes (intrinsic value once
    /// the nearest leg has expired).
    pub fn simulate_options(
        &self,
        series: &IndicatorSeries,
        spec: &TemplateSpec,
        rules: &ExitRules,
        chain: &dyn OptionChainPort,
    ) -> (Vec<Trade>, SkipCounts) {
        let signals = generate_signals(series);
        let mut portfolio =
            Portfolio::new(self.execution.paper_equity, self.execution.max_positions);
        let mut last_quotes: HashMap<PositionId, Vec<Quote>> = HashMap::new();
        let mut trades = Vec::new();
        let mut skips = SkipCounts::default();

        for (i, bar) in series.bars.iter().enumerate() {
            let mut marks: HashMap<PositionId, f64> = HashMap::new();
            let ids: Vec<PositionId> = portfolio.holdings().iter().map(|h| h.id).collect();

            for id in ids {
                let Some(pos) = portfolio.get_position(id).cloned() else {
                    continue;
                };
                let days_remaining = pos
                    .expiry()
                    .map(|e| (e - bar.date()).num_days())
                    .unwrap_or(0);

                let fresh = self.mark_legs(&pos, bar, chain);
                let decision = match &fresh {
                    Some(quotes) => {
                        let value = structure_value(&pos, quotes, |q, _| q.mid);
                        let unrealized = pos.unrealized(value);
                        if portfolio.mark(id, unrealized, unrealized).is_err() {
                            continue;
                        }
                        let mark = OptionsMark {
                            premium: pos.entry_value,
                            is_credit: pos.is_credit(),
                            unrealized,
                            days_remaining,
                        };
                        evaluate_options_exit(&mark, rules)
                    }
                    None if days_remaining <= rules.time_stop_days_before_expiry => {
                        ExitDecision::Close(ExitReason::TimeStop)
                    }
                    None => ExitDecision::Hold,
                };

                let quotes = match fresh {
                    Some(quotes) => {
                        last_quotes.insert(id, quotes.clone());
                        quotes
                    }
                    None => last_known_quotes(&pos, last_quotes.get(&id), bar),
                };
                match decision {
                    ExitDecision::Close(reason) => {
                        let exit = self.options_exit(&pos, &quotes, bar, i, reason);
                        if let Ok(trade) = portfolio.close_position(id, exit) {
                            last_quotes.remove(&id);
                            trades.push(trade);
                        }
                    }
                    ExitDecision::Hold => {
                        marks.insert(id, structure_value(&pos, &quotes, |q, _| q.mid));
                    }
                }
            }

            if spec.enters_on(signals[i]) {
                let equity = portfolio.equity(&marks);
                match self.options_entry(series, i, spec, chain, equity) {
                    Ok((position, quotes)) => match portfolio.open_position(position) {
                        Ok(id) => {
                            last_quotes.insert(id, quotes);
                        }
                        Err(e) => {
                            debug!(symbol = %series.symbol, index = i, error = %e, "entry skipped");
                            skips.record_open_error(&e);
                        }
                    },
                    Err(EntrySkip::Liquidity(reason)) => {
                        debug!(symbol = %series.symbol, index = i, %reason, "entry rejected");
                        skips.liquidity_rejected += 1;
                    }
                    Err(EntrySkip::SizingZero) => skips.sizing_zero += 1,
                    Err(EntrySkip::ChainUnavailable) => skips.chain_unavailable += 1,
                }
            }
        }

        if let Some((last_index, last_bar)) = series.bars.iter().enumerate().last() {
            let ids: Vec<PositionId> = portfolio.holdings().iter().map(|h| h.id).collect();
            for id in ids {
                let Some(pos) = portfolio.get_position(id).cloned() else {
                    continue;
                };
                let quotes = self
                    .mark_legs(&pos, last_bar, chain)
                    .unwrap_or_else(|| last_known_quotes(&pos, last_quotes.get(&id), last_bar));
                let exit =
                    self.options_exit(&pos, &quotes, last_bar, last_index, ExitReason::EndOfData);
                if let Ok(trade) = portfolio.close_position(id, exit) {
                    trades.push(trade);
                }
            }
        }

        (trades, skips)
    }

    fn options_entry(
        &self,
        series: &IndicatorSeries,
        index: usize,
        spec: &TemplateSpec,
        chain: &dyn OptionChainPort,
        equity: f64,
    ) -> Result<(Position, Vec<Quote>), EntrySkip> {
        let bar = &series.bars[index];
        let template = spec.build();
        let mut legs = Vec::with_capacity(template.legs.len());
        let mut quotes = Vec::with_capacity(template.legs.len());
        let mut slippage_per_share = 0.0;

        for leg in &template.legs {
            let (contract, quote) =
                match chain.select_contract(&series.symbol, leg, bar.close, bar.timestamp) {
                    Ok(found) => found,
                    Err(e) => {
                        warn!(symbol = %series.symbol, index, error = %e, "no contract for leg");
                        return Err(EntrySkip::ChainUnavailable);
                    }
                };
            let side = match leg.side {
                LegSide::Long => OrderSide::Buy,
                LegSide::Short => OrderSide::Sell,
            };
            match self.fill.fill(&quote, side) {
                FillOutcome::Filled { price, slippage } => {
                    slippage_per_share += slippage * leg.quantity as f64;
                    quotes.push(quote);
                    legs.push(FilledLeg {
                        leg: leg.clone(),
                        contract,
                        fill_price: price,
                    });
                }
                FillOutcome::Rejected(reason) => return Err(EntrySkip::Liquidity(reason)),
            }
        }

        let net = legs.iter().map(|l| l.signed_value(l.fill_price)).sum::<f64>();
        let width = spread_width(&legs);
        let risk_per_share = if net > 0.0 { net } else { width + net };
        if !(risk_per_share > 0.0) {
            return Err(EntrySkip::SizingZero);
        }

        let quantity = calc_qty(
            risk_per_share * CONTRACT_MULTIPLIER,
            equity,
            self.execution.risk_pct,
        );
        if quantity == 0 {
            return Err(EntrySkip::SizingZero);
        }
        let units = quantity as f64 * CONTRACT_MULTIPLIER;
        let contracts: u32 = legs.iter().map(|l| l.leg.quantity).sum();

        let position = Position {
            symbol: series.symbol.clone(),
            kind: PositionKind::Options {
                template: template.kind,
                legs,
            },
            quantity,
            entry_time: bar.timestamp,
            entry_index: index,
            entry_value: net * units,
            entry_price: net,
            reserve: if net < 0.0 { width * units } else { 0.0 },
            risk_capital: risk_per_share * units,
            entry_fees: self.execution.fee_per_contract * contracts as f64 * quantity as f64,
            entry_slippage: slippage_per_share * units,
            context: ContextKey::at(series, index, self.timeframe).to_string(),
            mae: 0.0,
            mfe: 0.0,
        };
        Ok((position, quotes))
    }

    /// Current quote for every leg, or `None` if any leg has no mark.
    fn mark_legs(
        &self,
        pos: &Position,
        bar: &Bar,
        chain: &dyn OptionChainPort,
    ) -> Option<Vec<Quote>> {
        let PositionKind::Options { legs, .. } = &pos.kind else {
            return None;
        };
        legs.iter()
            .map(|l| match chain.mark(&l.contract, bar.timestamp) {
                Ok(quote) => quote,
                Err(e) => {
                    debug!(contract = %l.contract.contract_symbol, error = %e, "mark failed");
                    None
                }
            })
            .collect()
    }

    fn options_exit(
        &self,
        pos: &Position,
        quotes: &[Quote],
        bar: &Bar,
        index: usize,
        reason: ExitReason,
    ) -> ExitFill {
        let units = pos.quantity as f64 * CONTRACT_MULTIPLIER;
        let mut slippage_per_share = 0.0;
        let price_per_share = structure_value(pos, quotes, |quote, leg| {
            let side = match leg.leg.side {
                LegSide::Long => OrderSide::Sell,
                LegSide::Short => OrderSide::Buy,
            };
            match self.fill.exit_fill(quote, side) {
                FillOutcome::Filled { price, slippage } => {
                    slippage_per_share += slippage * leg.leg.quantity as f64;
                    price
                }
                FillOutcome::Rejected(_) => quote.mid.max(0.0),
            }
        }) / units;
        let contracts: u32 = match &pos.kind {
            PositionKind::Options { legs, .. } => legs.iter().map(|l| l.leg.quantity).sum(),
            PositionKind::Equity => 0,
        };

        ExitFill {
            time: bar.timestamp,
            index,
            value: price_per_share * units,
            price: price_per_share,
            fees: self.execution.fee_per_contract * contracts as f64 * pos.quantity as f64,
            slippage: slippage_per_share * units,
            reason,
        }
    }
}

enum EntrySkip {
    Liquidity(RejectReason),
    SizingZero,
    ChainUnavailable,
}

fn equity_marks(portfolio: &Portfolio, close: f64) -> HashMap<PositionId, f64> {
    portfolio
        .holdings()
        .iter()
        .map(|h| (h.id, h.position.quantity as f64 * close))
        .collect()
}

/// Quotes to value `pos` with when the chain has none for `bar`: intrinsic
/// value against the underlying close once the nearest leg has expired,
/// otherwise the last quotes seen for the position.
fn last_known_quotes(pos: &Position, cached: Option<&Vec<Quote>>, bar: &Bar) -> Vec<Quote> {
    let PositionKind::Options { legs, .. } = &pos.kind else {
        return Vec::new();
    };
    let expired = pos.expiry().is_some_and(|e| bar.date() >= e);
    match cached {
        Some(quotes) if !expired && quotes.len() == legs.len() => quotes.clone(),
        _ => legs
            .iter()
            .map(|l| Quote {
                mid: intrinsic_value(l, bar.close),
                spread: 0.0,
                open_interest: None,
                volume: 0,
            })
            .collect(),
    }
}

fn intrinsic_value(leg: &FilledLeg, underlying: f64) -> f64 {
    match leg.leg.option_type {
        OptionType::Call => (underlying - leg.contract.strike).max(0.0),
        OptionType::Put => (leg.contract.strike - underlying).max(0.0),
    }
}

/// Signed whole-position value with each leg priced by `price`.
fn structure_value<F>(pos: &Position, quotes: &[Quote], mut price: F) -> f64
where
    F: FnMut(&Quote, &FilledLeg) -> f64,
{
    let PositionKind::Options { legs, .. } = &pos.kind else {
        return pos.entry_value;
    };
    let per_share: f64 = legs
        .iter()
        .zip(quotes)
        .map(|(leg, quote)| leg.signed_value(price(quote, leg)))
        .sum();
    per_share * pos.quantity as f64 * CONTRACT_MULTIPLIER
}

/// Widest short/long strike distance among same-type legs; zero without wings.
fn spread_width(legs: &[FilledLeg]) -> f64 {
    [OptionType::Call, OptionType::Put]
        .iter()
        .map(|&kind| {
            let strikes = |side: LegSide| {
                legs.iter()
                    .filter(move |l| l.leg.option_type == kind && l.leg.side == side)
                    .map(|l| l.contract.strike)
            };
            strikes(LegSide::Short)
                .flat_map(|s| strikes(LegSide::Long).map(move |l| (s - l).abs()))
                .fold(0.0_f64, f64::max)
        })
        .fold(0.0_f64, f64::max)
}

/// Run every parameterization of one symbol.
pub fn run_symbol_sweep(
    simulator: &Simulator<'_>,
    series: &IndicatorSeries,
    grid: &[EquityExitRules],
    min_trades: usize,
) -> SymbolResult {
    let runs = grid
        .iter()
        .map(|rules| {
            let (trades, skips) = simulator.simulate_equity(series, rules);
            ParamRun::new(ParamSet::Equity(*rules), trades, skips, min_trades)
        })
        .collect();
    SymbolResult {
        symbol: series.symbol.clone(),
        strategy: "equity".to_string(),
        bars: series.len(),
        runs,
    }
}

/// Single options run of one symbol.
pub fn run_symbol_options(
    simulator: &Simulator<'_>,
    series: &IndicatorSeries,
    spec: &TemplateSpec,
    rules: &ExitRules,
    chain: &dyn OptionChainPort,
    min_trades: usize,
) -> Result<SymbolResult, BtoptError> {
    spec.validate()?;
    rules.validate()?;
    let (trades, skips) = simulator.simulate_options(series, spec, rules, chain);
    Ok(SymbolResult {
        symbol: series.symbol.clone(),
        strategy: spec.kind().to_string(),
        bars: series.len(),
        runs: vec![ParamRun::new(ParamSet::Options(*rules), trades, skips, min_trades)],
    })
}
