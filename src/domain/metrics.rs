//! Per-trade statistics and their rollups.

use super::position::Trade;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeStats {
    pub pnl: f64,
    pub win: bool,
    pub return_on_risk: f64,
    pub mae: f64,
    pub mfe: f64,
    pub fees: f64,
    pub slippage_cost: f64,
}

impl TradeStats {
    pub fn from_trade(trade: &Trade) -> Self {
        let pnl = trade.pnl();
        let risk = trade.position.risk_capital;
        let return_on_risk = if risk > 0.0 { pnl / risk } else { 0.0 };

        TradeStats {
            pnl,
            win: pnl > 0.0,
            return_on_risk,
            mae: trade.position.mae.min(0.0),
            mfe: trade.position.mfe.max(0.0),
            fees: trade.fees(),
            slippage_cost: trade.slippage_cost(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rollup {
    pub trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl: f64,
    pub avg_return_on_risk: f64,
    pub profit_factor: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub total_fees: f64,
    pub total_slippage: f64,
    pub worst_mae: f64,
    pub best_mfe: f64,
}

impl Rollup {
    pub fn from_stats(stats: &[TradeStats]) -> Self {
        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_ror = 0.0_f64;
        let mut total_fees = 0.0_f64;
        let mut total_slippage = 0.0_f64;
        let mut worst_mae = 0.0_f64;
        let mut best_mfe = 0.0_f64;

        for s in stats {
            if s.pnl > 0.0 {
                trades_won += 1;
                total_wins += s.pnl;
                largest_win = largest_win.max(s.pnl);
            } else if s.pnl < 0.0 {
                trades_lost += 1;
                total_losses += s.pnl.abs();
                largest_loss = largest_loss.max(s.pnl.abs());
            } else {
                trades_breakeven += 1;
            }
            total_ror += s.return_on_risk;
            total_fees += s.fees;
            total_slippage += s.slippage_cost;
            worst_mae = worst_mae.min(s.mae);
            best_mfe = best_mfe.max(s.mfe);
        }

        let trades = stats.len();
        let total_pnl = total_wins - total_losses;
        let (win_rate, avg_pnl, avg_return_on_risk) = if trades > 0 {
            let n = trades as f64;
            (trades_won as f64 / n, total_pnl / n, total_ror / n)
        } else {
            (0.0, 0.0, 0.0)
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        Rollup {
            trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            total_pnl,
            avg_pnl,
            avg_return_on_risk,
            profit_factor,
            largest_win,
            largest_loss,
            total_fees,
            total_slippage,
            worst_mae,
            best_mfe,
        }
    }

    pub fn meets_min_trades(&self, min_trades: usize) -> bool {
        self.trades >= min_trades
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exits::ExitReason;
    use crate::domain::position::tests::{equity_position, ts};
    use crate::domain::position::ExitFill;
    use approx::assert_relative_eq;

    fn stats(pnl: f64) -> TradeStats {
        TradeStats {
            pnl,
            win: pnl > 0.0,
            return_on_risk: pnl / 1000.0,
            mae: -pnl.abs(),
            mfe: pnl.abs(),
            fees: 1.0,
            slippage_cost: 0.5,
        }
    }

    #[test]
    fn trade_stats_from_trade() {
        let mut pos = equity_position("AAPL", 10, 100.0);
        pos.mae = -20.0;
        pos.mfe = 130.0;
        let trade = Trade::from_exit(
            1,
            pos,
            ExitFill {
                time: ts(2, 10),
                index: 3,
                value: 1_100.0,
                price: 110.0,
                fees: 1.0,
                slippage: 0.5,
                reason: ExitReason::TakeProfit,
            },
        );
        let s = TradeStats::from_trade(&trade);
        assert_relative_eq!(s.pnl, 98.0);
        assert!(s.win);
        assert_relative_eq!(s.return_on_risk, 0.098);
        assert_relative_eq!(s.mae, -20.0);
        assert_relative_eq!(s.mfe, 130.0);
        assert_relative_eq!(s.fees, 2.0);
        assert_relative_eq!(s.slippage_cost, 1.0);
    }

    #[test]
    fn zero_risk_capital_gives_zero_return() {
        let mut pos = equity_position("AAPL", 10, 100.0);
        pos.risk_capital = 0.0;
        let trade = Trade::from_exit(
            1,
            pos,
            ExitFill {
                time: ts(2, 10),
                index: 1,
                value: 900.0,
                price: 90.0,
                fees: 0.0,
                slippage: 0.0,
                reason: ExitReason::StopLoss,
            },
        );
        let s = TradeStats::from_trade(&trade);
        assert!(!s.win);
        assert_relative_eq!(s.return_on_risk, 0.0);
    }

    #[test]
    fn rollup_counts() {
        let r = Rollup::from_stats(&[stats(100.0), stats(-50.0), stats(0.0), stats(200.0)]);
        assert_eq!(r.trades, 4);
        assert_eq!(r.trades_won, 2);
        assert_eq!(r.trades_lost, 1);
        assert_eq!(r.trades_breakeven, 1);
        assert_relative_eq!(r.win_rate, 0.5);
        assert_relative_eq!(r.total_pnl, 250.0);
        assert_relative_eq!(r.avg_pnl, 62.5);
        assert_relative_eq!(r.profit_factor, 6.0);
        assert_relative_eq!(r.largest_win, 200.0);
        assert_relative_eq!(r.largest_loss, 50.0);
        assert_relative_eq!(r.total_fees, 4.0);
        assert_relative_eq!(r.total_slippage, 2.0);
        assert_relative_eq!(r.worst_mae, -200.0);
        assert_relative_eq!(r.best_mfe, 200.0);
    }

    #[test]
    fn rollup_empty() {
        let r = Rollup::from_stats(&[]);
        assert_eq!(r.trades, 0);
        assert_relative_eq!(r.win_rate, 0.0);
        assert_relative_eq!(r.profit_factor, 0.0);
        assert!(!r.meets_min_trades(1));
        assert!(r.meets_min_trades(0));
    }

    #[test]
    fn profit_factor_infinite_without_losses() {
        let r = Rollup::from_stats(&[stats(10.0)]);
        assert!(r.profit_factor.is_infinite());
        assert!(r.meets_min_trades(1));
    }
}
