//! Trade-level statistics for backtest results.

use serde::Serialize;
use std::collections::BTreeMap;

use super::position::ClosedTrade;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    /// Gross wins over gross losses; infinite when nothing was lost.
    pub profit_factor: f64,
    pub avg_win: f64,
    /// Positive magnitude.
    pub avg_loss: f64,
    pub largest_win: f64,
    /// Positive magnitude.
    pub largest_loss: f64,
    pub avg_holding_days: f64,
    pub total_pnl: f64,
}

impl TradeStats {
    pub fn compute(trades: &[ClosedTrade]) -> Self {
        let mut stats = TradeStats {
            total_trades: trades.len(),
            ..Default::default()
        };

        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut total_days = 0i64;

        for trade in trades {
            let pnl = trade.pnl;
            stats.total_pnl += pnl;
            if pnl > 0.0 {
                stats.trades_won += 1;
                total_wins += pnl;
                stats.largest_win = stats.largest_win.max(pnl);
            } else if pnl < 0.0 {
                stats.trades_lost += 1;
                total_losses += pnl.abs();
                stats.largest_loss = stats.largest_loss.max(pnl.abs());
            } else {
                stats.trades_breakeven += 1;
            }
            total_days += trade.holding_days();
        }

        if stats.total_trades > 0 {
            stats.win_rate = stats.trades_won as f64 / stats.total_trades as f64;
            stats.avg_holding_days = total_days as f64 / stats.total_trades as f64;
        }

        stats.profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        if stats.trades_won > 0 {
            stats.avg_win = total_wins / stats.trades_won as f64;
        }
        if stats.trades_lost > 0 {
            stats.avg_loss = total_losses / stats.trades_lost as f64;
        }

        stats
    }
}

/// Closed-trade summary for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolResult {
    pub symbol: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

impl SymbolResult {
    /// One entry per symbol, in symbol order. Symbols without trades are
    /// listed with zero counts so every backtested symbol appears.
    pub fn compute_per_symbol(symbols: &[String], trades: &[ClosedTrade]) -> Vec<SymbolResult> {
        let mut grouped: BTreeMap<&str, Vec<&ClosedTrade>> = symbols
            .iter()
            .map(|s| (s.as_str(), Vec::new()))
            .collect();
        for trade in trades {
            grouped.entry(trade.symbol.as_str()).or_default().push(trade);
        }

        grouped
            .into_iter()
            .map(|(symbol, trades)| {
                let winning_trades = trades.iter().filter(|t| t.pnl > 0.0).count();
                let losing_trades = trades.iter().filter(|t| t.pnl < 0.0).count();
                let total_trades = trades.len();
                SymbolResult {
                    symbol: symbol.to_string(),
                    total_trades,
                    winning_trades,
                    losing_trades,
                    total_pnl: trades.iter().map(|t| t.pnl).sum(),
                    win_rate: if total_trades > 0 {
                        winning_trades as f64 / total_trades as f64
                    } else {
                        0.0
                    },
                    largest_win: trades.iter().map(|t| t.pnl).fold(0.0, f64::max),
                    largest_loss: trades.iter().map(|t| t.pnl).fold(0.0, f64::min),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::ExitReason;
    use chrono::NaiveDate;

    fn make_trade(symbol: &str, pnl: f64, days: i64) -> ClosedTrade {
        let entry_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ClosedTrade {
            symbol: symbol.to_string(),
            quantity: 100,
            entry_price: 100.0,
            exit_price: 100.0 + pnl / 100.0,
            entry_date,
            exit_date: entry_date + chrono::Duration::days(days),
            pnl,
            reason: ExitReason::Signal,
        }
    }

    #[test]
    fn empty_trades() {
        let stats = TradeStats::compute(&[]);
        assert_eq!(stats, TradeStats::default());
    }

    #[test]
    fn wins_losses_breakeven() {
        let stats = TradeStats::compute(&[
            make_trade("A", 100.0, 5),
            make_trade("B", -50.0, 3),
            make_trade("C", 200.0, 10),
            make_trade("D", 0.0, 2),
        ]);
        assert_eq!(stats.trades_won, 2);
        assert_eq!(stats.trades_lost, 1);
        assert_eq!(stats.trades_breakeven, 1);
        assert!((stats.win_rate - 0.5).abs() < f64::EPSILON);
        assert!((stats.profit_factor - 6.0).abs() < 1e-9);
        assert!((stats.avg_win - 150.0).abs() < 1e-9);
        assert!((stats.avg_loss - 50.0).abs() < 1e-9);
        assert!((stats.largest_win - 200.0).abs() < 1e-9);
        assert!((stats.largest_loss - 50.0).abs() < 1e-9);
        assert!((stats.avg_holding_days - 5.0).abs() < 1e-9);
        assert!((stats.total_pnl - 250.0).abs() < 1e-9);
    }

    #[test]
    fn profit_factor_without_losses() {
        let stats = TradeStats::compute(&[make_trade("A", 10.0, 1)]);
        assert!(stats.profit_factor.is_infinite());
    }

    #[test]
    fn per_symbol_includes_idle_symbols() {
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let results = SymbolResult::compute_per_symbol(
            &symbols,
            &[
                make_trade("AAPL", 100.0, 2),
                make_trade("AAPL", -30.0, 2),
            ],
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].symbol, "AAPL");
        assert_eq!(results[0].total_trades, 2);
        assert!((results[0].total_pnl - 70.0).abs() < 1e-9);
        assert!((results[0].largest_loss + 30.0).abs() < 1e-9);
        assert_eq!(results[1].total_trades, 0);
        assert_eq!(results[1].win_rate, 0.0);
    }
}
