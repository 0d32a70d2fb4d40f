//! Paper-trade fill simulation.
//!
//! Long-only entry/exit with slippage, whole-share sizing, commissions and
//! stop-loss/take-profit checks.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::account::Account;
use super::position::{ClosedTrade, ExitReason, Position};

/// Cost model applied to every fill.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    /// Percent of trade value, e.g. 0.1 for 0.1%.
    pub commission_pct: f64,
    /// Percent of price, e.g. 0.05 for 0.05%.
    pub slippage_pct: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
        }
    }
}

/// Sizing and exit levels for new positions.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionParams {
    /// Fraction of current cash committed per entry.
    pub position_size: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        ExecutionParams {
            position_size: 0.25,
            stop_loss_pct: 0.0,
            take_profit_pct: 0.0,
        }
    }
}

/// flat_fee + trade_value * pct / 100
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

/// Buying fills above the quoted price.
pub fn apply_slippage_buy(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + slippage_pct / 100.0)
}

/// Selling fills below the quoted price.
pub fn apply_slippage_sell(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - slippage_pct / 100.0)
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryResult {
    Entered {
        quantity: i64,
        execution_price: f64,
        cost: f64,
        commission: f64,
    },
    InsufficientCapital,
}

/// Opens a long position sized at `position_size` of current cash.
pub fn enter_long(
    account: &mut Account,
    symbol: &str,
    market_price: f64,
    date: NaiveDate,
    params: &ExecutionParams,
    config: &ExecutionConfig,
) -> EntryResult {
    let execution_price = apply_slippage_buy(market_price, config.slippage_pct);
    if execution_price <= 0.0 {
        return EntryResult::InsufficientCapital;
    }

    let available_capital = account.cash * params.position_size;
    let quantity = (available_capital / execution_price).floor() as i64;

    if quantity <= 0 {
        return EntryResult::InsufficientCapital;
    }

    let cost = quantity as f64 * execution_price;
    let commission = calculate_commission(cost, config);
    let total_cost = cost + commission;

    if total_cost > account.cash {
        return EntryResult::InsufficientCapital;
    }

    account.cash -= total_cost;

    let stop_loss = if params.stop_loss_pct > 0.0 {
        execution_price * (1.0 - params.stop_loss_pct / 100.0)
    } else {
        0.0
    };

    let take_profit = if params.take_profit_pct > 0.0 {
        execution_price * (1.0 + params.take_profit_pct / 100.0)
    } else {
        0.0
    };

    account.add_position(Position {
        symbol: symbol.to_string(),
        quantity,
        entry_price: execution_price,
        entry_date: date,
        entry_commission: commission,
        stop_loss,
        take_profit,
    });

    EntryResult::Entered {
        quantity,
        execution_price,
        cost,
        commission,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitResult {
    pub quantity: i64,
    pub exit_price: f64,
    pub exit_value: f64,
    pub exit_commission: f64,
    pub pnl: f64,
}

/// Sells the whole position in `symbol` and records the closed trade.
///
/// PnL includes the entry and exit commissions.
pub fn exit_position(
    account: &mut Account,
    symbol: &str,
    market_price: f64,
    exit_date: NaiveDate,
    reason: ExitReason,
    config: &ExecutionConfig,
) -> Option<ExitResult> {
    let position = account.remove_position(symbol)?;

    let exit_price = apply_slippage_sell(market_price, config.slippage_pct);
    let exit_value = position.quantity as f64 * exit_price;
    let exit_commission = calculate_commission(exit_value, config);

    let price_pnl = position.quantity as f64 * (exit_price - position.entry_price);
    let pnl = price_pnl - position.entry_commission - exit_commission;

    account.cash += exit_value - exit_commission;

    account.record_trade(ClosedTrade {
        symbol: position.symbol.clone(),
        quantity: position.quantity,
        entry_price: position.entry_price,
        exit_price,
        entry_date: position.entry_date,
        exit_date,
        pnl,
        reason,
    });

    Some(ExitResult {
        quantity: position.quantity,
        exit_price,
        exit_value,
        exit_commission,
        pnl,
    })
}

/// Exits every position whose stop-loss or take-profit is hit at `price_map`.
///
/// Triggered symbols are collected first, then exited, so the position map is
/// never mutated while iterating. Returns the number of positions closed.
pub fn check_triggers(
    account: &mut Account,
    price_map: &HashMap<String, f64>,
    date: NaiveDate,
    config: &ExecutionConfig,
) -> usize {
    let mut triggered: Vec<(String, f64, ExitReason)> = account
        .positions
        .values()
        .filter_map(|pos| {
            let price = *price_map.get(&pos.symbol)?;
            if pos.should_stop_loss(price) {
                Some((pos.symbol.clone(), price, ExitReason::StopLoss))
            } else if pos.should_take_profit(price) {
                Some((pos.symbol.clone(), price, ExitReason::TakeProfit))
            } else {
                None
            }
        })
        .collect();
    triggered.sort_by(|a, b| a.0.cmp(&b.0));

    let count = triggered.len();
    for (symbol, price, reason) in triggered {
        exit_position(account, &symbol, price, date, reason, config);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> ExecutionConfig {
        ExecutionConfig {
            commission_per_trade: 10.0,
            commission_pct: 0.1,
            slippage_pct: 0.05,
        }
    }

    fn make_params() -> ExecutionParams {
        ExecutionParams {
            position_size: 0.25,
            stop_loss_pct: 5.0,
            take_profit_pct: 10.0,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn commission_flat_plus_pct() {
        let config = ExecutionConfig {
            commission_per_trade: 10.0,
            commission_pct: 0.1,
            ..Default::default()
        };
        assert!((calculate_commission(10_000.0, &config) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn slippage_directions() {
        assert!((apply_slippage_buy(100.0, 1.0) - 101.0).abs() < 1e-9);
        assert!((apply_slippage_sell(100.0, 1.0) - 99.0).abs() < 1e-9);
    }

    #[test]
    fn enter_long_sizes_whole_shares() {
        let mut account = Account::new(100_000.0);
        let config = ExecutionConfig::default();
        let result = enter_long(
            &mut account,
            "AAPL",
            300.0,
            date(),
            &make_params(),
            &config,
        );
        // 25_000 / 300 = 83.33 → 83 shares
        match result {
            EntryResult::Entered { quantity, cost, .. } => {
                assert_eq!(quantity, 83);
                assert!((cost - 24_900.0).abs() < 1e-9);
            }
            EntryResult::InsufficientCapital => panic!("expected entry"),
        }
        assert!((account.cash - 75_100.0).abs() < 1e-9);
        let pos = account.get_position("AAPL").unwrap();
        assert!((pos.stop_loss - 285.0).abs() < 1e-9);
        assert!((pos.take_profit - 330.0).abs() < 1e-9);
    }

    #[test]
    fn enter_long_insufficient_capital() {
        let mut account = Account::new(100.0);
        let result = enter_long(
            &mut account,
            "AAPL",
            500.0,
            date(),
            &make_params(),
            &ExecutionConfig::default(),
        );
        assert_eq!(result, EntryResult::InsufficientCapital);
        assert!(account.positions.is_empty());
        assert!((account.cash - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn round_trip_pnl_includes_both_commissions() {
        let mut account = Account::new(100_000.0);
        let config = make_config();
        let entry = enter_long(
            &mut account,
            "AAPL",
            100.0,
            date(),
            &make_params(),
            &config,
        );
        let EntryResult::Entered {
            quantity,
            execution_price,
            commission,
            ..
        } = entry
        else {
            panic!("expected entry");
        };

        let exit = exit_position(
            &mut account,
            "AAPL",
            110.0,
            date() + chrono::Duration::days(5),
            ExitReason::Signal,
            &config,
        )
        .unwrap();

        let expected_exit_price = 110.0 * (1.0 - 0.05 / 100.0);
        let expected_pnl = quantity as f64 * (expected_exit_price - execution_price)
            - commission
            - exit.exit_commission;
        assert!((exit.pnl - expected_pnl).abs() < 1e-9);
        assert_eq!(account.closed_trades.len(), 1);
        assert_eq!(account.closed_trades[0].reason, ExitReason::Signal);

        // Cash reconciles with initial capital plus realized PnL.
        assert!((account.cash - (100_000.0 + exit.pnl)).abs() < 1e-6);
    }

    #[test]
    fn exit_missing_position_is_none() {
        let mut account = Account::new(1_000.0);
        assert!(
            exit_position(
                &mut account,
                "AAPL",
                10.0,
                date(),
                ExitReason::Signal,
                &ExecutionConfig::default()
            )
            .is_none()
        );
    }

    #[test]
    fn triggers_fire_with_reason() {
        let mut account = Account::new(100_000.0);
        let config = ExecutionConfig::default();
        enter_long(&mut account, "AAPL", 100.0, date(), &make_params(), &config);
        enter_long(&mut account, "MSFT", 100.0, date(), &make_params(), &config);
        enter_long(&mut account, "NVDA", 100.0, date(), &make_params(), &config);

        let price_map: HashMap<String, f64> = [
            ("AAPL".to_string(), 94.0),
            ("MSFT".to_string(), 111.0),
            ("NVDA".to_string(), 101.0),
        ]
        .into_iter()
        .collect();

        let closed = check_triggers(&mut account, &price_map, date(), &config);
        assert_eq!(closed, 2);
        assert!(account.has_position("NVDA"));
        let reasons: Vec<ExitReason> = account.closed_trades.iter().map(|t| t.reason).collect();
        assert_eq!(reasons, vec![ExitReason::StopLoss, ExitReason::TakeProfit]);
    }
}
