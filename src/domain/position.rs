//! Open paper-trading positions and closed trades.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Long-only position held by the backtest account.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub entry_commission: f64,
    /// 0.0 disables the stop.
    pub stop_loss: f64,
    /// 0.0 disables the target.
    pub take_profit: f64,
}

impl Position {
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity as f64 * (price - self.entry_price)
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        self.stop_loss > 0.0 && price <= self.stop_loss
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        self.take_profit > 0.0 && price >= self.take_profit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
    EndOfTest,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Signal => "signal",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::EndOfTest => "end_of_test",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub quantity: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    /// Net of both commissions.
    pub pnl: f64,
    pub reason: ExitReason,
}

impl ClosedTrade {
    pub fn return_pct(&self) -> f64 {
        let basis = self.quantity as f64 * self.entry_price;
        if basis == 0.0 { 0.0 } else { self.pnl / basis }
    }

    pub fn holding_days(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }
}
