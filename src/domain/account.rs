//! Paper-trading account: cash, open positions and trade history.

use std::collections::HashMap;

use super::position::{ClosedTrade, Position};

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: HashMap<String, Position>,
    pub closed_trades: Vec<ClosedTrade>,
}

impl Account {
    pub fn new(initial_capital: f64) -> Self {
        Account {
            cash: initial_capital,
            initial_capital,
            positions: HashMap::new(),
            closed_trades: Vec::new(),
        }
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.insert(position.symbol.clone(), position);
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn remove_position(&mut self, symbol: &str) -> Option<Position> {
        self.positions.remove(symbol)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn record_trade(&mut self, trade: ClosedTrade) {
        self.closed_trades.push(trade);
    }

    /// Market value of open positions. Symbols missing from `price_map` count as zero.
    pub fn positions_value(&self, price_map: &HashMap<String, f64>) -> f64 {
        self.positions
            .values()
            .filter_map(|pos| {
                price_map
                    .get(&pos.symbol)
                    .map(|&price| pos.market_value(price))
            })
            .sum()
    }

    pub fn total_equity(&self, price_map: &HashMap<String, f64>) -> f64 {
        self.cash + self.positions_value(price_map)
    }

    pub fn realized_pnl(&self) -> f64 {
        self.closed_trades.iter().map(|t| t.pnl).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::ExitReason;
    use chrono::NaiveDate;

    fn sample_position(symbol: &str, quantity: i64) -> Position {
        Position {
            symbol: symbol.to_string(),
            quantity,
            entry_price: 100.0,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            entry_commission: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
        }
    }

    #[test]
    fn new_account() {
        let account = Account::new(100_000.0);
        assert!((account.cash - 100_000.0).abs() < f64::EPSILON);
        assert!(account.positions.is_empty());
        assert!(account.closed_trades.is_empty());
    }

    #[test]
    fn add_remove_position() {
        let mut account = Account::new(100_000.0);
        account.add_position(sample_position("AAPL", 100));
        account.add_position(sample_position("MSFT", 50));
        assert_eq!(account.position_count(), 2);
        assert_eq!(account.get_position("AAPL").unwrap().quantity, 100);

        assert!(account.remove_position("AAPL").is_some());
        assert!(!account.has_position("AAPL"));
        assert!(account.remove_position("XYZ").is_none());
    }

    #[test]
    fn total_equity_marks_positions() {
        let mut account = Account::new(50_000.0);
        account.add_position(sample_position("AAPL", 100));
        account.cash = 40_000.0;

        let mut price_map = HashMap::new();
        price_map.insert("AAPL".to_string(), 150.0);
        assert!((account.total_equity(&price_map) - 55_000.0).abs() < f64::EPSILON);
        assert!((account.total_equity(&HashMap::new()) - 40_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn realized_pnl_sums_trades() {
        let mut account = Account::new(10_000.0);
        for pnl in [100.0, -40.0] {
            account.record_trade(ClosedTrade {
                symbol: "AAPL".into(),
                quantity: 10,
                entry_price: 100.0,
                exit_price: 110.0,
                entry_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                exit_date: NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(),
                pnl,
                reason: ExitReason::Signal,
            });
        }
        assert!((account.realized_pnl() - 60.0).abs() < f64::EPSILON);
    }
}
