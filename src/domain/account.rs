//! Single-position account used by the simulator.
//!
//! The account is either FLAT (no position) or LONG (one lot bought with all
//! available cash). While LONG the cash balance is zero.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    Long,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountState {
    pub cash: f64,
    pub position_qty: f64,
    pub entry_price: f64,
}

/// Result of closing the position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exit {
    pub qty: f64,
    pub pnl: f64,
}

impl AccountState {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            position_qty: 0.0,
            entry_price: 0.0,
        }
    }

    pub fn state(&self) -> PositionState {
        if self.position_qty > 0.0 {
            PositionState::Long
        } else {
            PositionState::Flat
        }
    }

    /// cash + qty * price
    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.position_qty * price
    }

    /// FLAT -> LONG: spend all cash at `price`. Returns the quantity bought,
    /// or `None` if already long or the price is not positive.
    pub fn buy_all(&mut self, price: f64) -> Option<f64> {
        if self.state() == PositionState::Long || price <= 0.0 || !price.is_finite() {
            return None;
        }
        let qty = self.cash / price;
        self.position_qty = qty;
        self.entry_price = price;
        self.cash = 0.0;
        Some(qty)
    }

    /// LONG -> FLAT: sell the whole position at `price`.
    pub fn sell_all(&mut self, price: f64) -> Option<Exit> {
        if self.state() == PositionState::Flat {
            return None;
        }
        let qty = self.position_qty;
        let pnl = (price - self.entry_price) * qty;
        self.cash = qty * price;
        self.position_qty = 0.0;
        self.entry_price = 0.0;
        Some(Exit { qty, pnl })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_then_sell() {
        let mut acct = AccountState::new(1000.0);
        assert_eq!(acct.state(), PositionState::Flat);

        let qty = acct.buy_all(100.0).unwrap();
        assert!((qty - 10.0).abs() < f64::EPSILON);
        assert_eq!(acct.state(), PositionState::Long);
        assert_eq!(acct.cash, 0.0);
        assert!((acct.equity(110.0) - 1100.0).abs() < f64::EPSILON);

        let exit = acct.sell_all(120.0).unwrap();
        assert!((exit.qty - 10.0).abs() < f64::EPSILON);
        assert!((exit.pnl - 200.0).abs() < f64::EPSILON);
        assert_eq!(acct.state(), PositionState::Flat);
        assert!((acct.cash - 1200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn no_double_entry() {
        let mut acct = AccountState::new(1000.0);
        acct.buy_all(100.0).unwrap();
        assert!(acct.buy_all(50.0).is_none());
        assert!((acct.entry_price - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sell_when_flat_is_noop() {
        let mut acct = AccountState::new(1000.0);
        assert!(acct.sell_all(100.0).is_none());
        assert!((acct.cash - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_positive_price_rejected() {
        let mut acct = AccountState::new(1000.0);
        assert!(acct.buy_all(0.0).is_none());
        assert!(acct.buy_all(-5.0).is_none());
        assert_eq!(acct.state(), PositionState::Flat);
    }

    #[test]
    fn losing_exit_has_negative_pnl() {
        let mut acct = AccountState::new(500.0);
        acct.buy_all(50.0).unwrap();
        let exit = acct.sell_all(40.0).unwrap();
        assert!((exit.pnl + 100.0).abs() < 1e-9);
    }
}
