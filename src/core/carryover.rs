//! Carryover arithmetic between quarters.

use super::{LineItem, ProjectType};

/// Opening balances a row contributes to its successor in the next quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpeningBalances {
    /// Next quarter's opening inventory advance.
    pub inventory: i64,
    /// Next quarter's opening payable.
    pub debt: i64,
    /// Next quarter's opening carry value.
    pub carryover: i64,
}

/// Maps a row's closing balances to the opening balances of the following
/// quarter. For factory projects the secondary payable is folded into the
/// opening debt. Pure: no clock, no ids, no store access.
pub fn opening_balances(item: &LineItem, kind: &ProjectType) -> OpeningBalances {
    let debt = if kind.is_factory() {
        item.no_phai_tra_ck + item.no_phai_tra_nm
    } else {
        item.no_phai_tra_ck
    };
    OpeningBalances {
        inventory: item.ton_kho_ung_kh,
        debt,
        carryover: item.carryover_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LineItem {
        let mut item = LineItem::blank();
        item.project = "XD-01".to_string();
        item.description = "Thép".to_string();
        item.ton_kho_ung_kh = 500;
        item.no_phai_tra_ck = 300;
        item.no_phai_tra_nm = 200;
        item.carryover_end = 50;
        item
    }

    #[test]
    fn non_factory_ignores_secondary_payable() {
        let ob = opening_balances(&sample(), &ProjectType::Construction);
        assert_eq!(ob.inventory, 500);
        assert_eq!(ob.debt, 300);
        assert_eq!(ob.carryover, 50);
    }

    #[test]
    fn factory_adds_secondary_payable_into_debt() {
        let ob = opening_balances(&sample(), &ProjectType::Factory);
        assert_eq!(ob.debt, 500);
    }

    #[test]
    fn deterministic_for_identical_input() {
        let item = sample();
        let first = opening_balances(&item, &ProjectType::Investment);
        let second = opening_balances(&item, &ProjectType::Investment);
        assert_eq!(first, second);
    }
}
