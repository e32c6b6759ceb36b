use crate::utils::error::{HabError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Energy price indexed on the monthly Belpex average.
///
/// `(factor × belpex × 10 + offset) / 100` in €/kWh, with `belpex` in c€/kWh
/// (so `belpex × 10` is €/MWh) and `offset` in c€/kWh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BelpexFormula {
    pub factor: f64,
    pub offset: f64,
}

impl BelpexFormula {
    pub const fn new(factor: f64, offset: f64) -> Self {
        Self { factor, offset }
    }

    pub fn price_per_kwh(&self, belpex: f64) -> f64 {
        (self.factor * belpex * 10.0 + self.offset) / 100.0
    }
}

/// Supplier and grid tariff of one calendar year. Amounts in euro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tariff {
    pub year: i32,
    pub consumption_rate1: BelpexFormula,
    pub consumption_rate2: BelpexFormula,
    pub injection_rate1: BelpexFormula,
    pub injection_rate2: BelpexFormula,
    pub subscription_per_year: f64,
    #[serde(default)]
    pub energy_fund_per_year: f64,
    pub distribution_per_kw_peak: f64,
    pub distribution_per_kwh: f64,
    pub distribution_fixed_per_month: f64,
}

impl Tariff {
    /// Dynamic contract, 2024 rates.
    pub fn dynamic_2024() -> Self {
        let distribution = 0.0098665;
        let public_service_obligations = 0.0229011;
        let surcharges = 0.0010861;
        let other_transmission = 0.0043571;
        let certificates = 0.015667;
        let excise = 0.0494061;

        Self {
            year: 2024,
            consumption_rate1: BelpexFormula::new(0.115 * 0.5, 7.46),
            consumption_rate2: BelpexFormula::new(0.100 * 0.5, 6.63),
            injection_rate1: BelpexFormula::new(0.08, -0.6),
            injection_rate2: BelpexFormula::new(0.06, -0.6),
            subscription_per_year: 60.0,
            energy_fund_per_year: 0.0,
            distribution_per_kw_peak: 37.15,
            distribution_per_kwh: (distribution
                + public_service_obligations
                + surcharges
                + other_transmission
                + excise)
                * 1.06
                + certificates,
            distribution_fixed_per_month: 15.09 / 12.0,
        }
    }

    /// Dynamic contract, 2025 rates. Grid costs now include 6% VAT up front.
    pub fn dynamic_2025() -> Self {
        let distribution = 0.0236764;
        let public_service_obligations = 0.0277220;
        let surcharges = 0.0014996;
        let other_transmission = 0.0;
        let certificates = 0.01567;
        let excise = 0.04748;

        Self {
            year: 2025,
            consumption_rate1: BelpexFormula::new(0.115 * 0.5, 7.16),
            consumption_rate2: BelpexFormula::new(0.100 * 0.5, 6.36),
            injection_rate1: BelpexFormula::new(0.07, -1.0),
            injection_rate2: BelpexFormula::new(0.05, -1.0),
            subscription_per_year: 65.0,
            energy_fund_per_year: 0.0,
            distribution_per_kw_peak: 49.0426291 * 1.06,
            distribution_per_kwh: (distribution
                + public_service_obligations
                + surcharges
                + other_transmission
                + excise)
                * 1.06
                + certificates,
            distribution_fixed_per_month: 17.51 * 1.06 / 12.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TariffBook {
    tariffs: BTreeMap<i32, Tariff>,
}

impl TariffBook {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut book = Self::empty();
        book.insert(Tariff::dynamic_2024());
        book.insert(Tariff::dynamic_2025());
        book
    }

    /// Adds a tariff, replacing any tariff of the same year.
    pub fn insert(&mut self, tariff: Tariff) -> Option<Tariff> {
        self.tariffs.insert(tariff.year, tariff)
    }

    pub fn get(&self, year: i32) -> Result<&Tariff> {
        self.tariffs
            .get(&year)
            .ok_or(HabError::NoTariffError { year })
    }

    pub fn years(&self) -> Vec<i32> {
        self.tariffs.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_belpex_formula() {
        let formula = BelpexFormula::new(0.0575, 7.46);
        // 10 c€/kWh = 100 €/MWh
        assert!((formula.price_per_kwh(10.0) - 0.1321).abs() < 1e-12);
        assert!((BelpexFormula::new(0.08, -0.6).price_per_kwh(0.0) + 0.006).abs() < 1e-12);
    }

    #[test]
    fn test_builtin_grid_rates() {
        let t2024 = Tariff::dynamic_2024();
        assert!((t2024.distribution_per_kwh - 0.108540914).abs() < 1e-9);
        assert!((t2024.distribution_fixed_per_month - 1.2575).abs() < 1e-12);

        let t2025 = Tariff::dynamic_2025();
        assert!((t2025.distribution_per_kw_peak - 51.985186846).abs() < 1e-9);
        assert!((t2025.distribution_fixed_per_month - 1.546716666).abs() < 1e-8);
    }

    #[test]
    fn test_book_lookup() {
        let mut book = TariffBook::builtin();
        assert_eq!(book.years(), vec![2024, 2025]);
        assert!(matches!(book.get(2023), Err(HabError::NoTariffError { year: 2023 })));

        let mut custom = Tariff::dynamic_2025();
        custom.subscription_per_year = 70.0;
        assert!(book.insert(custom).is_some());
        assert_eq!(book.get(2025).unwrap().subscription_per_year, 70.0);
    }
}
