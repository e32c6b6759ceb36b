use crate::core::tariff::{Tariff, TariffBook};
use crate::utils::error::{HabError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Tariff definitions read from TOML, one `[[tariff]]` table per year.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TariffFile {
    #[serde(default, rename = "tariff")]
    pub tariffs: Vec<Tariff>,
}

impl TariffFile {
    /// Loads tariffs from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(HabError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| HabError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables stay as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| HabError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Built-in tariffs overlaid with the ones from this file.
    pub fn into_book(self) -> TariffBook {
        let mut book = TariffBook::builtin();
        for tariff in self.tariffs {
            let year = tariff.year;
            if book.insert(tariff).is_some() {
                tracing::info!(year, "tariff file overrides built-in tariff");
            }
        }
        book
    }
}

impl Validate for TariffFile {
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for tariff in &self.tariffs {
            let field = format!("tariff[{}]", tariff.year);
            validation::validate_range(&field, tariff.year, 2000, 2100)?;

            if !seen.insert(tariff.year) {
                return Err(HabError::InvalidConfigValueError {
                    field,
                    value: tariff.year.to_string(),
                    reason: "year defined more than once".to_string(),
                });
            }

            let amounts = [
                ("subscription_per_year", tariff.subscription_per_year),
                ("energy_fund_per_year", tariff.energy_fund_per_year),
                ("distribution_per_kw_peak", tariff.distribution_per_kw_peak),
                ("distribution_per_kwh", tariff.distribution_per_kwh),
                ("distribution_fixed_per_month", tariff.distribution_fixed_per_month),
            ];
            for (name, amount) in amounts {
                validation::validate_range(&format!("{}.{}", field, name), amount, 0.0, f64::MAX)?;
            }
        }

        Ok(())
    }
}
