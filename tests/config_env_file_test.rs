use anyhow::Result;
use hab_data_api::config::toml_config::TariffFile;
use hab_data_api::config::{load_env_file, AppConfig};
use hab_data_api::utils::validation::Validate;
use hab_data_api::HabError;
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

fn read_env_file(path: &std::path::Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    for item in dotenvy::from_path_iter(path)? {
        let (key, value) = item?;
        vars.insert(key, value);
    }
    Ok(vars)
}

#[test]
fn test_env_file_with_secret_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let admin_secret = temp_dir.path().join("admin_pass");
    let influx_secret = temp_dir.path().join("influx_pass");
    fs::write(&admin_secret, "s3cret\n")?;
    fs::write(&influx_secret, "influx-pw\r\n")?;

    let env_file = temp_dir.path().join(".env");
    fs::write(
        &env_file,
        format!(
            "API_ADMIN_PASS_FILE={}\nINFLUX_HOST=influxdb\nINFLUX_DATABASE=home\nINFLUX_USERNAME=reader\nINFLUX_PASSWORD_FILE={}\nHAB_PORT=9000\n",
            admin_secret.display(),
            influx_secret.display()
        ),
    )?;

    let vars = read_env_file(&env_file)?;
    let config = AppConfig::from_lookup(|name| vars.get(name).cloned())?;
    config.validate()?;

    assert_eq!(config.auth.username, "admin");
    assert_eq!(config.auth.password, "s3cret");
    assert_eq!(config.influx.url, "http://influxdb:8086");
    assert_eq!(config.influx.password.as_deref(), Some("influx-pw"));
    assert_eq!(config.server.socket_addr()?.to_string(), "0.0.0.0:9000");
    assert!(config.tariff_file.is_none());

    Ok(())
}

#[test]
fn test_missing_admin_password_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let env_file = temp_dir.path().join(".env");
    fs::write(&env_file, "INFLUX_HOST=influxdb\nINFLUX_DATABASE=home\n")?;

    let vars = read_env_file(&env_file)?;
    let error = AppConfig::from_lookup(|name| vars.get(name).cloned()).unwrap_err();

    assert!(error.to_string().contains("API_ADMIN_PASS"));
    Ok(())
}

#[test]
fn test_tariff_file_extends_builtin_years() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("tariffs.toml");
    fs::write(
        &path,
        r#"
[[tariff]]
year = 2026
consumption_rate1 = { factor = 0.06, offset = 7.0 }
consumption_rate2 = { factor = 0.05, offset = 6.5 }
injection_rate1 = { factor = 0.07, offset = -1.0 }
injection_rate2 = { factor = 0.05, offset = -1.0 }
subscription_per_year = 70.0
distribution_per_kw_peak = 52.0
distribution_per_kwh = 0.11
distribution_fixed_per_month = 1.6
"#,
    )?;

    let file = TariffFile::from_file(&path)?;
    file.validate()?;
    let book = file.into_book();

    assert_eq!(book.years(), vec![2024, 2025, 2026]);
    let tariff = book.get(2026)?;
    assert_eq!(tariff.energy_fund_per_year, 0.0);
    assert!((tariff.consumption_rate1.price_per_kwh(10.0) - 0.13).abs() < 1e-12);
    assert!(book.get(2027).is_err());

    Ok(())
}

#[test]
fn test_load_env_file_sets_missing_variables_only() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let env_file = temp_dir.path().join(".env");
    fs::write(
        &env_file,
        "HAB_ENV_TEST_FRESH=from-file\nHAB_ENV_TEST_PRESET=from-file\n",
    )?;
    std::env::set_var("HAB_ENV_TEST_PRESET", "from-environment");

    assert!(load_env_file(&env_file)?);

    assert_eq!(std::env::var("HAB_ENV_TEST_FRESH")?, "from-file");
    assert_eq!(std::env::var("HAB_ENV_TEST_PRESET")?, "from-environment");
    Ok(())
}

#[test]
fn test_load_env_file_missing_file_is_not_an_error() -> Result<()> {
    let temp_dir = TempDir::new()?;

    assert!(!load_env_file(&temp_dir.path().join("absent.env"))?);
    Ok(())
}

#[test]
fn test_load_env_file_unreadable_file_is_an_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let directory = temp_dir.path().join("env-dir");
    fs::create_dir(&directory)?;

    let error = load_env_file(&directory).unwrap_err();

    assert!(matches!(error, HabError::ConfigError { .. }));
    assert!(error.to_string().contains("env-dir"));
    Ok(())
}
