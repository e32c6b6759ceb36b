use crate::utils::error::{HabError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl ToString, reason: impl Into<String>) -> HabError {
    HabError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_file_extension(field_name: &str, file: &str, allowed_extensions: &[&str]) -> Result<()> {
    match std::path::Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(extension) if allowed_extensions.contains(&extension) => Ok(()),
        Some(extension) => Err(invalid(
            field_name,
            file,
            format!(
                "Unsupported file extension: {}. Allowed extensions: {}",
                extension,
                allowed_extensions.join(", ")
            ),
        )),
        None => Err(invalid(
            field_name,
            file,
            "File has no extension or invalid filename",
        )),
    }
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| HabError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("INFLUX_HOST", "https://influx.local:8086").is_ok());
        assert!(validate_url("INFLUX_HOST", "http://10.0.0.2:8086").is_ok());
        assert!(validate_url("INFLUX_HOST", "").is_err());
        assert!(validate_url("INFLUX_HOST", "influx").is_err());
        assert!(validate_url("INFLUX_HOST", "ftp://influx.local").is_err());
    }

    #[test]
    fn test_validate_file_extension() {
        assert!(validate_file_extension("HAB_TARIFF_FILE", "tariffs.toml", &["toml"]).is_ok());
        assert!(validate_file_extension("HAB_TARIFF_FILE", "tariffs.yaml", &["toml"]).is_err());
        assert!(validate_file_extension("HAB_TARIFF_FILE", "tariffs", &["toml"]).is_err());
    }

    #[test]
    fn test_validate_required_and_non_empty() {
        let missing: Option<String> = None;
        assert!(matches!(
            validate_required_field("API_ADMIN_PASS", &missing),
            Err(HabError::MissingConfigError { .. })
        ));
        assert!(validate_non_empty_string("INFLUX_DATABASE", "  ").is_err());
        assert!(validate_non_empty_string("INFLUX_DATABASE", "home").is_ok());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("HAB_PORT", 8002u32, 1, 65535).is_ok());
        assert!(validate_range("HAB_PORT", 0u32, 1, 65535).is_err());
    }
}
