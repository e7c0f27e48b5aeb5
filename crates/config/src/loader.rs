use std::{fmt::Write, path::Path, str::FromStr};

use anyhow::bail;
use indoc::indoc;
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use toml::Value;

use crate::Config;

/// Fields that may reference an unset environment variable. They are dropped
/// from the configuration instead of failing the load.
const OPTIONAL_FIELDS: &[&str] = &[
    "llm.provider.base_url",
    "llm.default_model",
    "telemetry.service_name",
];

pub(crate) fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let mut raw_config: Value = toml::from_str(&content)?;

    loop {
        let Err(err) = expand_dynamic_strings(&mut Vec::new(), &mut raw_config) else {
            break;
        };

        match err.failed_path() {
            Some(path) if is_optional_field(path) && is_missing_env_var_error(&err) => {
                let path = path.to_string();
                remove_field_from_config(&mut raw_config, &path);
            }
            _ => bail!("{err}"),
        }
    }

    let config = Config::deserialize(raw_config)?;
    validate(&config)?;

    Ok(config)
}

pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    let llm = &config.llm;

    if !llm.enabled() {
        log::warn!("LLM endpoints are disabled; the gateway will only serve health checks");
        return Ok(());
    }

    if !llm.has_credentials() {
        bail!(indoc! {r#"
            No provider credentials configured. Tally requires at least one API key to function.

            Example configuration:

              [llm.provider]
              api_keys = ["{{ env.GEMINI_API_KEY }}"]
        "#});
    }

    if llm.provider.api_keys.iter().any(|key| {
        use secrecy::ExposeSecret;
        key.expose_secret().trim().is_empty()
    }) {
        bail!("llm.provider.api_keys contains an empty key");
    }

    if llm.provider.models.is_empty() {
        bail!(indoc! {r#"
            No models configured. Declare at least one model, for example:

              [llm.provider.models.gemini-flash]
              rename = "gemini-2.5-flash"
        "#});
    }

    if let Some(default_model) = &llm.default_model
        && !llm.provider.models.contains_key(default_model)
    {
        bail!("llm.default_model '{default_model}' is not a configured model");
    }

    if llm.retry.max_attempts == 0 {
        bail!("llm.retry.max_attempts must be at least 1");
    }

    if llm.retry.delays.is_empty() {
        bail!("llm.retry.delays must contain at least one delay");
    }

    Ok(())
}

/// Error raised while expanding `{{ env.NAME }}` placeholders.
#[derive(Debug)]
struct ExpandError {
    path: String,
    message: String,
}

impl ExpandError {
    fn failed_path(&self) -> Option<&str> {
        Some(self.path.as_str()).filter(|path| !path.is_empty())
    }
}

impl std::fmt::Display for ExpandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to expand dynamic string at path '{}': {}", self.path, self.message)
    }
}

fn is_optional_field(path: &str) -> bool {
    OPTIONAL_FIELDS.iter().any(|&field| path == field)
}

fn is_missing_env_var_error(err: &ExpandError) -> bool {
    let message = err.message.to_lowercase();

    message.contains("environment variable not found")
        || message.contains("env var")
        || (message.contains("variable") && message.contains("not found"))
}

fn remove_field_from_config(config: &mut Value, path: &str) {
    let parts: Vec<&str> = path.split('.').collect();

    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut current = config;

    for part in parents {
        let Some(next) = current.as_table_mut().and_then(|table| table.get_mut(*part)) else {
            return;
        };

        current = next;
    }

    if let Some(table) = current.as_table_mut() {
        table.remove(*last);
        log::debug!("Removed optional field '{path}' due to missing environment variable");
    }
}

fn expand_dynamic_strings<'a>(
    path: &mut Vec<Result<&'a str, usize>>,
    value: &'a mut Value,
) -> Result<(), ExpandError> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();

                for segment in path.iter() {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => {
                            if p.ends_with('.') {
                                p.pop();
                            }

                            let _ = write!(p, "[{i}].");
                        }
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                return Err(ExpandError {
                    path: p,
                    message: err.to_string(),
                });
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use indoc::indoc;

    use crate::Config;

    fn load(content: &str) -> anyhow::Result<Config> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();

        Config::load(file.path())
    }

    #[test]
    fn loads_minimal_configuration() {
        let config = load(indoc! {r#"
            [llm.provider]
            api_keys = ["key-1", "key-2"]

            [llm.provider.models.flash]
            rename = "gemini-2.5-flash"
        "#})
        .unwrap();

        assert_eq!(config.llm.provider.api_keys.len(), 2);
        assert_eq!(config.llm.retry.max_attempts, 3);
    }

    #[test]
    fn missing_optional_env_var_drops_the_field() {
        let config = load(indoc! {r#"
            [llm.provider]
            base_url = "{{ env.TALLY_TEST_UNSET_BASE_URL_7F3A }}"
            api_keys = ["key-1"]

            [llm.provider.models.flash]
        "#})
        .unwrap();

        assert!(config.llm.provider.base_url.is_none());
    }

    #[test]
    fn missing_required_env_var_fails() {
        let error = load(indoc! {r#"
            [llm.provider]
            api_keys = ["{{ env.TALLY_TEST_UNSET_API_KEY_7F3A }}"]

            [llm.provider.models.flash]
        "#})
        .unwrap_err();

        assert!(
            error.to_string().contains("llm.provider.api_keys[0]"),
            "unexpected error: {error}"
        );
    }

    #[test]
    fn credentials_are_required() {
        let error = load(indoc! {r#"
            [llm.provider.models.flash]
        "#})
        .unwrap_err();

        assert!(error.to_string().starts_with("No provider credentials configured"));
    }

    #[test]
    fn empty_key_is_rejected() {
        let error = load(indoc! {r#"
            [llm.provider]
            api_keys = ["key-1", "  "]

            [llm.provider.models.flash]
        "#})
        .unwrap_err();

        insta::assert_snapshot!(error, @"llm.provider.api_keys contains an empty key");
    }

    #[test]
    fn default_model_must_be_configured() {
        let error = load(indoc! {r#"
            [llm]
            default_model = "pro"

            [llm.provider]
            api_keys = ["key-1"]

            [llm.provider.models.flash]
        "#})
        .unwrap_err();

        insta::assert_snapshot!(error, @"llm.default_model 'pro' is not a configured model");
    }

    #[test]
    fn retry_policy_is_validated() {
        let error = load(indoc! {r#"
            [llm.provider]
            api_keys = ["key-1"]

            [llm.provider.models.flash]

            [llm.retry]
            max_attempts = 0
        "#})
        .unwrap_err();

        insta::assert_snapshot!(error, @"llm.retry.max_attempts must be at least 1");

        let error = load(indoc! {r#"
            [llm.provider]
            api_keys = ["key-1"]

            [llm.provider.models.flash]

            [llm.retry]
            delays = []
        "#})
        .unwrap_err();

        insta::assert_snapshot!(error, @"llm.retry.delays must contain at least one delay");
    }

    #[test]
    fn disabled_llm_skips_credential_checks() {
        let config = load(indoc! {r#"
            [llm]
            enabled = false
        "#})
        .unwrap();

        assert!(!config.llm.enabled());
    }
}
