use std::collections::HashMap;
use std::path::Path;

use super::value::{yaml_key, ConfigValue};
use super::ConfigError;

/// Load a YAML file if it exists and flatten it into `values`.
pub(crate) fn load_yaml_file(
    path: &Path,
    values: &mut HashMap<String, ConfigValue>,
) -> Result<(), ConfigError> {
    if !path.exists() {
        return Ok(());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    load_yaml_str(&content, values)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))
}

pub(crate) fn load_yaml_str(
    content: &str,
    values: &mut HashMap<String, ConfigValue>,
) -> Result<(), ConfigError> {
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;
    flatten_yaml("", &yaml, values);
    Ok(())
}

/// Flatten a YAML tree into dot-separated keys.
///
/// Leaves land under their full path. Mappings are also kept whole under
/// their own key so sections can be enumerated later.
pub(crate) fn flatten_yaml(
    prefix: &str,
    value: &serde_yaml::Value,
    out: &mut HashMap<String, ConfigValue>,
) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            if !prefix.is_empty() {
                out.insert(prefix.to_string(), ConfigValue::from_yaml(value));
            }
            for (k, v) in map {
                let key = yaml_key(k);
                let full_key = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_yaml(&full_key, v, out);
            }
        }
        leaf => {
            if !prefix.is_empty() {
                out.insert(prefix.to_string(), ConfigValue::from_yaml(leaf));
            }
        }
    }
}

/// Overlay `EMISSARY_*` environment variables.
///
/// `EMISSARY_DATASOURCES_MAIN_URL` maps to `emissary.datasources.main.url`.
pub(crate) fn overlay_env<I>(vars: I, values: &mut HashMap<String, ConfigValue>)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (env_key, env_val) in vars {
        if !env_key.starts_with(super::ENV_PREFIX) {
            continue;
        }
        let config_key = env_key.to_lowercase().replace('_', ".");
        values.insert(config_key, ConfigValue::String(env_val));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_sections_are_flattened_and_kept() {
        let mut values = HashMap::new();
        load_yaml_str(
            "emissary:\n  datasources:\n    main:\n      url: sqlite://a.db\n",
            &mut values,
        )
        .unwrap();
        assert_eq!(
            values.get("emissary.datasources.main.url"),
            Some(&ConfigValue::String("sqlite://a.db".into()))
        );
        assert!(matches!(
            values.get("emissary.datasources"),
            Some(ConfigValue::Map(_))
        ));
    }

    #[test]
    fn only_prefixed_env_vars_are_overlaid() {
        let mut values = HashMap::new();
        overlay_env(
            vec![
                ("EMISSARY_CACHE_TTL".to_string(), "10".to_string()),
                ("PATH".to_string(), "/usr/bin".to_string()),
            ],
            &mut values,
        );
        assert_eq!(
            values.get("emissary.cache.ttl"),
            Some(&ConfigValue::String("10".into()))
        );
        assert!(!values.contains_key("path"));
    }
}
