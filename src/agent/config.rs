use super::Error;
use crate::inject::Settings;

/// Options passed to the agent on the command line
///
/// The string is a `;`-separated list of `key=value` pairs:
///
///   - `handlers=a/B,c/D`: handler classes to scan before any mod
///   - `namespace=com/acme/hooks/`: scan every class under this prefix too
///   - `context=...`, `edit_class=...`, `inject=...`, `at=...`: override the context class and
///     the annotation classes
///   - `debug_dump=true`: log rewritten method bodies
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub settings: Settings,
    pub handlers: Vec<String>,
    pub namespace: Option<String>,
}

impl AgentConfig {
    pub fn parse(options: &str) -> Result<AgentConfig, Error> {
        let mut config = AgentConfig {
            settings: Settings::new(),
            handlers: vec![],
            namespace: None,
        };

        for pair in options.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("expected key=value, found '{}'", pair)))?;
            let (key, value) = (key.trim(), value.trim());
            match key {
                "handlers" => config.handlers.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(str::to_owned),
                ),
                "namespace" => config.namespace = Some(value.replace('.', "/")),
                "context" => config.settings.context_class = class_name(key, value)?,
                "edit_class" => config.settings.edit_class_annotation = class_name(key, value)?,
                "inject" => config.settings.inject_annotation = class_name(key, value)?,
                "at" => config.settings.location_enum = class_name(key, value)?,
                "debug_dump" => {
                    config.settings.debug_dump = value.parse().map_err(|_| {
                        Error::Config(format!("debug_dump must be true or false, not '{}'", value))
                    })?
                }
                _ => return Err(Error::Config(format!("unknown option '{}'", key))),
            }
        }

        Ok(config)
    }
}

fn class_name(key: &str, value: &str) -> Result<crate::jvm::BinaryName, Error> {
    Settings::class_name(value).map_err(|err| Error::Config(format!("{}: {}", key, err)))
}
