use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub flow_engine: FlowEngineSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowEngineSettings {
    /// Id of the root process group under which the reusable-templates
    /// group is resolved
    #[serde(default = "default_root_process_group_id")]
    pub root_process_group_id: String,
    /// Well-known name of the shared reusable-templates process group
    #[serde(default = "default_reusable_templates_group_name")]
    pub reusable_templates_group_name: String,
}

fn default_root_process_group_id() -> String {
    "root".to_string()
}

fn default_reusable_templates_group_name() -> String {
    "reusable_templates".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    /// Emit logs as JSON instead of the human-readable format
    #[serde(default)]
    pub json_logs: bool,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("flow_engine.root_process_group_id", "root")?
            .set_default(
                "flow_engine.reusable_templates_group_name",
                "reusable_templates",
            )?
            .set_default("telemetry.json_logs", false)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // FLOW_ENGINE_ROOT_PROCESS_GROUP_ID, TELEMETRY_JSON_LOGS, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for FlowEngineSettings {
    fn default() -> Self {
        Self {
            root_process_group_id: default_root_process_group_id(),
            reusable_templates_group_name: default_reusable_templates_group_name(),
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self { json_logs: false }
    }
}
