mod settings;

pub use settings::{FlowEngineSettings, Settings, TelemetrySettings};
