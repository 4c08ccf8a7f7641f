pub mod schema;
pub mod settings;
pub mod synthesizer;

pub use schema::{parse_persisted, DesiredConfig, Endpoint, TlsConfig};
pub use settings::{load_settings, load_settings_from_str, ApplyStrategy, ReloadSettings, Settings};
pub use synthesizer::{synthesize, SynthesisInput};
