//! Typed configuration.
//!
//! Both files are parsed into plain values and validated as soon as they are
//! loaded, so nothing downstream has to re-check them.

mod catalog;
mod settings;

pub use catalog::{
    AnalysisCatalog, AnalysisModel, GltCode, GroupModel, GroupModelKind, SubjectSelection,
};
pub use settings::{PipelineConfig, SessionConfig, SubjectConfig, SubjectSessionContext};

use crate::errors::ConfigError;
use std::path::Path;

/// Default location of the site configuration.
pub const DEFAULT_MAIN_CONFIG: &str = "analysis_configs/main_config.toml";

/// Default location of the analysis catalog.
pub const DEFAULT_ANALYSIS_MODELS: &str = "analysis_configs/analysis_models.toml";

fn read_config_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Missing {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
