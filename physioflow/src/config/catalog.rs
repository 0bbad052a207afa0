//! The analysis catalog loaded from `analysis_models.toml`.
//!
//! Every top-level table is one first-level analysis; file order is
//! preserved because it is the default modeling order.

use super::read_config_file;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// A first-level analysis model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisModel {
    /// Catalog key.
    #[serde(skip)]
    pub name: String,
    /// Only sessions with skin conductance data can run this analysis.
    #[serde(default)]
    pub requires_scr: bool,
    /// Subjects this analysis is restricted to.
    #[serde(default)]
    pub subjects: Option<Vec<String>>,
    /// Group-level models built on top of this analysis.
    #[serde(default)]
    pub group_analyses: Vec<GroupModel>,
}

impl AnalysisModel {
    /// Creates an unrestricted analysis.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_scr: false,
            subjects: None,
            group_analyses: Vec::new(),
        }
    }

    /// Requires skin conductance data.
    #[must_use]
    pub fn requiring_scr(mut self) -> Self {
        self.requires_scr = true;
        self
    }

    /// Restricts the analysis to a subject list.
    #[must_use]
    pub fn with_subjects(mut self, subjects: Vec<String>) -> Self {
        self.subjects = Some(subjects);
        self
    }

    /// Adds a group model.
    #[must_use]
    pub fn with_group_model(mut self, model: GroupModel) -> Self {
        self.group_analyses.push(model);
        self
    }

    /// Looks a group model up by name.
    #[must_use]
    pub fn group_model(&self, name: &str) -> Option<&GroupModel> {
        self.group_analyses.iter().find(|g| g.name == name)
    }
}

/// Which group-level tool a model drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupModelKind {
    /// Linear mixed effects over a data table.
    #[serde(rename = "3dLMEr")]
    Lmer,
    /// One-sample t-test over a file set.
    #[serde(rename = "3dttest++")]
    TTest,
}

impl GroupModelKind {
    /// Name passed as `--type`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lmer => "3dLMEr",
            Self::TTest => "3dttest++",
        }
    }
}

impl fmt::Display for GroupModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit subject selection of a group model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubjectSelection {
    /// A flat list.
    List(Vec<String>),
    /// Lists keyed by group label; only groups named in `groups` count.
    ByGroup(BTreeMap<String, Vec<String>>),
}

/// A general linear test passed to the mixed-effects tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GltCode {
    /// Test label.
    pub label: String,
    /// Symbolic coding.
    pub sym: String,
}

/// A group-level model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupModel {
    /// Model name, selected with `--group-model`.
    pub name: String,
    /// Tool to run.
    #[serde(rename = "type")]
    pub kind: GroupModelKind,
    /// Group labels included.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Sessions contributing inputs.
    #[serde(default)]
    pub sessions: Vec<u32>,
    /// Explicit subject selection; overrides `groups` filtering of the roster.
    #[serde(default)]
    pub subjects: Option<SubjectSelection>,
    /// Factor columns of the mixed-effects data table.
    #[serde(default)]
    pub table_columns: Vec<String>,
    /// Per-subject/session rows; each names a `contrast` plus column values.
    #[serde(default)]
    pub data_table_rows: Vec<toml::Table>,
    /// Mixed-effects model formula.
    #[serde(default)]
    pub model: Option<String>,
    /// General linear tests.
    #[serde(default)]
    pub glt: Vec<GltCode>,
    /// Label of the t-test input set.
    #[serde(default, rename = "setA_label")]
    pub set_a_label: Option<String>,
    /// Sub-brick the t-test reads.
    #[serde(default)]
    pub contrast: Option<String>,
}

impl GroupModel {
    /// Creates a model with no inputs configured.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: GroupModelKind) -> Self {
        Self {
            name: name.into(),
            kind,
            groups: Vec::new(),
            sessions: Vec::new(),
            subjects: None,
            table_columns: Vec::new(),
            data_table_rows: Vec::new(),
            model: None,
            glt: Vec::new(),
            set_a_label: None,
            contrast: None,
        }
    }

    /// Checks the fields the model's tool needs.
    ///
    /// # Errors
    ///
    /// Fails when a field required by the model kind is missing.
    pub fn validate(&self, analysis: &str) -> Result<(), ConfigError> {
        let invalid = |what: &str| {
            ConfigError::invalid(format!(
                "group model '{}' of '{analysis}' ({}): {what}",
                self.name, self.kind
            ))
        };

        if self.sessions.is_empty() {
            return Err(invalid("no sessions listed"));
        }
        if self.subjects.is_none() && self.groups.is_empty() {
            return Err(invalid("needs either 'groups' or 'subjects'"));
        }
        match self.kind {
            GroupModelKind::Lmer => {
                if self.table_columns.is_empty() {
                    return Err(invalid("'table_columns' is missing"));
                }
                if self.data_table_rows.is_empty() {
                    return Err(invalid("'data_table_rows' is missing"));
                }
                if self.model.as_deref().map_or(true, str::is_empty) {
                    return Err(invalid("'model' is missing"));
                }
                if let Some(i) = self.data_table_rows.iter().position(|row| {
                    !matches!(row.get("contrast"), Some(toml::Value::String(_)))
                }) {
                    return Err(invalid(&format!("data_table_rows[{i}] has no 'contrast'")));
                }
            }
            GroupModelKind::TTest => {
                if self.set_a_label.is_none() || self.contrast.is_none() {
                    return Err(invalid("requires 'setA_label' and 'contrast'"));
                }
            }
        }
        Ok(())
    }
}

/// All first-level analyses, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisCatalog {
    models: Vec<AnalysisModel>,
}

impl AnalysisCatalog {
    /// Creates a catalog from models in order.
    #[must_use]
    pub fn new(models: Vec<AnalysisModel>) -> Self {
        Self { models }
    }

    /// Loads and validates a catalog file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = read_config_file(path)?;
        Self::from_toml_str(&text, path)
    }

    /// Parses and validates catalog text; `origin` is only used in errors.
    ///
    /// # Errors
    ///
    /// Fails when the text cannot be parsed or validated.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let parse_error = |reason: String| ConfigError::Parse {
            path: origin.to_path_buf(),
            reason,
        };

        let table: toml::Table = toml::from_str(text).map_err(|e| parse_error(e.to_string()))?;
        let mut models = Vec::with_capacity(table.len());
        for (name, value) in table {
            let mut model = value
                .try_into::<AnalysisModel>()
                .map_err(|e| parse_error(format!("analysis '{name}': {e}")))?;
            model.name = name;
            models.push(model);
        }

        let catalog = Self::new(models);
        catalog.validate()?;
        Ok(catalog)
    }

    /// Validates every group model and rejects duplicate group model names.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid model.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for model in &self.models {
            let mut names = HashSet::new();
            for group_model in &model.group_analyses {
                if !names.insert(group_model.name.as_str()) {
                    return Err(ConfigError::invalid(format!(
                        "analysis '{}' defines group model '{}' twice",
                        model.name, group_model.name
                    )));
                }
                group_model.validate(&model.name)?;
            }
        }
        Ok(())
    }

    /// Looks an analysis up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AnalysisModel> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Looks an analysis up, failing when it is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAnalysis`].
    pub fn require(&self, name: &str) -> Result<&AnalysisModel, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::UnknownAnalysis(name.to_string()))
    }

    /// Looks a group model up under an analysis.
    ///
    /// # Errors
    ///
    /// Fails when either name is unknown.
    pub fn group_model(&self, analysis: &str, group_model: &str) -> Result<&GroupModel, ConfigError> {
        self.require(analysis)?
            .group_model(group_model)
            .ok_or_else(|| ConfigError::UnknownGroupModel {
                analysis: analysis.to_string(),
                group_model: group_model.to_string(),
            })
    }

    /// Analyses in file order.
    #[must_use]
    pub fn models(&self) -> &[AnalysisModel] {
        &self.models
    }

    /// Analysis names in file order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name.clone()).collect()
    }

    /// Returns the number of analyses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns true if no analyses are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CATALOG: &str = r#"
        [image]
        requires_scr = false

        [[image.group_analyses]]
        name = "lme"
        type = "3dLMEr"
        groups = ["control", "patient"]
        sessions = [1, 2]
        table_columns = ["group", "session", "valence"]
        model = "group*session*valence+(1|Subj)"
        data_table_rows = [
            { contrast = "neg#0_Coef", valence = "neg" },
            { contrast = "neu#0_Coef", valence = "neu" },
        ]
        glt = [{ label = "neg_vs_neu", sym = "valence : 1*neg -1*neu" }]

        [[image.group_analyses]]
        name = "ttest"
        type = "3dttest++"
        sessions = [1]
        subjects = { control = ["sub-01"], patient = ["sub-02"] }
        groups = ["control"]
        setA_label = "neg"
        contrast = "neg#0_Coef"

        [binned_scr]
        requires_scr = true
        subjects = ["sub-01", "sub-03"]
    "#;

    fn parse(text: &str) -> Result<AnalysisCatalog, ConfigError> {
        AnalysisCatalog::from_toml_str(text, Path::new("analysis_models.toml"))
    }

    #[test]
    fn test_catalog_preserves_file_order() {
        let catalog = parse(CATALOG).unwrap();
        assert_eq!(catalog.names(), vec!["image", "binned_scr"]);
        assert!(catalog.require("binned_scr").unwrap().requires_scr);
        assert_eq!(
            catalog.get("binned_scr").unwrap().subjects,
            Some(vec!["sub-01".to_string(), "sub-03".to_string()])
        );
    }

    #[test]
    fn test_group_models_parse() {
        let catalog = parse(CATALOG).unwrap();
        let lme = catalog.group_model("image", "lme").unwrap();
        assert_eq!(lme.kind, GroupModelKind::Lmer);
        assert_eq!(lme.sessions, vec![1, 2]);
        assert_eq!(lme.glt[0].label, "neg_vs_neu");

        let ttest = catalog.group_model("image", "ttest").unwrap();
        assert_eq!(ttest.kind.as_str(), "3dttest++");
        assert!(matches!(ttest.subjects, Some(SubjectSelection::ByGroup(_))));
    }

    #[test]
    fn test_unknown_names() {
        let catalog = parse(CATALOG).unwrap();
        assert_eq!(
            catalog.require("pain").unwrap_err(),
            ConfigError::UnknownAnalysis("pain".to_string())
        );
        assert!(matches!(
            catalog.group_model("image", "anova"),
            Err(ConfigError::UnknownGroupModel { .. })
        ));
    }

    #[test]
    fn test_ttest_without_contrast_rejected() {
        let text = r#"
            [image]
            [[image.group_analyses]]
            name = "ttest"
            type = "3dttest++"
            sessions = [1]
            groups = ["control"]
            setA_label = "neg"
        "#;
        let err = parse(text).unwrap_err();
        assert!(err.to_string().contains("setA_label"));
    }

    #[test]
    fn test_lmer_row_without_contrast_rejected() {
        let mut model = GroupModel::new("lme", GroupModelKind::Lmer);
        model.sessions = vec![1];
        model.groups = vec!["control".to_string()];
        model.table_columns = vec!["group".to_string()];
        model.model = Some("group".to_string());
        model.data_table_rows = vec![toml::Table::new()];

        assert!(model.validate("image").is_err());
    }

    #[test]
    fn test_unknown_group_type_is_parse_error() {
        let text = r#"
            [image]
            [[image.group_analyses]]
            name = "x"
            type = "3dMVM"
        "#;
        assert!(matches!(parse(text), Err(ConfigError::Parse { .. })));
    }
}
