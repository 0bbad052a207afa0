//! Group input assembly: which subjects take part and which files they
//! contribute.

use crate::config::{GroupModel, GroupModelKind, PipelineConfig, SubjectConfig, SubjectSelection};
use crate::errors::PhysioflowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A subject left out of aggregation, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    /// Subject id.
    pub subject: String,
    /// Human readable reason.
    pub reason: String,
}

impl Exclusion {
    /// Creates an exclusion.
    #[must_use]
    pub fn new(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            reason: reason.into(),
        }
    }
}

/// The mixed-effects data table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataTable {
    /// `Subj`, the factor columns, then `InputFile`.
    pub header: Vec<String>,
    /// One row per subject, session and contrast.
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    /// Tab-separated text with a trailing newline on every line.
    #[must_use]
    pub fn to_tsv(&self) -> String {
        std::iter::once(&self.header)
            .chain(&self.rows)
            .map(|row| format!("{}\n", row.join("\t")))
            .collect()
    }
}

/// Everything the group tool is fed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupInputs {
    /// Subjects that contributed at least one input.
    pub subjects: Vec<String>,
    /// Per-subject masks, as dataset prefixes without `.HEAD`.
    pub masks: Vec<PathBuf>,
    /// Data table for mixed-effects models.
    pub data_table: Option<DataTable>,
    /// `(subject, dataset)` pairs for t-tests.
    pub set_a: Vec<(String, String)>,
    /// Subjects left out.
    pub excluded: Vec<Exclusion>,
}

/// Selects roster subjects for a group model.
///
/// An explicit `subjects` selection wins; grouped selections only count
/// groups listed in `groups`, in that order. Otherwise every roster subject
/// whose group is listed is taken. Unknown ids are warned about and dropped.
#[must_use]
pub fn select_subjects<'a>(config: &'a PipelineConfig, model: &GroupModel) -> Vec<&'a SubjectConfig> {
    let ids: Vec<&str> = match &model.subjects {
        Some(SubjectSelection::List(ids)) => {
            info!(count = ids.len(), "Using custom list of subjects");
            ids.iter().map(String::as_str).collect()
        }
        Some(SubjectSelection::ByGroup(by_group)) => {
            info!(groups = ?model.groups, "Using custom subject lists per group");
            model
                .groups
                .iter()
                .filter_map(|group| by_group.get(group))
                .flatten()
                .map(String::as_str)
                .collect()
        }
        None => {
            info!(groups = ?model.groups, "Using all subjects from group(s)");
            return config
                .subjects
                .iter()
                .filter(|s| s.group.as_ref().is_some_and(|g| model.groups.contains(g)))
                .collect();
        }
    };

    ids.into_iter()
        .filter_map(|id| {
            let subject = config.subject(id);
            if subject.is_none() {
                warn!(subject = id, "Subject from custom list not found");
            }
            subject
        })
        .collect()
}

fn session_dir(output_dir: &Path, subject: &str, session: u32) -> PathBuf {
    output_dir.join(subject).join(format!("ses-{session}"))
}

/// `{out}/{sub}/ses-{ses}/func_preproc/{sub}_preproc.results/mask_epi_anat.{sub}_preproc+tlrc`
#[must_use]
pub fn mask_prefix(output_dir: &Path, subject: &str, session: u32) -> PathBuf {
    session_dir(output_dir, subject, session)
        .join("func_preproc")
        .join(format!("{subject}_preproc.results"))
        .join(format!("mask_epi_anat.{subject}_preproc+tlrc"))
}

/// `{out}/{sub}/ses-{ses}/glm/{analysis}/{sub}_{analysis}.results/stats.{sub}_{analysis}+tlrc`
#[must_use]
pub fn stats_prefix(output_dir: &Path, subject: &str, session: u32, analysis: &str) -> PathBuf {
    session_dir(output_dir, subject, session)
        .join("glm")
        .join(analysis)
        .join(format!("{subject}_{analysis}.results"))
        .join(format!("stats.{subject}_{analysis}+tlrc"))
}

fn head_exists(prefix: &Path) -> bool {
    let mut head = prefix.as_os_str().to_owned();
    head.push(".HEAD");
    Path::new(&head).is_file()
}

fn column_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Boolean(true) => "True".to_string(),
        toml::Value::Boolean(false) => "False".to_string(),
        other => other.to_string(),
    }
}

/// Assembles the inputs of one group model.
///
/// `exclusions` names subjects that must not contribute (for example
/// because their pipeline aborted in this run); they are reported in
/// [`GroupInputs::excluded`] alongside subjects that have no artifacts.
///
/// # Errors
///
/// Fails when no subject is selected or no subject mask exists.
pub fn assemble(
    config: &PipelineConfig,
    analysis: &str,
    model: &GroupModel,
    exclusions: &HashMap<String, String>,
) -> Result<GroupInputs, PhysioflowError> {
    let mut inputs = GroupInputs::default();

    let selected: Vec<&SubjectConfig> = select_subjects(config, model)
        .into_iter()
        .filter(|subject| match exclusions.get(&subject.id) {
            Some(reason) => {
                warn!(subject = %subject.id, reason = %reason, "Excluding subject from group analysis");
                inputs.excluded.push(Exclusion::new(&subject.id, reason));
                false
            }
            None => true,
        })
        .collect();

    if selected.is_empty() {
        return Err(PhysioflowError::Group("No subjects to process after filtering".to_string()));
    }

    for subject in &selected {
        for &session in &model.sessions {
            let mask = mask_prefix(&config.output_dir, &subject.id, session);
            if head_exists(&mask) {
                inputs.masks.push(mask);
            } else {
                warn!(path = %mask.display(), "Mask file not found");
            }
        }
    }
    if inputs.masks.is_empty() {
        return Err(PhysioflowError::Group("No mask files found".to_string()));
    }

    match model.kind {
        GroupModelKind::Lmer => {
            let table = build_data_table(config, analysis, model, &selected, &mut inputs.subjects);
            inputs.data_table = Some(table);
        }
        GroupModelKind::TTest => {
            let contrast = model.contrast.as_deref().unwrap_or_default();
            for subject in &selected {
                for &session in &model.sessions {
                    let stats = stats_prefix(&config.output_dir, &subject.id, session, analysis);
                    if !head_exists(&stats) {
                        warn!(path = %stats.display(), "Stats file not found");
                        continue;
                    }
                    note_subject(&mut inputs.subjects, &subject.id);
                    inputs
                        .set_a
                        .push((subject.id.clone(), format!("{}[{contrast}]", stats.display())));
                }
            }
        }
    }

    for subject in &selected {
        if !inputs.subjects.contains(&subject.id) {
            inputs
                .excluded
                .push(Exclusion::new(&subject.id, "no first-level results found"));
        }
    }
    if inputs.subjects.is_empty() {
        return Err(PhysioflowError::Group("No subjects have first-level results".to_string()));
    }
    Ok(inputs)
}

fn note_subject(subjects: &mut Vec<String>, id: &str) {
    if !subjects.iter().any(|s| s == id) {
        subjects.push(id.to_string());
    }
}

fn build_data_table(
    config: &PipelineConfig,
    analysis: &str,
    model: &GroupModel,
    selected: &[&SubjectConfig],
    subjects: &mut Vec<String>,
) -> DataTable {
    let header: Vec<String> = std::iter::once("Subj".to_string())
        .chain(model.table_columns.iter().cloned())
        .chain(std::iter::once("InputFile".to_string()))
        .collect();

    let mut rows = Vec::new();
    for subject in selected {
        for &session in &model.sessions {
            let stats = stats_prefix(&config.output_dir, &subject.id, session, analysis);
            for row_def in &model.data_table_rows {
                let contrast = row_def.get("contrast").map(column_value).unwrap_or_default();
                let input_file = format!("{}[{contrast}]", stats.display());
                if !head_exists(&stats) {
                    warn!(path = %input_file, "Stats file not found");
                    continue;
                }
                note_subject(subjects, &subject.id);

                let mut values: HashMap<&str, String> = HashMap::from([
                    ("Subj", subject.id.clone()),
                    ("session", format!("ses-{session}")),
                    ("group", subject.group.clone().unwrap_or_else(|| "NA".to_string())),
                    ("InputFile", input_file),
                ]);
                for (key, value) in row_def.iter().filter(|(k, _)| k.as_str() != "contrast") {
                    values.insert(key.as_str(), column_value(value));
                }

                rows.push(
                    header
                        .iter()
                        .map(|col| values.get(col.as_str()).cloned().unwrap_or_else(|| "NA".to_string()))
                        .collect(),
                );
            }
        }
    }
    DataTable { header, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SessionConfig, SubjectConfig};
    use crate::testing::fixtures::{lmer_model, touch_head, ttest_model};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn roster(output: &Path) -> PipelineConfig {
        ["sub-01", "sub-02", "sub-03"]
            .iter()
            .zip(["control", "patient", "control"])
            .fold(PipelineConfig::new("raw", output), |config, (id, group)| {
                config.with_subject(
                    SubjectConfig::new(*id)
                        .with_group(group)
                        .with_session(SessionConfig::new(1)),
                )
            })
    }

    #[test]
    fn test_select_by_groups() {
        let config = roster(Path::new("out"));
        let mut model = ttest_model();
        model.groups = vec!["control".to_string()];

        let ids: Vec<_> = select_subjects(&config, &model).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["sub-01", "sub-03"]);
    }

    #[test]
    fn test_select_custom_lists() {
        let config = roster(Path::new("out"));
        let mut model = ttest_model();
        model.groups = vec!["patient".to_string(), "control".to_string()];
        model.subjects = Some(SubjectSelection::ByGroup(BTreeMap::from([
            ("control".to_string(), vec!["sub-03".to_string()]),
            ("patient".to_string(), vec!["sub-02".to_string(), "sub-99".to_string()]),
            ("pilot".to_string(), vec!["sub-01".to_string()]),
        ])));

        let ids: Vec<_> = select_subjects(&config, &model).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["sub-02", "sub-03"]);

        model.subjects = Some(SubjectSelection::List(vec!["sub-03".to_string(), "sub-01".to_string()]));
        let ids: Vec<_> = select_subjects(&config, &model).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["sub-03", "sub-01"]);
    }

    #[test]
    fn test_lmer_data_table() {
        let dir = tempfile::tempdir().unwrap();
        let config = roster(dir.path());
        for id in ["sub-01", "sub-02"] {
            touch_head(&mask_prefix(dir.path(), id, 1));
            touch_head(&stats_prefix(dir.path(), id, 1, "image"));
        }

        let inputs = assemble(&config, "image", &lmer_model(), &HashMap::new()).unwrap();
        let table = inputs.data_table.unwrap();

        assert_eq!(table.header, vec!["Subj", "group", "session", "valence", "InputFile"]);
        assert_eq!(table.rows.len(), 4);
        let stats = stats_prefix(dir.path(), "sub-01", 1, "image").display().to_string();
        assert_eq!(
            table.rows[0],
            vec![
                "sub-01".to_string(),
                "control".to_string(),
                "ses-1".to_string(),
                "neg".to_string(),
                format!("{stats}[neg#0_Coef]"),
            ]
        );
        assert_eq!(inputs.subjects, vec!["sub-01", "sub-02"]);
        assert_eq!(inputs.masks.len(), 2);
        assert_eq!(inputs.excluded, vec![Exclusion::new("sub-03", "no first-level results found")]);
        assert!(table.to_tsv().starts_with("Subj\tgroup\tsession\tvalence\tInputFile\n"));
    }

    #[test]
    fn test_missing_column_is_na() {
        let dir = tempfile::tempdir().unwrap();
        let config = roster(dir.path());
        touch_head(&mask_prefix(dir.path(), "sub-01", 1));
        touch_head(&stats_prefix(dir.path(), "sub-01", 1, "image"));
        let mut model = lmer_model();
        model.table_columns.push("age".to_string());

        let table = assemble(&config, "image", &model, &HashMap::new()).unwrap().data_table.unwrap();
        assert_eq!(table.rows[0][4], "NA");
    }

    #[test]
    fn test_ttest_set_a_and_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let config = roster(dir.path());
        for id in ["sub-01", "sub-02", "sub-03"] {
            touch_head(&mask_prefix(dir.path(), id, 1));
            touch_head(&stats_prefix(dir.path(), id, 1, "image"));
        }
        let exclusions = HashMap::from([("sub-02".to_string(), "pipeline aborted at 'glm:image'".to_string())]);

        let inputs = assemble(&config, "image", &ttest_model(), &exclusions).unwrap();

        assert_eq!(inputs.subjects, vec!["sub-01", "sub-03"]);
        assert_eq!(inputs.set_a.len(), 2);
        assert!(inputs.set_a[0].1.ends_with("stats.sub-01_image+tlrc[neg#0_Coef]"));
        assert_eq!(inputs.excluded[0].subject, "sub-02");
        assert!(inputs.masks.iter().all(|m| !m.to_string_lossy().contains("sub-02")));
    }

    #[test]
    fn test_no_masks_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let err = assemble(&roster(dir.path()), "image", &ttest_model(), &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("No mask files found"));
    }

    #[test]
    fn test_everyone_excluded_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let config = roster(dir.path());
        let exclusions: HashMap<_, _> = config
            .subject_ids()
            .into_iter()
            .map(|id| (id, "aborted".to_string()))
            .collect();

        let err = assemble(&config, "image", &ttest_model(), &exclusions).unwrap_err();
        assert!(err.to_string().contains("No subjects to process"));
    }
}
