//! Input fixtures written to temporary directories.

use crate::alignment::{EventCode, ExperimentDesign};
use crate::config::{GltCode, GroupModel, GroupModelKind};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes an ERA-style table covering every run of `design`.
///
/// Row `i` carries code `event_codes[(i / occurrences_per_code) % n]`,
/// a global mean of `global_mean(i)` and the given tonic baseline, so each
/// run block holds every tracked code `occurrences_per_code` times in a row.
pub fn write_era_table(
    dir: &Path,
    design: &ExperimentDesign,
    global_mean: impl Fn(u32) -> f64,
    tonic: f64,
) -> PathBuf {
    let codes = &design.event_codes;
    let mut text = String::from("Event.Nr\tEvent.Name\tGlobal.Mean\tCDA.Tonic\n");
    for i in 0..design.expected_rows() {
        let code = codes[(i / design.occurrences_per_code) % codes.len()];
        let row = u32::try_from(i).unwrap();
        writeln!(text, "{}\t{code}\t{}\t{tonic}", i + 1, global_mean(row)).unwrap();
    }

    let path = dir.join(format!("{}_era.txt", design.name));
    fs::write(&path, text).unwrap();
    path
}

/// Writes `{prefix}_task-<task>_run-<run>_events.tsv` with the given
/// `(condition, onset)` rows.
pub fn write_events(
    dir: &Path,
    prefix: &str,
    design: &ExperimentDesign,
    run: usize,
    onsets: &[(EventCode, f64)],
) -> PathBuf {
    let mut text = String::from("onset\tduration\tcondition\n");
    for (code, onset) in onsets {
        writeln!(text, "{onset}\t1.0\t{code}").unwrap();
    }

    let path = dir.join(format!("{prefix}_{}", design.events_suffix(run)));
    fs::write(&path, text).unwrap();
    path
}

/// Creates the `.HEAD` half of a dataset so it counts as present.
pub fn touch_head(prefix: &Path) {
    if let Some(parent) = prefix.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut head = prefix.as_os_str().to_owned();
    head.push(".HEAD");
    fs::write(head, "").unwrap();
}

/// A two-group mixed-effects model over session 1 with a valence factor.
#[must_use]
pub fn lmer_model() -> GroupModel {
    let row = |valence: &str| {
        let mut table = toml::Table::new();
        table.insert("valence".to_string(), toml::Value::String(valence.to_string()));
        table.insert("contrast".to_string(), toml::Value::String(format!("{valence}#0_Coef")));
        table
    };

    let mut model = GroupModel::new("lme", GroupModelKind::Lmer);
    model.groups = vec!["control".to_string(), "patient".to_string()];
    model.sessions = vec![1];
    model.table_columns = vec!["group".to_string(), "session".to_string(), "valence".to_string()];
    model.data_table_rows = vec![row("neg"), row("pos")];
    model.model = Some("group*valence+(1|Subj)".to_string());
    model.glt = vec![GltCode {
        label: "neg_vs_pos".to_string(),
        sym: "valence : 1*neg -1*pos".to_string(),
    }];
    model
}

/// A one-sample t-test over both groups in session 1.
#[must_use]
pub fn ttest_model() -> GroupModel {
    let mut model = GroupModel::new("ttest", GroupModelKind::TTest);
    model.groups = vec!["control".to_string(), "patient".to_string()];
    model.sessions = vec![1];
    model.set_a_label = Some("all".to_string());
    model.contrast = Some("neg#0_Coef".to_string());
    model
}
