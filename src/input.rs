use std::fs;

use camino::Utf8Path;
use serde::Serialize;

use crate::error::RetrieverError;
use crate::report::Diagnostics;

const DATASET_NAMES: [&str; 3] = ["dataset", "dataset_name", "dataset_id"];
const TARGET_NAMES: [&str; 3] = ["target_directory", "target_dir", "subdirectory"];
const PATTERN_NAMES: [&str; 2] = ["file_pattern", "pattern"];
const NEW_NAME_NAMES: [&str; 2] = ["new_name", "rename"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputRow {
    pub line: usize,
    pub dataset: String,
    pub target_directory: Option<String>,
    pub file_pattern: String,
    pub new_name: Option<String>,
}

pub fn read_input_file(
    path: &Utf8Path,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<InputRow>, RetrieverError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|_| RetrieverError::InputRead(path.as_std_path().to_path_buf()))?;
    parse_input(&content, diagnostics)
}

pub fn parse_input(
    content: &str,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<InputRow>, RetrieverError> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.trim_start().starts_with('#'));

    let Some((_, header)) = lines.next() else {
        return Err(RetrieverError::InputParse("input file is empty".to_string()));
    };
    let headers = header.split('\t').map(str::trim).collect::<Vec<_>>();
    let column = |names: &[&str]| {
        headers
            .iter()
            .position(|header| names.iter().any(|name| header.eq_ignore_ascii_case(name)))
    };

    let dataset_col = column(&DATASET_NAMES).ok_or_else(|| {
        RetrieverError::InputParse(format!(
            "header must contain a dataset column ({})",
            DATASET_NAMES.join(", ")
        ))
    })?;
    let target_col = column(&TARGET_NAMES);
    let pattern_col = column(&PATTERN_NAMES);
    let new_name_col = column(&NEW_NAME_NAMES);

    let mut rows = Vec::new();
    for (idx, line) in lines {
        let fields = line.split('\t').map(str::trim).collect::<Vec<_>>();
        let field = |col: Option<usize>| {
            col.and_then(|col| fields.get(col))
                .filter(|value| !value.is_empty())
                .map(|value| value.to_string())
        };
        let Some(dataset) = field(Some(dataset_col)) else {
            diagnostics.warning(format!("input line {}: empty dataset name, skipping", idx + 1));
            continue;
        };
        rows.push(InputRow {
            line: idx + 1,
            dataset,
            target_directory: field(target_col),
            file_pattern: field(pattern_col).unwrap_or_else(|| "*".to_string()),
            new_name: field(new_name_col),
        });
    }
    Ok(rows)
}
