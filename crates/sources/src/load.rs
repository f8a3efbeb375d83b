use super::merge;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read configuration {path:?}")]
    Fetch {
        path: PathBuf,
        #[source]
        detail: std::io::Error,
    },
    #[error("failed to parse YAML (location {:?})", .0.location())]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to merge YAML alias nodes")]
    YamlMerge(#[from] yaml_merge_keys::MergeKeyError),
}

/// Read and parse a single YAML configuration document. YAML merge-key
/// aliases (`<<:`) are resolved before the document is converted into its
/// JSON form, which all later phases operate on.
pub fn load_file(path: &Path) -> Result<Value, LoadError> {
    let content = std::fs::read(path).map_err(|detail| LoadError::Fetch {
        path: path.to_path_buf(),
        detail,
    })?;

    let dom: serde_yaml::Value = serde_yaml::from_slice(&content)?;
    let dom = yaml_merge_keys::merge_keys_serde(dom)?;
    let dom: Value = serde_yaml::from_value(dom)?;
    Ok(dom)
}

/// Load the root document and all of its extensions, and compose them.
///
/// Extensions are the `extra` paths given on the command line, followed by
/// the root's `flow.extends` entries (resolved relative to the root
/// document's directory). Merging folds in reverse order, so that later
/// extensions apply beneath earlier ones and the root overlays everything.
pub fn load(root: &Path, extra: &[PathBuf]) -> Result<Value, LoadError> {
    let root_doc = load_file(root)?;

    let base_dir = root.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut paths: Vec<PathBuf> = extra.to_vec();
    for ext in extends_of(&root_doc) {
        paths.push(base_dir.join(ext));
    }

    let mut merged = Value::Null;
    for path in paths.iter().rev() {
        tracing::debug!(path = %path.display(), "loading configuration extension");
        merged = merge::overlay(load_file(path)?, merged);
    }
    Ok(merge::overlay(root_doc, merged))
}

/// The `flow.extends` entries of a parsed document. This phase is tolerant:
/// a malformed extends section is left for strict validation to report.
fn extends_of(doc: &Value) -> Vec<String> {
    let Some(extends) = doc.pointer("/flow/extends") else {
        return Vec::new();
    };
    match extends.as_array() {
        Some(entries) => entries
            .iter()
            .filter_map(|entry| entry.as_str().map(str::to_string))
            .collect(),
        None => {
            tracing::warn!("flow.extends is not a list and was ignored");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_with_merge_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "flow.yaml",
            r#"
common: &common
  enabled: true
inputs:
  - type: constant
    <<: *common
    tasks: []
"#,
        );

        let doc = load_file(&path).unwrap();
        assert_eq!(
            doc["inputs"][0],
            json!({"type": "constant", "enabled": true, "tasks": []})
        );
    }

    #[test]
    fn test_load_extends_beneath_root() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "base.yaml",
            "flow:\n  settings:\n    run_once: true\n    log_level: 4\n",
        );
        let root = write_file(
            dir.path(),
            "flow.yaml",
            "flow:\n  extends: [base.yaml]\n  settings:\n    log_level: 2\n",
        );

        let doc = load(&root, &[]).unwrap();

        // The root's fields win; the extension supplies base defaults.
        assert_eq!(doc["flow"]["settings"]["log_level"], json!(2));
        assert_eq!(doc["flow"]["settings"]["run_once"], json!(true));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, LoadError::Fetch { .. }));
    }
}
