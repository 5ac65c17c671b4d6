// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use blueprint_lint::*;

use std::fs;
use std::path::{Path, PathBuf};

const BLUEPRINT: &str = r#"
blueprint:
  name: Fan Control Pro v2.0.1
  description: Run the fan while humidity is high.
  domain: automation
  input:
    humidity_sensor:
      selector:
        entity:
          domain: sensor
    fan:
      selector:
        entity:
          domain: fan
variables:
  blueprint_version: "2.0.1"
  humidity_sensor: !input humidity_sensor
  fan: !input fan
  humidity: "{{ states(humidity_sensor) | float(0) }}"
trigger:
  - platform: numeric_state
    entity_id: !input humidity_sensor
    above: 70
action:
  - service: fan.turn_on
    target:
      entity_id: !input fan
"#;

const BROKEN: &str = r#"
blueprint:
  name: Broken v1.0.0
  description: Reads a variable before it is defined.
  domain: automation
  input: {}
variables:
  blueprint_version: "1.0.0"
  total: "{{ part + 1 }}"
  part: "{{ 2 }}"
trigger:
  - platform: time
    at: "07:00:00"
action:
  - service: notify.notify
    data:
      message: "{{ total }}"
"#;

fn write(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, contents)?;
    Ok(path)
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[test]
fn documentation_files_are_expected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write(dir.path(), "fan_control_pro.yaml", BLUEPRINT)?;
    let engine = Engine::new();

    let report = engine.validate_file(&path)?;
    assert!(report.is_valid());
    let warnings: Vec<String> = report.warnings().map(|d| d.to_string()).collect();
    let name = dir_name(dir.path());
    assert_eq!(
        warnings,
        vec![
            format!("No README.md found in {name}/ directory"),
            format!("No CHANGELOG.md found in {name}/ directory"),
        ]
    );

    write(dir.path(), "README.md", "# Fan Control Pro\n")?;
    write(dir.path(), "CHANGELOG.md", "## 2.0.1\n")?;
    let report = engine.validate_file(&path)?;
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    assert!(report.render_text().ends_with("Blueprint is valid!\n"));
    Ok(())
}

#[test]
fn documentation_check_can_be_disabled() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write(dir.path(), "fan_control_pro.yaml", BLUEPRINT)?;
    let config = Config {
        check_documentation: false,
        ..Config::default()
    };
    let report = Engine::with_config(config).validate_file(&path)?;
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    Ok(())
}

#[test]
fn forward_reference_fails_validation() -> Result<()> {
    let report = Engine::new().validate_str("broken.yaml", BROKEN);
    assert!(!report.is_valid());
    let errors: Vec<&Diagnostic> = report.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].category, Category::References);
    assert_eq!(errors[0].path, "variables.total");
    assert!(errors[0]
        .message
        .starts_with("Variable 'total' references 'part' which is defined later"));

    let text = report.render_text();
    assert!(text.starts_with("Validating: broken.yaml\n"));
    assert!(text.ends_with("Blueprint validation failed with 1 errors\n"));
    Ok(())
}

#[test]
fn validation_is_repeatable() {
    let engine = Engine::new();
    assert_eq!(
        engine.validate_str("broken.yaml", BROKEN),
        engine.validate_str("broken.yaml", BROKEN)
    );
}

#[test]
fn extra_builtins_from_config() -> Result<()> {
    let doc = BLUEPRINT.replace(
        "  humidity: \"{{ states(humidity_sensor) | float(0) }}\"",
        "  humidity: \"{{ states(humidity_sensor) | float(0) + site_offset }}\"",
    );
    let report = Engine::new().validate_str("fan.yaml", doc.as_str());
    let errors: Vec<String> = report.errors().map(|d| d.to_string()).collect();
    assert_eq!(errors, vec!["variables.humidity: Undefined reference to 'site_offset'."]);

    let config = Config::from_yaml_str("extra_builtins: [site_offset]\n")?;
    let report = Engine::with_config(config).validate_str("fan.yaml", doc.as_str());
    assert!(report.is_valid());
    Ok(())
}

#[test]
fn helper_prefix_from_config() -> Result<()> {
    let doc = BLUEPRINT.replace(
        "  humidity: \"{{ states(humidity_sensor) | float(0) }}\"\n",
        "  tmp_raw: \"{{ states(humidity_sensor) | float(0) }}\"\n  \
         tmp_scaled: \"{{ tmp_raw * 1.1 }}\"\n  \
         humidity: \"{{ tmp_scaled | round(1) }}\"\n",
    );
    let chain_warnings = |config: Config| {
        Engine::with_config(config)
            .validate_str("fan.yaml", doc.as_str())
            .warnings()
            .filter(|d| d.message.contains("chain of helper variables"))
            .count()
    };
    assert_eq!(chain_warnings(Config::default()), 0);
    assert_eq!(chain_warnings(Config::from_yaml_str("helper_prefix: tmp_\n")?), 1);
    Ok(())
}

#[test]
fn config_file_next_to_blueprints() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write(
        dir.path(),
        ".blueprint-lint.yaml",
        "# project settings\ncheck_documentation: false\nnonzero_constants: [pi, e, tau, gain]\n",
    )?;
    let config = Config::load(None, dir.path())?;
    assert!(!config.check_documentation);
    assert!(config.nonzero_constants.contains(&"gain".to_string()));

    let explicit = write(dir.path(), "other.yaml", "min_helper_chain: 3\n")?;
    let config = Config::load(Some(explicit.as_path()), dir.path())?;
    assert_eq!(config.min_helper_chain, 3);
    assert!(config.check_documentation);

    let bad = write(dir.path(), "bad.yaml", "helper_prefix: \"\"\n")?;
    assert!(matches!(
        Config::load(Some(bad.as_path()), dir.path()),
        Err(ConfigError::Invalid { field: "helper_prefix", .. })
    ));
    Ok(())
}

#[test]
fn unreadable_yaml_is_reported() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write(dir.path(), "blueprint.yaml", "blueprint: [unclosed\n")?;
    let report = Engine::new().validate_file(&path)?;
    assert_eq!(report.name, path.to_string_lossy());
    let errors: Vec<&Diagnostic> = report.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].category, Category::Syntax);

    assert!(Engine::new()
        .validate_file(dir.path().join("missing.yaml"))
        .is_err());
    Ok(())
}

#[test]
fn batch_over_discovered_blueprints() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write(dir.path(), "fans/fan_control_pro.yaml", BLUEPRINT)?;
    write(dir.path(), "notify/blueprint.yaml", BROKEN)?;
    write(dir.path(), "notify/notes.yaml", "not: a blueprint\n")?;
    write(dir.path(), "venv/lib/blueprint.yaml", BROKEN)?;

    let config = Config {
        check_documentation: false,
        ..Config::default()
    };
    let files = find_blueprints(dir.path(), &config)?;
    assert_eq!(files.len(), 2);

    let engine = Engine::with_config(config);
    let mut summary = Summary::new();
    let mut reports = vec![];
    for file in &files {
        let report = engine.validate_file(file)?;
        summary.add(&report);
        reports.push(report);
    }
    assert_eq!((summary.total(), summary.passed(), summary.failed()), (2, 1, 1));
    assert!(!summary.is_success());

    let json: serde_json::Value = serde_json::from_str(&summary.to_json(&reports)?)?;
    assert_eq!(json["total"], 2);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["reports"][0]["valid"], true);
    assert_eq!(json["reports"][1]["valid"], false);
    assert_eq!(json["reports"][1]["errors"][0]["path"], "variables.total");
    Ok(())
}
