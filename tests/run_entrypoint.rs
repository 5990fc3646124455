//! Exercises the extracted CLI entrypoint end to end: config file on disk,
//! builtin registry, real SQLite store. Sources that cannot be resolved
//! must surface in the report instead of failing the run.

use std::fs::write;

use serial_test::serial;
use tempfile::tempdir;

use llm_harvest::{run, Cli, Commands};

#[tokio::test]
#[serial]
async fn run_reports_unresolvable_sources_without_erroring() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config_path = dir.path().join("config.yaml");

    let config_yaml = format!(
        r#"
database:
  path: {}

sources:
  - name: mystery
    connector: carrier-pigeon
"#,
        db_path.display()
    );
    write(&config_path, config_yaml).unwrap();

    let cli = Cli {
        command: Commands::Run {
            config: config_path,
            log_level: Some("warn".to_string()),
            no_cache: true,
        },
    };

    let report = run(cli).await.expect("the run itself must not fail");

    assert_eq!(report.sources.len(), 1);
    assert_eq!(report.sources[0].source, "mystery");
    assert_eq!(report.sources[0].error.as_ref().unwrap().stage(), "resolve");
    assert!(!report.is_clean());

    // The repository was still created and released cleanly.
    assert!(db_path.exists());
}

#[tokio::test]
#[serial]
async fn run_rejects_a_config_without_sources() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    write(&config_path, "database:\n  path: ./x.db\nsources: []\n").unwrap();

    let cli = Cli {
        command: Commands::Run {
            config: config_path,
            log_level: None,
            no_cache: true,
        },
    };

    let err = run(cli).await.unwrap_err();
    assert!(err.to_string().contains("no sources"));
}
