use anyhow::Result;
use ironframe::config::{EngineConfig, Mode};
use ironframe::prelude::*;
use ironframe::testing::*;
use std::collections::HashMap;

#[test]
fn config_drives_a_run() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_text_fixture(
        dir.path(),
        "engine.json",
        r#"{ "mode": "sequential", "batch_size": 16, "max_rows": 40 }"#,
    )?;
    let cfg = EngineConfig::from_json_file(&path)?;
    assert_eq!(cfg.mode, Mode::Sequential);

    let orders = orders_fixture(100, 2);
    let err = orders.lazy().collect_with(cfg.exec_options()).unwrap_err();
    assert!(
        matches!(err.downcast_ref::<FrameError>(), Some(FrameError::Cancelled(_))),
        "{err:#}"
    );

    let relaxed = cfg.with_env_overrides(|key| (key == "MAX_ROWS").then(|| "none".to_string()))?;
    assert_eq!(orders.lazy().collect_with(relaxed.exec_options())?.height(), 100);
    Ok(())
}

#[cfg(feature = "io-csv")]
#[test]
fn inference_length_flows_into_reader_options() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut body = String::from("v\n");
    for i in 0..150 {
        body.push_str(&format!("{i}\n"));
    }
    body.push_str("late text\n");
    let path = write_text_fixture(dir.path(), "late.csv", &body)?;

    let vars: HashMap<&str, &str> = [("INFER_SCHEMA_LENGTH", "none")].into();
    let whole_file =
        EngineConfig::default().with_env_overrides(|k| vars.get(k).map(ToString::to_string))?;
    let t = read_csv(&path, whole_file.csv_options())?;
    assert_eq!(t.column("v")?.dtype(), DataType::Utf8);

    let sampled = EngineConfig::default();
    assert!(read_csv(&path, sampled.csv_options()).is_err());
    Ok(())
}

#[test]
fn logging_init_is_idempotent() {
    let first = ironframe::logging::init();
    let second = ironframe::logging::init();
    assert!(!(first && second));
}
