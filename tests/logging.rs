//! Lossy conversions are reported as `warn` events.

use anyhow::Result;
use ironframe::prelude::*;
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().map_err(|_| std::io::Error::other("poisoned"))?.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        self.0
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }
}

/// Run `f` with a `warn`-level subscriber on this thread and return what it logged.
fn warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
    let sink = Captured::default();
    let writer = sink.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, sink.text())
}

#[test]
fn lenient_normalize_warns_about_dropped_values() -> Result<()> {
    let raw = Table::new(vec![Column::from_strs(
        "price",
        &[Some("10"), Some("ten"), None, Some("n/a")],
    )])?;
    let declared = Schema::new(vec![Field::new("price", DataType::Int64)])?;

    let (out, log) = warnings(|| raw.normalize(&declared));
    assert_eq!(out?.column("price")?.null_count(), 3);
    assert!(log.contains("WARN"), "{log}");
    assert!(log.contains("column=price"), "{log}");
    assert!(log.contains("count=2"), "{log}");

    let clean = Table::new(vec![Column::from_strs("price", &[Some("1"), None])])?;
    let (_, quiet) = warnings(|| clean.normalize(&declared));
    assert!(quiet.is_empty(), "{quiet}");
    Ok(())
}

#[cfg(feature = "io-jsonl")]
#[test]
fn jsonl_writer_warns_about_non_finite_floats() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("x.jsonl");
    let t = Table::new(vec![Column::from_f64(
        "x",
        vec![Some(1.0), Some(f64::NAN), Some(f64::INFINITY), None],
    )])?;

    let (written, log) = warnings(|| write_jsonl(&t, &path));
    assert_eq!(written?, 4);
    assert!(log.contains("column=x"), "{log}");
    assert!(log.contains("count=2"), "{log}");
    Ok(())
}
