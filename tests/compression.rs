use anyhow::Result;
use ironframe::io::compression::codec_for_path;
use ironframe::prelude::*;
use ironframe::testing::*;
use std::fs;

fn compressed_extensions() -> Vec<&'static str> {
    let mut exts = Vec::new();
    if cfg!(feature = "compression-gzip") {
        exts.push("gz");
    }
    if cfg!(feature = "compression-zstd") {
        exts.push("zst");
    }
    if cfg!(feature = "compression-bzip2") {
        exts.push("bz2");
    }
    if cfg!(feature = "compression-xz") {
        exts.push("xz");
    }
    exts
}

#[test]
fn extensions_select_codecs() {
    #[cfg(feature = "compression-gzip")]
    assert_eq!(codec_for_path("a/b.csv.gz").as_deref(), Some("gzip"));
    #[cfg(feature = "compression-zstd")]
    assert_eq!(codec_for_path("b.jsonl.zst").as_deref(), Some("zstd"));
    assert_eq!(codec_for_path("plain.csv"), None);
}

#[cfg(feature = "io-csv")]
#[test]
fn csv_round_trips_through_every_codec() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let orders = orders_fixture(500, 3);
    for ext in compressed_extensions() {
        let path = dir.path().join(format!("orders.csv.{ext}"));
        write_csv(&orders, &path)?;
        // the payload on disk is not plain text
        assert!(!fs::read(&path)?.starts_with(b"id,region"), "{ext}");
        assert_tables_equal(&read_csv(&path, CsvOptions::default())?, &orders);
    }
    Ok(())
}

#[cfg(feature = "io-jsonl")]
#[test]
fn jsonl_round_trips_through_every_codec() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let orders = orders_fixture(200, 2);
    for ext in compressed_extensions() {
        let path = dir.path().join(format!("orders.jsonl.{ext}"));
        write_jsonl(&orders, &path)?;
        let back = read_jsonl(&path, JsonlOptions::default().with_schema(orders.schema()))?;
        assert_tables_equal(&back, &orders);
    }
    Ok(())
}

#[cfg(all(feature = "io-csv", feature = "compression-gzip"))]
#[test]
fn magic_bytes_detect_compression_without_an_extension() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let compressed = dir.path().join("sales.csv.gz");
    write_csv(&sales_fixture(), &compressed)?;
    let disguised = dir.path().join("sales.data");
    fs::rename(&compressed, &disguised)?;

    let back = read_csv(&disguised, CsvOptions::default())?;
    assert_tables_equal(&back, &sales_fixture());
    Ok(())
}
