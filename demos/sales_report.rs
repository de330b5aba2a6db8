//! End-to-end sales report.
//!
//! Demonstrates:
//! - Writing and lazily scanning a compressed CSV
//! - Normalizing types, deriving columns, filtering and grouping
//! - Inspecting the optimized plan with `explain`
//! - Materializing to Parquet and reading it back
//!
//! Run with: cargo run --example sales_report

use anyhow::Result;
use ironframe::config::EngineConfig;
use ironframe::prelude::*;
use ironframe::testing::orders_fixture;

fn main() -> Result<()> {
    ironframe::logging::init();
    let cfg = EngineConfig::from_env()?;

    let dir = tempfile::tempdir()?;
    let raw = dir.path().join("orders.csv.gz");
    write_csv(&orders_fixture(50_000, 6), &raw)?;
    println!("📥 Wrote sample orders to {}\n", raw.display());

    // =============================================================================
    // Build the plan. Nothing is read until `collect` or `sink_*`.
    // =============================================================================
    let declared = Schema::new(vec![
        Field::new("id", DataType::Int64).non_null(),
        Field::new("region", DataType::Categorical),
    ])?;
    let report = scan_csv(&raw, cfg.csv_options())?
        .normalize(declared)
        .with_columns([
            (col("qty") * col("price")).alias("revenue"),
            col("day").day().alias("day_of_month"),
        ])
        .filter(col("paid"))
        .filter(col("region").is_not_null())
        .group_by(["region"])
        .agg([
            col("revenue").sum(),
            col("revenue").mean().alias("avg_order"),
            col("id").count().alias("orders"),
            col("day_of_month").n_unique().alias("active_days"),
        ])
        .sort_by([col("revenue")], [true]);

    println!("{}", report.explain()?);

    // =============================================================================
    // Materialize.
    // =============================================================================
    let out = dir.path().join("report.parquet");
    let table = report.collect_with(cfg.exec_options())?;
    let rows = write_parquet(&table, &out)?;
    println!("📊 {rows} regions written to {}\n", out.display());

    let back = read_parquet(&out)?;
    println!("{back}");

    let top = back.head(1);
    if let Ok(region) = top.column("region") {
        println!("🏆 Top region: {}", region.get(0));
    }
    Ok(())
}
