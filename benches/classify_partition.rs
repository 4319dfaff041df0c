use std::fmt::Write as _;

use chrono::NaiveDate;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use landing_quality::batch::{RunContext, process_file};
use landing_quality::classify::classify;
use landing_quality::partition::partition;
use landing_quality::schema::{
    ColumnSpec, ColumnType, CsvHints, SpreadsheetHints, TableParams, TableSchema,
};
use landing_quality::structure::{self, ParsedTable};

fn params() -> TableParams {
    let schema = TableSchema::load(vec![
        ColumnSpec::new("id", ColumnType::Integer)
            .required()
            .unique_key(),
        ColumnSpec::new("amount", ColumnType::Float).with_separators(Some(' '), Some(',')),
        ColumnSpec::new("ordered_at", ColumnType::Date)
            .required()
            .with_date_format("%d/%m/%Y"),
        ColumnSpec::new("status", ColumnType::String),
    ])
    .expect("schema");
    TableParams {
        source_path: "landing/orders/".to_string(),
        schema,
        csv: CsvHints {
            delimiter: b';',
            ..CsvHints::default()
        },
        xlsx: SpreadsheetHints::default(),
        xlsm: SpreadsheetHints::default(),
    }
}

fn generate_orders(rows: usize) -> String {
    let mut csv = String::from("id;amount;ordered_at;status\n");
    for i in 0..rows {
        // every 50th id repeats, every 97th amount and every 89th date are broken
        let id = if i % 50 == 49 { i - 1 } else { i };
        let amount = if i % 97 == 0 {
            "n/a".to_string()
        } else {
            format!("{} {:03},{}", i / 1000 + 1, i % 1000, i % 10)
        };
        let day = if i % 89 == 0 { 31 } else { (i % 28) + 1 };
        let status = match i % 3 {
            0 => "shipped",
            1 => "",
            _ => "pending",
        };
        let _ = writeln!(csv, "{id};{amount};{day:02}/02/2024;{status}");
    }
    csv
}

fn context() -> RunContext {
    let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
        .expect("date")
        .and_hms_opt(0, 0, 0)
        .expect("time");
    RunContext::new("0_landing_to_raw", "raw", "orders", ts)
}

fn bench_classify_partition(c: &mut Criterion) {
    let params = params();
    let context = context();
    let bytes = generate_orders(50_000).into_bytes();
    let table: ParsedTable = structure::check("landing/orders/o.csv", &bytes, &params, &context)
        .table
        .expect("generated file is structurally valid");

    let mut group = c.benchmark_group("row_quality");

    group.bench_function("classify", |b| {
        b.iter(|| classify(&table, &params.schema));
    });

    group.bench_function("classify_and_partition", |b| {
        b.iter(|| {
            let violations = classify(&table, &params.schema);
            partition(&table, &params.schema, &violations, &context)
        });
    });

    group.bench_function("process_file", |b| {
        b.iter_batched(
            || bytes.clone(),
            |input| process_file("landing/orders/o.csv", &input, &params, &context),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_classify_partition);
criterion_main!(benches);
