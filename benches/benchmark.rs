use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;
use url::Url;
use webcam_harvester::{
    sanitize_camera_name, select_tasks, CameraSelector, Fingerprint, IndexParser, SelectorItem,
};

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

/// Index page shaped like the real one: 20 tables of 6 cameras each.
fn synthetic_index() -> String {
    let mut html = String::from("<html><body>");
    for table in 0..20 {
        html.push_str(r#"<table class="table table-striped table-bordered"><tr>"#);
        for cam in 0..6 {
            html.push_str(&format!("<td>Σταθμός {table}-{cam}</td>"));
        }
        html.push_str("</tr><tr>");
        for cam in 0..6 {
            html.push_str(&format!(r#"<td><img src="/webcams/{table}_{cam}.jpg"></td>"#));
        }
        html.push_str("</tr></table>");
    }
    html.push_str("</body></html>");
    html
}

fn benchmark_index_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_parsing");
    configure_fast_group(&mut group);

    let html = synthetic_index();
    let base = Url::parse("http://meteo.gr/webcameras.cfm").unwrap();
    let parser = IndexParser::new().unwrap();

    group.bench_function("parse_120_cameras", |b| {
        b.iter(|| {
            let catalog = parser.parse(black_box(&html), &base);
            black_box(catalog);
        });
    });

    group.finish();
}

fn benchmark_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");
    configure_fast_group(&mut group);

    let base = Url::parse("http://meteo.gr/webcameras.cfm").unwrap();
    let catalog = IndexParser::new().unwrap().parse(&synthetic_index(), &base);
    let include = CameraSelector::List(vec![
        SelectorItem::Name("Σταθμός 3-2".to_string()),
        SelectorItem::Index(10),
        SelectorItem::Index(99),
    ]);
    let exclude = CameraSelector::from_tokens(&["10"]);

    group.bench_function("all", |b| {
        b.iter(|| black_box(select_tasks(&catalog, None, None)));
    });

    group.bench_function("include_exclude", |b| {
        b.iter(|| black_box(select_tasks(&catalog, Some(&include), exclude.as_ref())));
    });

    group.finish();
}

fn benchmark_name_sanitization(c: &mut Criterion) {
    let mut group = c.benchmark_group("name_sanitization");
    configure_fast_group(&mut group);

    let names = vec![
        "000.North Pier",
        "014.Θεσσαλονίκη - Λιμάνι",
        "027.Χανιά/Παλιό Λιμάνι",
        "031.What? <Cam>. ",
    ];

    group.bench_function("sanitize", |b| {
        b.iter(|| {
            for name in &names {
                black_box(sanitize_camera_name(name));
            }
        });
    });

    group.finish();
}

fn benchmark_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    configure_fast_group(&mut group);

    // Typical webcam JPEG size
    let frame: Vec<u8> = (0..256 * 1024u32).map(|i| (i % 251) as u8).collect();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.jpg");
    std::fs::write(&path, &frame).unwrap();

    group.bench_function("bytes_256k", |b| {
        b.iter(|| black_box(Fingerprint::of_bytes(black_box(&frame))));
    });

    group.bench_function("file_256k", |b| {
        b.iter(|| black_box(Fingerprint::of_file(&path).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_index_parsing,
    benchmark_selection,
    benchmark_name_sanitization,
    benchmark_fingerprint,
);

criterion_main!(benches);
