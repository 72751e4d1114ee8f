use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pdf_overlay_renderer::{
    content_disposition, normalize, substitute_placeholders, Config, Disposition, PdfEditor,
    RawParams,
};
use std::time::Duration;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

fn letter_pdf(pages: usize, height: f32, text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::new();
    for _ in 0..pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![36.into(), 36.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), Object::Real(height)],
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! { "Type" => "Pages", "Kids" => kids, "Count" => count }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save pdf");
    bytes
}

fn benchmark_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    configure_fast_group(&mut group);

    let config = Config::default();
    let params: RawParams = [
        ("url", "example.com/reports/q3.html"),
        ("type", "pdf"),
        ("displayHeaderFooter", "true"),
        ("fullHtmlFooter", "<p>{pageNumber} / {totalPages}</p>"),
        ("marginTop", "20mm"),
        ("marginBottom", "1in"),
        ("format", "A4"),
        ("scale", "0.9"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    group.bench_function("pdf_request", |b| {
        b.iter(|| {
            let request = normalize(black_box(&params), &config);
            let _ = black_box(request);
        });
    });

    group.finish();
}

fn benchmark_placeholders(c: &mut Criterion) {
    let mut group = c.benchmark_group("placeholders");
    configure_fast_group(&mut group);

    let template = "<div style='display:flex'><span>ACME</span>\
                    <span>Page {pageNumber} of {totalPages}</span></div>";

    group.bench_function("substitute", |b| {
        b.iter(|| black_box(substitute_placeholders(black_box(template), 7, 120)));
    });

    group.finish();
}

fn benchmark_content_disposition(c: &mut Criterion) {
    let mut group = c.benchmark_group("content_disposition");
    configure_fast_group(&mut group);

    group.bench_function("ascii", |b| {
        b.iter(|| black_box(content_disposition("quarterly-report.pdf", Disposition::Attachment)));
    });
    group.bench_function("unicode", |b| {
        b.iter(|| black_box(content_disposition("résumé-übersicht.pdf", Disposition::Inline)));
    });

    group.finish();
}

fn benchmark_stamping(c: &mut Criterion) {
    let mut group = c.benchmark_group("stamping");
    configure_fast_group(&mut group);

    let base = letter_pdf(50, 792.0, "body");
    let header = letter_pdf(1, 60.0, "header");
    let footer = letter_pdf(1, 40.0, "footer");

    // Static header imported once, footer re-imported per page.
    group.bench_function("50_pages_header_and_footer", |b| {
        b.iter(|| {
            let mut editor = PdfEditor::load(&base).expect("load base");
            let pages = editor.pages().to_vec();
            let mut header_form = None;

            for page in &pages {
                let mut edit = editor.edit_page(page.index).expect("edit page");
                let form = match header_form {
                    Some(form) => form,
                    None => {
                        let form = edit.import_overlay(&header).expect("import header");
                        header_form = Some(form);
                        form
                    }
                };
                edit.overlay(form, 0.0, -page.height + form.height);

                let footer_form = edit.import_overlay(&footer).expect("import footer");
                edit.overlay(footer_form, 0.0, 0.0);
                edit.end().expect("end page");
            }

            black_box(editor.finish().expect("finish"))
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_normalize,
    benchmark_placeholders,
    benchmark_content_disposition,
    benchmark_stamping
);
criterion_main!(benches);
