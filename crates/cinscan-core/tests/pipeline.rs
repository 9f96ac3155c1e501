use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cinscan_core::{
    DateTriple, ErrorCategory, ExtractionOutcome, IdCardScanner, IdCardScannerBuilder, LanguageHint,
    MandatoryField, OcrError, RecognizedText, ScanConfig, ScanError, TextRecognizer,
};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage};
use pretty_assertions::assert_eq;

/// Returns `raw` on the first call of each scan and `processed` on the second.
struct ScriptedRecognizer {
    raw: &'static str,
    processed: &'static str,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    fn new(raw: &'static str, processed: &'static str) -> Self {
        Self {
            raw,
            processed,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(
        &self,
        _image: &DynamicImage,
        languages: &[LanguageHint],
    ) -> Result<RecognizedText, OcrError> {
        assert_eq!(
            languages,
            &[LanguageHint::French, LanguageHint::Arabic, LanguageHint::English]
        );
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RecognizedText::from(if n % 2 == 0 { self.raw } else { self.processed }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct BrokenRecognizer {
    calls: AtomicUsize,
}

impl TextRecognizer for BrokenRecognizer {
    fn recognize(
        &self,
        _image: &DynamicImage,
        _languages: &[LanguageHint],
    ) -> Result<RecognizedText, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(OcrError::EngineUnavailable("no traineddata for ara".to_string()))
    }
}

fn card_png() -> Vec<u8> {
    let img = RgbImage::from_fn(48, 32, |x, y| {
        if (y % 10) < 2 && (x % 16) < 11 {
            Rgb([25, 25, 35])
        } else {
            Rgb([220, 214, 200])
        }
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

fn scanner<R: TextRecognizer>(recognizer: R) -> IdCardScanner<R> {
    IdCardScannerBuilder::new().build(recognizer).unwrap()
}

#[test]
fn test_id_and_date_from_separate_passes() {
    let scanner = scanner(ScriptedRecognizer::new("AB123456", "Né le: 05.03.1990"));
    let record = scanner.process(&card_png(), "image/png").unwrap();

    assert!(record.success);
    assert_eq!(record.id_number, "AB123456");
    assert_eq!(record.birth_date, DateTriple::new(5, 3, 1990));
    assert_eq!(record.birth_date.to_string(), "05/03/1990");
    assert_eq!(record.raw_text, "AB123456");
    assert_eq!(record.processed_text, "Né le: 05.03.1990");
    assert_eq!(
        record.warnings,
        vec!["surname not found".to_string(), "given name not found".to_string()]
    );
    assert_eq!(scanner.recognizer().calls(), 2);
}

#[test]
fn test_out_of_range_year_fails_extraction() {
    let scanner = scanner(ScriptedRecognizer::new("CIN AB123456", "01.01.2999"));
    let err = scanner.process(&card_png(), "image/png").unwrap_err();

    assert!(err.is_soft());
    assert_eq!(err.category(), ErrorCategory::ExtractionFailure);
    assert_eq!(err.missing_fields(), &[MandatoryField::BirthDate]);

    let outcome = ExtractionOutcome::from(Err::<cinscan_core::IdentityRecord, _>(err));
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "ExtractionFailure");
    assert_eq!(json["missing_fields"], serde_json::json!(["birth_date"]));
}

#[test]
fn test_pdf_rejected_without_ocr() {
    let scanner = scanner(ScriptedRecognizer::new("AB123456", "05.03.1990"));
    let err = scanner.process(b"%PDF-1.7\n", "application/pdf").unwrap_err();

    assert!(matches!(err, ScanError::InvalidInput(_)));
    assert_eq!(scanner.recognizer().calls(), 0);
}

#[test]
fn test_name_line_after_numeric_line() {
    let scanner = scanner(ScriptedRecognizer::new("AB123456\n05.03.1990", "Dupont Marie"));
    let record = scanner.process(&card_png(), "image/png").unwrap();

    assert_eq!(record.given_name.as_deref(), Some("Dupont"));
    assert_eq!(record.surname.as_deref(), Some("Marie"));
    assert!(record.warnings.is_empty());
}

#[test]
fn test_repeated_scans_are_identical() {
    let scanner = scanner(ScriptedRecognizer::new(
        "ROYAUME DU MAROC\nbk 654321",
        "Sara El Amrani\nnée le 7-11-1985",
    ));
    let bytes = card_png();

    let first = serde_json::to_string(&scanner.scan(&bytes, "image/png")).unwrap();
    let second = serde_json::to_string(&scanner.scan(&bytes, "image/png")).unwrap();

    assert_eq!(first, second);
    assert!(first.contains("\"id_number\":\"BK654321\""));
    assert!(first.contains("\"birth_date\":\"07/11/1985\""));
}

#[test]
fn test_sixteen_bit_png_is_scanned() {
    let img = ImageBuffer::from_fn(32, 24, |x, _| {
        let v = if x % 8 < 3 { 4000u16 } else { 60000 };
        Rgb([v, v, v])
    });
    let bytes = encode(DynamicImage::ImageRgb16(img), ImageFormat::Png);

    let scanner = scanner(ScriptedRecognizer::new("AB123456", "Né le: 05.03.1990"));
    let record = scanner.process(&bytes, "image/png").unwrap();

    assert_eq!(record.id_number, "AB123456");
    assert_eq!(scanner.recognizer().calls(), 2);
}

#[test]
fn test_content_wins_over_declared_type() {
    let scanner = scanner(ScriptedRecognizer::new("AB123456", "Né le: 05.03.1990"));
    let record = scanner.process(&card_png(), "image/jpeg").unwrap();
    assert_eq!(record.id_number, "AB123456");

    // Sniffed content outside the allow-list is still rejected.
    let bmp = encode(DynamicImage::new_rgb8(8, 8), ImageFormat::Bmp);
    let err = scanner.process(&bmp, "image/png").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidInputFormat);
    assert_eq!(scanner.recognizer().calls(), 2);
}

#[test]
fn test_engine_failure_is_not_retried() {
    let scanner = scanner(BrokenRecognizer {
        calls: AtomicUsize::new(0),
    });
    let err = scanner.process(&card_png(), "image/png").unwrap_err();

    assert_eq!(err.category(), ErrorCategory::OcrFailure);
    assert!(!err.is_soft());
    assert_eq!(scanner.recognizer().calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_too_little_text_is_ocr_failure() {
    let scanner = scanner(ScriptedRecognizer::new("A1", ""));
    let err = scanner.process(&card_png(), "image/png").unwrap_err();

    assert!(matches!(
        err,
        ScanError::Ocr(OcrError::NoUsableText { found: 2, required: 10 })
    ));
}

#[test]
fn test_passed_deadline_stops_before_engine() {
    let scanner = scanner(ScriptedRecognizer::new("AB123456", "05.03.1990"));
    let deadline = Instant::now();
    let err = scanner
        .process_with_deadline(&card_png(), "image/png", Some(deadline))
        .unwrap_err();

    assert!(matches!(err, ScanError::Ocr(OcrError::DeadlineExceeded(_))));
    assert_eq!(scanner.recognizer().calls(), 0);
}

#[test]
fn test_generous_deadline_is_harmless() {
    let scanner = scanner(ScriptedRecognizer::new("AB123456", "05.03.1990"));
    let deadline = Instant::now() + Duration::from_secs(300);
    let record = scanner
        .process_with_deadline(&card_png(), "image/png", Some(deadline))
        .unwrap();
    assert_eq!(record.id_number, "AB123456");
}

#[test]
fn test_three_letter_variant_config() {
    let config = ScanConfig {
        extraction: cinscan_core::models::ExtractionConfig::three_letter_variant(),
        ..Default::default()
    };
    let scanner = IdCardScannerBuilder::new()
        .with_config(config)
        .build(ScriptedRecognizer::new("AB123456\nabc 123456", "12 06 1979"))
        .unwrap();

    let record = scanner.process(&card_png(), "image/png").unwrap();
    assert_eq!(record.id_number, "ABC123456");
}

#[test]
fn test_shared_scanner_across_threads() {
    let scanner = Arc::new(scanner(ScriptedRecognizer::new("AB123456 ROYAUME", "AB123456 ROYAUME")));
    let bytes = card_png();

    std::thread::scope(|s| {
        for _ in 0..4 {
            let scanner = Arc::clone(&scanner);
            let bytes = &bytes;
            s.spawn(move || {
                let err = scanner.process(bytes, "image/png").unwrap_err();
                assert_eq!(err.missing_fields(), &[MandatoryField::BirthDate]);
            });
        }
    });

    assert_eq!(scanner.recognizer().calls(), 8);
}
