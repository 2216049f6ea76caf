//! End-to-end flows across editor, analysis, repository and report

use sortscan_common::analysis::{
    parse_stream_suggestion, AnalysisMode, AnalysisRequest, AnalysisResult, StreamClassifier,
};
use sortscan_common::editor::EditorSession;
use sortscan_common::metrics::{format_percent, ScanSummary};
use sortscan_common::report::{self, TextFormatter};
use sortscan_common::{Error, InMemoryStore, Photo, Result, ScanRepository};

/// Classifier returning a canned response body
struct CannedClassifier {
    body: &'static str,
}

impl StreamClassifier for CannedClassifier {
    fn classify(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        match request.mode() {
            AnalysisMode::Streams => Ok(AnalysisResult::Streams(parse_stream_suggestion(self.body)?)),
            AnalysisMode::Advisory => Ok(AnalysisResult::Advisory(format!(
                "Advice for {}",
                request.location().unwrap_or_default()
            ))),
        }
    }
}

struct FailingClassifier;

impl StreamClassifier for FailingClassifier {
    fn classify(&self, _request: &AnalysisRequest) -> Result<AnalysisResult> {
        Err(Error::ExternalService("service unavailable".to_string()))
    }
}

fn photo() -> Photo {
    Photo::new("data:image/jpeg;base64,/9j/AAAA", "image/jpeg")
}

#[test]
fn test_photo_analysis_to_report() {
    let mut repo = ScanRepository::open(InMemoryStore::new()).unwrap();
    let mut session = EditorSession::new();
    session.set_location(Some("Loading dock".to_string()));
    session.set_photo(Some(photo()));

    let classifier = CannedClassifier {
        body: "```json\n{\"streams\":[{\"name\":\"Cardboard\",\"weightKg\":30},{\"name\":\"Metal\",\"weightKg\":\"20\"}],\"totalEstimateKg\":100}\n```",
    };
    let request =
        AnalysisRequest::new(AnalysisMode::Streams, session.draft().photo.clone(), None).unwrap();
    let AnalysisResult::Streams(suggestion) = classifier.classify(&request).unwrap() else {
        panic!("expected a stream suggestion");
    };
    session.apply_suggestion(&suggestion);
    assert_eq!(format_percent(session.summary().separation_percent), "50.0%");

    let scan = session.save(&mut repo).unwrap().into_value();
    let summary = ScanSummary::for_scan(&scan);
    assert_eq!(summary.separation_percent, session.summary().separation_percent);

    let document = report::export(&scan).unwrap();
    assert!(document.html.contains("Loading dock"));
    assert!(document.html.contains("50.0%"));
    assert!(document.html.contains("data:image/jpeg;base64,/9j/AAAA"));

    let row = TextFormatter::format_list_row(&repo.list()[0]);
    assert!(row.contains("(50.0%)"));
}

#[test]
fn test_failed_analysis_leaves_state_untouched() {
    let mut repo = ScanRepository::open(InMemoryStore::new()).unwrap();
    let mut session = EditorSession::new();
    session.set_total_input("40");
    let glass = session.add_stream("Glass");
    session.set_stream_weight_input(&glass, "10");
    let saved = session.save(&mut repo).unwrap().into_value();

    let request = AnalysisRequest::new(AnalysisMode::Streams, Some(photo()), None).unwrap();
    let err = FailingClassifier.classify(&request).unwrap_err();
    assert!(err.is_retryable());

    assert_eq!(repo.get(&saved.id).unwrap(), saved);
    assert_eq!(session.draft().streams.len(), 1);
}

#[test]
fn test_invalid_response_shape_is_external_service_error() {
    let classifier = CannedClassifier {
        body: r#"{"result":"I see some cardboard"}"#,
    };
    let request = AnalysisRequest::new(AnalysisMode::Streams, Some(photo()), None).unwrap();
    assert!(matches!(
        classifier.classify(&request),
        Err(Error::ExternalService(_))
    ));
}

#[test]
fn test_advisory_mode() {
    let classifier = CannedClassifier { body: "" };
    let request =
        AnalysisRequest::new(AnalysisMode::Advisory, Some(photo()), Some("Depot".into())).unwrap();
    assert_eq!(
        classifier.classify(&request).unwrap(),
        AnalysisResult::Advisory("Advice for Depot".to_string())
    );
}

#[test]
fn test_incomplete_scan_can_be_stored_but_not_exported() {
    let mut repo = ScanRepository::open(InMemoryStore::new()).unwrap();
    let scan = repo.create(Default::default()).into_value();
    assert!(!scan.is_complete());
    assert!(matches!(report::export(&scan), Err(Error::Validation(_))));
    // Rendering without the finalization check still works for previews
    assert!(report::render(&scan).html.contains("No streams recorded"));
}
