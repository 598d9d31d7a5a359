//! Subject attribution on the caller's tracing span.

use crate::common::{FixedClock, SUBJECT, T, claims, sign, verifier};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::span::{Id, Record};
use tracing::{Instrument, Subscriber, info_span};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

/// `(span name, field, value)` for every value recorded after span creation.
#[derive(Clone, Default)]
struct RecordedFields(Arc<Mutex<Vec<(String, String, String)>>>);

impl RecordedFields {
    fn on(&self, span: &str, field: &str) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, f, _)| s == span && f == field)
            .map(|(_, _, v)| v.clone())
            .collect()
    }
}

struct FieldVisitor<'a> {
    span: String,
    out: &'a mut Vec<(String, String, String)>,
}

impl Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.out
            .push((self.span.clone(), field.name().to_string(), format!("{value:?}")));
    }
}

impl<S> Layer<S> for RecordedFields
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let span = ctx.span(id).map(|s| s.name().to_string()).unwrap_or_default();
        let mut out = self.0.lock().unwrap();
        values.record(&mut FieldVisitor { span, out: &mut out });
    }
}

fn capture() -> (RecordedFields, tracing::subscriber::DefaultGuard) {
    let recorded = RecordedFields::default();
    let subscriber = tracing_subscriber::registry().with(recorded.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (recorded, guard)
}

#[tokio::test]
async fn test_subject_recorded_on_request_span() {
    let (recorded, _guard) = capture();
    let verifier = verifier(FixedClock::at(T));
    let token = sign(&claims(T - 10, T + 3600));

    let span = info_span!("request", user_id = tracing::field::Empty);
    let subject = verifier.verify(Some(&token)).instrument(span).await.unwrap();

    assert_eq!(subject.to_string(), SUBJECT);
    assert_eq!(recorded.on("request", "user_id"), vec![SUBJECT.to_string()]);
}

#[tokio::test]
async fn test_bearer_subject_recorded_on_request_span() {
    let (recorded, _guard) = capture();
    let verifier = verifier(FixedClock::at(T));
    let header = format!("Bearer {}", sign(&claims(T - 10, T + 3600)));

    let span = info_span!("request", user_id = tracing::field::Empty);
    verifier.verify_bearer(Some(&header)).instrument(span).await.unwrap();

    assert_eq!(recorded.on("request", "user_id"), vec![SUBJECT.to_string()]);
}

#[tokio::test]
async fn test_rejected_token_records_no_subject() {
    let (recorded, _guard) = capture();
    let verifier = verifier(FixedClock::at(T));
    let expired = sign(&claims(T - 7200, T - 3600));

    let span = info_span!("request", user_id = tracing::field::Empty);
    assert!(verifier.verify(Some(&expired)).instrument(span).await.is_err());

    assert!(recorded.on("request", "user_id").is_empty());
}
