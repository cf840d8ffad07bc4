//! Pipeline-level properties: outcome accounting, ordering, staging
//! hygiene and destination-name collisions.

use bytes::Bytes;
use futures::StreamExt;
use tempfile::tempdir;

use bi_bucket::contract::{ByteStream, MockBlobSink, MockUpstreamClient};
use bi_bucket::error::UpstreamError;
use bi_bucket::session::Session;
use bi_bucket::transfer::{transfer_all, TransferItem, TransferStatus, EMBEDDED_REASON};

fn session() -> Session {
    Session {
        upstream_token: "T1".to_string(),
        site_id: "S1".to_string(),
    }
}

fn fixture_stream(content: &'static [u8]) -> ByteStream {
    futures::stream::iter(vec![Ok(Bytes::from_static(content))]).boxed()
}

fn fetch(name: &str, id: &str, file_name: &str) -> TransferItem {
    TransferItem::Fetch {
        name: name.to_string(),
        source_id: id.to_string(),
        content_path: format!("sites/S1/datasources/{id}/content"),
        file_name: file_name.to_string(),
    }
}

fn skip(name: &str) -> TransferItem {
    TransferItem::Skip {
        name: name.to_string(),
        reason: EMBEDDED_REASON.to_string(),
    }
}

#[tokio::test]
async fn empty_input_yields_an_empty_outcome_list() {
    let staging = tempdir().expect("tempdir");
    let report = transfer_all(
        &MockUpstreamClient::new(),
        &MockBlobSink::new(),
        &session(),
        vec![],
        staging.path(),
    )
    .await
    .expect("empty batch is not an error");
    assert!(report.outcomes.is_empty());
}

#[tokio::test]
async fn outcome_count_and_order_match_the_input() {
    let mut upstream = MockUpstreamClient::new();
    upstream.expect_get_stream().returning(|path, _| {
        if path.contains("/bad/") {
            Err(UpstreamError {
                status: 404,
                detail: "gone".to_string(),
            })
        } else {
            Ok(fixture_stream(b"bytes"))
        }
    });
    let mut sink = MockBlobSink::new();
    sink.expect_put()
        .returning(|_, destination| Ok(format!("s3://bucket/{destination}")));

    let staging = tempdir().expect("tempdir");
    let report = transfer_all(
        &upstream,
        &sink,
        &session(),
        vec![
            fetch("first", "ds1", "first.tdsx"),
            skip("second"),
            fetch("third", "bad", "third.tdsx"),
            fetch("fourth", "ds4", "fourth.tdsx"),
        ],
        staging.path(),
    )
    .await
    .expect("pipeline should run to completion");

    let names: Vec<_> = report.outcomes.iter().map(|o| o.item.as_str()).collect();
    assert_eq!(names, vec!["first", "second", "third", "fourth"]);
    assert!(matches!(
        report.outcomes[0].status,
        TransferStatus::Uploaded { .. }
    ));
    assert!(matches!(
        report.outcomes[1].status,
        TransferStatus::Skipped { .. }
    ));
    assert!(
        matches!(report.outcomes[2].status, TransferStatus::Failed { ref reason } if reason.contains("gone"))
    );
    assert!(matches!(
        report.outcomes[3].status,
        TransferStatus::Uploaded { .. }
    ));

    assert_eq!(report.uploaded().count(), 2);
    assert_eq!(report.not_uploaded().count(), 2);
}

#[tokio::test]
async fn colliding_sanitized_names_do_not_overwrite_each_other() {
    // Two distinct datasources whose names sanitize identically.
    let mut upstream = MockUpstreamClient::new();
    upstream
        .expect_get_stream()
        .returning(|_, _| Ok(fixture_stream(b"bytes")));
    let mut sink = MockBlobSink::new();
    sink.expect_put()
        .returning(|_, destination| Ok(format!("s3://bucket/{destination}")));

    let staging = tempdir().expect("tempdir");
    let report = transfer_all(
        &upstream,
        &sink,
        &session(),
        vec![
            fetch("Sales Data", "ds1", "Sales_Data.tdsx"),
            fetch("Sales/Data", "ds2", "Sales_Data.tdsx"),
        ],
        staging.path(),
    )
    .await
    .expect("pipeline should run to completion");

    let locators: Vec<_> = report
        .outcomes
        .iter()
        .map(|o| match &o.status {
            TransferStatus::Uploaded { locator } => locator.clone(),
            other => panic!("expected upload, got {other:?}"),
        })
        .collect();
    assert_eq!(locators[0], "s3://bucket/Sales_Data.tdsx");
    assert_eq!(locators[1], "s3://bucket/Sales_Data_ds2.tdsx");
}

#[tokio::test]
async fn skipped_items_never_touch_the_network() {
    // No expectations on either mock: any call would panic the test.
    let staging = tempdir().expect("tempdir");
    let report = transfer_all(
        &MockUpstreamClient::new(),
        &MockBlobSink::new(),
        &session(),
        vec![skip("embedded-a"), skip("embedded-b")],
        staging.path(),
    )
    .await
    .expect("skip-only batch should succeed");
    assert_eq!(report.outcomes.len(), 2);
    assert!(report
        .outcomes
        .iter()
        .all(|o| matches!(o.status, TransferStatus::Skipped { .. })));
}

#[tokio::test]
async fn staging_is_empty_after_success_failure_and_mid_stream_errors() {
    let mut upstream = MockUpstreamClient::new();
    upstream.expect_get_stream().returning(|path, _| {
        if path.contains("/torn/") {
            // Stream that fails after the first chunk, leaving a partial
            // staging write behind for the pipeline to clean up.
            Ok(futures::stream::iter(vec![
                Ok(Bytes::from_static(b"partial")),
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "reset mid-stream",
                )),
            ])
            .boxed())
        } else {
            Ok(fixture_stream(b"bytes"))
        }
    });
    let mut sink = MockBlobSink::new();
    sink.expect_put().returning(|_, destination| {
        if destination == "rejected.tdsx" {
            Err(bi_bucket::error::SinkError("denied".to_string()))
        } else {
            Ok(format!("s3://bucket/{destination}"))
        }
    });

    let staging = tempdir().expect("tempdir");
    let report = transfer_all(
        &upstream,
        &sink,
        &session(),
        vec![
            fetch("ok", "ds1", "ok.tdsx"),
            fetch("rejected", "ds2", "rejected.tdsx"),
            fetch("torn", "torn", "torn.tdsx"),
        ],
        staging.path(),
    )
    .await
    .expect("pipeline should run to completion");

    assert_eq!(report.outcomes.len(), 3);
    assert!(matches!(
        report.outcomes[1].status,
        TransferStatus::Failed { .. }
    ));
    assert!(matches!(
        report.outcomes[2].status,
        TransferStatus::Failed { .. }
    ));

    let leftovers: Vec<_> = std::fs::read_dir(staging.path())
        .expect("staging root should exist")
        .collect();
    assert!(
        leftovers.is_empty(),
        "no staging artifact may survive any outcome: {leftovers:?}"
    );
}
