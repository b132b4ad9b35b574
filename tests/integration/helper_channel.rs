#![allow(missing_docs)]

mod support;

use std::io::Cursor;
use std::sync::Arc;
use std::thread;

use hgbridge::primitives::channel::{Helper, HelperRequest, StreamTransport};
use hgbridge::BridgeError;
use support::init_tracing;

fn in_memory(answers: &str) -> Helper<StreamTransport<Cursor<Vec<u8>>, Vec<u8>>> {
    Helper::new(StreamTransport::new(
        Cursor::new(answers.as_bytes().to_vec()),
        Vec::new(),
    ))
}

#[test]
fn every_call_after_close_fails() {
    init_tracing();
    let helper = in_memory("2\nok2\nok");
    let req = HelperRequest::new("version");
    assert_eq!(helper.query(&req).unwrap().body(), b"ok");

    helper.close().unwrap();
    helper.close().unwrap();
    for _ in 0..3 {
        let err = helper.query(&req).unwrap_err();
        assert!(matches!(err, BridgeError::HelperClosed));
        assert!(err.is_abort());
    }
    assert!(helper.is_closed());
    assert_eq!(helper.queries_sent(), 1);
}

#[test]
fn clones_share_the_closed_state() {
    let helper = in_memory("");
    let other = helper.clone();
    assert!(matches!(
        helper.query(&HelperRequest::new("ping")),
        Err(BridgeError::HelperClosed)
    ));
    assert!(other.is_closed());
    assert!(matches!(
        other.query(&HelperRequest::new("ping")),
        Err(BridgeError::HelperClosed)
    ));
}

#[test]
fn concurrent_callers_all_see_the_close() {
    let helper = Arc::new(in_memory("1\na"));
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let helper = Arc::clone(&helper);
            thread::spawn(move || helper.query(&HelperRequest::new("ping")).is_ok())
        })
        .collect();
    let results: Vec<bool> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();
    assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
    assert!(helper.is_closed());
    assert_eq!(helper.queries_sent(), 2);
}

#[test]
fn invalid_requests_leave_the_channel_open() {
    let helper = in_memory("1\nx");
    assert!(matches!(
        helper.query(&HelperRequest::new("bad command")),
        Err(BridgeError::InvalidArgument(_))
    ));
    assert!(!helper.is_closed());
    assert_eq!(helper.query(&HelperRequest::new("ok")).unwrap().body(), b"x");
}

#[cfg(unix)]
#[test]
fn exited_process_closes_the_channel() {
    use hgbridge::primitives::channel::ProcessTransport;
    use std::process::Command;

    let transport = ProcessTransport::spawn(
        Command::new("sh").args(["-c", "read line; printf '5\\nhello'"]),
    )
    .unwrap();
    let helper = Helper::new(transport);
    assert_eq!(helper.query(&HelperRequest::new("greet")).unwrap().body(), b"hello");
    assert!(matches!(
        helper.query(&HelperRequest::new("greet")),
        Err(BridgeError::HelperClosed)
    ));
    assert!(matches!(
        helper.query(&HelperRequest::new("greet")),
        Err(BridgeError::HelperClosed)
    ));
    helper.close().unwrap();
}
