//! Envelope invariants and the frame round-trip law.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::BTreeMap;

use ragbridge_core::protocol::{frame, Envelope};

fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn empty_command_is_rejected() {
    for cmd in ["", " ", "\t\n"] {
        let err = Envelope::new(cmd, BTreeMap::new(), "body").expect_err("must fail");
        assert_eq!(err.client_code().as_str(), "MALFORMED_FRAME");

        let err = frame::encode(cmd, &BTreeMap::new(), "body").expect_err("must fail");
        assert_eq!(err.client_code().as_str(), "MALFORMED_FRAME");
    }
}

#[test]
fn decode_inverts_encode() {
    let cases = [
        ("pipeline-start", headers(&[]), "annual-report"),
        (
            "query-by-rag",
            headers(&[("client-id", "a"), ("trace", "t-9")]),
            r#"{"query":"what is a commit?","top_k":3,"filter":{"source":"kb"}}"#,
        ),
        ("Query-By-RAG", headers(&[("k:v", "line\nbreak")]), ""),
        ("custom", headers(&[("unicode", "✓ ünïcödé")]), "body with \"quotes\" and \\slashes\\"),
    ];

    for (command, hdrs, body) in cases {
        let raw = frame::encode(command, &hdrs, body).unwrap();
        let env = frame::decode(&raw).unwrap();
        assert_eq!(env, Envelope::new(command, hdrs.clone(), body).unwrap());
    }
}

#[test]
fn command_key_is_lowercase() {
    let env = Envelope::new("PIPELINE-START", BTreeMap::new(), "x").unwrap();
    assert_eq!(env.command(), "PIPELINE-START");
    assert_eq!(env.command_key(), "pipeline-start");
}

#[test]
fn with_header_leaves_original_untouched() {
    let env = Envelope::new("query-by-rag", BTreeMap::new(), "{}").unwrap();
    let tagged = env.with_header("client-id", "b");
    assert_eq!(env.header("client-id"), None);
    assert_eq!(tagged.header("client-id"), Some("b"));
}
