// MHTML 解析器集成测试：结构不变量、行结尾容错、严格/宽松模式

mod common;

use base64::{prelude::BASE64_STANDARD, Engine};
use proptest::prelude::*;

use common::ArchiveBuilder;
use mhtml2html::{parse, MhtmlArchive, MhtmlError, ParseOptions, ParsedMhtml, TransferEncoding};

fn parse_archive(text: &str) -> MhtmlArchive {
    match parse(text, &ParseOptions::default()).unwrap() {
        ParsedMhtml::Archive(archive) => archive,
        ParsedMhtml::Document(_) => panic!("expected an archive"),
    }
}

fn simple_archive() -> ArchiveBuilder {
    ArchiveBuilder::new()
        .html_part(
            "http://example.com/",
            "<!DOCTYPE html><html><body>Hello</body></html>",
        )
        .css_part("http://example.com/style.css", "body { color: red; }")
        .png_part("http://example.com/logo.png", b"not really a png")
}

#[test]
fn test_index_points_at_html_resource() {
    let archive = parse_archive(&simple_archive().build());

    // I1: the index is present and is text/html
    let root = archive.media.get(&archive.index).expect("index in media");
    assert_eq!(root.media_type, "text/html");
    assert_eq!(archive.index, "http://example.com/");
}

#[test]
fn test_media_keys_unique_and_in_part_order() {
    let archive = parse_archive(&simple_archive().build());

    let keys: Vec<String> = archive.media.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(
        keys,
        vec![
            "http://example.com/".to_string(),
            "http://example.com/style.css".to_string(),
            "http://example.com/logo.png".to_string(),
        ]
    );

    let mut deduped = keys.clone();
    deduped.dedup();
    assert_eq!(keys, deduped);
}

#[test]
fn test_line_ending_variants_parse_identically() {
    let builder = simple_archive();
    let lf = parse_archive(&builder.build_with_line_ending("\n"));
    let crlf = parse_archive(&builder.build_with_line_ending("\r\n"));

    assert_eq!(lf.index, crlf.index);
    assert_eq!(lf.media.len(), crlf.media.len());
    for ((lk, lv), (ck, cv)) in lf.media.iter().zip(crlf.media.iter()) {
        assert_eq!(lk, ck);
        assert_eq!(lv.data, cv.data);
        assert_eq!(lv.media_type, cv.media_type);
    }
}

#[test]
fn test_mixed_line_endings_within_header_block() {
    let text = "MIME-Version: 1.0\r\n\
Content-Type: multipart/related; boundary=\"sep\"\n\
\r\n\
--sep\n\
Content-Type: text/html\r\n\
Content-Transfer-Encoding: 7bit\n\
Content-Location: http://example.com/\r\n\
\n\
Hello\r\n\
--sep--\n";
    let archive = parse_archive(text);
    assert_eq!(archive.index, "http://example.com/");
    assert_eq!(archive.media.get(&archive.index).unwrap().data, "Hello\n");
}

#[test]
fn test_base64_resource_is_declared_and_decodable() {
    let archive = parse_archive(&simple_archive().build());
    let logo = archive.media.get("http://example.com/logo.png").unwrap();

    assert_eq!(logo.transfer_encoding, TransferEncoding::Base64);

    let compact: String = logo.data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let decoded = BASE64_STANDARD.decode(compact.as_bytes()).unwrap();
    assert_eq!(decoded, b"not really a png");

    // Re-encoding is idempotent up to whitespace
    assert_eq!(BASE64_STANDARD.encode(&decoded), compact);
}

#[test]
fn test_html_only_returns_document() {
    let parsed = parse(
        &simple_archive().build(),
        &ParseOptions {
            html_only: true,
            ..Default::default()
        },
    )
    .unwrap();

    match parsed {
        ParsedMhtml::Document(dom) => {
            let html = mhtml2html::parsers::html::dom::serialize_document(&dom);
            assert!(html.contains("Hello"));
        }
        ParsedMhtml::Archive(_) => panic!("expected html_only to return a document"),
    }
}

#[test]
fn test_part_without_keys_is_dropped_leniently() {
    let text = ArchiveBuilder::new()
        .html_part("http://example.com/", "<html><body>ok</body></html>")
        .part(
            &[
                ("Content-Type", "image/png"),
                ("Content-Transfer-Encoding", "base64"),
            ],
            "aWNvbg==",
        )
        .build();

    let archive = parse_archive(&text);
    assert_eq!(archive.media.len(), 1);
}

#[test]
fn test_part_without_keys_fails_strict() {
    let text = ArchiveBuilder::new()
        .html_part("http://example.com/", "<html><body>ok</body></html>")
        .part(
            &[
                ("Content-Type", "image/png"),
                ("Content-Transfer-Encoding", "base64"),
            ],
            "aWNvbg==",
        )
        .build();

    let err = parse(
        &text,
        &ParseOptions {
            strict: true,
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, MhtmlError::MissingPartHeader { .. }));
}

#[test]
fn test_envelope_without_boundary_is_invalid() {
    let text = "MIME-Version: 1.0\nContent-Type: multipart/related\n\n";
    let err = parse(text, &ParseOptions::default()).unwrap_err();
    assert!(matches!(err, MhtmlError::InvalidArchive(_)));
}

#[test]
fn test_archive_without_html_part_is_invalid() {
    let text = ArchiveBuilder::new()
        .css_part("http://example.com/style.css", "body { color: red; }")
        .build();
    let err = parse(&text, &ParseOptions::default()).unwrap_err();
    assert!(matches!(err, MhtmlError::InvalidArchive(_)));
}

#[test]
fn test_frames_and_media_share_resources() {
    let text = ArchiveBuilder::new()
        .html_part("http://example.com/", "<html><body>root</body></html>")
        .part(
            &[
                ("Content-Type", "text/html"),
                ("Content-Transfer-Encoding", "7bit"),
                ("Content-Location", "http://example.com/frame.html"),
                ("Content-ID", "<frame1>"),
            ],
            "<html><body>frame</body></html>",
        )
        .build();

    let archive = parse_archive(&text);
    let by_url = archive.media.get("http://example.com/frame.html").unwrap();
    let by_cid = archive.frames.get("<frame1>").unwrap();
    assert!(std::rc::Rc::ptr_eq(by_url, by_cid));
}

proptest! {
    #[test]
    fn prop_line_ending_invariance(bodies in prop::collection::vec("[a-z0-9 ]{1,30}", 1..5)) {
        let mut builder = ArchiveBuilder::new()
            .html_part("http://example.com/", "<html><body>root</body></html>");
        for (i, body) in bodies.iter().enumerate() {
            builder = builder.css_part(&format!("http://example.com/{i}.css"), body);
        }

        let lf = parse_archive(&builder.build_with_line_ending("\n"));
        let crlf = parse_archive(&builder.build_with_line_ending("\r\n"));

        prop_assert_eq!(&lf.index, &crlf.index);
        prop_assert_eq!(lf.media.len(), crlf.media.len());
        for ((lk, lv), (ck, cv)) in lf.media.iter().zip(crlf.media.iter()) {
            prop_assert_eq!(lk, ck);
            prop_assert_eq!(&lv.data, &cv.data);
        }
    }

    #[test]
    fn prop_base64_bodies_round_trip(payload in prop::collection::vec(any::<u8>(), 0..200)) {
        let text = ArchiveBuilder::new()
            .html_part("http://example.com/", "<html><body>root</body></html>")
            .png_part("http://example.com/blob.png", &payload)
            .build();

        let archive = parse_archive(&text);
        let blob = archive.media.get("http://example.com/blob.png").unwrap();
        let compact: String = blob.data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let decoded = BASE64_STANDARD.decode(compact.as_bytes()).unwrap();
        prop_assert_eq!(decoded, payload);
    }

    #[test]
    fn prop_duplicate_locations_keep_first(first in "[a-z]{1,20}", second in "[a-z]{1,20}") {
        let text = ArchiveBuilder::new()
            .html_part("http://example.com/", "<html><body>root</body></html>")
            .css_part("http://example.com/dup.css", &first)
            .css_part("http://example.com/dup.css", &second)
            .build();

        let archive = parse_archive(&text);
        let keys: Vec<&String> = archive.media.iter().map(|(k, _)| k).collect();
        prop_assert_eq!(keys.len(), 2);
        let dup = archive.media.get("http://example.com/dup.css").unwrap();
        prop_assert_eq!(dup.data.trim_end(), first.as_str());
    }
}
