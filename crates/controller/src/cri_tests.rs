// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_nested_object_info() {
    let raw = br#"{
        "status": {"id": "sha256:abc"},
        "info": {
            "info": {
                "imageSpec": {
                    "config": {
                        "Env": ["PATH=/usr/local/bin:/usr/bin", "HOME=/root"],
                        "WorkingDir": "/work"
                    }
                }
            }
        }
    }"#;

    let meta = parse_image_status(raw, "img:v1").unwrap();
    assert_eq!(meta.working_dir.as_deref(), Some("/work"));
    assert_eq!(meta.path_entries, vec!["/usr/local/bin", "/usr/bin"]);
}

#[test]
fn parses_string_encoded_info() {
    // Most runtimes return the verbose info as a JSON string.
    let raw = br#"{
        "status": {},
        "info": {
            "info": "{\"imageSpec\":{\"config\":{\"Env\":[\"PATH=/bin\"],\"WorkingDir\":\"\"}}}"
        }
    }"#;

    let meta = parse_image_status(raw, "img:v1").unwrap();
    assert_eq!(meta.working_dir, None);
    assert_eq!(meta.path_entries, vec!["/bin"]);
}

#[test]
fn missing_path_yields_no_entries() {
    let raw = br#"{"info": {"info": {"imageSpec": {"config": {"Env": ["HOME=/root"]}}}}}"#;
    let meta = parse_image_status(raw, "img:v1").unwrap();
    assert!(meta.path_entries.is_empty());
    assert_eq!(meta.working_dir, None);
}

#[test]
fn empty_path_segments_are_dropped() {
    let raw = br#"{"info": {"info": {"imageSpec": {"config": {"Env": ["PATH=/bin::/usr/bin:"]}}}}}"#;
    let meta = parse_image_status(raw, "img:v1").unwrap();
    assert_eq!(meta.path_entries, vec!["/bin", "/usr/bin"]);
}

#[test]
fn malformed_json_is_an_error() {
    assert!(matches!(
        parse_image_status(b"not json", "img:v1"),
        Err(MetadataError::Malformed { .. })
    ));
}

#[test]
fn malformed_nested_string_is_an_error() {
    let raw = br#"{"info": {"info": "not json"}}"#;
    assert!(matches!(
        parse_image_status(raw, "img:v1"),
        Err(MetadataError::Malformed { .. })
    ));
}
