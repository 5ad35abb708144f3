//! S3 XML response rendering.
//!
//! All S3 API responses are XML-encoded. This module provides helpers
//! that produce the correct XML payloads using `quick-xml`. Pagination
//! fields (`ContinuationToken`/`Marker`/...) are accepted as parameters
//! for wire compatibility but every caller in this gateway always passes
//! `is_truncated = false` and no continuation markers, per SPEC_FULL.md
//! §9's pagination resolution.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

const XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

// ── Error response ──────────────────────────────────────────────────

/// Render an S3 `<Error>` XML document.
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Error>
///   <Code>NoSuchBucket</Code>
///   <Message>The specified bucket does not exist</Message>
///   <Resource>/mybucket</Resource>
///   <RequestId>abcd-1234</RequestId>
/// </Error>
/// ```
pub fn render_error(code: &str, message: &str, resource: &str, request_id: &str) -> String {
    let mut writer = new_writer();

    write_simple_element_group(
        &mut writer,
        "Error",
        &[
            ("Code", code),
            ("Message", message),
            ("Resource", resource),
            ("RequestId", request_id),
        ],
    );

    finish(writer)
}

// ── ListAllMyBucketsResult ──────────────────────────────────────────

/// Render the `<ListAllMyBucketsResult>` response for `GET /`.
///
/// `buckets` is a list of `(name, creation_date)` pairs.
pub fn render_list_buckets_result(
    owner_id: &str,
    owner_display: &str,
    buckets: &[(&str, &str)],
) -> String {
    let mut writer = new_writer();

    let root = BytesStart::new("ListAllMyBucketsResult").with_attributes([("xmlns", XMLNS)]);
    writer.write_event(Event::Start(root)).expect("start root");

    write_simple_element_group(
        &mut writer,
        "Owner",
        &[("ID", owner_id), ("DisplayName", owner_display)],
    );

    writer
        .write_event(Event::Start(BytesStart::new("Buckets")))
        .expect("start Buckets");
    for (name, date) in buckets {
        write_simple_element_group(&mut writer, "Bucket", &[("Name", name), ("CreationDate", date)]);
    }
    writer
        .write_event(Event::End(BytesEnd::new("Buckets")))
        .expect("end Buckets");

    writer
        .write_event(Event::End(BytesEnd::new("ListAllMyBucketsResult")))
        .expect("end root");

    finish(writer)
}

// ── ListBucketResult ─────────────────────────────────────────────────

/// Represents a single object entry inside a list-objects response.
pub struct ObjectEntry<'a> {
    pub key: &'a str,
    pub last_modified: &'a str,
    pub etag: &'a str,
    pub size: u64,
    pub storage_class: &'a str,
}

/// Render `<ListBucketResult>` for ListObjects. Always `IsTruncated =
/// false`; `marker`/`max_keys` are echoed back verbatim but do not limit
/// `entries` (spec §9, pagination is accepted but not applied).
pub fn render_list_objects_result(
    bucket: &str,
    prefix: &str,
    marker: &str,
    max_keys: u32,
    entries: &[ObjectEntry<'_>],
) -> String {
    let mut writer = new_writer();

    let root = BytesStart::new("ListBucketResult").with_attributes([("xmlns", XMLNS)]);
    writer.write_event(Event::Start(root)).expect("start root");

    write_text_element(&mut writer, "Name", bucket);
    write_text_element(&mut writer, "Prefix", prefix);
    write_text_element(&mut writer, "Marker", marker);
    write_text_element(&mut writer, "MaxKeys", &max_keys.to_string());
    write_text_element(&mut writer, "IsTruncated", "false");

    for entry in entries {
        writer
            .write_event(Event::Start(BytesStart::new("Contents")))
            .expect("start Contents");
        write_text_element(&mut writer, "Key", entry.key);
        write_text_element(&mut writer, "LastModified", entry.last_modified);
        write_text_element(&mut writer, "ETag", entry.etag);
        write_text_element(&mut writer, "Size", &entry.size.to_string());
        write_text_element(&mut writer, "StorageClass", entry.storage_class);
        writer
            .write_event(Event::End(BytesEnd::new("Contents")))
            .expect("end Contents");
    }

    writer
        .write_event(Event::End(BytesEnd::new("ListBucketResult")))
        .expect("end root");

    finish(writer)
}

// ── InitiateMultipartUploadResult ───────────────────────────────────

/// Render `<InitiateMultipartUploadResult>`.
pub fn render_initiate_multipart_upload_result(bucket: &str, key: &str, upload_id: &str) -> String {
    let mut writer = new_writer();

    write_simple_element_group(
        &mut writer,
        "InitiateMultipartUploadResult",
        &[("Bucket", bucket), ("Key", key), ("UploadId", upload_id)],
    );

    finish(writer)
}

// ── CompleteMultipartUploadResult ───────────────────────────────────

/// Render `<CompleteMultipartUploadResult>`.
pub fn render_complete_multipart_upload_result(
    location: &str,
    bucket: &str,
    key: &str,
    etag: &str,
) -> String {
    let mut writer = new_writer();

    write_simple_element_group(
        &mut writer,
        "CompleteMultipartUploadResult",
        &[
            ("Location", location),
            ("Bucket", bucket),
            ("Key", key),
            ("ETag", etag),
        ],
    );

    finish(writer)
}

// ── ListMultipartUploadsResult ──────────────────────────────────────

/// Represents a single upload entry in the ListMultipartUploads response.
pub struct UploadEntry<'a> {
    pub key: &'a str,
    pub upload_id: &'a str,
    pub initiated: &'a str,
    pub storage_class: &'a str,
    pub owner_id: &'a str,
    pub owner_display: &'a str,
}

/// Render `<ListMultipartUploadsResult>`. Always `IsTruncated = false`.
pub fn render_list_multipart_uploads_result(
    bucket: &str,
    key_marker: &str,
    upload_id_marker: &str,
    max_uploads: u32,
    entries: &[UploadEntry<'_>],
) -> String {
    let mut writer = new_writer();

    let root = BytesStart::new("ListMultipartUploadsResult").with_attributes([("xmlns", XMLNS)]);
    writer.write_event(Event::Start(root)).expect("start root");

    write_text_element(&mut writer, "Bucket", bucket);
    write_text_element(&mut writer, "KeyMarker", key_marker);
    write_text_element(&mut writer, "UploadIdMarker", upload_id_marker);
    write_text_element(&mut writer, "MaxUploads", &max_uploads.to_string());
    write_text_element(&mut writer, "IsTruncated", "false");

    for entry in entries {
        writer
            .write_event(Event::Start(BytesStart::new("Upload")))
            .expect("start Upload");
        write_text_element(&mut writer, "Key", entry.key);
        write_text_element(&mut writer, "UploadId", entry.upload_id);

        write_simple_element_group(
            &mut writer,
            "Initiator",
            &[("ID", entry.owner_id), ("DisplayName", entry.owner_display)],
        );
        write_simple_element_group(
            &mut writer,
            "Owner",
            &[("ID", entry.owner_id), ("DisplayName", entry.owner_display)],
        );

        write_text_element(&mut writer, "StorageClass", entry.storage_class);
        write_text_element(&mut writer, "Initiated", entry.initiated);
        writer
            .write_event(Event::End(BytesEnd::new("Upload")))
            .expect("end Upload");
    }

    writer
        .write_event(Event::End(BytesEnd::new("ListMultipartUploadsResult")))
        .expect("end root");

    finish(writer)
}

// ── ListPartsResult ──────────────────────────────────────────────────

/// Represents a single part entry in the ListParts response.
pub struct PartEntry<'a> {
    pub part_number: u32,
    pub last_modified: &'a str,
    pub etag: &'a str,
    pub size: u64,
}

/// Render `<ListPartsResult>`. Always `IsTruncated = false`.
pub fn render_list_parts_result(
    bucket: &str,
    key: &str,
    upload_id: &str,
    parts: &[PartEntry<'_>],
    storage_class: &str,
    owner_id: &str,
    owner_display: &str,
) -> String {
    let mut writer = new_writer();

    let root = BytesStart::new("ListPartsResult").with_attributes([("xmlns", XMLNS)]);
    writer.write_event(Event::Start(root)).expect("start root");

    write_text_element(&mut writer, "Bucket", bucket);
    write_text_element(&mut writer, "Key", key);
    write_text_element(&mut writer, "UploadId", upload_id);

    write_simple_element_group(
        &mut writer,
        "Initiator",
        &[("ID", owner_id), ("DisplayName", owner_display)],
    );
    write_simple_element_group(
        &mut writer,
        "Owner",
        &[("ID", owner_id), ("DisplayName", owner_display)],
    );

    write_text_element(&mut writer, "StorageClass", storage_class);
    write_text_element(&mut writer, "IsTruncated", "false");

    for part in parts {
        writer
            .write_event(Event::Start(BytesStart::new("Part")))
            .expect("start Part");
        write_text_element(&mut writer, "PartNumber", &part.part_number.to_string());
        write_text_element(&mut writer, "LastModified", part.last_modified);
        write_text_element(&mut writer, "ETag", part.etag);
        write_text_element(&mut writer, "Size", &part.size.to_string());
        writer
            .write_event(Event::End(BytesEnd::new("Part")))
            .expect("end Part");
    }

    writer
        .write_event(Event::End(BytesEnd::new("ListPartsResult")))
        .expect("end root");

    finish(writer)
}

// ── Helpers ─────────────────────────────────────────────────────────

fn new_writer() -> Writer<Cursor<Vec<u8>>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(quick_xml::events::BytesDecl::new("1.0", Some("UTF-8"), None)))
        .expect("xml decl");
    writer
}

fn finish(writer: Writer<Cursor<Vec<u8>>>) -> String {
    String::from_utf8(writer.into_inner().into_inner()).expect("valid utf-8")
}

/// Write a `<tag>text</tag>` element.
fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, text: &str) {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .expect("start tag");
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .expect("text");
    writer.write_event(Event::End(BytesEnd::new(tag))).expect("end tag");
}

/// Write a parent element containing a flat list of child text elements.
fn write_simple_element_group(writer: &mut Writer<Cursor<Vec<u8>>>, parent: &str, children: &[(&str, &str)]) {
    writer
        .write_event(Event::Start(BytesStart::new(parent)))
        .expect("start parent");
    for (tag, value) in children {
        write_text_element(writer, tag, value);
    }
    writer.write_event(Event::End(BytesEnd::new(parent))).expect("end parent");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_contains_code_and_message() {
        let xml = render_error("NoSuchBucket", "missing", "/b", "REQID");
        assert!(xml.contains("<Code>NoSuchBucket</Code>"));
        assert!(xml.contains("<Message>missing</Message>"));
        assert!(xml.contains("<RequestId>REQID</RequestId>"));
    }

    #[test]
    fn list_buckets_nests_bucket_entries() {
        let xml = render_list_buckets_result("owner-id", "alice", &[("b1", "2026-01-01T00:00:00.000Z")]);
        assert!(xml.contains("<Name>b1</Name>"));
        assert!(xml.contains("<DisplayName>alice</DisplayName>"));
    }

    #[test]
    fn list_objects_is_never_truncated() {
        let entries = [ObjectEntry {
            key: "k1",
            last_modified: "2026-01-01T00:00:00.000Z",
            etag: "\"abc\"",
            size: 3,
            storage_class: "STANDARD",
        }];
        let xml = render_list_objects_result("b1", "", "", 1000, &entries);
        assert!(xml.contains("<IsTruncated>false</IsTruncated>"));
        assert!(xml.contains("<Key>k1</Key>"));
    }

    #[test]
    fn list_parts_orders_entries_as_given() {
        let parts = [
            PartEntry {
                part_number: 1,
                last_modified: "2026-01-01T00:00:00.000Z",
                etag: "\"a\"",
                size: 5,
            },
            PartEntry {
                part_number: 2,
                last_modified: "2026-01-01T00:00:01.000Z",
                etag: "\"b\"",
                size: 5,
            },
        ];
        let xml = render_list_parts_result("b1", "key", "upload-1", &parts, "STANDARD", "owner", "alice");
        let first = xml.find("<PartNumber>1</PartNumber>").unwrap();
        let second = xml.find("<PartNumber>2</PartNumber>").unwrap();
        assert!(first < second);
    }
}
