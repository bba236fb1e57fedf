use std::io::Cursor;
use std::path::{Path, PathBuf};
use vision_describe::writer::{
    planned_targets, ArtifactKind, OutputFormats, OverwritePolicy, ResultWriter, WriteDetails,
    WriteOutcome,
};

const TEXT: &str = "A red kite hangs above grassy dunes under a pale blue sky.";

fn details() -> WriteDetails {
    WriteDetails {
        model: "llava:13b".into(),
        processing_seconds: Some(2.34567),
    }
}

/// SOI, JFIF APP0, a minimal SOS and EOI.
fn tiny_jpeg() -> Vec<u8> {
    let mut v = vec![0xFF, 0xD8];
    v.extend_from_slice(&[
        0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00,
        0x01, 0x00, 0x00,
    ]);
    v.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    v.extend_from_slice(&[0x12, 0x34, 0xFF, 0xD9]);
    v
}

fn written(outcome: WriteOutcome) -> vision_describe::writer::WriteReport {
    match outcome {
        WriteOutcome::Written(report) => report,
        WriteOutcome::Skipped { existing } => panic!("skipped because of {}", existing.display()),
    }
}

#[test]
fn text_goes_next_to_image_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("holiday.v2.png");
    std::fs::write(&image, b"png").unwrap();

    let writer = ResultWriter::new(None, OutputFormats::default(), OverwritePolicy::Allow);
    let report = written(writer.write(&image, TEXT, &details()).unwrap());

    let txt = dir.path().join("holiday.v2.txt");
    assert_eq!(std::fs::read_to_string(&txt).unwrap(), TEXT);
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.artifacts[0].kind, ArtifactKind::Text);
    assert!(report.notes.is_empty());
}

#[test]
fn output_dir_is_created_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("a.png");
    std::fs::write(&image, b"png").unwrap();
    let out = dir.path().join("out").join("nested");

    let writer = ResultWriter::new(Some(out.clone()), OutputFormats::default(), OverwritePolicy::Allow);
    written(writer.write(&image, TEXT, &details()).unwrap());

    assert!(out.join("a.txt").is_file());
}

#[test]
fn yaml_sidecar_has_expected_keys() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("kite.png");
    std::fs::write(&image, b"png").unwrap();

    let formats = OutputFormats {
        yaml: true,
        metadata: false,
    };
    let writer = ResultWriter::new(None, formats, OverwritePolicy::Allow);
    let report = written(writer.write(&image, TEXT, &details()).unwrap());
    assert!(report.artifacts.iter().any(|a| a.kind == ArtifactKind::Yaml));

    let raw = std::fs::read_to_string(dir.path().join("kite.png.yml")).unwrap();
    let doc: serde_yaml::Value = serde_yaml::from_str(&raw).unwrap();
    assert_eq!(doc["Title"].as_str(), Some("kite"));
    assert_eq!(doc["Description"].as_str(), Some(TEXT));
    assert!(doc.get("TakenAt").is_none());
    assert_eq!(doc["Details"]["AI_Model"].as_str(), Some("llava:13b"));
    assert_eq!(doc["Details"]["AI_Generated"].as_bool(), Some(true));
    assert_eq!(doc["Details"]["Processing_Time"].as_f64(), Some(2.346));
}

#[test]
fn protect_skips_when_any_target_exists() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("a.png");
    std::fs::write(&image, b"png").unwrap();
    std::fs::write(dir.path().join("a.png.yml"), "old").unwrap();

    let formats = OutputFormats {
        yaml: true,
        metadata: false,
    };
    let writer = ResultWriter::new(None, formats, OverwritePolicy::Protect);
    match writer.write(&image, TEXT, &details()).unwrap() {
        WriteOutcome::Skipped { existing } => assert_eq!(existing, dir.path().join("a.png.yml")),
        other => panic!("expected skip, got {other:?}"),
    }
    assert!(!dir.path().join("a.txt").exists());
}

#[test]
fn metadata_on_non_jpeg_is_a_note_not_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("scan.png");
    std::fs::write(&image, b"png").unwrap();

    let formats = OutputFormats {
        yaml: false,
        metadata: true,
    };
    let writer = ResultWriter::new(None, formats, OverwritePolicy::Allow);
    let report = written(writer.write(&image, TEXT, &details()).unwrap());

    assert!(dir.path().join("scan.txt").is_file());
    assert_eq!(report.notes.len(), 1);
    assert!(report.notes[0].contains("EXIF"));
    assert!(!report.artifacts.iter().any(|a| a.kind == ArtifactKind::Metadata));
    assert_eq!(std::fs::read(&image).unwrap(), b"png");
}

#[test]
fn jpeg_embed_keeps_backup_and_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("dunes.jpg");
    let original = tiny_jpeg();
    std::fs::write(&image, &original).unwrap();

    let formats = OutputFormats {
        yaml: false,
        metadata: true,
    };
    let writer = ResultWriter::new(None, formats, OverwritePolicy::Allow);
    let report = written(writer.write(&image, TEXT, &details()).unwrap());
    assert!(report.notes.is_empty(), "notes: {:?}", report.notes);
    assert!(report.artifacts.iter().any(|a| a.kind == ArtifactKind::Metadata));

    let backup = dir.path().join("dunes.jpg.bak");
    assert_eq!(std::fs::read(&backup).unwrap(), original);

    let bytes = std::fs::read(&image).unwrap();
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes.as_slice()))
        .unwrap();
    let field = exif
        .get_field(exif::Tag::ImageDescription, exif::In::PRIMARY)
        .unwrap();
    match field.value {
        exif::Value::Ascii(ref v) => assert_eq!(v[0], TEXT.as_bytes()),
        ref other => panic!("unexpected value: {other:?}"),
    }
}

#[test]
fn protect_counts_backup_as_existing_output() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("dunes.jpg");
    std::fs::write(&image, tiny_jpeg()).unwrap();
    std::fs::write(dir.path().join("dunes.jpg.bak"), tiny_jpeg()).unwrap();

    let formats = OutputFormats {
        yaml: false,
        metadata: true,
    };
    let writer = ResultWriter::new(None, formats, OverwritePolicy::Protect);
    let targets = writer.targets(&image);
    assert_eq!(targets.existing(), Some(&dir.path().join("dunes.jpg.bak")));
}

#[test]
fn targets_are_planned_without_touching_disk() {
    let formats = OutputFormats {
        yaml: true,
        metadata: true,
    };
    let t = planned_targets(
        Path::new("/photos/trip/holiday.v2.jpg"),
        formats,
        Some(Path::new("/out")),
    );
    assert_eq!(t.text, PathBuf::from("/out/holiday.v2.txt"));
    assert_eq!(t.yaml, Some(PathBuf::from("/out/holiday.v2.jpg.yml")));
    assert_eq!(t.backup, Some(PathBuf::from("/photos/trip/holiday.v2.jpg.bak")));
    assert_eq!(t.existing(), None);
}

/// `tiny_jpeg` with an EXIF block carrying camera make, capture time and GPS.
fn jpeg_with_camera_exif() -> Vec<u8> {
    let fields = [
        exif::Field {
            tag: exif::Tag::Make,
            ifd_num: exif::In::PRIMARY,
            value: exif::Value::Ascii(vec![b"Acme".to_vec()]),
        },
        exif::Field {
            tag: exif::Tag::DateTimeOriginal,
            ifd_num: exif::In::PRIMARY,
            value: exif::Value::Ascii(vec![b"2021:06:15 10:20:30".to_vec()]),
        },
        exif::Field {
            tag: exif::Tag::GPSLatitudeRef,
            ifd_num: exif::In::PRIMARY,
            value: exif::Value::Ascii(vec![b"N".to_vec()]),
        },
        exif::Field {
            tag: exif::Tag::GPSLatitude,
            ifd_num: exif::In::PRIMARY,
            value: exif::Value::Rational(vec![
                exif::Rational { num: 52, denom: 1 },
                exif::Rational { num: 30, denom: 1 },
                exif::Rational { num: 0, denom: 1 },
            ]),
        },
    ];
    let mut writer = exif::experimental::Writer::new();
    for f in &fields {
        writer.push_field(f);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    let mut app1 = vec![0xFF, 0xE1];
    app1.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(&tiff);

    let mut jpeg = tiny_jpeg();
    // Right after SOI and the 18-byte APP0.
    jpeg.splice(20..20, app1);
    jpeg
}

#[test]
fn embed_keeps_existing_camera_fields() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("street.jpg");
    let original = jpeg_with_camera_exif();
    std::fs::write(&image, &original).unwrap();

    let formats = OutputFormats {
        yaml: true,
        metadata: true,
    };
    let writer = ResultWriter::new(None, formats, OverwritePolicy::Allow);
    let report = written(writer.write(&image, TEXT, &details()).unwrap());
    assert!(report.notes.is_empty(), "notes: {:?}", report.notes);

    let raw = std::fs::read_to_string(dir.path().join("street.jpg.yml")).unwrap();
    let doc: serde_yaml::Value = serde_yaml::from_str(&raw).unwrap();
    assert_eq!(doc["TakenAt"].as_str(), Some("2021-06-15T10:20:30"));

    assert_eq!(std::fs::read(dir.path().join("street.jpg.bak")).unwrap(), original);

    let bytes = std::fs::read(&image).unwrap();
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes.as_slice()))
        .unwrap();
    assert!(!exif.little_endian());

    let make = exif.get_field(exif::Tag::Make, exif::In::PRIMARY).unwrap();
    assert!(make.display_value().to_string().contains("Acme"));
    match exif
        .get_field(exif::Tag::GPSLatitude, exif::In::PRIMARY)
        .unwrap()
        .value
    {
        exif::Value::Rational(ref v) => {
            assert_eq!(v.len(), 3);
            assert_eq!((v[0].num, v[0].denom), (52, 1));
            assert_eq!((v[1].num, v[1].denom), (30, 1));
        }
        ref other => panic!("unexpected value: {other:?}"),
    }
    assert!(exif.get_field(exif::Tag::GPSLatitudeRef, exif::In::PRIMARY).is_some());
    assert!(exif.get_field(exif::Tag::ImageDescription, exif::In::PRIMARY).is_some());
    assert_eq!(
        vision_describe::exif_embed::capture_time(&image).as_deref(),
        Some("2021-06-15T10:20:30")
    );
}
