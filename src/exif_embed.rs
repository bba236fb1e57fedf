//! Reading capture time from, and writing descriptions into, JPEG EXIF.

use crate::util::{append_extension, sha256_file, sha256_hex};
use anyhow::{anyhow, bail, Context, Result};
use exif::experimental::Writer;
use exif::{Field, In, Reader, Tag, Value};
use std::fs::{self, File};
use std::io::{BufReader, Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const MARKER_APP0: u8 = 0xE0;
const MARKER_APP1: u8 = 0xE1;
const MARKER_SOS: u8 = 0xDA;
const MARKER_EOI: u8 = 0xD9;

/// Fields that are rewritten by us or hold offsets the writer regenerates.
/// Maker notes carry absolute offsets and do not survive relocation.
const DROPPED_TAGS: &[Tag] = &[
    Tag::ImageDescription,
    Tag::UserComment,
    Tag::ExifIFDPointer,
    Tag::GPSInfoIFDPointer,
    Tag::InteropIFDPointer,
    Tag::JPEGInterchangeFormat,
    Tag::JPEGInterchangeFormatLength,
    Tag::StripOffsets,
    Tag::StripByteCounts,
    Tag::MakerNote,
];

#[derive(Debug, Clone)]
pub struct EmbedOutcome {
    pub backup: PathBuf,
    pub backup_created: bool,
}

/// Only JPEG carries the EXIF tags we write.
pub fn is_embeddable(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false)
}

/// `DateTimeOriginal` (or `DateTime`) as `YYYY-MM-DDTHH:MM:SS`, when present.
pub fn capture_time(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = Reader::new().read_from_container(&mut reader).ok()?;
    let field = exif
        .get_field(Tag::DateTimeOriginal, In::PRIMARY)
        .or_else(|| exif.get_field(Tag::DateTime, In::PRIMARY))?;
    match field.value {
        Value::Ascii(ref vec) if !vec.is_empty() => {
            let dt = exif::DateTime::from_ascii(&vec[0]).ok()?;
            Some(format!(
                "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
                dt.year, dt.month, dt.day, dt.hour, dt.minute, dt.second
            ))
        }
        _ => None,
    }
}

/// Write `text` into the image's EXIF `ImageDescription` and `UserComment`.
///
/// The new file is fully assembled in memory, a `.bak` copy of the original
/// is secured, and only then is the image replaced through a rename. Any
/// error before the rename leaves the original bytes untouched.
pub fn embed_description(image: &Path, text: &str) -> Result<EmbedOutcome> {
    if !is_embeddable(image) {
        bail!("EXIF embedding supports JPEG only: {}", image.display());
    }

    let original =
        fs::read(image).with_context(|| format!("reading image: {}", image.display()))?;
    let existing = Reader::new()
        .read_from_container(&mut Cursor::new(original.as_slice()))
        .ok();
    if existing.is_none() {
        debug!("no readable EXIF in {}; creating a fresh block", image.display());
    }

    let tiff = build_exif(existing.as_ref(), text)?;
    let updated = splice_exif(&original, &tiff)?;

    let backup = append_extension(image, "bak");
    let backup_created = make_backup(image, &backup, &original)?;
    replace_atomically(image, &updated)?;

    info!("wrote EXIF description to {}", image.display());
    Ok(EmbedOutcome {
        backup,
        backup_created,
    })
}

fn build_exif(existing: Option<&exif::Exif>, text: &str) -> Result<Vec<u8>> {
    let little_endian = existing.map(|e| e.little_endian()).unwrap_or(true);

    let mut fields: Vec<Field> = existing
        .map(|e| {
            e.fields()
                .filter(|f| f.ifd_num == In::PRIMARY && !DROPPED_TAGS.contains(&f.tag))
                .filter(|f| !matches!(f.value, Value::Unknown(..)))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    fields.push(Field {
        tag: Tag::ImageDescription,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![text.as_bytes().to_vec()]),
    });
    fields.push(Field {
        tag: Tag::UserComment,
        ifd_num: In::PRIMARY,
        value: Value::Undefined(user_comment(text, little_endian), 0),
    });

    let mut writer = Writer::new();
    for f in &fields {
        writer.push_field(f);
    }
    let mut buf = Cursor::new(Vec::new());
    writer
        .write(&mut buf, little_endian)
        .map_err(|e| anyhow!("encoding EXIF: {e}"))?;
    Ok(buf.into_inner())
}

/// UserComment starts with an 8-byte character code.
fn user_comment(text: &str, little_endian: bool) -> Vec<u8> {
    if text.is_ascii() {
        let mut out = b"ASCII\0\0\0".to_vec();
        out.extend_from_slice(text.as_bytes());
        return out;
    }
    let mut out = b"UNICODE\0".to_vec();
    for unit in text.encode_utf16() {
        let bytes = if little_endian {
            unit.to_le_bytes()
        } else {
            unit.to_be_bytes()
        };
        out.extend_from_slice(&bytes);
    }
    out
}

/// Rebuild the JPEG header with a single EXIF APP1 segment holding `tiff`.
/// The new segment goes right after SOI (and JFIF APP0 when present); any
/// previous EXIF segment is dropped. Scan data is copied verbatim.
fn splice_exif(jpeg: &[u8], tiff: &[u8]) -> Result<Vec<u8>> {
    if jpeg.len() < 4 || jpeg[0] != 0xFF || jpeg[1] != 0xD8 {
        bail!("not a JPEG file (missing SOI marker)");
    }

    let seg_len = 2 + EXIF_PREFIX.len() + tiff.len();
    if seg_len > u16::MAX as usize {
        bail!("EXIF block too large for one APP1 segment ({seg_len} bytes)");
    }
    let mut app1 = Vec::with_capacity(seg_len + 2);
    app1.extend_from_slice(&[0xFF, MARKER_APP1]);
    app1.extend_from_slice(&(seg_len as u16).to_be_bytes());
    app1.extend_from_slice(EXIF_PREFIX);
    app1.extend_from_slice(tiff);

    let mut out = Vec::with_capacity(jpeg.len() + app1.len());
    out.extend_from_slice(&jpeg[..2]);
    let mut inserted = false;
    let mut pos = 2;

    loop {
        if pos + 2 > jpeg.len() {
            bail!("truncated JPEG: no scan data found");
        }
        if jpeg[pos] != 0xFF {
            bail!("invalid JPEG marker at offset {pos}");
        }
        let marker = jpeg[pos + 1];
        if marker == 0xFF {
            // fill byte
            pos += 1;
            continue;
        }
        if marker == MARKER_EOI {
            bail!("truncated JPEG: end of image before scan data");
        }
        if marker == MARKER_SOS {
            if !inserted {
                out.extend_from_slice(&app1);
            }
            out.extend_from_slice(&jpeg[pos..]);
            return Ok(out);
        }

        if pos + 4 > jpeg.len() {
            bail!("truncated JPEG segment at offset {pos}");
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        if len < 2 || pos + 2 + len > jpeg.len() {
            bail!("bad JPEG segment length {len} at offset {pos}");
        }
        let seg = &jpeg[pos..pos + 2 + len];

        if !inserted && marker != MARKER_APP0 {
            out.extend_from_slice(&app1);
            inserted = true;
        }
        let is_exif = marker == MARKER_APP1 && seg[4..].starts_with(EXIF_PREFIX);
        if !is_exif {
            out.extend_from_slice(seg);
        }
        pos += 2 + len;
    }
}

/// Returns whether a new backup was made. An existing backup is kept as is so
/// it always holds the oldest original.
fn make_backup(image: &Path, backup: &Path, original: &[u8]) -> Result<bool> {
    if backup.exists() {
        debug!("backup already present: {}", backup.display());
        return Ok(false);
    }
    fs::copy(image, backup)
        .with_context(|| format!("creating backup: {}", backup.display()))?;

    let expected = sha256_hex(original);
    let actual = sha256_file(backup)?;
    if actual != expected {
        let _ = fs::remove_file(backup);
        bail!("backup verification failed: {}", backup.display());
    }
    info!("created backup at {}", backup.display());
    Ok(true)
}

fn replace_atomically(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    if let Ok(meta) = fs::metadata(target) {
        fs::set_permissions(tmp.path(), meta.permissions())?;
    }
    tmp.persist(target)
        .map_err(|e| e.error)
        .with_context(|| format!("replacing {}", target.display()))?;
    Ok(())
}
