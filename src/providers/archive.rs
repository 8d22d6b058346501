//! Bundling attachments into a single zip archive.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::delivery::report::Attachment;

pub const ARCHIVE_NAME: &str = "attachments.zip";
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Zip every attachment into one in-memory archive.
///
/// Entry names are the attachment filenames; duplicates get a ` (n)` suffix
/// before the extension so no entry is lost.
pub fn bundle(attachments: &[Attachment]) -> Result<Vec<u8>, ArchiveError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut used = HashSet::new();
    for attachment in attachments {
        let name = unique_name(&attachment.filename, &mut used);
        writer.start_file(name, options)?;
        writer.write_all(&attachment.content)?;
    }

    Ok(writer.finish()?.into_inner())
}

fn unique_name(filename: &str, used: &mut HashSet<String>) -> String {
    let base = if filename.trim().is_empty() {
        "attachment"
    } else {
        filename
    };
    if used.insert(base.to_string()) {
        return base.to_string();
    }

    let (stem, ext) = match base.rfind('.') {
        Some(i) if i > 0 => (&base[..i], &base[i..]),
        _ => (base, ""),
    };
    let mut n = 1;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
