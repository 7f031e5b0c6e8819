// src/repository/filelists.rs

//! Streaming selector over filelists.xml
//!
//! filelists.xml is far too large to materialize. Targets are sorted by
//! (name, version) and matched against the stream in a single pass; a
//! `<package>` element is fully decoded only when its name is currently
//! sought. Targets the stream never reached are handed back so the caller
//! can try the next repository.

use crate::error::{Error, Result};
use crate::metadata::{FileListPackage, Package};
use crate::version::RpmVersion;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use tracing::trace;

enum StreamStep {
    Package { name: String, arch: String },
    Other,
    Eof,
}

/// Select the file lists of `targets` from a decompressed filelists.xml
/// stream
///
/// Returns the decoded file lists plus the targets that were not found in
/// this stream.
pub fn filelists_for_packages<R: BufRead>(
    reader: R,
    arches: &[&str],
    targets: &[Package],
    source: &str,
) -> Result<(Vec<FileListPackage>, Vec<Package>)> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut sorted: Vec<&Package> = targets.iter().collect();
    sorted.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.version.cmp(&b.version))
    });

    let mut found = Vec::new();
    let mut remaining = Vec::new();
    let mut idx = 0;
    let mut buf = Vec::new();

    while idx < sorted.len() {
        let step = {
            buf.clear();
            match xml.read_event_into(&mut buf).map_err(|e| decode_err(source, e))? {
                Event::Start(ref e) if e.local_name().as_ref() == b"package" => {
                    StreamStep::Package {
                        name: attribute(e, b"name", source)?.unwrap_or_default(),
                        arch: attribute(e, b"arch", source)?.unwrap_or_default(),
                    }
                }
                Event::Eof => StreamStep::Eof,
                _ => StreamStep::Other,
            }
        };

        let (name, arch) = match step {
            StreamStep::Package { name, arch } => (name, arch),
            StreamStep::Other => continue,
            StreamStep::Eof => break,
        };

        if !arches.contains(&arch.as_str()) {
            continue;
        }

        let mut decoded: Option<FileListPackage> = None;
        while idx < sorted.len() {
            let current = sorted[idx];
            if name.as_str() < current.name.as_str() {
                // stream is behind the targets; skip this element
                break;
            } else if current.name == name {
                if decoded.is_none() {
                    decoded = Some(decode_package(&mut xml, &name, &arch, source)?);
                }
                if let Some(flp) = decoded.as_ref() {
                    if current.to_string() == flp.to_string() {
                        idx += 1;
                        found.push(flp.clone());
                    }
                }
                break;
            } else {
                trace!(package = %current, "not in this repository, deferring");
                remaining.push(current.clone());
                idx += 1;
            }
        }
    }

    // targets the stream never reached go to the next repository as well
    remaining.extend(sorted[idx..].iter().map(|p| (*p).clone()));

    Ok((found, remaining))
}

/// Decode the body of a `<package>` element we are positioned inside of
fn decode_package<R: BufRead>(
    xml: &mut Reader<R>,
    name: &str,
    arch: &str,
    source: &str,
) -> Result<FileListPackage> {
    let mut version = RpmVersion::new(0, "", None);
    let mut files = Vec::new();
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match xml.read_event_into(&mut buf).map_err(|e| decode_err(source, e))? {
            Event::Empty(ref e) if e.local_name().as_ref() == b"version" => {
                version = RpmVersion::new(
                    attribute(e, b"epoch", source)?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0),
                    attribute(e, b"ver", source)?.unwrap_or_default(),
                    attribute(e, b"rel", source)?,
                );
            }
            Event::Start(_) => text.clear(),
            Event::Text(t) => text.push_str(&t.unescape().map_err(|e| decode_err(source, e))?),
            Event::End(ref e) => match e.local_name().as_ref() {
                b"file" => files.push(std::mem::take(&mut text)),
                b"package" => break,
                _ => {}
            },
            Event::Eof => {
                return Err(Error::MetadataDecode {
                    file: source.to_string(),
                    reason: "unexpected end of stream inside package element".to_string(),
                })
            }
            _ => {}
        }
    }

    Ok(FileListPackage {
        name: name.to_string(),
        arch: arch.to_string(),
        version,
        files,
    })
}

fn attribute(e: &BytesStart<'_>, key: &[u8], source: &str) -> Result<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == key {
            let value = attr.unescape_value().map_err(|err| Error::MetadataDecode {
                file: source.to_string(),
                reason: err.to_string(),
            })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn decode_err(source: &str, e: quick_xml::Error) -> Error {
    Error::MetadataDecode {
        file: source.to_string(),
        reason: e.to_string(),
    }
}
