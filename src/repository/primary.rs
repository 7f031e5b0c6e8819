// src/repository/primary.rs

//! Streaming decoder for primary.xml
//!
//! Fedora-scale primary metadata runs to hundreds of megabytes uncompressed;
//! the decoder pulls XML events and materializes each `Package` as soon as
//! its closing tag is seen. Nothing resembling a DOM is ever built.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::metadata::{Checksum, Entry, Package, RepoId};
use crate::version::{EntryFlags, RpmVersion};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryList {
    Requires,
    Provides,
    Conflicts,
}

#[derive(Default)]
struct PackageBuilder {
    name: String,
    arch: String,
    epoch: u64,
    ver: String,
    rel: Option<String>,
    checksum: Checksum,
    location_href: String,
    requires: Vec<Entry>,
    provides: Vec<Entry>,
    conflicts: Vec<Entry>,
    files: Vec<String>,
}

impl PackageBuilder {
    fn build(self, repository: RepoId, source: &str) -> Result<Package> {
        if self.name.is_empty() {
            return Err(Error::MetadataDecode {
                file: source.to_string(),
                reason: "package element without a name".to_string(),
            });
        }
        Ok(Package {
            name: self.name,
            arch: self.arch,
            version: RpmVersion::new(self.epoch, self.ver, self.rel),
            checksum: self.checksum,
            location_href: self.location_href,
            repository,
            requires: self.requires,
            provides: self.provides,
            conflicts: self.conflicts,
            files: self.files,
        })
    }
}

/// Parse a decompressed primary.xml stream into packages
///
/// Only packages whose arch is listed in `arches` are kept. `source` labels
/// decode errors with the originating file.
pub fn parse_primary<R: BufRead>(
    reader: R,
    repository: RepoId,
    arches: &[&str],
    source: &str,
    cancel: &CancelToken,
) -> Result<Vec<Package>> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let decode_err = |e: quick_xml::Error| Error::MetadataDecode {
        file: source.to_string(),
        reason: e.to_string(),
    };

    let mut packages = Vec::new();
    let mut builder: Option<PackageBuilder> = None;
    let mut in_format = false;
    let mut current_list: Option<EntryList> = None;
    let mut checksum_algorithm = String::new();
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        let event = xml.read_event_into(&mut buf).map_err(decode_err)?;
        match event {
            Event::Start(ref e) => {
                text.clear();
                match e.local_name().as_ref() {
                    b"package" => {
                        builder = Some(PackageBuilder::default());
                        in_format = false;
                        current_list = None;
                    }
                    b"format" => in_format = true,
                    b"requires" if in_format => current_list = Some(EntryList::Requires),
                    b"provides" if in_format => current_list = Some(EntryList::Provides),
                    b"conflicts" if in_format => current_list = Some(EntryList::Conflicts),
                    b"checksum" => {
                        checksum_algorithm = attribute(e, b"type", source)?.unwrap_or_default();
                    }
                    b"entry" => push_entry(e, builder.as_mut(), current_list, source)?,
                    _ => {}
                }
            }
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"version" if !in_format => {
                    if let Some(b) = builder.as_mut() {
                        b.epoch = attribute(e, b"epoch", source)?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                        b.ver = attribute(e, b"ver", source)?.unwrap_or_default();
                        b.rel = attribute(e, b"rel", source)?;
                    }
                }
                b"location" => {
                    if let Some(b) = builder.as_mut() {
                        b.location_href = attribute(e, b"href", source)?.unwrap_or_default();
                    }
                }
                b"entry" => push_entry(e, builder.as_mut(), current_list, source)?,
                _ => {}
            },
            Event::Text(t) => {
                text.push_str(&t.unescape().map_err(decode_err)?);
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"package" => {
                    if let Some(b) = builder.take() {
                        cancel.check()?;
                        if arches.contains(&b.arch.as_str()) {
                            packages.push(b.build(repository, source)?);
                        } else {
                            trace!(name = %b.name, arch = %b.arch, "skipping foreign arch");
                        }
                    }
                }
                b"format" => in_format = false,
                b"requires" | b"provides" | b"conflicts" => current_list = None,
                b"name" if !in_format => {
                    if let Some(b) = builder.as_mut() {
                        b.name = std::mem::take(&mut text);
                    }
                }
                b"arch" if !in_format => {
                    if let Some(b) = builder.as_mut() {
                        b.arch = std::mem::take(&mut text);
                    }
                }
                b"checksum" => {
                    if let Some(b) = builder.as_mut() {
                        b.checksum = Checksum {
                            algorithm: std::mem::take(&mut checksum_algorithm),
                            hex: std::mem::take(&mut text),
                        };
                    }
                }
                b"file" => {
                    if let Some(b) = builder.as_mut() {
                        if in_format {
                            b.files.push(std::mem::take(&mut text));
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(packages)
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

fn push_entry(
    e: &BytesStart<'_>,
    builder: Option<&mut PackageBuilder>,
    current_list: Option<EntryList>,
    source: &str,
) -> Result<()> {
    let (builder, list) = match (builder, current_list) {
        (Some(b), Some(l)) => (b, l),
        _ => return Ok(()),
    };

    let name = match attribute(e, b"name", source)? {
        Some(name) => name,
        None => return Ok(()),
    };

    // internal rpmlib() capabilities are satisfied by rpm itself
    if name.starts_with("rpmlib(") {
        return Ok(());
    }

    let entry = Entry {
        name,
        flags: attribute(e, b"flags", source)?
            .as_deref()
            .and_then(EntryFlags::parse),
        epoch: attribute(e, b"epoch", source)?.and_then(|v| v.parse().ok()),
        version: attribute(e, b"ver", source)?,
        release: attribute(e, b"rel", source)?,
    };

    match list {
        EntryList::Requires => builder.requires.push(entry),
        EntryList::Provides => builder.provides.push(entry),
        EntryList::Conflicts => builder.conflicts.push(entry),
    }
    Ok(())
}
