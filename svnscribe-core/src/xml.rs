//! XML decoders for SVN client output.
//!
//! Three shapes are consumed, all produced by `svn --xml`:
//! - `svn log --verbose`: one `<logentry>` with a `<paths>` block
//! - `svn ls`: `<lists>` with one `<list>` per requested URI, in document order
//! - `svn ls -R`: a single `<list>` whose entry names are slash-separated
//!   relative paths
//!
//! The flat-list decoder is order-preserving. SVN batch output carries no
//! request echo, so callers bind requests to `<list>` elements positionally.

use crate::change::{FileKind, LogEntry, PathAction, RawPath};
use crate::error::{ParseError, Result};
use crate::paths;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Decode a `svn log --verbose --xml` document into a [`LogEntry`].
///
/// A `<logentry>` without a `<paths>` block decodes to an empty path list;
/// some historical repositories contain such commits.
pub fn decode_log(xml: &str) -> Result<LogEntry> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut rev: Option<u64> = None;
    let mut raw_paths = Vec::new();

    let mut current: Option<RawPath> = None;
    let mut text = String::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"logentry" => {
                    let value = attr(e, "revision")?
                        .ok_or_else(|| protocol("logentry without revision attribute"))?;
                    rev = Some(parse_rev(&value)?);
                }
                b"path" => {
                    let action_raw = attr(e, "action")?
                        .ok_or_else(|| protocol("path without action attribute"))?;
                    let action = PathAction::from_letter(&action_raw)
                        .ok_or_else(|| protocol(format!("unknown path action {:?}", action_raw)))?;
                    let copy_from_path = attr(e, "copyfrom-path")?;
                    let copy_from_rev = match attr(e, "copyfrom-rev")? {
                        Some(v) => Some(parse_rev(&v)?),
                        None => None,
                    };
                    current = Some(RawPath {
                        path: String::new(),
                        action,
                        copy_from_path,
                        copy_from_rev,
                    });
                    text.clear();
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if current.is_some() {
                    text.push_str(
                        &t.unescape()
                            .map_err(|e| protocol(format!("bad text content: {}", e)))?,
                    );
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"path" {
                    if let Some(mut raw) = current.take() {
                        raw.path = text.clone();
                        raw_paths.push(raw);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(protocol(format!("malformed log XML: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    let rev = rev.ok_or_else(|| protocol("log output without a logentry"))?;
    Ok(LogEntry { rev, paths: raw_paths })
}

/// Decode a `svn ls --xml` document into one `(uri, entries)` tuple per
/// `<list>` element, in document order.
///
/// The `path` attribute is percent-decoded because SVN re-encodes it.
pub fn decode_flat_list(xml: &str) -> Result<Vec<(String, Vec<(String, FileKind)>)>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut lists: Vec<(String, Vec<(String, FileKind)>)> = Vec::new();
    let mut entry_kind: Option<FileKind> = None;
    let mut in_name = false;
    let mut name = String::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"list" => {
                    let uri = attr(e, "path")?
                        .ok_or_else(|| protocol("list without path attribute"))?;
                    lists.push((paths::decode(&uri), Vec::new()));
                }
                b"entry" => {
                    let kind_raw = attr(e, "kind")?
                        .ok_or_else(|| protocol("entry without kind attribute"))?;
                    entry_kind = Some(kind_from_str(&kind_raw)?);
                    name.clear();
                }
                b"name" => {
                    in_name = true;
                }
                _ => {}
            },
            // SVN self-closes a listing with no entries.
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"list" => {
                let uri = attr(e, "path")?
                    .ok_or_else(|| protocol("list without path attribute"))?;
                lists.push((paths::decode(&uri), Vec::new()));
            }
            Ok(Event::Text(t)) => {
                if in_name {
                    name.push_str(
                        &t.unescape()
                            .map_err(|e| protocol(format!("bad text content: {}", e)))?,
                    );
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"name" => {
                    in_name = false;
                }
                b"entry" => {
                    let kind = entry_kind
                        .take()
                        .ok_or_else(|| protocol("entry end without start"))?;
                    let list = lists
                        .last_mut()
                        .ok_or_else(|| protocol("entry outside of a list"))?;
                    list.1.push((std::mem::take(&mut name), kind));
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(protocol(format!("malformed list XML: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(lists)
}

/// Decode a `svn ls -R --xml` document: the entries of its single `<list>`,
/// in document order, as `(relative_path, kind)` pairs.
pub fn decode_recursive_list(xml: &str) -> Result<Vec<(String, FileKind)>> {
    let mut lists = decode_flat_list(xml)?;
    if lists.is_empty() {
        return Err(protocol("recursive list output without a list element"));
    }
    Ok(lists.remove(0).1)
}

fn kind_from_str(kind: &str) -> Result<FileKind> {
    match kind {
        "file" => Ok(FileKind::File),
        "dir" => Ok(FileKind::Directory),
        other => Err(protocol(format!("unknown entry kind {:?}", other))),
    }
}

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    let attr = e
        .try_get_attribute(name)
        .map_err(|err| protocol(format!("bad attribute {}: {}", name, err)))?;
    match attr {
        Some(a) => {
            let value = a
                .unescape_value()
                .map_err(|err| protocol(format!("bad attribute value {}: {}", name, err)))?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

fn parse_rev(value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| protocol(format!("bad revision number {:?}", value)))
}

fn protocol(msg: impl Into<String>) -> ParseError {
    ParseError::Protocol(msg.into())
}
