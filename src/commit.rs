//! Commit and tag objects.
//!
//! Both use the same text layout: an ordered block of `key SP value` header
//! lines, a blank line, then the free-form message. Header values spanning
//! several lines continue on lines that start with a single space.

use std::fmt;

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::ObjectKind;

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// An author, committer or tagger line: `Name <email> seconds +hhmm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch.
    pub time: i64,
    /// Offset from UTC in minutes (east is positive).
    pub offset_minutes: i32,
}

impl Signature {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        time: i64,
        offset_minutes: i32,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time,
            offset_minutes,
        }
    }

    /// A signature stamped with the current local time and UTC offset.
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        let now = chrono::Local::now();
        let offset = now.offset().local_minus_utc() / 60;
        Self::new(name, email, now.timestamp(), offset)
    }

    /// Parse `Name <email> seconds +hhmm`.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| Error::corrupt("signature is not valid UTF-8"))?;
        let lt = text
            .find('<')
            .ok_or_else(|| Error::corrupt(format!("signature has no email: {:?}", text)))?;
        let gt = text[lt..]
            .find('>')
            .map(|i| lt + i)
            .ok_or_else(|| Error::corrupt(format!("signature email unterminated: {:?}", text)))?;

        let name = text[..lt].trim_end().to_string();
        let email = text[lt + 1..gt].to_string();

        let mut rest = text[gt + 1..].split_whitespace();
        let time = rest
            .next()
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or_else(|| Error::corrupt(format!("signature has no timestamp: {:?}", text)))?;
        let tz = rest
            .next()
            .ok_or_else(|| Error::corrupt(format!("signature has no timezone: {:?}", text)))?;
        let offset_minutes = parse_offset(tz)?;

        Ok(Self {
            name,
            email,
            time,
            offset_minutes,
        })
    }
}

fn parse_offset(tz: &str) -> Result<i32> {
    let bad = || Error::corrupt(format!("bad timezone offset {:?}", tz));
    if tz.len() != 5 {
        return Err(bad());
    }
    let sign = match &tz[..1] {
        "+" => 1,
        "-" => -1,
        _ => return Err(bad()),
    };
    let hours: i32 = tz[1..3].parse().map_err(|_| bad())?;
    let minutes: i32 = tz[3..5].parse().map_err(|_| bad())?;
    Ok(sign * (hours * 60 + minutes))
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let abs = self.offset_minutes.abs();
        write!(
            f,
            "{} <{}> {} {}{:02}{:02}",
            self.name,
            self.email,
            self.time,
            sign,
            abs / 60,
            abs % 60
        )
    }
}

// ---------------------------------------------------------------------------
// Header block codec
// ---------------------------------------------------------------------------

/// Ordered header lines plus the message that follows the blank line.
#[derive(Debug, Default)]
struct HeaderBlock {
    headers: Vec<(String, Vec<u8>)>,
    message: Vec<u8>,
}

impl HeaderBlock {
    fn parse(data: &[u8]) -> Result<Self> {
        let mut block = HeaderBlock::default();
        let mut pos = 0;

        loop {
            if pos >= data.len() {
                // No blank line: headers only, empty message.
                return Ok(block);
            }
            let end = data[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|i| pos + i)
                .unwrap_or(data.len());
            let line = &data[pos..end];
            let next = (end + 1).min(data.len());

            if line.is_empty() {
                block.message = data[next..].to_vec();
                return Ok(block);
            }

            if line[0] == b' ' {
                let (_, value) = block
                    .headers
                    .last_mut()
                    .ok_or_else(|| Error::corrupt("continuation line before any header"))?;
                value.push(b'\n');
                value.extend_from_slice(&line[1..]);
            } else {
                let space = line
                    .iter()
                    .position(|&b| b == b' ')
                    .ok_or_else(|| {
                        Error::corrupt(format!(
                            "header line without value: {:?}",
                            String::from_utf8_lossy(line)
                        ))
                    })?;
                let key = std::str::from_utf8(&line[..space])
                    .map_err(|_| Error::corrupt("header key is not valid UTF-8"))?
                    .to_string();
                block.headers.push((key, line[space + 1..].to_vec()));
            }
            pos = end + 1;
        }
    }

    fn push(out: &mut Vec<u8>, key: &str, value: &[u8]) {
        out.extend_from_slice(key.as_bytes());
        out.push(b' ');
        for &b in value {
            out.push(b);
            if b == b'\n' {
                out.push(b' ');
            }
        }
        out.push(b'\n');
    }
}

fn parse_id(key: &str, value: &[u8]) -> Result<ObjectId> {
    let text = std::str::from_utf8(value)
        .map_err(|_| Error::corrupt(format!("'{}' header is not ASCII", key)))?;
    ObjectId::from_hex(text)
        .map_err(|_| Error::corrupt(format!("'{}' header is not an object id: {:?}", key, text)))
}

fn utf8_message(raw: Vec<u8>) -> Result<String> {
    String::from_utf8(raw).map_err(|_| Error::corrupt("message is not valid UTF-8"))
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

const COMMIT_KEYS: [&str; 4] = ["tree", "parent", "author", "committer"];

/// A tree snapshot plus parents, identities and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    /// Headers after `committer` that this crate does not interpret
    /// (e.g. `encoding`, `gpgsig`), kept in order. Parsing rejects them
    /// anywhere else.
    pub extra_headers: Vec<(String, Vec<u8>)>,
    pub message: String,
}

impl Commit {
    /// A commit whose committer is its author.
    pub fn new(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: Signature,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            parents,
            committer: author.clone(),
            author,
            extra_headers: Vec::new(),
            message: message.into(),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        HeaderBlock::push(&mut out, "tree", self.tree.to_hex().as_bytes());
        for parent in &self.parents {
            HeaderBlock::push(&mut out, "parent", parent.to_hex().as_bytes());
        }
        HeaderBlock::push(&mut out, "author", self.author.to_string().as_bytes());
        HeaderBlock::push(&mut out, "committer", self.committer.to_string().as_bytes());
        for (key, value) in &self.extra_headers {
            HeaderBlock::push(&mut out, key, value);
        }
        out.push(b'\n');
        out.extend_from_slice(self.message.as_bytes());
        out
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let block = HeaderBlock::parse(data)?;

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut extra_headers = Vec::new();

        // Core headers appear once each, in this order, before any others.
        for (key, value) in block.headers {
            match key.as_str() {
                "tree" if tree.is_none() => tree = Some(parse_id("tree", &value)?),
                "parent" if tree.is_some() && author.is_none() => {
                    parents.push(parse_id("parent", &value)?)
                }
                "author" if tree.is_some() && author.is_none() => {
                    author = Some(Signature::parse(&value)?)
                }
                "committer" if author.is_some() && committer.is_none() => {
                    committer = Some(Signature::parse(&value)?)
                }
                _ if committer.is_some() && !COMMIT_KEYS.contains(&key.as_str()) => {
                    extra_headers.push((key, value))
                }
                _ => return Err(Error::corrupt(format!("commit header '{}' out of place", key))),
            }
        }

        Ok(Self {
            tree: tree.ok_or_else(|| Error::corrupt("commit has no tree"))?,
            parents,
            author: author.ok_or_else(|| Error::corrupt("commit has no author"))?,
            committer: committer.ok_or_else(|| Error::corrupt("commit has no committer"))?,
            extra_headers,
            message: utf8_message(block.message)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

const TAG_KEYS: [&str; 4] = ["object", "type", "tag", "tagger"];

/// An annotated pointer to another object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub target: ObjectId,
    pub target_kind: ObjectKind,
    pub name: String,
    pub tagger: Option<Signature>,
    pub extra_headers: Vec<(String, Vec<u8>)>,
    pub message: String,
}

impl Tag {
    pub fn new(
        target: ObjectId,
        target_kind: ObjectKind,
        name: impl Into<String>,
        tagger: Signature,
        message: impl Into<String>,
    ) -> Self {
        Self {
            target,
            target_kind,
            name: name.into(),
            tagger: Some(tagger),
            extra_headers: Vec::new(),
            message: message.into(),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        HeaderBlock::push(&mut out, "object", self.target.to_hex().as_bytes());
        HeaderBlock::push(&mut out, "type", self.target_kind.as_str().as_bytes());
        HeaderBlock::push(&mut out, "tag", self.name.as_bytes());
        if let Some(tagger) = &self.tagger {
            HeaderBlock::push(&mut out, "tagger", tagger.to_string().as_bytes());
        }
        for (key, value) in &self.extra_headers {
            HeaderBlock::push(&mut out, key, value);
        }
        out.push(b'\n');
        out.extend_from_slice(self.message.as_bytes());
        out
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let block = HeaderBlock::parse(data)?;

        let mut target = None;
        let mut target_kind = None;
        let mut name = None;
        let mut tagger = None;
        let mut extra_headers = Vec::new();

        for (key, value) in block.headers {
            match key.as_str() {
                "object" if target.is_none() => target = Some(parse_id("object", &value)?),
                "type" if target.is_some() && target_kind.is_none() => {
                    target_kind = Some(ObjectKind::from_bytes(&value)?)
                }
                "tag" if target_kind.is_some() && name.is_none() => {
                    name = Some(
                        String::from_utf8(value)
                            .map_err(|_| Error::corrupt("tag name is not valid UTF-8"))?,
                    )
                }
                "tagger" if name.is_some() && tagger.is_none() && extra_headers.is_empty() => {
                    tagger = Some(Signature::parse(&value)?)
                }
                _ if name.is_some() && !TAG_KEYS.contains(&key.as_str()) => {
                    extra_headers.push((key, value))
                }
                _ => return Err(Error::corrupt(format!("tag header '{}' out of place", key))),
            }
        }

        Ok(Self {
            target: target.ok_or_else(|| Error::corrupt("tag has no object"))?,
            target_kind: target_kind.ok_or_else(|| Error::corrupt("tag has no type"))?,
            name: name.ok_or_else(|| Error::corrupt("tag has no name"))?,
            tagger,
            extra_headers,
            message: utf8_message(block.message)?,
        })
    }
}
