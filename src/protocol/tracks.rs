use std::io::{Cursor, Read};

use base64::prelude::*;
use byteorder::{BigEndian, ReadBytesExt};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    common::errors::{LavaError, Result},
    protocol::events::TrackException,
};

/// Flag bit in the blob header marking that a version byte follows.
const TRACK_INFO_VERSIONED: u32 = 1;

/// Newest Lavaplayer blob version this client understands.
const MAX_TRACK_VERSION: u8 = 3;

/// A track as the node knows it: the opaque base64 blob the node wants back
/// in `play`, plus the metadata decoded from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Base64 track blob. Sent back verbatim when playing.
    #[serde(alias = "track")]
    pub encoded: String,
    #[serde(default)]
    pub info: TrackInfo,
}

/// Metadata for an audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    /// Duration in milliseconds. 0 for live streams.
    pub length: u64,
    pub is_stream: bool,
    /// Start position in milliseconds.
    pub position: u64,
    pub title: String,
    pub uri: Option<String>,
    pub artwork_url: Option<String>,
    pub isrc: Option<String>,
    pub source_name: String,
}

impl Track {
    /// Builds a track from metadata, producing a version 3 blob.
    pub fn new(info: TrackInfo) -> Self {
        let encoded = encode_info(&info);
        Self { encoded, info }
    }

    /// Wraps a blob received from the node.
    ///
    /// Metadata is decoded when the blob is readable; an unreadable blob is
    /// kept as-is with empty metadata, since the node is the one that has to
    /// understand it.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        let encoded = encoded.into();
        match Self::decode(&encoded) {
            Ok(track) => track,
            Err(e) => {
                tracing::trace!("keeping opaque track blob: {}", e);
                Self {
                    encoded,
                    info: TrackInfo::default(),
                }
            }
        }
    }

    /// Decodes a Lavaplayer track blob (versions 1 to 3).
    pub fn decode(encoded: &str) -> Result<Self> {
        let data = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| LavaError::ProtocolParse(format!("track blob is not base64: {e}")))?;
        if data.len() < 4 {
            return Err(LavaError::ProtocolParse("track blob too short".into()));
        }

        let mut cursor = Cursor::new(data);
        let header = cursor.read_u32::<BigEndian>().map_err(truncated)?;
        let flags = (header >> 30) & 0x03;

        let version = if flags & TRACK_INFO_VERSIONED != 0 {
            cursor.read_u8().map_err(truncated)?
        } else {
            1
        };
        if version > MAX_TRACK_VERSION {
            return Err(LavaError::ProtocolParse(format!(
                "unsupported track blob version {version}"
            )));
        }

        let title = read_utf(&mut cursor)?;
        let author = read_utf(&mut cursor)?;
        let length = cursor.read_u64::<BigEndian>().map_err(truncated)?;
        let identifier = read_utf(&mut cursor)?;
        let is_stream = cursor.read_u8().map_err(truncated)? != 0;

        let uri = if version >= 2 {
            read_opt_utf(&mut cursor)?
        } else {
            None
        };
        let (artwork_url, isrc) = if version >= 3 {
            (read_opt_utf(&mut cursor)?, read_opt_utf(&mut cursor)?)
        } else {
            (None, None)
        };

        let source_name = read_utf(&mut cursor)?;
        let position = cursor.read_u64::<BigEndian>().unwrap_or(0);

        Ok(Self {
            encoded: encoded.to_string(),
            info: TrackInfo {
                identifier,
                is_seekable: !is_stream,
                author,
                length,
                is_stream,
                position,
                title,
                uri,
                artwork_url,
                isrc,
                source_name,
            },
        })
    }

    /// Label for logs: the title when known, otherwise the identifier.
    pub fn label(&self) -> &str {
        if !self.info.title.is_empty() {
            &self.info.title
        } else if !self.info.identifier.is_empty() {
            &self.info.identifier
        } else {
            "<unknown track>"
        }
    }
}

fn encode_info(info: &TrackInfo) -> String {
    let mut body = vec![MAX_TRACK_VERSION];
    write_utf(&mut body, &info.title);
    write_utf(&mut body, &info.author);
    body.extend_from_slice(&info.length.to_be_bytes());
    write_utf(&mut body, &info.identifier);
    body.push(u8::from(info.is_stream));
    write_opt_utf(&mut body, info.uri.as_deref());
    write_opt_utf(&mut body, info.artwork_url.as_deref());
    write_opt_utf(&mut body, info.isrc.as_deref());
    write_utf(&mut body, &info.source_name);
    body.extend_from_slice(&info.position.to_be_bytes());

    let header = (body.len() as u32) | (TRACK_INFO_VERSIONED << 30);
    let mut blob = Vec::with_capacity(body.len() + 4);
    blob.extend_from_slice(&header.to_be_bytes());
    blob.extend_from_slice(&body);
    BASE64_STANDARD.encode(&blob)
}

/// Writes a length-prefixed string in Java's modified UTF-8: NUL is two
/// bytes and characters outside the BMP are surrogate pairs of three bytes
/// each. Strings longer than the `u16` prefix allows are cut at the last
/// whole character that fits.
fn write_utf(w: &mut Vec<u8>, s: &str) {
    let mut encoded = Vec::with_capacity(s.len());
    let mut units = [0u16; 2];
    for c in s.chars() {
        let start = encoded.len();
        for &unit in c.encode_utf16(&mut units).iter() {
            push_modified_utf8(&mut encoded, unit);
        }
        if encoded.len() > u16::MAX as usize {
            encoded.truncate(start);
            break;
        }
    }
    w.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
    w.extend_from_slice(&encoded);
}

fn push_modified_utf8(w: &mut Vec<u8>, unit: u16) {
    match unit {
        0x0001..=0x007F => w.push(unit as u8),
        0x0000 | 0x0080..=0x07FF => {
            w.push(0xC0 | (unit >> 6) as u8);
            w.push(0x80 | (unit & 0x3F) as u8);
        }
        _ => {
            w.push(0xE0 | (unit >> 12) as u8);
            w.push(0x80 | ((unit >> 6) & 0x3F) as u8);
            w.push(0x80 | (unit & 0x3F) as u8);
        }
    }
}

fn write_opt_utf(w: &mut Vec<u8>, s: Option<&str>) {
    match s {
        Some(s) => {
            w.push(1);
            write_utf(w, s);
        }
        None => w.push(0),
    }
}

fn truncated(e: std::io::Error) -> LavaError {
    LavaError::ProtocolParse(format!("truncated track blob: {e}"))
}

fn read_utf<R: Read>(r: &mut R) -> Result<String> {
    let len = r.read_u16::<BigEndian>().map_err(truncated)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(truncated)?;
    decode_modified_utf8(&buf)
}

fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let malformed = || LavaError::ProtocolParse("malformed string in track blob".into());
    let continuation = |b: Option<&u8>| match b {
        Some(&b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
        _ => Err(malformed()),
    };

    let mut units = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter();
    while let Some(&b) = iter.next() {
        let unit = match b {
            0x00..=0x7F => u16::from(b),
            0xC0..=0xDF => (u16::from(b & 0x1F) << 6) | continuation(iter.next())?,
            0xE0..=0xEF => {
                let hi = continuation(iter.next())?;
                let lo = continuation(iter.next())?;
                (u16::from(b & 0x0F) << 12) | (hi << 6) | lo
            }
            _ => return Err(malformed()),
        };
        units.push(unit);
    }
    String::from_utf16(&units).map_err(|_| malformed())
}

fn read_opt_utf<R: Read>(r: &mut R) -> Result<Option<String>> {
    let present = r.read_u8().map_err(truncated)? != 0;
    if present { read_utf(r).map(Some) } else { Ok(None) }
}

/// Deserializes a track field that is either a bare blob string (v3 events)
/// or a full track object (v4 events).
pub fn deserialize_event_track<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Track>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Encoded(String),
        Full(Track),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Encoded(encoded)) => Some(Track::from_encoded(encoded)),
        Some(Raw::Full(track)) => Some(track),
        None => None,
    })
}

/// Kind of result returned by a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    #[serde(alias = "track")]
    TrackLoaded,
    #[serde(alias = "playlist")]
    PlaylistLoaded,
    #[serde(alias = "search")]
    SearchResult,
    #[serde(alias = "empty")]
    NoMatches,
    #[serde(alias = "error")]
    LoadFailed,
}

/// Playlist metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaylistInfo {
    pub name: Option<String>,
    /// Index of the selected track, or -1 if none.
    pub selected_track: i32,
}

/// Outcome of a track load on the node.
///
/// Which of `tracks` / `playlist_info` carries meaning depends on
/// `load_type`; use the accessors rather than the raw fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResult {
    pub load_type: LoadType,
    #[serde(default)]
    pub playlist_info: Option<PlaylistInfo>,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub exception: Option<TrackException>,
}

impl LoadResult {
    /// Playlist info, only for playlist loads.
    pub fn playlist(&self) -> Option<&PlaylistInfo> {
        match self.load_type {
            LoadType::PlaylistLoaded => self.playlist_info.as_ref(),
            _ => None,
        }
    }

    /// Loaded tracks; empty for failed or empty loads.
    pub fn tracks(&self) -> &[Track] {
        match self.load_type {
            LoadType::TrackLoaded | LoadType::PlaylistLoaded | LoadType::SearchResult => {
                &self.tracks
            }
            LoadType::NoMatches | LoadType::LoadFailed => &[],
        }
    }

    /// The playlist's selected track, when the node marked one.
    pub fn selected_track(&self) -> Option<&Track> {
        let index = usize::try_from(self.playlist()?.selected_track).ok()?;
        self.tracks.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> TrackInfo {
        TrackInfo {
            identifier: "dQw4w9WgXcQ".to_string(),
            is_seekable: true,
            author: "Rick Astley".to_string(),
            length: 212000,
            is_stream: false,
            position: 0,
            title: "Never Gonna Give You Up".to_string(),
            uri: Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string()),
            artwork_url: None,
            isrc: Some("GBARL9300135".to_string()),
            source_name: "youtube".to_string(),
        }
    }

    #[test]
    fn decodes_blob_built_from_info() {
        let track = Track::new(sample_info());
        let decoded = Track::decode(&track.encoded).expect("decode should succeed");
        assert_eq!(decoded.info, sample_info());
    }

    #[test]
    fn header_carries_versioned_flag() {
        let track = Track::new(sample_info());
        let raw = BASE64_STANDARD.decode(&track.encoded).unwrap();
        let header = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        assert_eq!((header >> 30) & 1, 1);
        assert_eq!(raw[4], 3);
    }

    #[test]
    fn rejects_garbage_blobs() {
        assert!(Track::decode("not_valid_base64!!!").is_err());
        let short = BASE64_STANDARD.encode([1u8, 2u8, 3u8]);
        assert!(Track::decode(&short).is_err());
    }

    #[test]
    fn strings_use_java_modified_utf8() {
        let mut w = Vec::new();
        write_utf(&mut w, "a\0\u{e9}\u{1F600}");
        assert_eq!(
            w,
            [0, 11, b'a', 0xC0, 0x80, 0xC3, 0xA9, 0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80]
        );
        assert_eq!(decode_modified_utf8(&w[2..]).unwrap(), "a\0\u{e9}\u{1F600}");
    }

    #[test]
    fn non_ascii_metadata_survives_a_blob() {
        let info = TrackInfo {
            title: "Bohemian Rhapsody \u{1F3B8} (Live at Wembley '86)".to_string(),
            author: "Queen \u{00B7} \u{30AF}\u{30A4}\u{30FC}\u{30F3}".to_string(),
            ..sample_info()
        };
        let decoded = Track::decode(&Track::new(info.clone()).encoded).unwrap();
        assert_eq!(decoded.info, info);
    }

    #[test]
    fn oversized_title_is_cut_on_a_char_boundary() {
        // Two bytes per char against an odd limit.
        let title = "\u{e9}".repeat(40_000);
        let track = Track::new(TrackInfo {
            title: title.clone(),
            ..sample_info()
        });

        let decoded = Track::decode(&track.encoded).unwrap();
        assert_eq!(decoded.info.title.chars().count(), u16::MAX as usize / 2);
        assert!(title.starts_with(&decoded.info.title));
        assert_eq!(decoded.info.author, "Rick Astley");
    }

    #[test]
    fn rejects_broken_string_bytes() {
        assert!(decode_modified_utf8(&[0xE2, 0x82]).is_err());
        assert!(decode_modified_utf8(&[0xFF]).is_err());
        // Lone high surrogate.
        assert!(decode_modified_utf8(&[0xED, 0xA0, 0xBD]).is_err());
    }

    #[test]
    fn opaque_blob_is_kept_verbatim() {
        let track = Track::from_encoded("QAAAjQIAJVJpY2sgQXN0bGV5");
        assert_eq!(track.encoded, "QAAAjQIAJVJpY2sgQXN0bGV5");
        assert_eq!(track.label(), "<unknown track>");
    }

    #[test]
    fn v3_playlist_result() {
        let blob = Track::new(sample_info()).encoded;
        let json = serde_json::json!({
            "loadType": "PLAYLIST_LOADED",
            "playlistInfo": { "name": "Mix", "selectedTrack": 0 },
            "tracks": [ { "track": blob, "info": { "title": "Never Gonna Give You Up" } } ]
        });
        let result: LoadResult = serde_json::from_value(json).unwrap();
        assert_eq!(result.playlist().and_then(|p| p.name.as_deref()), Some("Mix"));
        assert_eq!(result.tracks().len(), 1);
        assert_eq!(
            result.selected_track().map(|t| t.label()),
            Some("Never Gonna Give You Up")
        );
    }

    #[test]
    fn playlist_info_ignored_for_search_results() {
        let json = serde_json::json!({
            "loadType": "SEARCH_RESULT",
            "playlistInfo": { "name": null, "selectedTrack": -1 },
            "tracks": []
        });
        let result: LoadResult = serde_json::from_value(json).unwrap();
        assert!(result.playlist().is_none());
        assert!(result.selected_track().is_none());
    }

    #[test]
    fn failed_load_exposes_no_tracks() {
        let json = serde_json::json!({
            "loadType": "LOAD_FAILED",
            "tracks": [],
            "exception": { "message": "blocked", "severity": "COMMON" }
        });
        let result: LoadResult = serde_json::from_value(json).unwrap();
        assert!(result.tracks().is_empty());
        assert_eq!(
            result.exception.and_then(|e| e.message).as_deref(),
            Some("blocked")
        );
    }
}
