//! Randomized container tags written with `-metadata key=value`.

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ENCODERS: [&str; 15] = [
    "Lavf58.76.100",
    "Lavf59.27.100",
    "Lavf60.3.100",
    "HandBrake 1.6.1",
    "Adobe Premiere Pro",
    "DaVinci Resolve 18",
    "CapCut 3.2",
    "FFmpeg 6.0",
    "iMovie 10.3",
    "Final Cut Pro X",
    "Filmora 13",
    "VLC media player",
    "Adobe Media Encoder 2024",
    "Shotcut 24.01",
    "OpenShot 3.1",
];

pub const HANDLERS: [&str; 9] = [
    "VideoHandler",
    "MainHandler",
    "ISO Media",
    "Apple Video Media Handler",
    "Core Media Video",
    "GPAC ISO Video Handler",
    "Mainconcept Video Media Handler",
    "L-SMASH Video Handler",
    "VideoHandle",
];

const ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TITLE_EXTRA: &[u8] = b" _-";
const COMMENT_EXTRA: &[u8] = b" .,!";

const MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;
pub const MAJOR_BRAND: &str = "mp42";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataTags {
    pub title: String,
    pub comment: String,
    pub encoder: String,
    pub handler_name: String,
    pub creation_time: DateTime<Utc>,
    pub file_id: Uuid,
    pub minor_version: u16,
}

impl MetadataTags {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self::random_at(rng, Utc::now())
    }

    /// Same as [`MetadataTags::random`] with an explicit reference time.
    pub fn random_at<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> Self {
        let title_len = rng.random_range(8..=32);
        let comment_len = rng.random_range(10..=48);
        let title = random_string(rng, TITLE_EXTRA, title_len);
        let comment = random_string(rng, COMMENT_EXTRA, comment_len);
        let encoder = ENCODERS.choose(rng).copied().unwrap_or(ENCODERS[0]);
        let handler = HANDLERS.choose(rng).copied().unwrap_or(HANDLERS[0]);
        let age = rng.random_range(0..=MAX_AGE_SECS);
        let file_id = uuid::Builder::from_random_bytes(rng.random()).into_uuid();

        Self {
            title,
            comment,
            encoder: encoder.to_string(),
            handler_name: handler.to_string(),
            creation_time: now - ChronoDuration::seconds(age),
            file_id,
            minor_version: rng.random_range(0..=512),
        }
    }

    /// `key=value` pairs in the order they are passed to ffmpeg.
    pub fn ffmpeg_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("title", self.title.clone()),
            ("comment", self.comment.clone()),
            ("encoder", self.encoder.clone()),
            ("handler_name", self.handler_name.clone()),
            (
                "creation_time",
                self.creation_time
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
            ),
            ("file_id", self.file_id.to_string()),
            ("major_brand", MAJOR_BRAND.to_string()),
            ("minor_version", self.minor_version.to_string()),
        ]
    }
}

fn random_string<R: Rng>(rng: &mut R, extra: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..ALNUM.len() + extra.len());
            let byte = if idx < ALNUM.len() {
                ALNUM[idx]
            } else {
                extra[idx - ALNUM.len()]
            };
            char::from(byte)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_vocabularies() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let tags = MetadataTags::random(&mut rng);
            assert!(ENCODERS.contains(&tags.encoder.as_str()));
            assert!(HANDLERS.contains(&tags.handler_name.as_str()));
            assert!(tags.minor_version <= 512);
            assert_eq!(tags.file_id.get_version_num(), 4);
        }
    }

    #[test]
    fn test_string_lengths_and_alphabets() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            let tags = MetadataTags::random(&mut rng);
            assert!((8..=32).contains(&tags.title.len()));
            assert!((10..=48).contains(&tags.comment.len()));
            assert!(tags
                .title
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || " _-".contains(c)));
            assert!(tags
                .comment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || " .,!".contains(c)));
        }
    }

    #[test]
    fn test_creation_time_within_past_thirty_days() {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..100 {
            let tags = MetadataTags::random_at(&mut rng, now);
            assert!(tags.creation_time <= now);
            assert!(now - tags.creation_time <= ChronoDuration::days(30));
        }
    }

    #[test]
    fn test_ffmpeg_pairs() {
        let tags = MetadataTags::random(&mut StdRng::seed_from_u64(2));
        let pairs = tags.ffmpeg_pairs();
        assert_eq!(pairs.len(), 8);
        assert_eq!(pairs[0].0, "title");
        assert!(pairs.iter().any(|(k, v)| *k == "major_brand" && v == "mp42"));
        let (_, created) = &pairs[4];
        assert!(created.ends_with('Z'), "{}", created);
    }
}
