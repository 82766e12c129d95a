use std::{num::NonZeroUsize, path::Path};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::{
    error::{Result, ShortformError},
    timestamp,
    types::{CaptionCue, CaptionTrack, TranscriptSegment},
};

/// How a segment's time span is shared between its word groups.
///
/// `Equal` is the plain even split that earlier caption scripts used; pick it
/// with `[captions] timing = "equal"` to reproduce their SRT files exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueTiming {
    /// Each group gets time in proportion to its word count.
    #[default]
    Proportional,
    /// Every group of a segment gets the same slice.
    Equal,
}

/// Re-chunks transcript segments into short fixed-size word groups.
#[derive(Debug, Clone, Copy)]
pub struct CaptionSegmenter {
    words_per_cue: NonZeroUsize,
    timing: CueTiming,
}

impl CaptionSegmenter {
    pub fn new(words_per_cue: NonZeroUsize) -> Self {
        Self {
            words_per_cue,
            timing: CueTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: CueTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Build a caption track from ordered transcript segments.
    ///
    /// Cue indices are 1-based and dense across the whole track. Segments
    /// without words contribute nothing. A segment whose end is not after its
    /// start is rejected before any cue is produced.
    pub fn segment(&self, segments: &[TranscriptSegment]) -> Result<CaptionTrack> {
        for (index, segment) in segments.iter().enumerate() {
            let finite = segment.start.is_finite() && segment.end.is_finite();
            if !finite || segment.end <= segment.start {
                return Err(ShortformError::InvalidSegment {
                    index,
                    start: segment.start,
                    end: segment.end,
                });
            }
        }

        let mut cues = Vec::new();
        for segment in segments {
            let words: Vec<&str> = segment.text.split_whitespace().collect();
            if words.is_empty() {
                continue;
            }

            let groups: Vec<&[&str]> = words.chunks(self.words_per_cue.get()).collect();
            let duration = segment.end - segment.start;
            let mut words_before = 0;

            for (j, group) in groups.iter().enumerate() {
                let (offset, length) = match self.timing {
                    CueTiming::Equal => {
                        let slice = duration / groups.len() as f64;
                        (j as f64 * slice, slice)
                    }
                    CueTiming::Proportional => {
                        let per_word = duration / words.len() as f64;
                        (words_before as f64 * per_word, group.len() as f64 * per_word)
                    }
                };
                words_before += group.len();

                let start = segment.start + offset;
                // The last group always closes exactly on the segment end.
                let end = if j + 1 == groups.len() {
                    segment.end
                } else {
                    (start + length).min(segment.end)
                };

                cues.push(CaptionCue {
                    index: cues.len() + 1,
                    start,
                    end,
                    text: group.join(" "),
                });
            }
        }

        Ok(CaptionTrack { cues })
    }
}

/// Segment with default (proportional) timing.
pub fn segment_transcript(
    segments: &[TranscriptSegment],
    words_per_cue: NonZeroUsize,
) -> Result<CaptionTrack> {
    CaptionSegmenter::new(words_per_cue).segment(segments)
}

/// Render a caption track as SubRip (`.srt`) text.
pub fn render_srt(track: &CaptionTrack) -> Result<String> {
    let mut output = String::new();
    for cue in &track.cues {
        output.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            cue.index,
            timestamp::encode(cue.start)?,
            timestamp::encode(cue.end)?,
            cue.text
        ));
    }
    Ok(output)
}

/// Write a caption track to `path`, replacing whatever was there.
pub async fn write_srt(track: &CaptionTrack, path: &Path) -> Result<()> {
    let rendered = render_srt(track)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, rendered).await?;
    Ok(())
}
