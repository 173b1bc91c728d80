use crate::models::{CaptureConfig, DecodedResult, MetadataObject, Symbology};
use crate::services::capture::CaptureSession;

/// Outcome of feeding one frame to the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// First match of the activation. The session is already stopped.
    Matched(DecodedResult),
    /// Nothing usable in this frame; keep waiting.
    Ignored,
    /// A match was already produced for this activation.
    AlreadyMatched,
}

/// First-match-wins decoding for one activation.
///
/// Frames arrive already restricted to the region of interest. Candidates
/// are filtered before picking "first": the first machine-readable code of an
/// accepted symbology that carries a payload wins. Everything else in the
/// frame is skipped without error.
#[derive(Debug, Clone)]
pub struct DecodePipeline {
    accepted: Vec<Symbology>,
    matched: bool,
}

impl DecodePipeline {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            accepted: config.accepted_symbologies.clone(),
            matched: false,
        }
    }

    pub fn has_matched(&self) -> bool {
        self.matched
    }

    /// Pick the winning candidate of a frame, if any.
    pub fn first_match(&self, objects: &[MetadataObject]) -> Option<DecodedResult> {
        objects
            .iter()
            .filter_map(MetadataObject::as_code)
            .filter(|code| self.accepted.contains(&code.symbology))
            .find_map(|code| {
                code.string_value.as_ref().map(|raw| DecodedResult {
                    raw_string: raw.clone(),
                    symbology: code.symbology,
                })
            })
    }

    /// Feed one frame.
    ///
    /// On the first match the session is stopped before the result is
    /// handed back, so no later frame of this activation can be delivered
    /// once the caller emits it.
    pub fn consume(
        &mut self,
        session: &mut CaptureSession,
        objects: &[MetadataObject],
    ) -> FrameOutcome {
        if self.matched {
            return FrameOutcome::AlreadyMatched;
        }
        match self.first_match(objects) {
            Some(result) => {
                session.stop();
                self.matched = true;
                FrameOutcome::Matched(result)
            }
            None => FrameOutcome::Ignored,
        }
    }
}
