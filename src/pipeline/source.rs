use anyhow::Result;
use std::collections::VecDeque;

use crate::types::Landmarks;

/// One unit of work from the capture collaborator: the encoded frame plus
/// the hand keypoints, when a hand was detected.
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    pub jpeg: Vec<u8>,
    pub landmarks: Option<Landmarks>,
}

/// Blocking capture + landmark extraction + JPEG encoding, owned by an
/// external collaborator. `next_frame` is called from the worker pool, never
/// from the orchestration thread. `Ok(None)` means no frame was ready.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>>;
}

/// Opens a capture session. May fail when the device is unavailable.
pub type SourceFactory = Box<dyn Fn() -> Result<Box<dyn FrameSource>> + Send>;

/// Factory for deployments compiled without a capture backend: opening the
/// camera reports an error instead of crashing the service.
pub fn unavailable_source_factory() -> SourceFactory {
    Box::new(|| anyhow::bail!("no capture backend available"))
}

/// Scripted source for tests and demos: yields the queued frames in order,
/// then reports "no frame ready" forever.
pub struct ReplaySource {
    frames: VecDeque<Option<CapturedFrame>>,
}

impl ReplaySource {
    pub fn new(frames: impl IntoIterator<Item = Option<CapturedFrame>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        Ok(self.frames.pop_front().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_source_drains_then_idles() {
        let frame = CapturedFrame {
            jpeg: vec![0xff, 0xd8],
            landmarks: None,
        };
        let mut source = ReplaySource::new([Some(frame), None]);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn unavailable_factory_fails_to_open() {
        let factory = unavailable_source_factory();
        assert!(factory().is_err());
    }
}
