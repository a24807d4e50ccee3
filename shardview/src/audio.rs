use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

/// Interaction feedback cues the input machine can trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoundCue {
    /// Drop rejected: too far, or no valid target.
    DropFailed,
    /// Item released onto the ground or a surface.
    DropItem,
    /// Item lifted onto the cursor.
    PickUpItem,
}

/// Sink for feedback sounds.
///
/// The input machine records cues through this trait so tests can observe
/// rejection feedback without an audio device.
pub trait SoundPlayer {
    fn play(&mut self, cue: SoundCue);
}

/// Test/headless player that just remembers what was cued.
#[derive(Default)]
pub struct RecordingSoundPlayer {
    pub played: Vec<SoundCue>,
}

impl SoundPlayer for RecordingSoundPlayer {
    fn play(&mut self, cue: SoundCue) {
        self.played.push(cue);
    }
}

/// Plays feedback cues through the default audio device.
///
/// Initialization is graceful: with no device available every cue is a no-op
/// and the client keeps running.
pub struct AudioSystem {
    _stream: Option<OutputStream>,
    stream_handle: Option<OutputStreamHandle>,
    cue_paths: Vec<(SoundCue, PathBuf)>,
}

impl AudioSystem {
    pub fn new() -> Result<Self> {
        match OutputStream::try_default() {
            Ok((stream, stream_handle)) => Ok(Self {
                _stream: Some(stream),
                stream_handle: Some(stream_handle),
                cue_paths: Vec::new(),
            }),
            Err(e) => {
                log::warn!("failed to initialize audio: {}. Sound will be unavailable.", e);
                Ok(Self {
                    _stream: None,
                    stream_handle: None,
                    cue_paths: Vec::new(),
                })
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.stream_handle.is_some()
    }

    /// Bind a cue to a sound file on disk.
    pub fn register_cue(&mut self, cue: SoundCue, path: impl Into<PathBuf>) {
        self.cue_paths.retain(|(c, _)| *c != cue);
        self.cue_paths.push((cue, path.into()));
    }

    /// Play a one-shot sound from a file path.
    pub fn play_sound<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let stream_handle = self
            .stream_handle
            .as_ref()
            .ok_or_else(|| anyhow!("audio system is not available"))?;

        let file = File::open(path.as_ref())
            .map_err(|e| anyhow!("failed to open sound file {:?}: {}", path.as_ref(), e))?;
        let source = Decoder::new(BufReader::new(file))
            .map_err(|e| anyhow!("failed to decode sound file {:?}: {}", path.as_ref(), e))?;

        let sink = Sink::try_new(stream_handle)
            .map_err(|e| anyhow!("failed to create audio sink: {}", e))?;
        sink.append(source);
        sink.detach();
        Ok(())
    }
}

impl SoundPlayer for AudioSystem {
    fn play(&mut self, cue: SoundCue) {
        let path = self
            .cue_paths
            .iter()
            .find(|(c, _)| *c == cue)
            .map(|(_, p)| p.clone());
        if let Some(path) = path {
            if let Err(e) = self.play_sound(&path) {
                log::warn!("failed to play {:?}: {}", cue, e);
            }
        }
    }
}
