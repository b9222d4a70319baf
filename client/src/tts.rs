//! Speech synthesis behind a trait, so the pipeline can run with a real
//! voice, muted, or recorded in tests.

use std::io;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::config::Settings;
use crate::engine::speech::SpeechRequest;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech program `{program}` not found ({source}); install espeak-ng or run muted")]
    ProgramMissing { program: String, source: io::Error },
    #[error("failed to run speech program: {0}")]
    Io(#[from] io::Error),
    #[error("speech program exited with {0}")]
    Failed(std::process::ExitStatus),
}

/// Synthesizes one utterance at a time. `speak` blocks until the utterance
/// has finished playing — the playback worker's pacing depends on that.
pub trait SpeechSink: Send {
    fn speak(&mut self, request: &SpeechRequest) -> Result<(), SpeechError>;
}

/// Drives the system `espeak-ng` binary, one process per utterance.
#[derive(Debug)]
pub struct EspeakSink {
    program: String,
    voice: Option<String>,
    rate: u32,
    amplitude: u32,
}

impl EspeakSink {
    pub const DEFAULT_PROGRAM: &'static str = "espeak-ng";

    /// Build a sink from the configured voice settings, probing for the
    /// binary up front so a missing install surfaces at startup instead of
    /// on the first chat message.
    pub fn new(settings: &Settings) -> Result<EspeakSink, SpeechError> {
        Self::with_program(Self::DEFAULT_PROGRAM, settings)
    }

    pub fn with_program(program: &str, settings: &Settings) -> Result<EspeakSink, SpeechError> {
        Command::new(program)
            .arg("--version")
            .output()
            .map_err(|source| SpeechError::ProgramMissing {
                program: program.to_string(),
                source,
            })?;

        Ok(EspeakSink {
            program: program.to_string(),
            voice: settings.voice_id.clone(),
            rate: settings.rate,
            amplitude: amplitude_for(settings.volume),
        })
    }
}

/// Map a 0.0..=1.0 volume onto espeak's 0..=200 amplitude scale, where 100
/// is the normal level.
fn amplitude_for(volume: f32) -> u32 {
    (volume.clamp(0.0, 1.0) * 100.0).round() as u32
}

impl SpeechSink for EspeakSink {
    fn speak(&mut self, request: &SpeechRequest) -> Result<(), SpeechError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-s").arg(self.rate.to_string());
        cmd.arg("-a").arg(self.amplitude.to_string());
        if let Some(voice) = request.voice.as_ref().or(self.voice.as_ref()) {
            cmd.arg("-v").arg(voice);
        }
        cmd.arg("--").arg(&request.text);

        debug!(text = %request.text, "synthesizing");
        let status = cmd.status()?;
        if !status.success() {
            return Err(SpeechError::Failed(status));
        }
        Ok(())
    }
}

/// Discards every request. Used for `--mute`.
pub struct NullSink;

impl SpeechSink for NullSink {
    fn speak(&mut self, _request: &SpeechRequest) -> Result<(), SpeechError> {
        Ok(())
    }
}
