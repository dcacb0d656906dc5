//! Voice switches for the chat surface.
//!
//! Only the on/off state lives here. Speech synthesis and microphone capture
//! belong to the presentation layer, which reacts to `VoiceToggled` events.

use crate::error::ChatError;

/// Text-to-speech and recording switches of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceState {
    /// Whether assistant replies are read aloud.
    pub tts_enabled: bool,
    /// Whether the microphone is capturing a dictated prompt.
    pub recording: bool,
}

impl VoiceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the switch actually changed.
    pub fn set_tts(&mut self, enabled: bool) -> bool {
        let changed = self.tts_enabled != enabled;
        self.tts_enabled = enabled;
        changed
    }

    pub fn start_recording(&mut self) -> Result<(), ChatError> {
        if self.recording {
            return Err(ChatError::VoiceError(
                "Recording is already active".to_string(),
            ));
        }
        self.recording = true;
        Ok(())
    }

    pub fn stop_recording(&mut self) -> Result<(), ChatError> {
        if !self.recording {
            return Err(ChatError::VoiceError("Recording is not active".to_string()));
        }
        self.recording = false;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
