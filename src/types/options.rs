//! Generation options

use serde::{Deserialize, Serialize};

use crate::{Result, VedantaError};

/// Sampling options for one `generate` call.
///
/// Value type; every field contributes to the request cache key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature in `[0, 1]`. Default: 0.7.
    pub temperature: f32,
    /// Maximum tokens to generate, `> 0`. Default: 512.
    pub max_tokens: u32,
    /// Nucleus sampling mass in `(0, 1]`. Default: 0.9.
    pub top_p: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 512,
            top_p: 0.9,
        }
    }
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.top_p = p;
        self
    }

    /// Check every field is inside its documented range.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(VedantaError::InvalidInput(format!(
                "temperature must be in [0, 1], got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(VedantaError::InvalidInput(
                "max_tokens must be greater than 0".into(),
            ));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(VedantaError::InvalidInput(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        Ok(())
    }
}
