//! Markup collaborator seam.
//!
//! State resolvers describe what the caller should hear as a list of
//! [`Directive`]s; a [`MarkupRenderer`] turns that list into whatever wire
//! format the telephony provider expects (typically an XML dialect). The
//! output is opaque to this crate and is threaded through unchanged.

use crate::errors::Result;
use serde::{Deserialize, Serialize};

/// A structured call-control instruction, provider-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    /// Speak text to the caller.
    Say { text: String },
    /// Play an audio resource.
    Play { url: String },
    /// Collect keypad input, playing the nested prompts while waiting.
    Gather {
        num_digits: Option<u32>,
        timeout_secs: Option<u32>,
        prompts: Vec<Directive>,
    },
    /// Record the caller.
    Record { max_length_secs: Option<u32> },
    /// Silence.
    Pause { secs: u32 },
    /// Hand the call to another webhook URL.
    Redirect { url: String },
    /// End the call.
    Hangup,
}

impl Directive {
    pub fn say(text: impl Into<String>) -> Self {
        Directive::Say { text: text.into() }
    }

    pub fn gather(num_digits: u32, timeout_secs: u32, prompts: Vec<Directive>) -> Self {
        Directive::Gather {
            num_digits: Some(num_digits),
            timeout_secs: Some(timeout_secs),
            prompts,
        }
    }
}

/// Renders directives into the provider's wire format.
///
/// Implementations must be pure with respect to call state: the same
/// directive list always renders to the same markup.
pub trait MarkupRenderer: Send + Sync {
    fn render(&self, directives: &[Directive]) -> Result<String>;
}

/// Line-oriented renderer for tests and local development. Production
/// deployments plug in a provider-specific renderer at this seam.
#[derive(Debug, Default, Clone)]
pub struct PlainTextRenderer;

impl MarkupRenderer for PlainTextRenderer {
    fn render(&self, directives: &[Directive]) -> Result<String> {
        let mut out = String::new();
        render_into(&mut out, directives, 0);
        Ok(out)
    }
}

fn render_into(out: &mut String, directives: &[Directive], depth: usize) {
    for directive in directives {
        for _ in 0..depth {
            out.push_str("  ");
        }
        match directive {
            Directive::Say { text } => out.push_str(&format!("SAY {}\n", text)),
            Directive::Play { url } => out.push_str(&format!("PLAY {}\n", url)),
            Directive::Gather {
                num_digits,
                timeout_secs,
                prompts,
            } => {
                out.push_str(&format!(
                    "GATHER digits={} timeout={}\n",
                    num_digits.map_or_else(|| "any".to_string(), |n| n.to_string()),
                    timeout_secs.map_or_else(|| "default".to_string(), |t| t.to_string()),
                ));
                render_into(out, prompts, depth + 1);
            }
            Directive::Record { max_length_secs } => {
                out.push_str(&format!(
                    "RECORD max={}\n",
                    max_length_secs.map_or_else(|| "default".to_string(), |t| t.to_string()),
                ));
            }
            Directive::Pause { secs } => out.push_str(&format!("PAUSE {}\n", secs)),
            Directive::Redirect { url } => out.push_str(&format!("REDIRECT {}\n", url)),
            Directive::Hangup => out.push_str("HANGUP\n"),
        }
    }
}
