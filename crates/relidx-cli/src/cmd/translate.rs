//! Translate command

use anyhow::Result;
use relidx_core::release::translate_release;

use super::read_event;
use crate::EventArgs;
use crate::config::Config;

/// Print the payload for a release event as compact JSON.
pub fn translate(args: &EventArgs, config: &Config) -> Result<()> {
    let event = read_event(args.event.as_deref())?;
    let fallback = args
        .sublime_text_version_range
        .as_deref()
        .unwrap_or(&config.release.sublime_text);
    let payload = translate_release(&event, fallback)?;
    println!("{}", serde_json::to_string(&payload)?);
    Ok(())
}
