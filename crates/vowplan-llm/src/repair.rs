use tracing::{debug, info};

use crate::prompt::repair_prompt;
use crate::{AiError, GenerateBackend};

/// Generate with the backend and hand the raw text to `process`, retrying up
/// to `repair_attempts` times with the error fed back into the prompt.
///
/// Only extraction and normalization errors are repaired; generation errors
/// (transport, timeout, empty answer) return immediately. `label` is used for
/// log messages (e.g. "Tasks", "Venues").
pub(crate) async fn generate_with_repair<T>(
    backend: &impl GenerateBackend,
    label: &str,
    prompt: &str,
    repair_attempts: usize,
    mut process: impl FnMut(&str) -> Result<T, AiError>,
) -> Result<T, AiError> {
    let mut current_prompt = prompt.to_string();
    let mut attempt = 0;

    loop {
        let content = backend.generate(&current_prompt).await?;
        debug!("{} raw output (attempt {}): {}", label, attempt, content);

        match process(&content) {
            Ok(result) => return Ok(result),
            Err(e @ (AiError::Extraction(_) | AiError::Normalization(_)))
                if attempt < repair_attempts =>
            {
                attempt += 1;
                info!("Repair attempt {} for {} error: {}", attempt, label, e);
                current_prompt = repair_prompt(prompt, &content, &e.to_string());
            }
            Err(e) => return Err(e),
        }
    }
}
