//! Validation of local mutation input.
//!
//! Invalid input is rejected before the record store or the queue is
//! touched, so a rejected mutation never produces a queue item.

use crate::error::ValidationError;
use crate::ids::RecordId;
use crate::task::TaskUpdate;

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 255;

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_LEN: usize = 4096;

/// Validate the fields of a task about to be created.
pub fn validate_new_task(
    id: &RecordId,
    title: &str,
    description: &str,
) -> Result<(), ValidationError> {
    if id.as_str().trim().is_empty() {
        return Err(ValidationError::EmptyRecordId);
    }
    validate_title(title)?;
    validate_description(description)
}

/// Validate a partial edit.
pub fn validate_update(update: &TaskUpdate) -> Result<(), ValidationError> {
    if update.is_empty() {
        return Err(ValidationError::EmptyUpdate);
    }
    if let Some(title) = &update.title {
        validate_title(title)?;
    }
    if let Some(description) = &update.description {
        validate_description(description)?;
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let len = title.chars().count();
    if len > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong {
            max: MAX_TITLE_LEN,
            len,
        });
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), ValidationError> {
    let len = description.chars().count();
    if len > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::DescriptionTooLong {
            max: MAX_DESCRIPTION_LEN,
            len,
        });
    }
    Ok(())
}
