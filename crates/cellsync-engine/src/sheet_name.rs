use crate::error::SyncError;

pub const MAX_SHEET_NAME_LEN: usize = 31;
const FORBIDDEN: &[char] = &['/', '\\', '?', '*', '[', ']', ':', '\''];

/// Validate a sheet name the way Excel does and return it trimmed.
pub fn validate_sheet_name(name: &str) -> Result<String, SyncError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SyncError::invalid("sheet name cannot be empty"));
    }
    if trimmed.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(SyncError::invalid(format!(
            "sheet name '{trimmed}' is longer than {MAX_SHEET_NAME_LEN} characters"
        )));
    }
    if let Some(ch) = trimmed.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(SyncError::invalid(format!(
            "sheet name '{trimmed}' contains forbidden character '{ch}'"
        )));
    }
    Ok(trimmed.to_string())
}

/// Sheet names are unique case-insensitively.
pub fn same_sheet_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
