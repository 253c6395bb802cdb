//! Parameter checks run before any preview or prompt.

use crate::error::{Error, Result};

pub const MAX_NAME_LEN: usize = 80;
pub const CPU_RANGE: (u32, u32) = (1, 128);
pub const MEMORY_RANGE_MB: (u64, u64) = (128, 6_291_456);
pub const DISK_RANGE_GB: (u64, u64) = (1, 62_000);

/// VM and snapshot names: 1 to 80 of `[A-Za-z0-9._ -]`, no leading or
/// trailing space.
pub fn name(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.chars().count() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "{kind} name must be 1-{MAX_NAME_LEN} characters, got {}",
            value.chars().count()
        )));
    }
    if value.starts_with(' ') || value.ends_with(' ') {
        return Err(Error::Validation(format!(
            "{kind} name '{value}' must not start or end with a space"
        )));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ' ' | '-')))
    {
        return Err(Error::Validation(format!(
            "{kind} name '{value}' contains invalid character '{bad}'"
        )));
    }
    Ok(())
}

pub fn cpu(count: u32) -> Result<()> {
    let (min, max) = CPU_RANGE;
    if !(min..=max).contains(&count) {
        return Err(Error::Validation(format!(
            "CPU count must be between {min} and {max}, got {count}"
        )));
    }
    Ok(())
}

pub fn memory_mb(size: u64) -> Result<()> {
    let (min, max) = MEMORY_RANGE_MB;
    if !(min..=max).contains(&size) {
        return Err(Error::Validation(format!(
            "memory must be between {min} and {max} MB, got {size}"
        )));
    }
    if size % 4 != 0 {
        return Err(Error::Validation(format!(
            "memory must be a multiple of 4 MB, got {size}"
        )));
    }
    Ok(())
}

pub fn disk_gb(size: u64) -> Result<()> {
    let (min, max) = DISK_RANGE_GB;
    if !(min..=max).contains(&size) {
        return Err(Error::Validation(format!(
            "disk size must be between {min} and {max} GB, got {size}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_rules() {
        assert!(name("VM", "web-01").is_ok());
        assert!(name("VM", "db 01_prod.v2").is_ok());
        assert!(name("VM", &"a".repeat(80)).is_ok());
        assert!(name("VM", "").is_err());
        assert!(name("VM", &"a".repeat(81)).is_err());
        assert!(name("VM", " web").is_err());
        assert!(name("VM", "web ").is_err());
        assert!(name("VM", "web/01").is_err());
        assert!(name("VM", "wéb").is_err());
    }

    #[test]
    fn test_cpu_bounds() {
        assert!(cpu(1).is_ok());
        assert!(cpu(128).is_ok());
        assert!(cpu(0).is_err());
        assert!(cpu(129).is_err());
    }

    #[test]
    fn test_memory_bounds_and_alignment() {
        assert!(memory_mb(128).is_ok());
        assert!(memory_mb(6_291_456).is_ok());
        assert!(memory_mb(124).is_err());
        assert!(memory_mb(6_291_460).is_err());
        let err = memory_mb(4098).unwrap_err();
        assert!(err.to_string().contains("multiple of 4"));
    }

    #[test]
    fn test_disk_bounds() {
        assert!(disk_gb(1).is_ok());
        assert!(disk_gb(62_000).is_ok());
        assert!(disk_gb(0).is_err());
        assert!(disk_gb(62_001).is_err());
    }
}
