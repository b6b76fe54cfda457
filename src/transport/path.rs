use crate::error::{AchError, Result};

/// Rejects relative paths that could leave the transport root: absolute
/// paths, and empty, `.` or `..` components.
pub fn validate(path: &str) -> Result<()> {
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(AchError::PathEscape(path.to_string()));
    }
    for component in path.split('/') {
        if component.is_empty()
            || component == "."
            || component == ".."
            || component.contains('\\')
        {
            return Err(AchError::PathEscape(path.to_string()));
        }
    }
    Ok(())
}

/// Joins `name` under `base` after checking both.
pub fn safe_join(base: &str, name: &str) -> Result<String> {
    let base = base.trim_end_matches('/');
    validate(base)?;
    validate(name)?;
    Ok(format!("{}/{}", base, name))
}

/// Last component of a remote path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_join() {
        assert_eq!(safe_join("outbound", "a.ach").unwrap(), "outbound/a.ach");
        assert_eq!(
            safe_join("mailbox/returned/", "r.ach").unwrap(),
            "mailbox/returned/r.ach"
        );
    }

    #[test]
    fn test_safe_join_rejects_escapes() {
        for name in ["../etc/passwd", "/etc/passwd", "", "a//b", "./a.ach", "a/../../b", "..\\x"] {
            assert!(
                matches!(safe_join("outbound", name), Err(AchError::PathEscape(_))),
                "{:?} should be rejected",
                name
            );
        }
        assert!(safe_join("../outbound", "a.ach").is_err());
        assert!(validate("returned/r.ach").is_ok());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("returned/r.ach"), "r.ach");
        assert_eq!(file_name("r.ach"), "r.ach");
    }
}
