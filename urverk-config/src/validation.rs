//! Custom validators shared by the configuration sections.

use validator::ValidationError;

const MAX_WORKERS: usize = 256;
const MIN_STACK_KIB: usize = 64;
const MAX_STACK_KIB: usize = 64 * 1024;

pub(crate) fn validate_workers(workers: usize) -> Result<(), ValidationError> {
    if workers == 0 || workers > MAX_WORKERS {
        let mut error = ValidationError::new("workers_out_of_range");
        error.message = Some(format!("workers must be in 1..={MAX_WORKERS}").into());
        return Err(error);
    }
    Ok(())
}

pub(crate) fn validate_stack_kib(stack_kib: usize) -> Result<(), ValidationError> {
    if !(MIN_STACK_KIB..=MAX_STACK_KIB).contains(&stack_kib) {
        let mut error = ValidationError::new("stack_out_of_range");
        error.message =
            Some(format!("stack_kib must be in {MIN_STACK_KIB}..={MAX_STACK_KIB}").into());
        return Err(error);
    }
    Ok(())
}

pub(crate) fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut error = ValidationError::new("unknown_log_level");
            error.message = Some("level must be one of trace|debug|info|warn|error".into());
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_bounds() {
        assert!(validate_workers(1).is_ok());
        assert!(validate_workers(0).is_err());
        assert!(validate_workers(MAX_WORKERS + 1).is_err());
    }

    #[test]
    fn stack_bounds() {
        assert!(validate_stack_kib(512).is_ok());
        assert!(validate_stack_kib(1).is_err());
    }

    #[test]
    fn log_levels() {
        assert!(validate_log_level("debug").is_ok());
        assert!(validate_log_level("loud").is_err());
    }
}
