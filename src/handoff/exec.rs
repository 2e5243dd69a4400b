//! Process replacement via `execvp`.

use crate::error::{GateError, GateResult};
use std::convert::Infallible;
use std::os::unix::process::CommandExt;
use std::process::Command;

/// Replace the current process image with `command`. Only returns on failure.
pub fn replace_process(command: &[String]) -> GateResult<Infallible> {
    let (program, args) = command.split_first().ok_or(GateError::EmptyCommand)?;
    let error = Command::new(program).args(args).exec();
    Err(GateError::from_launch_error(program, error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_returns_instead_of_replacing() {
        let command = vec!["/definitely/not/a/real/program".to_string()];
        let err = replace_process(&command).unwrap_err();
        assert!(matches!(err, GateError::CommandNotFound { .. }));
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn test_empty_command() {
        assert!(matches!(
            replace_process(&[]),
            Err(GateError::EmptyCommand)
        ));
    }
}
