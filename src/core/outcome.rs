//! Success policy for finished transfers.
//!
//! The transfer engines only report what the process said. Whether that counts
//! as success is decided here, so the rule can change without touching the
//! orchestration.

use super::error::SyncError;
use super::models::Response;

impl Response {
    pub fn is_success(&self) -> bool {
        self.termination_status == 0
    }
}

/// Turn a non-zero exit status into `SyncError::TransferFailed`.
pub fn classify(response: &Response) -> Result<(), SyncError> {
    if response.is_success() {
        return Ok(());
    }

    Err(SyncError::TransferFailed {
        exit_code: response.termination_status,
        stderr: response.error.trim_end().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: i32, error: &str) -> Response {
        Response {
            output: String::new(),
            error: error.to_string(),
            termination_status: status,
        }
    }

    #[test]
    fn zero_status_is_success() {
        assert!(classify(&response(0, "")).is_ok());
        // rsync warnings on stderr do not make a clean exit a failure
        assert!(classify(&response(0, "some warning\n")).is_ok());
    }

    #[test]
    fn non_zero_status_is_transfer_failed() {
        let err = classify(&response(23, "rsync: some files vanished\n")).unwrap_err();
        match err {
            SyncError::TransferFailed { exit_code, stderr } => {
                assert_eq!(exit_code, 23);
                assert_eq!(stderr, "rsync: some files vanished");
            }
            other => panic!("expected TransferFailed, got {other:?}"),
        }
    }
}
