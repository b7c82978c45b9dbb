#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more assertions failed.
    AssertionsFailed = 11,

    /// Invalid CLI/config (bad flags, malformed YAML, template or JSON path syntax, missing CSV).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, runtime setup failures).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_verdict(passed: bool) -> Self {
        if passed {
            Self::Success
        } else {
            Self::AssertionsFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_maps_to_exit_code() {
        assert_eq!(ExitCode::from_verdict(true).as_i32(), 0);
        assert_eq!(ExitCode::from_verdict(false).as_i32(), 11);
    }
}
