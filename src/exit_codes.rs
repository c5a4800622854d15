//! Exit code constants for the execlock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config)
//! - 2: I/O failure (lock directory, markers, registry)
//! - 3: Transport failure (coordinator unreachable)
//! - 4: Lock failure (not held, poll loop died)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// I/O failure on the shared lock directory or registry.
pub const IO_FAILURE: i32 = 2;

/// Coordinator could not be reached or rejected the request.
pub const TRANSPORT_FAILURE: i32 = 3;

/// Lock could not be acquired or released.
pub const LOCK_FAILURE: i32 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [SUCCESS, USER_ERROR, IO_FAILURE, TRANSPORT_FAILURE, LOCK_FAILURE];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }
}
