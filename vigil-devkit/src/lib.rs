/*!
Test helpers for the vigil workspace.

- `json_assert`: navigate and assert on nested JSON documents, the way
  dashboards consume them.
- `messages`: builders for the wire payloads peers exchange.
*/

pub mod json_assert;
pub mod messages;

/// Best-effort logger init for tests; repeated calls are fine.
pub fn init_test_logging() {
    env_logger::try_init().ok();
}
