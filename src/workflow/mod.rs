//! Workflow result protocol and the tool operations built on it.
//!
//! Every tool returns a [`ToolResult`]: a status, a self-contained message, an
//! optional hint naming the operation to call next, and free-form data. A
//! driving loop reads [`ToolResult::directive`] to decide what happens next:
//!
//! | status      | next action | directive     |
//! |-------------|-------------|---------------|
//! | `Continue`  | present     | `Repeat`      |
//! | `Continue`  | absent      | `Escalate`    |
//! | `Success`   | present     | `Proceed`     |
//! | `Success`   | absent      | `Done`        |
//! | `Failure`   | any         | `StageFailed` |
//! | `Error`, `Exception` | any | `Escalate`  |

mod result;
mod tools;

#[cfg(test)]
#[path = "result_tests.rs"]
mod result_tests;

pub use result::{Directive, NextAction, StatusMessages, ToolResult, ToolStatus};
pub use tools::{tool_names, QaTools};
