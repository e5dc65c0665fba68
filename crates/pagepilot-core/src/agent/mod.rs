//! The page-grounded agent: system prompt, tool bridge, and the bounded
//! tool-calling loop.

pub mod cycle_detector;
pub mod prompt;
pub mod tool_loop;
pub mod tools;
