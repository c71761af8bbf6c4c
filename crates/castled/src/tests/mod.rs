//! Test suites for the Castle desktop agent.

mod launch;
mod support;
