//! Server-level test suites.

mod support;
