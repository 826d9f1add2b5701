//! Test suites for the development server supervisor.

mod support;
