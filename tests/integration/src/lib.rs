//! Scenario tests for the directory stores live under `tests/`.
