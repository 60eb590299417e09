//! Cross-crate tests for the lost & found workspace live under `tests/`.
