//! Cross-crate integration scenarios for the otto pipeline live in `tests/`.
