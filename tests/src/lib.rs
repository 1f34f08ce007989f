//! Integration tests for the lyra workspace live under `tests/`.
