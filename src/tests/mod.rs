//! End-to-end tests driving the assembled router.

mod gate_e2e;
