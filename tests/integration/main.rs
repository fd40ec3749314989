// Integration tests

mod fixtures;
mod race_condition_test;
mod recovery_test;
